/// Errors raised by the segment-aware model and its dictionaries
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The input is longer than the learned positional embeddings allow
    #[error("tokens exceeds maximum length: {len} > {max}")]
    SequenceTooLong {
        /// The offending sequence length
        len: usize,
        /// The configured maximum number of positions
        max: usize,
    },

    /// Token and segment inputs must have the same shape
    #[error("segments shape {segments:?} does not match tokens shape {tokens:?}")]
    SegmentLength {
        /// Shape of the token ids
        tokens: [usize; 2],
        /// Shape of the segment ids
        segments: [usize; 2],
    },

    /// No head is registered under the given name
    #[error("no classification head registered as {0}")]
    UnknownHead(String),

    /// The head exists but was invoked through the wrong entry point
    #[error("head {name} is not a {expected} head")]
    HeadKind {
        /// The head name
        name: String,
        /// The kind the caller expected
        expected: String,
    },

    /// Token lookup without vocabulary growth
    #[error("token {0:?} is not in the dictionary")]
    UnknownToken(String),

    /// The task was loaded without a dictionary the operation needs
    #[error("the task has no {0} dictionary")]
    MissingDictionary(&'static str),

    /// Malformed dictionary file line
    #[error("invalid dictionary line {line}: {reason}")]
    DictionaryFormat {
        /// One-based line number
        line: usize,
        /// What went wrong
        reason: String,
    },

    /// No architecture registered under the given name
    #[error("no architecture found for {0}")]
    UnknownArchitecture(String),

    /// Unsupported activation function name
    #[error("no activation function found for {0}")]
    UnknownActivation(String),

    /// No head kind matches the given name
    #[error("no head kind found for {0}")]
    UnknownHeadKind(String),

    /// Dimensions that cannot build a model
    #[error("invalid model configuration: {0}")]
    InvalidConfig(String),

    /// Invalid `encoder_layers_to_keep` specification
    #[error("invalid layers to keep {spec:?} for an encoder with {layers} layers")]
    LayersToKeep {
        /// The raw comma-separated list
        spec: String,
        /// Number of layers available
        layers: usize,
    },

    /// A parameter required by a live module is absent from the state dict
    #[error("missing parameter {0} in state dict")]
    MissingParam(String),

    /// A stored parameter does not fit the live module
    #[error("parameter {key} has shape {found:?}, expected {expected:?}")]
    ParamShape {
        /// The state dict key
        key: String,
        /// The shape of the live parameter
        expected: Vec<usize>,
        /// The shape found in the state dict
        found: Vec<usize>,
    },

    /// Filesystem failure
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failure
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Result alias for this crate
pub type Result<T> = std::result::Result<T, Error>;
