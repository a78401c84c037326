/// Subword tokenization adapters
pub mod bpe;

/// Checkpoint directories: loading, saving and resolution
pub mod checkpoint;

/// The inference facade
pub mod interface;

pub use bpe::{Bpe, TokenizerBpe, WhitespaceBpe};
pub use checkpoint::{CheckpointResolver, LocalCache};
pub use interface::{Features, SegmentBertHub};
