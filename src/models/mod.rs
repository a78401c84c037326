/// Registered architectures and their hyperparameter defaults
pub mod architecture;

/// RoBERTa with part-of-speech segment embeddings
pub mod segment_bert;

pub use architecture::{ArchitectureArgs, MODEL_NAME};
pub use segment_bert::{SegmentBert, SegmentBertConfig};
