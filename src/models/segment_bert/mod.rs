/// Activation functions
pub mod activation;

/// Model configuration
pub mod config;

/// Embeddings and transformer layers
pub mod encoder;

/// Classification and dependency parsing heads
pub mod heads;

/// Parameter initialization
pub mod init;

/// Masked language model head
pub mod lm_head;

/// The full model
pub mod model;

/// Named parameter state and checkpoint head reconciliation
pub mod state;

pub use activation::Activation;
pub use config::SegmentBertConfig;
pub use model::{EncoderOutput, SegmentBert, SegmentEncoder};

#[cfg(test)]
pub(crate) mod tests {
    use super::SegmentBertConfig;

    pub type TestBackend = burn::backend::NdArray;

    /// A small deterministic configuration: no dropout, 16-wide embeddings
    pub fn tiny_config() -> SegmentBertConfig {
        SegmentBertConfig::new(10, 1)
            .with_encoder_layers(2)
            .with_encoder_embed_dim(16)
            .with_encoder_ffn_embed_dim(32)
            .with_encoder_attention_heads(2)
            .with_max_positions(16)
            .with_dropout(0.0)
            .with_attention_dropout(0.0)
    }
}
