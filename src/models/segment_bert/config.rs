use burn::tensor::backend::Backend;

use crate::error::Error;

use super::{
    activation::Activation, encoder::SentenceEncoder, heads::ClassificationHeads,
    lm_head::LmHead, model::SegmentEncoder, SegmentBert,
};

/// 48 part-of-speech categories plus the 4 dictionary specials
pub const NUM_SEGMENTS: usize = 48 + 4;

/// The resolved model configuration. Built once from the architecture arguments and never
/// modified afterwards.
#[derive(burn::config::Config)]
pub struct SegmentBertConfig {
    /// Size of the source vocabulary
    pub vocab_size: usize,

    /// Index of the padding token in the source vocabulary
    pub padding_idx: usize,

    /// Number of segment (part-of-speech) ids
    #[config(default = "NUM_SEGMENTS")]
    pub num_segments: usize,

    /// Number of encoder layers to build
    #[config(default = 12)]
    pub encoder_layers: usize,

    /// Size of the hidden state (e.g., 768 for the base model)
    #[config(default = 768)]
    pub encoder_embed_dim: usize,

    /// Size of the position-wise feed-forward layer
    #[config(default = 3072)]
    pub encoder_ffn_embed_dim: usize,

    /// Number of attention heads
    #[config(default = 12)]
    pub encoder_attention_heads: usize,

    /// Activation inside the feed-forward layers and the LM head
    #[config(default = "Activation::Gelu")]
    pub activation_fn: Activation,

    /// Activation of the classification head pooler
    #[config(default = "Activation::Tanh")]
    pub pooler_activation_fn: Activation,

    /// Dropout probability
    #[config(default = 0.1)]
    pub dropout: f64,

    /// Dropout probability for attention weights
    #[config(default = 0.1)]
    pub attention_dropout: f64,

    /// Dropout probability after the activation in the feed-forward layers
    #[config(default = 0.0)]
    pub activation_dropout: f64,

    /// Dropout probability in the classification heads
    #[config(default = 0.0)]
    pub pooler_dropout: f64,

    /// Number of positional embeddings to learn
    #[config(default = 512)]
    pub max_positions: usize,

    /// LayerDrop probability
    #[config(default = 0.0)]
    pub encoder_layerdrop: f64,

    /// Layer normalization epsilon
    #[config(default = 1e-5)]
    pub layer_norm_eps: f64,

    /// (Re-)register and load heads when loading checkpoints
    #[config(default = false)]
    pub load_checkpoint_heads: bool,

    /// Layers to keep once a full-depth checkpoint has been loaded
    pub encoder_layers_to_keep: Option<Vec<usize>>,
}

impl SegmentBertConfig {
    /// Number of layers left after pruning
    pub fn effective_layers(&self) -> usize {
        self.encoder_layers_to_keep
            .as_ref()
            .map(Vec::len)
            .unwrap_or(self.encoder_layers)
    }

    /// Check the dimensions before building any modules
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.encoder_attention_heads == 0
            || self.encoder_embed_dim % self.encoder_attention_heads != 0
        {
            return Err(Error::InvalidConfig(format!(
                "embed dim {} is not divisible by {} attention heads",
                self.encoder_embed_dim, self.encoder_attention_heads
            )));
        }

        if let Some(keep) = &self.encoder_layers_to_keep {
            let spec = keep
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(",");

            if keep.is_empty() || keep.iter().any(|&i| i >= self.encoder_layers) {
                return Err(Error::LayersToKeep {
                    spec,
                    layers: self.encoder_layers,
                });
            }
        }

        Ok(())
    }

    /// Initializes the model with BERT's random weights and no classification heads
    pub fn init<B: Backend>(&self, device: &B::Device) -> SegmentBert<B> {
        let sentence_encoder = SentenceEncoder::new(self, device);
        let lm_head = LmHead::new(self.encoder_embed_dim, self.vocab_size, device);

        SegmentBert {
            config: self.clone(),
            encoder: SegmentEncoder {
                sentence_encoder,
                lm_head,
            },
            classification_heads: ClassificationHeads::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn survives_a_json_round_trip() {
        let config = SegmentBertConfig::new(10, 1)
            .with_encoder_layers(3)
            .with_activation_fn(Activation::GeluAccurate)
            .with_encoder_layers_to_keep(Some(vec![0, 2]));

        let parsed: SegmentBertConfig = serde_json::from_str(&config.to_string()).unwrap();

        assert_eq!(parsed.encoder_layers, 3);
        assert_eq!(parsed.activation_fn, Activation::GeluAccurate);
        assert_eq!(parsed.effective_layers(), 2);
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn rejects_indivisible_attention_heads() {
        let config = SegmentBertConfig::new(10, 1)
            .with_encoder_embed_dim(10)
            .with_encoder_attention_heads(3);

        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }
}
