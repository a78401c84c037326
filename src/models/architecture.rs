use std::collections::HashMap;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    models::segment_bert::{config::NUM_SEGMENTS, SegmentBertConfig},
};

/// The name the segment-aware model is registered under
pub static MODEL_NAME: &str = "roberta_segment";

/// The base architecture
pub static ROBERTA_SEGMENT: &str = "roberta_segment";

/// Alias of the base architecture
pub static ROBERTA_SEGMENT_BASE: &str = "roberta_segment_base";

/// Fallback when neither `max_positions` nor `tokens_per_sample` are given
pub static DEFAULT_MAX_POSITIONS: usize = 512;

/// A function filling in the defaults of one registered architecture
pub type Architecture = fn(&mut ArchitectureArgs);

lazy_static! {
    /// Architectures registered for the segment-aware model
    pub static ref ARCHITECTURES: HashMap<&'static str, Architecture> = HashMap::from([
        (ROBERTA_SEGMENT, base_architecture as Architecture),
        (ROBERTA_SEGMENT_BASE, roberta_segment_base_architecture as Architecture),
    ]);
}

/// Raw hyperparameters as stored with a checkpoint. Every absent value takes the default of the
/// selected architecture.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchitectureArgs {
    /// Registered architecture name (defaults to `roberta_segment`)
    pub arch: Option<String>,
    /// Head kind the checkpoint was trained for (e.g. `dependency_parse`)
    pub task: Option<String>,
    /// Number of segment ids
    pub num_segments: Option<usize>,
    /// Number of encoder layers
    pub encoder_layers: Option<usize>,
    /// Encoder embedding dimension
    pub encoder_embed_dim: Option<usize>,
    /// Encoder embedding dimension for the FFN
    pub encoder_ffn_embed_dim: Option<usize>,
    /// Number of encoder attention heads
    pub encoder_attention_heads: Option<usize>,
    /// Activation function name
    pub activation_fn: Option<String>,
    /// Pooler activation function name
    pub pooler_activation_fn: Option<String>,
    /// Accepted for compatibility, the embedding layer norm is always applied
    pub encoder_normalize_before: Option<bool>,
    /// Dropout probability
    pub dropout: Option<f64>,
    /// Dropout probability for attention weights
    pub attention_dropout: Option<f64>,
    /// Dropout probability after activation in the FFN
    pub activation_dropout: Option<f64>,
    /// Dropout probability in the classification heads
    pub pooler_dropout: Option<f64>,
    /// Number of positional embeddings to learn
    pub max_positions: Option<usize>,
    /// Training sample length, used when `max_positions` is absent
    pub tokens_per_sample: Option<usize>,
    /// (Re-)register and load heads when loading checkpoints
    pub load_checkpoint_heads: Option<bool>,
    /// LayerDrop probability for the encoder
    pub encoder_layerdrop: Option<f64>,
    /// Which layers to keep when pruning, as a comma-separated list
    pub encoder_layers_to_keep: Option<String>,
}

/// Fill in the base architecture defaults
pub fn base_architecture(args: &mut ArchitectureArgs) {
    args.encoder_layers.get_or_insert(12);
    args.encoder_embed_dim.get_or_insert(768);
    args.encoder_ffn_embed_dim.get_or_insert(3072);
    args.encoder_attention_heads.get_or_insert(12);

    args.activation_fn.get_or_insert_with(|| "gelu".to_string());
    args.pooler_activation_fn
        .get_or_insert_with(|| "tanh".to_string());

    args.dropout.get_or_insert(0.1);
    args.attention_dropout.get_or_insert(0.1);
    args.activation_dropout.get_or_insert(0.0);
    args.pooler_dropout.get_or_insert(0.0);
    args.encoder_layerdrop.get_or_insert(0.0);
}

/// The `roberta_segment_base` alias
pub fn roberta_segment_base_architecture(args: &mut ArchitectureArgs) {
    base_architecture(args);
}

/// Parse a comma-separated list of layer indices
pub fn parse_layers_to_keep(spec: &str, layers: usize) -> Result<Vec<usize>> {
    let invalid = || Error::LayersToKeep {
        spec: spec.to_string(),
        layers,
    };

    let keep = spec
        .split(',')
        .map(|index| index.trim().parse::<usize>().map_err(|_| invalid()))
        .collect::<Result<Vec<_>>>()?;

    if keep.is_empty() || keep.iter().any(|&i| i >= layers) {
        return Err(invalid());
    }

    Ok(keep)
}

impl ArchitectureArgs {
    /// The architecture these arguments select
    pub fn arch_name(&self) -> &str {
        self.arch.as_deref().unwrap_or(ROBERTA_SEGMENT)
    }

    /// Apply the registered architecture defaults in place
    pub fn apply_architecture(&mut self) -> Result<()> {
        let arch = ARCHITECTURES
            .get(self.arch_name())
            .ok_or_else(|| Error::UnknownArchitecture(self.arch_name().to_string()))?;

        arch(self);

        Ok(())
    }

    /// Resolve the arguments into an immutable model configuration
    pub fn resolve(&self, vocab_size: usize, padding_idx: usize) -> Result<SegmentBertConfig> {
        let mut args = self.clone();
        args.apply_architecture()?;

        if args.max_positions.is_none() {
            args.max_positions = args.tokens_per_sample;
        }

        let encoder_layers = args.encoder_layers.unwrap_or(12);

        let encoder_layers_to_keep = args
            .encoder_layers_to_keep
            .as_deref()
            .map(|spec| parse_layers_to_keep(spec, encoder_layers))
            .transpose()?;

        let config = SegmentBertConfig::new(vocab_size, padding_idx)
            .with_num_segments(args.num_segments.unwrap_or(NUM_SEGMENTS))
            .with_encoder_layers(encoder_layers)
            .with_encoder_embed_dim(args.encoder_embed_dim.unwrap_or(768))
            .with_encoder_ffn_embed_dim(args.encoder_ffn_embed_dim.unwrap_or(3072))
            .with_encoder_attention_heads(args.encoder_attention_heads.unwrap_or(12))
            .with_activation_fn(args.activation_fn.as_deref().unwrap_or("gelu").parse()?)
            .with_pooler_activation_fn(
                args.pooler_activation_fn
                    .as_deref()
                    .unwrap_or("tanh")
                    .parse()?,
            )
            .with_dropout(args.dropout.unwrap_or(0.1))
            .with_attention_dropout(args.attention_dropout.unwrap_or(0.1))
            .with_activation_dropout(args.activation_dropout.unwrap_or(0.0))
            .with_pooler_dropout(args.pooler_dropout.unwrap_or(0.0))
            .with_max_positions(args.max_positions.unwrap_or(DEFAULT_MAX_POSITIONS))
            .with_encoder_layerdrop(args.encoder_layerdrop.unwrap_or(0.0))
            .with_load_checkpoint_heads(args.load_checkpoint_heads.unwrap_or(false))
            .with_encoder_layers_to_keep(encoder_layers_to_keep);

        config.validate()?;

        Ok(config)
    }

    /// Arguments that resolve back into `config`, for saving with a checkpoint. Layer pruning is
    /// assumed to have been applied already.
    pub fn from_config(config: &SegmentBertConfig, task: &str) -> Self {
        Self {
            arch: Some(ROBERTA_SEGMENT.to_string()),
            task: Some(task.to_string()),
            num_segments: Some(config.num_segments),
            encoder_layers: Some(config.encoder_layers),
            encoder_embed_dim: Some(config.encoder_embed_dim),
            encoder_ffn_embed_dim: Some(config.encoder_ffn_embed_dim),
            encoder_attention_heads: Some(config.encoder_attention_heads),
            activation_fn: Some(config.activation_fn.to_string()),
            pooler_activation_fn: Some(config.pooler_activation_fn.to_string()),
            encoder_normalize_before: None,
            dropout: Some(config.dropout),
            attention_dropout: Some(config.attention_dropout),
            activation_dropout: Some(config.activation_dropout),
            pooler_dropout: Some(config.pooler_dropout),
            max_positions: Some(config.max_positions),
            tokens_per_sample: None,
            load_checkpoint_heads: Some(config.load_checkpoint_heads),
            encoder_layerdrop: Some(config.encoder_layerdrop),
            encoder_layers_to_keep: None,
        }
    }
}
