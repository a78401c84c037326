use burn::{
    module::Module,
    nn::{
        attention::{MhaInput, MultiHeadAttention},
        Dropout, DropoutConfig, Embedding, LayerNorm, LayerNormConfig, Linear,
    },
    tensor::{backend::Backend, Bool, Int, Tensor},
};
use rand::Rng;

use crate::error::{Error, Result};

use super::{activation::Activation, init, SegmentBertConfig};

/// A post-norm transformer layer: self-attention and a position-wise feed-forward block, each
/// followed by a residual connection and layer normalization
#[derive(Module, Debug)]
pub struct EncoderLayer<B: Backend> {
    self_attn: MultiHeadAttention<B>,
    self_attn_layer_norm: LayerNorm<B>,
    fc1: Linear<B>,
    fc2: Linear<B>,
    final_layer_norm: LayerNorm<B>,
    dropout: Dropout,
    activation_dropout: Dropout,
}

impl<B: Backend> EncoderLayer<B> {
    /// Build a layer with BERT initialization
    pub fn new(config: &SegmentBertConfig, device: &B::Device) -> Self {
        let d_model = config.encoder_embed_dim;

        Self {
            self_attn: init::attention(
                d_model,
                config.encoder_attention_heads,
                config.attention_dropout,
                device,
            ),
            self_attn_layer_norm: LayerNormConfig::new(d_model)
                .with_epsilon(config.layer_norm_eps)
                .init(device),
            fc1: init::linear(d_model, config.encoder_ffn_embed_dim, device),
            fc2: init::linear(config.encoder_ffn_embed_dim, d_model, device),
            final_layer_norm: LayerNormConfig::new(d_model)
                .with_epsilon(config.layer_norm_eps)
                .init(device),
            dropout: DropoutConfig::new(config.dropout).init(),
            activation_dropout: DropoutConfig::new(config.activation_dropout).init(),
        }
    }

    /// Forward pass over batch-first hidden states `[batch_size, seq_length, d_model]`
    pub fn forward(
        &self,
        x: Tensor<B, 3>,
        mask_pad: Tensor<B, 2, Bool>,
        activation: Activation,
    ) -> Tensor<B, 3> {
        let residual = x.clone();
        let attended = self
            .self_attn
            .forward(MhaInput::self_attn(x).mask_pad(mask_pad))
            .context;
        let x = self
            .self_attn_layer_norm
            .forward(residual + self.dropout.forward(attended));

        let residual = x.clone();
        let hidden = activation.apply(self.fc1.forward(x));
        let hidden = self.fc2.forward(self.activation_dropout.forward(hidden));

        self.final_layer_norm
            .forward(residual + self.dropout.forward(hidden))
    }
}

/// Token, position and segment embeddings followed by a stack of transformer layers
#[derive(Module, Debug)]
pub struct SentenceEncoder<B: Backend> {
    /// Token embeddings, shared with the LM head projection
    pub embed_tokens: Embedding<B>,
    embed_positions: Embedding<B>,
    segment_embeddings: Embedding<B>,
    emb_layer_norm: LayerNorm<B>,
    dropout: Dropout,
    layers: Vec<EncoderLayer<B>>,
    padding_idx: usize,
    max_positions: usize,
    layerdrop: f64,
}

impl<B: Backend> SentenceEncoder<B> {
    /// Build the embeddings and `encoder_layers` transformer layers
    pub fn new(config: &SegmentBertConfig, device: &B::Device) -> Self {
        let d_model = config.encoder_embed_dim;
        let pad = config.padding_idx;

        // Positions are offset past the padding index, as in RoBERTa
        let n_positions = config.max_positions + pad + 1;

        let layers = (0..config.encoder_layers)
            .map(|_| EncoderLayer::new(config, device))
            .collect();

        Self {
            embed_tokens: init::embedding(config.vocab_size, d_model, Some(pad), device),
            embed_positions: init::embedding(n_positions, d_model, Some(pad), device),
            segment_embeddings: init::embedding(config.num_segments, d_model, None, device),
            emb_layer_norm: LayerNormConfig::new(d_model)
                .with_epsilon(config.layer_norm_eps)
                .init(device),
            dropout: DropoutConfig::new(config.dropout).init(),
            layers,
            padding_idx: pad,
            max_positions: config.max_positions,
            layerdrop: config.encoder_layerdrop,
        }
    }

    /// Number of transformer layers
    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    /// Maximum supported sequence length
    pub fn max_positions(&self) -> usize {
        self.max_positions
    }

    /// Keep only the listed layers, in index order
    pub fn retain_layers(mut self, keep: &[usize]) -> Result<Self> {
        let available = self.layers.len();

        if keep.is_empty() || keep.iter().any(|&i| i >= available) {
            return Err(Error::LayersToKeep {
                spec: keep
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(","),
                layers: available,
            });
        }

        self.layers = self
            .layers
            .into_iter()
            .enumerate()
            .filter(|(index, _)| keep.contains(index))
            .map(|(_, layer)| layer)
            .collect();

        Ok(self)
    }

    /// Run the encoder. Returns the hidden state of every layer (embedding output first) or, with
    /// `last_state_only`, a single-element list holding the final layer's output.
    pub fn forward(
        &self,
        tokens: Tensor<B, 2, Int>,
        segments: Tensor<B, 2, Int>,
        activation: Activation,
        last_state_only: bool,
    ) -> Result<Vec<Tensor<B, 3>>> {
        let [batch_size, seq_length] = tokens.dims();

        if seq_length > self.max_positions {
            return Err(Error::SequenceTooLong {
                len: seq_length,
                max: self.max_positions,
            });
        }

        if segments.dims() != tokens.dims() {
            return Err(Error::SegmentLength {
                tokens: tokens.dims(),
                segments: segments.dims(),
            });
        }

        let device = tokens.device();
        let pad = self.padding_idx as i64;

        let mask_pad = tokens.clone().equal_elem(pad);

        let positions = Tensor::<B, 1, Int>::arange(0..seq_length as i64, &device)
            .add_scalar(pad + 1)
            .reshape([1, seq_length])
            .repeat(0, batch_size)
            .mask_fill(mask_pad.clone(), pad);

        let x = self.embed_tokens.forward(tokens)
            + self.embed_positions.forward(positions)
            + self.segment_embeddings.forward(segments);
        let x = self.dropout.forward(self.emb_layer_norm.forward(x));

        let [_, _, d_model] = x.dims();
        let mask_hidden = mask_pad
            .clone()
            .reshape([batch_size, seq_length, 1])
            .repeat(2, d_model);
        let mut x = x.mask_fill(mask_hidden, 0.0);

        let mut inner_states = Vec::with_capacity(self.layers.len() + 1);
        if !last_state_only {
            inner_states.push(x.clone());
        }

        let mut rng = rand::thread_rng();
        for layer in &self.layers {
            // LayerDrop only applies while gradients are tracked
            if B::ad_enabled() && self.layerdrop > 0.0 && rng.gen::<f64>() < self.layerdrop {
                continue;
            }

            x = layer.forward(x, mask_pad.clone(), activation);

            if !last_state_only {
                inner_states.push(x.clone());
            }
        }

        if last_state_only {
            inner_states.push(x);
        }

        Ok(inner_states)
    }
}
