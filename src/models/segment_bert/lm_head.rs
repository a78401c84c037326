use burn::{
    module::{Module, Param},
    nn::{LayerNorm, LayerNormConfig, Linear},
    tensor::{backend::Backend, Bool, Tensor},
};

use crate::utils::tensors;

use super::{activation::Activation, init};

/// Output of the masked language model head
#[derive(Debug, Clone)]
pub enum LmOutput<B: Backend> {
    /// Logits for every position: `[batch_size, seq_length, vocab_size]`
    Full(Tensor<B, 3>),

    /// Logits for the masked positions only, in row-major order: `[n_masked, vocab_size]`
    Masked(Tensor<B, 2>),
}

/// Projects hidden states back onto the vocabulary through the (tied) token embedding matrix
#[derive(Module, Debug)]
pub struct LmHead<B: Backend> {
    dense: Linear<B>,
    layer_norm: LayerNorm<B>,
    bias: Param<Tensor<B, 1>>,
}

impl<B: Backend> LmHead<B> {
    /// Build the head for a given hidden size and vocabulary
    pub fn new(embed_dim: usize, vocab_size: usize, device: &B::Device) -> Self {
        Self {
            dense: init::linear(embed_dim, embed_dim, device),
            layer_norm: LayerNormConfig::new(embed_dim).init(device),
            bias: Param::from_tensor(Tensor::zeros([vocab_size], device)),
        }
    }

    /// Project features to vocabulary logits.
    ///
    /// `weight` is the token embedding matrix `[vocab_size, embed_dim]`. When `masked_tokens` is
    /// given, only the positions where it is set are projected.
    pub fn forward(
        &self,
        features: Tensor<B, 3>,
        weight: Tensor<B, 2>,
        masked_tokens: Option<Tensor<B, 2, Bool>>,
        activation: Activation,
    ) -> LmOutput<B> {
        let [batch_size, seq_length, embed_dim] = features.dims();
        let flat = features.reshape([batch_size * seq_length, embed_dim]);

        match masked_tokens {
            None => {
                let logits = self.project(flat, weight, activation);
                let [_, vocab_size] = logits.dims();

                LmOutput::Full(logits.reshape([batch_size, seq_length, vocab_size]))
            }
            Some(mask) => {
                let positions = tensors::mask_positions(mask);
                let indices = tensors::ids_to_tensor(&positions, &flat.device());

                LmOutput::Masked(self.project(flat.select(0, indices), weight, activation))
            }
        }
    }

    fn project(&self, x: Tensor<B, 2>, weight: Tensor<B, 2>, activation: Activation) -> Tensor<B, 2> {
        let x = self.layer_norm.forward(activation.apply(self.dense.forward(x)));

        x.matmul(weight.transpose()) + self.bias.val().unsqueeze()
    }
}
