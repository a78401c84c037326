use burn::{
    module::Module,
    nn::{Dropout, DropoutConfig, Linear},
    tensor::{backend::Backend, Tensor},
};

use crate::{
    error::Result,
    models::segment_bert::{
        activation::Activation,
        init,
        state::{load_linear, save_linear, StateDict},
    },
};

/// Head for sentence-level classification tasks, pooling the first (`<s>`) position
#[derive(Module, Debug)]
pub struct ClassificationHead<B: Backend> {
    dense: Linear<B>,
    out_proj: Linear<B>,
    dropout: Dropout,
}

impl<B: Backend> ClassificationHead<B> {
    /// Build a head mapping `input_dim` features to `num_classes` logits
    pub fn new(
        input_dim: usize,
        inner_dim: usize,
        num_classes: usize,
        pooler_dropout: f64,
        device: &B::Device,
    ) -> Self {
        Self {
            dense: init::linear(input_dim, inner_dim, device),
            out_proj: init::linear(inner_dim, num_classes, device),
            dropout: DropoutConfig::new(pooler_dropout).init(),
        }
    }

    /// Width of the pooled projection
    pub fn inner_dim(&self) -> usize {
        self.dense.weight.val().dims()[1]
    }

    /// Number of output classes
    pub fn num_classes(&self) -> usize {
        self.out_proj.weight.val().dims()[1]
    }

    /// Logits `[batch_size, num_classes]` from features `[batch_size, seq_length, input_dim]`
    pub fn forward(&self, features: Tensor<B, 3>, activation: Activation) -> Tensor<B, 2> {
        let [batch_size, _seq_length, input_dim] = features.dims();

        let x = features
            .slice([0..batch_size, 0..1, 0..input_dim])
            .reshape([batch_size, input_dim]);
        let x = self.dense.forward(self.dropout.forward(x));
        let x = self.dropout.forward(activation.apply(x));

        self.out_proj.forward(x)
    }

    /// Append this head's parameters under `prefix`
    pub fn save_state(&self, prefix: &str, state: &mut StateDict) {
        save_linear(&format!("{prefix}dense."), &self.dense, state);
        save_linear(&format!("{prefix}out_proj."), &self.out_proj, state);
    }

    /// Replace this head's parameters with the ones stored under `prefix`
    pub fn load_state(self, prefix: &str, state: &StateDict) -> Result<Self> {
        Ok(Self {
            dense: load_linear(&format!("{prefix}dense."), &self.dense, state)?,
            out_proj: load_linear(&format!("{prefix}out_proj."), &self.out_proj, state)?,
            dropout: self.dropout,
        })
    }
}

#[cfg(test)]
mod tests {
    use burn::backend::NdArray;

    use super::*;

    type TestBackend = NdArray;

    #[test]
    fn pools_the_first_position() {
        let device = Default::default();
        let head = ClassificationHead::<TestBackend>::new(8, 6, 3, 0.0, &device);

        let features = Tensor::<TestBackend, 3>::zeros([2, 5, 8], &device);
        let logits = head.forward(features, Activation::Tanh);

        assert_eq!(logits.dims(), [2, 3]);
        assert_eq!(head.inner_dim(), 6);
        assert_eq!(head.num_classes(), 3);
    }

    #[test]
    fn only_the_first_position_matters() {
        let device = Default::default();
        let head = ClassificationHead::<TestBackend>::new(4, 4, 2, 0.0, &device);

        let first = Tensor::<TestBackend, 3>::random(
            [1, 1, 4],
            burn::tensor::Distribution::Default,
            &device,
        );
        let a = Tensor::cat(vec![first.clone(), Tensor::zeros([1, 3, 4], &device)], 1);
        let b = Tensor::cat(vec![first, Tensor::ones([1, 3, 4], &device)], 1);

        let diff = (head.forward(a, Activation::Tanh) - head.forward(b, Activation::Tanh))
            .abs()
            .sum()
            .into_scalar();
        assert_eq!(diff, 0.0);
    }
}
