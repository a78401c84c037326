use burn::{
    module::Module,
    nn::{Dropout, DropoutConfig, Linear},
    tensor::{backend::Backend, Bool, Tensor},
};

use crate::{
    error::Result,
    models::segment_bert::{
        activation::Activation,
        init,
        state::{load_linear, save_linear, StateDict},
    },
};

/// Dependency parsing head.
///
/// For every token it predicts a governor class and a relation label. Both are class indices
/// over the regular entries of the task's label dictionaries (label0 for governors, label1 for
/// relations).
#[derive(Module, Debug)]
pub struct DependencyParseHead<B: Backend> {
    governor_dense: Linear<B>,
    governor_out: Linear<B>,
    label_dense: Linear<B>,
    label_out: Linear<B>,
    dropout: Dropout,
}

impl<B: Backend> DependencyParseHead<B> {
    /// Build a head over `input_dim` features predicting `num_governors` governor classes and
    /// `num_labels` relation labels
    pub fn new(
        input_dim: usize,
        inner_dim: usize,
        num_governors: usize,
        num_labels: usize,
        pooler_dropout: f64,
        device: &B::Device,
    ) -> Self {
        Self {
            governor_dense: init::linear(input_dim, inner_dim, device),
            governor_out: init::linear(inner_dim, num_governors, device),
            label_dense: init::linear(input_dim, inner_dim, device),
            label_out: init::linear(inner_dim, num_labels, device),
            dropout: DropoutConfig::new(pooler_dropout).init(),
        }
    }

    /// Width of the governor and label projections
    pub fn inner_dim(&self) -> usize {
        self.label_dense.weight.val().dims()[1]
    }

    /// Number of governor classes
    pub fn num_governors(&self) -> usize {
        self.governor_out.weight.val().dims()[1]
    }

    /// Number of relation labels
    pub fn num_classes(&self) -> usize {
        self.label_out.weight.val().dims()[1]
    }

    /// Returns governor logits `[batch_size, seq_length, num_governors]` and relation logits
    /// `[batch_size, seq_length, num_labels]`. `mask_pad` marks padding positions, whose
    /// features are zeroed before scoring.
    pub fn forward(
        &self,
        features: Tensor<B, 3>,
        mask_pad: Tensor<B, 2, Bool>,
        activation: Activation,
    ) -> (Tensor<B, 3>, Tensor<B, 3>) {
        let [batch_size, seq_length, d_model] = features.dims();

        let mask = mask_pad
            .reshape([batch_size, seq_length, 1])
            .repeat(2, d_model);
        let x = self.dropout.forward(features.mask_fill(mask, 0.0));

        let governors = self
            .dropout
            .forward(activation.apply(self.governor_dense.forward(x.clone())));
        let governors = self.governor_out.forward(governors);

        let labels = self
            .dropout
            .forward(activation.apply(self.label_dense.forward(x)));
        let labels = self.label_out.forward(labels);

        (governors, labels)
    }

    /// Append this head's parameters under `prefix`
    pub fn save_state(&self, prefix: &str, state: &mut StateDict) {
        save_linear(&format!("{prefix}governor_dense."), &self.governor_dense, state);
        save_linear(&format!("{prefix}governor_out."), &self.governor_out, state);
        save_linear(&format!("{prefix}label_dense."), &self.label_dense, state);
        save_linear(&format!("{prefix}label_out."), &self.label_out, state);
    }

    /// Replace this head's parameters with the ones stored under `prefix`
    pub fn load_state(self, prefix: &str, state: &StateDict) -> Result<Self> {
        Ok(Self {
            governor_dense: load_linear(
                &format!("{prefix}governor_dense."),
                &self.governor_dense,
                state,
            )?,
            governor_out: load_linear(&format!("{prefix}governor_out."), &self.governor_out, state)?,
            label_dense: load_linear(&format!("{prefix}label_dense."), &self.label_dense, state)?,
            label_out: load_linear(&format!("{prefix}label_out."), &self.label_out, state)?,
            dropout: self.dropout,
        })
    }
}
