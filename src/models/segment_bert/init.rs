//! BERT's weight initialization: normal(0, 0.02) weights, zero biases and zeroed padding rows.
//! Applied once while the modules are constructed.

use burn::{
    module::{Module, Param},
    nn::{
        attention::{MultiHeadAttention, MultiHeadAttentionConfig},
        Embedding, EmbeddingConfig, Initializer, Linear, LinearConfig,
    },
    tensor::{backend::Backend, Tensor},
};

/// Standard deviation of the normal initializer
pub const INIT_STD: f64 = 0.02;

/// The initializer used for every weight matrix
pub fn initializer() -> Initializer {
    Initializer::Normal {
        mean: 0.0,
        std: INIT_STD,
    }
}

/// A linear layer with normal weights and a zero bias
pub fn linear<B: Backend>(d_input: usize, d_output: usize, device: &B::Device) -> Linear<B> {
    let linear = LinearConfig::new(d_input, d_output)
        .with_initializer(initializer())
        .init(device);

    Linear {
        weight: linear.weight,
        bias: Some(Param::from_tensor(Tensor::zeros([d_output], device))),
    }
}

/// Self-attention with normal projection weights and zero projection biases
pub fn attention<B: Backend>(
    d_model: usize,
    n_heads: usize,
    dropout: f64,
    device: &B::Device,
) -> MultiHeadAttention<B> {
    let attention = MultiHeadAttentionConfig::new(d_model, n_heads)
        .with_dropout(dropout)
        .with_initializer(initializer())
        .init(device);

    // The initializer also draws the projection biases
    let mut record = attention.clone().into_record();
    for projection in [
        &mut record.query,
        &mut record.key,
        &mut record.value,
        &mut record.output,
    ] {
        if projection.bias.is_some() {
            projection.bias = Some(Param::from_tensor(Tensor::zeros([d_model], device)));
        }
    }

    attention.load_record(record)
}

/// An embedding table with normal weights, optionally zeroing the padding row
pub fn embedding<B: Backend>(
    n_embedding: usize,
    d_model: usize,
    padding_idx: Option<usize>,
    device: &B::Device,
) -> Embedding<B> {
    let embedding = EmbeddingConfig::new(n_embedding, d_model)
        .with_initializer(initializer())
        .init(device);

    match padding_idx {
        Some(pad) if pad < n_embedding => {
            let weight = embedding.weight.val().slice_assign(
                [pad..pad + 1, 0..d_model],
                Tensor::zeros([1, d_model], device),
            );

            Embedding {
                weight: Param::from_tensor(weight),
            }
        }
        _ => embedding,
    }
}
