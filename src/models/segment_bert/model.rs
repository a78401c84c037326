use burn::{
    module::Module,
    tensor::{backend::Backend, Bool, Int, Tensor},
};

use crate::error::{Error, Result};

use super::{
    encoder::SentenceEncoder,
    heads::{ClassificationHead, ClassificationHeads, DependencyParseHead, Head, Registration},
    lm_head::{LmHead, LmOutput},
    SegmentBertConfig,
};

/// The shared encoder and its language model head. This is the record stored in `model.mpk`.
#[derive(Module, Debug)]
pub struct SegmentEncoder<B: Backend> {
    /// Embeddings and transformer layers
    pub sentence_encoder: SentenceEncoder<B>,

    /// Masked language model head, tied to the token embeddings
    pub lm_head: LmHead<B>,
}

/// Output of [`SegmentBert::extract_features`]
#[derive(Debug, Clone)]
pub struct EncoderOutput<B: Backend> {
    /// Final layer hidden states `[batch_size, seq_length, embed_dim]`
    pub features: Tensor<B, 3>,

    /// The embedding output followed by every layer's output, when requested
    pub inner_states: Option<Vec<Tensor<B, 3>>>,
}

/// RoBERTa with part-of-speech segment embeddings and named task heads
#[derive(Clone)]
pub struct SegmentBert<B: Backend> {
    /// The resolved configuration the model was built from
    pub config: SegmentBertConfig,

    /// Shared encoder
    pub encoder: SegmentEncoder<B>,

    /// Named heads
    pub classification_heads: ClassificationHeads<B>,
}

impl<B: Backend> SegmentBert<B> {
    /// Maximum supported sequence length
    pub fn max_positions(&self) -> usize {
        self.encoder.sentence_encoder.max_positions()
    }

    /// Number of transformer layers currently in the encoder
    pub fn num_layers(&self) -> usize {
        self.encoder.sentence_encoder.num_layers()
    }

    /// Encode tokens and their segment ids, both `[batch_size, seq_length]`
    pub fn extract_features(
        &self,
        tokens: Tensor<B, 2, Int>,
        segments: Tensor<B, 2, Int>,
        return_all_hiddens: bool,
    ) -> Result<EncoderOutput<B>> {
        let states = self.encoder.sentence_encoder.forward(
            tokens,
            segments,
            self.config.activation_fn,
            !return_all_hiddens,
        )?;

        let Some(features) = states.last().cloned() else {
            return Err(Error::InvalidConfig(
                "encoder produced no hidden states".to_string(),
            ));
        };

        Ok(EncoderOutput {
            features,
            inner_states: return_all_hiddens.then_some(states),
        })
    }

    /// Vocabulary logits, optionally only at the `masked_tokens` positions
    pub fn lm_logits(
        &self,
        tokens: Tensor<B, 2, Int>,
        segments: Tensor<B, 2, Int>,
        masked_tokens: Option<Tensor<B, 2, Bool>>,
    ) -> Result<LmOutput<B>> {
        let EncoderOutput { features, .. } = self.extract_features(tokens, segments, false)?;
        let weight = self.encoder.sentence_encoder.embed_tokens.weight.val();

        Ok(self
            .encoder
            .lm_head
            .forward(features, weight, masked_tokens, self.config.activation_fn))
    }

    /// Logits `[batch_size, num_classes]` of the named classification head
    pub fn classify(
        &self,
        name: &str,
        tokens: Tensor<B, 2, Int>,
        segments: Tensor<B, 2, Int>,
    ) -> Result<Tensor<B, 2>> {
        let head = self.classification_heads.classification(name)?;
        let EncoderOutput { features, .. } = self.extract_features(tokens, segments, false)?;

        Ok(head.forward(features, self.config.pooler_activation_fn))
    }

    /// Governor and relation logits of the named dependency parsing head
    pub fn dependency_head(
        &self,
        name: &str,
        features: Tensor<B, 3>,
        mask_pad: Tensor<B, 2, Bool>,
    ) -> Result<(Tensor<B, 3>, Tensor<B, 3>)> {
        let head = self.classification_heads.dependency_parse(name)?;

        Ok(head.forward(features, mask_pad, self.config.pooler_activation_fn))
    }

    /// Register a classification head, replacing any head of the same name. `inner_dim`
    /// defaults to the encoder's embedding dimension.
    pub fn register_classification_head(
        &mut self,
        name: &str,
        num_classes: usize,
        inner_dim: Option<usize>,
    ) -> Registration {
        let embed_dim = self.config.encoder_embed_dim;
        let device = self.device();

        let head = ClassificationHead::new(
            embed_dim,
            inner_dim.unwrap_or(embed_dim),
            num_classes,
            self.config.pooler_dropout,
            &device,
        );

        self.classification_heads
            .register(name, Head::Classification(head))
    }

    /// Register a dependency parsing head predicting `num_governors` governor classes and
    /// `num_labels` relation labels
    pub fn register_dependency_head(
        &mut self,
        name: &str,
        num_governors: usize,
        num_labels: usize,
        inner_dim: Option<usize>,
    ) -> Registration {
        let embed_dim = self.config.encoder_embed_dim;
        let device = self.device();

        let head = DependencyParseHead::new(
            embed_dim,
            inner_dim.unwrap_or(embed_dim),
            num_governors,
            num_labels,
            self.config.pooler_dropout,
            &device,
        );

        self.classification_heads
            .register(name, Head::DependencyParse(head))
    }

    /// Drop every layer not listed in `encoder_layers_to_keep`. The configuration is updated so
    /// that it describes the pruned encoder.
    pub fn prune_layers(mut self) -> Result<Self> {
        let Some(keep) = self.config.encoder_layers_to_keep.take() else {
            return Ok(self);
        };

        self.encoder.sentence_encoder = self.encoder.sentence_encoder.retain_layers(&keep)?;
        self.config.encoder_layers = self.encoder.sentence_encoder.num_layers();

        Ok(self)
    }

    fn device(&self) -> B::Device {
        self.encoder.sentence_encoder.embed_tokens.weight.val().device()
    }
}
