use std::path::Path;

use burn::tensor::{activation::log_softmax, backend::Backend, Tensor};
use log::info;

use crate::{
    error::Error,
    models::segment_bert::{
        heads::{Registration, DEPENDENCY_PARSE_HEAD},
        EncoderOutput, SegmentBert,
    },
    tasks::{
        dictionary::{BOS, EOS},
        SegmentTask,
    },
    utils::tensors,
};

use super::{
    bpe::{Bpe, TokenizerBpe, WhitespaceBpe},
    checkpoint::{self, CheckpointResolver, TOKENIZER_FILE},
};

/// Hidden states returned by [`SegmentBertHub::extract_features`]
#[derive(Debug, Clone)]
pub enum Features<B: Backend> {
    /// The final layer only: `[1, seq_length, embed_dim]`
    Last(Tensor<B, 3>),

    /// The embedding output followed by every layer's output
    All(Vec<Tensor<B, 3>>),
}

/// Inference facade over a loaded task and model
pub struct SegmentBertHub<B: Backend> {
    /// The dictionaries the model was trained with
    pub task: SegmentTask,

    /// The model, with its heads
    pub model: SegmentBert<B>,

    bpe: Box<dyn Bpe>,
    device: B::Device,
}

impl<B: Backend> SegmentBertHub<B> {
    /// Wrap an already loaded task and model
    pub fn new(
        task: SegmentTask,
        model: SegmentBert<B>,
        bpe: Box<dyn Bpe>,
        device: B::Device,
    ) -> Self {
        Self {
            task,
            model,
            bpe,
            device,
        }
    }

    /// Load a checkpoint directory, including every head it was saved with
    pub async fn from_pretrained(dir: impl AsRef<Path>, device: B::Device) -> anyhow::Result<Self> {
        let dir = dir.as_ref();

        let (task, model) = checkpoint::load::<B>(
            dir,
            |args| args.load_checkpoint_heads = Some(true),
            &device,
        )
        .await?;

        let tokenizer_path = dir.join(TOKENIZER_FILE);
        let bpe: Box<dyn Bpe> = if tokio::fs::try_exists(&tokenizer_path).await? {
            Box::new(TokenizerBpe::from_file(&tokenizer_path)?)
        } else {
            info!("No {} found, splitting on whitespace", TOKENIZER_FILE);
            Box::new(WhitespaceBpe)
        };

        Ok(Self::new(task, model, bpe, device))
    }

    /// Resolve a named checkpoint for a language and load it
    pub async fn load_model(
        model_name: &str,
        lang: &str,
        resolver: &dyn CheckpointResolver,
        device: B::Device,
    ) -> anyhow::Result<Self> {
        let dir = resolver.resolve(model_name, lang).await?;

        Self::from_pretrained(dir, device).await
    }

    /// The device the model runs on
    pub fn device(&self) -> &B::Device {
        &self.device
    }

    /// BPE-encode a sentence, wrapped in `<s> ... </s>` when `add_special_tokens` is set
    pub fn tokenize(&self, sentence: &str, add_special_tokens: bool) -> anyhow::Result<String> {
        let bpe = self.bpe.encode(sentence)?;

        if add_special_tokens {
            Ok(format!("{BOS} {bpe} {EOS}"))
        } else {
            Ok(bpe)
        }
    }

    /// BPE-encode a sentence and any auxiliary sentences, then map them to source ids.
    ///
    /// With special tokens every auxiliary sentence is preceded by an extra `</s>` separator
    /// (unless `no_separator` is set) and closed with `</s>`. Without special tokens the auxiliary
    /// sentences are still appended, space separated and with no `</s>`. Unknown symbols map to
    /// `<unk>`.
    pub fn encode(
        &self,
        sentence: &str,
        addl_sentences: &[&str],
        add_special_tokens: bool,
        no_separator: bool,
    ) -> anyhow::Result<Vec<usize>> {
        let mut bpe_sentence = self.tokenize(sentence, add_special_tokens)?;

        for addl in addl_sentences {
            if add_special_tokens && !no_separator {
                bpe_sentence.push_str(&format!(" {EOS}"));
            }

            bpe_sentence.push(' ');
            bpe_sentence.push_str(&self.tokenize(addl, false)?);

            if add_special_tokens {
                bpe_sentence.push_str(&format!(" {EOS}"));
            }
        }

        Ok(self
            .task
            .source_dictionary
            .encode_line(&bpe_sentence, false))
    }

    /// Turn source ids back into text, one string per `</s>`-separated sentence
    pub fn decode(&self, tokens: &[usize]) -> anyhow::Result<Vec<String>> {
        let dictionary = &self.task.source_dictionary;

        let tokens = match tokens.first() {
            Some(&first) if first == dictionary.bos() => &tokens[1..],
            _ => tokens,
        };

        tokens
            .split(|&id| id == dictionary.eos())
            .filter(|sentence| !sentence.is_empty())
            .map(|sentence| self.bpe.decode(&dictionary.string(sentence, true)))
            .collect()
    }

    /// Encode a single sequence of source ids and their segment ids
    pub fn extract_features(
        &self,
        tokens: &[usize],
        segments: &[usize],
        return_all_hiddens: bool,
    ) -> anyhow::Result<Features<B>> {
        let max = self.model.max_positions();
        if tokens.len() > max {
            return Err(Error::SequenceTooLong {
                len: tokens.len(),
                max,
            }
            .into());
        }

        let EncoderOutput {
            features,
            inner_states,
        } = self.model.extract_features(
            tensors::ids_to_batch(tokens, &self.device),
            tensors::ids_to_batch(segments, &self.device),
            return_all_hiddens,
        )?;

        Ok(match inner_states {
            Some(states) => Features::All(states),
            None => Features::Last(features),
        })
    }

    /// Class scores `[1, num_classes]` of the named head: raw logits, or log-probabilities
    pub fn predict(
        &self,
        head: &str,
        tokens: &[usize],
        segments: &[usize],
        return_logits: bool,
    ) -> anyhow::Result<Tensor<B, 2>> {
        let logits = self.model.classify(
            head,
            tensors::ids_to_batch(tokens, &self.device),
            tensors::ids_to_batch(segments, &self.device),
        )?;

        if return_logits {
            Ok(logits)
        } else {
            Ok(log_softmax(logits, 1))
        }
    }

    /// Parse a sentence given as tokens and their part-of-speech tags.
    ///
    /// Returns the governor and the relation label of every input token.
    pub fn predict_dependency<S: AsRef<str>>(
        &self,
        tokens: &[S],
        segments: &[S],
    ) -> anyhow::Result<(Vec<String>, Vec<String>)> {
        let source = &self.task.source_dictionary;
        let pos = &self.task.pos_dictionary;
        let label0 = self.task.label0()?;
        let label1 = self.task.label1()?;

        let tokens = bracket(tokens);
        let segments = bracket(segments);

        let length = tokens.len();
        let max = self.model.max_positions();

        if length > max {
            return Err(Error::SequenceTooLong { len: length, max }.into());
        }
        if segments.len() != length {
            return Err(Error::SegmentLength {
                tokens: [1, length],
                segments: [1, segments.len()],
            }
            .into());
        }

        let token_ids = tokens.iter().map(|t| source.index(t)).collect::<Vec<_>>();
        let segment_ids = segments.iter().map(|s| pos.index(s)).collect::<Vec<_>>();

        let token_ids = tensors::pad_to::<B>(source.pad(), vec![token_ids], max, &self.device);
        let segment_ids = tensors::pad_to::<B>(pos.pad(), vec![segment_ids], max, &self.device);

        let mask_pad = token_ids.clone().equal_elem(source.pad() as i64);

        let EncoderOutput { features, .. } =
            self.model.extract_features(token_ids, segment_ids, false)?;
        let (governors, labels) = self
            .model
            .dependency_head(DEPENDENCY_PARSE_HEAD, features, mask_pad)?;

        let governors = tensors::to_indices(governors.argmax(2));
        let relations = tensors::to_indices(labels.argmax(2));

        // Drop the `<s>` and `</s>` positions
        let inner = 1..length - 1;

        Ok((
            governors[inner.clone()]
                .iter()
                .map(|&g| label0.decode_class(g))
                .collect(),
            relations[inner]
                .iter()
                .map(|&r| label1.decode_class(r))
                .collect(),
        ))
    }

    /// Register a classification head on the wrapped model
    pub fn register_classification_head(
        &mut self,
        name: &str,
        num_classes: usize,
        inner_dim: Option<usize>,
    ) -> Registration {
        self.model
            .register_classification_head(name, num_classes, inner_dim)
    }
}

/// Wrap a sentence in `<s> ... </s>`
fn bracket<S: AsRef<str>>(items: &[S]) -> Vec<&str> {
    let mut bracketed = Vec::with_capacity(items.len() + 2);
    bracketed.push(BOS);
    bracketed.extend(items.iter().map(AsRef::as_ref));
    bracketed.push(EOS);

    bracketed
}
