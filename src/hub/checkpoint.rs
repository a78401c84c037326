use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use burn::{
    module::Module,
    record::{CompactRecorder, Recorder},
    tensor::backend::Backend,
};
use derive_new::new;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{
    models::{
        segment_bert::{
            heads::{HeadKind, HeadShape, MASKED_LM},
            state::StateDict,
        },
        ArchitectureArgs, SegmentBert, MODEL_NAME,
    },
    tasks::SegmentTask,
};

/// Architecture arguments, task kind and declared heads
pub static ARGS_FILE: &str = "args.json";

/// Encoder and LM head record, without the `.mpk` extension the recorder appends
pub static MODEL_FILE: &str = "model";

/// Head parameters
pub static HEADS_FILE: &str = "heads.json";

/// Optional Hugging Face tokenizer
pub static TOKENIZER_FILE: &str = "tokenizer.json";

/// The kind and shape a head was saved with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadSpec {
    /// `classification` or `dependency_parse`
    pub kind: String,
    /// Number of output classes (relation labels for dependency parsing heads)
    pub num_classes: usize,
    /// Width of the inner projection
    pub inner_dim: usize,
    /// Number of governor classes of a dependency parsing head
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_governors: Option<usize>,
}

/// The contents of `args.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckpointArgs {
    /// Raw hyperparameters
    #[serde(flatten)]
    pub args: ArchitectureArgs,

    /// Heads registered when the checkpoint was saved
    #[serde(default)]
    pub heads: BTreeMap<String, HeadSpec>,
}

/// Maps a model name and language to a local checkpoint directory
#[async_trait]
pub trait CheckpointResolver: Send + Sync {
    /// Resolve the checkpoint directory
    async fn resolve(&self, model_name: &str, lang: &str) -> anyhow::Result<PathBuf>;
}

/// Checkpoints stored under `<root>/<lang>/<model_name>`
#[derive(Debug, Clone, new)]
pub struct LocalCache {
    root: PathBuf,
}

#[async_trait]
impl CheckpointResolver for LocalCache {
    async fn resolve(&self, model_name: &str, lang: &str) -> anyhow::Result<PathBuf> {
        let dir = self.root.join(lang).join(model_name);

        if !tokio::fs::try_exists(&dir).await? {
            return Err(anyhow!(
                "No {} checkpoint found for {:?} at {}",
                MODEL_NAME,
                lang,
                dir.display()
            ));
        }

        Ok(dir)
    }
}

/// Load a task and its model from a checkpoint directory.
///
/// `overrides` may adjust the stored arguments before the model is built, e.g. to enable
/// `load_checkpoint_heads`.
pub async fn load<B: Backend>(
    dir: impl AsRef<Path>,
    overrides: impl FnOnce(&mut ArchitectureArgs),
    device: &B::Device,
) -> anyhow::Result<(SegmentTask, SegmentBert<B>)> {
    let dir = dir.as_ref();

    let contents = tokio::fs::read(dir.join(ARGS_FILE))
        .await
        .map_err(|e| anyhow!("Unable to read {}: {}", ARGS_FILE, e))?;
    let CheckpointArgs { mut args, heads } = serde_json::from_slice(&contents)
        .map_err(|e| anyhow!("Unable to parse {}: {}", ARGS_FILE, e))?;
    overrides(&mut args);

    let kind = HeadKind::try_from(args.task.as_deref().unwrap_or(MASKED_LM))?;
    let task = SegmentTask::load(dir, kind).await?;

    let mut model = task.build_model::<B>(&args, device)?;
    debug!("Resolved config: {}", model.config);

    info!("Loading weights from {}...", dir.display());

    let record = CompactRecorder::new()
        .load(dir.join(MODEL_FILE), device)
        .map_err(|e| anyhow!("Unable to load model weights: {}", e))?;
    model.encoder = model.encoder.load_record(record);

    let mut model = model.prune_layers()?;

    if model.config.load_checkpoint_heads {
        for (name, spec) in heads.iter() {
            match HeadKind::try_from(spec.kind.as_str())? {
                HeadKind::DependencyParse => {
                    let num_governors = match spec.num_governors {
                        Some(num_governors) => num_governors,
                        None => task.label0()?.num_classes(),
                    };

                    model.register_dependency_head(
                        name,
                        num_governors,
                        spec.num_classes,
                        Some(spec.inner_dim),
                    )
                }
                _ => model.register_classification_head(
                    name,
                    spec.num_classes,
                    Some(spec.inner_dim),
                ),
            };
        }

        let heads_path = dir.join(HEADS_FILE);
        let mut state = if tokio::fs::try_exists(&heads_path).await? {
            StateDict::load(&heads_path).await?
        } else {
            StateDict::default()
        };

        model.upgrade_state_dict_named(&mut state, "");
        model.load_heads(&state, "")?;

        info!("Loaded {} head(s)", model.classification_heads.len());
    }

    Ok((task, model))
}

/// Save a task and its model into a checkpoint directory, creating it if needed
pub async fn save<B: Backend>(
    dir: impl AsRef<Path>,
    task: &SegmentTask,
    model: &SegmentBert<B>,
) -> anyhow::Result<()> {
    let dir = dir.as_ref();
    tokio::fs::create_dir_all(dir).await?;

    let heads = model
        .classification_heads
        .iter()
        .map(|(name, head)| {
            let HeadShape {
                num_classes,
                inner_dim,
            } = head.shape();

            (
                name.clone(),
                HeadSpec {
                    kind: head.kind().to_string(),
                    num_classes,
                    inner_dim,
                    num_governors: head.num_governors(),
                },
            )
        })
        .collect();

    let args = CheckpointArgs {
        args: ArchitectureArgs::from_config(&model.config, &task.kind.to_string()),
        heads,
    };
    tokio::fs::write(dir.join(ARGS_FILE), serde_json::to_vec_pretty(&args)?).await?;

    task.save(dir).await?;

    CompactRecorder::new()
        .record(model.encoder.clone().into_record(), dir.join(MODEL_FILE))
        .map_err(|e| anyhow!("Unable to save model weights: {}", e))?;

    model.heads_state_dict("").save(dir.join(HEADS_FILE)).await?;

    info!("Saved checkpoint to {}", dir.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[tokio::test]
    async fn local_cache_resolves_by_language_and_name() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("ko").join("brainbert.base.ko.dp");
        tokio::fs::create_dir_all(&dir).await.unwrap();

        let cache = LocalCache::new(root.path().to_path_buf());

        assert_eq!(
            cache.resolve("brainbert.base.ko.dp", "ko").await.unwrap(),
            dir
        );
        assert!(cache.resolve("brainbert.base.ko.dp", "en").await.is_err());
    }

    #[test]
    fn args_flatten_the_architecture_arguments() {
        let args: CheckpointArgs = serde_json::from_str(
            r#"{
                "arch": "roberta_segment_base",
                "task": "dependency_parse",
                "encoder_layers": 6,
                "heads": {
                    "dependency_parse_head": {
                        "kind": "dependency_parse",
                        "num_classes": 30,
                        "inner_dim": 768,
                        "num_governors": 120
                    },
                    "sentiment": {
                        "kind": "classification",
                        "num_classes": 2,
                        "inner_dim": 768
                    }
                }
            }"#,
        )
        .unwrap();

        assert_eq!(args.args.arch_name(), "roberta_segment_base");
        assert_eq!(args.args.encoder_layers, Some(6));
        assert_eq!(args.heads["dependency_parse_head"].num_classes, 30);
        assert_eq!(args.heads["dependency_parse_head"].num_governors, Some(120));
        assert_eq!(args.heads["sentiment"].num_governors, None);

        let args: CheckpointArgs = serde_json::from_str("{}").unwrap();
        assert!(args.heads.is_empty());
    }
}
