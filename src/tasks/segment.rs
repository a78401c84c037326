use std::path::Path;

use burn::tensor::backend::Backend;
use log::info;

use crate::{
    error::{Error, Result},
    models::{
        segment_bert::heads::{HeadKind, DEPENDENCY_PARSE_HEAD},
        ArchitectureArgs, SegmentBert,
    },
    utils::files::read_optional_file,
};

use super::dictionary::Dictionary;

/// Source vocabulary file
pub static SOURCE_DICT: &str = "dict.txt";

/// Segment (part-of-speech) vocabulary file
pub static POS_DICT: &str = "dict.pos.txt";

/// Governor label file
pub static LABEL0_DICT: &str = "dict.label0.txt";

/// Relation label file
pub static LABEL1_DICT: &str = "dict.label1.txt";

/// The dictionaries a segment-aware model is trained with, and the head kind it targets
#[derive(Debug, Clone)]
pub struct SegmentTask {
    /// The head kind the task trains
    pub kind: HeadKind,

    /// Token vocabulary
    pub source_dictionary: Dictionary,

    /// Segment vocabulary
    pub pos_dictionary: Dictionary,

    /// Governor labels, for dependency parsing
    pub label0_dictionary: Option<Dictionary>,

    /// Relation labels, for dependency parsing
    pub label1_dictionary: Option<Dictionary>,
}

impl SegmentTask {
    /// A task over the given source and segment dictionaries with no label dictionaries
    pub fn new(kind: HeadKind, source_dictionary: Dictionary, pos_dictionary: Dictionary) -> Self {
        Self {
            kind,
            source_dictionary,
            pos_dictionary,
            label0_dictionary: None,
            label1_dictionary: None,
        }
    }

    /// Attach the governor and relation label dictionaries
    pub fn with_labels(mut self, label0: Dictionary, label1: Dictionary) -> Self {
        self.label0_dictionary = Some(label0);
        self.label1_dictionary = Some(label1);
        self
    }

    /// Load the dictionaries from a checkpoint directory. The label dictionaries are optional.
    pub async fn load(dir: impl AsRef<Path>, kind: HeadKind) -> Result<Self> {
        let dir = dir.as_ref();

        let source_dictionary = Dictionary::load(dir.join(SOURCE_DICT)).await?;
        let pos_dictionary = Dictionary::load(dir.join(POS_DICT)).await?;

        let label0_dictionary = load_optional(&dir.join(LABEL0_DICT)).await?;
        let label1_dictionary = load_optional(&dir.join(LABEL1_DICT)).await?;

        info!(
            "[{}] dictionary: {} types, [{}] dictionary: {} types",
            SOURCE_DICT,
            source_dictionary.len(),
            POS_DICT,
            pos_dictionary.len()
        );

        Ok(Self {
            kind,
            source_dictionary,
            pos_dictionary,
            label0_dictionary,
            label1_dictionary,
        })
    }

    /// Save every dictionary into a checkpoint directory
    pub async fn save(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();

        self.source_dictionary.save(dir.join(SOURCE_DICT)).await?;
        self.pos_dictionary.save(dir.join(POS_DICT)).await?;

        if let Some(label0) = &self.label0_dictionary {
            label0.save(dir.join(LABEL0_DICT)).await?;
        }
        if let Some(label1) = &self.label1_dictionary {
            label1.save(dir.join(LABEL1_DICT)).await?;
        }

        Ok(())
    }

    /// The governor label dictionary
    pub fn label0(&self) -> Result<&Dictionary> {
        self.label0_dictionary
            .as_ref()
            .ok_or(Error::MissingDictionary("label0"))
    }

    /// The relation label dictionary
    pub fn label1(&self) -> Result<&Dictionary> {
        self.label1_dictionary
            .as_ref()
            .ok_or(Error::MissingDictionary("label1"))
    }

    /// Build a freshly initialized model sized to this task's dictionaries. Dependency parsing
    /// tasks also get their parsing head.
    pub fn build_model<B: Backend>(
        &self,
        args: &ArchitectureArgs,
        device: &B::Device,
    ) -> Result<SegmentBert<B>> {
        let config = args.resolve(self.source_dictionary.len(), self.source_dictionary.pad())?;
        let mut model = config.init(device);

        if self.kind == HeadKind::DependencyParse {
            let num_governors = self.label0()?.num_classes();
            let num_labels = self.label1()?.num_classes();
            model.register_dependency_head(
                DEPENDENCY_PARSE_HEAD,
                num_governors,
                num_labels,
                None,
            );
        }

        Ok(model)
    }
}

async fn load_optional(path: &Path) -> Result<Option<Dictionary>> {
    match read_optional_file(path).await? {
        Some(lines) => Ok(Some(Dictionary::parse(&lines)?)),
        None => Ok(None),
    }
}
