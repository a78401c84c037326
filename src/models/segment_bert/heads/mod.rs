use std::{
    collections::BTreeMap,
    fmt::Display,
    ops::{Deref, DerefMut},
};

use burn::tensor::backend::Backend;
use log::warn;

use crate::error::{Error, Result};

use super::state::StateDict;

/// Sentence classification head
pub mod classification;

/// Dependency parsing head
pub mod dependency;

pub use classification::ClassificationHead;
pub use dependency::DependencyParseHead;

/// The name the dependency parsing head is registered under
pub static DEPENDENCY_PARSE_HEAD: &str = "dependency_parse_head";

/// The unique string token selecting the masked language model head
pub static MASKED_LM: &str = "masked_lm";

/// The unique string token selecting a classification head
pub static CLASSIFICATION: &str = "classification";

/// The unique string token selecting the dependency parsing head
pub static DEPENDENCY_PARSE: &str = "dependency_parse";

/// Available head types
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum HeadKind {
    /// Vocabulary logits from the LM head
    MaskedLm,
    /// Pooled sentence classification
    Classification,
    /// Governor and relation prediction per token
    DependencyParse,
}

impl TryFrom<&str> for HeadKind {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        match value {
            v if v == MASKED_LM => Ok(HeadKind::MaskedLm),
            v if v == CLASSIFICATION => Ok(HeadKind::Classification),
            v if v == DEPENDENCY_PARSE => Ok(HeadKind::DependencyParse),
            _ => Err(Error::UnknownHeadKind(value.to_string())),
        }
    }
}

impl Display for HeadKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            HeadKind::MaskedLm => MASKED_LM,
            HeadKind::Classification => CLASSIFICATION,
            HeadKind::DependencyParse => DEPENDENCY_PARSE,
        };

        write!(f, "{}", name)
    }
}

/// The shape parameters compared when a head is re-registered
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct HeadShape {
    /// Number of output classes
    pub num_classes: usize,
    /// Width of the inner projection
    pub inner_dim: usize,
}

/// A registered head
#[derive(Debug, Clone)]
pub enum Head<B: Backend> {
    /// Sentence classification
    Classification(ClassificationHead<B>),
    /// Dependency parsing
    DependencyParse(DependencyParseHead<B>),
}

impl<B: Backend> Head<B> {
    /// Which kind of head this is
    pub fn kind(&self) -> HeadKind {
        match self {
            Head::Classification(_) => HeadKind::Classification,
            Head::DependencyParse(_) => HeadKind::DependencyParse,
        }
    }

    /// The head's shape parameters
    pub fn shape(&self) -> HeadShape {
        match self {
            Head::Classification(head) => HeadShape {
                num_classes: head.num_classes(),
                inner_dim: head.inner_dim(),
            },
            Head::DependencyParse(head) => HeadShape {
                num_classes: head.num_classes(),
                inner_dim: head.inner_dim(),
            },
        }
    }

    /// Number of governor classes, for dependency parsing heads
    pub fn num_governors(&self) -> Option<usize> {
        match self {
            Head::Classification(_) => None,
            Head::DependencyParse(head) => Some(head.num_governors()),
        }
    }

    /// Append the head's parameters under `prefix`
    pub fn save_state(&self, prefix: &str, state: &mut StateDict) {
        match self {
            Head::Classification(head) => head.save_state(prefix, state),
            Head::DependencyParse(head) => head.save_state(prefix, state),
        }
    }

    /// Load the head's parameters stored under `prefix`
    pub fn load_state(self, prefix: &str, state: &StateDict) -> Result<Self> {
        Ok(match self {
            Head::Classification(head) => Head::Classification(head.load_state(prefix, state)?),
            Head::DependencyParse(head) => Head::DependencyParse(head.load_state(prefix, state)?),
        })
    }
}

/// What happened when a head was registered
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Registration {
    /// No head existed under that name
    New,
    /// A head with the same shape was replaced
    Replaced,
    /// A head with a different shape was replaced (a warning was logged)
    Reshaped {
        /// Shape of the replaced head
        previous: HeadShape,
        /// Shape of the new head
        current: HeadShape,
    },
}

/// Heads attached to the shared encoder, by name. At most one head exists per name.
#[derive(Debug, Clone)]
pub struct ClassificationHeads<B: Backend>(BTreeMap<String, Head<B>>);

impl<B: Backend> Default for ClassificationHeads<B> {
    fn default() -> Self {
        Self(BTreeMap::new())
    }
}

impl<B: Backend> Deref for ClassificationHeads<B> {
    type Target = BTreeMap<String, Head<B>>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<B: Backend> DerefMut for ClassificationHeads<B> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<B: Backend> ClassificationHeads<B> {
    /// Register a head, replacing any head of the same name
    pub fn register(&mut self, name: &str, head: Head<B>) -> Registration {
        let current = head.shape();

        let registration = match self.0.insert(name.to_string(), head) {
            None => Registration::New,
            Some(previous) if previous.shape() == current => Registration::Replaced,
            Some(previous) => Registration::Reshaped {
                previous: previous.shape(),
                current,
            },
        };

        if let Registration::Reshaped { previous, current } = registration {
            warn!(
                "re-registering head \"{}\" with num_classes {} (prev: {}) and inner_dim {} (prev: {})",
                name, current.num_classes, previous.num_classes, current.inner_dim, previous.inner_dim
            );
        }

        registration
    }

    /// Look up a head by name
    pub fn head(&self, name: &str) -> Result<&Head<B>> {
        self.0
            .get(name)
            .ok_or_else(|| Error::UnknownHead(name.to_string()))
    }

    /// Look up a classification head by name
    pub fn classification(&self, name: &str) -> Result<&ClassificationHead<B>> {
        match self.head(name)? {
            Head::Classification(head) => Ok(head),
            _ => Err(Error::HeadKind {
                name: name.to_string(),
                expected: CLASSIFICATION.to_string(),
            }),
        }
    }

    /// Look up a dependency parsing head by name
    pub fn dependency_parse(&self, name: &str) -> Result<&DependencyParseHead<B>> {
        match self.head(name)? {
            Head::DependencyParse(head) => Ok(head),
            _ => Err(Error::HeadKind {
                name: name.to_string(),
                expected: DEPENDENCY_PARSE.to_string(),
            }),
        }
    }

    /// Every head's parameters, keyed `<head name>.<parameter>` under `prefix`
    pub fn save_state(&self, prefix: &str, state: &mut StateDict) {
        for (name, head) in self.0.iter() {
            head.save_state(&format!("{prefix}{name}."), state);
        }
    }

    /// Load every registered head from the parameters stored under `prefix`
    pub fn load_state(&mut self, prefix: &str, state: &StateDict) -> Result<()> {
        let loaded = self
            .0
            .iter()
            .map(|(name, head)| {
                let head = head.clone().load_state(&format!("{prefix}{name}."), state)?;
                Ok((name.clone(), head))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;

        self.0 = loaded;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Mutex, Once};

    use burn::backend::NdArray;
    use log::{Level, LevelFilter, Log, Metadata, Record};
    use pretty_assertions::assert_eq;

    use super::*;

    type TestBackend = NdArray;

    /// Keeps every warning logged by this test binary
    struct WarningLog;

    static WARNINGS: Mutex<Vec<String>> = Mutex::new(Vec::new());
    static LOGGER: WarningLog = WarningLog;
    static INIT_LOGGER: Once = Once::new();

    impl Log for WarningLog {
        fn enabled(&self, metadata: &Metadata) -> bool {
            metadata.level() <= Level::Warn
        }

        fn log(&self, record: &Record) {
            if self.enabled(record.metadata()) {
                WARNINGS.lock().unwrap().push(record.args().to_string());
            }
        }

        fn flush(&self) {}
    }

    fn capture_warnings() {
        INIT_LOGGER.call_once(|| {
            log::set_logger(&LOGGER).unwrap();
            log::set_max_level(LevelFilter::Warn);
        });
    }

    /// Warnings naming the given head. Tests run concurrently, so each uses its own head name.
    fn warnings_for(name: &str) -> Vec<String> {
        let needle = format!("\"{name}\"");

        WARNINGS
            .lock()
            .unwrap()
            .iter()
            .filter(|message| message.contains(&needle))
            .cloned()
            .collect()
    }

    fn classification(inner_dim: usize, num_classes: usize) -> Head<TestBackend> {
        Head::Classification(ClassificationHead::new(
            8,
            inner_dim,
            num_classes,
            0.0,
            &Default::default(),
        ))
    }

    #[test]
    fn head_kinds_round_trip_through_strings() {
        for kind in [
            HeadKind::MaskedLm,
            HeadKind::Classification,
            HeadKind::DependencyParse,
        ] {
            assert_eq!(HeadKind::try_from(kind.to_string().as_str()).unwrap(), kind);
        }
        assert!(HeadKind::try_from("ner").is_err());
    }

    #[test]
    fn same_shape_replaces_without_warning() {
        capture_warnings();
        let mut heads = ClassificationHeads::<TestBackend>::default();

        assert_eq!(heads.register("politeness", classification(8, 2)), Registration::New);
        assert_eq!(
            heads.register("politeness", classification(8, 2)),
            Registration::Replaced
        );
        assert_eq!(heads.len(), 1);
        assert!(warnings_for("politeness").is_empty());
    }

    #[test]
    fn different_shape_warns_once_and_replaces() {
        capture_warnings();
        let mut heads = ClassificationHeads::<TestBackend>::default();
        heads.register("stance", classification(8, 2));

        let registration = heads.register("stance", classification(4, 3));

        assert_eq!(
            warnings_for("stance"),
            vec![
                "re-registering head \"stance\" with num_classes 3 (prev: 2) and inner_dim 4 (prev: 8)"
                    .to_string()
            ]
        );

        assert_eq!(
            registration,
            Registration::Reshaped {
                previous: HeadShape {
                    num_classes: 2,
                    inner_dim: 8
                },
                current: HeadShape {
                    num_classes: 3,
                    inner_dim: 4
                },
            }
        );
        assert_eq!(heads.len(), 1);
        assert_eq!(
            heads.head("stance").unwrap().shape(),
            HeadShape {
                num_classes: 3,
                inner_dim: 4
            }
        );
    }

    #[test]
    fn lookups_fail_for_unknown_names_and_kinds() {
        let mut heads = ClassificationHeads::<TestBackend>::default();
        heads.register("sentiment", classification(8, 2));

        assert!(matches!(
            heads.head("topic"),
            Err(Error::UnknownHead(name)) if name == "topic"
        ));
        assert!(matches!(
            heads.dependency_parse("sentiment"),
            Err(Error::HeadKind { .. })
        ));
        assert!(heads.classification("sentiment").is_ok());
    }
}
