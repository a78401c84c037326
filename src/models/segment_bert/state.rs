use std::{
    collections::{BTreeMap, BTreeSet},
    ops::{Deref, DerefMut},
    path::Path,
};

use burn::{
    module::Param,
    nn::Linear,
    tensor::{backend::Backend, Data, Shape, Tensor},
};
use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::SegmentBert;

/// Key prefix of every head parameter in a state dict
pub static HEADS_PREFIX: &str = "classification_heads.";

/// Number of classes given to heads found only in a checkpoint
pub const CHECKPOINT_HEAD_CLASSES: usize = 48;

/// Inner dimension given to heads found only in a checkpoint
pub const CHECKPOINT_HEAD_INNER_DIM: usize = 768;

/// A single named parameter: its shape and row-major values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamData {
    /// Dimensions of the tensor
    pub shape: Vec<usize>,
    /// Values in row-major order
    pub values: Vec<f32>,
}

impl ParamData {
    /// Capture a tensor's current values
    pub fn from_tensor<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Self {
        let data = tensor.into_data().convert::<f32>();

        Self {
            shape: data.shape.dims.to_vec(),
            values: data.value,
        }
    }

    /// Rebuild a tensor on the given device
    pub fn to_tensor<B: Backend, const D: usize>(
        &self,
        key: &str,
        device: &B::Device,
    ) -> Result<Tensor<B, D>> {
        let dims: [usize; D] = self.shape.clone().try_into().map_err(|_| Error::ParamShape {
            key: key.to_string(),
            expected: vec![0; D],
            found: self.shape.clone(),
        })?;

        Ok(Tensor::from_data(
            Data::new(self.values.clone(), Shape::new(dims)).convert::<B::FloatElem>(),
            device,
        ))
    }
}

/// A named parameter mapping, as saved alongside a checkpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateDict(BTreeMap<String, ParamData>);

impl Deref for StateDict {
    type Target = BTreeMap<String, ParamData>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for StateDict {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl StateDict {
    /// Read a state dict from a JSON file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = tokio::fs::read(path).await?;

        Ok(serde_json::from_slice(&contents)?)
    }

    /// Write the state dict to a JSON file
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let contents = serde_json::to_vec(self)?;
        tokio::fs::write(path, contents).await?;

        Ok(())
    }

    /// Names of the heads referenced under `heads_prefix`
    pub fn head_names(&self, heads_prefix: &str) -> BTreeSet<String> {
        self.0
            .keys()
            .filter_map(|key| key.strip_prefix(heads_prefix))
            .filter_map(|rest| rest.split('.').next())
            .map(str::to_string)
            .collect()
    }
}

/// Store a linear layer's `weight` and `bias` under `prefix`
pub fn save_linear<B: Backend>(prefix: &str, linear: &Linear<B>, state: &mut StateDict) {
    state.insert(
        format!("{prefix}weight"),
        ParamData::from_tensor(linear.weight.val()),
    );

    if let Some(bias) = &linear.bias {
        state.insert(format!("{prefix}bias"), ParamData::from_tensor(bias.val()));
    }
}

/// Rebuild a linear layer from the parameters under `prefix`, checked against the live layer
pub fn load_linear<B: Backend>(
    prefix: &str,
    live: &Linear<B>,
    state: &StateDict,
) -> Result<Linear<B>> {
    let weight = load_param(&format!("{prefix}weight"), live.weight.val(), state)?;

    let bias = match &live.bias {
        Some(bias) => Some(Param::from_tensor(load_param(
            &format!("{prefix}bias"),
            bias.val(),
            state,
        )?)),
        None => None,
    };

    Ok(Linear {
        weight: Param::from_tensor(weight),
        bias,
    })
}

fn load_param<B: Backend, const D: usize>(
    key: &str,
    live: Tensor<B, D>,
    state: &StateDict,
) -> Result<Tensor<B, D>> {
    let data = state
        .get(key)
        .ok_or_else(|| Error::MissingParam(key.to_string()))?;

    let expected = live.dims().to_vec();
    if data.shape != expected {
        return Err(Error::ParamShape {
            key: key.to_string(),
            expected,
            found: data.shape.clone(),
        });
    }

    data.to_tensor(key, &live.device())
}

fn heads_prefix(name: &str) -> String {
    if name.is_empty() {
        HEADS_PREFIX.to_string()
    } else {
        format!("{name}.{HEADS_PREFIX}")
    }
}

impl<B: Backend> SegmentBert<B> {
    /// Reconcile the heads of a saved state dict with the live registry.
    ///
    /// Heads present only in the state dict are registered as classification heads with
    /// [`CHECKPOINT_HEAD_CLASSES`] classes and a [`CHECKPOINT_HEAD_INNER_DIM`] inner dimension,
    /// whatever shape they were saved with. Parameters of live heads missing from the state dict
    /// are then copied in, so a later save keeps every head.
    pub fn upgrade_state_dict_named(&mut self, state: &mut StateDict, name: &str) {
        let prefix = heads_prefix(name);

        for head_name in state.head_names(&prefix) {
            if !self.classification_heads.contains_key(&head_name) {
                self.register_classification_head(
                    &head_name,
                    CHECKPOINT_HEAD_CLASSES,
                    Some(CHECKPOINT_HEAD_INNER_DIM),
                );
            }
        }

        let mut current = StateDict::default();
        self.classification_heads.save_state(&prefix, &mut current);

        for (key, value) in current.0 {
            if !state.contains_key(&key) {
                info!("Overwriting {}", key);
                state.insert(key, value);
            }
        }
    }

    /// The parameters of every registered head, keyed as in a saved checkpoint
    pub fn heads_state_dict(&self, name: &str) -> StateDict {
        let mut state = StateDict::default();
        self.classification_heads
            .save_state(&heads_prefix(name), &mut state);

        state
    }

    /// Load every registered head's parameters from a state dict
    pub fn load_heads(&mut self, state: &StateDict, name: &str) -> Result<()> {
        self.classification_heads
            .load_state(&heads_prefix(name), state)
    }
}
