use std::{f64::consts::PI, fmt::Display, str::FromStr};

use burn::tensor::{activation, backend::Backend, Tensor};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Activation functions selectable through the architecture arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    /// Rectified linear unit
    Relu,
    /// Exact (erf-based) GELU
    Gelu,
    /// Tanh approximation of GELU
    GeluAccurate,
    /// Hyperbolic tangent
    Tanh,
    /// Identity
    Linear,
}

impl Activation {
    /// Apply the activation element-wise
    pub fn apply<B: Backend, const D: usize>(&self, x: Tensor<B, D>) -> Tensor<B, D> {
        match self {
            Activation::Relu => activation::relu(x),
            Activation::Gelu => activation::gelu(x),
            Activation::GeluAccurate => {
                let inner = x.clone() + x.clone() * x.clone() * x.clone() * 0.044715;
                let scaled = (inner * (2.0 / PI).sqrt()).tanh();

                x * 0.5 * (scaled + 1.0)
            }
            Activation::Tanh => x.tanh(),
            Activation::Linear => x,
        }
    }
}

impl FromStr for Activation {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "relu" => Ok(Activation::Relu),
            "gelu" => Ok(Activation::Gelu),
            // "gelu_fast" is the deprecated alias of the tanh approximation
            "gelu_fast" | "gelu_accurate" => Ok(Activation::GeluAccurate),
            "tanh" => Ok(Activation::Tanh),
            "linear" => Ok(Activation::Linear),
            _ => Err(Error::UnknownActivation(value.to_string())),
        }
    }
}

impl Display for Activation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Activation::Relu => "relu",
            Activation::Gelu => "gelu",
            Activation::GeluAccurate => "gelu_accurate",
            Activation::Tanh => "tanh",
            Activation::Linear => "linear",
        };

        write!(f, "{}", name)
    }
}
