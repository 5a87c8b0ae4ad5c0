use rand::distributions::Uniform;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use serde_json::{Map, Value};

use crate::error::NetForgeError;
use crate::types::NetNumeric;

/// Initial-value generator for parameter buffers.
///
/// Configured as an object such as `{"type": "gaussian", "std": 0.01}`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Filler {
    Constant(f64),
    Uniform { min: f64, max: f64 },
    Gaussian { mean: f64, std: f64 },
}

impl Default for Filler {
    fn default() -> Self {
        Filler::Constant(0.0)
    }
}

impl Filler {
    /// Parses a filler object; `node` names the owner in error messages.
    pub fn from_config(node: &str, config: &Map<String, Value>) -> Result<Filler, NetForgeError> {
        let invalid = |message: String| NetForgeError::InvalidConfig {
            node: node.to_string(),
            message,
        };
        let number = |key: &str, default: f64| -> Result<f64, NetForgeError> {
            match config.get(key) {
                None => Ok(default),
                Some(v) => v
                    .as_f64()
                    .ok_or_else(|| invalid(format!("filler '{}' must be a number, got {}", key, v))),
            }
        };
        let kind = config.get("type").and_then(Value::as_str).unwrap_or("constant");
        match kind {
            "constant" => Ok(Filler::Constant(number("value", 0.0)?)),
            "uniform" => {
                let min = number("min", 0.0)?;
                let max = number("max", 1.0)?;
                if min > max {
                    return Err(invalid(format!("uniform filler needs min <= max, got {} > {}", min, max)));
                }
                Ok(Filler::Uniform { min, max })
            }
            "gaussian" => {
                let mean = number("mean", 0.0)?;
                let std = number("std", 1.0)?;
                if std < 0.0 {
                    return Err(invalid(format!("gaussian filler needs std >= 0, got {}", std)));
                }
                Ok(Filler::Gaussian { mean, std })
            }
            other => Err(invalid(format!("unknown filler type '{}'", other))),
        }
    }

    pub fn fill<T: NetNumeric>(&self, data: &mut [T], rng: &mut StdRng) {
        match *self {
            Filler::Constant(value) => data.fill(T::from_f64(value)),
            Filler::Uniform { min, max } => {
                let dist = Uniform::new_inclusive(min, max);
                data.iter_mut().for_each(|x| *x = T::from_f64(dist.sample(rng)));
            }
            Filler::Gaussian { mean, std } => match Normal::new(mean, std) {
                Ok(dist) => data.iter_mut().for_each(|x| *x = T::from_f64(dist.sample(rng))),
                // Validated in from_config; a zero-width normal is the mean.
                Err(_) => data.fill(T::from_f64(mean)),
            },
        }
    }
}
