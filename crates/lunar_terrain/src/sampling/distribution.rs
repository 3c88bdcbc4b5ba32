//! Declarative scalar distributions for render-case axes and per-sample field parameters.
//!
//! A [`DistributionSpec`] is parsed and validated once, when the configuration is loaded.
//! Sampling then only matches on the variant; no string dispatch happens at draw time.
use rand::Rng as RngCore;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::sampling::{rand01, standard_normal, uniform};

/// A scalar distribution.
///
/// Deserializes from a bare number (treated as [`DistributionSpec::Fixed`]) or from a mapping
/// with a `type` tag: `fixed`, `uniform`, `normal`, `grid_list`, `choice`, or `grid`
/// (`min`, `max`, `n_values`, expanded into an evenly spaced [`DistributionSpec::GridList`]).
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DistributionSpec {
    /// Always the stored value; consumes no randomness.
    Fixed { value: f64 },
    /// One draw in `[min, max]`.
    Uniform { min: f64, max: f64 },
    /// One unbounded Gaussian draw. Not clamped.
    Normal { mean: f64, std: f64 },
    /// Ordered grid values, addressed by a caller-supplied index.
    GridList { values: Vec<f64> },
    /// One value picked at random from the list.
    Choice { values: Vec<f64> },
}

impl DistributionSpec {
    pub fn fixed(value: f64) -> Self {
        DistributionSpec::Fixed { value }
    }

    pub fn uniform(min: f64, max: f64) -> Result<Self> {
        let spec = DistributionSpec::Uniform { min, max };
        spec.validate()?;
        Ok(spec)
    }

    pub fn normal(mean: f64, std: f64) -> Result<Self> {
        let spec = DistributionSpec::Normal { mean, std };
        spec.validate()?;
        Ok(spec)
    }

    pub fn grid_list(values: Vec<f64>) -> Result<Self> {
        let spec = DistributionSpec::GridList { values };
        spec.validate()?;
        Ok(spec)
    }

    pub fn choice(values: Vec<f64>) -> Result<Self> {
        let spec = DistributionSpec::Choice { values };
        spec.validate()?;
        Ok(spec)
    }

    /// Parse a distribution from a loosely typed value tree.
    pub fn from_value(value: &Value) -> Result<Self> {
        let spec = match value {
            Value::Number(n) => {
                let value = n.as_f64().ok_or_else(|| {
                    Error::Config(format!("distribution value {n} is not a float"))
                })?;
                DistributionSpec::Fixed { value }
            }
            Value::String(s) => {
                let value = s.trim().parse::<f64>().map_err(|_| {
                    Error::Config(format!("distribution '{s}' is neither a number nor a mapping"))
                })?;
                DistributionSpec::Fixed { value }
            }
            Value::Object(obj) => parse_tagged(obj)?,
            other => {
                return Err(Error::Config(format!("unknown distribution: {other}")));
            }
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Check parameter consistency.
    pub fn validate(&self) -> Result<()> {
        match self {
            DistributionSpec::Fixed { value } => finite("fixed", "value", *value),
            DistributionSpec::Uniform { min, max } => {
                finite("uniform", "min", *min)?;
                finite("uniform", "max", *max)?;
                if min > max {
                    return Err(Error::Config(format!(
                        "uniform distribution has min {min} > max {max}"
                    )));
                }
                Ok(())
            }
            DistributionSpec::Normal { mean, std } => {
                finite("normal", "mean", *mean)?;
                finite("normal", "std", *std)?;
                if *std < 0.0 {
                    return Err(Error::Config(format!(
                        "normal distribution has negative std {std}"
                    )));
                }
                Ok(())
            }
            DistributionSpec::GridList { values } => non_empty_finite("grid_list", values),
            DistributionSpec::Choice { values } => non_empty_finite("choice", values),
        }
    }

    /// Whether this axis enumerates a grid instead of being drawn.
    pub fn is_grid(&self) -> bool {
        matches!(self, DistributionSpec::GridList { .. })
    }

    /// Number of grid values, for grid axes.
    pub fn grid_len(&self) -> Option<usize> {
        match self {
            DistributionSpec::GridList { values } => Some(values.len()),
            _ => None,
        }
    }

    /// Largest value the distribution is expected to produce (the mean for a normal).
    pub fn nominal_max(&self) -> f64 {
        match self {
            DistributionSpec::Fixed { value } => *value,
            DistributionSpec::Uniform { max, .. } => *max,
            DistributionSpec::Normal { mean, .. } => *mean,
            DistributionSpec::GridList { values } | DistributionSpec::Choice { values } => {
                values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
            }
        }
    }

    /// Draw one scalar.
    ///
    /// `grid_index` addresses [`DistributionSpec::GridList`] values and is ignored by the
    /// other variants. A grid axis without an index, or with one out of range, is a
    /// configuration error.
    pub fn sample(&self, rng: &mut dyn RngCore, grid_index: Option<usize>) -> Result<f64> {
        match self {
            DistributionSpec::Fixed { value } => Ok(*value),
            DistributionSpec::Uniform { min, max } => Ok(uniform(rng, *min, *max)),
            DistributionSpec::Normal { mean, std } => Ok(mean + std * standard_normal(rng)),
            DistributionSpec::Choice { values } => {
                let i = ((rand01(rng) * values.len() as f64) as usize).min(values.len() - 1);
                Ok(values[i])
            }
            DistributionSpec::GridList { values } => {
                let index = grid_index.ok_or_else(|| {
                    Error::Config("grid_list axis sampled without a grid index".into())
                })?;
                values.get(index).copied().ok_or_else(|| {
                    Error::Config(format!(
                        "grid index {index} out of range for grid_list of {} values",
                        values.len()
                    ))
                })
            }
        }
    }
}

impl<'de> Deserialize<'de> for DistributionSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        DistributionSpec::from_value(&value).map_err(serde::de::Error::custom)
    }
}

fn parse_tagged(obj: &Map<String, Value>) -> Result<DistributionSpec> {
    let kind = obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Config(format!("distribution without a 'type' tag: {obj:?}")))?;

    match kind {
        "fixed" => Ok(DistributionSpec::Fixed {
            value: number(obj, kind, "value")?,
        }),
        "uniform" => Ok(DistributionSpec::Uniform {
            min: number(obj, kind, "min")?,
            max: number(obj, kind, "max")?,
        }),
        "normal" => Ok(DistributionSpec::Normal {
            mean: number(obj, kind, "mean")?,
            std: number(obj, kind, "std")?,
        }),
        "grid_list" => Ok(DistributionSpec::GridList {
            values: numbers(obj, kind, "values")?,
        }),
        "choice" | "list" => Ok(DistributionSpec::Choice {
            values: numbers(obj, kind, "values")?,
        }),
        "grid" => {
            let min = number(obj, kind, "min")?;
            let max = number(obj, kind, "max")?;
            let n = number(obj, kind, "n_values")?;
            if n < 1.0 || n.fract() != 0.0 {
                return Err(Error::Config(format!(
                    "grid distribution needs a positive integer 'n_values', got {n}"
                )));
            }
            Ok(DistributionSpec::GridList {
                values: linspace(min, max, n as usize),
            })
        }
        other => Err(Error::Config(format!("unknown distribution type '{other}'"))),
    }
}

fn linspace(min: f64, max: f64, n: usize) -> Vec<f64> {
    if n == 1 {
        return vec![min];
    }
    (0..n)
        .map(|i| min + (max - min) * i as f64 / (n - 1) as f64)
        .collect()
}

fn number(obj: &Map<String, Value>, kind: &str, key: &str) -> Result<f64> {
    let value = obj
        .get(key)
        .ok_or_else(|| Error::Config(format!("{kind} distribution requires '{key}'")))?;
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .ok_or_else(|| Error::Config(format!("{kind} distribution '{key}' is not a number: {value}")))
}

fn numbers(obj: &Map<String, Value>, kind: &str, key: &str) -> Result<Vec<f64>> {
    let list = obj
        .get(key)
        .and_then(Value::as_array)
        .ok_or_else(|| Error::Config(format!("{kind} distribution requires a '{key}' list")))?;
    list.iter()
        .map(|v| {
            v.as_f64().ok_or_else(|| {
                Error::Config(format!("{kind} distribution '{key}' holds a non-number: {v}"))
            })
        })
        .collect()
}

fn finite(kind: &str, key: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(Error::Config(format!("{kind} distribution '{key}' must be finite")))
    }
}

fn non_empty_finite(kind: &str, values: &[f64]) -> Result<()> {
    if values.is_empty() {
        return Err(Error::Config(format!("{kind} distribution has no values")));
    }
    values.iter().try_for_each(|v| finite(kind, "values", *v))
}
