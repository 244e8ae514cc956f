//! Build distributions from a kind name or an existing instance.

use serde_json::Value;

use crate::error::DistributionError;
use crate::prior::Prior;
use crate::types::{HyperValue, Hyperparameter, Hyperparameters};

use super::{Distribution, DistributionKind};

/// What to build: a family by name, or a copy of a configured instance.
#[derive(Debug, Clone)]
pub enum DistributionSpec {
    /// Family name, matched case-insensitively.
    Kind(String),
    /// Existing distribution; copied and renamed, keyword arguments ignored.
    Instance(Distribution),
}

impl From<&str> for DistributionSpec {
    fn from(kind: &str) -> Self {
        DistributionSpec::Kind(kind.to_string())
    }
}

impl From<String> for DistributionSpec {
    fn from(kind: String) -> Self {
        DistributionSpec::Kind(kind)
    }
}

impl From<DistributionKind> for DistributionSpec {
    fn from(kind: DistributionKind) -> Self {
        DistributionSpec::Kind(kind.as_str().to_string())
    }
}

impl From<Distribution> for DistributionSpec {
    fn from(dist: Distribution) -> Self {
        DistributionSpec::Instance(dist)
    }
}

impl From<&Distribution> for DistributionSpec {
    fn from(dist: &Distribution) -> Self {
        DistributionSpec::Instance(dist.clone())
    }
}

/// Create a distribution called `name`.
///
/// Recognised keyword arguments are `mus`, `sigmas`, `weights` (Gaussian
/// mixture), `mu` (exponential) and the scalar bounds `low` and `high`.
///
/// # Errors
///
/// `UnknownDistributionKind` for an unrecognised kind; otherwise whatever the
/// family constructor reports for the keyword arguments.
pub fn create_distribution(
    name: &str,
    spec: impl Into<DistributionSpec>,
    mut kwargs: Hyperparameters,
) -> Result<Distribution, DistributionError> {
    let kind = match spec.into() {
        DistributionSpec::Instance(dist) => return Ok(dist.renamed(name)),
        DistributionSpec::Kind(kind) => kind
            .parse::<DistributionKind>()
            .map_err(|_| DistributionError::UnknownDistributionKind(kind))?,
    };

    let low = take_bound(&mut kwargs, "low")?.unwrap_or(Distribution::DEFAULT_LOW);
    let high = take_bound(&mut kwargs, "high")?.unwrap_or(Distribution::DEFAULT_HIGH);

    let dist = match kind {
        DistributionKind::BoundedGaussian => {
            let mus = take_modes(&mut kwargs, "mus", "mu");
            let sigmas = take_modes(&mut kwargs, "sigmas", "sigma");
            let weights = take_modes(&mut kwargs, "weights", "weight");
            reject_leftover(kwargs)?;
            Distribution::bounded_gaussian(name, mus.unwrap_or_default(), sigmas.unwrap_or_default(), weights)?
        }
        DistributionKind::Exponential => {
            let mu = kwargs
                .remove("mu")
                .ok_or_else(|| DistributionError::MissingHyperparameter("mu".to_string()))?;
            reject_leftover(kwargs)?;
            let mu = match mu {
                HyperValue::Single(mu) => mu,
                HyperValue::Modes(_) => {
                    return Err(DistributionError::InvalidHyperparameterType {
                        key: "mu".to_string(),
                        reason: "expected a single value".to_string(),
                    })
                }
            };
            Distribution::exponential(name, mu)?
        }
    };
    dist.with_bounds(low, high)
}

/// [`create_distribution`] with keyword arguments given as a JSON object.
///
/// # Errors
///
/// `InvalidArgumentType` if `kwargs` is not an object, plus everything
/// [`kwargs_from_json`] and [`create_distribution`] report.
pub fn create_distribution_from_json(
    name: &str,
    spec: impl Into<DistributionSpec>,
    kwargs: &Value,
) -> Result<Distribution, DistributionError> {
    let spec = spec.into();
    if let DistributionSpec::Instance(dist) = spec {
        return Ok(dist.renamed(name));
    }
    create_distribution(name, spec, kwargs_from_json(kwargs)?)
}

/// Convert a JSON object into keyword arguments.
///
/// Numbers become fixed values, objects are parsed as priors, and arrays
/// become per-mode values. `null` is skipped so that unset bounds keep their
/// defaults.
///
/// # Errors
///
/// `InvalidArgumentType` if `kwargs` is not an object;
/// `InvalidHyperparameterType` for values of any other shape.
pub fn kwargs_from_json(kwargs: &Value) -> Result<Hyperparameters, DistributionError> {
    let Value::Object(map) = kwargs else {
        return Err(DistributionError::InvalidArgumentType(format!(
            "keyword arguments must be a JSON object, got {}",
            json_type_name(kwargs)
        )));
    };

    let mut out = Hyperparameters::new();
    for (key, value) in map {
        let value = match value {
            Value::Null => continue,
            Value::Array(items) => HyperValue::Modes(
                items
                    .iter()
                    .map(|item| hyperparameter_from_json(key, item))
                    .collect::<Result<_, _>>()?,
            ),
            other => HyperValue::Single(hyperparameter_from_json(key, other)?),
        };
        out.insert(key.clone(), value);
    }
    Ok(out)
}

fn hyperparameter_from_json(key: &str, value: &Value) -> Result<Hyperparameter, DistributionError> {
    let invalid = |reason: String| DistributionError::InvalidHyperparameterType {
        key: key.to_string(),
        reason,
    };
    match value {
        Value::Number(n) => n
            .as_f64()
            .map(Hyperparameter::Fixed)
            .ok_or_else(|| invalid(format!("{n} is not representable as f64"))),
        Value::Object(_) => serde_json::from_value::<Prior>(value.clone())
            .map(Hyperparameter::Free)
            .map_err(|e| invalid(format!("not a prior specification: {e}"))),
        other => Err(invalid(format!(
            "expected a number or prior, got {}",
            json_type_name(other)
        ))),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn take_bound(kwargs: &mut Hyperparameters, key: &str) -> Result<Option<f64>, DistributionError> {
    match kwargs.remove(key) {
        None => Ok(None),
        Some(HyperValue::Single(Hyperparameter::Fixed(value))) => Ok(Some(value)),
        Some(_) => Err(DistributionError::InvalidHyperparameterType {
            key: key.to_string(),
            reason: "bounds must be fixed numbers".to_string(),
        }),
    }
}

fn take_modes(kwargs: &mut Hyperparameters, plural: &str, singular: &str) -> Option<Vec<Hyperparameter>> {
    kwargs
        .remove(plural)
        .or_else(|| kwargs.remove(singular))
        .map(HyperValue::into_modes)
}

fn reject_leftover(kwargs: Hyperparameters) -> Result<(), DistributionError> {
    match kwargs.into_keys().next() {
        Some(key) => Err(DistributionError::UnknownHyperparameter(key)),
        None => Ok(()),
    }
}
