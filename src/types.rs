//! Type aliases and common types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::DistributionError;
use crate::prior::Prior;

/// A point in hyperparameter space, keyed by free-parameter name.
pub type HyperPoint = BTreeMap<String, f64>;

/// A hyperparameter is either pinned to a value or left free with a prior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Hyperparameter {
    /// Constant value.
    Fixed(f64),
    /// Inferred; looked up by the prior's name at evaluation time.
    Free(Prior),
}

impl Hyperparameter {
    /// Resolve to a number, reading free hyperparameters from `values`.
    ///
    /// # Errors
    ///
    /// Returns [`DistributionError::UnknownHyperparameter`] if a free
    /// hyperparameter's name is absent from `values`.
    pub fn resolve(&self, values: &HyperPoint) -> Result<f64, DistributionError> {
        match self {
            Hyperparameter::Fixed(value) => Ok(*value),
            Hyperparameter::Free(prior) => values
                .get(prior.name())
                .copied()
                .ok_or_else(|| DistributionError::UnknownHyperparameter(prior.name().to_string())),
        }
    }

    /// Whether this hyperparameter is inferred.
    pub fn is_free(&self) -> bool {
        matches!(self, Hyperparameter::Free(_))
    }

    /// The fixed value, if any.
    pub fn as_fixed(&self) -> Option<f64> {
        match self {
            Hyperparameter::Fixed(value) => Some(*value),
            Hyperparameter::Free(_) => None,
        }
    }

    /// The prior, if free.
    pub fn as_prior(&self) -> Option<&Prior> {
        match self {
            Hyperparameter::Fixed(_) => None,
            Hyperparameter::Free(prior) => Some(prior),
        }
    }
}

impl From<f64> for Hyperparameter {
    fn from(value: f64) -> Self {
        Hyperparameter::Fixed(value)
    }
}

impl From<Prior> for Hyperparameter {
    fn from(prior: Prior) -> Self {
        Hyperparameter::Free(prior)
    }
}

/// Value supplied for one key when constructing a distribution: a single
/// hyperparameter or one per mixture component.
#[derive(Debug, Clone, PartialEq)]
pub enum HyperValue {
    /// Scalar key.
    Single(Hyperparameter),
    /// Per-mode array.
    Modes(Vec<Hyperparameter>),
}

impl HyperValue {
    pub(crate) fn into_modes(self) -> Vec<Hyperparameter> {
        match self {
            HyperValue::Single(value) => vec![value],
            HyperValue::Modes(values) => values,
        }
    }
}

impl From<f64> for HyperValue {
    fn from(value: f64) -> Self {
        HyperValue::Single(value.into())
    }
}

impl From<Prior> for HyperValue {
    fn from(prior: Prior) -> Self {
        HyperValue::Single(prior.into())
    }
}

impl From<Hyperparameter> for HyperValue {
    fn from(value: Hyperparameter) -> Self {
        HyperValue::Single(value)
    }
}

impl From<Vec<Hyperparameter>> for HyperValue {
    fn from(values: Vec<Hyperparameter>) -> Self {
        HyperValue::Modes(values)
    }
}

impl From<Vec<f64>> for HyperValue {
    fn from(values: Vec<f64>) -> Self {
        HyperValue::Modes(values.into_iter().map(Hyperparameter::Fixed).collect())
    }
}

/// Keyed hyperparameter values for the generic constructor and the factory.
pub type Hyperparameters = BTreeMap<String, HyperValue>;

/// Build a [`Hyperparameters`] map from `(key, value)` pairs.
pub fn hyperparameters<K, V, I>(pairs: I) -> Hyperparameters
where
    K: Into<String>,
    V: Into<HyperValue>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_and_free_accessors() {
        let fixed = Hyperparameter::from(2.5);
        assert_eq!(fixed.as_fixed(), Some(2.5));
        assert!(fixed.as_prior().is_none());
        assert_eq!(fixed.resolve(&HyperPoint::new()).unwrap(), 2.5);

        let free = Hyperparameter::from(Prior::uniform(0.0, 1.0, "mu0"));
        assert!(free.is_free());
        assert_eq!(free.as_fixed(), None);
        let values = HyperPoint::from([("mu0".to_string(), 0.25)]);
        assert_eq!(free.resolve(&values).unwrap(), 0.25);
        assert!(matches!(
            free.resolve(&HyperPoint::new()),
            Err(DistributionError::UnknownHyperparameter(_))
        ));
    }

    #[test]
    fn test_hyperparameters_helper() {
        let map = hyperparameters([("mu", vec![1.0, 2.0])]);
        assert_eq!(
            map["mu"],
            HyperValue::Modes(vec![Hyperparameter::Fixed(1.0), Hyperparameter::Fixed(2.0)])
        );
    }
}
