//! Population distributions over a single observable.
//!
//! A [`Distribution`] is a truncated univariate density whose hyperparameters
//! are each either fixed or free. Free hyperparameters are looked up by their
//! prior's name in a [`HyperPoint`] at evaluation time, which is how a
//! sampler drives the distribution during hierarchical inference.
//!
//! Two families are supported:
//! - [`DistributionKind::BoundedGaussian`]: weighted mixture of truncated normals
//! - [`DistributionKind::Exponential`]: truncated exponential with mean `mu`

mod exponential;
mod factory;
mod gaussian;

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use rand::Rng;

use crate::error::DistributionError;
use crate::prior::Prior;
use crate::types::{HyperPoint, Hyperparameter, Hyperparameters};

use exponential::{Exponential, ResolvedExponential};
use gaussian::{GaussianMixture, ResolvedMixture};

pub use factory::{create_distribution, create_distribution_from_json, kwargs_from_json, DistributionSpec};

/// Supported distribution families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DistributionKind {
    /// Mixture of normals truncated to `[low, high]`.
    BoundedGaussian,
    /// Exponential truncated to `[low, high]`.
    Exponential,
}

impl DistributionKind {
    /// Canonical lower-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            DistributionKind::BoundedGaussian => "gaussian",
            DistributionKind::Exponential => "exponential",
        }
    }

    /// Keys accepted by [`Distribution::new`] for this family.
    pub fn hyperparameter_keys(&self) -> &'static [&'static str] {
        match self {
            DistributionKind::BoundedGaussian => &["mu", "sigma", "weight"],
            DistributionKind::Exponential => &["mu"],
        }
    }
}

impl fmt::Display for DistributionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistributionKind {
    type Err = DistributionError;

    /// Case-insensitive; accepts an optional `distribution` suffix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let stem = lower.strip_suffix("distribution").unwrap_or(&lower);
        match stem {
            "gaussian" | "boundedgaussian" | "bounded_gaussian" => Ok(Self::BoundedGaussian),
            "exponential" => Ok(Self::Exponential),
            _ => Err(DistributionError::InvalidKind(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Family {
    BoundedGaussian(GaussianMixture),
    Exponential(Exponential),
}

/// A truncated univariate density over a named observable.
#[derive(Debug, Clone, PartialEq)]
pub struct Distribution {
    name: String,
    low: f64,
    high: f64,
    family: Family,
}

impl Distribution {
    /// Default lower truncation bound.
    pub const DEFAULT_LOW: f64 = 0.0;
    /// Default upper truncation bound.
    pub const DEFAULT_HIGH: f64 = f64::INFINITY;

    /// Generic constructor from a family name and keyed hyperparameters.
    ///
    /// Keys are those of [`DistributionKind::hyperparameter_keys`]. Missing
    /// keys leave the distribution unresolvable: [`log_pdf`](Self::log_pdf)
    /// then returns `Ok(None)` until they are assigned.
    ///
    /// # Errors
    ///
    /// `InvalidKind`, `InvalidBounds`, `UnknownHyperparameter`,
    /// `InvalidHyperparameterType`, `InconsistentModeCount`,
    /// `DuplicateFreeParameter` or `InvalidPrior`.
    pub fn new(
        name: &str,
        kind: &str,
        hyperparameters: Hyperparameters,
        low: f64,
        high: f64,
    ) -> Result<Self, DistributionError> {
        Self::with_kind(name, kind.parse()?, hyperparameters, low, high)
    }

    /// Like [`new`](Self::new) with an already-parsed kind.
    pub fn with_kind(
        name: &str,
        kind: DistributionKind,
        hyperparameters: Hyperparameters,
        low: f64,
        high: f64,
    ) -> Result<Self, DistributionError> {
        check_bounds(low, high)?;
        let family = match kind {
            DistributionKind::BoundedGaussian => {
                Family::BoundedGaussian(GaussianMixture::from_hyperparameters(hyperparameters)?)
            }
            DistributionKind::Exponential => {
                Family::Exponential(Exponential::from_hyperparameters(hyperparameters)?)
            }
        };
        let dist = Self {
            name: name.to_lowercase(),
            low,
            high,
            family,
        };
        dist.validate_free_parameters()?;
        Ok(dist)
    }

    /// Mixture of truncated normals on the default bounds `[0, ∞)`.
    ///
    /// `weights` default to 1 for every mode.
    ///
    /// # Errors
    ///
    /// `MissingHyperparameter` if `mus` or `sigmas` is empty,
    /// `InconsistentModeCount` if array lengths differ.
    pub fn bounded_gaussian(
        name: &str,
        mus: Vec<Hyperparameter>,
        sigmas: Vec<Hyperparameter>,
        weights: Option<Vec<Hyperparameter>>,
    ) -> Result<Self, DistributionError> {
        if mus.is_empty() {
            return Err(DistributionError::MissingHyperparameter("mus".to_string()));
        }
        if sigmas.is_empty() {
            return Err(DistributionError::MissingHyperparameter("sigmas".to_string()));
        }
        let dist = Self {
            name: name.to_lowercase(),
            low: Self::DEFAULT_LOW,
            high: Self::DEFAULT_HIGH,
            family: Family::BoundedGaussian(GaussianMixture::from_arrays(mus, sigmas, weights)?),
        };
        dist.validate_free_parameters()?;
        Ok(dist)
    }

    /// Truncated exponential on the default bounds `[0, ∞)`.
    ///
    /// # Errors
    ///
    /// `FixedHyperparameterNotAllowed` unless `mu` is free.
    pub fn exponential(name: &str, mu: impl Into<Hyperparameter>) -> Result<Self, DistributionError> {
        let mu = mu.into();
        if !mu.is_free() {
            return Err(DistributionError::FixedHyperparameterNotAllowed("mu".to_string()));
        }
        let dist = Self {
            name: name.to_lowercase(),
            low: Self::DEFAULT_LOW,
            high: Self::DEFAULT_HIGH,
            family: Family::Exponential(Exponential { mu: Some(mu) }),
        };
        dist.validate_free_parameters()?;
        Ok(dist)
    }

    /// Replace the truncation bounds.
    ///
    /// # Errors
    ///
    /// `InvalidBounds` unless `low < high`.
    pub fn with_bounds(mut self, low: f64, high: f64) -> Result<Self, DistributionError> {
        check_bounds(low, high)?;
        self.low = low;
        self.high = high;
        Ok(self)
    }

    /// Copy carrying the same configuration under a new name.
    pub fn renamed(&self, name: &str) -> Self {
        Self {
            name: name.to_lowercase(),
            ..self.clone()
        }
    }

    /// Observable name (lower-cased).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Family.
    pub fn kind(&self) -> DistributionKind {
        match self.family {
            Family::BoundedGaussian(_) => DistributionKind::BoundedGaussian,
            Family::Exponential(_) => DistributionKind::Exponential,
        }
    }

    /// Lower truncation bound.
    pub fn low(&self) -> f64 {
        self.low
    }

    /// Upper truncation bound.
    pub fn high(&self) -> f64 {
        self.high
    }

    /// Number of mixture components (1 for single-component families).
    pub fn nmodes(&self) -> usize {
        match &self.family {
            Family::BoundedGaussian(mixture) => mixture.nmodes(),
            Family::Exponential(_) => 1,
        }
    }

    /// Look up a hyperparameter by key.
    ///
    /// Returns `Ok(None)` for a known key that has not been assigned.
    ///
    /// # Errors
    ///
    /// `UnknownHyperparameter` if the key is not part of this distribution.
    pub fn get(&self, key: &str) -> Result<Option<&Hyperparameter>, DistributionError> {
        let found = match &self.family {
            Family::BoundedGaussian(mixture) => mixture.get(key).map(Some),
            Family::Exponential(exp) => exp.get(key),
        };
        found.ok_or_else(|| DistributionError::UnknownHyperparameter(key.to_string()))
    }

    /// Look up a whole per-mode array (`mu`, `sigma` or `weight`).
    ///
    /// # Errors
    ///
    /// `UnknownHyperparameter` if the key is not an array key of this family.
    pub fn get_modes(&self, key: &str) -> Result<&[Hyperparameter], DistributionError> {
        let found = match &self.family {
            Family::BoundedGaussian(mixture) => mixture.get_modes(key),
            Family::Exponential(_) => None,
        };
        found.ok_or_else(|| DistributionError::UnknownHyperparameter(key.to_string()))
    }

    /// Assign a hyperparameter by key. The key set never grows.
    ///
    /// # Errors
    ///
    /// `UnknownHyperparameter` for keys outside the fixed set;
    /// `DuplicateFreeParameter` / `InvalidPrior` if the new prior conflicts.
    /// The distribution is unchanged on error.
    pub fn set(&mut self, key: &str, value: impl Into<Hyperparameter>) -> Result<(), DistributionError> {
        let mut updated = self.clone();
        let value = value.into();
        let assigned = match &mut updated.family {
            Family::BoundedGaussian(mixture) => mixture.set(key, value),
            Family::Exponential(exp) => exp.set(key, value),
        };
        if !assigned {
            return Err(DistributionError::UnknownHyperparameter(key.to_string()));
        }
        updated.validate_free_parameters()?;
        *self = updated;
        Ok(())
    }

    /// Priors of every free hyperparameter, in key order.
    pub fn free_parameters(&self) -> Vec<&Prior> {
        self.hyperparameters().filter_map(Hyperparameter::as_prior).collect()
    }

    /// Whether anything is left to infer.
    pub fn has_free_parameters(&self) -> bool {
        self.hyperparameters().any(Hyperparameter::is_free)
    }

    /// Resolve every hyperparameter against `values`.
    ///
    /// Returns `Ok(None)` when the distribution is not fully specified.
    ///
    /// # Errors
    ///
    /// `UnknownHyperparameter` if a free hyperparameter is missing from
    /// `values`.
    pub fn resolve(&self, values: &HyperPoint) -> Result<Option<ResolvedDensity>, DistributionError> {
        let shape = match &self.family {
            Family::BoundedGaussian(mixture) => mixture.resolve(values, self.low, self.high)?,
            Family::Exponential(exp) => exp.resolve(values, self.low, self.high)?,
        };
        Ok(shape.map(|shape| ResolvedDensity {
            low: self.low,
            high: self.high,
            shape,
        }))
    }

    /// Natural-log density at `x`.
    ///
    /// `Ok(None)` means the density is undefined because hyperparameters are
    /// unset; `Ok(Some(-inf))` means zero probability (e.g. `x` outside
    /// `[low, high]`).
    ///
    /// # Errors
    ///
    /// `UnknownHyperparameter` if a free hyperparameter is missing from
    /// `values`.
    pub fn log_pdf(&self, values: &HyperPoint, x: f64) -> Result<Option<f64>, DistributionError> {
        Ok(self.resolve(values)?.map(|density| density.log_pdf(x)))
    }

    /// Draw one value strictly inside `(low, high)`.
    ///
    /// `Ok(None)` when the distribution cannot be resolved.
    ///
    /// # Errors
    ///
    /// `UnknownHyperparameter` if a free hyperparameter is missing from
    /// `values`.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        values: &HyperPoint,
        rng: &mut R,
    ) -> Result<Option<f64>, DistributionError> {
        Ok(self.resolve(values)?.and_then(|density| density.sample(rng)))
    }

    fn hyperparameters(&self) -> Box<dyn Iterator<Item = &Hyperparameter> + '_> {
        match &self.family {
            Family::BoundedGaussian(mixture) => Box::new(mixture.hyperparameters()),
            Family::Exponential(exp) => Box::new(exp.mu.iter()),
        }
    }

    fn validate_free_parameters(&self) -> Result<(), DistributionError> {
        let mut seen = BTreeSet::new();
        for prior in self.free_parameters() {
            prior.validate()?;
            if !seen.insert(prior.name()) {
                return Err(DistributionError::DuplicateFreeParameter(prior.name().to_string()));
            }
        }
        Ok(())
    }
}

fn check_bounds(low: f64, high: f64) -> Result<(), DistributionError> {
    // Also rejects NaN
    if low < high {
        Ok(())
    } else {
        Err(DistributionError::InvalidBounds { low, high })
    }
}

#[derive(Debug, Clone)]
enum Shape {
    Mixture(ResolvedMixture),
    Exponential(ResolvedExponential),
    /// Hyperparameters resolved to values outside the family's domain
    /// (non-positive width or mean, negative weights).
    Invalid,
}

/// A distribution with every hyperparameter bound to a number.
///
/// Resolving once and evaluating many times is how the hierarchical
/// likelihood avoids re-reading hyperparameters for every sample.
#[derive(Debug, Clone)]
pub struct ResolvedDensity {
    low: f64,
    high: f64,
    shape: Shape,
}

impl ResolvedDensity {
    /// Natural-log density at `x`; `-inf` outside `[low, high]` or when the
    /// resolved hyperparameters are outside the family's domain.
    pub fn log_pdf(&self, x: f64) -> f64 {
        if !(self.low..=self.high).contains(&x) {
            return f64::NEG_INFINITY;
        }
        match &self.shape {
            Shape::Mixture(mixture) => mixture.log_pdf(x),
            Shape::Exponential(exp) => exp.log_pdf(x, self.low),
            Shape::Invalid => f64::NEG_INFINITY,
        }
    }

    /// Whether the resolved hyperparameters describe a proper density.
    pub fn is_valid(&self) -> bool {
        !matches!(self.shape, Shape::Invalid)
    }

    /// Draw one value strictly inside `(low, high)`.
    ///
    /// Returns `None` for an invalid density.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<f64> {
        match &self.shape {
            Shape::Mixture(mixture) => mixture.sample(self.low, self.high, rng),
            Shape::Exponential(exp) => exp.sample(self.low, self.high, rng),
            Shape::Invalid => None,
        }
    }
}
