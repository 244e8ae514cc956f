//! Prior specifications for free hyperparameters.
//!
//! A prior carries the name the hyperparameter is known by in a
//! [`HyperPoint`](crate::HyperPoint), its family and its bounds. Samplers work
//! in the unit hypercube and map into parameter space with [`Prior::rescale`].

use std::f64::consts::SQRT_2;

use rand::Rng;
use serde::{Deserialize, Serialize};
use statrs::function::erf::erf_inv;

use crate::constants::LOG_2PI;
use crate::error::DistributionError;

/// Prior family and its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "prior")]
pub enum PriorFamily {
    /// Flat between `minimum` and `maximum`.
    Uniform {
        /// Lower edge.
        minimum: f64,
        /// Upper edge.
        maximum: f64,
    },
    /// Flat in the logarithm between `minimum` and `maximum`.
    LogUniform {
        /// Lower edge (> 0).
        minimum: f64,
        /// Upper edge.
        maximum: f64,
    },
    /// Unbounded normal.
    Gaussian {
        /// Mean.
        mu: f64,
        /// Standard deviation (> 0).
        sigma: f64,
    },
}

/// A named prior over one free hyperparameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prior {
    name: String,
    #[serde(flatten)]
    family: PriorFamily,
}

impl Prior {
    /// Flat prior on `[minimum, maximum]`.
    pub fn uniform(minimum: f64, maximum: f64, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            family: PriorFamily::Uniform { minimum, maximum },
        }
    }

    /// Log-flat prior on `[minimum, maximum]`.
    pub fn log_uniform(minimum: f64, maximum: f64, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            family: PriorFamily::LogUniform { minimum, maximum },
        }
    }

    /// Normal prior.
    pub fn gaussian(mu: f64, sigma: f64, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            family: PriorFamily::Gaussian { mu, sigma },
        }
    }

    /// Name the hyperparameter is looked up by.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Family and parameters.
    pub fn family(&self) -> &PriorFamily {
        &self.family
    }

    /// Support of the prior.
    pub fn bounds(&self) -> (f64, f64) {
        match self.family {
            PriorFamily::Uniform { minimum, maximum }
            | PriorFamily::LogUniform { minimum, maximum } => (minimum, maximum),
            PriorFamily::Gaussian { .. } => (f64::NEG_INFINITY, f64::INFINITY),
        }
    }

    /// Check that the prior parameters describe a proper density.
    ///
    /// # Errors
    ///
    /// Returns [`DistributionError::InvalidPrior`] describing the problem.
    pub fn validate(&self) -> Result<(), DistributionError> {
        let invalid = |reason: &str| DistributionError::InvalidPrior {
            name: self.name.clone(),
            reason: reason.to_string(),
        };

        if self.name.is_empty() {
            return Err(invalid("name must not be empty"));
        }

        match self.family {
            PriorFamily::Uniform { minimum, maximum } => {
                if !(minimum.is_finite() && maximum.is_finite() && minimum < maximum) {
                    return Err(invalid("bounds must be finite and increasing"));
                }
            }
            PriorFamily::LogUniform { minimum, maximum } => {
                if !(minimum > 0.0 && maximum.is_finite() && minimum < maximum) {
                    return Err(invalid("bounds must be positive, finite and increasing"));
                }
            }
            PriorFamily::Gaussian { mu, sigma } => {
                if !(mu.is_finite() && sigma.is_finite() && sigma > 0.0) {
                    return Err(invalid("sigma must be positive and finite"));
                }
            }
        }
        Ok(())
    }

    /// Map a unit-interval coordinate to parameter space.
    pub fn rescale(&self, u: f64) -> f64 {
        match self.family {
            PriorFamily::Uniform { minimum, maximum } => minimum + u * (maximum - minimum),
            PriorFamily::LogUniform { minimum, maximum } => {
                let (lo, hi) = (minimum.ln(), maximum.ln());
                (lo + u * (hi - lo)).exp()
            }
            PriorFamily::Gaussian { mu, sigma } => mu + sigma * SQRT_2 * erf_inv(2.0 * u - 1.0),
        }
    }

    /// Natural-log prior density at `x`.
    pub fn ln_prob(&self, x: f64) -> f64 {
        match self.family {
            PriorFamily::Uniform { minimum, maximum } => {
                if (minimum..=maximum).contains(&x) {
                    -(maximum - minimum).ln()
                } else {
                    f64::NEG_INFINITY
                }
            }
            PriorFamily::LogUniform { minimum, maximum } => {
                if (minimum..=maximum).contains(&x) {
                    -x.ln() - (maximum / minimum).ln().ln()
                } else {
                    f64::NEG_INFINITY
                }
            }
            PriorFamily::Gaussian { mu, sigma } => {
                let z = (x - mu) / sigma;
                -0.5 * z * z - sigma.ln() - 0.5 * LOG_2PI
            }
        }
    }

    /// Draw one value from the prior.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        self.rescale(rng.random::<f64>())
    }
}
