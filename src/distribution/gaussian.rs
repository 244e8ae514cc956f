//! Weighted mixture of truncated normals.

use std::f64::consts::SQRT_2;

use rand::Rng;
use rand_distr::StandardNormal;
use statrs::function::erf::{erf_inv, erfc, erfc_inv};
use tracing::warn;

use crate::constants::LOG_2PI;
use crate::error::DistributionError;
use crate::statistics::log_sum_exp_iter;
use crate::types::{HyperPoint, Hyperparameter, Hyperparameters};

use super::Shape;

/// Below this in-bounds mass, rejection from the untruncated normal is
/// replaced by inverse-CDF sampling.
const REJECTION_MIN_MASS: f64 = 0.25;
const MAX_REJECTION_ATTEMPTS: usize = 1_000;
const MAX_INVERSE_ATTEMPTS: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub(super) struct GaussianMixture {
    mus: Vec<Hyperparameter>,
    sigmas: Vec<Hyperparameter>,
    weights: Vec<Hyperparameter>,
}

impl GaussianMixture {
    pub(super) fn from_hyperparameters(mut hyper: Hyperparameters) -> Result<Self, DistributionError> {
        let mus = hyper.remove("mu").map(|v| v.into_modes());
        let sigmas = hyper.remove("sigma").map(|v| v.into_modes());
        let weights = hyper.remove("weight").map(|v| v.into_modes());
        if let Some(key) = hyper.into_keys().next() {
            return Err(DistributionError::UnknownHyperparameter(key));
        }

        let nmodes = [&mus, &sigmas, &weights]
            .iter()
            .filter_map(|v| v.as_ref().map(Vec::len))
            .max()
            .unwrap_or(0);
        if nmodes == 0 {
            // Nothing set yet; density stays undefined.
            return Ok(Self {
                mus: Vec::new(),
                sigmas: Vec::new(),
                weights: Vec::new(),
            });
        }
        let mus = mus.ok_or_else(|| DistributionError::MissingHyperparameter("mu".to_string()))?;
        let sigmas = sigmas.ok_or_else(|| DistributionError::MissingHyperparameter("sigma".to_string()))?;
        Self::from_arrays(mus, sigmas, weights)
    }

    pub(super) fn from_arrays(
        mus: Vec<Hyperparameter>,
        sigmas: Vec<Hyperparameter>,
        weights: Option<Vec<Hyperparameter>>,
    ) -> Result<Self, DistributionError> {
        let nmodes = mus
            .len()
            .max(sigmas.len())
            .max(weights.as_ref().map_or(0, Vec::len));
        let weights = weights.unwrap_or_else(|| vec![Hyperparameter::Fixed(1.0); nmodes]);

        for (key, len) in [("mus", mus.len()), ("sigmas", sigmas.len()), ("weights", weights.len())] {
            if len != nmodes {
                return Err(DistributionError::InconsistentModeCount(format!(
                    "'{key}' has {len} entries but the mixture has {nmodes} modes"
                )));
            }
        }

        Ok(Self { mus, sigmas, weights })
    }

    pub(super) fn nmodes(&self) -> usize {
        self.mus.len()
    }

    pub(super) fn hyperparameters(&self) -> impl Iterator<Item = &Hyperparameter> {
        self.mus.iter().chain(&self.sigmas).chain(&self.weights)
    }

    pub(super) fn get(&self, key: &str) -> Option<&Hyperparameter> {
        let (array, index) = split_key(key)?;
        self.array(array)?.get(index)
    }

    pub(super) fn get_modes(&self, key: &str) -> Option<&[Hyperparameter]> {
        self.array(key).map(Vec::as_slice)
    }

    pub(super) fn set(&mut self, key: &str, value: Hyperparameter) -> bool {
        let Some((array, index)) = split_key(key) else {
            return false;
        };
        let slot = match array {
            "mu" => self.mus.get_mut(index),
            "sigma" => self.sigmas.get_mut(index),
            "weight" => self.weights.get_mut(index),
            _ => None,
        };
        match slot {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    fn array(&self, key: &str) -> Option<&Vec<Hyperparameter>> {
        match key {
            "mu" => Some(&self.mus),
            "sigma" => Some(&self.sigmas),
            "weight" => Some(&self.weights),
            _ => None,
        }
    }

    pub(super) fn resolve(
        &self,
        values: &HyperPoint,
        low: f64,
        high: f64,
    ) -> Result<Option<Shape>, DistributionError> {
        if self.nmodes() == 0 {
            return Ok(None);
        }

        let mut components = Vec::with_capacity(self.nmodes());
        let mut total_weight = 0.0;
        let mut valid = true;
        for ((mu, sigma), weight) in self.mus.iter().zip(&self.sigmas).zip(&self.weights) {
            let mu = mu.resolve(values)?;
            let sigma = sigma.resolve(values)?;
            let weight = weight.resolve(values)?;
            if !(mu.is_finite() && sigma.is_finite() && sigma > 0.0 && weight.is_finite() && weight >= 0.0) {
                valid = false;
                continue;
            }
            let mass = normal_interval_mass((low - mu) / sigma, (high - mu) / sigma);
            if weight == 0.0 || mass <= 0.0 {
                // No probability inside the bounds; drop and renormalise.
                continue;
            }
            total_weight += weight;
            components.push(Component {
                mu,
                sigma,
                weight,
                ln_weight: 0.0,
                mass,
            });
        }

        if !valid || components.is_empty() {
            return Ok(Some(Shape::Invalid));
        }
        for component in &mut components {
            component.ln_weight = (component.weight / total_weight).ln()
                - component.mass.ln()
                - component.sigma.ln()
                - 0.5 * LOG_2PI;
        }
        Ok(Some(Shape::Mixture(ResolvedMixture {
            components,
            total_weight,
        })))
    }
}

fn split_key(key: &str) -> Option<(&str, usize)> {
    let split = key.find(|c: char| c.is_ascii_digit())?;
    let (array, index) = key.split_at(split);
    Some((array, index.parse().ok()?))
}

#[derive(Debug, Clone)]
struct Component {
    mu: f64,
    sigma: f64,
    weight: f64,
    /// ln(w / (Σw · mass · σ √(2π))).
    ln_weight: f64,
    mass: f64,
}

#[derive(Debug, Clone)]
pub(super) struct ResolvedMixture {
    components: Vec<Component>,
    total_weight: f64,
}

impl ResolvedMixture {
    pub(super) fn log_pdf(&self, x: f64) -> f64 {
        log_sum_exp_iter(self.components.iter().map(|c| {
            let z = (x - c.mu) / c.sigma;
            c.ln_weight - 0.5 * z * z
        }))
    }

    pub(super) fn sample<R: Rng + ?Sized>(&self, low: f64, high: f64, rng: &mut R) -> Option<f64> {
        let target = rng.random::<f64>() * self.total_weight;
        let mut cumulative = 0.0;
        let mut chosen = &self.components[self.components.len() - 1];
        for component in &self.components {
            cumulative += component.weight;
            if target < cumulative {
                chosen = component;
                break;
            }
        }
        sample_truncated_normal(chosen.mu, chosen.sigma, chosen.mass, low, high, rng)
    }
}

/// Φ(b) − Φ(a) for standard-normal bounds, evaluated in the tail that keeps
/// precision.
fn normal_interval_mass(a: f64, b: f64) -> f64 {
    if a >= 0.0 {
        0.5 * (erfc(a / SQRT_2) - erfc(b / SQRT_2))
    } else if b <= 0.0 {
        0.5 * (erfc(-b / SQRT_2) - erfc(-a / SQRT_2))
    } else {
        1.0 - 0.5 * erfc(-a / SQRT_2) - 0.5 * erfc(b / SQRT_2)
    }
}

/// Draw from N(mu, sigma²) truncated to the open interval `(low, high)`.
///
/// `mass` is the in-bounds probability of the untruncated normal.
fn sample_truncated_normal<R: Rng + ?Sized>(
    mu: f64,
    sigma: f64,
    mass: f64,
    low: f64,
    high: f64,
    rng: &mut R,
) -> Option<f64> {
    if mass >= REJECTION_MIN_MASS {
        for _ in 0..MAX_REJECTION_ATTEMPTS {
            let z: f64 = rng.sample(StandardNormal);
            let x = mu + sigma * z;
            if low < x && x < high {
                return Some(x);
            }
        }
    }

    let (a, b) = ((low - mu) / sigma, (high - mu) / sigma);
    for _ in 0..MAX_INVERSE_ATTEMPTS {
        let u = rng.random::<f64>();
        let z = if a >= 0.0 {
            upper_tail_inverse(a, b, u)
        } else if b <= 0.0 {
            -upper_tail_inverse(-b, -a, u)
        } else {
            let pa = 0.5 * erfc(-a / SQRT_2);
            let pb = 0.5 * erfc(-b / SQRT_2);
            let p = pa + u * (pb - pa);
            SQRT_2 * erf_inv(2.0 * p - 1.0)
        };
        let x = mu + sigma * z;
        if low < x && x < high {
            return Some(x);
        }
    }

    warn!(mu, sigma, low, high, "truncated normal sampling did not converge");
    None
}

/// Inverse CDF on `[a, b]` with `0 <= a < b`, using survival probabilities.
fn upper_tail_inverse(a: f64, b: f64, u: f64) -> f64 {
    let qa = 0.5 * erfc(a / SQRT_2);
    let qb = 0.5 * erfc(b / SQRT_2);
    let q = qb + u * (qa - qb);
    SQRT_2 * erfc_inv(2.0 * q)
}
