//! Truncated exponential.

use rand::Rng;

use crate::error::DistributionError;
use crate::types::{HyperPoint, HyperValue, Hyperparameter, Hyperparameters};

use super::Shape;

const MAX_ATTEMPTS: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub(super) struct Exponential {
    pub(super) mu: Option<Hyperparameter>,
}

impl Exponential {
    pub(super) fn from_hyperparameters(mut hyper: Hyperparameters) -> Result<Self, DistributionError> {
        let mu = hyper.remove("mu");
        if let Some(key) = hyper.into_keys().next() {
            return Err(DistributionError::UnknownHyperparameter(key));
        }
        let mu = match mu {
            None => None,
            Some(HyperValue::Single(value)) => Some(value),
            Some(HyperValue::Modes(mut values)) if values.len() == 1 => values.pop(),
            Some(HyperValue::Modes(values)) => {
                return Err(DistributionError::InvalidHyperparameterType {
                    key: "mu".to_string(),
                    reason: format!("expected a single value, got {} values", values.len()),
                })
            }
        };
        Ok(Self { mu })
    }

    pub(super) fn get(&self, key: &str) -> Option<Option<&Hyperparameter>> {
        (key == "mu").then_some(self.mu.as_ref())
    }

    pub(super) fn set(&mut self, key: &str, value: Hyperparameter) -> bool {
        if key != "mu" {
            return false;
        }
        self.mu = Some(value);
        true
    }

    pub(super) fn resolve(
        &self,
        values: &HyperPoint,
        low: f64,
        high: f64,
    ) -> Result<Option<Shape>, DistributionError> {
        let Some(mu) = &self.mu else {
            return Ok(None);
        };
        let mu = mu.resolve(values)?;
        if !(mu.is_finite() && mu > 0.0 && low.is_finite()) {
            return Ok(Some(Shape::Invalid));
        }

        // P(low < X < high) for an exponential shifted to start at `low`.
        let mass = -(-(high - low) / mu).exp_m1();
        Ok(Some(Shape::Exponential(ResolvedExponential {
            mu,
            mass,
            ln_norm: mu.ln() + mass.ln(),
        })))
    }
}

#[derive(Debug, Clone)]
pub(super) struct ResolvedExponential {
    mu: f64,
    mass: f64,
    ln_norm: f64,
}

impl ResolvedExponential {
    pub(super) fn log_pdf(&self, x: f64, low: f64) -> f64 {
        -(x - low) / self.mu - self.ln_norm
    }

    pub(super) fn sample<R: Rng + ?Sized>(&self, low: f64, high: f64, rng: &mut R) -> Option<f64> {
        for _ in 0..MAX_ATTEMPTS {
            let u = rng.random::<f64>();
            let x = low - self.mu * (-u * self.mass).ln_1p();
            if low < x && x < high {
                return Some(x);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prior::Prior;
    use crate::statistics::{linspace, log_trapezoid};
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    fn resolved(mu: f64, low: f64, high: f64) -> ResolvedExponential {
        let exp = Exponential {
            mu: Some(Hyperparameter::Fixed(mu)),
        };
        match exp.resolve(&HyperPoint::new(), low, high).unwrap() {
            Some(Shape::Exponential(e)) => e,
            other => panic!("expected exponential, got {other:?}"),
        }
    }

    #[test]
    fn test_untruncated_density() {
        let e = resolved(2.0, 0.0, f64::INFINITY);
        assert!((e.log_pdf(3.0, 0.0) - (-1.5 - 2.0_f64.ln())).abs() < 1e-12);
    }

    #[test]
    fn test_truncated_density_normalises() {
        let e = resolved(0.7, 1.0, 3.0);
        let x = linspace(1.0, 3.0, 4001);
        let ln_y: Vec<f64> = x.iter().map(|&v| e.log_pdf(v, 1.0)).collect();
        assert!((log_trapezoid(&x, &ln_y).exp() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_sample_mean_matches_mu() {
        let e = resolved(1.5, 0.0, f64::INFINITY);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(21);
        let n = 50_000;
        let mean = (0..n).map(|_| e.sample(0.0, f64::INFINITY, &mut rng).unwrap()).sum::<f64>() / n as f64;
        assert!((mean - 1.5).abs() < 0.05, "mean = {mean}");
    }

    #[test]
    fn test_missing_free_value_is_an_error() {
        let exp = Exponential {
            mu: Some(Prior::uniform(0.0, 1.0, "mu").into()),
        };
        assert!(matches!(
            exp.resolve(&HyperPoint::new(), 0.0, 1.0),
            Err(DistributionError::UnknownHyperparameter(name)) if name == "mu"
        ));
    }
}
