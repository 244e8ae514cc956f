//! One-dimensional Gaussian kernel density estimate.
//!
//! Bandwidth follows the usual convention: the kernel standard deviation is
//! a factor times the sample standard deviation, with the factor given by
//! Scott's rule `n^(-1/5)`, Silverman's rule `(3n/4)^(-1/5)`, or a fixed value.

use crate::config::Bandwidth;
use crate::constants::LOG_2PI;

use super::logspace::log_mean_exp;

/// Gaussian KDE over a set of equally weighted samples.
#[derive(Debug, Clone)]
pub struct GaussianKde {
    samples: Vec<f64>,
    bandwidth: f64,
}

impl GaussianKde {
    /// Build a KDE.
    ///
    /// Returns `None` with fewer than two samples or zero sample variance,
    /// where no bandwidth can be derived.
    pub fn new(samples: &[f64], mode: Bandwidth) -> Option<Self> {
        let n = samples.len();
        if n < 2 {
            return None;
        }

        let mean = samples.iter().sum::<f64>() / n as f64;
        let var = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
        let std = var.sqrt();
        if !(std.is_finite() && std > 0.0) {
            return None;
        }

        let factor = match mode {
            Bandwidth::Scott => (n as f64).powf(-0.2),
            Bandwidth::Silverman => (n as f64 * 0.75).powf(-0.2),
            Bandwidth::Fixed(f) => f,
        };

        Some(Self {
            samples: samples.to_vec(),
            bandwidth: factor * std,
        })
    }

    /// Kernel standard deviation.
    pub fn bandwidth(&self) -> f64 {
        self.bandwidth
    }

    /// Natural-log density at `x`.
    pub fn ln_pdf(&self, x: f64) -> f64 {
        let norm = -self.bandwidth.ln() - 0.5 * LOG_2PI;
        let terms: Vec<f64> = self
            .samples
            .iter()
            .map(|s| {
                let z = (x - s) / self.bandwidth;
                -0.5 * z * z + norm
            })
            .collect();
        log_mean_exp(&terms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statistics::{linspace, log_trapezoid};

    fn samples() -> Vec<f64> {
        (0..200).map(|i| ((i as f64) * 0.731).sin() * 3.0 + 10.0).collect()
    }

    #[test]
    fn test_kde_integrates_to_one() {
        let kde = GaussianKde::new(&samples(), Bandwidth::Scott).unwrap();
        let x = linspace(-5.0, 25.0, 3001);
        let ln_y: Vec<f64> = x.iter().map(|&v| kde.ln_pdf(v)).collect();
        let integral = log_trapezoid(&x, &ln_y).exp();
        assert!((integral - 1.0).abs() < 1e-3, "integral = {integral}");
    }

    #[test]
    fn test_silverman_factor_relative_to_scott() {
        let s = samples();
        let scott = GaussianKde::new(&s, Bandwidth::Scott).unwrap();
        let silverman = GaussianKde::new(&s, Bandwidth::Silverman).unwrap();
        assert!(silverman.bandwidth() > 0.0);
        assert!((silverman.bandwidth() / scott.bandwidth() - 0.75_f64.powf(-0.2)).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_samples_have_no_kde() {
        assert!(GaussianKde::new(&[1.0], Bandwidth::Scott).is_none());
        assert!(GaussianKde::new(&[2.0, 2.0, 2.0], Bandwidth::Scott).is_none());
    }
}
