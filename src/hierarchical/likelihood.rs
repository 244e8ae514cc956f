//! Hyper-likelihood of a population distribution given per-source results.
//!
//! Each source contributes ln ∫ p(q | θ) p_i(q) dq, where p_i is the source's
//! posterior for the observable. With Monte-Carlo integration the integral
//! is the mean of p(q | θ) over the source's samples; with numerical
//! integration it is a trapezoid sum of p(q | θ) times a density estimate of
//! p_i on a fixed observable grid. Grid sources contribute their marginal
//! likelihood under both methods; the grid's own prior is never used. Source
//! data is reduced once, up front, so that evaluation only touches the
//! population density.

use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use tracing::debug;

use crate::config::{IntegrationMethod, ModelConfig};
use crate::constants::Q22_NAME;
use crate::distribution::Distribution;
use crate::error::{AdapterError, DistributionError, ModelError};
use crate::results::SourceResult;
use crate::statistics::{
    counter_rng_seed, interp_ln, linspace, log_sum_exp_iter, log_trapezoid, subsample_indices,
    trapezoid_log_weights, GaussianKde,
};
use crate::types::HyperPoint;

#[derive(Debug, Clone)]
enum Terms {
    /// Observable samples per source.
    Samples(Vec<Vec<f64>>),
    /// Shared observable grid and, per source, ln(trapezoid weight × density).
    Grid { q22: Vec<f64>, integrands: Vec<Vec<f64>> },
}

/// Prepared hyper-likelihood.
#[derive(Debug, Clone)]
pub(crate) struct HyperLikelihood {
    distribution: Distribution,
    terms: Terms,
}

impl HyperLikelihood {
    /// Reduce every source to what the configured integration method needs.
    pub(crate) fn prepare(
        sources: &[SourceResult],
        distribution: &Distribution,
        config: &ModelConfig,
    ) -> Result<Self, ModelError> {
        let terms = match config.integration {
            IntegrationMethod::Sample => Terms::Samples(
                sources
                    .iter()
                    .enumerate()
                    .map(|(i, source)| source_samples(i, source, config))
                    .collect::<Result<_, _>>()?,
            ),
            IntegrationMethod::Numerical => prepare_numerical(sources, config)?,
        };
        Ok(Self {
            distribution: distribution.clone(),
            terms,
        })
    }

    /// Population distribution the likelihood is defined over.
    pub(crate) fn distribution(&self) -> &Distribution {
        &self.distribution
    }

    /// Σ over sources of ln ∫ p(q | θ) p_i(q) dq.
    ///
    /// Returns `-inf` where the population density is undefined or invalid,
    /// or where any source has zero overlap with it.
    ///
    /// # Errors
    ///
    /// `UnknownHyperparameter` if a free hyperparameter is missing from
    /// `values`.
    pub(crate) fn ln_likelihood(&self, values: &HyperPoint) -> Result<f64, DistributionError> {
        let density = match self.distribution.resolve(values)? {
            Some(density) if density.is_valid() => density,
            _ => return Ok(f64::NEG_INFINITY),
        };

        let mut total = 0.0;
        match &self.terms {
            Terms::Samples(sources) => {
                for samples in sources {
                    let ln_sum = log_sum_exp_iter(samples.iter().map(|&q| density.log_pdf(q)));
                    total += ln_sum - (samples.len() as f64).ln();
                    if total == f64::NEG_INFINITY {
                        break;
                    }
                }
            }
            Terms::Grid { q22, integrands } => {
                let ln_pop: Vec<f64> = q22.iter().map(|&q| density.log_pdf(q)).collect();
                for integrand in integrands {
                    total += log_sum_exp_iter(integrand.iter().zip(&ln_pop).map(|(a, b)| a + b));
                    if total == f64::NEG_INFINITY {
                        break;
                    }
                }
            }
        }
        Ok(total)
    }
}

fn malformed(index: usize, source: &SourceResult, what: &str) -> ModelError {
    ModelError::Adapter(AdapterError::Malformed(format!(
        "source {index} ('{}'): {what}",
        source.label()
    )))
}

fn missing_observable(index: usize, source: &SourceResult) -> ModelError {
    ModelError::MissingObservable {
        source_label: format!("{index} ('{}')", source.label()),
        observable: Q22_NAME.to_string(),
    }
}

/// Finite observable samples of one source, subsampled if configured.
fn source_samples(index: usize, source: &SourceResult, config: &ModelConfig) -> Result<Vec<f64>, ModelError> {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(counter_rng_seed(config.seed, index as u64));
    let samples = match source {
        SourceResult::Posterior(result) => {
            let (_, column) = result
                .posterior
                .find_column(Q22_NAME)
                .ok_or_else(|| missing_observable(index, source))?;
            let finite: Vec<f64> = column.iter().copied().filter(|q| q.is_finite()).collect();
            if finite.len() < column.len() {
                debug!(
                    source = index,
                    dropped = column.len() - finite.len(),
                    "ignoring non-finite samples"
                );
            }
            match config.nsamples {
                Some(n) => subsample_indices(finite.len(), n, &mut rng)
                    .into_iter()
                    .map(|i| finite[i])
                    .collect(),
                None => finite,
            }
        }
        SourceResult::Grid(grid) => {
            let n = config.nsamples.unwrap_or(config.grid_source_samples);
            grid.draw_likelihood_samples(Q22_NAME, n, &mut rng)
                .map_err(|_| missing_observable(index, source))?
        }
    };
    if samples.is_empty() {
        return Err(malformed(index, source, "no usable observable samples"));
    }
    debug!(source = index, nsamples = samples.len(), "prepared source samples");
    Ok(samples)
}

fn prepare_numerical(sources: &[SourceResult], config: &ModelConfig) -> Result<Terms, ModelError> {
    let (low, high) = match config.q22range {
        Some(range) => range,
        None => data_span(sources, config)?,
    };
    let q22 = linspace(low, high, config.q22_bins);
    let weights = trapezoid_log_weights(&q22);
    debug!(low, high, bins = q22.len(), "observable integration grid");

    let mut integrands = Vec::with_capacity(sources.len());
    for (index, source) in sources.iter().enumerate() {
        let ln_density: Vec<f64> = match source {
            SourceResult::Posterior(_) => {
                let samples = source_samples(index, source, config)?;
                let kde = GaussianKde::new(&samples, config.bandwidth)
                    .ok_or_else(|| malformed(index, source, "cannot build a density estimate"))?;
                q22.iter().map(|&q| kde.ln_pdf(q)).collect()
            }
            SourceResult::Grid(grid) => {
                let axis = grid
                    .sample_points(Q22_NAME)
                    .ok_or_else(|| missing_observable(index, source))?;
                let ln_l = grid
                    .marginalize_ln_likelihood(Q22_NAME)
                    .map_err(|_| missing_observable(index, source))?;
                let ln_norm = log_trapezoid(axis, &ln_l);
                if !ln_norm.is_finite() {
                    return Err(malformed(index, source, "likelihood is zero everywhere"));
                }
                q22.iter().map(|&q| interp_ln(axis, &ln_l, q) - ln_norm).collect()
            }
        };
        integrands.push(weights.iter().zip(&ln_density).map(|(w, d)| w + d).collect());
    }
    Ok(Terms::Grid { q22, integrands })
}

/// Observable range covered by the data.
fn data_span(sources: &[SourceResult], config: &ModelConfig) -> Result<(f64, f64), ModelError> {
    let mut low = f64::INFINITY;
    let mut high = f64::NEG_INFINITY;
    for (index, source) in sources.iter().enumerate() {
        let values: Vec<f64> = match source {
            SourceResult::Posterior(_) => source_samples(index, source, config)?,
            SourceResult::Grid(grid) => grid
                .sample_points(Q22_NAME)
                .ok_or_else(|| missing_observable(index, source))?
                .to_vec(),
        };
        for v in values {
            low = low.min(v);
            high = high.max(v);
        }
    }
    if low < high {
        Ok((low, high))
    } else {
        Err(ModelError::InvalidRange(format!(
            "observable data span [{low}, {high}] is empty; set q22range explicitly"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prior::Prior;
    use crate::results::{EvidenceGrid, GridAxis, PosteriorResult, SampleTable};

    fn posterior(samples: Vec<f64>) -> SourceResult {
        let table = SampleTable::from_columns([("Q22", samples)]).unwrap();
        SourceResult::Posterior(PosteriorResult::from_samples("src", table))
    }

    fn exponential() -> Distribution {
        Distribution::exponential(Q22_NAME, Prior::uniform(0.1, 10.0, "mu")).unwrap()
    }

    fn point(mu: f64) -> HyperPoint {
        [("mu".to_string(), mu)].into_iter().collect()
    }

    #[test]
    fn test_sample_integration_matches_direct_mean() {
        let sources = vec![posterior(vec![0.5, 1.0, 2.0]), posterior(vec![3.0, 4.0])];
        let dist = exponential();
        let lnl = HyperLikelihood::prepare(&sources, &dist, &ModelConfig::default()).unwrap();

        let mu: f64 = 1.7;
        let pdf = |q: f64| (-q / mu).exp() / mu;
        let expected = ((pdf(0.5) + pdf(1.0) + pdf(2.0)) / 3.0).ln() + ((pdf(3.0) + pdf(4.0)) / 2.0).ln();
        assert!((lnl.ln_likelihood(&point(mu)).unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_sample_integration_is_stable_for_narrow_populations() {
        let sources = vec![posterior(vec![1e30, 1.1e30, 0.9e30])];
        let dist = Distribution::bounded_gaussian(
            Q22_NAME,
            vec![Prior::uniform(0.0, 1e32, "mu0").into()],
            vec![1e27.into()],
            None,
        )
        .unwrap();
        let lnl = HyperLikelihood::prepare(&sources, &dist, &ModelConfig::default()).unwrap();
        let values: HyperPoint = [("mu0".to_string(), 1e30)].into_iter().collect();
        let v = lnl.ln_likelihood(&values).unwrap();
        assert!(v.is_finite(), "ln L = {v}");
    }

    #[test]
    fn test_invalid_population_point_is_zero_likelihood() {
        let sources = vec![posterior(vec![1.0, 2.0])];
        let dist = Distribution::exponential(Q22_NAME, Prior::uniform(-1.0, 1.0, "mu")).unwrap();
        let lnl = HyperLikelihood::prepare(&sources, &dist, &ModelConfig::default()).unwrap();
        assert_eq!(lnl.ln_likelihood(&point(-0.5)).unwrap(), f64::NEG_INFINITY);
    }

    #[test]
    fn test_subsampling_caps_samples() {
        let sources = vec![posterior((0..100).map(f64::from).collect())];
        let config = ModelConfig {
            nsamples: Some(10),
            ..ModelConfig::default()
        };
        let samples = source_samples(0, &sources[0], &config).unwrap();
        assert_eq!(samples.len(), 10);
    }

    #[test]
    fn test_numerical_integration_agrees_with_sampling() {
        // Source samples from N(3, 0.5²); the KDE-based integral should be
        // close to the Monte-Carlo average for a smooth population.
        let samples: Vec<f64> = (0..2000)
            .map(|i| {
                let u = (i as f64 + 0.5) / 2000.0;
                3.0 + 0.5 * std::f64::consts::SQRT_2 * statrs::function::erf::erf_inv(2.0 * u - 1.0)
            })
            .collect();
        let sources = vec![posterior(samples)];
        let dist = exponential();
        let sampled = HyperLikelihood::prepare(&sources, &dist, &ModelConfig::default()).unwrap();
        let numerical = HyperLikelihood::prepare(
            &sources,
            &dist,
            &ModelConfig {
                integration: IntegrationMethod::Numerical,
                q22range: Some((0.0, 6.0)),
                ..ModelConfig::default()
            },
        )
        .unwrap();
        let a = sampled.ln_likelihood(&point(2.0)).unwrap();
        let b = numerical.ln_likelihood(&point(2.0)).unwrap();
        assert!((a - b).abs() < 0.02, "sampled {a}, numerical {b}");
    }

    #[test]
    fn test_grid_source_numerical_integration() {
        // Flat source likelihood on [0, 4]: integral is the population mass
        // on [0, 4] divided by 4.
        let axis = linspace(0.0, 4.0, 401);
        let grid = EvidenceGrid::new("g", vec![GridAxis::new("Q22", axis)], vec![0.0; 401], None).unwrap();
        let sources = vec![SourceResult::Grid(grid)];
        let config = ModelConfig {
            integration: IntegrationMethod::Numerical,
            ..ModelConfig::default()
        };
        let lnl = HyperLikelihood::prepare(&sources, &exponential(), &config).unwrap();
        let mu: f64 = 1.0;
        let expected = ((1.0 - (-4.0 / mu).exp()) / 4.0).ln();
        assert!((lnl.ln_likelihood(&point(mu)).unwrap() - expected).abs() < 1e-3);
    }

    #[test]
    fn test_grid_source_methods_ignore_the_prior() {
        // Flat likelihood with a prior growing like q: both methods must
        // integrate against the likelihood alone.
        let axis = linspace(0.0, 4.0, 401);
        let ln_prior: Vec<f64> = axis.iter().map(|q: &f64| q.ln()).collect();
        let grid =
            EvidenceGrid::new("g", vec![GridAxis::new("Q22", axis)], vec![0.0; 401], Some(ln_prior)).unwrap();
        let sources = vec![SourceResult::Grid(grid)];
        let dist = exponential();

        let sampled = HyperLikelihood::prepare(
            &sources,
            &dist,
            &ModelConfig {
                grid_source_samples: 50_000,
                ..ModelConfig::default()
            },
        )
        .unwrap();
        let numerical = HyperLikelihood::prepare(
            &sources,
            &dist,
            &ModelConfig {
                integration: IntegrationMethod::Numerical,
                ..ModelConfig::default()
            },
        )
        .unwrap();

        let expected = ((1.0 - (-4.0f64).exp()) / 4.0).ln();
        let a = sampled.ln_likelihood(&point(1.0)).unwrap();
        let b = numerical.ln_likelihood(&point(1.0)).unwrap();
        assert!((a - expected).abs() < 0.03, "sampled {a}, expected {expected}");
        assert!((b - expected).abs() < 1e-3, "numerical {b}, expected {expected}");
    }

    #[test]
    fn test_unknown_hyperparameter_is_an_error() {
        let sources = vec![posterior(vec![1.0, 2.0])];
        let lnl = HyperLikelihood::prepare(&sources, &exponential(), &ModelConfig::default()).unwrap();
        let values: HyperPoint = [("mu_typo".to_string(), 1.0)].into_iter().collect();
        assert!(matches!(
            lnl.ln_likelihood(&values),
            Err(DistributionError::UnknownHyperparameter(_))
        ));
    }

    #[test]
    fn test_missing_observable_column() {
        let table = SampleTable::from_columns([("h0", vec![1.0])]).unwrap();
        let sources = vec![SourceResult::Posterior(PosteriorResult::from_samples("s", table))];
        let err = HyperLikelihood::prepare(&sources, &exponential(), &ModelConfig::default());
        assert!(matches!(err, Err(ModelError::MissingObservable { .. })));
    }
}
