//! Population inference over the pulsar mass quadrupole `Q22`.
//!
//! [`MassQuadrupoleDistribution`] combines per-source results (posterior
//! samples or likelihood grids over `Q22`) with a population
//! [`Distribution`] whose free hyperparameters are then inferred, either by
//! nested sampling or by evaluation on a hyperparameter grid.
//!
//! ```ignore
//! use pulsar_population::{Distribution, MassQuadrupoleDistribution, Prior, SampleOptions};
//!
//! let dist = Distribution::exponential("q22", Prior::uniform(0.0, 1e32, "mu"))?;
//! let mut model = MassQuadrupoleDistribution::builder()
//!     .data(["J0534+2200_result.json", "J0835-4510_result.json"])
//!     .distribution(dist)
//!     .build()?;
//! let result = model.sample(&SampleOptions::default())?;
//! println!("Q22 < {:.2e} (95%)", result.upper_limit("mu", 0.95)?);
//! ```

mod grid;
mod likelihood;

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, info};

use crate::config::{Bandwidth, IntegrationMethod, ModelConfig, SampleOptions, SamplerKind};
use crate::constants::Q22_NAME;
use crate::distribution::{create_distribution, Distribution, DistributionSpec};
use crate::error::ModelError;
use crate::prior::Prior;
use crate::results::{load, EvidenceGrid, PosteriorResult, ResultSource, SourceResult};
use crate::sampler::{sampler_for, save_result, Sampler};
use crate::types::{HyperPoint, Hyperparameters};

use likelihood::HyperLikelihood;

/// Lifecycle of a [`MassQuadrupoleDistribution`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelState {
    /// Data or distribution still missing.
    Unbuilt,
    /// Ready to sample.
    Configured,
    /// At least one sampling or grid run has completed.
    Sampled,
}

/// Result of [`MassQuadrupoleDistribution::run`].
#[derive(Debug, Clone)]
pub enum HierarchicalOutcome {
    /// Nested-sampling posterior.
    Posterior(PosteriorResult),
    /// Evidence on a hyperparameter grid.
    Grid(EvidenceGrid),
}

/// Hierarchical model of the `Q22` population.
#[derive(Debug, Clone)]
pub struct MassQuadrupoleDistribution {
    sources: Vec<SourceResult>,
    distribution: Option<Distribution>,
    config: ModelConfig,
    likelihood: Option<HyperLikelihood>,
    state: ModelState,
}

/// Builder for [`MassQuadrupoleDistribution`].
///
/// Nothing is validated until [`build`](Self::build), which checks every
/// setting before any data-dependent work starts.
#[derive(Debug, Clone, Default)]
pub struct MassQuadrupoleDistributionBuilder {
    data: Vec<ResultSource>,
    distribution: Option<DistributionSpec>,
    distribution_kwargs: Hyperparameters,
    q22range: Option<Vec<f64>>,
    sampler: Option<String>,
    bandwidth: Option<String>,
    bandwidth_factor: Option<f64>,
    grid: Option<BTreeMap<String, usize>>,
    integration: Option<IntegrationMethod>,
    nsamples: Option<usize>,
    q22_bins: Option<usize>,
    seed: Option<u64>,
}

impl MassQuadrupoleDistributionBuilder {
    /// Add per-source results.
    pub fn data<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ResultSource>,
    {
        self.data.extend(sources.into_iter().map(Into::into));
        self
    }

    /// Add one per-source result.
    pub fn source(mut self, source: impl Into<ResultSource>) -> Self {
        self.data.push(source.into());
        self
    }

    /// Population distribution, as an instance or a family name.
    pub fn distribution(mut self, spec: impl Into<DistributionSpec>) -> Self {
        self.distribution = Some(spec.into());
        self
    }

    /// Keyword arguments used when the distribution is given by family name.
    pub fn distribution_kwargs(mut self, kwargs: Hyperparameters) -> Self {
        self.distribution_kwargs = kwargs;
        self
    }

    /// Observable range for numerical integration: exactly two increasing
    /// values.
    pub fn q22range(mut self, range: &[f64]) -> Self {
        self.q22range = Some(range.to_vec());
        self
    }

    /// Sampling backend by name (`dynesty` or `nestle`).
    pub fn sampler(mut self, name: &str) -> Self {
        self.sampler = Some(name.to_string());
        self
    }

    /// KDE bandwidth rule by name (`scott`, `silverman`) or number.
    pub fn bw(mut self, mode: &str) -> Self {
        self.bandwidth = Some(mode.to_string());
        self.bandwidth_factor = None;
        self
    }

    /// Fixed KDE bandwidth factor.
    pub fn bw_factor(mut self, factor: f64) -> Self {
        self.bandwidth_factor = Some(factor);
        self.bandwidth = None;
        self
    }

    /// Evaluate on a grid instead of sampling. Keys are free-hyperparameter
    /// names; a `q22` key sets the observable integration resolution.
    pub fn grid<K: Into<String>>(mut self, grid: impl IntoIterator<Item = (K, usize)>) -> Self {
        self.grid = Some(grid.into_iter().map(|(k, v)| (k.into(), v)).collect());
        self
    }

    /// Marginalisation strategy.
    pub fn integration(mut self, method: IntegrationMethod) -> Self {
        self.integration = Some(method);
        self
    }

    /// Cap on samples used per source.
    pub fn nsamples(mut self, n: usize) -> Self {
        self.nsamples = Some(n);
        self
    }

    /// Observable grid points for numerical integration.
    pub fn q22_bins(mut self, bins: usize) -> Self {
        self.q22_bins = Some(bins);
        self
    }

    /// Seed for subsampling.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Validate settings, load the data and prepare the likelihood.
    ///
    /// The model is [`ModelState::Configured`] when both data and a
    /// distribution were given, [`ModelState::Unbuilt`] otherwise.
    ///
    /// # Errors
    ///
    /// `UnknownSampler`, `UnknownBandwidthMode`, `InvalidRange`,
    /// `InvalidGrid`, `InvalidDataType`, `DistributionNameMismatch`,
    /// `NoFreeParameters`, `MissingObservable`, and any adapter or
    /// distribution error.
    pub fn build(self) -> Result<MassQuadrupoleDistribution, ModelError> {
        let config = self.config()?;

        let mut sources = Vec::with_capacity(self.data.len());
        for (index, source) in self.data.into_iter().enumerate() {
            sources.push(load_source(index, source)?);
        }

        let distribution = self
            .distribution
            .map(|spec| population_distribution(spec, self.distribution_kwargs))
            .transpose()?;

        let mut model = MassQuadrupoleDistribution {
            sources,
            distribution,
            config,
            likelihood: None,
            state: ModelState::Unbuilt,
        };
        model.refresh()?;
        Ok(model)
    }

    fn config(&self) -> Result<ModelConfig, ModelError> {
        let mut config = ModelConfig::default();

        if let Some(name) = &self.sampler {
            config.sampler = name.parse::<SamplerKind>()?;
        }
        if let Some(mode) = &self.bandwidth {
            config.bandwidth = mode.parse::<Bandwidth>()?;
        }
        if let Some(factor) = self.bandwidth_factor {
            if !(factor.is_finite() && factor > 0.0) {
                return Err(ModelError::UnknownBandwidthMode(factor.to_string()));
            }
            config.bandwidth = Bandwidth::Fixed(factor);
        }
        if let Some(range) = &self.q22range {
            config.q22range = Some(check_range(range)?);
        }
        if let Some(method) = self.integration {
            config.integration = method;
        }
        if let Some(n) = self.nsamples {
            if n == 0 {
                return Err(ModelError::InvalidDataType("nsamples must be positive".to_string()));
            }
            config.nsamples = Some(n);
        }
        if let Some(bins) = self.q22_bins {
            config.q22_bins = bins;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(grid) = &self.grid {
            if let Some((_, &bins)) = grid.iter().find(|(k, _)| k.eq_ignore_ascii_case(Q22_NAME)) {
                config.q22_bins = bins;
            }
            config.grid = Some(grid.clone());
        }
        if config.q22_bins < 2 {
            return Err(ModelError::InvalidGrid(format!(
                "observable grid needs at least 2 points, got {}",
                config.q22_bins
            )));
        }
        Ok(config)
    }
}

fn check_range(range: &[f64]) -> Result<(f64, f64), ModelError> {
    match range {
        [low, high] if low.is_finite() && high.is_finite() && low < high => Ok((*low, *high)),
        [_, _] => Err(ModelError::InvalidRange(format!(
            "q22range must be increasing, got {range:?}"
        ))),
        _ => Err(ModelError::InvalidRange(format!(
            "q22range must have exactly two values, got {}",
            range.len()
        ))),
    }
}

fn load_source(index: usize, source: ResultSource) -> Result<SourceResult, ModelError> {
    if let ResultSource::Json(value) = &source {
        if !matches!(value, Value::Object(_) | Value::String(_)) {
            return Err(ModelError::InvalidDataType(format!(
                "data element {index} must be a result, a path or a JSON object, got {value}"
            )));
        }
    }
    let result = load(source)?;
    debug!(index, label = result.label(), "loaded source");
    Ok(result)
}

fn population_distribution(spec: DistributionSpec, kwargs: Hyperparameters) -> Result<Distribution, ModelError> {
    let distribution = match spec {
        DistributionSpec::Instance(dist) => dist,
        kind @ DistributionSpec::Kind(_) => create_distribution(Q22_NAME, kind, kwargs)?,
    };
    if distribution.name() != Q22_NAME {
        return Err(ModelError::DistributionNameMismatch {
            expected: Q22_NAME.to_string(),
            found: distribution.name().to_string(),
        });
    }
    if !distribution.has_free_parameters() {
        return Err(ModelError::NoFreeParameters);
    }
    Ok(distribution)
}

impl MassQuadrupoleDistribution {
    /// Start building a model.
    pub fn builder() -> MassQuadrupoleDistributionBuilder {
        MassQuadrupoleDistributionBuilder::default()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ModelState {
        self.state
    }

    /// Loaded per-source results.
    pub fn sources(&self) -> &[SourceResult] {
        &self.sources
    }

    /// Population distribution, if set.
    pub fn distribution(&self) -> Option<&Distribution> {
        self.distribution.as_ref()
    }

    /// Effective configuration.
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Priors of the free hyperparameters.
    pub fn priors(&self) -> Vec<&Prior> {
        self.distribution
            .as_ref()
            .map(Distribution::free_parameters)
            .unwrap_or_default()
    }

    /// Add one per-source result.
    ///
    /// # Errors
    ///
    /// As for [`MassQuadrupoleDistributionBuilder::build`]; the model is
    /// unchanged on error.
    pub fn add_data(&mut self, source: impl Into<ResultSource>) -> Result<(), ModelError> {
        let result = load_source(self.sources.len(), source.into())?;
        self.sources.push(result);
        if let Err(e) = self.refresh() {
            self.sources.pop();
            self.refresh()?;
            return Err(e);
        }
        Ok(())
    }

    /// Set or replace the population distribution.
    ///
    /// # Errors
    ///
    /// `DistributionNameMismatch`, `NoFreeParameters`, `MissingObservable`
    /// or a factory error; the model is unchanged on error.
    pub fn set_distribution(
        &mut self,
        spec: impl Into<DistributionSpec>,
        kwargs: Hyperparameters,
    ) -> Result<(), ModelError> {
        let distribution = population_distribution(spec.into(), kwargs)?;
        let previous = self.distribution.replace(distribution);
        if let Err(e) = self.refresh() {
            self.distribution = previous;
            self.refresh()?;
            return Err(e);
        }
        Ok(())
    }

    /// Hyper-log-likelihood at `values`.
    ///
    /// # Errors
    ///
    /// `NotConfigured` until data and a distribution are set;
    /// `UnknownHyperparameter` if a free hyperparameter is missing from
    /// `values`.
    pub fn ln_likelihood(&self, values: &HyperPoint) -> Result<f64, ModelError> {
        Ok(self.prepared()?.ln_likelihood(values)?)
    }

    /// Nested-sample the hyperparameters with the configured backend.
    ///
    /// Each call starts a fresh run.
    ///
    /// # Errors
    ///
    /// `NotConfigured` or a sampler error.
    pub fn sample(&mut self, options: &SampleOptions) -> Result<PosteriorResult, ModelError> {
        let sampler = sampler_for(self.config.sampler);
        self.sample_with(&sampler, options)
    }

    /// Nested-sample the hyperparameters with a caller-supplied backend.
    ///
    /// # Errors
    ///
    /// `NotConfigured` or a sampler error.
    pub fn sample_with(&mut self, sampler: &dyn Sampler, options: &SampleOptions) -> Result<PosteriorResult, ModelError> {
        let likelihood = self.prepared()?;
        let priors: Vec<Prior> = likelihood.distribution().free_parameters().into_iter().cloned().collect();
        info!(
            sampler = sampler.name(),
            sources = self.sources.len(),
            hyperparameters = priors.len(),
            "sampling population hyperparameters"
        );

        // The sampler names every point after the priors, so lookups cannot fail.
        let ln_likelihood =
            |values: &HyperPoint| likelihood.ln_likelihood(values).unwrap_or(f64::NEG_INFINITY);
        let result = sampler.run(&ln_likelihood, &priors, options)?;
        if options.save {
            save_result(&result, options)?;
        }
        self.state = ModelState::Sampled;
        Ok(result)
    }

    /// Evaluate the hyper-likelihood on the configured grid.
    ///
    /// # Errors
    ///
    /// `NotConfigured`, or `InvalidGrid` if no grid was configured or it does
    /// not cover the free hyperparameters.
    pub fn evaluate_grid(&mut self) -> Result<EvidenceGrid, ModelError> {
        self.evaluate_grid_labelled(&SampleOptions::default().label)
    }

    fn evaluate_grid_labelled(&mut self, label: &str) -> Result<EvidenceGrid, ModelError> {
        let likelihood = self.prepared()?;
        let spec = self
            .config
            .grid
            .as_ref()
            .ok_or_else(|| ModelError::InvalidGrid("no hyperparameter grid configured".to_string()))?;
        let priors = likelihood.distribution().free_parameters();
        let result = grid::evaluate(likelihood, &priors, spec, label)?;
        self.state = ModelState::Sampled;
        Ok(result)
    }

    /// Grid evaluation if a grid was configured, nested sampling otherwise.
    ///
    /// # Errors
    ///
    /// As for [`sample`](Self::sample) or [`evaluate_grid`](Self::evaluate_grid).
    pub fn run(&mut self, options: &SampleOptions) -> Result<HierarchicalOutcome, ModelError> {
        if self.config.grid.is_some() {
            self.evaluate_grid_labelled(&options.label).map(HierarchicalOutcome::Grid)
        } else {
            self.sample(options).map(HierarchicalOutcome::Posterior)
        }
    }

    fn prepared(&self) -> Result<&HyperLikelihood, ModelError> {
        self.likelihood.as_ref().ok_or(ModelError::NotConfigured(
            "both per-source data and a population distribution are required",
        ))
    }

    /// Re-check invariants and rebuild the likelihood once both data and a
    /// distribution are present.
    fn refresh(&mut self) -> Result<(), ModelError> {
        for (index, source) in self.sources.iter().enumerate() {
            if !source.has_parameter(Q22_NAME) {
                return Err(ModelError::MissingObservable {
                    source_label: format!("{index} ('{}')", source.label()),
                    observable: Q22_NAME.to_string(),
                });
            }
        }

        let Some(distribution) = &self.distribution else {
            self.likelihood = None;
            self.state = ModelState::Unbuilt;
            return Ok(());
        };
        if let Some(spec) = &self.config.grid {
            grid::validate_grid(spec, &distribution.free_parameters())?;
        }
        if self.sources.is_empty() {
            self.likelihood = None;
            self.state = ModelState::Unbuilt;
            return Ok(());
        }

        self.likelihood = Some(HyperLikelihood::prepare(&self.sources, distribution, &self.config)?);
        if self.state == ModelState::Unbuilt {
            self.state = ModelState::Configured;
        }
        info!(
            sources = self.sources.len(),
            kind = %distribution.kind(),
            hyperparameters = distribution.free_parameters().len(),
            "configured hierarchical model"
        );
        Ok(())
    }
}
