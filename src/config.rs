//! Configuration for hierarchical inference.

use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_DLOGZ, DEFAULT_MAX_ITERATIONS, DEFAULT_NLIVE, DEFAULT_Q22_BINS, DEFAULT_WALKS,
};
use crate::error::ModelError;

/// Nested-sampling backends understood by the model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplerKind {
    /// Live points replaced by a constrained random walk from an existing
    /// live point.
    #[default]
    Dynesty,
    /// Live points replaced by rejection sampling from the prior.
    Nestle,
}

impl SamplerKind {
    /// Lower-case backend name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SamplerKind::Dynesty => "dynesty",
            SamplerKind::Nestle => "nestle",
        }
    }
}

impl fmt::Display for SamplerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SamplerKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dynesty" => Ok(Self::Dynesty),
            "nestle" => Ok(Self::Nestle),
            _ => Err(ModelError::UnknownSampler(s.to_string())),
        }
    }
}

/// Bandwidth selection for per-source kernel density estimates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bandwidth {
    /// Scott's rule, `n^(-1/5)`.
    #[default]
    Scott,
    /// Silverman's rule, `(3n/4)^(-1/5)`.
    Silverman,
    /// Fixed factor multiplying the sample standard deviation.
    Fixed(f64),
}

impl FromStr for Bandwidth {
    type Err = ModelError;

    /// Parses `scott`, `silverman`, or a positive number.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scott" => Ok(Self::Scott),
            "silverman" => Ok(Self::Silverman),
            other => match other.parse::<f64>() {
                Ok(f) if f.is_finite() && f > 0.0 => Ok(Self::Fixed(f)),
                _ => Err(ModelError::UnknownBandwidthMode(s.to_string())),
            },
        }
    }
}

/// How each source's evidence for the observable is marginalised.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrationMethod {
    /// Monte-Carlo average of the population density over the source's
    /// posterior samples.
    #[default]
    Sample,
    /// Trapezoid integral of a KDE (or the source's own grid) times the
    /// population density on a fixed observable grid.
    Numerical,
}

/// Configuration for [`MassQuadrupoleDistribution`](crate::MassQuadrupoleDistribution).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Sampling backend used by `sample()` (default: dynesty).
    pub sampler: SamplerKind,

    /// KDE bandwidth for numerical integration (default: Scott).
    pub bandwidth: Bandwidth,

    /// Marginalisation strategy (default: Monte-Carlo over samples).
    pub integration: IntegrationMethod,

    /// Observable range for numerical integration. Derived from the data
    /// when unset.
    pub q22range: Option<(f64, f64)>,

    /// Number of observable grid points for numerical integration.
    pub q22_bins: usize,

    /// Per-hyperparameter grid resolution. When set, `run()` evaluates an
    /// evidence grid instead of sampling.
    pub grid: Option<BTreeMap<String, usize>>,

    /// Cap on posterior samples used per source (default: all).
    pub nsamples: Option<usize>,

    /// Samples drawn from each grid source under Monte-Carlo integration.
    pub grid_source_samples: usize,

    /// Seed for subsampling and grid-source draws.
    pub seed: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            sampler: SamplerKind::default(),
            bandwidth: Bandwidth::default(),
            integration: IntegrationMethod::default(),
            q22range: None,
            q22_bins: DEFAULT_Q22_BINS,
            grid: None,
            nsamples: None,
            grid_source_samples: 2_000,
            seed: 0x5eed,
        }
    }
}

/// Runtime options handed to a sampling backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleOptions {
    /// Number of live points (default: 500).
    pub nlive: usize,

    /// Stop once the estimated remaining log-evidence falls below this
    /// (default: 0.1).
    pub dlogz: f64,

    /// Random-walk steps per replacement for the dynesty backend (default: 25).
    pub walks: usize,

    /// Hard cap on iterations (default: 200,000).
    pub max_iterations: usize,

    /// Optional deterministic seed.
    pub seed: Option<u64>,

    /// Write the result to `<outdir>/<label>_result.json`.
    pub save: bool,

    /// Output directory for saved results (default: `outdir`).
    pub outdir: PathBuf,

    /// Run label (default: `hierarchical`).
    pub label: String,
}

impl Default for SampleOptions {
    fn default() -> Self {
        Self {
            nlive: DEFAULT_NLIVE,
            dlogz: DEFAULT_DLOGZ,
            walks: DEFAULT_WALKS,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            seed: None,
            save: false,
            outdir: PathBuf::from("outdir"),
            label: "hierarchical".to_string(),
        }
    }
}

impl SampleOptions {
    /// Reduced settings for tests and quick looks.
    pub fn quick() -> Self {
        Self {
            nlive: 100,
            walks: 10,
            ..Self::default()
        }
    }

    /// Set the number of live points.
    pub fn nlive(mut self, nlive: usize) -> Self {
        self.nlive = nlive;
        self
    }

    /// Set the stopping tolerance.
    pub fn dlogz(mut self, dlogz: f64) -> Self {
        self.dlogz = dlogz;
        self
    }

    /// Set the RNG seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Enable or disable writing the result to disk.
    pub fn save(mut self, save: bool) -> Self {
        self.save = save;
        self
    }

    /// Set the output directory.
    pub fn outdir(mut self, outdir: impl Into<PathBuf>) -> Self {
        self.outdir = outdir.into();
        self
    }

    /// Set the run label.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Merge overrides from environment variables.
    ///
    /// Recognises `PP_NLIVE`, `PP_DLOGZ`, `PP_WALKS`, `PP_SEED`, `PP_SAVE`
    /// and `PP_OUTDIR`. Unparseable values are ignored.
    pub fn from_env(mut self) -> Self {
        if let Some(nlive) = parse_usize_env("PP_NLIVE") {
            self.nlive = nlive;
        }
        if let Some(dlogz) = parse_f64_env("PP_DLOGZ") {
            self.dlogz = dlogz;
        }
        if let Some(walks) = parse_usize_env("PP_WALKS") {
            self.walks = walks;
        }
        if let Some(seed) = parse_u64_env("PP_SEED") {
            self.seed = Some(seed);
        }
        if let Some(save) = parse_bool_env("PP_SAVE") {
            self.save = save;
        }
        if let Some(outdir) = parse_path_env("PP_OUTDIR") {
            self.outdir = outdir;
        }
        self
    }

    /// Path the result is written to when `save` is set.
    pub fn result_path(&self) -> PathBuf {
        self.outdir.join(format!("{}_result.json", self.label))
    }
}

fn parse_usize_env(key: &str) -> Option<usize> {
    env::var(key).ok()?.parse().ok()
}

fn parse_u64_env(key: &str) -> Option<u64> {
    env::var(key).ok()?.parse().ok()
}

fn parse_f64_env(key: &str) -> Option<f64> {
    env::var(key).ok()?.parse().ok()
}

fn parse_bool_env(key: &str) -> Option<bool> {
    match env::var(key).ok()?.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

fn parse_path_env(key: &str) -> Option<PathBuf> {
    env::var(key).ok().map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sampler_kind_parsing() {
        assert_eq!("Dynesty".parse::<SamplerKind>().unwrap(), SamplerKind::Dynesty);
        assert_eq!("nestle".parse::<SamplerKind>().unwrap(), SamplerKind::Nestle);
        assert!(matches!(
            "akgkfsfd".parse::<SamplerKind>(),
            Err(ModelError::UnknownSampler(_))
        ));
    }

    #[test]
    fn test_bandwidth_parsing() {
        assert_eq!("scott".parse::<Bandwidth>().unwrap(), Bandwidth::Scott);
        assert_eq!("Silverman".parse::<Bandwidth>().unwrap(), Bandwidth::Silverman);
        assert_eq!("0.3".parse::<Bandwidth>().unwrap(), Bandwidth::Fixed(0.3));
        assert!(matches!(
            "lkgadkgds".parse::<Bandwidth>(),
            Err(ModelError::UnknownBandwidthMode(_))
        ));
        assert!("-1.0".parse::<Bandwidth>().is_err());
    }

    #[test]
    fn test_model_config_defaults() {
        let config = ModelConfig::default();
        assert_eq!(config.sampler, SamplerKind::Dynesty);
        assert_eq!(config.bandwidth, Bandwidth::Scott);
        assert_eq!(config.integration, IntegrationMethod::Sample);
    }

    #[test]
    fn test_result_path() {
        let options = SampleOptions::default().outdir("/tmp/out").label("run");
        assert_eq!(options.result_path(), PathBuf::from("/tmp/out/run_result.json"));
    }

    #[test]
    fn test_env_overrides() {
        env::set_var("PP_NLIVE", "64");
        env::set_var("PP_SAVE", "yes");
        env::set_var("PP_DLOGZ", "not-a-number");
        let options = SampleOptions::default().from_env();
        env::remove_var("PP_NLIVE");
        env::remove_var("PP_SAVE");
        env::remove_var("PP_DLOGZ");

        assert_eq!(options.nlive, 64);
        assert!(options.save);
        assert_eq!(options.dlogz, DEFAULT_DLOGZ);
    }

    #[test]
    fn test_quick_preset() {
        let options = SampleOptions::quick();
        assert_eq!(options.nlive, 100);
        assert!(!options.save);
    }
}
