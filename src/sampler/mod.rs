//! Sampling backends for the hyper-likelihood.
//!
//! A backend receives a log-likelihood over [`HyperPoint`]s and the priors
//! of the free hyperparameters, and returns equally weighted posterior draws
//! together with the evidence.

mod nested;

use std::fs;
use std::path::PathBuf;

use tracing::info;

use crate::config::{SampleOptions, SamplerKind};
use crate::error::SamplerError;
use crate::output::to_json_pretty;
use crate::prior::Prior;
use crate::results::PosteriorResult;
use crate::types::HyperPoint;

pub use nested::NestedSampler;

/// Log-likelihood callback handed to a sampler.
pub type LogLikelihood<'a> = dyn Fn(&HyperPoint) -> f64 + Sync + 'a;

/// A backend that explores a log-likelihood under a set of priors.
pub trait Sampler {
    /// Backend name recorded in results.
    fn name(&self) -> &str;

    /// Sample the posterior of `ln_likelihood` under `priors`.
    ///
    /// # Errors
    ///
    /// Implementations report unusable options, an empty prior set, or a
    /// likelihood that is zero everywhere.
    fn run(
        &self,
        ln_likelihood: &LogLikelihood<'_>,
        priors: &[Prior],
        options: &SampleOptions,
    ) -> Result<PosteriorResult, SamplerError>;
}

/// Built-in backend for a configured sampler kind.
pub fn sampler_for(kind: SamplerKind) -> NestedSampler {
    NestedSampler::new(kind)
}

/// Write `result` to [`SampleOptions::result_path`], creating the output
/// directory if needed.
///
/// # Errors
///
/// `Io` if the directory or file cannot be written, `Serialize` if the
/// result cannot be encoded.
pub fn save_result(result: &PosteriorResult, options: &SampleOptions) -> Result<PathBuf, SamplerError> {
    let path = options.result_path();
    fs::create_dir_all(&options.outdir).map_err(|source| SamplerError::Io {
        path: options.outdir.clone(),
        source,
    })?;
    let json = to_json_pretty(result)?;
    fs::write(&path, json).map_err(|source| SamplerError::Io {
        path: path.clone(),
        source,
    })?;
    info!(path = %path.display(), "saved result");
    Ok(path)
}
