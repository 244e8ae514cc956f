//! # pulsar-population
//!
//! Hierarchical inference of the mass-quadrupole (`Q22`) population of
//! known pulsars from per-source continuous-wave search results.
//!
//! Each source contributes either posterior samples over `q22` or a
//! likelihood evaluated on a `q22` grid. A population [`Distribution`]
//! (a bounded Gaussian mixture or a bounded exponential) has some of its
//! hyperparameters left free with a [`Prior`]; [`MassQuadrupoleDistribution`]
//! combines the sources into a hyper-likelihood over those free
//! hyperparameters and then infers them by nested sampling or by
//! evaluation on a hyperparameter grid.
//!
//! ## Quick Start
//!
//! ```ignore
//! use pulsar_population::{hyperparameters, MassQuadrupoleDistribution, Prior, SampleOptions};
//!
//! let mut model = MassQuadrupoleDistribution::builder()
//!     .data(["J0534+2200_result.json", "J0835-4510_result.json"])
//!     .distribution("exponential")
//!     .distribution_kwargs(hyperparameters([("mu", Prior::uniform(0.0, 1e33, "mu"))]))
//!     .q22range(&[0.0, 1e33])
//!     .build()?;
//!
//! let result = model.sample(&SampleOptions::default())?;
//! println!("{}", pulsar_population::output::format_posterior(&result));
//! ```
//!
//! ## Undefined densities
//!
//! A distribution whose hyperparameters are free, or resolve to unusable
//! values, has no density. [`Distribution::log_pdf`] and
//! [`Distribution::sample`] then return `Ok(None)` rather than an error;
//! the hyper-likelihood treats such points as having zero likelihood.

#![warn(missing_docs)]
#![warn(clippy::all)]

// Core modules
mod config;
mod constants;
mod error;
mod prior;
mod thread_pool;
mod types;

// Functional modules
pub mod distribution;
pub mod hierarchical;
pub mod output;
pub mod results;
pub mod sampler;
pub mod statistics;

// Re-exports for public API
pub use config::{Bandwidth, IntegrationMethod, ModelConfig, SampleOptions, SamplerKind};
pub use constants::{LOG_2PI, Q22_NAME};
pub use distribution::{
    create_distribution, create_distribution_from_json, kwargs_from_json, Distribution,
    DistributionKind, DistributionSpec, ResolvedDensity,
};
pub use error::{AdapterError, DistributionError, ModelError, SamplerError};
pub use hierarchical::{
    HierarchicalOutcome, MassQuadrupoleDistribution, MassQuadrupoleDistributionBuilder, ModelState,
};
pub use prior::{Prior, PriorFamily};
pub use results::{
    load, EvidenceGrid, GridAxis, PosteriorResult, ResultSource, SampleTable, SourceResult,
};
pub use sampler::{LogLikelihood, NestedSampler, Sampler};
pub use types::{hyperparameters, HyperPoint, HyperValue, Hyperparameter, Hyperparameters};
