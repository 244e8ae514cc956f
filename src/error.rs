//! Error types.
//!
//! Construction and query failures are returned as errors. An undefined
//! density is not an error: it is reported as `Ok(None)` by the
//! distribution layer.

use std::path::PathBuf;

use thiserror::Error;

/// Failures while constructing or querying a [`Distribution`](crate::Distribution).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DistributionError {
    /// Distribution family name is not one of the supported kinds.
    #[error("unknown distribution kind '{0}'")]
    InvalidKind(String),

    /// Factory was asked for a kind it cannot build.
    #[error("unknown distribution kind '{0}' requested from factory")]
    UnknownDistributionKind(String),

    /// Truncation bounds are not strictly increasing.
    #[error("invalid bounds: low ({low}) must be less than high ({high})")]
    InvalidBounds {
        /// Lower bound.
        low: f64,
        /// Upper bound.
        high: f64,
    },

    /// Key is not part of the family's hyperparameter set, or a free
    /// hyperparameter has no value in the supplied point.
    #[error("unknown hyperparameter '{0}'")]
    UnknownHyperparameter(String),

    /// Value has the wrong shape for its key.
    #[error("invalid type for hyperparameter '{key}': {reason}")]
    InvalidHyperparameterType {
        /// Offending key.
        key: String,
        /// What was wrong with it.
        reason: String,
    },

    /// Mixture component arrays disagree on the number of modes.
    #[error("inconsistent number of modes: {0}")]
    InconsistentModeCount(String),

    /// A hyperparameter required by the variant constructor was not given.
    #[error("missing hyperparameter '{0}'")]
    MissingHyperparameter(String),

    /// Hyperparameter must be free but a fixed value was supplied.
    #[error("hyperparameter '{0}' must be a free parameter with a prior")]
    FixedHyperparameterNotAllowed(String),

    /// Two free hyperparameters share the same name.
    #[error("free hyperparameter name '{0}' is used more than once")]
    DuplicateFreeParameter(String),

    /// Prior specification is not usable.
    #[error("invalid prior '{name}': {reason}")]
    InvalidPrior {
        /// Prior name.
        name: String,
        /// What was wrong with it.
        reason: String,
    },

    /// Factory arguments are not a key/value mapping.
    #[error("invalid argument type: {0}")]
    InvalidArgumentType(String),
}

/// Failures while loading per-source results.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Failed to read a result file.
    #[error("failed to read '{path}'")]
    Io {
        /// File we attempted to read.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// File content is not valid JSON.
    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// No registered parser accepted the document.
    #[error("result '{0}' is not a recognised format")]
    UnrecognizedFormat(String),

    /// Table or grid has inconsistent shape.
    #[error("malformed result: {0}")]
    Malformed(String),

    /// Requested parameter is not present.
    #[error("parameter '{0}' is not available")]
    UnknownParameter(String),
}

/// Failures raised by a sampling backend.
#[derive(Debug, Error)]
pub enum SamplerError {
    /// Runtime options are unusable.
    #[error("invalid sampler options: {0}")]
    InvalidOptions(String),

    /// Nothing to sample.
    #[error("no priors supplied to sampler")]
    NoPriors,

    /// Every live point has zero likelihood.
    #[error("likelihood is zero everywhere the sampler looked")]
    ZeroLikelihood,

    /// Failed to write sampler output.
    #[error("failed to write sampler output to '{path}'")]
    Io {
        /// File we attempted to write.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to serialise sampler output.
    #[error("failed to serialise sampler output: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Failures while configuring or running the hierarchical model.
#[derive(Debug, Error)]
pub enum ModelError {
    /// A data element cannot be interpreted as a result source.
    #[error("invalid data type: {0}")]
    InvalidDataType(String),

    /// Observable range is not a pair of increasing values.
    #[error("invalid range: {0}")]
    InvalidRange(String),

    /// A source does not contain the observable.
    #[error("source '{source_label}' does not contain '{observable}'")]
    MissingObservable {
        /// Label (or index) of the offending source.
        source_label: String,
        /// Observable that was expected.
        observable: String,
    },

    /// Population distribution is defined over a different observable.
    #[error("distribution name '{found}' does not match observable '{expected}'")]
    DistributionNameMismatch {
        /// Observable required by the model.
        expected: String,
        /// Name carried by the distribution.
        found: String,
    },

    /// Population distribution has nothing to infer.
    #[error("distribution has no free hyperparameters to infer")]
    NoFreeParameters,

    /// Sampler name is not supported.
    #[error("unknown sampler '{0}'")]
    UnknownSampler(String),

    /// KDE bandwidth mode is not supported.
    #[error("unknown KDE bandwidth mode '{0}'")]
    UnknownBandwidthMode(String),

    /// Grid specification is unusable.
    #[error("invalid grid: {0}")]
    InvalidGrid(String),

    /// Model is missing data or a distribution.
    #[error("model is not configured: {0}")]
    NotConfigured(&'static str),

    /// Result adapter failure.
    #[error(transparent)]
    Adapter(#[from] AdapterError),

    /// Distribution failure.
    #[error(transparent)]
    Distribution(#[from] DistributionError),

    /// Sampler failure.
    #[error(transparent)]
    Sampler(#[from] SamplerError),
}
