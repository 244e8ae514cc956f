//! Shared constants.

/// Observable the hierarchical model is defined over (lower-cased).
pub const Q22_NAME: &str = "q22";

/// ln(2π).
pub const LOG_2PI: f64 = 1.837_877_066_409_345_3;

/// Default number of points on the Q22 integration grid.
pub const DEFAULT_Q22_BINS: usize = 1000;

/// Default number of live points for nested sampling.
pub const DEFAULT_NLIVE: usize = 500;

/// Default stopping tolerance on the remaining log-evidence.
pub const DEFAULT_DLOGZ: f64 = 0.1;

/// Default number of random-walk steps per live-point replacement.
pub const DEFAULT_WALKS: usize = 25;

/// Default cap on nested-sampling iterations.
pub const DEFAULT_MAX_ITERATIONS: usize = 200_000;
