//! Statistical building blocks for hierarchical inference.
//!
//! - Quantiles of samples and tabulated CDFs
//! - Log-space sums, means and trapezoid integration
//! - Gaussian kernel density estimation
//! - Resampling of weighted points and tabulated densities

mod kde;
mod logspace;
mod quantile;
mod resample;

pub use kde::GaussianKde;
pub use logspace::{
    interp_ln, linspace, log_add_exp, log_mean_exp, log_sum_exp, log_sum_exp_iter, log_trapezoid,
    trapezoid_log_weights,
};
pub use quantile::{compute_quantile, compute_quantiles, compute_quantiles_sorted, quantile_from_cdf};
pub use resample::{counter_rng_seed, rejection_resample, sample_tabulated, subsample_indices};
