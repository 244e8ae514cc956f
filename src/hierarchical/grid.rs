//! Evaluation of the hyper-likelihood on a rectangular hyperparameter grid.

use std::collections::BTreeMap;

use tracing::info;

use crate::constants::Q22_NAME;
use crate::error::ModelError;
use crate::prior::Prior;
use crate::results::{EvidenceGrid, GridAxis};
use crate::statistics::linspace;
use crate::thread_pool;
use crate::types::HyperPoint;

use super::likelihood::HyperLikelihood;

/// Check a grid specification against the free hyperparameters.
///
/// Every free hyperparameter needs a resolution of at least two points and a
/// bounded prior; the only other key allowed is the observable, which sets
/// the numerical-integration resolution.
pub(crate) fn validate_grid(spec: &BTreeMap<String, usize>, priors: &[&Prior]) -> Result<(), ModelError> {
    for key in spec.keys() {
        if !key.eq_ignore_ascii_case(Q22_NAME) && !priors.iter().any(|p| p.name() == key) {
            return Err(ModelError::InvalidGrid(format!(
                "'{key}' is not a free hyperparameter of the distribution"
            )));
        }
    }
    for prior in priors {
        let n = spec.get(prior.name()).copied().ok_or_else(|| {
            ModelError::InvalidGrid(format!("no grid resolution given for '{}'", prior.name()))
        })?;
        if n < 2 {
            return Err(ModelError::InvalidGrid(format!(
                "'{}' needs at least 2 grid points, got {n}",
                prior.name()
            )));
        }
        let (low, high) = prior.bounds();
        if !(low.is_finite() && high.is_finite()) {
            return Err(ModelError::InvalidGrid(format!(
                "prior on '{}' is unbounded",
                prior.name()
            )));
        }
    }
    Ok(())
}

/// Evaluate `likelihood` at every point of the grid spanned by `priors`.
pub(crate) fn evaluate(
    likelihood: &HyperLikelihood,
    priors: &[&Prior],
    spec: &BTreeMap<String, usize>,
    label: &str,
) -> Result<EvidenceGrid, ModelError> {
    validate_grid(spec, priors)?;

    let axes: Vec<GridAxis> = priors
        .iter()
        .map(|prior| {
            let (low, high) = prior.bounds();
            GridAxis::new(prior.name(), linspace(low, high, spec[prior.name()]))
        })
        .collect();
    let shape: Vec<usize> = axes.iter().map(|a| a.points.len()).collect();
    let size: usize = shape.iter().product();
    info!(points = size, axes = axes.len(), "evaluating hyperparameter grid");

    let evaluate_at = |flat: usize| -> (f64, f64) {
        let mut remainder = flat;
        let mut values = HyperPoint::new();
        let mut ln_prior = 0.0;
        for (axis, prior) in axes.iter().zip(priors).rev() {
            let n = axis.points.len();
            let v = axis.points[remainder % n];
            remainder /= n;
            ln_prior += prior.ln_prob(v);
            values.insert(axis.name.clone(), v);
        }
        // Every axis is named after a free hyperparameter.
        let ln_l = likelihood.ln_likelihood(&values).unwrap_or(f64::NEG_INFINITY);
        (ln_l, ln_prior)
    };

    #[cfg(feature = "parallel")]
    let evaluated: Vec<(f64, f64)> = {
        use rayon::prelude::*;
        thread_pool::install(|| (0..size).into_par_iter().map(evaluate_at).collect())
    };
    #[cfg(not(feature = "parallel"))]
    let evaluated: Vec<(f64, f64)> = thread_pool::install(|| (0..size).map(evaluate_at).collect());

    let (ln_likelihood, ln_prior): (Vec<f64>, Vec<f64>) = evaluated.into_iter().unzip();
    let grid = EvidenceGrid::new(label, axes, ln_likelihood, Some(ln_prior))?;
    info!(ln_evidence = grid.ln_evidence(), "grid evaluation finished");
    Ok(grid)
}
