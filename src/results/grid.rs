//! Likelihoods tabulated on a rectangular parameter grid.

use rand::Rng;
use serde::ser::{Serialize, SerializeStruct, Serializer};
use serde_json::Value;

use crate::error::AdapterError;
use crate::statistics::{
    compute_quantile, log_sum_exp_iter, quantile_from_cdf, sample_tabulated, trapezoid_log_weights,
};

/// One axis of an [`EvidenceGrid`].
#[derive(Debug, Clone, PartialEq)]
pub struct GridAxis {
    /// Parameter name.
    pub name: String,
    /// Increasing sample points.
    pub points: Vec<f64>,
}

impl GridAxis {
    /// Create an axis.
    pub fn new(name: impl Into<String>, points: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            points,
        }
    }
}

/// Log-likelihood and log-prior over the cartesian product of named axes.
///
/// Values are stored flattened in row-major order (last axis fastest).
/// Evidence and marginals are obtained by trapezoid integration in log
/// space.
#[derive(Debug, Clone, PartialEq)]
pub struct EvidenceGrid {
    label: String,
    axes: Vec<GridAxis>,
    ln_likelihood: Vec<f64>,
    ln_prior: Vec<f64>,
}

impl EvidenceGrid {
    /// Build a grid.
    ///
    /// A missing `ln_prior` is taken as flat (zero everywhere).
    ///
    /// # Errors
    ///
    /// `Malformed` for empty or non-increasing axes, duplicate axis names, or
    /// value arrays whose length is not the product of the axis lengths.
    pub fn new(
        label: impl Into<String>,
        axes: Vec<GridAxis>,
        ln_likelihood: Vec<f64>,
        ln_prior: Option<Vec<f64>>,
    ) -> Result<Self, AdapterError> {
        if axes.is_empty() {
            return Err(AdapterError::Malformed("grid has no axes".to_string()));
        }
        for (i, axis) in axes.iter().enumerate() {
            if axis.points.is_empty() {
                return Err(AdapterError::Malformed(format!("grid axis '{}' is empty", axis.name)));
            }
            if axis.points.windows(2).any(|w| !(w[0] < w[1])) {
                return Err(AdapterError::Malformed(format!(
                    "grid axis '{}' is not strictly increasing",
                    axis.name
                )));
            }
            if axes[..i].iter().any(|other| other.name == axis.name) {
                return Err(AdapterError::Malformed(format!("duplicate grid axis '{}'", axis.name)));
            }
        }

        let size: usize = axes.iter().map(|a| a.points.len()).product();
        if ln_likelihood.len() != size {
            return Err(AdapterError::Malformed(format!(
                "ln_likelihood has {} values, grid has {size} points",
                ln_likelihood.len()
            )));
        }
        let ln_prior = match ln_prior {
            Some(prior) if prior.len() != size => {
                return Err(AdapterError::Malformed(format!(
                    "ln_prior has {} values, grid has {size} points",
                    prior.len()
                )))
            }
            Some(prior) => prior,
            None => vec![0.0; size],
        };

        Ok(Self {
            label: label.into(),
            axes,
            ln_likelihood,
            ln_prior,
        })
    }

    /// Run label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Replace the label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Axes in storage order.
    pub fn axes(&self) -> &[GridAxis] {
        &self.axes
    }

    /// Axis names in storage order.
    pub fn parameter_names(&self) -> Vec<&str> {
        self.axes.iter().map(|a| a.name.as_str()).collect()
    }

    /// Number of points along each axis.
    pub fn shape(&self) -> Vec<usize> {
        self.axes.iter().map(|a| a.points.len()).collect()
    }

    /// Position of the axis called `name` (case-insensitive).
    pub fn axis_index(&self, name: &str) -> Option<usize> {
        self.axes.iter().position(|a| a.name.eq_ignore_ascii_case(name))
    }

    /// Sample points of the axis called `name` (case-insensitive).
    pub fn sample_points(&self, name: &str) -> Option<&[f64]> {
        self.axis_index(name).map(|i| self.axes[i].points.as_slice())
    }

    /// Flattened log-likelihood.
    pub fn ln_likelihood(&self) -> &[f64] {
        &self.ln_likelihood
    }

    /// Flattened log-prior.
    pub fn ln_prior(&self) -> &[f64] {
        &self.ln_prior
    }

    /// Flattened unnormalised log-posterior.
    pub fn ln_posterior(&self) -> Vec<f64> {
        self.ln_likelihood.iter().zip(&self.ln_prior).map(|(l, p)| l + p).collect()
    }

    /// ln ∫ L π over every axis.
    pub fn ln_evidence(&self) -> f64 {
        let (values, _) = self.reduce_except(self.ln_posterior(), None);
        values.first().copied().unwrap_or(f64::NEG_INFINITY)
    }

    /// Integrate the log-likelihood over every axis except `keep`.
    ///
    /// # Errors
    ///
    /// `UnknownParameter` if the grid has no such axis.
    pub fn marginalize_ln_likelihood(&self, keep: &str) -> Result<Vec<f64>, AdapterError> {
        let axis = self.require_axis(keep)?;
        Ok(self.reduce_except(self.ln_likelihood.clone(), Some(axis)).0)
    }

    /// Unnormalised log marginal posterior along `param`.
    ///
    /// # Errors
    ///
    /// `UnknownParameter` if the grid has no such axis.
    pub fn marginal_ln_posterior(&self, param: &str) -> Result<Vec<f64>, AdapterError> {
        let axis = self.require_axis(param)?;
        Ok(self.reduce_except(self.ln_posterior(), Some(axis)).0)
    }

    /// Quantiles of the marginal posterior of `param`.
    ///
    /// # Errors
    ///
    /// `UnknownParameter` if the grid has no such axis.
    pub fn credible_interval(&self, param: &str, quantiles: &[f64]) -> Result<Vec<f64>, AdapterError> {
        let (x, cdf) = self.marginal_cdf(param)?;
        super::check_quantiles(quantiles)?;
        Ok(quantiles.iter().map(|&q| quantile_from_cdf(x, &cdf, q)).collect())
    }

    /// Upper credible bound of `param` at probability `bound`.
    ///
    /// # Errors
    ///
    /// `UnknownParameter` if the grid has no such axis.
    pub fn upper_limit(&self, param: &str, bound: f64) -> Result<f64, AdapterError> {
        let (x, cdf) = self.marginal_cdf(param)?;
        Ok(quantile_from_cdf(x, &cdf, bound))
    }

    /// Draw `n` values of `param` from its marginal posterior.
    ///
    /// # Errors
    ///
    /// `UnknownParameter` if the grid has no such axis.
    pub fn draw_samples<R: Rng + ?Sized>(
        &self,
        param: &str,
        n: usize,
        rng: &mut R,
    ) -> Result<Vec<f64>, AdapterError> {
        let axis = self.require_axis(param)?;
        let ln_marginal = self.reduce_except(self.ln_posterior(), Some(axis)).0;
        Ok(sample_tabulated(&self.axes[axis].points, &ln_marginal, n, rng))
    }

    /// Draw `n` values of `param` from its normalised marginal likelihood,
    /// ignoring the grid's prior.
    ///
    /// # Errors
    ///
    /// `UnknownParameter` if the grid has no such axis.
    pub fn draw_likelihood_samples<R: Rng + ?Sized>(
        &self,
        param: &str,
        n: usize,
        rng: &mut R,
    ) -> Result<Vec<f64>, AdapterError> {
        let axis = self.require_axis(param)?;
        let ln_marginal = self.marginalize_ln_likelihood(param)?;
        Ok(sample_tabulated(&self.axes[axis].points, &ln_marginal, n, rng))
    }

    /// Grid point with the highest posterior, as `(name, value)` pairs.
    pub fn max_posterior_point(&self) -> Vec<(&str, f64)> {
        let posterior = self.ln_posterior();
        let mut best = 0;
        for (i, &v) in posterior.iter().enumerate() {
            if v > posterior[best] {
                best = i;
            }
        }
        let mut point = Vec::with_capacity(self.axes.len());
        let mut remainder = best;
        for axis in self.axes.iter().rev() {
            let n = axis.points.len();
            point.push((axis.name.as_str(), axis.points[remainder % n]));
            remainder /= n;
        }
        point.reverse();
        point
    }

    /// Median of the marginal posterior of `param`, falling back to the
    /// midpoint of the axis if the posterior is zero everywhere.
    ///
    /// # Errors
    ///
    /// `UnknownParameter` if the grid has no such axis.
    pub fn median(&self, param: &str) -> Result<f64, AdapterError> {
        let (x, cdf) = self.marginal_cdf(param)?;
        if cdf.last().copied().unwrap_or(0.0) > 0.0 {
            Ok(quantile_from_cdf(x, &cdf, 0.5))
        } else {
            let mut points = x.to_vec();
            Ok(compute_quantile(&mut points, 0.5))
        }
    }

    fn require_axis(&self, name: &str) -> Result<usize, AdapterError> {
        self.axis_index(name)
            .ok_or_else(|| AdapterError::UnknownParameter(name.to_string()))
    }

    fn marginal_cdf(&self, param: &str) -> Result<(&[f64], Vec<f64>), AdapterError> {
        let axis = self.require_axis(param)?;
        let ln_marginal = self.reduce_except(self.ln_posterior(), Some(axis)).0;
        let x = self.axes[axis].points.as_slice();

        let max = ln_marginal.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let density: Vec<f64> = if max.is_finite() {
            ln_marginal.iter().map(|&l| (l - max).exp()).collect()
        } else {
            vec![0.0; x.len()]
        };
        let mut cdf = Vec::with_capacity(x.len());
        cdf.push(0.0);
        for j in 1..x.len() {
            cdf.push(cdf[j - 1] + 0.5 * (density[j] + density[j - 1]) * (x[j] - x[j - 1]));
        }
        Ok((x, cdf))
    }

    /// Integrate `values` over every axis except `keep` (all axes if `None`).
    fn reduce_except(&self, mut values: Vec<f64>, keep: Option<usize>) -> (Vec<f64>, Vec<usize>) {
        let mut shape = self.shape();
        for axis in (0..self.axes.len()).rev() {
            if Some(axis) == keep {
                continue;
            }
            values = reduce_axis(&values, &shape, axis, &self.axes[axis].points);
            shape[axis] = 1;
        }
        (values, shape)
    }
}

/// Trapezoid-integrate row-major log values over one axis.
pub fn reduce_axis(values: &[f64], shape: &[usize], axis: usize, points: &[f64]) -> Vec<f64> {
    let n = shape[axis];
    let outer: usize = shape[..axis].iter().product();
    let inner: usize = shape[axis + 1..].iter().product();
    let weights = trapezoid_log_weights(points);

    let mut out = Vec::with_capacity(outer * inner);
    for o in 0..outer {
        for i in 0..inner {
            let base = o * n * inner + i;
            out.push(log_sum_exp_iter(
                weights.iter().enumerate().map(|(j, w)| w + values[base + j * inner]),
            ));
        }
    }
    out
}

/// Nest a flat row-major array into JSON arrays of the given shape.
fn nest(values: &[f64], shape: &[usize]) -> Value {
    match shape {
        [] | [_] => Value::from(values.iter().map(|&v| finite_or_null(v)).collect::<Vec<_>>()),
        [n, rest @ ..] => {
            let stride: usize = rest.iter().product();
            Value::Array(
                (0..*n)
                    .map(|k| nest(&values[k * stride..(k + 1) * stride], rest))
                    .collect(),
            )
        }
    }
}

fn finite_or_null(v: f64) -> Value {
    if v.is_finite() {
        Value::from(v)
    } else {
        Value::Null
    }
}

impl Serialize for EvidenceGrid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let shape = self.shape();
        let sample_points: serde_json::Map<String, Value> = self
            .axes
            .iter()
            .map(|a| (a.name.clone(), Value::from(a.points.clone())))
            .collect();

        let mut state = serializer.serialize_struct("EvidenceGrid", 6)?;
        state.serialize_field("label", &self.label)?;
        state.serialize_field("parameter_names", &self.parameter_names())?;
        state.serialize_field("sample_points", &sample_points)?;
        state.serialize_field("ln_likelihood", &nest(&self.ln_likelihood, &shape))?;
        state.serialize_field("ln_prior", &nest(&self.ln_prior, &shape))?;
        state.serialize_field("ln_evidence", &finite_or_null(self.ln_evidence()))?;
        state.end()
    }
}
