//! Per-source results and the adapter that loads them.
//!
//! A source is either a table of equally weighted posterior samples
//! ([`PosteriorResult`]) or a likelihood tabulated on a grid
//! ([`EvidenceGrid`]). [`load`] accepts a file path, a parsed JSON document
//! or an in-memory result and tries each known layout in turn.

mod adapter;
mod grid;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AdapterError;
use crate::statistics::compute_quantiles;

pub use adapter::{load, parse_document};
pub use grid::{reduce_axis, EvidenceGrid, GridAxis};

/// Named columns of equal length.
///
/// Serialises in the `{"content": {column: [values]}}` layout used by
/// bilby result files.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleTable {
    content: BTreeMap<String, Vec<f64>>,
}

impl SampleTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(name, values)` pairs.
    ///
    /// # Errors
    ///
    /// `Malformed` if columns differ in length.
    pub fn from_columns<I, S>(columns: I) -> Result<Self, AdapterError>
    where
        I: IntoIterator<Item = (S, Vec<f64>)>,
        S: Into<String>,
    {
        let mut table = Self::new();
        for (name, values) in columns {
            table.insert(name, values)?;
        }
        Ok(table)
    }

    /// Add or replace a column.
    ///
    /// # Errors
    ///
    /// `Malformed` if the column length differs from the existing ones.
    pub fn insert(&mut self, name: impl Into<String>, values: Vec<f64>) -> Result<(), AdapterError> {
        let name = name.into();
        let expected = self
            .content
            .iter()
            .find(|(existing, _)| **existing != name)
            .map(|(_, v)| v.len());
        if let Some(expected) = expected {
            if values.len() != expected {
                return Err(AdapterError::Malformed(format!(
                    "column '{name}' has {} rows, expected {expected}",
                    values.len()
                )));
            }
        }
        self.content.insert(name, values);
        Ok(())
    }

    /// Column by exact name.
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.content.get(name).map(Vec::as_slice)
    }

    /// Column by case-insensitive name, returning the stored name as well.
    pub fn find_column(&self, name: &str) -> Option<(&str, &[f64])> {
        self.content
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Column names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.content.keys().map(String::as_str)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.content.values().next().map_or(0, Vec::len)
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Output of a nested-sampling run: equally weighted posterior draws and
/// the evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PosteriorResult {
    /// Run label.
    pub label: String,
    /// Backend that produced the result.
    pub sampler: String,
    /// Names of the sampled parameters.
    pub search_parameter_keys: Vec<String>,
    /// Natural-log evidence.
    pub log_evidence: f64,
    /// Estimated error of `log_evidence`.
    pub log_evidence_err: f64,
    /// Kullback-Leibler divergence from prior to posterior, in nats.
    pub information_gain: f64,
    /// Likelihood calls made by the sampler.
    #[serde(default)]
    pub num_likelihood_evaluations: usize,
    /// Posterior draws.
    pub posterior: SampleTable,
}

impl PosteriorResult {
    /// Wrap a sample table with unknown evidence.
    pub fn from_samples(label: impl Into<String>, posterior: SampleTable) -> Self {
        Self {
            label: label.into(),
            sampler: String::new(),
            search_parameter_keys: posterior.names().map(str::to_string).collect(),
            log_evidence: f64::NAN,
            log_evidence_err: f64::NAN,
            information_gain: f64::NAN,
            num_likelihood_evaluations: 0,
            posterior,
        }
    }

    /// Posterior column by exact name.
    ///
    /// # Errors
    ///
    /// `UnknownParameter` if the column is absent.
    pub fn samples(&self, param: &str) -> Result<&[f64], AdapterError> {
        self.posterior
            .column(param)
            .ok_or_else(|| AdapterError::UnknownParameter(param.to_string()))
    }

    /// Sample quantiles of `param`.
    ///
    /// # Errors
    ///
    /// `UnknownParameter` if the column is absent; `Malformed` if it is
    /// empty or a quantile lies outside `[0, 1]`.
    pub fn credible_interval(&self, param: &str, quantiles: &[f64]) -> Result<Vec<f64>, AdapterError> {
        let samples = self.samples(param)?;
        if samples.is_empty() {
            return Err(AdapterError::Malformed(format!("no samples of '{param}'")));
        }
        check_quantiles(quantiles)?;
        Ok(compute_quantiles(samples, quantiles))
    }

    /// Upper credible bound of `param` at probability `bound`.
    ///
    /// # Errors
    ///
    /// `UnknownParameter` if the column is absent.
    pub fn upper_limit(&self, param: &str, bound: f64) -> Result<f64, AdapterError> {
        Ok(self.credible_interval(param, &[bound])?[0])
    }
}

pub(crate) fn check_quantiles(quantiles: &[f64]) -> Result<(), AdapterError> {
    match quantiles.iter().find(|q| !(0.0..=1.0).contains(*q)) {
        Some(q) => Err(AdapterError::Malformed(format!("quantile {q} is outside [0, 1]"))),
        None => Ok(()),
    }
}

/// A loaded per-source result.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceResult {
    /// Posterior-sample table.
    Posterior(PosteriorResult),
    /// Likelihood grid.
    Grid(EvidenceGrid),
}

impl SourceResult {
    /// Run label.
    pub fn label(&self) -> &str {
        match self {
            SourceResult::Posterior(result) => &result.label,
            SourceResult::Grid(grid) => grid.label(),
        }
    }

    /// Whether `param` is a posterior column or grid axis (case-insensitive).
    pub fn has_parameter(&self, param: &str) -> bool {
        match self {
            SourceResult::Posterior(result) => result.posterior.find_column(param).is_some(),
            SourceResult::Grid(grid) => grid.axis_index(param).is_some(),
        }
    }

    /// Quantiles of `param` (case-insensitive).
    ///
    /// # Errors
    ///
    /// `UnknownParameter` if the source does not carry `param`.
    pub fn credible_interval(&self, param: &str, quantiles: &[f64]) -> Result<Vec<f64>, AdapterError> {
        match self {
            SourceResult::Posterior(result) => {
                let (name, _) = result
                    .posterior
                    .find_column(param)
                    .ok_or_else(|| AdapterError::UnknownParameter(param.to_string()))?;
                result.credible_interval(name, quantiles)
            }
            SourceResult::Grid(grid) => grid.credible_interval(param, quantiles),
        }
    }

    /// Upper credible bound of `param` (case-insensitive).
    ///
    /// # Errors
    ///
    /// `UnknownParameter` if the source does not carry `param`.
    pub fn upper_limit(&self, param: &str, bound: f64) -> Result<f64, AdapterError> {
        Ok(self.credible_interval(param, &[bound])?[0])
    }
}

/// Anything [`load`] can turn into a [`SourceResult`].
#[derive(Debug, Clone)]
pub enum ResultSource {
    /// JSON result file.
    Path(PathBuf),
    /// Parsed JSON document. A string is treated as a path.
    Json(Value),
    /// In-memory posterior result.
    Posterior(PosteriorResult),
    /// In-memory grid.
    Grid(EvidenceGrid),
}

impl From<&str> for ResultSource {
    fn from(path: &str) -> Self {
        ResultSource::Path(PathBuf::from(path))
    }
}

impl From<String> for ResultSource {
    fn from(path: String) -> Self {
        ResultSource::Path(PathBuf::from(path))
    }
}

impl From<PathBuf> for ResultSource {
    fn from(path: PathBuf) -> Self {
        ResultSource::Path(path)
    }
}

impl From<&Path> for ResultSource {
    fn from(path: &Path) -> Self {
        ResultSource::Path(path.to_path_buf())
    }
}

impl From<Value> for ResultSource {
    fn from(value: Value) -> Self {
        ResultSource::Json(value)
    }
}

impl From<PosteriorResult> for ResultSource {
    fn from(result: PosteriorResult) -> Self {
        ResultSource::Posterior(result)
    }
}

impl From<EvidenceGrid> for ResultSource {
    fn from(grid: EvidenceGrid) -> Self {
        ResultSource::Grid(grid)
    }
}

impl From<SourceResult> for ResultSource {
    fn from(result: SourceResult) -> Self {
        match result {
            SourceResult::Posterior(result) => ResultSource::Posterior(result),
            SourceResult::Grid(grid) => ResultSource::Grid(grid),
        }
    }
}
