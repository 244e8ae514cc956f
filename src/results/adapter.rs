//! Parsers for per-source result documents.
//!
//! Two layouts are understood, tried in order:
//! 1. bilby-style posterior results: a `posterior` object holding columns,
//!    either directly or under `content`;
//! 2. grids: `sample_points` axes plus a (possibly nested) `ln_likelihood`.

use std::fs;
use std::path::Path;

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::AdapterError;

use super::{EvidenceGrid, GridAxis, PosteriorResult, ResultSource, SampleTable, SourceResult};

type Parser = fn(&Map<String, Value>, &str) -> Result<Option<SourceResult>, AdapterError>;

const PARSERS: &[(&str, Parser)] = &[
    ("posterior", parse_posterior as Parser),
    ("grid", parse_grid as Parser),
];

/// Load a per-source result.
///
/// # Errors
///
/// `Io` if a file cannot be read, `Json` if it is not JSON,
/// `UnrecognizedFormat` if no parser accepts the document, and `Malformed`
/// if a parser recognises the layout but its content is inconsistent.
pub fn load(source: impl Into<ResultSource>) -> Result<SourceResult, AdapterError> {
    match source.into() {
        ResultSource::Posterior(result) => Ok(SourceResult::Posterior(result)),
        ResultSource::Grid(grid) => Ok(SourceResult::Grid(grid)),
        ResultSource::Path(path) => load_path(&path),
        ResultSource::Json(Value::String(path)) => load_path(Path::new(&path)),
        ResultSource::Json(doc) => parse_document(&doc, "result"),
    }
}

fn load_path(path: &Path) -> Result<SourceResult, AdapterError> {
    debug!(path = %path.display(), "loading result");
    let text = fs::read_to_string(path).map_err(|source| AdapterError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let doc: Value = serde_json::from_str(&text)?;
    let fallback = path
        .file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.strip_suffix("_result").unwrap_or(s))
        .unwrap_or("result");
    parse_document(&doc, fallback).map_err(|e| match e {
        AdapterError::UnrecognizedFormat(_) => AdapterError::UnrecognizedFormat(path.display().to_string()),
        other => other,
    })
}

/// Parse an already-decoded JSON document.
///
/// `fallback_label` is used when the document carries no `label`.
///
/// # Errors
///
/// `UnrecognizedFormat` if no parser accepts the document; `Malformed` if one
/// recognises it but the content is inconsistent.
pub fn parse_document(doc: &Value, fallback_label: &str) -> Result<SourceResult, AdapterError> {
    let Value::Object(map) = doc else {
        return Err(AdapterError::UnrecognizedFormat(fallback_label.to_string()));
    };
    let label = map.get("label").and_then(Value::as_str).unwrap_or(fallback_label);

    for (name, parser) in PARSERS {
        if let Some(result) = parser(map, label)? {
            debug!(parser = name, label, "parsed result");
            return Ok(result);
        }
    }
    Err(AdapterError::UnrecognizedFormat(label.to_string()))
}

fn parse_posterior(map: &Map<String, Value>, label: &str) -> Result<Option<SourceResult>, AdapterError> {
    let Some(Value::Object(posterior)) = map.get("posterior") else {
        return Ok(None);
    };
    let columns = match posterior.get("content") {
        Some(Value::Object(content)) => content,
        _ => posterior,
    };

    let mut table = SampleTable::new();
    for (name, values) in columns {
        let Some(values) = numeric_array(values, f64::NAN) else {
            debug!(column = %name, "skipping non-numeric posterior column");
            continue;
        };
        table.insert(name.clone(), values)?;
    }
    if table.names().next().is_none() {
        return Err(AdapterError::Malformed(format!("posterior of '{label}' has no numeric columns")));
    }

    let number = |key: &str| map.get(key).and_then(Value::as_f64).unwrap_or(f64::NAN);
    let search_parameter_keys = match map.get("search_parameter_keys") {
        Some(Value::Array(keys)) => keys.iter().filter_map(Value::as_str).map(str::to_string).collect(),
        _ => table.names().map(str::to_string).collect(),
    };

    Ok(Some(SourceResult::Posterior(PosteriorResult {
        label: label.to_string(),
        sampler: map.get("sampler").and_then(Value::as_str).unwrap_or_default().to_string(),
        search_parameter_keys,
        log_evidence: number("log_evidence"),
        log_evidence_err: number("log_evidence_err"),
        information_gain: number("information_gain"),
        num_likelihood_evaluations: map
            .get("num_likelihood_evaluations")
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize,
        posterior: table,
    })))
}

fn parse_grid(map: &Map<String, Value>, label: &str) -> Result<Option<SourceResult>, AdapterError> {
    let (Some(Value::Object(points)), Some(ln_likelihood)) = (map.get("sample_points"), map.get("ln_likelihood"))
    else {
        return Ok(None);
    };

    // JSON objects do not keep key order; prefer the explicit axis order.
    let names: Vec<String> = match map.get("parameter_names") {
        Some(Value::Array(names)) => names.iter().filter_map(Value::as_str).map(str::to_string).collect(),
        _ => points.keys().cloned().collect(),
    };

    let mut axes = Vec::with_capacity(names.len());
    for name in names {
        let values = points
            .get(&name)
            .and_then(|v| numeric_array(v, f64::NAN))
            .ok_or_else(|| AdapterError::Malformed(format!("grid axis '{name}' is missing or not numeric")))?;
        axes.push(GridAxis::new(name, values));
    }

    let shape: Vec<usize> = axes.iter().map(|a| a.points.len()).collect();
    let ln_likelihood = flatten(ln_likelihood, &shape, "ln_likelihood")?;
    let ln_prior = map
        .get("ln_prior")
        .filter(|v| !v.is_null())
        .map(|v| flatten(v, &shape, "ln_prior"))
        .transpose()?;

    EvidenceGrid::new(label, axes, ln_likelihood, ln_prior).map(|grid| Some(SourceResult::Grid(grid)))
}

/// Numbers of a flat JSON array; `null` entries become `null_value`.
fn numeric_array(value: &Value, null_value: f64) -> Option<Vec<f64>> {
    value
        .as_array()?
        .iter()
        .map(|v| match v {
            Value::Null => Some(null_value),
            other => other.as_f64(),
        })
        .collect()
}

/// Flatten nested arrays of the given shape in row-major order; `null`
/// entries become `-inf`. A flat array of the right total length is also
/// accepted.
fn flatten(value: &Value, shape: &[usize], key: &str) -> Result<Vec<f64>, AdapterError> {
    let size: usize = shape.iter().product();
    let mut out = Vec::with_capacity(size);
    let malformed = || AdapterError::Malformed(format!("'{key}' does not match the grid shape {shape:?}"));

    if shape.len() > 1 {
        if let Some(flat) = numeric_array(value, f64::NEG_INFINITY) {
            return if flat.len() == size { Ok(flat) } else { Err(malformed()) };
        }
    }
    if !flatten_into(value, shape, &mut out) {
        return Err(malformed());
    }
    Ok(out)
}

fn flatten_into(value: &Value, shape: &[usize], out: &mut Vec<f64>) -> bool {
    let Some(items) = value.as_array() else {
        return false;
    };
    match shape {
        [] => false,
        [n] => {
            if items.len() != *n {
                return false;
            }
            for item in items {
                match item {
                    Value::Null => out.push(f64::NEG_INFINITY),
                    other => match other.as_f64() {
                        Some(v) => out.push(v),
                        None => return false,
                    },
                }
            }
            true
        }
        [n, rest @ ..] => items.len() == *n && items.iter().all(|item| flatten_into(item, rest, out)),
    }
}
