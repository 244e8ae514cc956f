//! Loading per-source result files.

use std::fs;
use std::path::PathBuf;

use pulsar_population::{load, AdapterError, SourceResult};

fn data_file(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests").join("data").join(name)
}

#[test]
fn posterior_result_file() {
    let result = load(data_file("hierarchical_test_set_0_result.json")).unwrap();
    let SourceResult::Posterior(posterior) = &result else {
        panic!("expected a posterior result");
    };

    assert_eq!(posterior.label, "hierarchical_test_set_0");
    assert_eq!(posterior.sampler, "dynesty");
    assert_eq!(posterior.posterior.len(), 300);
    assert_eq!(posterior.num_likelihood_evaluations, 51234);
    assert!(posterior.log_evidence.is_finite());
    assert!(result.has_parameter("Q22"));
    assert!(result.has_parameter("h0"));

    let ci = result.credible_interval("q22", &[0.05, 0.5, 0.95]).unwrap();
    assert!(ci[0] >= 0.0 && ci[0] < ci[1] && ci[1] < ci[2]);
    assert!(ci[2] > 1e30 && ci[2] < 1e31);
    assert_eq!(result.upper_limit("q22", 0.95).unwrap(), ci[2]);
}

#[test]
fn grid_result_file() {
    let result = load(data_file("J0437-4715_grid.json")).unwrap();
    let SourceResult::Grid(grid) = &result else {
        panic!("expected a grid result");
    };
    assert_eq!(grid.label(), "J0437-4715_grid");
    assert_eq!(grid.shape(), vec![101]);

    // Half-normal likelihood of width 2e30: the 95% bound sits near 1.96 widths.
    let upper = result.upper_limit("q22", 0.95).unwrap();
    assert!((upper - 3.92e30).abs() < 0.15e30, "upper = {upper:e}");
}

#[test]
fn label_falls_back_to_file_stem() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("J1234+5678_result.json");
    fs::write(&path, r#"{"posterior": {"q22": [1.0, 2.0, null]}}"#).unwrap();

    let result = load(path.as_path()).unwrap();
    assert_eq!(result.label(), "J1234+5678");
    let SourceResult::Posterior(posterior) = result else {
        panic!("expected a posterior result");
    };
    assert!(posterior.samples("q22").unwrap()[2].is_nan());
}

#[test]
fn unrecognised_file_is_reported_by_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.json");
    fs::write(&path, r#"{"comment": "not a result"}"#).unwrap();

    match load(path.as_path()) {
        Err(AdapterError::UnrecognizedFormat(name)) => assert!(name.ends_with("notes.json")),
        other => panic!("expected UnrecognizedFormat, got {other:?}"),
    }
}

#[test]
fn invalid_json_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken_result.json");
    fs::write(&path, "{ not json").unwrap();
    assert!(matches!(load(path.as_path()), Err(AdapterError::Json(_))));
}
