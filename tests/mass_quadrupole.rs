//! End-to-end tests for the hierarchical Q22 model.

use std::path::PathBuf;

use pulsar_population::{
    hyperparameters, Bandwidth, Distribution, DistributionError, HierarchicalOutcome, HyperPoint,
    IntegrationMethod, MassQuadrupoleDistribution, ModelError, ModelState, Prior, SampleOptions,
    SourceResult,
};
use serde_json::json;

fn data_file(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests").join("data").join(name)
}

fn test_sets() -> [PathBuf; 2] {
    [
        data_file("hierarchical_test_set_0_result.json"),
        data_file("hierarchical_test_set_1_result.json"),
    ]
}

fn exponential_population() -> Distribution {
    Distribution::exponential("Q22", Prior::uniform(1e29, 1e31, "mu")).unwrap()
}

/// Route library logs to the test output; `RUST_LOG=debug` shows sampler progress.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn point(mu: f64) -> HyperPoint {
    HyperPoint::from([("mu".to_string(), mu)])
}

// ===========================================================================
// Construction errors
// ===========================================================================

/// A population over anything but the observable is rejected.
#[test]
fn distribution_name_mismatch() {
    let dist = Distribution::exponential("h0", Prior::uniform(1e29, 1e31, "mu")).unwrap();
    let err = MassQuadrupoleDistribution::builder()
        .data(test_sets())
        .distribution(dist)
        .build()
        .unwrap_err();

    match err {
        ModelError::DistributionNameMismatch { expected, found } => {
            assert_eq!(expected, "q22");
            assert_eq!(found, "h0");
        }
        other => panic!("expected name mismatch, got {other:?}"),
    }
}

#[test]
fn population_without_free_hyperparameters() {
    let dist = Distribution::new(
        "q22",
        "exponential",
        hyperparameters([("mu", 1e30)]),
        0.0,
        f64::INFINITY,
    )
    .unwrap();
    let err = MassQuadrupoleDistribution::builder()
        .data(test_sets())
        .distribution(dist)
        .build()
        .unwrap_err();
    assert!(matches!(err, ModelError::NoFreeParameters));
}

#[test]
fn invalid_q22_ranges() {
    for range in [&[1e30][..], &[2e30, 1e30], &[1e30, 1e30], &[0.0, 1e30, 2e30]] {
        let err = MassQuadrupoleDistribution::builder()
            .data(test_sets())
            .distribution(exponential_population())
            .q22range(range)
            .build()
            .unwrap_err();
        assert!(matches!(err, ModelError::InvalidRange(_)), "{range:?}: {err:?}");
    }
}

/// Backend misconfiguration surfaces before any data is read.
#[test]
fn unknown_backend_settings() {
    let err = MassQuadrupoleDistribution::builder()
        .data([data_file("does_not_exist.json")])
        .sampler("emcee")
        .build()
        .unwrap_err();
    assert!(matches!(err, ModelError::UnknownSampler(_)));

    let err = MassQuadrupoleDistribution::builder()
        .data([data_file("does_not_exist.json")])
        .bw("widest")
        .build()
        .unwrap_err();
    assert!(matches!(err, ModelError::UnknownBandwidthMode(_)));

    let err = MassQuadrupoleDistribution::builder().bw_factor(0.0).build().unwrap_err();
    assert!(matches!(err, ModelError::UnknownBandwidthMode(_)));
}

#[test]
fn fixed_bandwidth_factor() {
    let model = MassQuadrupoleDistribution::builder()
        .data(test_sets())
        .distribution(exponential_population())
        .integration(IntegrationMethod::Numerical)
        .bw_factor(0.5)
        .build()
        .unwrap();
    assert_eq!(model.config().bandwidth, Bandwidth::Fixed(0.5));
    assert!(model.ln_likelihood(&point(2e30)).unwrap().is_finite());
}

#[test]
fn data_must_be_results_paths_or_objects() {
    let err = MassQuadrupoleDistribution::builder()
        .source(json!(42))
        .distribution(exponential_population())
        .build()
        .unwrap_err();
    assert!(matches!(err, ModelError::InvalidDataType(_)));
}

#[test]
fn source_without_observable() {
    let doc = json!({
        "label": "J1234",
        "posterior": {"content": {"h0": [1e-26, 2e-26, 3e-26]}}
    });
    let err = MassQuadrupoleDistribution::builder()
        .source(doc)
        .distribution(exponential_population())
        .build()
        .unwrap_err();
    assert!(matches!(err, ModelError::MissingObservable { .. }));
}

/// Sources are checked for the observable before a distribution is set.
#[test]
fn source_without_observable_and_no_distribution() {
    let doc = json!({"posterior": {"content": {"h0": [1e-26, 2e-26]}}});
    let err = MassQuadrupoleDistribution::builder()
        .source(doc.clone())
        .build()
        .unwrap_err();
    assert!(matches!(err, ModelError::MissingObservable { .. }));

    let mut model = MassQuadrupoleDistribution::builder().build().unwrap();
    let err = model.add_data(doc).unwrap_err();
    assert!(matches!(err, ModelError::MissingObservable { .. }));
    assert!(model.sources().is_empty());
    assert_eq!(model.state(), ModelState::Unbuilt);
}

#[test]
fn unreadable_source_fails_construction() {
    let err = MassQuadrupoleDistribution::builder()
        .data([data_file("does_not_exist.json")])
        .distribution(exponential_population())
        .build()
        .unwrap_err();
    assert!(matches!(err, ModelError::Adapter(_)));
}

#[test]
fn grid_must_cover_free_hyperparameters() {
    let err = MassQuadrupoleDistribution::builder()
        .data(test_sets())
        .distribution(exponential_population())
        .grid([("sigma", 10)])
        .build()
        .unwrap_err();
    assert!(matches!(err, ModelError::InvalidGrid(_)));
}

// ===========================================================================
// Lifecycle
// ===========================================================================

#[test]
fn incremental_configuration() {
    let mut model = MassQuadrupoleDistribution::builder()
        .distribution(exponential_population())
        .build()
        .unwrap();
    assert_eq!(model.state(), ModelState::Unbuilt);
    assert!(matches!(
        model.ln_likelihood(&point(1e30)),
        Err(ModelError::NotConfigured(_))
    ));

    for path in test_sets() {
        model.add_data(path).unwrap();
    }
    assert_eq!(model.state(), ModelState::Configured);
    assert_eq!(model.sources().len(), 2);
    assert_eq!(model.sources()[0].label(), "hierarchical_test_set_0");
    assert_eq!(model.priors().len(), 1);
}

#[test]
fn failed_updates_leave_the_model_unchanged() {
    let mut model = MassQuadrupoleDistribution::builder()
        .data(test_sets())
        .distribution(exponential_population())
        .build()
        .unwrap();
    let before = model.ln_likelihood(&point(2e30)).unwrap();

    let err = model
        .add_data(json!({"posterior": {"h0": [1.0, 2.0]}}))
        .unwrap_err();
    assert!(matches!(err, ModelError::MissingObservable { .. }));
    assert_eq!(model.sources().len(), 2);

    let err = model.set_distribution("lognormal", Default::default()).unwrap_err();
    assert!(matches!(err, ModelError::Distribution(_)));
    assert_eq!(model.distribution().unwrap().kind().as_str(), "exponential");
    assert_eq!(model.ln_likelihood(&point(2e30)).unwrap(), before);
}

#[test]
fn misnamed_hyperparameter_is_an_error() {
    let model = MassQuadrupoleDistribution::builder()
        .data(test_sets())
        .distribution(exponential_population())
        .build()
        .unwrap();
    let values = HyperPoint::from([("mu_typo".to_string(), 1e30)]);
    assert!(matches!(
        model.ln_likelihood(&values),
        Err(ModelError::Distribution(DistributionError::UnknownHyperparameter(_)))
    ));
}

#[test]
fn distribution_from_kind_and_kwargs() {
    let model = MassQuadrupoleDistribution::builder()
        .data(test_sets())
        .distribution("gaussian")
        .distribution_kwargs(hyperparameters([
            ("mu", Prior::uniform(0.0, 1e31, "mu0")),
            ("sigma", Prior::uniform(1e29, 1e31, "sigma0")),
        ]))
        .build()
        .unwrap();

    let names: Vec<&str> = model.priors().iter().map(|p| p.name()).collect();
    assert_eq!(names, ["mu0", "sigma0"]);

    let values = HyperPoint::from([("mu0".to_string(), 0.0), ("sigma0".to_string(), 3e30)]);
    assert!(model.ln_likelihood(&values).unwrap().is_finite());
}

// ===========================================================================
// Likelihood
// ===========================================================================

/// Both sources are upper limits of a few 1e30; a population spread out to
/// 1e32 puts almost no weight there.
#[test]
fn likelihood_prefers_the_data_scale() {
    for integration in [IntegrationMethod::Sample, IntegrationMethod::Numerical] {
        let model = MassQuadrupoleDistribution::builder()
            .data(test_sets())
            .distribution(exponential_population())
            .integration(integration)
            .q22range(&[0.0, 2e31])
            .q22_bins(400)
            .build()
            .unwrap();

        let near = model.ln_likelihood(&point(5e29)).unwrap();
        let far = model.ln_likelihood(&point(1e32)).unwrap();
        assert!(near.is_finite(), "{integration:?}");
        assert!(near > far, "{integration:?}: {near} <= {far}");
    }
}

#[test]
fn grid_sources_are_supported() {
    let model = MassQuadrupoleDistribution::builder()
        .data([data_file("J0437-4715_grid.json")])
        .source(test_sets()[0].clone())
        .distribution(exponential_population())
        .build()
        .unwrap();

    assert!(matches!(model.sources()[0], SourceResult::Grid(_)));
    assert!(model.ln_likelihood(&point(2e30)).unwrap().is_finite());
}

// ===========================================================================
// Inference
// ===========================================================================

#[test]
fn grid_evaluation() {
    let mut model = MassQuadrupoleDistribution::builder()
        .data(test_sets())
        .distribution(exponential_population())
        .grid([("mu", 25)])
        .build()
        .unwrap();

    let outcome = model.run(&SampleOptions::default().label("grid_test")).unwrap();
    let HierarchicalOutcome::Grid(grid) = outcome else {
        panic!("expected a grid outcome");
    };
    assert_eq!(grid.label(), "grid_test");
    assert_eq!(grid.shape(), vec![25]);
    assert!(grid.ln_evidence().is_finite());

    let median = grid.median("mu").unwrap();
    assert!((1e29..=1e31).contains(&median));
    assert_eq!(model.state(), ModelState::Sampled);
}

#[test]
fn nested_sampling_run() {
    init_tracing();
    let mut model = MassQuadrupoleDistribution::builder()
        .data(test_sets())
        .distribution(exponential_population())
        .nsamples(200)
        .build()
        .unwrap();

    let result = model.sample(&SampleOptions::quick().seed(7)).unwrap();
    assert_eq!(result.sampler, "dynesty");
    assert_eq!(result.search_parameter_keys, ["mu"]);
    assert!(result.log_evidence.is_finite());
    assert!(!result.posterior.is_empty());

    let mu = result.samples("mu").unwrap();
    assert!(mu.iter().all(|m| (1e29..=1e31).contains(m)));
    let upper = result.upper_limit("mu", 0.95).unwrap();
    assert!(upper > 1e29 && upper <= 1e31);
}

#[test]
fn saved_results_load_back() {
    let dir = tempfile::tempdir().unwrap();
    let mut model = MassQuadrupoleDistribution::builder()
        .data(test_sets())
        .distribution(exponential_population())
        .sampler("nestle")
        .nsamples(100)
        .build()
        .unwrap();

    let options = SampleOptions::quick()
        .seed(11)
        .save(true)
        .outdir(dir.path())
        .label("population");
    let result = model.sample(&options).unwrap();

    let path = dir.path().join("population_result.json");
    assert!(path.exists());
    let loaded = pulsar_population::load(path.as_path()).unwrap();
    assert_eq!(loaded.label(), "population");
    assert!(loaded.has_parameter("mu"));
    let SourceResult::Posterior(loaded) = loaded else {
        panic!("expected a posterior result");
    };
    assert_eq!(loaded.sampler, "nestle");
    assert_eq!(loaded.posterior.len(), result.posterior.len());
}
