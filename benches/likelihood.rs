use std::path::PathBuf;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use pulsar_population::{
    Distribution, HyperPoint, IntegrationMethod, MassQuadrupoleDistribution, Prior,
};

fn data_file(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests").join("data").join(name)
}

fn model(integration: IntegrationMethod) -> MassQuadrupoleDistribution {
    let dist = Distribution::exponential("q22", Prior::uniform(1e29, 1e31, "mu"))
        .expect("valid population");
    MassQuadrupoleDistribution::builder()
        .data([
            data_file("hierarchical_test_set_0_result.json"),
            data_file("hierarchical_test_set_1_result.json"),
        ])
        .distribution(dist)
        .integration(integration)
        .q22range(&[0.0, 2e31])
        .q22_bins(500)
        .build()
        .expect("fixtures load")
}

fn bench_ln_likelihood(c: &mut Criterion) {
    let mut group = c.benchmark_group("hyper_likelihood");
    let values = HyperPoint::from([("mu".to_string(), 2e30)]);

    let sample = model(IntegrationMethod::Sample);
    group.bench_function("sample_integration", |b| {
        b.iter(|| black_box(sample.ln_likelihood(black_box(&values))))
    });

    let numerical = model(IntegrationMethod::Numerical);
    group.bench_function("numerical_integration", |b| {
        b.iter(|| black_box(numerical.ln_likelihood(black_box(&values))))
    });
    group.finish();
}

fn bench_grid(c: &mut Criterion) {
    let mut group = c.benchmark_group("evidence_grid");
    group.sample_size(10);
    let dist = Distribution::exponential("q22", Prior::uniform(1e29, 1e31, "mu"))
        .expect("valid population");
    let mut gridded = MassQuadrupoleDistribution::builder()
        .data([
            data_file("hierarchical_test_set_0_result.json"),
            data_file("hierarchical_test_set_1_result.json"),
        ])
        .distribution(dist)
        .grid([("mu", 100)])
        .build()
        .expect("fixtures load");
    group.bench_function("mu_100", |b| {
        b.iter(|| black_box(gridded.evaluate_grid().map(|grid| grid.ln_evidence())))
    });
    group.finish();
}

criterion_group!(benches, bench_ln_likelihood, bench_grid);
criterion_main!(benches);
