//! Stability estimator and consensus builder benchmarks.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use motifstab_core::{
    ClusterRecord, ConsensusConfig, CoverSet, RunId, StabilityConfig, StabilityEstimator,
    build_consensus,
};

fn bench_stability_samples(c: &mut Criterion) {
    let perm = [3, 4, 1, 2, 6, 5, 7, 8, 9, 11, 10, 12];
    let mut group = c.benchmark_group("stability_estimate");

    for &samples in &[50usize, 500, 5000] {
        let est = StabilityEstimator::new(
            CoverSet::canonical(),
            StabilityConfig::new(samples, 0).unwrap(),
        );
        group.throughput(Throughput::Elements(samples as u64));
        group.bench_with_input(BenchmarkId::new("samples", samples), &samples, |b, _| {
            b.iter(|| black_box(est.estimate_indexed(black_box(&perm), 0)));
        });
    }
    group.finish();
}

fn synthetic_clusters(runs: u64, per_run: u64, size: u64) -> Vec<ClusterRecord> {
    let mut out = Vec::new();
    for run in 0..runs {
        for cluster in 0..per_run {
            // Shift each run by a little so neighbouring runs overlap.
            let start = cluster * size + run;
            out.push(ClusterRecord::new(
                RunId::Numbered(run),
                cluster as i64,
                start..start + size,
            ));
        }
    }
    out
}

fn bench_consensus(c: &mut Criterion) {
    let mut group = c.benchmark_group("consensus_build");
    let config = ConsensusConfig::default();

    for &runs in &[5u64, 20, 50] {
        let clusters = synthetic_clusters(runs, 6, 40);
        group.throughput(Throughput::Elements(clusters.len() as u64));
        group.bench_with_input(BenchmarkId::new("runs", runs), &clusters, |b, clusters| {
            b.iter(|| black_box(build_consensus(clusters, &config)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_stability_samples, bench_consensus);
criterion_main!(benches);
