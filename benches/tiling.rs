//! Criterion benches for tiled feature extraction.
//!
//! Run with: `cargo bench`
//!
//! These benchmarks measure:
//! - untiled feature computation over a whole slice
//! - the same computation split into tiles on the thread pool
//! - region splitting alone

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use std::hint::black_box;

use tilewise::prelude::*;

const SIDE: i64 = 256;

fn feature_task() -> FeatureTask<ArrayDataSource> {
    let region = Region::from_shape(Shape5::spatial(1, SIDE, SIDE)).unwrap();
    let data = (0..region.volume()).map(|i| ((i * 7919) % 1009) as f32 / 1009.0).collect();
    let source = ArrayDataSource::new(Block::new(region, data).unwrap(), Shape5::spatial(1, 64, 64));
    let features = FeatureExtractorCollection::parse([
        "GaussianSmoothing(1.0, axis_2d=\"z\")",
        "HessianOfGaussianEigenvalues(1.6, axis_2d=\"z\")",
    ])
    .expect("Failed to parse bench filters");
    FeatureTask::new(source, features)
}

/// Benchmark computing the whole slice as one tile.
fn bench_untiled(c: &mut Criterion) {
    let task = feature_task();
    let full = task.source.interval();

    let mut group = c.benchmark_group("features");
    group.throughput(Throughput::Elements(full.volume() as u64));
    group.sample_size(10);

    group.bench_function("untiled", |b| {
        b.iter(|| {
            let block = task.compute_tile(black_box(&full)).unwrap();
            black_box(block)
        })
    });

    group.finish();
}

/// Benchmark the orchestrated thread-pool run.
fn bench_thread_pool(c: &mut Criterion) {
    let task = feature_task();
    let full = task.source.interval();
    let orchestrator = Orchestrator::new(0);

    let mut group = c.benchmark_group("features");
    group.throughput(Throughput::Elements(full.volume() as u64));
    group.sample_size(10);

    group.bench_function("thread_pool", |b| {
        b.iter(|| {
            let block = orchestrator.run(black_box(&full), &task, &Backend::ThreadPool).unwrap();
            black_box(block)
        })
    });

    group.finish();
}

/// Benchmark splitting a large region into tiles.
fn bench_split(c: &mut Criterion) {
    let region = Region::from_shape(Shape5::new(4, 64, 2048, 2048, 3)).unwrap();
    let tile = Shape5::new(1, 16, 256, 256, 0);

    let mut group = c.benchmark_group("geometry");
    group.throughput(Throughput::Elements(region.split(tile).len() as u64));

    group.bench_function("split", |b| {
        b.iter(|| {
            let tiles = black_box(&region).split(black_box(tile));
            black_box(tiles)
        })
    });

    group.finish();
}

criterion_group!(benches, bench_untiled, bench_thread_pool, bench_split);
criterion_main!(benches);
