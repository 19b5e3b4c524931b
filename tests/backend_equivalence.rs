//! Every backend produces the same bits, and fails the same way.

mod common;

use common::{feature_task, texture, volume, worker_binary, FaultyTask};
use std::sync::{Arc, OnceLock, Weak};
use tilewise::prelude::*;

const FILTERS: [&str; 2] = ["GaussianSmoothing(0.5)", "HessianOfGaussianEigenvalues(0.5)"];

fn standard_task() -> StandardTask {
    let block = volume(12, 12, 12, texture);
    StandardTask::from(feature_task(block, Shape5::spatial(6, 6, 6), &FILTERS))
}

fn backends() -> Vec<Backend> {
    vec![
        Backend::ThreadPool,
        Backend::ProcessPool(WorkerLauncher::Isolated),
        Backend::ProcessPool(worker_binary()),
        Backend::Distributed,
    ]
}

fn faulty(panic: bool) -> FaultyTask {
    FaultyTask {
        inner: feature_task(volume(12, 12, 12, texture), Shape5::spatial(6, 6, 6), &FILTERS),
        trigger: Point5::new(0, 7, 7, 7, 0),
        panic,
    }
}

fn failing_tile() -> Region {
    Region::new(Point5::new(0, 6, 6, 6, 0), Point5::new(1, 12, 12, 12, 1)).unwrap()
}

/// A tracker that cancels itself once the first tile is merged.
fn self_cancelling_tracker() -> Arc<ProgressTracker> {
    let handle: Arc<OnceLock<Weak<ProgressTracker>>> = Arc::new(OnceLock::new());
    let inner = Arc::clone(&handle);
    let tracker = Arc::new(ProgressTracker::new().with_callback(Box::new(move |update| {
        if let ProgressUpdate::TileCompleted { .. } = update {
            if let Some(tracker) = inner.get().and_then(Weak::upgrade) {
                tracker.cancel();
            }
        }
    })));
    handle.set(Arc::downgrade(&tracker)).unwrap();
    tracker
}

#[test]
fn test_features_identical_on_every_backend() {
    let task = standard_task();
    let full = Region::from_shape(Shape5::spatial(12, 12, 12)).unwrap();
    let reference = task.compute_tile(&full).unwrap();
    assert_eq!(reference.shape().c, 4);

    for backend in backends() {
        let output = Orchestrator::new(3).run(&full, &task, &backend).unwrap();
        assert!(output.bit_identical(&reference), "{:?} differs from untiled output", backend);
    }
}

#[test]
fn test_predictions_through_worker_processes() {
    let raw_block = volume(12, 12, 12, |z, y, x| {
        let base = if x < 6 { 0.1 } else { 0.9 };
        base + texture(z, y, x) * 0.01
    });
    let source = ArrayDataSource::new(raw_block, Shape5::spatial(6, 6, 6));
    let raw: Arc<dyn DataSource> = Arc::new(source.clone());
    let dark = Annotation::from_voxels(
        &[Point5::new(0, 2, 2, 1, 0), Point5::new(0, 9, 9, 2, 0)],
        Color::rgb(0, 0, 255),
        Arc::clone(&raw),
    )
    .unwrap();
    let bright = Annotation::from_voxels(
        &[Point5::new(0, 2, 2, 10, 0), Point5::new(0, 9, 9, 9, 0)],
        Color::rgb(255, 0, 0),
        Arc::clone(&raw),
    )
    .unwrap();
    let filters = FeatureExtractorCollection::parse(["GaussianSmoothing(0.5)"]).unwrap();
    let classifier = Classifier::train(
        filters.extractors().to_vec(),
        &[dark, bright],
        &NaiveBayesTrainer::new(),
        0,
    )
    .unwrap();

    let full = source.interval();
    let task = StandardTask::from(PredictionTask::new(source, classifier));
    let local = Orchestrator::new(2).run(&full, &task, &Backend::ThreadPool).unwrap();
    let remote = Orchestrator::new(2)
        .run(&full, &task, &Backend::ProcessPool(worker_binary()))
        .unwrap();

    assert_eq!(local.shape().c, 2);
    assert!(remote.bit_identical(&local));
}

#[test]
fn test_first_failure_aborts_run() {
    let task = faulty(false);
    let full = task.inner.source.interval();
    let launchers = [
        Backend::ThreadPool,
        Backend::ProcessPool(WorkerLauncher::Isolated),
        Backend::Distributed,
    ];
    for backend in launchers {
        let tracker = ProgressTracker::new_shared();
        let err = Orchestrator::new(2)
            .with_progress(Arc::clone(&tracker))
            .run(&full, &task, &backend)
            .unwrap_err();
        match err {
            RunError::TileFailed { region, failure } => {
                assert_eq!(region, failing_tile(), "{:?}", backend);
                assert_eq!(failure.kind, FailureKind::SourceFatal);
                assert!(failure.message.contains("disk on fire"));
                // only the in-process backend keeps the typed error
                match (&backend, failure.cause()) {
                    (Backend::ThreadPool, Some(EngineError::Source(source))) => assert!(!source.is_transient()),
                    (Backend::ThreadPool, other) => panic!("thread pool lost the cause: {:?}", other),
                    (_, cause) => assert!(cause.is_none(), "{:?}", backend),
                }
            }
            other => panic!("{:?} returned {:?}", backend, other),
        }
        assert!(tracker.completed_tiles() < 8);
    }
}

#[test]
fn test_worker_panic_is_a_crash() {
    let task = faulty(true);
    let full = task.inner.source.interval();
    for backend in [Backend::ProcessPool(WorkerLauncher::Isolated), Backend::Distributed] {
        let err = Orchestrator::new(2).run(&full, &task, &backend).unwrap_err();
        match err {
            RunError::WorkerCrash { message, .. } => assert!(message.contains("worker blew up"), "{}", message),
            other => panic!("{:?} returned {:?}", backend, other),
        }
    }
}

#[test]
fn test_failing_worker_process_is_a_crash() {
    let task = standard_task();
    let full = Region::from_shape(Shape5::spatial(12, 12, 12)).unwrap();
    let broken = WorkerLauncher::subprocess(env!("CARGO_BIN_EXE_tilewise"), ["no-such-command"]);
    let err = Orchestrator::new(2)
        .run(&full, &task, &Backend::ProcessPool(broken))
        .unwrap_err();
    assert!(matches!(err, RunError::WorkerCrash { .. }), "{:?}", err);

    let missing = WorkerLauncher::subprocess("/nonexistent/tilewise-worker", ["worker"]);
    let err = Orchestrator::new(2)
        .run(&full, &task, &Backend::ProcessPool(missing))
        .unwrap_err();
    assert!(matches!(err, RunError::WorkerCrash { .. }), "{:?}", err);
}

#[test]
fn test_cancellation_stops_run() {
    let task = standard_task();
    let full = Region::from_shape(Shape5::spatial(12, 12, 12)).unwrap();
    for backend in [Backend::ThreadPool, Backend::Distributed] {
        let tracker = self_cancelling_tracker();
        let err = Orchestrator::new(2)
            .with_progress(Arc::clone(&tracker))
            .run(&full, &task, &backend)
            .unwrap_err();
        assert_eq!(err, RunError::Cancelled, "{:?}", backend);
        assert!(tracker.completed_tiles() < 8);
    }
}

#[test]
fn test_inapplicable_task_rejected_on_every_backend() {
    let small = feature_task(
        volume(1, 4, 4, texture),
        Shape5::spatial(1, 2, 2),
        &["GaussianSmoothing(1.0, axis_2d=\"z\")"],
    );
    let task = StandardTask::from(small);
    let full = Region::from_shape(Shape5::spatial(1, 4, 4)).unwrap();
    for backend in backends() {
        let err = Orchestrator::new(2).run(&full, &task, &backend).unwrap_err();
        assert!(
            matches!(&err, RunError::InvalidTask { error, .. } if error.is_shape_mismatch()),
            "{:?} returned {:?}",
            backend,
            err
        );
    }

    let task = standard_task();
    let outside = Region::from_shape(Shape5::spatial(12, 12, 13)).unwrap();
    let err = Orchestrator::new(2).run(&outside, &task, &Backend::Distributed).unwrap_err();
    assert!(matches!(err, RunError::InvalidTask { error: EngineError::InvalidInput(_), .. }));
}
