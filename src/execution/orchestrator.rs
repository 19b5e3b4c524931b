//! Tiled, parallel evaluation of a task over a region.
//!
//! The orchestrator validates the task, splits the region into disjoint
//! tiles, hands the tiles to a backend and merges every finished tile into a
//! shared [`OutputBuffer`]. A run yields either the fully merged output or
//! exactly one [`RunError`].

use crate::core::block::Block;
use crate::core::config::{resolve_workers, BackendKind, EngineConfig, TileShapeConfig};
use crate::core::error::{EngineError, RunError, RunResult};
use crate::core::geometry::{Axis, Region};
use crate::execution::backends::process_pool::WorkerLauncher;
use crate::execution::backends::{distributed, process_pool, thread_pool};
use crate::execution::output::OutputBuffer;
use crate::execution::progress::ProgressTracker;
use crate::task::TileTask;
use log::{info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Where tiles are computed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Backend {
    /// A fixed-size rayon pool in this process.
    #[default]
    ThreadPool,
    /// Isolated workers started through a launcher, one batch each.
    ProcessPool(WorkerLauncher),
    /// Rank-based worker actors exchanging serialized messages.
    Distributed,
}

impl Backend {
    /// The backend for a configured kind. Process pools launch this executable
    /// in worker mode.
    pub fn from_kind(kind: BackendKind) -> RunResult<Self> {
        Ok(match kind {
            BackendKind::ThreadPool => Backend::ThreadPool,
            BackendKind::ProcessPool => Backend::ProcessPool(
                WorkerLauncher::current_exe().map_err(|e| RunError::Transport(e.to_string()))?,
            ),
            BackendKind::Distributed => Backend::Distributed,
        })
    }

    /// Configured kind of this backend.
    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::ThreadPool => BackendKind::ThreadPool,
            Backend::ProcessPool(_) => BackendKind::ProcessPool,
            Backend::Distributed => BackendKind::Distributed,
        }
    }
}

// ============================================================================
// Run context
// ============================================================================

/// What a backend needs to run tiles and merge their results.
pub(crate) struct RunContext<'a, T> {
    pub task: &'a T,
    pub output: &'a OutputBuffer,
    pub tracker: &'a ProgressTracker,
    pub workers: usize,
}

impl<T: TileTask> RunContext<'_, T> {
    /// Merge a finished tile. The block must cover exactly the tile's output region.
    pub fn merge(&self, tile: &Region, block: &Block, elapsed: Duration) -> RunResult<()> {
        let expected = self.task.output_region(tile);
        if block.region() != &expected {
            return Err(RunError::tile_failed(
                *tile,
                EngineError::ShapeMismatch(format!(
                    "tile produced {} but {} was expected",
                    block.region(),
                    expected
                )),
            ));
        }
        self.output
            .set(block)
            .map_err(|e| RunError::tile_failed(*tile, e))?;
        self.tracker.tile_completed(*tile, elapsed.as_millis() as u64);
        Ok(())
    }

    /// Fail with [`RunError::Cancelled`] once the run has been cancelled.
    pub fn check_cancelled(&self) -> RunResult<()> {
        if self.tracker.is_cancelled() {
            Err(RunError::Cancelled)
        } else {
            Ok(())
        }
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Runs tasks tile by tile on a backend.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    workers: usize,
    tile_shape: Option<TileShapeConfig>,
    tracker: Arc<ProgressTracker>,
}

impl Orchestrator {
    /// An orchestrator with `workers` workers (0 = available parallelism).
    pub fn new(workers: usize) -> Self {
        Self {
            workers: resolve_workers(workers),
            tile_shape: None,
            tracker: ProgressTracker::new_shared(),
        }
    }

    /// Worker count and tile shape from the `[orchestrator]` section.
    pub fn from_config(config: &EngineConfig) -> Self {
        let mut orchestrator = Self::new(config.orchestrator.workers);
        orchestrator.tile_shape = config.orchestrator.tile_shape;
        orchestrator
    }

    /// Override the task's preferred tile shape. Channels always stay whole.
    pub fn with_tile_shape(mut self, tile_shape: TileShapeConfig) -> Self {
        self.tile_shape = Some(tile_shape);
        self
    }

    /// Report progress to, and take cancellation from, `tracker`.
    pub fn with_progress(mut self, tracker: Arc<ProgressTracker>) -> Self {
        self.tracker = tracker;
        self
    }

    /// The tracker that can cancel this orchestrator's runs.
    ///
    /// Cancelling stops the active run, or the next one if none is active.
    /// Later runs are unaffected.
    pub fn cancel_handle(&self) -> Arc<ProgressTracker> {
        Arc::clone(&self.tracker)
    }

    /// Number of workers each run starts.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Tiles a run of `task` over `full_region` is split into.
    pub fn plan<T: TileTask>(&self, full_region: &Region, task: &T) -> Vec<Region> {
        let preferred = task.preferred_tile_shape();
        let tile_shape = match &self.tile_shape {
            Some(config) => config.resolve(preferred),
            None => preferred.with(Axis::C, 0),
        };
        full_region.split(tile_shape)
    }

    /// Compute `task` over `full_region` on `backend`.
    pub fn run<T>(&self, full_region: &Region, task: &T, backend: &Backend) -> RunResult<Block>
    where
        T: TileTask + Serialize + DeserializeOwned,
    {
        task.validate(full_region).map_err(|error| RunError::InvalidTask {
            region: *full_region,
            error,
        })?;

        let tiles = self.plan(full_region, task);
        let output = OutputBuffer::allocate(task.output_region(full_region), 0.0);
        let ctx = RunContext {
            task,
            output: &output,
            tracker: &self.tracker,
            workers: self.workers.max(1),
        };

        info!(
            "Running {} over {} in {} tiles on {} ({} workers)",
            task.name(),
            full_region,
            tiles.len(),
            backend.kind(),
            ctx.workers
        );
        let started = Instant::now();
        self.tracker.start(tiles.len());

        let result = ctx.check_cancelled().and_then(|_| match backend {
            Backend::ThreadPool => thread_pool::run_tiles(&ctx, &tiles),
            Backend::ProcessPool(launcher) => process_pool::run_tiles(&ctx, &tiles, launcher),
            Backend::Distributed => distributed::run_tiles(&ctx, &tiles),
        });
        // A cancellation only ever stops the run it was aimed at.
        self.tracker.clear_cancellation();
        self.tracker.complete();

        match result {
            Ok(()) => {
                info!("Finished {} in {:?}", task.name(), started.elapsed());
                Ok(output.into_block())
            }
            Err(RunError::Cancelled) => {
                warn!("Run of {} cancelled after {} tiles", task.name(), self.tracker.completed_tiles());
                Err(RunError::Cancelled)
            }
            Err(error) => {
                warn!("Run of {} failed: {}", task.name(), error);
                self.tracker.report_error(error.region(), error.to_string());
                Err(error)
            }
        }
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new(0)
    }
}

/// Compute `task` over `full_region` with `workers` workers on `backend`.
pub fn run<T>(full_region: &Region, task: &T, backend: &Backend, workers: usize) -> RunResult<Block>
where
    T: TileTask + Serialize + DeserializeOwned,
{
    Orchestrator::new(workers).run(full_region, task, backend)
}
