//! In-process backend: a fixed-size rayon pool sharing memory with the caller.

use crate::core::error::{RunError, RunResult};
use crate::core::geometry::Region;
use crate::execution::orchestrator::RunContext;
use crate::task::TileTask;
use log::debug;
use rayon::prelude::*;
use std::time::Instant;

/// Compute every tile on `ctx.workers` threads, merging each as it finishes.
///
/// The first failure stops further tiles from being started.
pub(crate) fn run_tiles<T: TileTask>(ctx: &RunContext<'_, T>, tiles: &[Region]) -> RunResult<()> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(ctx.workers)
        .thread_name(|index| format!("tilewise-tile-{}", index))
        .build()
        .map_err(|e| RunError::Transport(format!("failed to start thread pool: {}", e)))?;

    pool.install(|| {
        tiles.par_iter().with_max_len(1).try_for_each(|tile| {
            ctx.check_cancelled()?;
            let started = Instant::now();
            let block = ctx
                .task
                .compute_tile(tile)
                .map_err(|e| RunError::tile_failed(*tile, e))?;
            debug!("Computed tile {} in {:?}", tile, started.elapsed());
            ctx.merge(tile, &block, started.elapsed())
        })
    })
}
