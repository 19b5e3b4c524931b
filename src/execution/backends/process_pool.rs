//! Multi-process backend.
//!
//! Tiles are cut into one contiguous batch per worker. Each batch travels to
//! its worker together with the task as a JSON [`BatchRequest`]; the worker
//! computes its tiles in order and answers with a [`BatchResponse`]. Nothing
//! but these bytes crosses the boundary. Results are merged in batch order
//! once every worker has answered.

use crate::core::block::Block;
use crate::core::error::{RunError, RunResult, TileFailure};
use crate::core::geometry::Region;
use crate::execution::orchestrator::RunContext;
use crate::task::TileTask;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// One worker's share of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRequest<T> {
    /// Position of the batch in the run.
    pub batch_index: usize,
    /// The task to run.
    pub task: T,
    /// Tiles to compute, in order.
    pub tiles: Vec<Region>,
}

/// The outcome of one tile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TileOutcome {
    /// The tile's output.
    Done {
        /// The tile.
        region: Region,
        /// Its output.
        block: Block,
        /// Time spent computing.
        elapsed_ms: u64,
    },
    /// The tile failed; the worker stopped here.
    Failed {
        /// The tile.
        region: Region,
        /// Why it failed.
        failure: TileFailure,
    },
}

/// A worker's answer. A worker stops at its first failing tile, so `results`
/// is shorter than the batch only when it ends in a failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResponse {
    /// Echo of the request's index.
    pub batch_index: usize,
    /// One outcome per computed tile.
    pub results: Vec<TileOutcome>,
}

/// Compute one batch: read a [`BatchRequest`] from `reader` and write the
/// [`BatchResponse`] to `writer`. This is the body of `tilewise worker`.
pub fn serve_batch<T, R, W>(reader: R, mut writer: W) -> RunResult<()>
where
    T: TileTask + DeserializeOwned,
    R: Read,
    W: Write,
{
    let request: BatchRequest<T> =
        serde_json::from_reader(reader).map_err(|e| RunError::Transport(format!("unreadable batch: {}", e)))?;
    let response = compute_batch(&request);
    serde_json::to_writer(&mut writer, &response)
        .map_err(|e| RunError::Transport(format!("cannot write batch response: {}", e)))?;
    writer.flush().map_err(|e| RunError::Transport(e.to_string()))
}

fn compute_batch<T: TileTask>(request: &BatchRequest<T>) -> BatchResponse {
    let mut results = Vec::with_capacity(request.tiles.len());
    for tile in &request.tiles {
        let started = Instant::now();
        match request.task.compute_tile(tile) {
            Ok(block) => results.push(TileOutcome::Done {
                region: *tile,
                block,
                elapsed_ms: started.elapsed().as_millis() as u64,
            }),
            Err(error) => {
                results.push(TileOutcome::Failed {
                    region: *tile,
                    failure: TileFailure::from(error),
                });
                break;
            }
        }
    }
    BatchResponse {
        batch_index: request.batch_index,
        results,
    }
}

// ============================================================================
// Launchers
// ============================================================================

/// How worker processes are started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerLauncher {
    /// Run `program args...`, write the request to its stdin and read the
    /// response from its stdout.
    Subprocess { program: PathBuf, args: Vec<String> },
    /// Run the worker on a dedicated thread that only sees the request bytes.
    Isolated,
}

impl WorkerLauncher {
    /// Launch this executable's `worker` subcommand.
    pub fn current_exe() -> std::io::Result<Self> {
        Ok(Self::subprocess(std::env::current_exe()?, ["worker"]))
    }

    /// Run `program` with `args` as the worker.
    pub fn subprocess<I, S>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        WorkerLauncher::Subprocess {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Send `request` to a fresh worker and return its raw response.
    fn launch<T>(&self, worker: &str, request: Vec<u8>) -> RunResult<Vec<u8>>
    where
        T: TileTask + DeserializeOwned,
    {
        let crash = |message: String| RunError::WorkerCrash {
            worker: worker.to_string(),
            message,
        };
        match self {
            WorkerLauncher::Subprocess { program, args } => {
                let mut child = Command::new(program)
                    .args(args)
                    .stdin(Stdio::piped())
                    .stdout(Stdio::piped())
                    .stderr(Stdio::inherit())
                    .spawn()
                    .map_err(|e| crash(format!("failed to start {}: {}", program.display(), e)))?;
                // The worker reads its whole request before it writes anything.
                if let Some(mut stdin) = child.stdin.take() {
                    if let Err(error) = stdin.write_all(&request) {
                        drop(stdin);
                        // Reap the worker so it does not linger as a zombie.
                        let _ = child.kill();
                        let status = child.wait();
                        debug!("{} stopped after a failed send: {:?}", worker, status);
                        return Err(crash(format!("failed to send batch: {}", error)));
                    }
                }
                let output = child
                    .wait_with_output()
                    .map_err(|e| crash(format!("lost worker: {}", e)))?;
                if !output.status.success() {
                    return Err(crash(format!("exited with {}", output.status)));
                }
                Ok(output.stdout)
            }
            WorkerLauncher::Isolated => {
                let mut response = Vec::new();
                let served = panic::catch_unwind(AssertUnwindSafe(|| {
                    serve_batch::<T, _, _>(request.as_slice(), &mut response)
                }));
                match served {
                    Ok(Ok(())) => Ok(response),
                    Ok(Err(error)) => Err(crash(error.to_string())),
                    Err(payload) => Err(crash(panic_message(payload.as_ref()))),
                }
            }
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {}", message)
    } else {
        "panicked".to_string()
    }
}

// ============================================================================
// Coordinator
// ============================================================================

/// Split `tiles` into `min(workers, tiles.len())` contiguous batches whose
/// sizes differ by at most one, larger batches first.
pub fn batches(tiles: &[Region], workers: usize) -> Vec<Vec<Region>> {
    let count = workers.max(1).min(tiles.len());
    if count == 0 {
        return Vec::new();
    }
    let (base, extra) = (tiles.len() / count, tiles.len() % count);
    let mut rest = tiles;
    (0..count)
        .map(|index| {
            let (batch, tail) = rest.split_at(base + usize::from(index < extra));
            rest = tail;
            batch.to_vec()
        })
        .collect()
}

pub(crate) fn run_tiles<T>(ctx: &RunContext<'_, T>, tiles: &[Region], launcher: &WorkerLauncher) -> RunResult<()>
where
    T: TileTask + Serialize + DeserializeOwned,
{
    let batches = batches(tiles, ctx.workers);
    let requests = batches
        .iter()
        .enumerate()
        .map(|(batch_index, batch)| {
            serde_json::to_vec(&BatchRequest {
                batch_index,
                task: ctx.task,
                tiles: batch.clone(),
            })
            .map_err(|e| RunError::Transport(format!("cannot serialize batch {}: {}", batch_index, e)))
        })
        .collect::<RunResult<Vec<Vec<u8>>>>()?;

    let responses = crossbeam::scope(|scope| {
        let handles: Vec<_> = requests
            .into_iter()
            .enumerate()
            .map(|(batch_index, request)| {
                scope.spawn(move |_| {
                    if ctx.tracker.is_cancelled() {
                        return Err(RunError::Cancelled);
                    }
                    let worker = format!("process-worker-{}", batch_index);
                    debug!("Launching {} with {} bytes", worker, request.len());
                    launcher.launch::<T>(&worker, request)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| {
                handle.join().unwrap_or_else(|payload| {
                    Err(RunError::WorkerCrash {
                        worker: "process-pool".to_string(),
                        message: panic_message(payload.as_ref()),
                    })
                })
            })
            .collect::<Vec<RunResult<Vec<u8>>>>()
    })
    .map_err(|_| RunError::Transport("process pool coordinator panicked".to_string()))?;

    ctx.check_cancelled()?;
    for (batch_index, (batch, response)) in batches.iter().zip(responses).enumerate() {
        let worker = format!("process-worker-{}", batch_index);
        let bytes = response?;
        let response: BatchResponse = serde_json::from_slice(&bytes).map_err(|e| RunError::WorkerCrash {
            worker: worker.clone(),
            message: format!("unreadable output: {}", e),
        })?;
        if response.batch_index != batch_index {
            return Err(RunError::WorkerCrash {
                worker,
                message: format!("answered for batch {}", response.batch_index),
            });
        }
        merge_batch(ctx, &worker, batch, response.results)?;
    }
    Ok(())
}

fn merge_batch<T: TileTask>(
    ctx: &RunContext<'_, T>,
    worker: &str,
    batch: &[Region],
    results: Vec<TileOutcome>,
) -> RunResult<()> {
    let answered = results.len();
    for (tile, outcome) in batch.iter().zip(results) {
        match outcome {
            TileOutcome::Done {
                region,
                block,
                elapsed_ms,
            } if region == *tile => ctx.merge(tile, &block, Duration::from_millis(elapsed_ms))?,
            TileOutcome::Failed { region, failure } if region == *tile => {
                warn!("{} failed on {}: {}", worker, region, failure);
                return Err(RunError::TileFailed { region, failure });
            }
            _ => {
                return Err(RunError::WorkerCrash {
                    worker: worker.to_string(),
                    message: format!("answered out of order at tile {}", tile),
                })
            }
        }
    }
    if answered < batch.len() {
        return Err(RunError::WorkerCrash {
            worker: worker.to_string(),
            message: format!("returned {} of {} tiles", answered, batch.len()),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geometry::Shape5;
    use crate::task::StandardTask;

    #[test]
    fn test_batches_are_contiguous() {
        let tiles = Region::from_shape(Shape5::spatial(1, 10, 10)).unwrap().split(Shape5::new(1, 1, 2, 10, 0));
        assert_eq!(tiles.len(), 5);
        let split = batches(&tiles, 2);
        assert_eq!(split.len(), 2);
        assert_eq!(split[0].len(), 3);
        assert_eq!(split.concat(), tiles);
        assert_eq!(batches(&tiles, 16).len(), 5);
        assert!(batches(&[], 4).is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_worker_that_ignores_its_request_is_a_crash() {
        // Larger than a pipe buffer, so the send fails once `true` exits.
        let request = vec![b' '; 1 << 20];
        let launcher = WorkerLauncher::subprocess("true", Vec::<String>::new());
        let err = launcher.launch::<StandardTask>("early-exit", request).unwrap_err();
        match err {
            RunError::WorkerCrash { worker, message } => {
                assert_eq!(worker, "early-exit");
                assert!(message.contains("failed to send batch"), "{}", message);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_batches_keep_every_worker_busy() {
        let tiles = Region::from_shape(Shape5::spatial(1, 10, 10)).unwrap().split(Shape5::new(1, 1, 2, 10, 0));
        let split = batches(&tiles, 4);
        let sizes: Vec<usize> = split.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![2, 1, 1, 1]);
        assert_eq!(split.concat(), tiles);

        let many = Region::from_shape(Shape5::spatial(1, 14, 1)).unwrap().split(Shape5::spatial(1, 1, 1));
        let sizes: Vec<usize> = batches(&many, 4).iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![4, 4, 3, 3]);
    }
}
