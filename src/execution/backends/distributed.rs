//! Rank-based distributed backend.
//!
//! Rank 0 is the coordinator. Ranks `1..=n` are worker actors that receive
//! the serialized task once and then loop: receive a [`Command`], compute the
//! tile, send a [`ResultMessage`], until told to stop. Every message is JSON
//! bytes on a crossbeam channel, so the actors share nothing but the wire
//! format.

use crate::core::block::Block;
use crate::core::error::{RunError, RunResult, TileFailure};
use crate::core::geometry::Region;
use crate::execution::backends::process_pool::panic_message;
use crate::execution::orchestrator::RunContext;
use crate::task::TileTask;
use crossbeam::channel::{self, Receiver, Sender};
use log::{debug, trace, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// A tile handed to a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileDescriptor {
    /// Matches a result to its request.
    pub task_id: Uuid,
    /// Tile to compute.
    pub region: Region,
}

/// Coordinator to worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    /// Compute one tile.
    Compute(TileDescriptor),
    /// Exit after the current tile.
    Stop,
}

/// Worker to coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResultMessage {
    /// A tile finished, successfully or not.
    Done {
        /// Sending worker.
        rank: usize,
        /// The descriptor's id.
        task_id: Uuid,
        /// Time spent computing.
        elapsed_ms: u64,
        /// The tile's output or failure.
        outcome: Result<Block, TileFailure>,
    },
    /// The worker stopped abnormally.
    Crashed {
        /// Sending worker.
        rank: usize,
        /// Panic or transport error.
        message: String,
    },
}

fn encode<M: Serialize>(message: &M) -> RunResult<Vec<u8>> {
    serde_json::to_vec(message).map_err(|e| RunError::Transport(e.to_string()))
}

fn decode<M: DeserializeOwned>(bytes: &[u8]) -> RunResult<M> {
    serde_json::from_slice(bytes).map_err(|e| RunError::Transport(format!("malformed message: {}", e)))
}

// ============================================================================
// Worker
// ============================================================================

/// Run worker `rank` until it receives `Stop` or its inbox closes. Panics
/// are reported as a `Crashed` message.
fn worker<T>(rank: usize, task: &[u8], inbox: Receiver<Vec<u8>>, outbox: Sender<Vec<u8>>)
where
    T: TileTask + DeserializeOwned,
{
    let served = panic::catch_unwind(AssertUnwindSafe(|| serve::<T>(rank, task, &inbox, &outbox)));
    let message = match served {
        Ok(Ok(())) => return,
        Ok(Err(error)) => error.to_string(),
        Err(payload) => panic_message(payload.as_ref()),
    };
    if let Ok(bytes) = encode(&ResultMessage::Crashed { rank, message }) {
        let _ = outbox.send(bytes);
    }
}

fn serve<T>(rank: usize, task: &[u8], inbox: &Receiver<Vec<u8>>, outbox: &Sender<Vec<u8>>) -> RunResult<()>
where
    T: TileTask + DeserializeOwned,
{
    let task: T = decode(task)?;
    for bytes in inbox.iter() {
        let descriptor = match decode::<Command>(&bytes)? {
            Command::Compute(descriptor) => descriptor,
            Command::Stop => break,
        };
        trace!("rank {} computing {}", rank, descriptor.region);
        let started = Instant::now();
        let outcome = task.compute_tile(&descriptor.region).map_err(TileFailure::from);
        let reply = encode(&ResultMessage::Done {
            rank,
            task_id: descriptor.task_id,
            elapsed_ms: started.elapsed().as_millis() as u64,
            outcome,
        })?;
        if outbox.send(reply).is_err() {
            break;
        }
    }
    Ok(())
}

// ============================================================================
// Coordinator
// ============================================================================

pub(crate) fn run_tiles<T>(ctx: &RunContext<'_, T>, tiles: &[Region]) -> RunResult<()>
where
    T: TileTask + Serialize + DeserializeOwned,
{
    let task = encode(ctx.task)?;
    let ranks = ctx.workers.min(tiles.len()).max(1);

    crossbeam::scope(|scope| {
        let (result_tx, result_rx) = channel::unbounded::<Vec<u8>>();
        let mut inboxes = HashMap::with_capacity(ranks);
        for rank in 1..=ranks {
            let (command_tx, command_rx) = channel::unbounded::<Vec<u8>>();
            let outbox = result_tx.clone();
            let task = task.as_slice();
            scope
                .builder()
                .name(format!("tilewise-rank-{}", rank))
                .spawn(move |_| worker::<T>(rank, task, command_rx, outbox))
                .map_err(|e| RunError::Transport(format!("failed to start rank {}: {}", rank, e)))?;
            inboxes.insert(rank, command_tx);
        }
        // Only workers hold senders now, so the channel closes if they all vanish.
        drop(result_tx);

        let outcome = coordinate(ctx, tiles, &inboxes, &result_rx);
        if let Ok(stop) = encode(&Command::Stop) {
            for inbox in inboxes.values() {
                let _ = inbox.send(stop.clone());
            }
        }
        outcome
    })
    .map_err(|_| RunError::Transport("distributed coordinator panicked".to_string()))?
}

fn coordinate<T: TileTask>(
    ctx: &RunContext<'_, T>,
    tiles: &[Region],
    inboxes: &HashMap<usize, Sender<Vec<u8>>>,
    results: &Receiver<Vec<u8>>,
) -> RunResult<()> {
    let mut idle: VecDeque<usize> = {
        let mut ranks: Vec<usize> = inboxes.keys().copied().collect();
        ranks.sort_unstable();
        ranks.into()
    };
    let mut pending = tiles.iter();
    let mut in_flight: HashMap<usize, TileDescriptor> = HashMap::new();
    let mut first_error: Option<RunError> = None;

    loop {
        if first_error.is_none() && ctx.tracker.is_cancelled() {
            first_error = Some(RunError::Cancelled);
        }
        while first_error.is_none() && !idle.is_empty() {
            let Some(region) = pending.next() else { break };
            let Some(rank) = idle.pop_front() else { break };
            let descriptor = TileDescriptor {
                task_id: Uuid::new_v4(),
                region: *region,
            };
            let sent = inboxes
                .get(&rank)
                .map(|inbox| encode(&Command::Compute(descriptor)).map(|bytes| inbox.send(bytes).is_ok()));
            match sent {
                Some(Ok(true)) => {
                    debug!("Sent {} to rank {}", region, rank);
                    in_flight.insert(rank, descriptor);
                }
                Some(Err(error)) => first_error = Some(error),
                _ => {
                    first_error = Some(RunError::WorkerCrash {
                        worker: format!("rank-{}", rank),
                        message: "inbox closed".to_string(),
                    })
                }
            }
        }
        if in_flight.is_empty() {
            break;
        }

        let bytes = match results.recv() {
            Ok(bytes) => bytes,
            Err(_) => {
                return Err(first_error.unwrap_or_else(|| {
                    RunError::Transport(format!("all workers vanished with {} tiles in flight", in_flight.len()))
                }))
            }
        };
        // A garbled reply leaves its rank unaccounted for, so stop here.
        let message = decode::<ResultMessage>(&bytes)?;

        match message {
            ResultMessage::Done {
                rank,
                task_id,
                elapsed_ms,
                outcome,
            } => {
                let Some(descriptor) = in_flight.remove(&rank).filter(|d| d.task_id == task_id) else {
                    return Err(RunError::Transport(format!(
                        "rank {} answered for unknown task {}",
                        rank, task_id
                    )));
                };
                idle.push_back(rank);
                if first_error.is_some() {
                    continue;
                }
                let merged = match outcome {
                    Ok(block) => ctx.merge(&descriptor.region, &block, Duration::from_millis(elapsed_ms)),
                    Err(failure) => {
                        warn!("rank {} failed on {}: {}", rank, descriptor.region, failure);
                        Err(RunError::TileFailed {
                            region: descriptor.region,
                            failure,
                        })
                    }
                };
                if let Err(error) = merged {
                    first_error = Some(error);
                }
            }
            ResultMessage::Crashed { rank, message } => {
                warn!("rank {} crashed: {}", rank, message);
                in_flight.remove(&rank);
                first_error.get_or_insert(RunError::WorkerCrash {
                    worker: format!("rank-{}", rank),
                    message,
                });
            }
        }
    }

    match first_error {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geometry::Point5;

    #[test]
    fn test_command_wire_format() {
        let descriptor = TileDescriptor {
            task_id: Uuid::nil(),
            region: Region::new(Point5::zero(), Point5::splat(2)).unwrap(),
        };
        let bytes = encode(&Command::Compute(descriptor)).unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.starts_with("{\"command\":\"compute\""));
        assert_eq!(decode::<Command>(&bytes).unwrap(), Command::Compute(descriptor));
        assert_eq!(decode::<Command>(b"{\"command\":\"stop\"}").unwrap(), Command::Stop);
    }

    #[test]
    fn test_result_message_carries_failure() {
        let message = ResultMessage::Done {
            rank: 3,
            task_id: Uuid::nil(),
            elapsed_ms: 7,
            outcome: Err(TileFailure::new(crate::core::error::FailureKind::SourceNotFound, "gone")),
        };
        let bytes = encode(&message).unwrap();
        assert_eq!(decode::<ResultMessage>(&bytes).unwrap(), message);
    }

    #[test]
    fn test_crash_message_keeps_its_text() {
        let message = ResultMessage::Crashed {
            rank: 1,
            message: "panicked: out of memory".to_string(),
        };
        let bytes = encode(&message).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["kind"], "crashed");
        assert_eq!(json["message"], "panicked: out of memory");
        assert_eq!(decode::<ResultMessage>(&bytes).unwrap(), message);
    }
}
