//! Worker backends the orchestrator dispatches tiles to.
//!
//! - [`thread_pool`]: rayon threads sharing memory
//! - [`process_pool`]: isolated workers exchanging JSON batches
//! - [`distributed`]: rank-based actors exchanging JSON messages

pub mod distributed;
pub mod process_pool;
pub mod thread_pool;

pub use distributed::{Command, ResultMessage, TileDescriptor};
pub use process_pool::{serve_batch, BatchRequest, BatchResponse, TileOutcome, WorkerLauncher};
