//! Progress tracking for tiled runs.

use crate::core::geometry::Region;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// A progress update event.
#[derive(Debug, Clone)]
pub enum ProgressUpdate {
    /// A run has started.
    Started {
        total_tiles: usize,
    },
    /// A tile has been merged into the output.
    TileCompleted {
        region: Region,
        duration_ms: u64,
        index: usize,
        total: usize,
    },
    /// Overall progress percentage.
    Progress {
        percent: f32,
        elapsed_ms: u64,
        estimated_remaining_ms: Option<u64>,
    },
    /// The run has completed.
    Completed {
        total_duration_ms: u64,
        tiles_processed: usize,
    },
    /// Cancellation was requested.
    Cancelled,
    /// A tile or worker failed.
    Error {
        region: Option<Region>,
        message: String,
    },
}

/// Callback type for progress updates.
pub type ProgressCallback = Box<dyn Fn(ProgressUpdate) + Send + Sync>;

/// Tracks run progress and allows cancellation.
///
/// A tracker is shared between the caller and the orchestrator. A
/// [`ProgressTracker::cancel`] applies to the run in progress, or to the next
/// run if none is active. The orchestrator clears it when that run ends.
pub struct ProgressTracker {
    /// Total number of tiles in the current run.
    total_tiles: AtomicUsize,
    /// Number of tiles merged.
    completed_tiles: AtomicU64,
    /// Whether the run is cancelled.
    cancelled: AtomicBool,
    /// Start time of the current run.
    start_time: Mutex<Option<Instant>>,
    /// Progress callback.
    callback: Option<ProgressCallback>,
    /// Tile durations for estimation.
    tile_times: Mutex<Vec<u64>>,
}

impl ProgressTracker {
    /// Create a new progress tracker.
    pub fn new() -> Self {
        Self {
            total_tiles: AtomicUsize::new(0),
            completed_tiles: AtomicU64::new(0),
            cancelled: AtomicBool::new(false),
            start_time: Mutex::new(None),
            callback: None,
            tile_times: Mutex::new(Vec::new()),
        }
    }

    /// Create a progress tracker wrapped in Arc for sharing.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Set a callback for progress updates.
    pub fn with_callback(mut self, callback: ProgressCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Start tracking a run over `total_tiles` tiles.
    pub fn start(&self, total_tiles: usize) {
        self.total_tiles.store(total_tiles, Ordering::Relaxed);
        self.completed_tiles.store(0, Ordering::Relaxed);
        self.tile_times.lock().clear();
        *self.start_time.lock() = Some(Instant::now());
        self.send_update(ProgressUpdate::Started { total_tiles });
    }

    /// Report that a tile has been merged.
    pub fn tile_completed(&self, region: Region, duration_ms: u64) {
        let completed = self.completed_tiles.fetch_add(1, Ordering::Relaxed) as usize + 1;

        self.tile_times.lock().push(duration_ms);

        self.send_update(ProgressUpdate::TileCompleted {
            region,
            duration_ms,
            index: completed,
            total: self.total_tiles(),
        });

        self.send_progress_update();
    }

    /// Check if the run should stop submitting tiles.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
        self.send_update(ProgressUpdate::Cancelled);
    }

    /// Withdraw a cancellation request. Returns whether one was pending.
    pub fn clear_cancellation(&self) -> bool {
        self.cancelled.swap(false, Ordering::Relaxed)
    }

    /// Report an error.
    pub fn report_error(&self, region: Option<Region>, message: String) {
        self.send_update(ProgressUpdate::Error { region, message });
    }

    /// Complete tracking.
    pub fn complete(&self) {
        self.send_update(ProgressUpdate::Completed {
            total_duration_ms: self.elapsed_ms(),
            tiles_processed: self.completed_tiles(),
        });
    }

    /// Number of tiles in the current run.
    pub fn total_tiles(&self) -> usize {
        self.total_tiles.load(Ordering::Relaxed)
    }

    /// Number of tiles merged so far.
    pub fn completed_tiles(&self) -> usize {
        self.completed_tiles.load(Ordering::Relaxed) as usize
    }

    /// Get current progress percentage.
    pub fn progress_percent(&self) -> f32 {
        let total = self.total_tiles();
        if total == 0 {
            return 100.0;
        }
        (self.completed_tiles() as f32 / total as f32) * 100.0
    }

    /// Estimate remaining time in milliseconds.
    pub fn estimated_remaining_ms(&self) -> Option<u64> {
        let times = self.tile_times.lock();
        if times.is_empty() {
            return None;
        }

        let avg_time: u64 = times.iter().sum::<u64>() / times.len() as u64;
        let remaining = self.total_tiles().saturating_sub(self.completed_tiles());

        Some(avg_time * remaining as u64)
    }

    fn elapsed_ms(&self) -> u64 {
        let start = *self.start_time.lock();
        start.map(|t| t.elapsed().as_millis() as u64).unwrap_or(0)
    }

    fn send_update(&self, update: ProgressUpdate) {
        if let Some(ref callback) = self.callback {
            callback(update);
        }
    }

    fn send_progress_update(&self) {
        self.send_update(ProgressUpdate::Progress {
            percent: self.progress_percent(),
            elapsed_ms: self.elapsed_ms(),
            estimated_remaining_ms: self.estimated_remaining_ms(),
        });
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("total_tiles", &self.total_tiles())
            .field("completed_tiles", &self.completed_tiles())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
