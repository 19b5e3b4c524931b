//! Execution: operators, caching, progress and the tiled orchestrator.

pub mod backends;
pub mod cache;
pub mod operator;
pub mod orchestrator;
pub mod output;
pub mod progress;

pub use backends::WorkerLauncher;
pub use cache::{new_shared_cache, CacheKey, CacheStats, OperatorCache, SharedCache};
pub use operator::{CachedOperator, Operator, OperatorId, Retriever};
pub use orchestrator::{run, Backend, Orchestrator};
pub use output::OutputBuffer;
pub use progress::{ProgressCallback, ProgressTracker, ProgressUpdate};
