//! # Tilewise - Tiled Feature Extraction and Pixel Classification
//!
//! Tilewise evaluates windowed feature extractors and trained pixel
//! classifiers over arbitrary regions of large 5D (`tzyxc`) datasets. Work is
//! split into disjoint tiles, each tile is computed with the halo its kernels
//! need, and the results are merged into one output block. Tiled results are
//! bit-identical to untiled ones.
//!
//! ## Features
//!
//! - **Halo-aware filters**: Gaussian-family channel-wise filters with
//!   optional 2D slicing and presmoothing
//! - **Feature stacks**: ordered collections that concatenate channels
//! - **Pixel classification**: annotations, training and prediction behind a
//!   pluggable model seam
//! - **Interchangeable backends**: thread pool, process pool and rank-based
//!   distributed workers
//! - **Caching**: capacity-bounded LRU memoization of operator results
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tilewise::prelude::*;
//!
//! let source = ArrayDataSource::new(block, Shape5::spatial(1, 256, 256));
//! let features = FeatureExtractorCollection::parse([
//!     "GaussianSmoothing(0.3)",
//!     "HessianOfGaussianEigenvalues(1.6, axis_2d=\"z\")",
//! ])?;
//! let task = FeatureTask::new(source, features);
//!
//! let orchestrator = Orchestrator::new(4);
//! let output = orchestrator.run(&task.source.interval(), &task, &Backend::ThreadPool)?;
//! ```
//!
//! ## Architecture
//!
//! - [`core`]: geometry, blocks, the data source seam, configuration, errors
//! - [`features`]: kernels, channel-wise filters and collections
//! - [`classifier`]: annotations, models, the pixel classifier, exports
//! - [`task`]: region-valued tasks that can cross process boundaries
//! - [`execution`]: operators, caching, progress and the orchestrator

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod classifier;
pub mod core;
pub mod execution;
pub mod features;
pub mod task;

/// Prelude module for convenient imports.
///
/// Import everything commonly needed with:
/// ```rust,ignore
/// use tilewise::prelude::*;
/// ```
pub mod prelude {
    // Geometry and data
    pub use crate::core::block::{Block, BlockBuf, FeatureMatrix};
    pub use crate::core::geometry::{Axis, Point5, Region, Shape5};
    pub use crate::core::source::{ArrayDataSource, DataSource, SourceId};

    // Configuration
    pub use crate::core::config::{BackendKind, EngineConfig, TileShapeConfig};

    // Errors
    pub use crate::core::error::{
        ConfigError, EngineError, EngineResult, FailureKind, ModelError, RunError, RunResult,
        SourceError, TileFailure, TilewiseError, TilewiseResult,
    };

    // Features
    pub use crate::features::{ChannelwiseFilter, FeatureExtractor, FeatureExtractorCollection, FilterKind};

    // Classification
    pub use crate::classifier::{
        render_z_slice_pngs, to_u8_wire, Annotation, Classifier, Color, GaussianNaiveBayes, Model,
        NaiveBayesTrainer, Trainer,
    };

    // Tasks
    pub use crate::task::{FeatureTask, PredictionTask, StandardTask, TileTask};

    // Execution
    pub use crate::execution::cache::{new_shared_cache, CacheKey, CacheStats, OperatorCache, SharedCache};
    pub use crate::execution::operator::{CachedOperator, Operator, OperatorId, Retriever};
    pub use crate::execution::orchestrator::{Backend, Orchestrator};
    pub use crate::execution::output::OutputBuffer;
    pub use crate::execution::progress::{ProgressCallback, ProgressTracker, ProgressUpdate};
    pub use crate::execution::backends::WorkerLauncher;
}

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
