//! Error types for Tilewise.
//!
//! Uses thiserror for structured errors with context. Errors are designed to:
//! - Be tagged results rather than panics, all the way up to the orchestrator
//! - Carry the failing region so callers know what to retry or inspect
//! - Cross process and network boundaries in serialized form ([`TileFailure`])

use crate::core::geometry::{GeometryError, Region};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for Tilewise.
///
/// This enum encompasses all error categories and enables automatic
/// conversion between specific error types.
#[derive(Error, Debug)]
pub enum TilewiseError {
    /// Feature extraction, sampling or prediction failed.
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// A tiled run failed.
    #[error("Run error: {0}")]
    Run(#[from] RunError),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// File or pipe I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Anything else.
    #[error("{0}")]
    Other(String),
}

/// Failures reported by a data source while retrieving a region.
///
/// The core never retries these; they are handed back unmodified.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceError {
    /// The region does not exist in the dataset.
    #[error("Region {region} not found in {dataset}")]
    NotFound {
        /// Requested region.
        region: Region,
        /// Name of the dataset.
        dataset: String,
    },

    /// Reading failed.
    #[error("I/O error reading {region}: {message}")]
    Io {
        /// Requested region.
        region: Region,
        /// What the collaborator reported.
        message: String,
        /// Whether the collaborator considers a later attempt likely to succeed.
        transient: bool,
    },
}

impl SourceError {
    /// Region the failed retrieval was asked for.
    pub fn region(&self) -> Region {
        match self {
            SourceError::NotFound { region, .. } | SourceError::Io { region, .. } => *region,
        }
    }

    /// Check if the failure was reported as transient.
    pub fn is_transient(&self) -> bool {
        matches!(self, SourceError::Io { transient: true, .. })
    }
}

/// Failures of the opaque model collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelError {
    /// No samples at all.
    #[error("Cannot fit a model on an empty training set")]
    EmptyTrainingSet,

    /// Feature rows and labels differ in count.
    #[error("Got {labels} labels for {rows} feature rows")]
    RowCountMismatch {
        /// Feature rows.
        rows: usize,
        /// Labels.
        labels: usize,
    },

    /// A label is zero or larger than the class count.
    #[error("Label {label} is outside 1..={num_classes}")]
    LabelOutOfRange {
        /// The offending label.
        label: u32,
        /// Number of classes.
        num_classes: usize,
    },

    /// A class without samples cannot be fitted.
    #[error("Class with label {label} has no samples")]
    EmptyClass {
        /// Label of the empty class.
        label: u32,
    },

    /// Inference input has the wrong number of features.
    #[error("Model expects {expected} features, got {got}")]
    FeatureCountMismatch {
        /// Features the model was fitted on.
        expected: usize,
        /// Features supplied.
        got: usize,
    },
}

/// Errors from feature extraction, sampling and prediction.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// An extractor, classifier or buffer does not fit the data.
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// An annotation reaches outside its raw data.
    #[error("Annotation region {annotation} exceeds bounds of raw data {bounds}")]
    AnnotationOutOfBounds {
        /// Bounding region of the annotation.
        annotation: Region,
        /// Interval of the raw data.
        bounds: Region,
    },

    /// Arguments that can never work.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The data source failed.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Region arithmetic failed.
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    /// The model failed to fit or infer.
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// Serialization of a task, classifier or output failed.
    #[error("Encoding error: {0}")]
    Encoding(String),
}

impl EngineError {
    /// Check if this is an extractor/source or annotation/source incompatibility.
    pub fn is_shape_mismatch(&self) -> bool {
        matches!(
            self,
            EngineError::ShapeMismatch(_) | EngineError::AnnotationOutOfBounds { .. }
        )
    }

    /// Check if a caller-side retry could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::Source(err) if err.is_transient())
    }
}

/// Kind of a tile failure, mirroring the engine's error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// [`EngineError::ShapeMismatch`] or [`EngineError::AnnotationOutOfBounds`].
    ShapeMismatch,
    /// [`SourceError::NotFound`].
    SourceNotFound,
    /// A transient [`SourceError::Io`].
    SourceTransient,
    /// A permanent [`SourceError::Io`].
    SourceFatal,
    /// [`EngineError::Model`].
    Model,
    /// Everything else.
    Invalid,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::ShapeMismatch => "shape mismatch",
            FailureKind::SourceNotFound => "source not found",
            FailureKind::SourceTransient => "transient source failure",
            FailureKind::SourceFatal => "fatal source failure",
            FailureKind::Model => "model failure",
            FailureKind::Invalid => "invalid input",
        };
        f.write_str(name)
    }
}

/// Serializable form of an [`EngineError`], used when a tile's outcome crosses
/// a process or network boundary.
///
/// Only `kind` and `message` travel. A failure raised in this process also
/// keeps the typed error as `cause`.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct TileFailure {
    /// Error category.
    pub kind: FailureKind,
    /// Rendered error.
    pub message: String,
    /// The original error, when raised in this process.
    #[serde(skip)]
    #[source]
    pub cause: Option<EngineError>,
}

impl TileFailure {
    /// A failure without a typed cause, as received from another process.
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            cause: None,
        }
    }

    /// The typed error, if the tile failed in this process.
    pub fn cause(&self) -> Option<&EngineError> {
        self.cause.as_ref()
    }
}

impl From<EngineError> for TileFailure {
    fn from(error: EngineError) -> Self {
        let kind = match &error {
            EngineError::ShapeMismatch(_) | EngineError::AnnotationOutOfBounds { .. } => {
                FailureKind::ShapeMismatch
            }
            EngineError::Source(SourceError::NotFound { .. }) => FailureKind::SourceNotFound,
            EngineError::Source(SourceError::Io { transient: true, .. }) => {
                FailureKind::SourceTransient
            }
            EngineError::Source(SourceError::Io { .. }) => FailureKind::SourceFatal,
            EngineError::Model(_) => FailureKind::Model,
            EngineError::InvalidInput(_) | EngineError::Geometry(_) | EngineError::Encoding(_) => {
                FailureKind::Invalid
            }
        };
        Self {
            kind,
            message: error.to_string(),
            cause: Some(error),
        }
    }
}

/// Errors from orchestrating a tiled run.
///
/// A run either produces a fully merged output or exactly one of these.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RunError {
    /// Rejected before any tile was computed.
    #[error("Task cannot run over {region}: {error}")]
    InvalidTask {
        /// The requested region.
        region: Region,
        /// Why the task cannot run.
        error: EngineError,
    },

    /// The first tile to fail.
    #[error("Tile {region} failed: {failure}")]
    TileFailed {
        /// The failing tile.
        region: Region,
        /// Its failure.
        failure: TileFailure,
    },

    /// A worker died or answered with garbage.
    #[error("Worker {worker} crashed: {message}")]
    WorkerCrash {
        /// Worker name.
        worker: String,
        /// What went wrong.
        message: String,
    },

    /// The run was cancelled through its progress tracker.
    #[error("Run cancelled")]
    Cancelled,

    /// Messages between coordinator and workers could not be exchanged.
    #[error("Transport error: {0}")]
    Transport(String),
}

impl RunError {
    /// Build a tile failure from an engine error.
    pub fn tile_failed(region: Region, error: EngineError) -> Self {
        RunError::TileFailed {
            region,
            failure: TileFailure::from(error),
        }
    }

    /// Get the region of the failing tile, if known.
    pub fn region(&self) -> Option<Region> {
        match self {
            RunError::InvalidTask { region, .. } | RunError::TileFailed { region, .. } => {
                Some(*region)
            }
            _ => None,
        }
    }
}

/// Errors loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Failed to read config from {path}: {source}")]
    Read {
        /// Path of the file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Malformed TOML.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration could not be rendered.
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Well-formed but out of range.
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Result type alias for Tilewise operations.
pub type TilewiseResult<T> = Result<T, TilewiseError>;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Result type alias for orchestrated runs.
pub type RunResult<T> = Result<T, RunError>;
