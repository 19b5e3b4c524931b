//! Core types for the Tilewise engine.
//!
//! This module contains the foundational pieces everything else builds on:
//! - Geometry (points, shapes, regions, tiling)
//! - Blocks (dense arrays bound to regions)
//! - The data source seam
//! - Configuration
//! - Error types

pub mod block;
pub mod config;
pub mod error;
pub mod geometry;
pub mod source;

// Re-export commonly used types
pub use block::{Block, BlockBuf, FeatureMatrix};
pub use config::{BackendKind, EngineConfig, TileShapeConfig};
pub use error::{
    ConfigError, EngineError, EngineResult, ModelError, RunError, RunResult, SourceError,
    TileFailure, TilewiseError, TilewiseResult,
};
pub use geometry::{Axis, GeometryError, Point5, Region, Shape5};
pub use source::{ArrayDataSource, DataSource, SourceId};
