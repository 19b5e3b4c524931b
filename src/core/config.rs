//! Engine configuration.
//!
//! Configuration is read from TOML:
//!
//! ```toml
//! [orchestrator]
//! backend = "distributed"
//! workers = 4
//!
//! [orchestrator.tile_shape]
//! y = 256
//! x = 256
//!
//! [cache]
//! capacity = 64
//!
//! [logging]
//! level = "debug"
//! ```
//!
//! Every section and key is optional.

use crate::core::error::ConfigError;
use crate::core::geometry::Shape5;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Default number of entries in an operator cache.
pub const DEFAULT_CACHE_CAPACITY: usize = 128;

/// Which worker backend runs the tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Threads in this process sharing memory.
    #[default]
    ThreadPool,
    /// Isolated worker processes exchanging serialized batches.
    ProcessPool,
    /// Rank-based workers exchanging serialized messages.
    Distributed,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendKind::ThreadPool => "thread-pool",
            BackendKind::ProcessPool => "process-pool",
            BackendKind::Distributed => "distributed",
        };
        f.write_str(name)
    }
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "thread-pool" => Ok(BackendKind::ThreadPool),
            "process-pool" => Ok(BackendKind::ProcessPool),
            "distributed" => Ok(BackendKind::Distributed),
            other => Err(ConfigError::Invalid(format!("unknown backend '{}'", other))),
        }
    }
}

/// Per-axis tile extents. Unset axes fall back to the task's preferred shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TileShapeConfig {
    /// Time points per tile.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub t: Option<i64>,
    /// Slices per tile.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z: Option<i64>,
    /// Rows per tile.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<i64>,
    /// Columns per tile.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<i64>,
}

impl TileShapeConfig {
    /// Override `preferred` with the configured extents. Channels stay whole.
    pub fn resolve(&self, preferred: Shape5) -> Shape5 {
        Shape5::new(
            self.t.unwrap_or(preferred.t),
            self.z.unwrap_or(preferred.z),
            self.y.unwrap_or(preferred.y),
            self.x.unwrap_or(preferred.x),
            0,
        )
    }

    fn is_empty(&self) -> bool {
        self.t.is_none() && self.z.is_none() && self.y.is_none() && self.x.is_none()
    }
}

/// The `[orchestrator]` section.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Where tiles run.
    pub backend: BackendKind,
    /// Number of workers (0 = available parallelism).
    pub workers: usize,
    /// Overrides the task's preferred tile shape.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tile_shape: Option<TileShapeConfig>,
}

/// The `[cache]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of memoized blocks.
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

/// The `[logging]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `env_logger` filter used when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// The `[orchestrator]` section.
    pub orchestrator: OrchestratorConfig,
    /// The `[cache]` section.
    pub cache: CacheConfig,
    /// The `[logging]` section.
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Render as TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Set the backend.
    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.orchestrator.backend = backend;
        self
    }

    /// Set the number of workers.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.orchestrator.workers = workers;
        self
    }

    /// Set the tile shape override.
    pub fn with_tile_shape(mut self, tile_shape: TileShapeConfig) -> Self {
        self.orchestrator.tile_shape = if tile_shape.is_empty() {
            None
        } else {
            Some(tile_shape)
        };
        self
    }

    /// Set the operator cache capacity.
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache.capacity = capacity;
        self
    }

    /// Set the log level.
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.logging.level = level.into();
        self
    }

    /// Number of workers to start, resolving 0 to the available parallelism.
    pub fn worker_count(&self) -> usize {
        resolve_workers(self.orchestrator.workers)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.capacity == 0 {
            return Err(ConfigError::Invalid("cache capacity must be at least 1".into()));
        }
        if let Some(tile_shape) = &self.orchestrator.tile_shape {
            let extents = [tile_shape.t, tile_shape.z, tile_shape.y, tile_shape.x];
            if extents.iter().flatten().any(|&extent| extent < 0) {
                return Err(ConfigError::Invalid(format!(
                    "tile extents must be non-negative, got {:?}",
                    tile_shape
                )));
            }
        }
        match self.logging.level.to_ascii_lowercase().as_str() {
            "off" | "error" | "warn" | "info" | "debug" | "trace" => Ok(()),
            other => Err(ConfigError::Invalid(format!("unknown log level '{}'", other))),
        }
    }
}

/// Resolve a worker count of 0 to the available parallelism.
pub fn resolve_workers(workers: usize) -> usize {
    if workers > 0 {
        workers
    } else {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::new();
        assert_eq!(config.orchestrator.backend, BackendKind::ThreadPool);
        assert_eq!(config.cache.capacity, DEFAULT_CACHE_CAPACITY);
        assert!(config.worker_count() >= 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[orchestrator]
backend = "process-pool"
workers = 3

[orchestrator.tile_shape]
y = 32
x = 16

[cache]
capacity = 8

[logging]
level = "debug"
"#
        )
        .unwrap();

        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.orchestrator.backend, BackendKind::ProcessPool);
        assert_eq!(config.worker_count(), 3);
        assert_eq!(config.cache.capacity, 8);
        assert_eq!(config.logging.level, "debug");

        let tile = config.orchestrator.tile_shape.unwrap();
        let resolved = tile.resolve(Shape5::new(1, 1, 64, 64, 3));
        assert_eq!(resolved, Shape5::new(1, 1, 32, 16, 0));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config = EngineConfig::from_toml_str("[orchestrator]\nbackend = \"distributed\"\n").unwrap();
        assert_eq!(config.orchestrator.backend, BackendKind::Distributed);
        assert_eq!(config.cache, CacheConfig::default());
        assert_eq!(config.orchestrator.tile_shape, None);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            EngineConfig::from_toml_str("[cache]\ncapacity = 0\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("[orchestrator]\nbackend = \"mpi\"\n"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("[logging]\nlevel = \"loud\"\n"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = EngineConfig::from_file(dir.path().join("absent.toml"));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = EngineConfig::new()
            .with_backend(BackendKind::Distributed)
            .with_workers(2)
            .with_tile_shape(TileShapeConfig {
                y: Some(16),
                ..Default::default()
            })
            .with_cache_capacity(4);
        let text = config.to_toml_string().unwrap();
        assert_eq!(EngineConfig::from_toml_str(&text).unwrap(), config);
    }
}
