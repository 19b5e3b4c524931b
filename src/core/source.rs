//! The storage seam.
//!
//! Anything that can hand out a [`Block`] for a [`Region`] is a
//! [`DataSource`]. Sources are shared behind `Arc` between the sampler, the
//! operators and worker threads, so they must be `Send + Sync`.

use crate::core::block::Block;
use crate::core::error::SourceError;
use crate::core::geometry::{Region, Shape5};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Stable identity of a dataset, used in cache keys and to check that
/// annotations reference a single raw dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceId(pub Uuid);

impl SourceId {
    /// Generate a new unique identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SourceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// A dataset that can be read region by region.
pub trait DataSource: Send + Sync + fmt::Debug {
    /// Identity of the dataset.
    fn id(&self) -> SourceId;

    /// The full region the dataset covers.
    fn interval(&self) -> Region;

    /// Native tile shape of the underlying storage.
    fn tile_shape(&self) -> Shape5;

    /// Read `region`, which must lie inside [`DataSource::interval`].
    fn retrieve(&self, region: &Region) -> Result<Block, SourceError>;

    /// Shape of the full dataset.
    fn shape(&self) -> Shape5 {
        self.interval().shape()
    }

    /// Number of channels.
    fn num_channels(&self) -> i64 {
        self.shape().c
    }
}

/// An in-memory dataset. Serializable, so it can travel with a task to
/// isolated workers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayDataSource {
    id: SourceId,
    tile_shape: Shape5,
    data: Block,
}

impl ArrayDataSource {
    /// Wrap a block. Non-positive extents in `tile_shape` mean the whole axis.
    pub fn new(data: Block, tile_shape: Shape5) -> Self {
        let mut resolved = tile_shape.to_array();
        for (tile, whole) in resolved.iter_mut().zip(data.shape().to_array()) {
            if *tile <= 0 || *tile > whole {
                *tile = whole;
            }
        }
        Self {
            id: SourceId::new(),
            tile_shape: Shape5::from_array(resolved),
            data,
        }
    }

    /// The backing block.
    pub fn block(&self) -> &Block {
        &self.data
    }
}

impl DataSource for ArrayDataSource {
    fn id(&self) -> SourceId {
        self.id
    }

    fn interval(&self) -> Region {
        *self.data.region()
    }

    fn tile_shape(&self) -> Shape5 {
        self.tile_shape
    }

    fn retrieve(&self, region: &Region) -> Result<Block, SourceError> {
        if !self.data.region().contains(region) {
            return Err(SourceError::NotFound {
                region: *region,
                dataset: format!("array {} over {}", self.id, self.data.region()),
            });
        }
        self.data.cut(region).map_err(|err| SourceError::Io {
            region: *region,
            message: err.to_string(),
            transient: false,
        })
    }
}
