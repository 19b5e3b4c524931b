//! The shared result buffer of a run.
//!
//! Workers merge finished tiles with [`OutputBuffer::set`] through a shared
//! reference. Values are stored as `f32` bit patterns in atomics, so disjoint
//! tiles can be written concurrently without a lock.

use crate::core::block::{for_each_run, Block};
use crate::core::error::{EngineError, EngineResult};
use crate::core::geometry::Region;
use std::sync::atomic::{AtomicU32, Ordering};

/// A pre-allocated output over a full region.
#[derive(Debug)]
pub struct OutputBuffer {
    region: Region,
    cells: Vec<AtomicU32>,
}

impl OutputBuffer {
    /// Allocate a buffer over `region` holding `fill`.
    pub fn allocate(region: Region, fill: f32) -> Self {
        let bits = fill.to_bits();
        Self {
            region,
            cells: (0..region.volume()).map(|_| AtomicU32::new(bits)).collect(),
        }
    }

    /// Region the buffer covers.
    pub fn region(&self) -> &Region {
        &self.region
    }

    /// Copy `tile` into its sub-region. The tile must lie inside the buffer.
    pub fn set(&self, tile: &Block) -> EngineResult<()> {
        if !self.region.contains(tile.region()) {
            return Err(EngineError::ShapeMismatch(format!(
                "tile {} lies outside output {}",
                tile.region(),
                self.region
            )));
        }
        let values = tile.data();
        for_each_run(tile.region(), &self.region, tile.region(), |src, dst, run| {
            for (cell, value) in self.cells[dst..dst + run].iter().zip(&values[src..src + run]) {
                cell.store(value.to_bits(), Ordering::Relaxed);
            }
        });
        Ok(())
    }

    /// Copy the current contents out.
    pub fn snapshot(&self) -> Block {
        let data = self
            .cells
            .iter()
            .map(|cell| f32::from_bits(cell.load(Ordering::Relaxed)))
            .collect();
        Block::from_parts(self.region, data)
    }

    /// Finish the run and hand out the result.
    pub fn into_block(self) -> Block {
        let data = self
            .cells
            .into_iter()
            .map(|cell| f32::from_bits(cell.into_inner()))
            .collect();
        Block::from_parts(self.region, data)
    }
}
