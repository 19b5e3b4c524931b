#![allow(dead_code)]

use serde::{Deserialize, Serialize};
use tilewise::prelude::*;

/// A 1-channel volume of the given spatial shape filled with `f(z, y, x)`.
pub fn volume(z: i64, y: i64, x: i64, f: impl Fn(i64, i64, i64) -> f32) -> Block {
    let region = Region::from_shape(Shape5::spatial(z, y, x)).unwrap();
    let mut data = Vec::with_capacity(region.volume());
    for zz in 0..z {
        for yy in 0..y {
            for xx in 0..x {
                data.push(f(zz, yy, xx));
            }
        }
    }
    Block::new(region, data).unwrap()
}

/// Deterministic pseudo-random texture in `[0, 1)`.
pub fn texture(z: i64, y: i64, x: i64) -> f32 {
    let h = (z * 73_856_093) ^ (y * 19_349_663) ^ (x * 83_492_791);
    (h.rem_euclid(1000)) as f32 / 1000.0
}

pub fn feature_task(block: Block, tile: Shape5, filters: &[&str]) -> FeatureTask<ArrayDataSource> {
    let source = ArrayDataSource::new(block, tile);
    FeatureTask::new(source, FeatureExtractorCollection::parse(filters.iter().copied()).unwrap())
}

pub fn worker_binary() -> WorkerLauncher {
    WorkerLauncher::subprocess(env!("CARGO_BIN_EXE_tilewise"), ["worker"])
}

/// Wraps a feature task and misbehaves on tiles containing `trigger`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaultyTask {
    pub inner: FeatureTask<ArrayDataSource>,
    pub trigger: Point5,
    pub panic: bool,
}

impl TileTask for FaultyTask {
    fn name(&self) -> &str {
        "faulty"
    }

    fn preferred_tile_shape(&self) -> Shape5 {
        self.inner.preferred_tile_shape()
    }

    fn output_region(&self, tile: &Region) -> Region {
        self.inner.output_region(tile)
    }

    fn validate(&self, region: &Region) -> EngineResult<()> {
        self.inner.validate(region)
    }

    fn compute_tile(&self, tile: &Region) -> EngineResult<Block> {
        if tile.contains_point(&self.trigger) {
            if self.panic {
                panic!("worker blew up on {}", tile);
            }
            return Err(EngineError::Source(SourceError::Io {
                region: *tile,
                message: "disk on fire".to_string(),
                transient: false,
            }));
        }
        self.inner.compute_tile(tile)
    }
}
