//! Dense typed arrays bound to a region.
//!
//! A [`Block`] stores `f32` values for every point of its region in canonical
//! `tzyxc` order (`c` fastest). Blocks are immutable and cheap to clone; the
//! mutable [`BlockBuf`] is used while a result is being assembled and is frozen
//! into a block once complete.

use crate::core::error::{EngineError, EngineResult};
use crate::core::geometry::{Axis, Point5, Region, Shape5};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Canonical strides for a region's shape.
fn strides(shape: Shape5) -> [usize; 5] {
    let e = shape.to_array().map(|extent| extent.max(0) as usize);
    [e[1] * e[2] * e[3] * e[4], e[2] * e[3] * e[4], e[3] * e[4], e[4], 1]
}

/// Strides of a C-ordered array laid out over `axes`, indexed by canonical
/// position. Axes not listed get stride zero.
fn axis_strides(shape: Shape5, axes: &[Axis]) -> [usize; 5] {
    let extents = shape.to_array();
    let mut result = [0usize; 5];
    let mut acc = 1usize;
    for axis in axes.iter().rev() {
        result[axis.index()] = acc;
        acc *= extents[axis.index()].max(0) as usize;
    }
    result
}

fn offset_of(region: &Region, strides: &[usize; 5], point: [i64; 5]) -> usize {
    let start = region.start().to_array();
    (0..5)
        .map(|axis| (point[axis] - start[axis]) as usize * strides[axis])
        .sum()
}

/// Visit every contiguous channel run of `window`, reporting the offset of the
/// run in a canonical array over `src` and in one over `dst`.
///
/// `window` must lie inside both regions.
pub(crate) fn for_each_run(
    src: &Region,
    dst: &Region,
    window: &Region,
    mut visit: impl FnMut(usize, usize, usize),
) {
    if window.is_empty() {
        return;
    }
    let src_strides = strides(src.shape());
    let dst_strides = strides(dst.shape());
    let run = window.len(Axis::C) as usize;
    let (lo, hi) = (window.start(), window.stop());
    for t in lo.t..hi.t {
        for z in lo.z..hi.z {
            for y in lo.y..hi.y {
                for x in lo.x..hi.x {
                    let point = [t, z, y, x, lo.c];
                    visit(
                        offset_of(src, &src_strides, point),
                        offset_of(dst, &dst_strides, point),
                        run,
                    );
                }
            }
        }
    }
}

/// Walk all points of a shape in canonical order, yielding the offset under
/// two stride sets.
fn for_each_pair(shape: Shape5, a: &[usize; 5], b: &[usize; 5], mut visit: impl FnMut(usize, usize)) {
    let e = shape.to_array().map(|extent| extent.max(0) as usize);
    for t in 0..e[0] {
        for z in 0..e[1] {
            for y in 0..e[2] {
                for x in 0..e[3] {
                    let base_a = t * a[0] + z * a[1] + y * a[2] + x * a[3];
                    let base_b = t * b[0] + z * b[1] + y * b[2] + x * b[3];
                    for c in 0..e[4] {
                        visit(base_a + c * a[4], base_b + c * b[4]);
                    }
                }
            }
        }
    }
}

/// Validate that `axes` can describe a region's layout: every axis with an
/// extent other than 1 must be listed.
fn check_layout(region: &Region, axes: &[Axis]) -> EngineResult<()> {
    for axis in Axis::ALL {
        if region.len(axis) != 1 && !axes.contains(&axis) {
            return Err(EngineError::ShapeMismatch(format!(
                "axis '{}' has extent {} in {} but is missing from layout",
                axis,
                region.len(axis),
                region
            )));
        }
    }
    Ok(())
}

/// An immutable dense array over a region.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "BlockRepr", into = "BlockRepr")]
pub struct Block {
    region: Region,
    data: Arc<[f32]>,
}

/// Wire form of a block. Values travel as IEEE bit patterns so every value,
/// including non-finite ones, survives a JSON round trip unchanged.
#[derive(Serialize, Deserialize)]
struct BlockRepr {
    region: Region,
    bits: Vec<u32>,
}

impl From<Block> for BlockRepr {
    fn from(block: Block) -> Self {
        Self {
            region: block.region,
            bits: block.data.iter().map(|value| value.to_bits()).collect(),
        }
    }
}

impl TryFrom<BlockRepr> for Block {
    type Error = EngineError;

    fn try_from(repr: BlockRepr) -> Result<Self, Self::Error> {
        Block::new(repr.region, repr.bits.into_iter().map(f32::from_bits).collect())
    }
}

impl Block {
    /// Wrap canonical-order data. The length must equal the region's volume.
    pub fn new(region: Region, data: Vec<f32>) -> EngineResult<Self> {
        if data.len() != region.volume() {
            return Err(EngineError::ShapeMismatch(format!(
                "{} values for region {} of volume {}",
                data.len(),
                region,
                region.volume()
            )));
        }
        Ok(Self {
            region,
            data: data.into(),
        })
    }

    /// Wrap data already known to match the region's volume.
    pub(crate) fn from_parts(region: Region, data: Vec<f32>) -> Self {
        debug_assert_eq!(data.len(), region.volume());
        Self {
            region,
            data: data.into(),
        }
    }

    /// A block holding `value` everywhere.
    pub fn filled(region: Region, value: f32) -> Self {
        Self {
            region,
            data: vec![value; region.volume()].into(),
        }
    }

    /// Build a block from a C-ordered array laid out over `axes`
    /// (for example `"yxc"`). Axes with extent 1 may be omitted.
    pub fn from_raw(region: Region, axes: &str, data: Vec<f32>) -> EngineResult<Self> {
        let order = Axis::parse_order(axes)?;
        Self::from_axes(region, &order, data)
    }

    /// Like [`Block::from_raw`] with pre-parsed axes.
    pub fn from_axes(region: Region, axes: &[Axis], data: Vec<f32>) -> EngineResult<Self> {
        check_layout(&region, axes)?;
        if data.len() != region.volume() {
            return Err(EngineError::ShapeMismatch(format!(
                "{} values for region {} of volume {}",
                data.len(),
                region,
                region.volume()
            )));
        }
        let shape = region.shape();
        let mut canonical = vec![0.0f32; data.len()];
        for_each_pair(
            shape,
            &strides(shape),
            &axis_strides(shape, axes),
            |dst, src| canonical[dst] = data[src],
        );
        Ok(Self {
            region,
            data: canonical.into(),
        })
    }

    /// Copy the values out as a C-ordered array laid out over `axes`.
    pub fn raw(&self, axes: &str) -> EngineResult<Vec<f32>> {
        let order = Axis::parse_order(axes)?;
        self.raw_axes(&order)
    }

    /// Like [`Block::raw`] with pre-parsed axes.
    pub fn raw_axes(&self, axes: &[Axis]) -> EngineResult<Vec<f32>> {
        check_layout(&self.region, axes)?;
        let shape = self.region.shape();
        let mut out = vec![0.0f32; self.data.len()];
        for_each_pair(
            shape,
            &strides(shape),
            &axis_strides(shape, axes),
            |src, dst| out[dst] = self.data[src],
        );
        Ok(out)
    }

    /// Region this block covers.
    pub fn region(&self) -> &Region {
        &self.region
    }

    /// Shape of the covered region.
    pub fn shape(&self) -> Shape5 {
        self.region.shape()
    }

    /// Values in canonical order.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Value at a global coordinate.
    pub fn get(&self, point: &Point5) -> Option<f32> {
        if !self.region.contains_point(point) {
            return None;
        }
        let offset = offset_of(&self.region, &strides(self.shape()), point.to_array());
        self.data.get(offset).copied()
    }

    /// Copy out the sub-block over `region`, which must lie inside this block.
    pub fn cut(&self, region: &Region) -> EngineResult<Block> {
        if !self.region.contains(region) {
            return Err(EngineError::ShapeMismatch(format!(
                "cannot cut {} out of {}",
                region, self.region
            )));
        }
        if region == &self.region {
            return Ok(self.clone());
        }
        let mut data = vec![0.0f32; region.volume()];
        for_each_run(&self.region, region, region, |src, dst, run| {
            data[dst..dst + run].copy_from_slice(&self.data[src..src + run]);
        });
        Ok(Self {
            region: *region,
            data: data.into(),
        })
    }

    /// The same values bound to a region moved by `offset`.
    pub fn translated(&self, offset: Point5) -> Block {
        Self {
            region: self.region.translated(offset),
            data: Arc::clone(&self.data),
        }
    }

    /// Stitch non-overlapping blocks that exactly tile their enclosing region.
    pub fn combine(blocks: &[Block]) -> EngineResult<Block> {
        let region = Region::enclosing(blocks.iter().map(Block::region))
            .ok_or_else(|| EngineError::InvalidInput("cannot combine zero blocks".to_string()))?;
        let covered: usize = blocks.iter().map(|block| block.region.volume()).sum();
        if covered != region.volume() {
            return Err(EngineError::ShapeMismatch(format!(
                "blocks cover {} points but their enclosing region {} has {}",
                covered,
                region,
                region.volume()
            )));
        }
        let mut buf = BlockBuf::allocate(region, 0.0);
        for block in blocks {
            buf.set(block);
        }
        Ok(buf.freeze())
    }

    /// Flatten to one row per non-channel point and one column per channel.
    pub fn to_matrix(&self) -> FeatureMatrix {
        let cols = self.region.len(Axis::C).max(0) as usize;
        let rows = if cols == 0 { 0 } else { self.data.len() / cols };
        FeatureMatrix {
            rows,
            cols,
            data: self.data.to_vec(),
        }
    }

    /// Collect the channel vectors of every point where `mask` is set.
    ///
    /// `mask` must have a single channel and cover the same non-channel extent
    /// as this block. A mask value counts as set when it is non-zero.
    pub fn sample_channels(&self, mask: &Block) -> EngineResult<FeatureMatrix> {
        let spatial = |region: &Region| {
            let shape = region.shape();
            (region.start().with(Axis::C, 0), shape.with(Axis::C, 1))
        };
        if mask.region.len(Axis::C) != 1 || spatial(&mask.region) != spatial(&self.region) {
            return Err(EngineError::ShapeMismatch(format!(
                "mask {} does not match feature block {}",
                mask.region, self.region
            )));
        }
        let cols = self.region.len(Axis::C) as usize;
        let mut data = Vec::new();
        let mut rows = 0;
        for (index, value) in mask.data.iter().enumerate() {
            if *value != 0.0 {
                data.extend_from_slice(&self.data[index * cols..(index + 1) * cols]);
                rows += 1;
            }
        }
        Ok(FeatureMatrix { rows, cols, data })
    }

    /// Check for equal regions and equal bit patterns.
    pub fn bit_identical(&self, other: &Block) -> bool {
        self.region == other.region
            && self.data.len() == other.data.len()
            && self
                .data
                .iter()
                .zip(other.data.iter())
                .all(|(a, b)| a.to_bits() == b.to_bits())
    }
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        self.region == other.region && self.data == other.data
    }
}

/// A mutable block under construction.
#[derive(Debug, Clone)]
pub struct BlockBuf {
    region: Region,
    data: Vec<f32>,
}

impl BlockBuf {
    /// Allocate a buffer over `region` filled with `fill`.
    pub fn allocate(region: Region, fill: f32) -> Self {
        Self {
            region,
            data: vec![fill; region.volume()],
        }
    }

    /// Region this buffer covers.
    pub fn region(&self) -> &Region {
        &self.region
    }

    /// Values in canonical order.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Paint the part of `block` that overlaps this buffer. Returns the
    /// number of points written.
    pub fn set(&mut self, block: &Block) -> usize {
        let Some(window) = self.region.intersection(&block.region) else {
            return 0;
        };
        let data = &mut self.data;
        for_each_run(&block.region, &self.region, &window, |src, dst, run| {
            data[dst..dst + run].copy_from_slice(&block.data[src..src + run]);
        });
        window.volume()
    }

    /// Finish construction.
    pub fn freeze(self) -> Block {
        Block {
            region: self.region,
            data: self.data.into(),
        }
    }
}

/// A row-major matrix of feature vectors, one row per sampled point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl FeatureMatrix {
    /// Wrap row-major data.
    pub fn new(rows: usize, cols: usize, data: Vec<f32>) -> EngineResult<Self> {
        if rows * cols != data.len() {
            return Err(EngineError::ShapeMismatch(format!(
                "{} values for a {}x{} matrix",
                data.len(),
                rows,
                cols
            )));
        }
        Ok(Self { rows, cols, data })
    }

    /// An empty matrix with a fixed column count.
    pub fn empty(cols: usize) -> Self {
        Self {
            rows: 0,
            cols,
            data: Vec::new(),
        }
    }

    /// Stack matrices vertically. All must share the column count `cols`.
    pub fn concat(cols: usize, parts: impl IntoIterator<Item = FeatureMatrix>) -> EngineResult<Self> {
        let mut result = Self::empty(cols);
        for part in parts {
            if part.cols != cols && part.rows > 0 {
                return Err(EngineError::ShapeMismatch(format!(
                    "cannot stack a matrix with {} columns onto one with {}",
                    part.cols, cols
                )));
            }
            result.rows += part.rows;
            result.data.extend(part.data);
        }
        Ok(result)
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Row-major values.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// One row.
    pub fn row(&self, index: usize) -> &[f32] {
        &self.data[index * self.cols..(index + 1) * self.cols]
    }

    /// Iterate over rows.
    pub fn iter_rows(&self) -> impl Iterator<Item = &[f32]> {
        // chunks_exact panics on zero; an empty-column matrix has no rows to yield.
        self.data.chunks_exact(self.cols.max(1)).take(self.rows)
    }
}
