//! The feature extractor contract.

use crate::core::block::{Block, BlockBuf};
use crate::core::error::{EngineError, EngineResult};
use crate::core::geometry::{Axis, Point5, Region, Shape5};
use crate::core::source::DataSource;
use std::fmt;

/// A reproducible recipe for computing feature channels over a region.
///
/// Output regions keep every non-channel axis of the input and span channels
/// `[0, input_channels * channel_multiplier)`.
pub trait FeatureExtractor: Send + Sync + fmt::Debug {
    /// Extent of the neighbourhood one output voxel depends on.
    fn kernel_shape(&self) -> Shape5;

    /// Margin needed around a region to compute it exactly.
    fn halo(&self) -> Point5 {
        self.kernel_shape().halo()
    }

    /// Output channels per input channel.
    fn channel_multiplier(&self) -> i64;

    /// Region of the output produced for `input`.
    fn expected_region(&self, input: &Region) -> Region {
        input.with_channels(0, input.len(Axis::C) * self.channel_multiplier())
    }

    /// Fail with [`EngineError::ShapeMismatch`] when the extractor cannot be
    /// applied to `source`.
    fn ensure_applicable(&self, source: &dyn DataSource) -> EngineResult<()> {
        ensure_kernel_fits(self.kernel_shape(), source)
    }

    /// Check if the extractor can be applied to `source`.
    fn is_applicable_to(&self, source: &dyn DataSource) -> bool {
        self.ensure_applicable(source).is_ok()
    }

    /// Fill `out`, which must cover exactly `expected_region(input)`.
    fn compute_into(&self, source: &dyn DataSource, input: &Region, out: &mut BlockBuf) -> EngineResult<()>;

    /// Allocate, fill and freeze the features for `input`.
    fn compute_features(&self, source: &dyn DataSource, input: &Region) -> EngineResult<Block> {
        self.ensure_applicable(source)?;
        let mut out = BlockBuf::allocate(self.expected_region(input), 0.0);
        self.compute_into(source, input, &mut out)?;
        Ok(out.freeze())
    }
}

/// Reject sources smaller than `kernel` on any axis.
pub fn ensure_kernel_fits(kernel: Shape5, source: &dyn DataSource) -> EngineResult<()> {
    let shape = source.shape();
    if shape >= kernel {
        Ok(())
    } else {
        Err(EngineError::ShapeMismatch(format!(
            "kernel of shape ({}) does not fit data source of shape ({})",
            kernel, shape
        )))
    }
}

/// Reject an output buffer that does not match the expected region.
pub(crate) fn check_output(expected: &Region, out: &BlockBuf) -> EngineResult<()> {
    if out.region() != expected {
        return Err(EngineError::ShapeMismatch(format!(
            "output buffer covers {} but {} was expected",
            out.region(),
            expected
        )));
    }
    Ok(())
}
