//! Channel-wise Gaussian-family filters.
//!
//! A [`ChannelwiseFilter`] computes every channel and every time point of its
//! input independently, and optionally every slice along `axis_2d`. Each such
//! sub-problem is enlarged by the halo, clamped to the source bounds, run
//! through the kernel and cropped back, so results do not depend on how a
//! region was tiled.

use crate::core::block::{Block, BlockBuf};
use crate::core::error::{EngineError, EngineResult};
use crate::core::geometry::{Axis, Point5, Region, Shape5};
use crate::core::source::DataSource;
use crate::execution::operator::Operator;
use crate::features::extractor::{check_output, ensure_kernel_fits, FeatureExtractor};
use crate::features::kernels::{self, kernel_radius};
use log::trace;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Window size of the presmoothing pass.
pub const PRESMOOTH_WINDOW_SIZE: f32 = 3.5;

/// The closed set of supported filters and their parameters.
///
/// A `window_size` of 0 selects the default of 3 sigmas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name")]
pub enum FilterKind {
    /// Gaussian blur.
    GaussianSmoothing {
        /// Standard deviation.
        sigma: f32,
        /// Kernel half-width in sigmas.
        #[serde(default)]
        window_size: f32,
    },
    /// Magnitude of the Gaussian gradient.
    GaussianGradientMagnitude {
        /// Standard deviation.
        sigma: f32,
        /// Kernel half-width in sigmas.
        #[serde(default)]
        window_size: f32,
    },
    /// Sum of second Gaussian derivatives.
    LaplacianOfGaussian {
        /// Standard deviation.
        scale: f32,
        /// Kernel half-width in sigmas.
        #[serde(default)]
        window_size: f32,
    },
    /// Smoothing at `sigma0` minus smoothing at `sigma1`.
    DifferenceOfGaussians {
        /// Standard deviation of the first smoothing.
        sigma0: f32,
        /// Standard deviation of the subtracted smoothing.
        sigma1: f32,
        /// Kernel half-width in sigmas.
        #[serde(default)]
        window_size: f32,
    },
    /// Eigenvalues of the Hessian, largest first.
    HessianOfGaussianEigenvalues {
        /// Standard deviation.
        scale: f32,
        /// Kernel half-width in sigmas.
        #[serde(default)]
        window_size: f32,
    },
    /// Eigenvalues of the structure tensor, largest first.
    StructureTensorEigenvalues {
        /// Scale of the gradient.
        inner_scale: f32,
        /// Scale of the tensor smoothing.
        outer_scale: f32,
        /// Kernel half-width in sigmas.
        #[serde(default)]
        window_size: f32,
    },
}

impl FilterKind {
    /// Names accepted by [`FilterKind::from_ilp_scale`].
    pub const NAMES: [&'static str; 6] = [
        "GaussianSmoothing",
        "GaussianGradientMagnitude",
        "LaplacianOfGaussian",
        "DifferenceOfGaussians",
        "HessianOfGaussianEigenvalues",
        "StructureTensorEigenvalues",
    ];

    /// The filter's name.
    pub fn name(&self) -> &'static str {
        match self {
            FilterKind::GaussianSmoothing { .. } => Self::NAMES[0],
            FilterKind::GaussianGradientMagnitude { .. } => Self::NAMES[1],
            FilterKind::LaplacianOfGaussian { .. } => Self::NAMES[2],
            FilterKind::DifferenceOfGaussians { .. } => Self::NAMES[3],
            FilterKind::HessianOfGaussianEigenvalues { .. } => Self::NAMES[4],
            FilterKind::StructureTensorEigenvalues { .. } => Self::NAMES[5],
        }
    }

    /// Build the filter named `name` with every scale derived from `capped_scale`.
    pub fn from_ilp_scale(name: &str, capped_scale: f32) -> EngineResult<FilterKind> {
        let s = capped_scale;
        let kind = match name {
            "GaussianSmoothing" => FilterKind::GaussianSmoothing { sigma: s, window_size: 0.0 },
            "GaussianGradientMagnitude" => FilterKind::GaussianGradientMagnitude { sigma: s, window_size: 0.0 },
            "LaplacianOfGaussian" => FilterKind::LaplacianOfGaussian { scale: s, window_size: 0.0 },
            "DifferenceOfGaussians" => FilterKind::DifferenceOfGaussians {
                sigma0: s,
                sigma1: s * 0.66,
                window_size: 0.0,
            },
            "HessianOfGaussianEigenvalues" => FilterKind::HessianOfGaussianEigenvalues { scale: s, window_size: 0.0 },
            "StructureTensorEigenvalues" => FilterKind::StructureTensorEigenvalues {
                inner_scale: s,
                outer_scale: 0.5 * s,
                window_size: 0.0,
            },
            other => {
                return Err(EngineError::InvalidInput(format!(
                    "unknown filter '{}', expected one of {}",
                    other,
                    Self::NAMES.join(", ")
                )))
            }
        };
        Ok(kind)
    }

    /// The scale the filter was parameterized with.
    pub fn primary_scale(&self) -> f32 {
        match *self {
            FilterKind::GaussianSmoothing { sigma, .. } | FilterKind::GaussianGradientMagnitude { sigma, .. } => sigma,
            FilterKind::LaplacianOfGaussian { scale, .. } | FilterKind::HessianOfGaussianEigenvalues { scale, .. } => {
                scale
            }
            FilterKind::DifferenceOfGaussians { sigma0, .. } => sigma0,
            FilterKind::StructureTensorEigenvalues { inner_scale, .. } => inner_scale,
        }
    }

    /// Kernel radius in pixels along each active spatial axis.
    pub fn radius(&self) -> usize {
        match *self {
            FilterKind::GaussianSmoothing { sigma, window_size }
            | FilterKind::GaussianGradientMagnitude { sigma, window_size } => kernel_radius(sigma, window_size),
            FilterKind::LaplacianOfGaussian { scale, window_size }
            | FilterKind::HessianOfGaussianEigenvalues { scale, window_size } => kernel_radius(scale, window_size),
            FilterKind::DifferenceOfGaussians {
                sigma0,
                sigma1,
                window_size,
            } => kernel_radius(sigma0, window_size).max(kernel_radius(sigma1, window_size)),
            FilterKind::StructureTensorEigenvalues {
                inner_scale,
                outer_scale,
                window_size,
            } => kernel_radius(inner_scale, window_size) + kernel_radius(outer_scale, window_size),
        }
    }

    /// Output channels per input channel for an `ndim`-dimensional input.
    pub fn channels(&self, ndim: usize) -> usize {
        match self {
            FilterKind::HessianOfGaussianEigenvalues { .. } | FilterKind::StructureTensorEigenvalues { .. } => ndim,
            _ => 1,
        }
    }

    /// Run the kernel on a C-ordered array. Returns the channel-last result
    /// and its channel count.
    pub fn apply(&self, data: &[f32], dims: &[usize]) -> (Vec<f32>, usize) {
        let result = match *self {
            FilterKind::GaussianSmoothing { sigma, window_size } => {
                kernels::gaussian_smoothing(data, dims, sigma, window_size)
            }
            FilterKind::GaussianGradientMagnitude { sigma, window_size } => {
                kernels::gaussian_gradient_magnitude(data, dims, sigma, window_size)
            }
            FilterKind::LaplacianOfGaussian { scale, window_size } => {
                kernels::laplacian_of_gaussian(data, dims, scale, window_size)
            }
            FilterKind::DifferenceOfGaussians {
                sigma0,
                sigma1,
                window_size,
            } => kernels::difference_of_gaussians(data, dims, sigma0, sigma1, window_size),
            FilterKind::HessianOfGaussianEigenvalues { scale, window_size } => {
                kernels::hessian_of_gaussian_eigenvalues(data, dims, scale, window_size)
            }
            FilterKind::StructureTensorEigenvalues {
                inner_scale,
                outer_scale,
                window_size,
            } => kernels::structure_tensor_eigenvalues(data, dims, inner_scale, outer_scale, window_size),
        };
        let channels = if data.is_empty() { 1 } else { result.len() / data.len() };
        (result, channels)
    }
}

/// Presmoothing sigma for a filter at ilastik scale `scale`.
///
/// Above 1 the presmoothing combines with the unit-scale kernel to reach
/// `scale`. At or below 1 the input is presmoothed with `scale` itself.
pub fn calc_presmooth_sigma(scale: f32) -> f32 {
    if scale > 1.0 {
        (scale * scale - 1.0).sqrt()
    } else {
        scale
    }
}

/// A filter applied independently per channel, per time point and
/// optionally per slice along `axis_2d`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelwiseFilter {
    filter: FilterKind,
    #[serde(default)]
    axis_2d: Option<Axis>,
    #[serde(default)]
    presmooth_sigma: f32,
    #[serde(default)]
    num_input_channels: Option<i64>,
}

impl ChannelwiseFilter {
    /// A filter over all three spatial axes, without presmoothing.
    pub fn new(filter: FilterKind) -> Self {
        Self {
            filter,
            axis_2d: None,
            presmooth_sigma: 0.0,
            num_input_channels: None,
        }
    }

    /// Gaussian smoothing at `sigma`.
    pub fn gaussian_smoothing(sigma: f32) -> Self {
        Self::new(FilterKind::GaussianSmoothing { sigma, window_size: 0.0 })
    }

    /// Gradient magnitude at `sigma`.
    pub fn gaussian_gradient_magnitude(sigma: f32) -> Self {
        Self::new(FilterKind::GaussianGradientMagnitude { sigma, window_size: 0.0 })
    }

    /// Laplacian of Gaussian at `scale`.
    pub fn laplacian_of_gaussian(scale: f32) -> Self {
        Self::new(FilterKind::LaplacianOfGaussian { scale, window_size: 0.0 })
    }

    /// Smoothing at `sigma0` minus smoothing at `sigma1`.
    pub fn difference_of_gaussians(sigma0: f32, sigma1: f32) -> Self {
        Self::new(FilterKind::DifferenceOfGaussians {
            sigma0,
            sigma1,
            window_size: 0.0,
        })
    }

    /// Hessian eigenvalues at `scale`, one channel per spatial axis.
    pub fn hessian_of_gaussian_eigenvalues(scale: f32) -> Self {
        Self::new(FilterKind::HessianOfGaussianEigenvalues { scale, window_size: 0.0 })
    }

    /// Structure tensor eigenvalues, one channel per spatial axis.
    pub fn structure_tensor_eigenvalues(inner_scale: f32, outer_scale: f32) -> Self {
        Self::new(FilterKind::StructureTensorEigenvalues {
            inner_scale,
            outer_scale,
            window_size: 0.0,
        })
    }

    /// Build the named filter at an ilastik-style scale: the kernel scale is
    /// capped at 1 and larger scales are reached through presmoothing.
    pub fn from_ilp_scale(name: &str, scale: f32, axis_2d: Option<Axis>) -> EngineResult<Self> {
        let filter = FilterKind::from_ilp_scale(name, scale.min(1.0))?;
        let mut result = Self::new(filter).with_presmooth_sigma(calc_presmooth_sigma(scale));
        if let Some(axis) = axis_2d {
            result = result.with_axis_2d(axis)?;
        }
        Ok(result)
    }

    /// Compute in 2D slices orthogonal to `axis`, which must be spatial.
    pub fn with_axis_2d(mut self, axis: Axis) -> EngineResult<Self> {
        if !axis.is_spatial() {
            return Err(EngineError::InvalidInput(format!(
                "axis_2d must be one of z, y, x; got '{}'",
                axis
            )));
        }
        self.axis_2d = Some(axis);
        Ok(self)
    }

    /// Smooth the input with this sigma before filtering.
    pub fn with_presmooth_sigma(mut self, sigma: f32) -> Self {
        self.presmooth_sigma = sigma.max(0.0);
        self
    }

    /// Only apply to sources with exactly `channels` channels.
    pub fn with_num_input_channels(mut self, channels: i64) -> Self {
        self.num_input_channels = Some(channels);
        self
    }

    /// The underlying filter.
    pub fn filter(&self) -> &FilterKind {
        &self.filter
    }

    /// Slicing axis, if computed in 2D.
    pub fn axis_2d(&self) -> Option<Axis> {
        self.axis_2d
    }

    /// Sigma of the presmoothing pass, 0 when disabled.
    pub fn presmooth_sigma(&self) -> f32 {
        self.presmooth_sigma
    }

    /// Required channel count of the source, if restricted.
    pub fn num_input_channels(&self) -> Option<i64> {
        self.num_input_channels
    }

    /// The scale this filter corresponds to in ilastik terms.
    pub fn ilp_scale(&self) -> f32 {
        let capped = self.filter.primary_scale();
        if capped < 1.0 {
            return capped;
        }
        if self.presmooth_sigma == 1.0 {
            return 1.0;
        }
        let scale = (self.presmooth_sigma * self.presmooth_sigma + 1.0).sqrt();
        (scale * 100.0).round() / 100.0
    }

    /// Axes the kernel sees.
    pub fn spatial_axes(&self) -> Vec<Axis> {
        Axis::SPATIAL
            .iter()
            .copied()
            .filter(|axis| Some(*axis) != self.axis_2d)
            .collect()
    }

    /// The Gaussian smoothing run ahead of the kernel, if any. Filters with
    /// equal presmoothers read identical presmoothed data.
    pub fn presmoother(&self) -> Option<ChannelwiseFilter> {
        if self.presmooth_sigma <= 0.0 {
            return None;
        }
        Some(ChannelwiseFilter {
            filter: FilterKind::GaussianSmoothing {
                sigma: self.presmooth_sigma,
                window_size: PRESMOOTH_WINDOW_SIZE,
            },
            axis_2d: self.axis_2d,
            presmooth_sigma: 0.0,
            num_input_channels: None,
        })
    }

    fn total_radius(&self) -> i64 {
        let presmooth = if self.presmooth_sigma > 0.0 {
            kernel_radius(self.presmooth_sigma, PRESMOOTH_WINDOW_SIZE)
        } else {
            0
        };
        (self.filter.radius() + presmooth) as i64
    }

    /// Like [`FeatureExtractor::compute_into`], but presmoothed input is read
    /// through `presmoothed` when given. It must compute what
    /// [`presmoother`](Self::presmoother) computes.
    pub(crate) fn compute_into_with(
        &self,
        source: &dyn DataSource,
        input: &Region,
        out: &mut BlockBuf,
        presmoothed: Option<&dyn Operator>,
    ) -> EngineResult<()> {
        check_output(&self.expected_region(input), out)?;
        let bounds = source.interval();
        if !bounds.contains(input) {
            return Err(EngineError::InvalidInput(format!(
                "region {} exceeds data source bounds {}",
                input, bounds
            )));
        }

        let mut step = input.shape().with(Axis::T, 1).with(Axis::C, 1);
        if let Some(axis) = self.axis_2d {
            step = step.with(axis, 1);
        }
        // Sub-region start relative to the input, so output channels begin at 0.
        let channel_origin = Point5::zero().with(Axis::C, input.start().c);
        for slice in input.split(step) {
            let channel_index = (slice.start() - channel_origin).c;
            trace!("{}: computing {} (channel {})", self, slice, channel_index);
            out.set(&self.compute_slice(source, &slice, channel_index, presmoothed)?);
        }
        Ok(())
    }

    /// Compute one channel of one time point (and one slice, in 2D mode).
    fn compute_slice(
        &self,
        source: &dyn DataSource,
        slice: &Region,
        channel_index: i64,
        presmoothed: Option<&dyn Operator>,
    ) -> EngineResult<Block> {
        let haloed = slice.enlarged(self.halo()).clamped(&source.interval());
        let source_data = match (self.presmoother(), presmoothed) {
            (Some(_), Some(shared)) => shared.compute(source, &haloed)?,
            (Some(presmoother), None) => presmoother.compute_features(source, &haloed)?,
            (None, _) => source.retrieve(&haloed)?,
        };

        let axes = self.spatial_axes();
        let dims: Vec<usize> = axes.iter().map(|&axis| haloed.len(axis) as usize).collect();
        let raw = source_data.raw_axes(&axes)?;
        let (features, channels) = self.filter.apply(&raw, &dims);

        let multiplier = self.channel_multiplier();
        if channels as i64 != multiplier {
            return Err(EngineError::ShapeMismatch(format!(
                "{} produced {} channels, expected {}",
                self.filter.name(),
                channels,
                multiplier
            )));
        }

        let mut output_axes = axes;
        output_axes.push(Axis::C);
        let feature_region = haloed.with_channels(channel_index * multiplier, multiplier);
        let feature_block = Block::from_axes(feature_region, &output_axes, features)?;
        feature_block.cut(&slice.with_channels(channel_index * multiplier, multiplier))
    }
}

impl FeatureExtractor for ChannelwiseFilter {
    fn kernel_shape(&self) -> Shape5 {
        let size = 2 * self.total_radius() + 1;
        let mut shape = Shape5::new(1, size, size, size, 1);
        if let Some(axis) = self.axis_2d {
            shape = shape.with(axis, 1);
        }
        shape
    }

    fn channel_multiplier(&self) -> i64 {
        self.filter.channels(self.spatial_axes().len()) as i64
    }

    fn ensure_applicable(&self, source: &dyn DataSource) -> EngineResult<()> {
        ensure_kernel_fits(self.kernel_shape(), source)?;
        match self.num_input_channels {
            Some(expected) if expected != source.num_channels() => Err(EngineError::ShapeMismatch(format!(
                "{} expects {} input channels, data source has {}",
                self,
                expected,
                source.num_channels()
            ))),
            _ => Ok(()),
        }
    }

    fn compute_into(&self, source: &dyn DataSource, input: &Region, out: &mut BlockBuf) -> EngineResult<()> {
        self.compute_into_with(source, input, out, None)
    }
}

impl Operator for ChannelwiseFilter {
    fn compute(&self, source: &dyn DataSource, region: &Region) -> EngineResult<Block> {
        self.compute_features(source, region)
    }
}

impl fmt::Display for ChannelwiseFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}", self.filter.name(), self.ilp_scale())?;
        if let Some(axis) = self.axis_2d {
            write!(f, ", axis_2d=\"{}\"", axis)?;
        }
        write!(f, ")")
    }
}

impl FromStr for ChannelwiseFilter {
    type Err = EngineError;

    /// Parse `Name(scale)` or `Name(scale, axis_2d="z")`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || EngineError::InvalidInput(format!("cannot parse filter '{}'", s));
        let (name, rest) = s.trim().split_once('(').ok_or_else(invalid)?;
        let args = rest.strip_suffix(')').ok_or_else(invalid)?;
        let mut parts = args.split(',').map(str::trim);

        let scale: f32 = parts
            .next()
            .and_then(|part| part.parse().ok())
            .ok_or_else(invalid)?;

        let mut axis_2d = None;
        for part in parts {
            let (key, value) = part.split_once('=').ok_or_else(invalid)?;
            if key.trim() != "axis_2d" {
                return Err(invalid());
            }
            let value = value.trim().trim_matches('"');
            axis_2d = Some(value.parse::<Axis>()?);
        }

        Self::from_ilp_scale(name.trim(), scale, axis_2d)
    }
}
