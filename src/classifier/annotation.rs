//! Colored brush-stroke annotations and feature sampling under them.

use crate::core::block::{Block, BlockBuf, FeatureMatrix};
use crate::core::error::{EngineError, EngineResult};
use crate::core::geometry::{Axis, Point5, Region};
use crate::core::source::DataSource;
use crate::features::FeatureExtractor;
use log::debug;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

// ============================================================================
// Color
// ============================================================================

/// An RGBA label color. The optional name does not take part in comparisons.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Color {
    /// Red.
    pub r: u8,
    /// Green.
    pub g: u8,
    /// Blue.
    pub b: u8,
    /// Alpha.
    pub a: u8,
    /// Display name, ignored by comparisons.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Color {
    /// An opaque, unnamed color.
    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::rgba(r, g, b, 255)
    }

    /// A color with explicit alpha.
    pub fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self {
            r,
            g,
            b,
            a,
            name: None,
        }
    }

    /// Attach a display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Packed `0xRRGGBBAA` value; the sort key for color maps.
    pub fn q_rgba(&self) -> u32 {
        u32::from(self.r) << 24 | u32::from(self.g) << 16 | u32::from(self.b) << 8 | u32::from(self.a)
    }

    /// Hex form, `#rrggbbaa`.
    pub fn hex_code(&self) -> String {
        format!("#{:08x}", self.q_rgba())
    }
}

impl PartialEq for Color {
    fn eq(&self, other: &Self) -> bool {
        self.q_rgba() == other.q_rgba()
    }
}

impl Eq for Color {}

impl Hash for Color {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.q_rgba().hash(state);
    }
}

impl PartialOrd for Color {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Color {
    fn cmp(&self, other: &Self) -> Ordering {
        self.q_rgba().cmp(&other.q_rgba())
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({})", name, self.hex_code()),
            None => f.write_str(&self.hex_code()),
        }
    }
}

// ============================================================================
// Annotation
// ============================================================================

/// A boolean mask over raw data, painted with one color.
///
/// The mask has a single channel at index 0 and lies inside the raw data's
/// bounds. Annotations are immutable once built.
#[derive(Debug, Clone)]
pub struct Annotation {
    mask: Block,
    color: Color,
    raw_data: Arc<dyn DataSource>,
}

impl Annotation {
    /// Build an annotation from a mask. Non-zero mask values count as set.
    pub fn new(mask: Block, color: Color, raw_data: Arc<dyn DataSource>) -> EngineResult<Self> {
        if mask.region().len(Axis::C) != 1 {
            return Err(EngineError::ShapeMismatch(format!(
                "annotation mask {} must have exactly one channel",
                mask.region()
            )));
        }
        let region = mask.region().with_channels(0, 1);
        let bounds = raw_data.interval();
        if !bounds.contains(&region) {
            return Err(EngineError::AnnotationOutOfBounds {
                annotation: region,
                bounds,
            });
        }
        let values = mask
            .data()
            .iter()
            .map(|&value| if value != 0.0 { 1.0 } else { 0.0 })
            .collect();
        Ok(Self {
            mask: Block::new(region, values)?,
            color,
            raw_data,
        })
    }

    /// Build an annotation from a polyline of voxels. Consecutive voxels are
    /// joined by straight lines; channel coordinates are ignored.
    pub fn from_voxels(voxels: &[Point5], color: Color, raw_data: Arc<dyn DataSource>) -> EngineResult<Self> {
        let first = voxels
            .first()
            .ok_or_else(|| EngineError::InvalidInput("an annotation needs at least one voxel".to_string()))?;

        let mut path: Vec<Point5> = vec![first.with(Axis::C, 0)];
        for pair in voxels.windows(2) {
            let from = pair[0].with(Axis::C, 0);
            let to = pair[1].with(Axis::C, 0);
            path.extend(from.line_to(to).into_iter().skip(1));
        }

        let start = path.iter().copied().fold(path[0], Point5::min);
        let stop = path.iter().copied().fold(path[0], Point5::max) + Point5::splat(1);
        let region = Region::new(start, stop)?;

        let mut canvas = BlockBuf::allocate(region, 0.0);
        for voxel in &path {
            let point = Region::new(*voxel, *voxel + Point5::splat(1))?;
            canvas.set(&Block::filled(point, 1.0));
        }
        Self::new(canvas.freeze(), color, raw_data)
    }

    /// Region of the mask, with channel extent `[0, 1)`.
    pub fn region(&self) -> &Region {
        self.mask.region()
    }

    /// Non-zero where a voxel is annotated.
    pub fn mask(&self) -> &Block {
        &self.mask
    }

    /// The class this annotation labels.
    pub fn color(&self) -> &Color {
        &self.color
    }

    /// The data features are sampled from.
    pub fn raw_data(&self) -> &Arc<dyn DataSource> {
        &self.raw_data
    }

    /// Number of annotated voxels.
    pub fn voxel_count(&self) -> usize {
        self.mask.data().iter().filter(|&&value| value != 0.0).count()
    }

    /// Feature vectors of `extractor` at every annotated voxel.
    ///
    /// Features are computed over whole native tiles of the raw data, so the
    /// samples match what a tiled prediction run sees. Rows are ordered by
    /// tile, then by position inside the tile.
    pub fn feature_samples(&self, extractor: &dyn FeatureExtractor) -> EngineResult<FeatureMatrix> {
        let raw = self.raw_data.as_ref();
        extractor.ensure_applicable(raw)?;

        let bounds = raw.interval();
        let annotated = self
            .region()
            .with_channels(bounds.start().c, bounds.len(Axis::C))
            .clamped(&bounds);
        let tiles: Vec<Region> = bounds
            .tiles_aligned(raw.tile_shape().with(Axis::C, 0))
            .into_iter()
            .filter(|tile| tile.intersects(&annotated))
            .collect();
        debug!(
            "Sampling {} voxels of {} over {} tiles",
            self.voxel_count(),
            self.color,
            tiles.len()
        );

        let samples = tiles
            .par_iter()
            .map(|tile| self.sample_tile(extractor, tile, &annotated))
            .collect::<EngineResult<Vec<FeatureMatrix>>>()?;

        let cols = (bounds.len(Axis::C) * extractor.channel_multiplier()) as usize;
        FeatureMatrix::concat(cols, samples)
    }

    fn sample_tile(&self, extractor: &dyn FeatureExtractor, tile: &Region, annotated: &Region) -> EngineResult<FeatureMatrix> {
        let features = extractor.compute_features(self.raw_data.as_ref(), tile)?;
        let overlap = tile.clamped(annotated);
        let feature_crop = features.cut(&overlap.with_channels(0, features.region().len(Axis::C)))?;
        let mask_crop = self.mask.cut(&overlap.with_channels(0, 1))?;
        feature_crop.sample_channels(&mask_crop)
    }
}

impl PartialEq for Annotation {
    fn eq(&self, other: &Self) -> bool {
        self.color == other.color && self.mask == other.mask && self.raw_data.id() == other.raw_data.id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geometry::Shape5;
    use crate::core::source::ArrayDataSource;
    use crate::features::ChannelwiseFilter;

    fn raw(shape: Shape5, tile: Shape5) -> Arc<dyn DataSource> {
        let region = Region::from_shape(shape).unwrap();
        let data = (0..region.volume()).map(|i| i as f32).collect();
        Arc::new(ArrayDataSource::new(Block::new(region, data).unwrap(), tile))
    }

    #[test]
    fn test_color_identity_ignores_name() {
        let a = Color::rgb(255, 0, 0).with_name("foreground");
        let b = Color::rgb(255, 0, 0);
        assert_eq!(a, b);
        assert_eq!(a.q_rgba(), 0xff0000ff);
        assert!(Color::rgb(0, 255, 0) < Color::rgb(255, 0, 0));
        assert_eq!(a.to_string(), "foreground (#ff0000ff)");
    }

    #[test]
    fn test_out_of_bounds_rejected() {
        let raw = raw(Shape5::spatial(1, 8, 8), Shape5::spatial(1, 8, 8));
        let region = Region::new(Point5::new(0, 0, 6, 6, 0), Point5::new(1, 1, 10, 10, 1)).unwrap();
        let err = Annotation::new(Block::filled(region, 1.0), Color::rgb(1, 2, 3), raw).unwrap_err();
        assert!(matches!(err, EngineError::AnnotationOutOfBounds { .. }));
        assert!(err.is_shape_mismatch());
    }

    #[test]
    fn test_from_voxels_draws_lines() {
        let raw = raw(Shape5::spatial(1, 10, 10), Shape5::spatial(1, 10, 10));
        let voxels = [Point5::new(0, 0, 1, 1, 0), Point5::new(0, 0, 1, 5, 0), Point5::new(0, 0, 4, 5, 0)];
        let annotation = Annotation::from_voxels(&voxels, Color::rgb(0, 0, 255), raw).unwrap();
        assert_eq!(annotation.region().extent(Axis::Y), (1, 5));
        assert_eq!(annotation.region().extent(Axis::X), (1, 6));
        // 5 voxels along x plus 3 more along y
        assert_eq!(annotation.voxel_count(), 8);
        assert_eq!(annotation.mask().get(&Point5::new(0, 0, 3, 5, 0)), Some(1.0));
        assert_eq!(annotation.mask().get(&Point5::new(0, 0, 3, 1, 0)), Some(0.0));
    }

    #[test]
    fn test_samples_span_tiles() {
        let raw = raw(Shape5::spatial(1, 12, 12), Shape5::spatial(1, 4, 4));
        let voxels = [Point5::new(0, 0, 2, 2, 0), Point5::new(0, 0, 2, 9, 0)];
        let annotation = Annotation::from_voxels(&voxels, Color::rgb(9, 9, 9), raw.clone()).unwrap();
        let extractor = ChannelwiseFilter::gaussian_smoothing(0.3).with_axis_2d(Axis::Z).unwrap();

        let samples = annotation.feature_samples(&extractor).unwrap();
        assert_eq!(samples.rows(), 8);
        assert_eq!(samples.cols(), 1);

        // Each sample equals the feature computed over the voxel's native tile.
        let tile = Region::new(Point5::new(0, 0, 0, 8, 0), Point5::new(1, 1, 4, 12, 1)).unwrap();
        let features = extractor.compute_features(raw.as_ref(), &tile).unwrap();
        let expected = features.get(&Point5::new(0, 0, 2, 9, 0)).unwrap();
        assert_eq!(samples.row(7)[0].to_bits(), expected.to_bits());
    }

    #[test]
    fn test_samples_require_applicable_extractor() {
        let raw = raw(Shape5::spatial(1, 5, 5), Shape5::spatial(1, 5, 5));
        let annotation = Annotation::from_voxels(&[Point5::new(0, 0, 2, 2, 0)], Color::rgb(1, 1, 1), raw).unwrap();
        let extractor = ChannelwiseFilter::gaussian_smoothing(1.0).with_axis_2d(Axis::Z).unwrap();
        assert!(annotation.feature_samples(&extractor).unwrap_err().is_shape_mismatch());
    }
}
