//! Points, shapes and regions over the five labeled axes.
//!
//! Every dataset in Tilewise is addressed on the axes `t`, `z`, `y`, `x`, `c`
//! (time, three spatial axes, channel). A [`Region`] is an axis-aligned
//! half-open box `[start, stop)` on all five axes; it is the unit of tiling,
//! caching and merging.
//!
//! # Example
//!
//! ```
//! use tilewise::core::geometry::{Point5, Region, Shape5};
//!
//! let image = Region::new(Point5::zero(), Point5::new(1, 1, 100, 100, 3)).unwrap();
//! let tiles = image.split(Shape5::new(1, 1, 32, 32, 0));
//! assert_eq!(tiles.len(), 16);
//! ```

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;
use thiserror::Error;

/// Canonical axis order, slowest to fastest.
pub const AXIS_LABELS: &str = "tzyxc";

/// Errors from constructing geometric values.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeometryError {
    /// `stop` is below `start` on some axis.
    #[error("Region stop {stop} is below start {start}")]
    InvertedRegion {
        /// Inclusive start.
        start: Point5,
        /// Exclusive stop.
        stop: Point5,
    },

    /// A region shape with a negative extent.
    #[error("Shape {0} has negative extents")]
    NegativeShape(Shape5),

    /// Not one of `tzyxc`.
    #[error("Unknown axis label '{0}'")]
    UnknownAxis(char),

    /// An axis order names the same axis twice.
    #[error("Axis '{axis}' appears more than once in \"{axes}\"")]
    DuplicateAxis {
        /// The repeated axis.
        axis: char,
        /// The whole axis order.
        axes: String,
    },
}

/// One of the five dataset axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    /// Time.
    T,
    /// Depth.
    Z,
    /// Rows.
    Y,
    /// Columns.
    X,
    /// Channels.
    C,
}

impl Axis {
    /// All axes in canonical order.
    pub const ALL: [Axis; 5] = [Axis::T, Axis::Z, Axis::Y, Axis::X, Axis::C];

    /// The spatial axes in canonical order.
    pub const SPATIAL: [Axis; 3] = [Axis::Z, Axis::Y, Axis::X];

    /// Position of this axis in the canonical `tzyxc` order.
    pub fn index(self) -> usize {
        match self {
            Axis::T => 0,
            Axis::Z => 1,
            Axis::Y => 2,
            Axis::X => 3,
            Axis::C => 4,
        }
    }

    /// Single-letter label.
    pub fn label(self) -> char {
        match self {
            Axis::T => 't',
            Axis::Z => 'z',
            Axis::Y => 'y',
            Axis::X => 'x',
            Axis::C => 'c',
        }
    }

    /// Look up an axis by its label.
    pub fn from_label(label: char) -> Option<Axis> {
        match label {
            't' => Some(Axis::T),
            'z' => Some(Axis::Z),
            'y' => Some(Axis::Y),
            'x' => Some(Axis::X),
            'c' => Some(Axis::C),
            _ => None,
        }
    }

    /// Check if this is one of `z`, `y`, `x`.
    pub fn is_spatial(self) -> bool {
        matches!(self, Axis::Z | Axis::Y | Axis::X)
    }

    /// Parse an axis-order string such as `"yxc"` into distinct axes.
    pub fn parse_order(axes: &str) -> Result<Vec<Axis>, GeometryError> {
        let mut parsed: Vec<Axis> = Vec::with_capacity(axes.len());
        for label in axes.chars() {
            let axis = Axis::from_label(label).ok_or(GeometryError::UnknownAxis(label))?;
            if parsed.contains(&axis) {
                return Err(GeometryError::DuplicateAxis {
                    axis: label,
                    axes: axes.to_string(),
                });
            }
            parsed.push(axis);
        }
        Ok(parsed)
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for Axis {
    type Err = GeometryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(label), None) => Axis::from_label(label).ok_or(GeometryError::UnknownAxis(label)),
            (Some(label), Some(_)) => Err(GeometryError::UnknownAxis(label)),
            (None, _) => Err(GeometryError::UnknownAxis(' ')),
        }
    }
}

// ============================================================================
// Point5
// ============================================================================

/// An integer coordinate on all five axes.
///
/// Ordering is component-wise: `a <= b` holds only when it holds on every axis,
/// so two points can be incomparable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Point5 {
    /// Time.
    pub t: i64,
    /// Depth.
    pub z: i64,
    /// Row.
    pub y: i64,
    /// Column.
    pub x: i64,
    /// Channel.
    pub c: i64,
}

impl Point5 {
    /// Create a point from its components.
    pub const fn new(t: i64, z: i64, y: i64, x: i64, c: i64) -> Self {
        Self { t, z, y, x, c }
    }

    /// The origin.
    pub const fn zero() -> Self {
        Self::new(0, 0, 0, 0, 0)
    }

    /// A point with every component set to `value`.
    pub const fn splat(value: i64) -> Self {
        Self::new(value, value, value, value, value)
    }

    /// Build a point from components in canonical order.
    pub const fn from_array(values: [i64; 5]) -> Self {
        Self::new(values[0], values[1], values[2], values[3], values[4])
    }

    /// Components in canonical order.
    pub const fn to_array(self) -> [i64; 5] {
        [self.t, self.z, self.y, self.x, self.c]
    }

    /// Component on `axis`.
    pub fn get(&self, axis: Axis) -> i64 {
        self.to_array()[axis.index()]
    }

    /// Copy of this point with `axis` replaced.
    pub fn with(self, axis: Axis, value: i64) -> Self {
        let mut values = self.to_array();
        values[axis.index()] = value;
        Self::from_array(values)
    }

    fn zip_with(self, other: Self, f: impl Fn(i64, i64) -> i64) -> Self {
        let a = self.to_array();
        let b = other.to_array();
        Self::from_array([
            f(a[0], b[0]),
            f(a[1], b[1]),
            f(a[2], b[2]),
            f(a[3], b[3]),
            f(a[4], b[4]),
        ])
    }

    /// Component-wise minimum.
    pub fn min(self, other: Self) -> Self {
        self.zip_with(other, i64::min)
    }

    /// Component-wise maximum.
    pub fn max(self, other: Self) -> Self {
        self.zip_with(other, i64::max)
    }

    /// Points on the straight line from `self` to `target`, both ends included.
    ///
    /// Each step advances the dominant axis by one; the other axes are rounded.
    pub fn line_to(self, target: Point5) -> Vec<Point5> {
        let delta = (target - self).to_array();
        let steps = delta.iter().map(|d| d.abs()).max().unwrap_or(0);
        if steps == 0 {
            return vec![self];
        }
        let origin = self.to_array();
        (0..=steps)
            .map(|step| {
                let mut coords = [0i64; 5];
                for (axis, coord) in coords.iter_mut().enumerate() {
                    let offset = (delta[axis] as f64 * step as f64 / steps as f64).round() as i64;
                    *coord = origin[axis] + offset;
                }
                Point5::from_array(coords)
            })
            .collect()
    }
}

impl Add for Point5 {
    type Output = Point5;

    fn add(self, rhs: Self) -> Self::Output {
        self.zip_with(rhs, |a, b| a + b)
    }
}

impl Sub for Point5 {
    type Output = Point5;

    fn sub(self, rhs: Self) -> Self::Output {
        self.zip_with(rhs, |a, b| a - b)
    }
}

fn componentwise_cmp(a: [i64; 5], b: [i64; 5]) -> Option<Ordering> {
    let mut ordering = Ordering::Equal;
    for (lhs, rhs) in a.iter().zip(b.iter()) {
        match (ordering, lhs.cmp(rhs)) {
            (_, Ordering::Equal) => {}
            (Ordering::Equal, next) => ordering = next,
            (current, next) if current == next => {}
            _ => return None,
        }
    }
    Some(ordering)
}

impl PartialOrd for Point5 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        componentwise_cmp(self.to_array(), other.to_array())
    }
}

impl fmt::Display for Point5 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(t={}, z={}, y={}, x={}, c={})",
            self.t, self.z, self.y, self.x, self.c
        )
    }
}

// ============================================================================
// Shape5
// ============================================================================

/// Extents on all five axes.
///
/// Shapes derived from regions are never negative. Tile shapes are allowed to
/// carry non-positive extents, meaning "the whole axis".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Shape5 {
    /// Time points.
    pub t: i64,
    /// Depth.
    pub z: i64,
    /// Rows.
    pub y: i64,
    /// Columns.
    pub x: i64,
    /// Channels.
    pub c: i64,
}

impl Shape5 {
    /// Create a shape from its extents.
    pub const fn new(t: i64, z: i64, y: i64, x: i64, c: i64) -> Self {
        Self { t, z, y, x, c }
    }

    /// A single-timepoint, single-channel shape.
    pub const fn spatial(z: i64, y: i64, x: i64) -> Self {
        Self::new(1, z, y, x, 1)
    }

    /// A shape with extent 1 on every axis.
    pub const fn unit() -> Self {
        Self::new(1, 1, 1, 1, 1)
    }

    /// Build a shape from extents in canonical order.
    pub const fn from_array(values: [i64; 5]) -> Self {
        Self::new(values[0], values[1], values[2], values[3], values[4])
    }

    /// Extents in canonical order.
    pub const fn to_array(self) -> [i64; 5] {
        [self.t, self.z, self.y, self.x, self.c]
    }

    /// Extent on `axis`.
    pub fn get(&self, axis: Axis) -> i64 {
        self.to_array()[axis.index()]
    }

    /// Copy of this shape with `axis` replaced.
    pub fn with(self, axis: Axis, value: i64) -> Self {
        let mut values = self.to_array();
        values[axis.index()] = value;
        Self::from_array(values)
    }

    /// Check that no extent is negative.
    pub fn validate(&self) -> Result<(), GeometryError> {
        if self.to_array().iter().any(|&extent| extent < 0) {
            return Err(GeometryError::NegativeShape(*self));
        }
        Ok(())
    }

    /// Number of elements; zero when any extent is non-positive.
    pub fn volume(&self) -> usize {
        self.to_array()
            .iter()
            .map(|&extent| extent.max(0) as usize)
            .product()
    }

    /// Half of each extent, rounded down. For an odd kernel `2r + 1` this is `r`.
    pub fn halo(&self) -> Point5 {
        let values = self.to_array();
        Point5::from_array(values.map(|extent| extent.max(0) / 2))
    }

    /// The same extents as a point.
    pub fn to_point(self) -> Point5 {
        Point5::from_array(self.to_array())
    }
}

impl PartialOrd for Shape5 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        componentwise_cmp(self.to_array(), other.to_array())
    }
}

impl fmt::Display for Shape5 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "t:{} z:{} y:{} x:{} c:{}",
            self.t, self.z, self.y, self.x, self.c
        )
    }
}

// ============================================================================
// Region
// ============================================================================

/// A half-open axis-aligned box `[start, stop)` on all five axes.
///
/// `start <= stop` holds component-wise for every constructed region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RegionRepr")]
pub struct Region {
    start: Point5,
    stop: Point5,
}

#[derive(Deserialize)]
struct RegionRepr {
    start: Point5,
    stop: Point5,
}

impl TryFrom<RegionRepr> for Region {
    type Error = GeometryError;

    fn try_from(repr: RegionRepr) -> Result<Self, Self::Error> {
        Region::new(repr.start, repr.stop)
    }
}

impl Region {
    /// Create a region, rejecting `stop < start` on any axis.
    pub fn new(start: Point5, stop: Point5) -> Result<Self, GeometryError> {
        if (0..5).any(|axis| stop.to_array()[axis] < start.to_array()[axis]) {
            return Err(GeometryError::InvertedRegion { start, stop });
        }
        Ok(Self { start, stop })
    }

    /// A region anchored at `start` with the given shape.
    pub fn at(start: Point5, shape: Shape5) -> Result<Self, GeometryError> {
        shape.validate()?;
        Ok(Self {
            start,
            stop: start + shape.to_point(),
        })
    }

    /// A region anchored at the origin.
    pub fn from_shape(shape: Shape5) -> Result<Self, GeometryError> {
        Self::at(Point5::zero(), shape)
    }

    /// Smallest region covering every region in `regions`.
    pub fn enclosing<'a>(regions: impl IntoIterator<Item = &'a Region>) -> Option<Region> {
        regions.into_iter().fold(None, |acc, region| {
            Some(match acc {
                None => *region,
                Some(acc) => Region {
                    start: acc.start.min(region.start),
                    stop: acc.stop.max(region.stop),
                },
            })
        })
    }

    /// Inclusive lower corner.
    pub fn start(&self) -> Point5 {
        self.start
    }

    /// Exclusive upper corner.
    pub fn stop(&self) -> Point5 {
        self.stop
    }

    /// Extents of the region.
    pub fn shape(&self) -> Shape5 {
        let extent = self.stop - self.start;
        Shape5::from_array(extent.to_array())
    }

    /// `(start, stop)` on one axis.
    pub fn extent(&self, axis: Axis) -> (i64, i64) {
        (self.start.get(axis), self.stop.get(axis))
    }

    /// Length along one axis.
    pub fn len(&self, axis: Axis) -> i64 {
        self.stop.get(axis) - self.start.get(axis)
    }

    /// Number of points.
    pub fn volume(&self) -> usize {
        self.shape().volume()
    }

    /// Check if the region holds no points.
    pub fn is_empty(&self) -> bool {
        self.volume() == 0
    }

    /// Copy of the region with one axis replaced by `[start, stop)`.
    pub fn with_axis(&self, axis: Axis, start: i64, stop: i64) -> Result<Region, GeometryError> {
        Region::new(self.start.with(axis, start), self.stop.with(axis, stop))
    }

    /// Copy of the region spanning channels `[start, start + count)`.
    pub fn with_channels(&self, start: i64, count: i64) -> Region {
        Region {
            start: self.start.with(Axis::C, start),
            stop: self.stop.with(Axis::C, start + count.max(0)),
        }
    }

    /// The region moved by `offset`.
    pub fn translated(&self, offset: Point5) -> Region {
        Region {
            start: self.start + offset,
            stop: self.stop + offset,
        }
    }

    /// The region grown by `margin` on both sides of every axis.
    pub fn enlarged(&self, margin: Point5) -> Region {
        let start = self.start - margin;
        let stop = (self.stop + margin).max(start);
        Region { start, stop }
    }

    /// The part of this region inside `bounds`.
    ///
    /// Disjoint regions produce an empty region positioned at the clamped start.
    pub fn clamped(&self, bounds: &Region) -> Region {
        let start = self.start.max(bounds.start).min(bounds.stop);
        let stop = self.stop.min(bounds.stop).max(start);
        Region { start, stop }
    }

    /// The overlap of two regions, or `None` when they share no point.
    pub fn intersection(&self, other: &Region) -> Option<Region> {
        let overlap = self.clamped(other);
        if overlap.is_empty() || !self.intersects(other) {
            None
        } else {
            Some(overlap)
        }
    }

    /// Check if `other` lies entirely inside this region.
    pub fn contains(&self, other: &Region) -> bool {
        self.start <= other.start && other.stop <= self.stop
    }

    /// Check if a point lies inside this region.
    pub fn contains_point(&self, point: &Point5) -> bool {
        self.start <= *point && (0..5).all(|axis| point.to_array()[axis] < self.stop.to_array()[axis])
    }

    /// Check if two regions share at least one point.
    pub fn intersects(&self, other: &Region) -> bool {
        let (a0, a1) = (self.start.to_array(), self.stop.to_array());
        let (b0, b1) = (other.start.to_array(), other.stop.to_array());
        (0..5).all(|axis| a0[axis] < b1[axis] && b0[axis] < a1[axis])
    }

    /// Partition into tiles of at most `tile_shape`, anchored at `start`.
    ///
    /// Tiles are emitted with `t` slowest and `c` fastest. The last tile on each
    /// axis is clamped to `stop`. Non-positive extents in `tile_shape` mean the
    /// whole axis. An empty region yields no tiles.
    pub fn split(&self, tile_shape: Shape5) -> Vec<Region> {
        self.tiles(tile_shape, false)
    }

    /// Tiles of the global grid with pitch `tile_shape` that overlap this region,
    /// each clamped to the region.
    pub fn tiles_aligned(&self, tile_shape: Shape5) -> Vec<Region> {
        self.tiles(tile_shape, true)
    }

    fn tiles(&self, tile_shape: Shape5, aligned: bool) -> Vec<Region> {
        let starts = self.start.to_array();
        let stops = self.stop.to_array();
        let steps = tile_shape.to_array();
        let segments: Vec<Vec<(i64, i64)>> = (0..5)
            .map(|axis| axis_segments(starts[axis], stops[axis], steps[axis], aligned))
            .collect();
        if segments.iter().any(Vec::is_empty) {
            return Vec::new();
        }

        let count: usize = segments.iter().map(Vec::len).product();
        let mut tiles = Vec::with_capacity(count);
        for &(t0, t1) in &segments[0] {
            for &(z0, z1) in &segments[1] {
                for &(y0, y1) in &segments[2] {
                    for &(x0, x1) in &segments[3] {
                        for &(c0, c1) in &segments[4] {
                            tiles.push(Region {
                                start: Point5::new(t0, z0, y0, x0, c0),
                                stop: Point5::new(t1, z1, y1, x1, c1),
                            });
                        }
                    }
                }
            }
        }
        tiles
    }
}

fn axis_segments(start: i64, stop: i64, step: i64, aligned: bool) -> Vec<(i64, i64)> {
    if stop <= start {
        return Vec::new();
    }
    if step <= 0 {
        return vec![(start, stop)];
    }
    let mut segments = Vec::new();
    let mut lower = start;
    while lower < stop {
        let upper = if aligned {
            (lower.div_euclid(step) + 1) * step
        } else {
            lower + step
        };
        let upper = upper.min(stop);
        segments.push((lower, upper));
        lower = upper;
    }
    segments
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, axis) in Axis::ALL.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            let (lo, hi) = self.extent(*axis);
            write!(f, "{} {}..{}", axis, lo, hi)?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(height: i64, width: i64) -> Region {
        Region::from_shape(Shape5::new(1, 1, height, width, 1)).unwrap()
    }

    #[test]
    fn test_region_rejects_inverted_bounds() {
        let result = Region::new(Point5::new(0, 0, 5, 0, 0), Point5::new(1, 1, 4, 4, 1));
        assert!(matches!(result, Err(GeometryError::InvertedRegion { .. })));
    }

    #[test]
    fn test_point_partial_order_is_componentwise() {
        let a = Point5::new(0, 0, 1, 2, 0);
        let b = Point5::new(0, 0, 2, 3, 0);
        let c = Point5::new(0, 0, 3, 1, 0);
        assert!(a <= b);
        assert!(a < b);
        assert_eq!(b.partial_cmp(&c), None);
        assert!(!(b <= c) && !(c <= b));
    }

    #[test]
    fn test_split_clamps_last_tile() {
        let tiles = image(100, 70).split(Shape5::new(1, 1, 32, 32, 1));
        assert_eq!(tiles.len(), 4 * 3);
        let last = tiles.last().unwrap();
        assert_eq!(last.extent(Axis::Y), (96, 100));
        assert_eq!(last.extent(Axis::X), (64, 70));
        let covered: usize = tiles.iter().map(Region::volume).sum();
        assert_eq!(covered, 100 * 70);
    }

    #[test]
    fn test_split_whole_axis_for_nonpositive_extents() {
        let region = Region::from_shape(Shape5::new(2, 1, 10, 10, 3)).unwrap();
        let tiles = region.split(Shape5::new(1, 0, 5, -1, 0));
        assert_eq!(tiles.len(), 2 * 2);
        assert!(tiles.iter().all(|tile| tile.len(Axis::C) == 3 && tile.len(Axis::X) == 10));
    }

    #[test]
    fn test_split_empty_region() {
        let region = Region::from_shape(Shape5::new(1, 1, 0, 10, 1)).unwrap();
        assert!(region.split(Shape5::unit()).is_empty());
    }

    #[test]
    fn test_tiles_aligned_follow_global_grid() {
        let region = Region::new(Point5::new(0, 0, 10, 30, 0), Point5::new(1, 1, 40, 50, 1)).unwrap();
        let tiles = region.tiles_aligned(Shape5::new(1, 1, 32, 32, 1));
        let ys: Vec<_> = tiles.iter().map(|tile| tile.extent(Axis::Y)).collect();
        let xs: Vec<_> = tiles.iter().map(|tile| tile.extent(Axis::X)).collect();
        assert_eq!(ys, vec![(10, 32), (10, 32), (32, 40), (32, 40)]);
        assert_eq!(xs, vec![(30, 32), (32, 50), (30, 32), (32, 50)]);
    }

    #[test]
    fn test_enlarge_then_clamp() {
        let bounds = image(64, 64);
        let tile = Region::new(Point5::new(0, 0, 0, 32, 0), Point5::new(1, 1, 32, 64, 1)).unwrap();
        let haloed = tile.enlarged(Point5::new(0, 0, 3, 3, 0)).clamped(&bounds);
        assert_eq!(haloed.extent(Axis::Y), (0, 35));
        assert_eq!(haloed.extent(Axis::X), (29, 64));
        assert!(bounds.contains(&haloed));
        assert!(haloed.contains(&tile));
    }

    #[test]
    fn test_clamp_disjoint_is_empty() {
        let a = image(10, 10);
        let b = a.translated(Point5::new(0, 0, 20, 0, 0));
        assert!(a.clamped(&b).is_empty());
        assert!(!a.intersects(&b));
        assert_eq!(a.intersection(&b), None);
    }

    #[test]
    fn test_intersection_and_enclosing() {
        let a = image(10, 10);
        let b = a.translated(Point5::new(0, 0, 5, 5, 0));
        let overlap = a.intersection(&b).unwrap();
        assert_eq!(overlap.shape(), Shape5::new(1, 1, 5, 5, 1));
        let hull = Region::enclosing([&a, &b]).unwrap();
        assert_eq!(hull.shape(), Shape5::new(1, 1, 15, 15, 1));
    }

    #[test]
    fn test_line_to_includes_endpoints() {
        let line = Point5::new(0, 0, 0, 0, 0).line_to(Point5::new(0, 0, 2, 4, 0));
        assert_eq!(line.len(), 5);
        assert_eq!(line[0], Point5::zero());
        assert_eq!(line[4], Point5::new(0, 0, 2, 4, 0));
        assert_eq!(line[2], Point5::new(0, 0, 1, 2, 0));
    }

    #[test]
    fn test_parse_axis_order() {
        assert_eq!(Axis::parse_order("yxc").unwrap(), vec![Axis::Y, Axis::X, Axis::C]);
        assert!(matches!(Axis::parse_order("yxy"), Err(GeometryError::DuplicateAxis { .. })));
        assert!(matches!(Axis::parse_order("yq"), Err(GeometryError::UnknownAxis('q'))));
        assert_eq!("z".parse::<Axis>().unwrap(), Axis::Z);
    }

    #[test]
    fn test_region_deserialize_validates() {
        let json = r#"{"start":{"t":0,"z":0,"y":4,"x":0,"c":0},"stop":{"t":1,"z":1,"y":2,"x":1,"c":1}}"#;
        assert!(serde_json::from_str::<Region>(json).is_err());
        let region = image(3, 4);
        let restored: Region = serde_json::from_str(&serde_json::to_string(&region).unwrap()).unwrap();
        assert_eq!(region, restored);
    }
}
