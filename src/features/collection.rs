//! Ordered composition of channel-wise filters.

use crate::core::block::{Block, BlockBuf};
use crate::core::error::{EngineError, EngineResult};
use crate::core::geometry::{Axis, Point5, Region, Shape5};
use crate::core::source::DataSource;
use crate::execution::cache::SharedCache;
use crate::execution::operator::{CachedOperator, Operator};
use crate::features::extractor::{check_output, FeatureExtractor};
use crate::features::filter::ChannelwiseFilter;
use serde::{Deserialize, Serialize};

/// Several filters whose outputs are stacked along the channel axis, in order.
///
/// With [`with_cache`](Self::with_cache) every filter result, and every
/// presmoothed input, is memoized per region. Equal presmoothers share
/// entries. Clones share the memoized results; the serialized form does not
/// carry them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "Vec<ChannelwiseFilter>", into = "Vec<ChannelwiseFilter>")]
pub struct FeatureExtractorCollection {
    extractors: Vec<ChannelwiseFilter>,
    memoized: Option<Memoized>,
}

/// Cached views of a collection's members, index-aligned with `extractors`.
#[derive(Debug, Clone)]
struct Memoized {
    filters: Vec<CachedOperator<ChannelwiseFilter>>,
    presmoothers: Vec<Option<CachedOperator<ChannelwiseFilter>>>,
}

impl Memoized {
    fn new(extractors: &[ChannelwiseFilter], cache: &SharedCache) -> Self {
        let mut distinct: Vec<CachedOperator<ChannelwiseFilter>> = Vec::new();
        let presmoothers = extractors
            .iter()
            .map(|extractor| {
                let presmoother = extractor.presmoother()?;
                if let Some(shared) = distinct.iter().find(|cached| *cached.inner() == presmoother) {
                    return Some(shared.clone());
                }
                let cached = CachedOperator::new(presmoother, cache.clone());
                distinct.push(cached.clone());
                Some(cached)
            })
            .collect();
        Self {
            filters: extractors
                .iter()
                .map(|extractor| CachedOperator::new(extractor.clone(), cache.clone()))
                .collect(),
            presmoothers,
        }
    }
}

impl FeatureExtractorCollection {
    /// Create a collection; at least one extractor is required.
    pub fn new(extractors: Vec<ChannelwiseFilter>) -> EngineResult<Self> {
        if extractors.is_empty() {
            return Err(EngineError::InvalidInput(
                "a feature collection needs at least one extractor".to_string(),
            ));
        }
        Ok(Self {
            extractors,
            memoized: None,
        })
    }

    /// Memoize feature computations in `cache`, replacing any earlier cache.
    pub fn with_cache(mut self, cache: SharedCache) -> Self {
        self.memoized = Some(Memoized::new(&self.extractors, &cache));
        self
    }

    /// The cache results are memoized in, if any.
    pub fn cache(&self) -> Option<&SharedCache> {
        self.memoized
            .as_ref()
            .and_then(|memoized| memoized.filters.first())
            .map(CachedOperator::cache)
    }

    /// Parse a list of textual filter descriptions such as `GaussianSmoothing(0.3)`.
    pub fn parse<'a>(descriptions: impl IntoIterator<Item = &'a str>) -> EngineResult<Self> {
        let extractors = descriptions
            .into_iter()
            .map(str::parse)
            .collect::<EngineResult<Vec<ChannelwiseFilter>>>()?;
        Self::new(extractors)
    }

    /// Members in output channel order.
    pub fn extractors(&self) -> &[ChannelwiseFilter] {
        &self.extractors
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.extractors.len()
    }

    /// Always false for a constructed collection.
    pub fn is_empty(&self) -> bool {
        self.extractors.is_empty()
    }

    fn compute_member(&self, index: usize, source: &dyn DataSource, input: &Region) -> EngineResult<Block> {
        let memoized = match &self.memoized {
            Some(memoized) => memoized,
            None => return self.extractors[index].compute_features(source, input),
        };
        let presmoothed = memoized.presmoothers[index].as_ref().map(|p| p as &dyn Operator);
        memoized.filters[index].get_or_compute_with(source, input, |filter| {
            filter.ensure_applicable(source)?;
            let mut out = BlockBuf::allocate(filter.expected_region(input), 0.0);
            filter.compute_into_with(source, input, &mut out, presmoothed)?;
            Ok(out.freeze())
        })
    }
}

impl PartialEq for FeatureExtractorCollection {
    fn eq(&self, other: &Self) -> bool {
        self.extractors == other.extractors
    }
}

impl TryFrom<Vec<ChannelwiseFilter>> for FeatureExtractorCollection {
    type Error = EngineError;

    fn try_from(extractors: Vec<ChannelwiseFilter>) -> Result<Self, Self::Error> {
        Self::new(extractors)
    }
}

impl From<FeatureExtractorCollection> for Vec<ChannelwiseFilter> {
    fn from(collection: FeatureExtractorCollection) -> Self {
        collection.extractors
    }
}

impl FeatureExtractor for FeatureExtractorCollection {
    fn kernel_shape(&self) -> Shape5 {
        let extents = self
            .extractors
            .iter()
            .map(|extractor| extractor.kernel_shape().to_array())
            .fold([1i64; 5], |acc, shape| {
                let mut out = acc;
                for (axis, extent) in out.iter_mut().enumerate() {
                    *extent = (*extent).max(shape[axis]);
                }
                out
            });
        Shape5::from_array(extents)
    }

    fn channel_multiplier(&self) -> i64 {
        self.extractors.iter().map(|e| e.channel_multiplier()).sum()
    }

    fn ensure_applicable(&self, source: &dyn DataSource) -> EngineResult<()> {
        self.extractors.iter().try_for_each(|e| e.ensure_applicable(source))
    }

    fn compute_into(&self, source: &dyn DataSource, input: &Region, out: &mut BlockBuf) -> EngineResult<()> {
        check_output(&self.expected_region(input), out)?;
        let mut channel_offset = 0i64;
        for index in 0..self.extractors.len() {
            let features = self.compute_member(index, source, input)?;
            let width = features.region().len(Axis::C);
            out.set(&features.translated(Point5::zero().with(Axis::C, channel_offset)));
            channel_offset += width;
        }
        let expected = out.region().len(Axis::C);
        if channel_offset != expected {
            return Err(EngineError::ShapeMismatch(format!(
                "extractors produced {} channels, expected {}",
                channel_offset, expected
            )));
        }
        Ok(())
    }
}

impl Operator for FeatureExtractorCollection {
    fn compute(&self, source: &dyn DataSource, region: &Region) -> EngineResult<Block> {
        self.compute_features(source, region)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::SourceError;
    use crate::core::source::{ArrayDataSource, SourceId};
    use crate::execution::cache::new_shared_cache;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts reads, i.e. kernel passes over raw data.
    #[derive(Debug)]
    struct CountingSource {
        inner: ArrayDataSource,
        reads: AtomicUsize,
    }

    impl DataSource for CountingSource {
        fn id(&self) -> SourceId {
            self.inner.id()
        }
        fn interval(&self) -> Region {
            self.inner.interval()
        }
        fn tile_shape(&self) -> Shape5 {
            self.inner.tile_shape()
        }
        fn retrieve(&self, region: &Region) -> Result<Block, SourceError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.retrieve(region)
        }
    }

    fn counting_plane(side: i64) -> CountingSource {
        let region = Region::from_shape(Shape5::spatial(1, side, side)).unwrap();
        let data = (0..region.volume()).map(|i| ((i * 5) % 11) as f32).collect();
        CountingSource {
            inner: ArrayDataSource::new(Block::new(region, data).unwrap(), Shape5::spatial(1, side, side)),
            reads: AtomicUsize::new(0),
        }
    }

    fn presmoothed_pair() -> FeatureExtractorCollection {
        // both reach 1.6 through the same presmoothing
        FeatureExtractorCollection::parse([
            "GaussianSmoothing(1.6, axis_2d=\"z\")",
            "GaussianGradientMagnitude(1.6, axis_2d=\"z\")",
        ])
        .unwrap()
    }

    fn volume(side: i64) -> ArrayDataSource {
        let region = Region::from_shape(Shape5::spatial(side, side, side)).unwrap();
        let data = (0..region.volume()).map(|i| (i % 17) as f32 * 0.5).collect();
        ArrayDataSource::new(Block::new(region, data).unwrap(), Shape5::spatial(side, side, side))
    }

    fn collection() -> FeatureExtractorCollection {
        FeatureExtractorCollection::new(vec![
            ChannelwiseFilter::gaussian_smoothing(0.3),
            ChannelwiseFilter::hessian_of_gaussian_eigenvalues(0.7),
        ])
        .unwrap()
    }

    #[test]
    fn test_empty_collection_rejected() {
        assert!(FeatureExtractorCollection::new(vec![]).is_err());
        assert!(serde_json::from_str::<FeatureExtractorCollection>("[]").is_err());
    }

    #[test]
    fn test_composite_channels_match_members() {
        let source = volume(12);
        let features = collection();
        assert_eq!(features.channel_multiplier(), 4);

        let output = features.compute(&source, &source.interval()).unwrap();
        assert_eq!(output.region().extent(Axis::C), (0, 4));

        let smoothing = features.extractors()[0].compute(&source, &source.interval()).unwrap();
        let hessian = features.extractors()[1].compute(&source, &source.interval()).unwrap();
        assert!(output.cut(&source.interval().with_channels(0, 1)).unwrap().bit_identical(&smoothing));
        let moved = hessian.translated(Point5::new(0, 0, 0, 0, 1));
        assert!(output.cut(&source.interval().with_channels(1, 3)).unwrap().bit_identical(&moved));
    }

    #[test]
    fn test_kernel_shape_is_maximum() {
        let features = collection();
        // 0.7 * 3 rounds up to 3
        assert_eq!(features.kernel_shape(), Shape5::new(1, 7, 7, 7, 1));
        assert_eq!(features.halo(), Point5::new(0, 3, 3, 3, 0));
    }

    #[test]
    fn test_parse_descriptions() {
        let features =
            FeatureExtractorCollection::parse(["GaussianSmoothing(0.3)", "LaplacianOfGaussian(1.6, axis_2d=\"z\")"])
                .unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(features.extractors()[1].axis_2d(), Some(Axis::Z));
    }

    #[test]
    fn test_cached_collection_computes_each_region_once() {
        let plain = presmoothed_pair();
        let cache = new_shared_cache(16);
        let cached = plain.clone().with_cache(cache.clone());
        let region = Region::from_shape(Shape5::spatial(1, 20, 20)).unwrap();

        let uncounted = counting_plane(20);
        let expected = plain.compute(&uncounted, &region).unwrap();
        let expected_again = plain.compute(&uncounted, &region).unwrap();
        assert!(expected.bit_identical(&expected_again));
        assert_eq!(uncounted.reads.load(Ordering::SeqCst), 4);

        let source = counting_plane(20);
        let first = cached.compute(&source, &region).unwrap();
        // the second member reuses the first one's presmoothed input
        assert_eq!(source.reads.load(Ordering::SeqCst), 1);
        for _ in 0..3 {
            let again = cached.compute(&source, &region).unwrap();
            assert!(again.bit_identical(&first));
        }
        assert_eq!(source.reads.load(Ordering::SeqCst), 1);
        assert!(first.bit_identical(&expected));

        let stats = cache.stats();
        assert_eq!(stats.misses, 3);
        assert_eq!(stats.hits, 1 + 3 * 2);
    }

    #[test]
    fn test_clones_share_cached_results() {
        let cache = new_shared_cache(16);
        let cached = presmoothed_pair().with_cache(cache.clone());
        let copy = cached.clone();
        let source = counting_plane(20);
        let region = Region::from_shape(Shape5::spatial(1, 20, 20)).unwrap();

        cached.compute(&source, &region).unwrap();
        copy.compute(&source, &region).unwrap();
        assert_eq!(source.reads.load(Ordering::SeqCst), 1);
        assert!(copy.cache().is_some());
        assert_eq!(copy, presmoothed_pair());

        // a fresh wrapping does not see the old entries
        let rewrapped = presmoothed_pair().with_cache(cache);
        rewrapped.compute(&source, &region).unwrap();
        assert_eq!(source.reads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_serialized_form_drops_cache() {
        let cached = collection().with_cache(new_shared_cache(4));
        let json = serde_json::to_string(&cached).unwrap();
        assert_eq!(json, serde_json::to_string(&collection()).unwrap());
        let restored: FeatureExtractorCollection = serde_json::from_str(&json).unwrap();
        assert!(restored.cache().is_none());
        assert_eq!(restored, cached);
    }

    #[test]
    fn test_json_roundtrip() {
        let features = collection();
        let json = serde_json::to_string(&features).unwrap();
        let restored: FeatureExtractorCollection = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, features);
    }
}
