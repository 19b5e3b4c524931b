//! Region-valued tasks the orchestrator can split into tiles.
//!
//! Tasks are plain values: a task plus a list of tiles is all a worker in
//! another process or on another rank needs to compute its share.

use crate::classifier::model::{GaussianNaiveBayes, Model};
use crate::classifier::pixel_classifier::Classifier;
use crate::core::block::Block;
use crate::core::error::{EngineError, EngineResult};
use crate::core::geometry::{Axis, Region, Shape5};
use crate::core::source::{ArrayDataSource, DataSource};
use crate::features::{FeatureExtractor, FeatureExtractorCollection};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A computation that maps any tile of a region to an output block.
pub trait TileTask: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Tile shape to split runs into when the caller does not override it.
    fn preferred_tile_shape(&self) -> Shape5;

    /// Region of the block [`TileTask::compute_tile`] returns for `tile`.
    fn output_region(&self, tile: &Region) -> Region;

    /// Check, before any tile starts, that the task can run over `region`.
    fn validate(&self, region: &Region) -> EngineResult<()>;

    /// Compute the output for one tile.
    fn compute_tile(&self, tile: &Region) -> EngineResult<Block>;
}

fn ensure_inside(source: &dyn DataSource, region: &Region) -> EngineResult<()> {
    let bounds = source.interval();
    if !bounds.contains(region) {
        return Err(EngineError::InvalidInput(format!(
            "region {} exceeds data source bounds {}",
            region, bounds
        )));
    }
    if region.extent(Axis::C) != bounds.extent(Axis::C) {
        return Err(EngineError::InvalidInput(format!(
            "region {} must span all channels of {}",
            region, bounds
        )));
    }
    Ok(())
}

// ============================================================================
// Features
// ============================================================================

/// Compute a feature stack over a data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureTask<S> {
    /// Raw data.
    pub source: S,
    /// Filters whose outputs are stacked.
    pub extractor: FeatureExtractorCollection,
}

impl<S: DataSource> FeatureTask<S> {
    /// Compute `extractor` over `source`.
    pub fn new(source: S, extractor: FeatureExtractorCollection) -> Self {
        Self { source, extractor }
    }
}

impl<S: DataSource> TileTask for FeatureTask<S> {
    fn name(&self) -> &str {
        "features"
    }

    fn preferred_tile_shape(&self) -> Shape5 {
        self.source.tile_shape().with(Axis::C, 0)
    }

    fn output_region(&self, tile: &Region) -> Region {
        self.extractor.expected_region(tile)
    }

    fn validate(&self, region: &Region) -> EngineResult<()> {
        self.extractor.ensure_applicable(&self.source)?;
        ensure_inside(&self.source, region)
    }

    fn compute_tile(&self, tile: &Region) -> EngineResult<Block> {
        self.extractor.compute_features(&self.source, tile)
    }
}

// ============================================================================
// Predictions
// ============================================================================

/// Classify every voxel of a data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(
    serialize = "S: Serialize, M: Serialize",
    deserialize = "S: DeserializeOwned, M: DeserializeOwned"
))]
pub struct PredictionTask<S, M> {
    /// Raw data.
    pub source: S,
    /// The trained classifier.
    pub classifier: Classifier<M>,
}

impl<S: DataSource, M: Model> PredictionTask<S, M> {
    /// Classify `source` with `classifier`.
    pub fn new(source: S, classifier: Classifier<M>) -> Self {
        Self { source, classifier }
    }
}

impl<S: DataSource, M: Model> TileTask for PredictionTask<S, M> {
    fn name(&self) -> &str {
        "predictions"
    }

    fn preferred_tile_shape(&self) -> Shape5 {
        self.source.tile_shape().with(Axis::C, 0)
    }

    fn output_region(&self, tile: &Region) -> Region {
        self.classifier.expected_region(tile)
    }

    fn validate(&self, region: &Region) -> EngineResult<()> {
        self.classifier.ensure_applicable(&self.source)?;
        ensure_inside(&self.source, region)
    }

    fn compute_tile(&self, tile: &Region) -> EngineResult<Block> {
        self.classifier.predict(&self.source, tile)
    }
}

// ============================================================================
// Standard tasks
// ============================================================================

/// The tasks the `tilewise worker` binary knows how to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum StandardTask {
    /// Features of an in-memory source.
    Features(FeatureTask<ArrayDataSource>),
    /// Predictions of the built-in classifier.
    Predictions(PredictionTask<ArrayDataSource, GaussianNaiveBayes>),
}

impl StandardTask {
    fn inner(&self) -> &dyn TileTask {
        match self {
            StandardTask::Features(task) => task,
            StandardTask::Predictions(task) => task,
        }
    }
}

impl TileTask for StandardTask {
    fn name(&self) -> &str {
        self.inner().name()
    }

    fn preferred_tile_shape(&self) -> Shape5 {
        self.inner().preferred_tile_shape()
    }

    fn output_region(&self, tile: &Region) -> Region {
        self.inner().output_region(tile)
    }

    fn validate(&self, region: &Region) -> EngineResult<()> {
        self.inner().validate(region)
    }

    fn compute_tile(&self, tile: &Region) -> EngineResult<Block> {
        self.inner().compute_tile(tile)
    }
}

impl From<FeatureTask<ArrayDataSource>> for StandardTask {
    fn from(task: FeatureTask<ArrayDataSource>) -> Self {
        StandardTask::Features(task)
    }
}

impl From<PredictionTask<ArrayDataSource, GaussianNaiveBayes>> for StandardTask {
    fn from(task: PredictionTask<ArrayDataSource, GaussianNaiveBayes>) -> Self {
        StandardTask::Predictions(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geometry::Point5;
    use crate::features::ChannelwiseFilter;

    fn feature_task() -> FeatureTask<ArrayDataSource> {
        let region = Region::from_shape(Shape5::spatial(1, 10, 10)).unwrap();
        let data = (0..100).map(|i| i as f32).collect();
        let source = ArrayDataSource::new(Block::new(region, data).unwrap(), Shape5::spatial(1, 5, 5));
        let extractor = FeatureExtractorCollection::new(vec![
            ChannelwiseFilter::gaussian_smoothing(0.3).with_axis_2d(Axis::Z).unwrap(),
            ChannelwiseFilter::hessian_of_gaussian_eigenvalues(0.7).with_axis_2d(Axis::Z).unwrap(),
        ])
        .unwrap();
        FeatureTask::new(source, extractor)
    }

    #[test]
    fn test_feature_task_geometry() {
        let task = feature_task();
        assert_eq!(task.preferred_tile_shape(), Shape5::new(1, 1, 5, 5, 0));
        let tile = Region::new(Point5::new(0, 0, 5, 0, 0), Point5::new(1, 1, 10, 5, 1)).unwrap();
        assert_eq!(task.output_region(&tile).extent(Axis::C), (0, 3));
        assert_eq!(task.compute_tile(&tile).unwrap().region(), &task.output_region(&tile));
    }

    #[test]
    fn test_validate_rejects_out_of_bounds() {
        let task = feature_task();
        let outside = Region::from_shape(Shape5::spatial(1, 11, 10)).unwrap();
        assert!(matches!(task.validate(&outside), Err(EngineError::InvalidInput(_))));
        assert!(task.validate(&task.source.interval()).is_ok());
    }

    #[test]
    fn test_standard_task_roundtrip() {
        let task = StandardTask::from(feature_task());
        let json = serde_json::to_string(&task).unwrap();
        assert!(json.starts_with("{\"task\":\"features\""));
        let restored: StandardTask = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, task);

        let tile = Region::new(Point5::zero(), Point5::new(1, 1, 5, 5, 1)).unwrap();
        assert!(restored.compute_tile(&tile).unwrap().bit_identical(&task.compute_tile(&tile).unwrap()));
    }
}
