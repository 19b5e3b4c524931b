//! A trained pixel classifier: feature stack plus fitted model.

use crate::classifier::annotation::{Annotation, Color};
use crate::classifier::model::{Model, Trainer};
use crate::classifier::training::TrainingData;
use crate::core::block::Block;
use crate::core::error::{EngineError, EngineResult};
use crate::core::geometry::{Axis, Region};
use crate::core::source::DataSource;
use crate::execution::operator::Operator;
use crate::features::{ChannelwiseFilter, FeatureExtractor, FeatureExtractorCollection};
use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Predicts per-class probabilities for every voxel of a region.
///
/// Immutable once trained. Output channel `i` holds the probability of the
/// class with label `i + 1`, i.e. of `classes()[i]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "M: Serialize", deserialize = "M: DeserializeOwned"))]
pub struct Classifier<M> {
    feature_extractor: FeatureExtractorCollection,
    model: M,
    classes: Vec<Color>,
    num_input_channels: i64,
}

impl<M: Model> Classifier<M> {
    /// Train on `annotations`, which must all reference the same raw data.
    pub fn train<T>(
        extractors: Vec<ChannelwiseFilter>,
        annotations: &[Annotation],
        trainer: &T,
        seed: u64,
    ) -> EngineResult<Self>
    where
        T: Trainer<Model = M>,
    {
        Self::train_collection(FeatureExtractorCollection::new(extractors)?, annotations, trainer, seed)
    }

    /// Train with a prepared feature stack, e.g. one memoized through
    /// [`FeatureExtractorCollection::with_cache`]. Predictions go through the
    /// same stack, so they reuse features computed for training.
    pub fn train_collection<T>(
        feature_extractor: FeatureExtractorCollection,
        annotations: &[Annotation],
        trainer: &T,
        seed: u64,
    ) -> EngineResult<Self>
    where
        T: Trainer<Model = M>,
    {
        let raw = annotations
            .first()
            .ok_or_else(|| EngineError::InvalidInput("training needs at least one annotation".to_string()))?
            .raw_data()
            .clone();
        feature_extractor.ensure_applicable(raw.as_ref())?;

        let data = TrainingData::from_annotations(&feature_extractor, annotations)?;
        info!(
            "Training on {} samples with {} features and {} classes",
            data.features.rows(),
            data.features.cols(),
            data.color_map.len()
        );
        let model = trainer.fit(&data.features, &data.labels, data.color_map.len(), seed)?;

        Ok(Self {
            feature_extractor,
            model,
            classes: data.color_map.colors().cloned().collect(),
            num_input_channels: raw.num_channels(),
        })
    }

    /// Reassemble a classifier from already trained parts.
    pub fn from_parts(
        feature_extractor: FeatureExtractorCollection,
        model: M,
        classes: Vec<Color>,
        num_input_channels: i64,
    ) -> EngineResult<Self> {
        if classes.len() != model.num_classes() {
            return Err(EngineError::InvalidInput(format!(
                "{} colors for a model with {} classes",
                classes.len(),
                model.num_classes()
            )));
        }
        let features = (num_input_channels * feature_extractor.channel_multiplier()) as usize;
        if features != model.num_features() {
            return Err(EngineError::ShapeMismatch(format!(
                "feature stack yields {} features, model expects {}",
                features,
                model.num_features()
            )));
        }
        Ok(Self {
            feature_extractor,
            model,
            classes,
            num_input_channels,
        })
    }

    /// The feature stack predictions are computed from.
    pub fn feature_extractor(&self) -> &FeatureExtractorCollection {
        &self.feature_extractor
    }

    /// The fitted model.
    pub fn model(&self) -> &M {
        &self.model
    }

    /// Class colors in label order.
    pub fn classes(&self) -> &[Color] {
        &self.classes
    }

    /// Color of the class with 1-based `label`.
    pub fn color_of(&self, label: u32) -> Option<&Color> {
        label.checked_sub(1).and_then(|index| self.classes.get(index as usize))
    }

    /// Channels of the data the classifier was trained on.
    pub fn num_input_channels(&self) -> i64 {
        self.num_input_channels
    }

    /// Number of classes, i.e. output channels.
    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    /// Region of the predictions for `region`.
    pub fn expected_region(&self, region: &Region) -> Region {
        region.with_channels(0, self.classes.len() as i64)
    }

    /// Check that `source` can be classified.
    pub fn ensure_applicable(&self, source: &dyn DataSource) -> EngineResult<()> {
        if source.num_channels() != self.num_input_channels {
            return Err(EngineError::ShapeMismatch(format!(
                "classifier was trained on {} channels, data source has {}",
                self.num_input_channels,
                source.num_channels()
            )));
        }
        self.feature_extractor.ensure_applicable(source)
    }

    /// Check if `source` can be classified.
    pub fn is_applicable_to(&self, source: &dyn DataSource) -> bool {
        self.ensure_applicable(source).is_ok()
    }

    /// Class probabilities for every voxel of `region`, channels `[0, num_classes)`.
    pub fn predict(&self, source: &dyn DataSource, region: &Region) -> EngineResult<Block> {
        self.ensure_applicable(source)?;
        if region.len(Axis::C) != self.num_input_channels {
            return Err(EngineError::ShapeMismatch(format!(
                "region {} must span all {} input channels",
                region, self.num_input_channels
            )));
        }
        let features = self.feature_extractor.compute_features(source, region)?;
        let probabilities = self.model.infer(&features.to_matrix())?;
        debug!("Predicted {} ({} classes)", region, self.classes.len());
        Block::new(self.expected_region(region), probabilities)
    }
}

impl<M: Serialize + DeserializeOwned> Classifier<M> {
    /// Pretty-printed JSON form.
    pub fn to_json(&self) -> EngineResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| EngineError::Encoding(e.to_string()))
    }

    /// Single-line JSON form.
    pub fn to_json_compact(&self) -> EngineResult<String> {
        serde_json::to_string(self).map_err(|e| EngineError::Encoding(e.to_string()))
    }

    /// Parse either JSON form.
    pub fn from_json(json: &str) -> EngineResult<Self> {
        serde_json::from_str(json).map_err(|e| EngineError::Encoding(e.to_string()))
    }
}

impl<M: Model> Operator for Classifier<M> {
    fn compute(&self, source: &dyn DataSource, region: &Region) -> EngineResult<Block> {
        self.predict(source, region)
    }
}
