//! Turning annotations into labelled training data.

use crate::classifier::annotation::{Annotation, Color};
use crate::core::block::FeatureMatrix;
use crate::core::error::{EngineError, EngineResult};
use crate::features::FeatureExtractor;
use indexmap::IndexMap;
use log::debug;

/// Colors sorted by `q_rgba`, mapped to labels `1..=n`.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorMap {
    labels: IndexMap<Color, u32>,
}

impl ColorMap {
    /// Build the map from the distinct colors among `colors`.
    pub fn new<'a>(colors: impl IntoIterator<Item = &'a Color>) -> Self {
        let mut unique: Vec<Color> = colors.into_iter().cloned().collect();
        unique.sort();
        unique.dedup();
        let labels = unique
            .into_iter()
            .enumerate()
            .map(|(index, color)| (color, index as u32 + 1))
            .collect();
        Self { labels }
    }

    /// Label of `color`, if mapped.
    pub fn label(&self, color: &Color) -> Option<u32> {
        self.labels.get(color).copied()
    }

    /// Colors in label order.
    pub fn colors(&self) -> impl Iterator<Item = &Color> {
        self.labels.keys()
    }

    /// Number of classes.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Check if no class was seen.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Feature rows and their 1-based labels.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingData {
    /// One row per annotated voxel.
    pub features: FeatureMatrix,
    /// Label of each row.
    pub labels: Vec<u32>,
    /// Colors behind the labels.
    pub color_map: ColorMap,
}

impl TrainingData {
    /// Sample `extractor` under every annotation.
    ///
    /// All annotations must reference the same raw dataset. Annotations are
    /// processed in color order.
    pub fn from_annotations(extractor: &dyn FeatureExtractor, annotations: &[Annotation]) -> EngineResult<Self> {
        let first = annotations
            .first()
            .ok_or_else(|| EngineError::InvalidInput("training needs at least one annotation".to_string()))?;
        let raw_id = first.raw_data().id();
        if let Some(other) = annotations.iter().find(|a| a.raw_data().id() != raw_id) {
            return Err(EngineError::InvalidInput(format!(
                "annotations reference different datasets ({} and {})",
                raw_id,
                other.raw_data().id()
            )));
        }

        let color_map = ColorMap::new(annotations.iter().map(Annotation::color));
        let mut ordered: Vec<&Annotation> = annotations.iter().collect();
        ordered.sort_by(|a, b| a.color().cmp(b.color()));

        let cols = (first.raw_data().num_channels() * extractor.channel_multiplier()) as usize;
        let mut parts = Vec::with_capacity(ordered.len());
        let mut labels = Vec::new();
        for annotation in ordered {
            let samples = annotation.feature_samples(extractor)?;
            let label = color_map.label(annotation.color()).ok_or_else(|| {
                EngineError::InvalidInput(format!("color {} missing from color map", annotation.color()))
            })?;
            debug!("{} samples for label {} ({})", samples.rows(), label, annotation.color());
            labels.extend(std::iter::repeat(label).take(samples.rows()));
            parts.push(samples);
        }

        Ok(Self {
            features: FeatureMatrix::concat(cols, parts)?,
            labels,
            color_map,
        })
    }
}
