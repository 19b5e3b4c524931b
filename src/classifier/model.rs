//! The model seam and a deterministic reference model.

use crate::core::block::FeatureMatrix;
use crate::core::error::ModelError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// A fitted model producing per-class probabilities.
pub trait Model: Send + Sync + Debug {
    /// Number of classes; labels run from 1 to this value.
    fn num_classes(&self) -> usize;

    /// Number of features each row must have.
    fn num_features(&self) -> usize;

    /// Probabilities, one row of `num_classes` values per input row, in label order.
    fn infer(&self, features: &FeatureMatrix) -> Result<Vec<f32>, ModelError>;
}

/// Fits a [`Model`] from labelled feature rows.
pub trait Trainer: Send + Sync {
    /// The model this trainer produces.
    type Model: Model + Clone + PartialEq + Serialize + DeserializeOwned;

    /// Fit on `features` with 1-based `labels` in `1..=num_classes`.
    fn fit(
        &self,
        features: &FeatureMatrix,
        labels: &[u32],
        num_classes: usize,
        seed: u64,
    ) -> Result<Self::Model, ModelError>;
}

// ============================================================================
// Gaussian naive Bayes
// ============================================================================

/// Per-class, per-feature normal distributions with independent features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaussianNaiveBayes {
    num_features: usize,
    log_priors: Vec<f64>,
    /// `num_classes * num_features` means, class-major.
    means: Vec<f64>,
    variances: Vec<f64>,
}

impl GaussianNaiveBayes {
    fn joint_log_likelihood(&self, row: &[f32], class: usize) -> f64 {
        let offset = class * self.num_features;
        let mut total = self.log_priors[class];
        for (feature, &value) in row.iter().enumerate() {
            let mean = self.means[offset + feature];
            let variance = self.variances[offset + feature];
            let diff = f64::from(value) - mean;
            total -= 0.5 * ((2.0 * std::f64::consts::PI * variance).ln() + diff * diff / variance);
        }
        total
    }
}

impl Model for GaussianNaiveBayes {
    fn num_classes(&self) -> usize {
        self.log_priors.len()
    }

    fn num_features(&self) -> usize {
        self.num_features
    }

    fn infer(&self, features: &FeatureMatrix) -> Result<Vec<f32>, ModelError> {
        if features.cols() != self.num_features {
            return Err(ModelError::FeatureCountMismatch {
                expected: self.num_features,
                got: features.cols(),
            });
        }
        let classes = self.num_classes();
        let mut out = Vec::with_capacity(features.rows() * classes);
        let mut scores = vec![0.0f64; classes];
        for row in features.iter_rows() {
            for (class, score) in scores.iter_mut().enumerate() {
                *score = self.joint_log_likelihood(row, class);
            }
            let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let total: f64 = scores.iter().map(|score| (score - max).exp()).sum();
            out.extend(scores.iter().map(|score| ((score - max).exp() / total) as f32));
        }
        Ok(out)
    }
}

/// Trainer for [`GaussianNaiveBayes`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NaiveBayesTrainer {
    /// Fraction of the largest feature variance added to every variance.
    pub var_smoothing: f64,
}

impl NaiveBayesTrainer {
    /// A trainer with scikit-learn's default smoothing of `1e-9`.
    pub fn new() -> Self {
        Self { var_smoothing: 1e-9 }
    }

    /// Set the variance smoothing fraction.
    pub fn with_var_smoothing(mut self, var_smoothing: f64) -> Self {
        self.var_smoothing = var_smoothing;
        self
    }
}

impl Default for NaiveBayesTrainer {
    fn default() -> Self {
        Self::new()
    }
}

impl Trainer for NaiveBayesTrainer {
    type Model = GaussianNaiveBayes;

    // Deterministic: the seed is accepted for interface parity and unused.
    fn fit(
        &self,
        features: &FeatureMatrix,
        labels: &[u32],
        num_classes: usize,
        _seed: u64,
    ) -> Result<GaussianNaiveBayes, ModelError> {
        if features.rows() == 0 {
            return Err(ModelError::EmptyTrainingSet);
        }
        if features.rows() != labels.len() {
            return Err(ModelError::RowCountMismatch {
                rows: features.rows(),
                labels: labels.len(),
            });
        }

        let cols = features.cols();
        let mut counts = vec![0usize; num_classes];
        let mut sums = vec![0.0f64; num_classes * cols];
        for (row, &label) in features.iter_rows().zip(labels) {
            if label == 0 || label as usize > num_classes {
                return Err(ModelError::LabelOutOfRange { label, num_classes });
            }
            let class = label as usize - 1;
            counts[class] += 1;
            for (sum, &value) in sums[class * cols..(class + 1) * cols].iter_mut().zip(row) {
                *sum += f64::from(value);
            }
        }
        if let Some(empty) = counts.iter().position(|&count| count == 0) {
            return Err(ModelError::EmptyClass { label: empty as u32 + 1 });
        }

        let means: Vec<f64> = sums
            .iter()
            .enumerate()
            .map(|(index, sum)| sum / counts[index / cols] as f64)
            .collect();

        let mut squares = vec![0.0f64; num_classes * cols];
        for (row, &label) in features.iter_rows().zip(labels) {
            let class = label as usize - 1;
            for (feature, &value) in row.iter().enumerate() {
                let diff = f64::from(value) - means[class * cols + feature];
                squares[class * cols + feature] += diff * diff;
            }
        }

        let overall_variance = (0..cols)
            .map(|feature| column_variance(features, feature))
            .fold(0.0f64, f64::max);
        let epsilon = (self.var_smoothing * overall_variance).max(f64::MIN_POSITIVE);
        let variances = squares
            .iter()
            .enumerate()
            .map(|(index, square)| square / counts[index / cols] as f64 + epsilon)
            .collect();

        let total = features.rows() as f64;
        let log_priors = counts.iter().map(|&count| (count as f64 / total).ln()).collect();

        Ok(GaussianNaiveBayes {
            num_features: cols,
            log_priors,
            means,
            variances,
        })
    }
}

fn column_variance(features: &FeatureMatrix, column: usize) -> f64 {
    let n = features.rows() as f64;
    let mean = features.iter_rows().map(|row| f64::from(row[column])).sum::<f64>() / n;
    features
        .iter_rows()
        .map(|row| {
            let diff = f64::from(row[column]) - mean;
            diff * diff
        })
        .sum::<f64>()
        / n
}
