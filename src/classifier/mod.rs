//! Pixel classification on top of the feature engine.
//!
//! - [`annotation`]: colors, brush-stroke annotations and feature sampling
//! - [`training`]: color maps and labelled training data
//! - [`model`]: the `Model`/`Trainer` seam and Gaussian naive Bayes
//! - [`pixel_classifier`]: the trained [`Classifier`]
//! - [`predictions`]: wire and PNG export of prediction blocks

pub mod annotation;
pub mod model;
pub mod pixel_classifier;
pub mod predictions;
pub mod training;

pub use annotation::{Annotation, Color};
pub use model::{GaussianNaiveBayes, Model, NaiveBayesTrainer, Trainer};
pub use pixel_classifier::Classifier;
pub use predictions::{render_z_slice_pngs, to_u8_wire};
pub use training::{ColorMap, TrainingData};
