//! Feature extraction.
//!
//! - [`kernels`]: reference separable Gaussian-family kernels
//! - [`extractor`]: the [`FeatureExtractor`] contract
//! - [`filter`]: channel-wise filters with halos and presmoothing
//! - [`collection`]: channel-stacked compositions of filters

pub mod collection;
pub mod extractor;
pub mod filter;
pub mod kernels;

pub use collection::FeatureExtractorCollection;
pub use extractor::FeatureExtractor;
pub use filter::{calc_presmooth_sigma, ChannelwiseFilter, FilterKind};
