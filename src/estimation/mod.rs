//! Frame-pair intensity estimation.
//!
//! Converts two consecutive frames into one non-negative scalar: the mean
//! absolute per-pixel luminance difference.

mod difference;
mod luminance;

pub use difference::{EstimateError, IntensityEstimator};
pub use luminance::luminance;
