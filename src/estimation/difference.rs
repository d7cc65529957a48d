//! Vibration intensity via frame differencing.
//!
//! Static parts of the scene cancel out when two consecutive frames are
//! subtracted. What is left is proportional to how far things moved, so
//! the mean absolute luminance difference serves as the intensity.

use super::luminance::luminance;
use crate::capture::Frame;
use thiserror::Error;

/// Errors that can occur while comparing two frames.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EstimateError {
    /// The stream changed resolution between two frames.
    #[error("frame dimensions differ: {previous:?} vs {current:?}")]
    DimensionMismatch {
        /// Width and height of the earlier frame.
        previous: (u32, u32),
        /// Width and height of the later frame.
        current: (u32, u32),
    },
    /// A pixel buffer is shorter or longer than its dimensions imply.
    #[error("frame {sequence} buffer does not match its dimensions")]
    InvalidFrame {
        /// Sequence number of the bad frame.
        sequence: u64,
    },
    /// Zero-sized frames.
    #[error("frames contain no pixels")]
    EmptyFrame,
}

/// Stateless mean-absolute-difference estimator.
///
/// The caller keeps the previous frame; see `Monitor` for the loop that
/// feeds it.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntensityEstimator;

impl IntensityEstimator {
    /// Creates an estimator.
    pub fn new() -> Self {
        Self
    }

    /// Returns the mean absolute luminance difference between two frames.
    ///
    /// The result is symmetric in its arguments and never negative.
    pub fn estimate(&self, previous: &Frame, current: &Frame) -> Result<f64, EstimateError> {
        for frame in [previous, current] {
            if !frame.is_valid() {
                return Err(EstimateError::InvalidFrame {
                    sequence: frame.sequence(),
                });
            }
        }

        let prev_dims = (previous.width(), previous.height());
        let curr_dims = (current.width(), current.height());
        if prev_dims != curr_dims {
            return Err(EstimateError::DimensionMismatch {
                previous: prev_dims,
                current: curr_dims,
            });
        }
        if current.pixel_count() == 0 {
            return Err(EstimateError::EmptyFrame);
        }

        let prev = luminance(previous);
        let curr = luminance(current);

        let total: u64 = prev
            .iter()
            .zip(curr.iter())
            .map(|(&p, &c)| u64::from(p.abs_diff(c)))
            .sum();

        Ok(total as f64 / current.pixel_count() as f64)
    }
}
