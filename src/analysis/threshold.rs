//! Spike detection on the most recent sample.
//!
//! A single reading above the threshold means something is happening now,
//! no matter how calm the history looks.

use crate::series::Series;

/// User-configured alert level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertThreshold {
    value: f64,
}

impl AlertThreshold {
    /// Returns `None` unless `value` is finite and positive.
    pub fn new(value: f64) -> Option<Self> {
        (value.is_finite() && value > 0.0).then_some(Self { value })
    }

    /// The threshold intensity.
    #[inline]
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Checks the latest sample of `series` against the threshold.
    pub fn check(&self, series: &Series) -> Result<(), ThresholdViolation> {
        match series.latest() {
            Some(latest) if latest.intensity > self.value => Err(ThresholdViolation {
                observed: latest.intensity,
                threshold: self.value,
            }),
            _ => Ok(()),
        }
    }
}

/// The latest intensity exceeded the alert threshold.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("latest intensity {observed:.2} exceeds threshold {threshold:.2}")]
pub struct ThresholdViolation {
    /// Intensity of the latest sample.
    pub observed: f64,
    /// Threshold it was checked against.
    pub threshold: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::Sample;
    use chrono::NaiveDate;

    fn series(values: &[f64]) -> Series {
        let base = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| Sample::new(base + chrono::Duration::seconds(i as i64), v))
            .collect()
    }

    #[test]
    fn test_rejects_non_positive() {
        assert!(AlertThreshold::new(0.0).is_none());
        assert!(AlertThreshold::new(-5.0).is_none());
        assert!(AlertThreshold::new(f64::NAN).is_none());
    }

    #[test]
    fn test_only_latest_sample_counts() {
        let threshold = AlertThreshold::new(40.0).unwrap();

        assert!(threshold.check(&series(&[90.0, 10.0])).is_ok());
        assert_eq!(
            threshold.check(&series(&[10.0, 55.0])),
            Err(ThresholdViolation {
                observed: 55.0,
                threshold: 40.0
            })
        );
    }

    #[test]
    fn test_equal_to_threshold_is_not_a_spike() {
        let threshold = AlertThreshold::new(40.0).unwrap();
        assert!(threshold.check(&series(&[40.0])).is_ok());
    }
}
