//! Health scoring formulas.
//!
//! Two formulas are in use by existing deployments and they disagree on
//! identical data, so the choice is left to configuration.

use crate::series::Series;
use serde::{Deserialize, Serialize};

/// Highest possible health score.
pub const MAX_SCORE: f64 = 100.0;

/// How a series is turned into a 0-100 health score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScoringPolicy {
    /// Mean of the last `window` samples relative to the larger of the
    /// series peak and `threshold + 10`.
    #[default]
    WindowedRatio,
    /// `100 - 2 * mean` over the whole series.
    Linear,
}

impl ScoringPolicy {
    /// Scores a non-empty series. Callers guarantee `series` is not empty
    /// and `window >= 1`.
    pub(crate) fn score(self, series: &Series, threshold: f64, window: usize) -> f64 {
        let raw = match self {
            ScoringPolicy::WindowedRatio => {
                let recent = series.tail(window);
                let avg = mean(recent.iter().map(|s| s.intensity));
                let peak = series.intensities().fold(0.0, f64::max);
                let scale = peak.max(threshold + 10.0);
                if scale <= 0.0 {
                    MAX_SCORE
                } else {
                    MAX_SCORE - (avg / scale) * MAX_SCORE
                }
            }
            ScoringPolicy::Linear => MAX_SCORE - 2.0 * mean(series.intensities()),
        };
        raw.clamp(0.0, MAX_SCORE)
    }

    /// Config and CLI spelling of the policy.
    pub fn name(self) -> &'static str {
        match self {
            ScoringPolicy::WindowedRatio => "windowed-ratio",
            ScoringPolicy::Linear => "linear",
        }
    }
}

impl std::fmt::Display for ScoringPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for ScoringPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "windowed-ratio" | "windowed" => Ok(ScoringPolicy::WindowedRatio),
            "linear" => Ok(ScoringPolicy::Linear),
            other => Err(format!(
                "unknown scoring policy '{other}' (expected windowed-ratio or linear)"
            )),
        }
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::Sample;
    use chrono::NaiveDate;

    fn series(values: &[f64]) -> Series {
        let base = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| Sample::new(base + chrono::Duration::seconds(i as i64), v))
            .collect()
    }

    #[test]
    fn test_windowed_uses_threshold_floor() {
        // avg 10, peak 10 < threshold + 10 = 50 -> 100 - 20 = 80
        let score = ScoringPolicy::WindowedRatio.score(&series(&[10.0, 10.0]), 40.0, 50);
        assert!((score - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_windowed_uses_peak_when_larger() {
        // Window is [20, 20]; peak 100 dominates -> 100 - 20 = 80
        let score =
            ScoringPolicy::WindowedRatio.score(&series(&[100.0, 20.0, 20.0]), 40.0, 2);
        assert!((score - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_linear_formula() {
        let score = ScoringPolicy::Linear.score(&series(&[5.0, 15.0]), 40.0, 1);
        assert!((score - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_linear_clamps_at_zero() {
        let score = ScoringPolicy::Linear.score(&series(&[80.0]), 40.0, 1);
        assert_eq!(score, 0.0);
    }

    #[test]
    fn test_policies_agree_on_flat_data_but_not_on_spikes() {
        let data = series(&[20.0, 20.0, 20.0]);
        let windowed = ScoringPolicy::WindowedRatio.score(&data, 40.0, 3);
        let linear = ScoringPolicy::Linear.score(&data, 40.0, 3);
        assert!((windowed - 60.0).abs() < 1e-9);
        assert!((linear - 60.0).abs() < 1e-9);

        let spiky = series(&[90.0, 5.0, 5.0]);
        assert!(
            ScoringPolicy::WindowedRatio.score(&spiky, 40.0, 2)
                > ScoringPolicy::Linear.score(&spiky, 40.0, 2)
        );
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("linear".parse::<ScoringPolicy>(), Ok(ScoringPolicy::Linear));
        assert_eq!(
            "windowed-ratio".parse::<ScoringPolicy>(),
            Ok(ScoringPolicy::WindowedRatio)
        );
        assert!("median".parse::<ScoringPolicy>().is_err());
    }
}
