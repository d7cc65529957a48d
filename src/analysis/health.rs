//! Machine health evaluation.
//!
//! Turns a series and a threshold into a score and a coarse classification.
//! Evaluation is read-only: nothing here touches the log.

use super::{
    policy::{ScoringPolicy, MAX_SCORE},
    threshold::{AlertThreshold, ThresholdViolation},
};
use crate::series::{Sample, Series, SeriesSummary};
use chrono::NaiveDateTime;
use thiserror::Error;

/// Scores above this are `Normal`.
pub const NORMAL_ABOVE: f64 = 75.0;
/// Scores below this are `Fault`.
pub const FAULT_BELOW: f64 = 45.0;

/// Errors returned by health queries.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HealthError {
    /// The series holds no samples.
    #[error("no samples to evaluate")]
    InsufficientData,
    /// The threshold is zero, negative or not finite.
    #[error("threshold must be a positive number, got {0}")]
    InvalidThreshold(f64),
    /// The window is zero.
    #[error("window must hold at least one sample")]
    InvalidWindow,
    /// A sample is NaN, infinite or negative.
    #[error("sample at {timestamp} has invalid intensity {intensity}")]
    InvalidSample {
        /// When the bad sample was taken.
        timestamp: NaiveDateTime,
        /// The offending value.
        intensity: f64,
    },
}

/// Coarse machine condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Classification {
    /// Score above `NORMAL_ABOVE`.
    Normal,
    /// Score between the two bands.
    Warning,
    /// Score below `FAULT_BELOW`, or a spike on the latest sample.
    Fault,
}

impl Classification {
    /// Maps a score onto the three bands.
    pub fn from_score(score: f64) -> Self {
        if score > NORMAL_ABOVE {
            Classification::Normal
        } else if score >= FAULT_BELOW {
            Classification::Warning
        } else {
            Classification::Fault
        }
    }

    /// Short operator-facing status line.
    pub fn status(self) -> &'static str {
        match self {
            Classification::Normal => "Machine operating normally",
            Classification::Warning => "Moderate condition, monitor vibration trends",
            Classification::Fault => "Maintenance required",
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Classification::Normal => "normal",
            Classification::Warning => "warning",
            Classification::Fault => "fault",
        };
        f.write_str(name)
    }
}

/// Result of one health query. Derived on demand, never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthAssessment {
    /// Health score in [0, 100].
    pub score: f64,
    /// Final classification, spike override applied.
    pub classification: Classification,
    /// Set when the latest sample exceeded the threshold.
    pub spike: Option<ThresholdViolation>,
    /// Statistics of the evaluated series.
    pub summary: SeriesSummary,
    /// Policy that produced `score`.
    pub policy: ScoringPolicy,
}

impl HealthAssessment {
    /// Classification implied by the score alone.
    pub fn score_classification(&self) -> Classification {
        Classification::from_score(self.score)
    }
}

/// Evaluates series health under a configured scoring policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct HealthEvaluator {
    policy: ScoringPolicy,
}

impl HealthEvaluator {
    /// Creates an evaluator that scores with `policy`.
    pub fn new(policy: ScoringPolicy) -> Self {
        Self { policy }
    }

    /// Scoring policy in use.
    pub fn policy(&self) -> ScoringPolicy {
        self.policy
    }

    /// Scores `series` and classifies it.
    ///
    /// The most recent sample exceeding `threshold` forces `Fault` even
    /// when the aggregate score is good. Series holding a NaN, infinite or
    /// negative intensity are rejected.
    pub fn evaluate(
        &self,
        series: &Series,
        threshold: f64,
        window: usize,
    ) -> Result<HealthAssessment, HealthError> {
        let alert = AlertThreshold::new(threshold).ok_or(HealthError::InvalidThreshold(threshold))?;
        if window == 0 {
            return Err(HealthError::InvalidWindow);
        }
        if let Some(bad) = series.samples().iter().find(|s| !s.is_valid()) {
            return Err(HealthError::InvalidSample {
                timestamp: bad.timestamp,
                intensity: bad.intensity,
            });
        }
        let summary = SeriesSummary::describe(series).ok_or(HealthError::InsufficientData)?;

        let score = self.policy.score(series, threshold, window);
        let spike = alert.check(series).err();

        let classification = if spike.is_some() {
            Classification::Fault
        } else {
            Classification::from_score(score)
        };

        match &spike {
            Some(violation) => tracing::warn!(
                score,
                violation = %violation,
                "Vibration spike on latest sample"
            ),
            None => tracing::debug!(score, %classification, policy = %self.policy, "Health evaluated"),
        }

        Ok(HealthAssessment {
            score,
            classification,
            spike,
            summary,
            policy: self.policy,
        })
    }

    /// Per-sample health for trend charts: `clamp(100 - 2 * intensity)`.
    ///
    /// Invalid samples are left out.
    pub fn trend(samples: &[Sample]) -> Vec<(NaiveDateTime, f64)> {
        samples
            .iter()
            .filter(|s| s.is_valid())
            .map(|s| (s.timestamp, (MAX_SCORE - 2.0 * s.intensity).clamp(0.0, MAX_SCORE)))
            .collect()
    }
}
