//! Health scoring and alerting.
//!
//! Consumes the intensity series and produces a 0-100 health score with a
//! Normal/Warning/Fault classification. These are maintenance hints, not
//! diagnoses.

mod health;
mod policy;
mod threshold;

pub use health::{
    Classification, HealthAssessment, HealthError, HealthEvaluator, FAULT_BELOW, NORMAL_ABOVE,
};
pub use policy::{ScoringPolicy, MAX_SCORE};
pub use threshold::{AlertThreshold, ThresholdViolation};
