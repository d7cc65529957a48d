//! Vibration Monitor Library
//!
//! Estimates machine vibration from a camera pointed at the machine.
//! Consecutive frames are differenced into a scalar intensity, the
//! intensities are appended to a durable time series, and the series is
//! scored into a coarse health classification.
//!
//! # Architecture
//!
//! Data flows one way:
//!
//! ```text
//! capture → estimation → monitor → series → analysis
//!                           ↓
//!                   sinks (live viewers, metrics)
//! ```
//!
//! # Design Principles
//!
//! - **The log is the source of truth**: sinks only observe, they never store
//! - **Single writer**: one capture per log at a time, enforced by an OS file lock
//! - **Partial runs are kept**: samples appended before a failure stay in the log
//! - **Scoring is configurable**: both known health formulas are available
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use vibration_monitor::{
//!     analysis::{HealthEvaluator, ScoringPolicy},
//!     capture::MockSource,
//!     monitor::{CaptureRequest, Monitor, NoopSink},
//!     series::SeriesLog,
//! };
//!
//! let log = SeriesLog::new("vibration_log.csv");
//! let mut monitor = Monitor::new(log.clone());
//! let mut source = MockSource::new(64, 48);
//!
//! let request = CaptureRequest::new("mock://bench", Duration::from_secs(5));
//! let report = monitor.run(&mut source, &request, &mut NoopSink);
//! println!("captured {} samples", report.samples_written);
//!
//! let series = log.read_all().unwrap().series;
//! let health = HealthEvaluator::new(ScoringPolicy::WindowedRatio)
//!     .evaluate(&series, 40.0, 50)
//!     .unwrap();
//! println!("health {:.1} ({})", health.score, health.classification);
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod analysis;
pub mod capture;
pub mod estimation;
pub mod metrics;
pub mod monitor;
pub mod series;

// Re-export commonly used types at crate root
pub use analysis::{Classification, HealthAssessment, HealthEvaluator, ScoringPolicy};
pub use capture::{CaptureConfig, FileConfig, Frame, FrameSource, MockSource};
pub use estimation::IntensityEstimator;
pub use monitor::{CaptureReport, CaptureRequest, Monitor, NoopSink, SampleSink};
pub use series::{Sample, Series, SeriesLog};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
