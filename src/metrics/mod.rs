//! Prometheus metrics exporter for vibration monitoring.
//!
//! # Metrics Exposed
//!
//! ## Capture Metrics
//! - `vibration_monitor_samples_total` - Samples captured since start
//! - `vibration_monitor_last_intensity` - Most recent intensity
//! - `vibration_monitor_capture_runs_total` - Capture runs finished
//! - `vibration_monitor_capture_aborted_total` - Runs that ended with an error
//!
//! ## Health Metrics
//!
//! Re-scored from the whole log after every sample while capturing.
//!
//! - `vibration_monitor_health_score` - Latest health score (0-100)
//! - `vibration_monitor_health_classification` - -1=unknown, 0=normal, 1=warning, 2=fault
//! - `vibration_monitor_spike_active` - Latest sample above threshold
//!
//! # Example
//!
//! ```no_run
//! use vibration_monitor::metrics::MetricsRegistry;
//!
//! let registry = MetricsRegistry::new().expect("Failed to create registry");
//! registry.record_sample(12.5);
//! println!("{}", registry.encode().unwrap());
//! ```

mod collector;
#[cfg(feature = "metrics")]
mod server;

pub use collector::{MetricsError, MetricsRegistry, MetricsSink};
#[cfg(feature = "metrics")]
pub use server::{MetricsServer, MetricsServerConfig, ServerError};
