//! Metrics collection and registry.

use crate::analysis::{Classification, HealthAssessment, HealthError, HealthEvaluator};
use crate::capture::HealthConfig;
use crate::monitor::{CaptureReport, Outcome, SampleSink, SinkError};
use crate::series::{Sample, Series, SeriesLog};
use chrono::NaiveDateTime;
use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Registry, TextEncoder};
use thiserror::Error;

/// Classification gauge value while no assessment is available.
const CLASSIFICATION_UNKNOWN: i64 = -1;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Registration or encoding failed.
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// Prometheus metrics registry for vibration monitoring.
///
/// Cloning is cheap; clones update the same underlying metrics.
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Registry,

    // Capture metrics
    samples_total: IntCounter,
    last_intensity: Gauge,
    runs_total: IntCounter,
    aborted_runs_total: IntCounter,

    // Health metrics
    health_score: Gauge,
    health_classification: IntGauge,
    spike_active: IntGauge,
}

impl MetricsRegistry {
    /// Creates a new metrics registry with all monitoring metrics registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let samples_total = IntCounter::new(
            "vibration_monitor_samples_total",
            "Total number of intensity samples captured",
        )?;
        let last_intensity = Gauge::new(
            "vibration_monitor_last_intensity",
            "Most recent vibration intensity",
        )?;
        let runs_total = IntCounter::new(
            "vibration_monitor_capture_runs_total",
            "Total number of capture runs started",
        )?;
        let aborted_runs_total = IntCounter::new(
            "vibration_monitor_capture_aborted_total",
            "Capture runs that ended with an error",
        )?;

        let health_score = Gauge::new(
            "vibration_monitor_health_score",
            "Latest machine health score (0-100)",
        )?;
        let health_classification = IntGauge::new(
            "vibration_monitor_health_classification",
            "Latest classification (-1=unknown, 0=normal, 1=warning, 2=fault)",
        )?;
        health_classification.set(CLASSIFICATION_UNKNOWN);
        let spike_active = IntGauge::new(
            "vibration_monitor_spike_active",
            "Whether the latest sample exceeded the threshold (1=yes)",
        )?;

        registry.register(Box::new(samples_total.clone()))?;
        registry.register(Box::new(last_intensity.clone()))?;
        registry.register(Box::new(runs_total.clone()))?;
        registry.register(Box::new(aborted_runs_total.clone()))?;
        registry.register(Box::new(health_score.clone()))?;
        registry.register(Box::new(health_classification.clone()))?;
        registry.register(Box::new(spike_active.clone()))?;

        Ok(Self {
            registry,
            samples_total,
            last_intensity,
            runs_total,
            aborted_runs_total,
            health_score,
            health_classification,
            spike_active,
        })
    }

    /// Records one captured sample.
    pub fn record_sample(&self, intensity: f64) {
        self.samples_total.inc();
        self.last_intensity.set(intensity);
    }

    /// Records the end of a capture run.
    pub fn record_run(&self, report: &CaptureReport) {
        self.runs_total.inc();
        if let Outcome::Aborted(_) = report.outcome {
            self.aborted_runs_total.inc();
        }
    }

    /// Publishes a health assessment.
    pub fn record_health(&self, health: &HealthAssessment) {
        self.health_score.set(health.score);
        self.health_classification.set(match health.classification {
            Classification::Normal => 0,
            Classification::Warning => 1,
            Classification::Fault => 2,
        });
        self.spike_active.set(i64::from(health.spike.is_some()));
    }

    /// Marks health as unknown, e.g. when the log holds no samples.
    pub fn clear_health(&self) {
        self.health_score.set(0.0);
        self.health_classification.set(CLASSIFICATION_UNKNOWN);
        self.spike_active.set(0);
    }

    fn publish(
        &self,
        result: Result<HealthAssessment, HealthError>,
    ) -> Option<HealthAssessment> {
        match result {
            Ok(health) => {
                self.record_health(&health);
                Some(health)
            }
            Err(e) => {
                tracing::debug!(error = %e, "Health unavailable");
                self.clear_health();
                None
            }
        }
    }

    /// Re-evaluates health from the log and publishes it.
    ///
    /// Returns `None`, with health marked unknown, if the log cannot be
    /// read or holds no samples.
    pub fn refresh_health(
        &self,
        log: &SeriesLog,
        config: &HealthConfig,
    ) -> Option<HealthAssessment> {
        match log.read_all() {
            Ok(read) => self.publish(HealthTracker::new(read.series, config).evaluate()),
            Err(e) => {
                tracing::warn!(error = %e, "Cannot refresh health metrics");
                self.clear_health();
                None
            }
        }
    }

    /// Returns a sink that feeds captured samples into this registry.
    pub fn sink(&self) -> MetricsSink {
        MetricsSink {
            registry: self.clone(),
            health: None,
        }
    }

    /// Returns a sink that also keeps the health gauges current.
    ///
    /// `history` is the series already on disk. Each captured sample is
    /// added to it and the whole series is re-scored under `config`.
    pub fn health_sink(&self, history: Series, config: &HealthConfig) -> MetricsSink {
        let tracker = HealthTracker::new(history, config);
        self.publish(tracker.evaluate());
        MetricsSink {
            registry: self.clone(),
            health: Some(tracker),
        }
    }

    /// Returns the underlying Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

/// Running health state for a capture in progress.
#[derive(Clone)]
struct HealthTracker {
    evaluator: HealthEvaluator,
    threshold: f64,
    window: usize,
    series: Series,
}

impl HealthTracker {
    fn new(series: Series, config: &HealthConfig) -> Self {
        Self {
            evaluator: HealthEvaluator::new(config.policy),
            threshold: config.threshold,
            window: config.window,
            series,
        }
    }

    fn evaluate(&self) -> Result<HealthAssessment, HealthError> {
        self.evaluator.evaluate(&self.series, self.threshold, self.window)
    }
}

/// Sample sink that updates capture metrics.
#[derive(Clone)]
pub struct MetricsSink {
    registry: MetricsRegistry,
    health: Option<HealthTracker>,
}

impl SampleSink for MetricsSink {
    fn notify(&mut self, timestamp: NaiveDateTime, intensity: f64) -> Result<(), SinkError> {
        self.registry.record_sample(intensity);
        if let Some(tracker) = &mut self.health {
            tracker.series.push(Sample::new(timestamp, intensity));
            self.registry.publish(tracker.evaluate());
        }
        Ok(())
    }
}
