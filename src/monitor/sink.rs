//! Live sample notification.
//!
//! Sinks are a one-way side channel for viewers that want to see samples
//! as they are captured. They never hold data of their own; the log does.

use chrono::NaiveDateTime;
use thiserror::Error;

/// A sink refused or failed to deliver a sample.
#[derive(Debug, Clone, Error)]
#[error("sample sink failed: {0}")]
pub struct SinkError(pub String);

/// Receives every sample synchronously, in capture order.
pub trait SampleSink {
    fn notify(&mut self, timestamp: NaiveDateTime, intensity: f64) -> Result<(), SinkError>;
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl SampleSink for NoopSink {
    fn notify(&mut self, _timestamp: NaiveDateTime, _intensity: f64) -> Result<(), SinkError> {
        Ok(())
    }
}

impl<F> SampleSink for F
where
    F: FnMut(NaiveDateTime, f64) -> Result<(), SinkError>,
{
    fn notify(&mut self, timestamp: NaiveDateTime, intensity: f64) -> Result<(), SinkError> {
        self(timestamp, intensity)
    }
}
