//! Capture loop and live notification.
//!
//! `Monitor` is the only writer of a series. It runs a single capture at a
//! time, and the log's writer lock rejects a second monitor pointed at the
//! same file.

mod session;
mod sink;

pub use session::{
    CancelToken, CaptureError, CaptureReport, CaptureRequest, CaptureState, Completion, Monitor,
    Outcome, DEFAULT_MIN_INTERVAL,
};
pub use sink::{NoopSink, SampleSink, SinkError};
