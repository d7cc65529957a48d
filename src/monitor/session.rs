//! Bounded-duration capture loop.
//!
//! A run moves through `Idle → Connecting → Running → {Completed, Aborted}`.
//! While running it reads a frame, scores it against the previous one,
//! appends the sample to the log and notifies the sink, then waits for
//! the minimum interval. Samples already appended are kept whatever way
//! the run ends.

use super::sink::SampleSink;
use crate::capture::{FileConfig, FrameSource, SourceError, SourceGuard};
use crate::estimation::IntensityEstimator;
use crate::series::{LogError, Sample, SeriesLog, SeriesWriter};
use chrono::NaiveDateTime;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Default pause between samples.
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(100);

/// Lifecycle of a capture run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// No run started yet.
    Idle,
    /// Taking the writer lock and opening the stream.
    Connecting,
    /// Sampling frames.
    Running,
    /// The last run ended normally.
    Completed,
    /// The last run ended with an error.
    Aborted,
}

/// Why a run stopped early or never started.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The stream could not be opened.
    #[error("could not connect to stream: {0}")]
    Connection(#[source] SourceError),
    /// The stream opened but the first frame never arrived.
    #[error("stream opened but delivered no frame")]
    EmptyStream,
    /// A read or decode failed after the first frame.
    #[error("stream dropped mid-run: {0}")]
    StreamDropped(String),
    /// The log could not be opened or appended to.
    #[error("failed to append sample: {0}")]
    Write(#[source] LogError),
    /// Another writer holds the log.
    #[error("another capture is writing to this log: {0}")]
    WriterBusy(#[source] LogError),
    /// Empty address or zero duration.
    #[error("invalid capture request: {0}")]
    InvalidRequest(String),
}

/// How a successful run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The requested duration passed.
    DurationElapsed,
    /// The source closed the stream.
    EndOfStream,
    /// The cancel token was set.
    Cancelled,
}

/// Final state of a run.
#[derive(Debug)]
pub enum Outcome {
    /// The run ended without error.
    Completed(Completion),
    /// The run stopped on an error.
    Aborted(CaptureError),
}

/// Summary of one capture run.
#[derive(Debug)]
pub struct CaptureReport {
    /// How the run ended.
    pub outcome: Outcome,
    /// Samples appended to the log during this run.
    pub samples_written: u64,
    /// Time spent in `Running`.
    pub elapsed: Duration,
    /// Timestamp of the first appended sample.
    pub first_sample: Option<NaiveDateTime>,
    /// Timestamp of the last appended sample.
    pub last_sample: Option<NaiveDateTime>,
}

impl CaptureReport {
    fn aborted(error: CaptureError) -> Self {
        Self {
            outcome: Outcome::Aborted(error),
            samples_written: 0,
            elapsed: Duration::ZERO,
            first_sample: None,
            last_sample: None,
        }
    }

    /// True if the run ended without error.
    pub fn is_completed(&self) -> bool {
        matches!(self.outcome, Outcome::Completed(_))
    }

    /// The error that aborted the run, if any.
    pub fn error(&self) -> Option<&CaptureError> {
        match &self.outcome {
            Outcome::Aborted(e) => Some(e),
            Outcome::Completed(_) => None,
        }
    }
}

/// Parameters of one capture run.
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    /// Stream URL handed to the source.
    pub address: String,
    /// Upper bound on the time spent sampling.
    pub duration: Duration,
}

impl CaptureRequest {
    /// Creates a request for `address` lasting at most `duration`.
    pub fn new(address: impl Into<String>, duration: Duration) -> Self {
        Self {
            address: address.into(),
            duration,
        }
    }

    /// Builds a request from the `[capture]` section of a config file.
    pub fn from_config(config: &FileConfig) -> Self {
        Self::new(config.capture.stream_url(), config.capture.duration())
    }

    fn validate(&self) -> Result<(), CaptureError> {
        if self.address.trim().is_empty() {
            return Err(CaptureError::InvalidRequest("address is empty".to_string()));
        }
        if self.duration.is_zero() {
            return Err(CaptureError::InvalidRequest(
                "duration must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Shared flag for stopping a run between samples.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates an unset token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks every run holding a clone of this token to stop.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// True once `cancel` was called.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Drives a frame source into the series log.
pub struct Monitor {
    log: SeriesLog,
    estimator: IntensityEstimator,
    min_interval: Duration,
    cancel: Option<CancelToken>,
    state: CaptureState,
}

impl Monitor {
    /// Creates an idle monitor appending to `log`.
    pub fn new(log: SeriesLog) -> Self {
        Self {
            log,
            estimator: IntensityEstimator::new(),
            min_interval: DEFAULT_MIN_INTERVAL,
            cancel: None,
            state: CaptureState::Idle,
        }
    }

    /// Creates a monitor from the `[capture]` and `[log]` config sections.
    pub fn from_config(config: &FileConfig) -> Self {
        Self::new(SeriesLog::new(&config.log.path))
            .with_min_interval(config.capture.min_interval())
    }

    /// Sets the pause between samples.
    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    /// Stops runs once `token` is cancelled.
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// State of the current or last run.
    pub fn state(&self) -> CaptureState {
        self.state
    }

    /// The log this monitor appends to.
    pub fn log(&self) -> &SeriesLog {
        &self.log
    }

    /// Runs one capture against `source`.
    ///
    /// Never returns an error directly: failures end up in the report's
    /// outcome together with the number of samples already written.
    pub fn run<S: FrameSource + ?Sized>(
        &mut self,
        source: &mut S,
        request: &CaptureRequest,
        sink: &mut dyn SampleSink,
    ) -> CaptureReport {
        self.transition(CaptureState::Connecting);
        tracing::info!(
            address = %request.address,
            duration_secs = request.duration.as_secs_f64(),
            log = %self.log.path().display(),
            "Starting capture"
        );

        let report = match request.validate() {
            Ok(()) => self.capture(source, request, sink),
            Err(e) => CaptureReport::aborted(e),
        };

        match &report.outcome {
            Outcome::Completed(how) => {
                self.transition(CaptureState::Completed);
                tracing::info!(
                    samples = report.samples_written,
                    elapsed_secs = report.elapsed.as_secs_f64(),
                    reason = ?how,
                    "Capture completed"
                );
            }
            Outcome::Aborted(error) => {
                self.transition(CaptureState::Aborted);
                tracing::error!(
                    samples = report.samples_written,
                    error = %error,
                    "Capture aborted"
                );
            }
        }
        report
    }

    fn capture<S: FrameSource + ?Sized>(
        &mut self,
        source: &mut S,
        request: &CaptureRequest,
        sink: &mut dyn SampleSink,
    ) -> CaptureReport {
        let mut writer = match self.log.writer() {
            Ok(writer) => writer,
            Err(e @ LogError::WriterBusy { .. }) => {
                return CaptureReport::aborted(CaptureError::WriterBusy(e))
            }
            Err(e) => return CaptureReport::aborted(CaptureError::Write(e)),
        };
        self.record(&mut writer, source, request, sink)
    }

    /// Connects and samples into an already locked store.
    fn record<W: SampleStore, S: FrameSource + ?Sized>(
        &mut self,
        store: &mut W,
        source: &mut S,
        request: &CaptureRequest,
        sink: &mut dyn SampleSink,
    ) -> CaptureReport {
        let mut stream = match SourceGuard::open(source, &request.address) {
            Ok(stream) => stream,
            Err(e) => return CaptureReport::aborted(CaptureError::Connection(e)),
        };

        let mut previous = match stream.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => return CaptureReport::aborted(CaptureError::EmptyStream),
            Err(e) => {
                tracing::warn!(error = %e, "First frame read failed");
                return CaptureReport::aborted(CaptureError::EmptyStream);
            }
        };

        self.transition(CaptureState::Running);
        let mut run = RunProgress::new(Instant::now());

        let outcome = loop {
            if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
                break Outcome::Completed(Completion::Cancelled);
            }
            if run.started.elapsed() >= request.duration {
                break Outcome::Completed(Completion::DurationElapsed);
            }

            let frame = match stream.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break Outcome::Completed(Completion::EndOfStream),
                Err(e) => break Outcome::Aborted(CaptureError::StreamDropped(e.to_string())),
            };

            let intensity = match self.estimator.estimate(&previous, &frame) {
                Ok(intensity) => intensity,
                Err(e) => break Outcome::Aborted(CaptureError::StreamDropped(e.to_string())),
            };

            let sample = run.stamp(intensity);
            if let Err(e) = run.append(store, sample) {
                break Outcome::Aborted(CaptureError::Write(e));
            }

            tracing::debug!(
                sequence = frame.sequence(),
                intensity,
                "Sample recorded"
            );
            if let Err(e) = sink.notify(sample.timestamp, sample.intensity) {
                tracing::warn!(error = %e, "Sample sink failed, continuing capture");
            }

            previous = frame;
            std::thread::sleep(self.min_interval);
        };

        drop(stream);
        run.finish(outcome)
    }

    fn transition(&mut self, next: CaptureState) {
        tracing::debug!(from = ?self.state, to = ?next, "Capture state change");
        self.state = next;
    }
}

/// Where a run puts its samples.
trait SampleStore {
    fn append(&mut self, sample: &Sample) -> Result<(), LogError>;
}

impl SampleStore for SeriesWriter {
    fn append(&mut self, sample: &Sample) -> Result<(), LogError> {
        SeriesWriter::append(self, sample)
    }
}

/// Bookkeeping for the `Running` phase.
struct RunProgress {
    started: Instant,
    samples_written: u64,
    first_sample: Option<NaiveDateTime>,
    last_sample: Option<NaiveDateTime>,
}

impl RunProgress {
    fn new(started: Instant) -> Self {
        Self {
            started,
            samples_written: 0,
            first_sample: None,
            last_sample: None,
        }
    }

    /// Stamps with the wall clock, never earlier than the previous sample.
    fn stamp(&self, intensity: f64) -> Sample {
        let mut sample = Sample::now(intensity);
        if let Some(last) = self.last_sample {
            if sample.timestamp < last {
                tracing::warn!(%last, now = %sample.timestamp, "Wall clock went backwards");
                sample.timestamp = last;
            }
        }
        sample
    }

    fn append<W: SampleStore>(&mut self, store: &mut W, sample: Sample) -> Result<(), LogError> {
        store.append(&sample)?;
        self.samples_written += 1;
        self.first_sample.get_or_insert(sample.timestamp);
        self.last_sample = Some(sample.timestamp);
        Ok(())
    }

    fn finish(self, outcome: Outcome) -> CaptureReport {
        CaptureReport {
            outcome,
            samples_written: self.samples_written,
            elapsed: self.started.elapsed(),
            first_sample: self.first_sample,
            last_sample: self.last_sample,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{Frame, MockSource};
    use crate::monitor::{NoopSink, SinkError};
    use crate::series::{StoreStatus, HEADER};
    use std::collections::VecDeque;
    use tempfile::TempDir;

    const LONG: Duration = Duration::from_secs(60);

    fn setup() -> (TempDir, Monitor) {
        let dir = TempDir::new().unwrap();
        let log = SeriesLog::new(dir.path().join("vibration_log.csv"));
        let monitor = Monitor::new(log).with_min_interval(Duration::from_millis(1));
        (dir, monitor)
    }

    fn request(duration: Duration) -> CaptureRequest {
        CaptureRequest::new("mock://camera", duration)
    }

    /// Source that replays a fixed list of frames.
    struct ScriptedSource {
        frames: VecDeque<Frame>,
        open: bool,
    }

    impl FrameSource for ScriptedSource {
        fn open(&mut self, _address: &str) -> Result<(), SourceError> {
            self.open = true;
            Ok(())
        }

        fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
            Ok(self.frames.pop_front())
        }

        fn is_open(&self) -> bool {
            self.open
        }

        fn close(&mut self) {
            self.open = false;
        }
    }

    #[test]
    fn test_end_of_stream_completes() {
        let (_dir, mut monitor) = setup();
        let mut source = MockSource::new(8, 8).with_amplitude(12).with_frame_limit(6);

        let report = monitor.run(&mut source, &request(LONG), &mut NoopSink);

        assert!(matches!(
            report.outcome,
            Outcome::Completed(Completion::EndOfStream)
        ));
        assert_eq!(report.samples_written, 5);
        assert_eq!(monitor.state(), CaptureState::Completed);
        assert!(!source.is_open());

        let read = monitor.log().read_all().unwrap();
        assert_eq!(read.series.len(), 5);
        assert!(read.series.intensities().all(|v| v == 12.0));
    }

    #[test]
    fn test_duration_bounds_run() {
        let (_dir, monitor) = setup();
        let mut monitor = monitor.with_min_interval(Duration::from_millis(20));
        let mut source = MockSource::new(4, 4);

        let report = monitor.run(&mut source, &request(Duration::from_millis(300)), &mut NoopSink);

        assert!(matches!(
            report.outcome,
            Outcome::Completed(Completion::DurationElapsed)
        ));
        // About 300 / 20 samples, allowing for scheduler slack.
        assert!(report.samples_written >= 4, "{}", report.samples_written);
        assert!(report.samples_written <= 16, "{}", report.samples_written);
        assert!(report.elapsed >= Duration::from_millis(300));

        let series = monitor.log().read_all().unwrap().series;
        assert_eq!(series.len() as u64, report.samples_written);
        assert!(series.is_chronological());
        assert!(!source.is_open());
    }

    #[test]
    fn test_connection_failure_writes_nothing() {
        let (_dir, mut monitor) = setup();
        let mut source = MockSource::default().unreachable();

        let report = monitor.run(&mut source, &request(LONG), &mut NoopSink);

        assert!(matches!(
            report.error(),
            Some(CaptureError::Connection(SourceError::Unavailable { .. }))
        ));
        assert_eq!(report.samples_written, 0);
        assert_eq!(monitor.state(), CaptureState::Aborted);
        assert!(monitor.log().read_all().unwrap().has_no_data());
    }

    #[test]
    fn test_empty_stream_aborts() {
        let (_dir, mut monitor) = setup();
        let mut source = MockSource::default().with_frame_limit(0);

        let report = monitor.run(&mut source, &request(LONG), &mut NoopSink);

        assert!(matches!(report.error(), Some(CaptureError::EmptyStream)));
        assert_eq!(report.samples_written, 0);
        assert!(!source.is_open());
    }

    #[test]
    fn test_dropped_stream_keeps_partial_samples() {
        let (_dir, mut monitor) = setup();
        let mut source = MockSource::new(4, 4).failing_after(4);

        let report = monitor.run(&mut source, &request(LONG), &mut NoopSink);

        assert!(matches!(
            report.error(),
            Some(CaptureError::StreamDropped(_))
        ));
        assert_eq!(report.samples_written, 3);
        assert_eq!(monitor.log().read_all().unwrap().series.len(), 3);
        assert_eq!(source.closed_count(), 1);
    }

    #[test]
    fn test_dimension_change_treated_as_drop() {
        let (_dir, mut monitor) = setup();
        let mut source = ScriptedSource {
            frames: VecDeque::from(vec![
                Frame::luma(vec![0; 4], 2, 2, 1),
                Frame::luma(vec![4; 4], 2, 2, 2),
                Frame::luma(vec![0; 9], 3, 3, 3),
            ]),
            open: false,
        };

        let report = monitor.run(&mut source, &request(LONG), &mut NoopSink);

        assert!(matches!(
            report.error(),
            Some(CaptureError::StreamDropped(_))
        ));
        assert_eq!(report.samples_written, 1);
        assert!(!source.is_open());
    }

    #[test]
    fn test_sink_sees_samples_in_order_and_failures_are_ignored() {
        let (_dir, mut monitor) = setup();
        let mut source = MockSource::new(4, 4).with_amplitude(3).with_frame_limit(5);
        let mut seen = Vec::new();
        let mut sink = |ts: NaiveDateTime, v: f64| {
            seen.push((ts, v));
            Err::<(), SinkError>(SinkError("viewer went away".to_string()))
        };

        let report = monitor.run(&mut source, &request(LONG), &mut sink);

        assert!(report.is_completed());
        assert_eq!(report.samples_written, 4);
        let logged: Vec<(NaiveDateTime, f64)> = monitor
            .log()
            .read_all()
            .unwrap()
            .series
            .samples()
            .iter()
            .map(|s| (s.timestamp, s.intensity))
            .collect();
        assert_eq!(seen, logged);
    }

    #[test]
    fn test_busy_log_rejects_second_run() {
        let (_dir, mut monitor) = setup();
        let _active = monitor.log().writer().unwrap();
        let mut source = MockSource::default().with_frame_limit(3);

        let report = monitor.run(&mut source, &request(LONG), &mut NoopSink);

        assert!(matches!(report.error(), Some(CaptureError::WriterBusy(_))));
        assert_eq!(source.frames_delivered(), 0);
        assert_eq!(source.closed_count(), 0);
    }

    #[test]
    fn test_cancel_checked_between_samples() {
        let (_dir, monitor) = setup();
        let token = CancelToken::new();
        let mut monitor = monitor.with_cancel_token(token.clone());
        let mut source = MockSource::new(4, 4);
        let mut count = 0;
        let mut sink = |_ts: NaiveDateTime, _v: f64| {
            count += 1;
            if count == 3 {
                token.cancel();
            }
            Ok::<(), SinkError>(())
        };

        let report = monitor.run(&mut source, &request(LONG), &mut sink);

        assert!(matches!(
            report.outcome,
            Outcome::Completed(Completion::Cancelled)
        ));
        assert_eq!(report.samples_written, 3);
        assert_eq!(monitor.log().read_all().unwrap().series.len(), 3);
    }

    #[test]
    fn test_runs_append_to_same_series() {
        let (_dir, mut monitor) = setup();

        for _ in 0..2 {
            let mut source = MockSource::new(4, 4).with_frame_limit(3);
            let report = monitor.run(&mut source, &request(LONG), &mut NoopSink);
            assert_eq!(report.samples_written, 2);
        }

        let read = monitor.log().read_all().unwrap();
        assert_eq!(read.status, StoreStatus::Populated);
        assert_eq!(read.series.len(), 4);
        let text = std::fs::read_to_string(monitor.log().path()).unwrap();
        assert_eq!(text.matches(HEADER).count(), 1);
    }

    #[test]
    fn test_zero_duration_rejected() {
        let (_dir, mut monitor) = setup();
        let mut source = MockSource::default();

        let report = monitor.run(&mut source, &request(Duration::ZERO), &mut NoopSink);

        assert!(matches!(
            report.error(),
            Some(CaptureError::InvalidRequest(_))
        ));
        assert!(!source.is_open());
    }

    /// Store that accepts a fixed number of rows, then fails like a full disk.
    struct FailingStore {
        accepted: Vec<Sample>,
        capacity: usize,
    }

    impl SampleStore for FailingStore {
        fn append(&mut self, sample: &Sample) -> Result<(), LogError> {
            if self.accepted.len() >= self.capacity {
                return Err(LogError::Write {
                    path: "vibration_log.csv".into(),
                    source: std::io::Error::other("no space left on device"),
                });
            }
            self.accepted.push(*sample);
            Ok(())
        }
    }

    #[test]
    fn test_write_failure_stops_run() {
        let (_dir, mut monitor) = setup();
        let mut store = FailingStore {
            accepted: Vec::new(),
            capacity: 2,
        };
        let mut source = MockSource::new(4, 4);
        let mut notified = 0;
        let mut sink = |_ts: NaiveDateTime, _v: f64| {
            notified += 1;
            Ok::<(), SinkError>(())
        };

        let report = monitor.record(&mut store, &mut source, &request(LONG), &mut sink);

        assert!(matches!(
            report.error(),
            Some(CaptureError::Write(LogError::Write { .. }))
        ));
        assert_eq!(report.samples_written, 2);
        assert_eq!(store.accepted.len(), 2);
        // The failed sample never reaches the sink and no more frames are read.
        assert_eq!(notified, 2);
        assert_eq!(source.frames_delivered(), 4);
        assert_eq!(source.closed_count(), 1);
    }

    #[test]
    fn test_first_frame_error_is_empty_stream() {
        let (_dir, mut monitor) = setup();
        let mut source = MockSource::new(4, 4).failing_after(0);

        let report = monitor.run(&mut source, &request(LONG), &mut NoopSink);

        assert!(matches!(report.error(), Some(CaptureError::EmptyStream)));
        assert_eq!(report.samples_written, 0);
        assert_eq!(monitor.state(), CaptureState::Aborted);
        assert_eq!(source.closed_count(), 1);
        assert_eq!(monitor.log().read_all().unwrap().status, StoreStatus::Empty);
    }
}
