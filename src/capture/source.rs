//! Frame source abstraction.
//!
//! A source is opened against a stream address, yields frames in capture
//! order and reports end of stream with `Ok(None)`. The trait lets the
//! capture loop run against a network camera or against `MockSource` in
//! tests.

use super::Frame;
use thiserror::Error;

/// Errors that can occur while talking to a frame source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The stream could not be opened.
    #[error("stream unavailable at {address}: {reason}")]
    Unavailable {
        /// Address that was tried.
        address: String,
        /// Transport-level cause.
        reason: String,
    },
    /// The transport failed mid-stream.
    #[error("failed to read frame: {0}")]
    ReadFailed(String),
    /// Bytes arrived but were not a valid image.
    #[error("failed to decode frame: {0}")]
    DecodeFailed(String),
    /// `next_frame` was called before `open`.
    #[error("source not opened")]
    NotOpened,
}

/// Trait for video stream implementations.
pub trait FrameSource {
    /// Opens the stream. Must fail fast instead of retrying.
    fn open(&mut self, address: &str) -> Result<(), SourceError>;

    /// Reads the next frame, blocking until one is available.
    ///
    /// Returns `Ok(None)` once the transport has closed.
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError>;

    /// Checks if the stream is currently open.
    fn is_open(&self) -> bool;

    /// Closes the stream and releases the handle.
    fn close(&mut self);
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn open(&mut self, address: &str) -> Result<(), SourceError> {
        (**self).open(address)
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        (**self).next_frame()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Scoped ownership of an opened source.
///
/// The source is closed when the guard drops, so early returns and
/// failed reads still release the stream.
pub struct SourceGuard<'a, S: FrameSource + ?Sized> {
    source: &'a mut S,
}

impl<'a, S: FrameSource + ?Sized> SourceGuard<'a, S> {
    /// Opens `source` against `address` and wraps it.
    pub fn open(source: &'a mut S, address: &str) -> Result<Self, SourceError> {
        source.open(address)?;
        Ok(Self { source })
    }

    /// Reads the next frame from the wrapped source.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        self.source.next_frame()
    }
}

impl<S: FrameSource + ?Sized> Drop for SourceGuard<'_, S> {
    fn drop(&mut self) {
        if self.source.is_open() {
            self.source.close();
        }
    }
}

/// Mock source for testing that generates synthetic frames.
///
/// Frames alternate between two brightness levels `amplitude` apart, so
/// every consecutive pair differs by exactly `amplitude` per pixel.
#[derive(Debug, Clone)]
pub struct MockSource {
    width: u32,
    height: u32,
    amplitude: u8,
    frame_limit: Option<u64>,
    fail_after: Option<u64>,
    refuse_open: bool,
    open: bool,
    sequence: u64,
    closed_count: u32,
}

impl Default for MockSource {
    fn default() -> Self {
        Self::new(32, 24)
    }
}

impl MockSource {
    /// Creates an unlimited source of `width` x `height` luma frames.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            amplitude: 10,
            frame_limit: None,
            fail_after: None,
            refuse_open: false,
            open: false,
            sequence: 0,
            closed_count: 0,
        }
    }

    /// Sets the per-pixel brightness step between consecutive frames.
    pub fn with_amplitude(mut self, amplitude: u8) -> Self {
        self.amplitude = amplitude;
        self
    }

    /// Ends the stream after `frames` frames.
    pub fn with_frame_limit(mut self, frames: u64) -> Self {
        self.frame_limit = Some(frames);
        self
    }

    /// Fails every read after `frames` frames were delivered.
    pub fn failing_after(mut self, frames: u64) -> Self {
        self.fail_after = Some(frames);
        self
    }

    /// Makes `open` fail as if the camera were unreachable.
    pub fn unreachable(mut self) -> Self {
        self.refuse_open = true;
        self
    }

    /// Number of times the source has been closed.
    pub fn closed_count(&self) -> u32 {
        self.closed_count
    }

    /// Number of frames delivered so far.
    pub fn frames_delivered(&self) -> u64 {
        self.sequence
    }
}

impl FrameSource for MockSource {
    fn open(&mut self, address: &str) -> Result<(), SourceError> {
        if self.refuse_open {
            return Err(SourceError::Unavailable {
                address: address.to_string(),
                reason: "connection refused".to_string(),
            });
        }
        self.open = true;
        self.sequence = 0;
        tracing::info!(address, "MockSource opened");
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        if !self.open {
            return Err(SourceError::NotOpened);
        }
        if self.fail_after.is_some_and(|n| self.sequence >= n) {
            return Err(SourceError::ReadFailed("connection reset".to_string()));
        }
        if self.frame_limit.is_some_and(|n| self.sequence >= n) {
            return Ok(None);
        }

        let level = if self.sequence % 2 == 0 {
            100
        } else {
            100u8.saturating_add(self.amplitude)
        };
        let pixels = vec![level; (self.width as usize) * (self.height as usize)];

        self.sequence += 1;
        Ok(Some(Frame::luma(pixels, self.width, self.height, self.sequence)))
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn close(&mut self) {
        self.open = false;
        self.closed_count += 1;
        tracing::info!("MockSource closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_source_lifecycle() {
        let mut source = MockSource::new(8, 8);

        assert!(!source.is_open());

        source.open("mock").unwrap();
        assert!(source.is_open());

        let frame = source.next_frame().unwrap().unwrap();
        assert!(frame.is_valid());
        assert_eq!(frame.sequence(), 1);

        let frame2 = source.next_frame().unwrap().unwrap();
        assert_eq!(frame2.sequence(), 2);

        source.close();
        assert!(!source.is_open());
    }

    #[test]
    fn test_read_without_open() {
        let mut source = MockSource::default();
        assert!(matches!(source.next_frame(), Err(SourceError::NotOpened)));
    }

    #[test]
    fn test_frame_limit_ends_stream() {
        let mut source = MockSource::new(4, 4).with_frame_limit(2);
        source.open("mock").unwrap();

        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_unreachable_fails_open() {
        let mut source = MockSource::default().unreachable();
        assert!(matches!(
            source.open("10.0.0.1"),
            Err(SourceError::Unavailable { .. })
        ));
        assert!(!source.is_open());
    }

    #[test]
    fn test_guard_closes_on_drop() {
        let mut source = MockSource::new(4, 4).failing_after(1);
        {
            let mut guard = SourceGuard::open(&mut source, "mock").unwrap();
            assert!(guard.next_frame().is_ok());
            assert!(guard.next_frame().is_err());
        }
        assert!(!source.is_open());
        assert_eq!(source.closed_count(), 1);
    }
}
