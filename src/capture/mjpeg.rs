//! MJPEG-over-HTTP frame source.
//!
//! Phone camera apps and most IP cameras serve `multipart/x-mixed-replace`
//! streams where each part is one JPEG image. A part's `Content-Length`
//! header is used when present and consistent. Otherwise the reader walks
//! the JPEG marker segments from SOI to EOI, which also covers servers that
//! just concatenate JPEGs.

use super::{CaptureConfig, Frame, FrameSource, PixelFormat, SourceError};
use image::{DynamicImage, ImageFormat};
use std::io::Read;
use std::time::Duration;

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];
const READ_CHUNK: usize = 16 * 1024;
/// Bytes kept while no SOI is buffered; enough for a boundary and part headers.
const HEADER_WINDOW: usize = 1024;

/// Splits a byte stream into decoded JPEG frames.
pub struct MjpegReader<R> {
    inner: R,
    buffer: Vec<u8>,
    max_frame_bytes: usize,
    sequence: u64,
}

impl<R: Read> MjpegReader<R> {
    /// Wraps a response body. Frames larger than `max_frame_bytes` are errors.
    pub fn new(inner: R, max_frame_bytes: usize) -> Self {
        Self {
            inner,
            buffer: Vec::with_capacity(READ_CHUNK * 4),
            max_frame_bytes,
            sequence: 0,
        }
    }

    /// Returns the next complete JPEG image, or `None` at a clean end of stream.
    pub fn next_jpeg(&mut self) -> Result<Option<Vec<u8>>, SourceError> {
        loop {
            match find(&self.buffer, &SOI, 0) {
                Some(start) => {
                    if let Some(stop) = self.frame_end(start)? {
                        let jpeg = self.buffer[start..stop].to_vec();
                        self.buffer.drain(..stop);
                        return Ok(Some(jpeg));
                    }
                    if self.buffer.len() - start > self.max_frame_bytes {
                        return Err(self.too_large());
                    }
                }
                None => {
                    let cut = self.buffer.len().saturating_sub(HEADER_WINDOW);
                    self.buffer.drain(..cut);
                }
            }

            let mut chunk = [0u8; READ_CHUNK];
            let read = self
                .inner
                .read(&mut chunk)
                .map_err(|e| SourceError::ReadFailed(e.to_string()))?;
            if read == 0 {
                return if find(&self.buffer, &SOI, 0).is_some() {
                    Err(SourceError::ReadFailed("stream ended mid-frame".to_string()))
                } else {
                    Ok(None)
                };
            }
            self.buffer.extend_from_slice(&chunk[..read]);
        }
    }

    /// Reads and decodes the next frame.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        let Some(jpeg) = self.next_jpeg()? else {
            return Ok(None);
        };
        let image = image::load_from_memory_with_format(&jpeg, ImageFormat::Jpeg)
            .map_err(|e| SourceError::DecodeFailed(e.to_string()))?;

        self.sequence += 1;
        Ok(Some(to_frame(image, self.sequence)))
    }

    /// End offset of the image starting at `start`, once fully buffered.
    fn frame_end(&self, start: usize) -> Result<Option<usize>, SourceError> {
        if let Some(len) = content_length(&self.buffer[..start]) {
            if len > self.max_frame_bytes {
                return Err(self.too_large());
            }
            let stop = start + len;
            if self.buffer.len() < stop {
                return Ok(None);
            }
            if self.buffer[..stop].ends_with(&EOI) {
                return Ok(Some(stop));
            }
            // Some servers count the trailing CRLF; fall back to the markers.
        }

        match jpeg_end(&self.buffer, start) {
            Some(stop) if stop - start > self.max_frame_bytes => Err(self.too_large()),
            end => Ok(end),
        }
    }

    fn too_large(&self) -> SourceError {
        SourceError::ReadFailed(format!("frame exceeds {} bytes", self.max_frame_bytes))
    }
}

/// Value of the last `Content-Length` header in `headers`.
fn content_length(headers: &[u8]) -> Option<usize> {
    const NAME: &str = "content-length:";
    let text = String::from_utf8_lossy(headers).to_ascii_lowercase();
    let at = text.rfind(NAME)?;
    text[at + NAME.len()..].lines().next()?.trim().parse().ok()
}

/// Offset just past the EOI of the JPEG whose SOI is at `start`, or `None`
/// if the image is not fully buffered.
///
/// Marker segments are skipped by their length field, so a thumbnail
/// embedded in an APP segment cannot end the frame early.
fn jpeg_end(buf: &[u8], start: usize) -> Option<usize> {
    let mut i = start + SOI.len();
    loop {
        // Entropy-coded data between markers.
        if *buf.get(i)? != 0xFF {
            i += 1;
            continue;
        }
        match *buf.get(i + 1)? {
            0xD9 => return Some(i + 2),
            // Fill byte.
            0xFF => i += 1,
            // Stuffed zero, TEM, stray SOI and restart markers carry no length.
            0x00 | 0x01 | 0xD0..=0xD8 => i += 2,
            _ => {
                let len = u16::from_be_bytes([*buf.get(i + 2)?, *buf.get(i + 3)?]) as usize;
                i += 2 + len.max(2);
            }
        }
    }
}

fn to_frame(image: DynamicImage, sequence: u64) -> Frame {
    match image {
        DynamicImage::ImageLuma8(buf) => {
            let (width, height) = buf.dimensions();
            Frame::luma(buf.into_raw(), width, height, sequence)
        }
        other => {
            let buf = other.to_rgb8();
            let (width, height) = buf.dimensions();
            Frame::new(buf.into_raw(), width, height, PixelFormat::Rgb8, sequence)
        }
    }
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

/// Network camera reachable over HTTP.
pub struct MjpegSource {
    connect_timeout: Duration,
    stream_timeout: Duration,
    max_frame_bytes: usize,
    reader: Option<MjpegReader<reqwest::blocking::Response>>,
}

impl MjpegSource {
    /// Creates an unopened source with timeouts and limits from `config`.
    pub fn new(config: &CaptureConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            stream_timeout: config.stream_timeout(),
            max_frame_bytes: config.max_frame_bytes,
            reader: None,
        }
    }
}

impl FrameSource for MjpegSource {
    fn open(&mut self, address: &str) -> Result<(), SourceError> {
        let unavailable = |reason: String| SourceError::Unavailable {
            address: address.to_string(),
            reason,
        };

        let client = reqwest::blocking::Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(self.stream_timeout)
            .build()
            .map_err(|e| unavailable(e.to_string()))?;

        let response = client
            .get(address)
            .send()
            .map_err(|e| unavailable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(unavailable(format!("HTTP {}", response.status())));
        }

        tracing::info!(
            address,
            content_type = ?response.headers().get(reqwest::header::CONTENT_TYPE),
            "MJPEG stream opened"
        );
        self.reader = Some(MjpegReader::new(response, self.max_frame_bytes));
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        self.reader
            .as_mut()
            .ok_or(SourceError::NotOpened)?
            .next_frame()
    }

    fn is_open(&self) -> bool {
        self.reader.is_some()
    }

    fn close(&mut self) {
        if self.reader.take().is_some() {
            tracing::info!("MJPEG stream released");
        }
    }
}

impl Drop for MjpegSource {
    fn drop(&mut self) {
        self.close();
    }
}
