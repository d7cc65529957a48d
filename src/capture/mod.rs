//! Video stream input and frame handling.
//!
//! This module provides abstractions for pulling frames from a camera
//! stream and for configuring capture. The stream itself is treated as
//! an opaque source reachable by address.

mod config;
mod frame;
#[cfg(feature = "mjpeg")]
mod mjpeg;
mod source;

pub use config::{CaptureConfig, ConfigError, FileConfig, HealthConfig, LogConfig, OutputConfig};
pub use frame::{Frame, PixelFormat};
#[cfg(feature = "mjpeg")]
pub use mjpeg::{MjpegReader, MjpegSource};
pub use source::{FrameSource, MockSource, SourceError, SourceGuard};
