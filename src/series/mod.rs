//! Durable time series of intensity samples.
//!
//! The log on disk is the single source of truth for everything captured.
//! Capture appends to it through a `SeriesWriter`; health queries and live
//! viewers read it through `SeriesLog`.

mod log;
mod sample;
mod summary;

pub use log::{LogError, SeriesLog, SeriesRead, SeriesWriter, StoreStatus};
pub use sample::{Sample, Series, HEADER, HEADER_FIELDS, TIMESTAMP_FORMAT};
pub use summary::SeriesSummary;
