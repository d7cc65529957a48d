//! Append-only series log.
//!
//! The log is a CSV table: one `timestamp,intensity` header followed by
//! one row per sample. Each row is flushed with a single write on an
//! append-mode handle, and readers only accept newline-terminated rows,
//! so a reader racing a writer sees either the whole row or none of it.
//!
//! Only one writer may hold a log at a time. The writer takes an exclusive
//! OS lock on the log file itself, which the kernel drops when the handle
//! is closed or the process dies.

use super::sample::{is_header, Sample, Series, HEADER_FIELDS};
use std::fs::{self, File, OpenOptions, TryLockError};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while reading or writing the log.
#[derive(Debug, Error)]
pub enum LogError {
    /// The log exists but could not be read.
    #[error("failed to read series log {path}: {source}")]
    Read {
        /// Log file.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },
    /// A row or the header could not be written.
    #[error("failed to write series log {path}: {source}")]
    Write {
        /// Log file.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },
    /// Another handle holds the writer lock.
    #[error("series log {path} already has an active writer")]
    WriterBusy {
        /// Log file.
        path: PathBuf,
    },
    /// The sample is NaN, infinite or negative.
    #[error("refusing to log invalid intensity {0}")]
    InvalidSample(f64),
}

/// What the reader found on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreStatus {
    /// No log file exists yet.
    Missing,
    /// The file exists but holds no samples.
    Empty,
    /// At least one sample was read.
    Populated,
}

/// Result of a successful read.
#[derive(Debug, Clone)]
pub struct SeriesRead {
    /// Whether the store was missing, empty or populated.
    pub status: StoreStatus,
    /// Samples in append order.
    pub series: Series,
    /// Complete rows that could not be parsed and were dropped.
    pub skipped_rows: usize,
}

impl SeriesRead {
    fn missing() -> Self {
        Self {
            status: StoreStatus::Missing,
            series: Series::default(),
            skipped_rows: 0,
        }
    }

    /// True if there is nothing to show yet.
    pub fn has_no_data(&self) -> bool {
        self.status != StoreStatus::Populated
    }
}

/// Handle on a series log file.
#[derive(Debug, Clone)]
pub struct SeriesLog {
    path: PathBuf,
}

impl SeriesLog {
    /// Creates a handle. Nothing is opened until a read or write.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Location of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every sample in append order.
    pub fn read_all(&self) -> Result<SeriesRead, LogError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(SeriesRead::missing()),
            Err(source) => {
                return Err(LogError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        // Anything after the last newline is a row still being written.
        let complete = match bytes.iter().rposition(|&b| b == b'\n') {
            Some(pos) => &bytes[..=pos],
            None => &[][..],
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(complete);

        let mut samples = Vec::new();
        let mut skipped_rows = 0;
        for record in reader.records() {
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    tracing::debug!(error = %e, "Unreadable series row");
                    skipped_rows += 1;
                    continue;
                }
            };
            // Older logs repeat the header at the start of every run.
            if is_header(&record) || record.iter().all(str::is_empty) {
                continue;
            }
            match Sample::from_record(&record) {
                Some(sample) => samples.push(sample),
                None => skipped_rows += 1,
            }
        }

        if skipped_rows > 0 {
            tracing::warn!(
                path = %self.path.display(),
                skipped_rows,
                "Dropped unparsable rows from series log"
            );
        }

        let status = if samples.is_empty() {
            StoreStatus::Empty
        } else {
            StoreStatus::Populated
        };
        Ok(SeriesRead {
            status,
            series: Series::new(samples),
            skipped_rows,
        })
    }

    /// Reads the last `n` samples.
    pub fn read_tail(&self, n: usize) -> Result<SeriesRead, LogError> {
        let mut read = self.read_all()?;
        let tail = read.series.tail(n).to_vec();
        read.series = Series::new(tail);
        Ok(read)
    }

    /// Opens the log for appending, taking the writer lock.
    ///
    /// The header is written only if the file is new or empty.
    pub fn writer(&self) -> Result<SeriesWriter, LogError> {
        let write_err = |source| LogError::Write {
            path: self.path.clone(),
            source,
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&self.path)
            .map_err(write_err)?;
        self.lock(&file)?;

        let len = file.metadata().map_err(write_err)?.len();
        let fresh = len == 0;
        if !fresh && !ends_with_newline(&mut file, len).map_err(write_err)? {
            // Isolate a fragment left by an interrupted writer.
            file.write_all(b"\n").map_err(write_err)?;
            tracing::warn!(path = %self.path.display(), "Series log ended mid-row");
        }

        let mut writer = SeriesWriter {
            rows: csv::WriterBuilder::new()
                .has_headers(false)
                .terminator(csv::Terminator::Any(b'\n'))
                .from_writer(file),
            path: self.path.clone(),
            rows_written: 0,
        };
        if fresh {
            writer.write_row(&HEADER_FIELDS)?;
            tracing::debug!(path = %self.path.display(), "Wrote series header");
        }
        Ok(writer)
    }

    /// Discards every sample, leaving an empty store.
    ///
    /// Fails with `WriterBusy` while a capture is appending.
    pub fn reset(&self) -> Result<(), LogError> {
        let write_err = |source| LogError::Write {
            path: self.path.clone(),
            source,
        };
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&self.path)
            .map_err(write_err)?;
        self.lock(&file)?;
        file.set_len(0).map_err(write_err)?;
        tracing::info!(path = %self.path.display(), "Series log reset");
        Ok(())
    }

    /// Takes the exclusive writer lock on `file`, held until it is closed.
    fn lock(&self, file: &File) -> Result<(), LogError> {
        match file.try_lock() {
            Ok(()) => Ok(()),
            Err(TryLockError::WouldBlock) => Err(LogError::WriterBusy {
                path: self.path.clone(),
            }),
            Err(TryLockError::Error(source)) => Err(LogError::Write {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

fn ends_with_newline(file: &mut File, len: u64) -> io::Result<bool> {
    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

/// Exclusive appender for a series log.
///
/// Holds the writer lock for as long as it lives.
pub struct SeriesWriter {
    rows: csv::Writer<File>,
    path: PathBuf,
    rows_written: u64,
}

impl std::fmt::Debug for SeriesWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeriesWriter")
            .field("path", &self.path)
            .field("rows_written", &self.rows_written)
            .finish()
    }
}

impl SeriesWriter {
    /// Appends one sample as a single row.
    pub fn append(&mut self, sample: &Sample) -> Result<(), LogError> {
        if !sample.is_valid() {
            return Err(LogError::InvalidSample(sample.intensity));
        }
        self.write_row(&sample.to_record())?;
        self.rows_written += 1;
        Ok(())
    }

    /// Rows appended through this writer.
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Location of the log being written.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Encodes one record and flushes it in a single write.
    fn write_row<T: AsRef<[u8]>>(&mut self, fields: &[T]) -> Result<(), LogError> {
        self.rows
            .write_record(fields)
            .map_err(io::Error::from)
            .and_then(|_| self.rows.flush())
            .map_err(|source| LogError::Write {
                path: self.path.clone(),
                source,
            })
    }
}
