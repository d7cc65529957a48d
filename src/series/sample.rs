//! Timestamped intensity samples and their CSV record layout.

use chrono::{Local, NaiveDateTime, SubsecRound};
use csv::StringRecord;

/// Header row of the series file.
pub const HEADER: &str = "timestamp,intensity";

/// Header row split into its fields.
pub const HEADER_FIELDS: [&str; 2] = ["timestamp", "intensity"];

/// Timestamp layout used in every row.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One intensity reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Local wall-clock time, second resolution.
    pub timestamp: NaiveDateTime,
    /// Mean absolute luminance difference, never negative.
    pub intensity: f64,
}

impl Sample {
    /// Creates a sample, dropping any sub-second part of `timestamp`.
    pub fn new(timestamp: NaiveDateTime, intensity: f64) -> Self {
        Self {
            timestamp: timestamp.trunc_subsecs(0),
            intensity,
        }
    }

    /// Stamps `intensity` with the current local time.
    pub fn now(intensity: f64) -> Self {
        Self::new(Local::now().naive_local(), intensity)
    }

    /// True if the intensity is a finite, non-negative number.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.intensity.is_finite() && self.intensity >= 0.0
    }

    /// Fields of the data row for this sample.
    pub fn to_record(&self) -> [String; 2] {
        [
            self.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            format!("{:.2}", self.intensity),
        ]
    }

    /// Decodes a data row. Headers and malformed rows give `None`.
    pub fn from_record(record: &StringRecord) -> Option<Self> {
        if record.len() != 2 {
            return None;
        }
        let timestamp =
            NaiveDateTime::parse_from_str(record.get(0)?.trim(), TIMESTAMP_FORMAT).ok()?;
        let intensity: f64 = record.get(1)?.trim().parse().ok()?;
        let sample = Self {
            timestamp,
            intensity,
        };
        sample.is_valid().then_some(sample)
    }
}

/// True if `record` is the header row.
pub(crate) fn is_header(record: &StringRecord) -> bool {
    record.iter().map(str::trim).eq(HEADER_FIELDS)
}

/// Ordered sequence of samples as read from the log.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    samples: Vec<Sample>,
}

impl Series {
    /// Wraps samples already in append order.
    pub fn new(samples: Vec<Sample>) -> Self {
        Self { samples }
    }

    /// All samples, oldest first.
    #[inline]
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Number of samples.
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True if the series holds no samples.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Appends a sample at the end.
    pub fn push(&mut self, sample: Sample) {
        self.samples.push(sample);
    }

    /// Most recent sample.
    pub fn latest(&self) -> Option<&Sample> {
        self.samples.last()
    }

    /// The last `n` samples, oldest first.
    pub fn tail(&self, n: usize) -> &[Sample] {
        let start = self.samples.len().saturating_sub(n);
        &self.samples[start..]
    }

    /// Intensity values in append order.
    pub fn intensities(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().map(|s| s.intensity)
    }

    /// True if timestamps never go backwards.
    pub fn is_chronological(&self) -> bool {
        self.samples
            .windows(2)
            .all(|w| w[0].timestamp <= w[1].timestamp)
    }
}

impl From<Vec<Sample>> for Series {
    fn from(samples: Vec<Sample>) -> Self {
        Self::new(samples)
    }
}

impl FromIterator<Sample> for Series {
    fn from_iter<I: IntoIterator<Item = Sample>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Timelike};

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_milli_opt(h, m, s, 750)
            .unwrap()
    }

    fn record(fields: &[&str]) -> StringRecord {
        StringRecord::from(fields.to_vec())
    }

    #[test]
    fn test_record_fields() {
        let sample = Sample::new(at(14, 5, 9), 3.14159);
        assert_eq!(sample.to_record(), ["2024-03-09 14:05:09", "3.14"]);
    }

    #[test]
    fn test_timestamps_truncated_to_seconds() {
        let sample = Sample::new(at(1, 2, 3), 1.0);
        assert_eq!(sample.timestamp.nanosecond(), 0);
    }

    #[test]
    fn test_from_record() {
        let sample =
            Sample::from_record(&record(&["2024-03-09 14:05:09", " 12.50"])).unwrap();
        assert_eq!(sample.timestamp, at(14, 5, 9).trunc_subsecs(0));
        assert_eq!(sample.intensity, 12.5);
    }

    #[test]
    fn test_from_record_rejects_garbage() {
        assert!(Sample::from_record(&record(&HEADER_FIELDS)).is_none());
        assert!(Sample::from_record(&record(&["2024-03-09 14:05:09"])).is_none());
        assert!(Sample::from_record(&record(&["2024-03-09 14:05:09", "-1.00"])).is_none());
        assert!(Sample::from_record(&record(&["2024-03-09 14:05:09", "NaN"])).is_none());
        assert!(Sample::from_record(&record(&["yesterday", "1.00"])).is_none());
        assert!(Sample::from_record(&record(&["2024-03-09 14:05:09", "1.0", "x"])).is_none());
    }

    #[test]
    fn test_header_detection() {
        assert!(is_header(&record(&["timestamp", "intensity"])));
        assert!(is_header(&record(&[" timestamp", "intensity "])));
        assert!(!is_header(&record(&["timestamp"])));
        assert!(!is_header(&record(&["2024-03-09 14:05:09", "1.00"])));
    }

    #[test]
    fn test_validity() {
        assert!(Sample::new(at(0, 0, 0), 0.0).is_valid());
        assert!(!Sample::new(at(0, 0, 0), -0.5).is_valid());
        assert!(!Sample::new(at(0, 0, 0), f64::INFINITY).is_valid());
        assert!(!Sample::new(at(0, 0, 0), f64::NAN).is_valid());
    }

    #[test]
    fn test_tail_and_latest() {
        let series: Series = (0..5).map(|i| Sample::new(at(0, 0, i), i as f64)).collect();

        assert_eq!(series.tail(2).len(), 2);
        assert_eq!(series.tail(2)[0].intensity, 3.0);
        assert_eq!(series.tail(10).len(), 5);
        assert_eq!(series.latest().unwrap().intensity, 4.0);
        assert!(series.is_chronological());
    }
}
