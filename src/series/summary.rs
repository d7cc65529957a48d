//! Descriptive statistics over a series.

use super::sample::Series;

/// Count, spread and quartiles of the intensities in a series.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesSummary {
    /// Number of samples.
    pub count: usize,
    /// Arithmetic mean.
    pub mean: f64,
    /// Sample standard deviation (n - 1); zero for a single sample.
    pub std_dev: f64,
    /// Lowest intensity seen.
    pub min: f64,
    /// First quartile.
    pub p25: f64,
    /// Second quartile.
    pub median: f64,
    /// Third quartile.
    pub p75: f64,
    /// Highest intensity seen.
    pub peak: f64,
    /// Intensity of the most recent sample.
    pub current: f64,
}

impl SeriesSummary {
    /// Summarizes `series`, or returns `None` if it is empty.
    pub fn describe(series: &Series) -> Option<Self> {
        let current = series.latest()?.intensity;
        let mut values: Vec<f64> = series.intensities().collect();
        let n = values.len() as f64;

        let mean = values.iter().sum::<f64>() / n;
        let std_dev = if values.len() > 1 {
            let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
            (ss / (n - 1.0)).sqrt()
        } else {
            0.0
        };

        values.sort_by(f64::total_cmp);

        Some(Self {
            count: values.len(),
            mean,
            std_dev,
            min: values[0],
            p25: quantile(&values, 0.25),
            median: quantile(&values, 0.5),
            p75: quantile(&values, 0.75),
            peak: values[values.len() - 1],
            current,
        })
    }
}

/// Linear interpolation between closest ranks, on sorted input.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::Sample;
    use chrono::NaiveDate;

    fn series(values: &[f64]) -> Series {
        let base = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| Sample::new(base + chrono::Duration::seconds(i as i64), v))
            .collect()
    }

    #[test]
    fn test_empty_series_has_no_summary() {
        assert!(SeriesSummary::describe(&Series::default()).is_none());
    }

    #[test]
    fn test_describe() {
        let summary = SeriesSummary::describe(&series(&[4.0, 1.0, 3.0, 2.0, 5.0])).unwrap();

        assert_eq!(summary.count, 5);
        assert_eq!(summary.mean, 3.0);
        assert!((summary.std_dev - 2.5f64.sqrt()).abs() < 1e-12);
        assert_eq!(summary.min, 1.0);
        assert_eq!(summary.p25, 2.0);
        assert_eq!(summary.median, 3.0);
        assert_eq!(summary.p75, 4.0);
        assert_eq!(summary.peak, 5.0);
        assert_eq!(summary.current, 5.0);
    }

    #[test]
    fn test_single_sample() {
        let summary = SeriesSummary::describe(&series(&[7.5])).unwrap();
        assert_eq!(summary.std_dev, 0.0);
        assert_eq!(summary.median, 7.5);
        assert_eq!(summary.current, 7.5);
    }

    #[test]
    fn test_quantile_interpolates() {
        assert_eq!(quantile(&[0.0, 10.0], 0.25), 2.5);
    }
}
