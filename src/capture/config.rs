//! Capture and monitoring configuration.
//!
//! The file format is TOML with one table per concern. Every field has a
//! default, so an empty file is a valid configuration.

use crate::analysis::ScoringPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for stream capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Camera host, IP address, or full stream URL.
    pub address: String,
    /// Port used when `address` is a bare host.
    pub port: u16,
    /// Stream path used when `address` is a bare host.
    pub path: String,
    /// Capture duration in seconds.
    pub duration_secs: u64,
    /// Minimum delay between samples in milliseconds.
    pub min_interval_ms: u64,
    /// Connection timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Extra time allowed beyond `duration_secs` before a stalled stream errors out.
    pub stream_grace_secs: u64,
    /// Upper bound on the size of one encoded frame.
    pub max_frame_bytes: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            address: "192.168.43.1".to_string(),
            port: 4747, // DroidCam
            path: "/video".to_string(),
            duration_secs: 15,
            min_interval_ms: 100,
            connect_timeout_ms: 5000,
            stream_grace_secs: 10,
            max_frame_bytes: 8 * 1024 * 1024,
        }
    }
}

impl CaptureConfig {
    /// Resolves `address` into a stream URL.
    ///
    /// Addresses that already carry a scheme are used verbatim.
    pub fn stream_url(&self) -> String {
        if self.address.contains("://") {
            self.address.clone()
        } else {
            format!("http://{}:{}{}", self.address, self.port, self.path)
        }
    }

    /// Capture duration.
    #[inline]
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    /// Minimum delay between samples.
    #[inline]
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    /// Time allowed for the initial connection.
    #[inline]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Total time a stream request may stay open.
    pub fn stream_timeout(&self) -> Duration {
        self.duration() + Duration::from_secs(self.stream_grace_secs)
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.address.trim().is_empty() {
            return Err(ConfigError::MissingAddress);
        }
        if self.duration_secs == 0 {
            return Err(ConfigError::InvalidDuration);
        }
        if self.min_interval_ms == 0 {
            return Err(ConfigError::InvalidInterval);
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout);
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// `capture.address` is blank.
    #[error("stream address is empty")]
    MissingAddress,
    /// `capture.duration_secs` is zero.
    #[error("capture duration must be at least one second")]
    InvalidDuration,
    /// `capture.min_interval_ms` is zero.
    #[error("minimum sample interval must be positive")]
    InvalidInterval,
    /// `capture.connect_timeout_ms` is zero.
    #[error("connect timeout must be positive")]
    InvalidTimeout,
    /// `health.threshold` is not a positive number.
    #[error("threshold must be a positive number")]
    InvalidThreshold,
    /// `health.window` is zero.
    #[error("health window must hold at least one sample")]
    InvalidWindow,
    /// The file could not be read.
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    /// The file is not valid TOML for this format.
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

/// Full configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    /// `[capture]` section.
    #[serde(default)]
    pub capture: CaptureConfig,
    /// `[health]` section.
    #[serde(default)]
    pub health: HealthConfig,
    /// `[log]` section.
    #[serde(default)]
    pub log: LogConfig,
    /// `[output]` section.
    #[serde(default)]
    pub output: OutputConfig,
}

/// Health evaluation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Intensity above which the latest sample raises a fault.
    pub threshold: f64,
    /// Number of trailing samples used by the windowed policy.
    pub window: usize,
    /// Scoring formula.
    pub policy: ScoringPolicy,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            threshold: 40.0,
            window: 50,
            policy: ScoringPolicy::default(),
        }
    }
}

impl HealthConfig {
    /// Validates the threshold and window.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.threshold.is_finite() || self.threshold <= 0.0 {
            return Err(ConfigError::InvalidThreshold);
        }
        if self.window == 0 {
            return Err(ConfigError::InvalidWindow);
        }
        Ok(())
    }
}

/// Series log location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// CSV file holding the series.
    pub path: PathBuf,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("vibration_log.csv"),
        }
    }
}

/// Output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Print every sample to stdout while capturing.
    pub print_samples: bool,
    /// Metrics server port (0 to disable).
    pub metrics_port: u16,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            print_samples: true,
            metrics_port: 0,
        }
    }
}

impl FileConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        let config: FileConfig =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.capture.validate()?;
        self.health.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        assert!(FileConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_duration_invalid() {
        let mut config = CaptureConfig::default();
        config.duration_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidDuration)
        ));
    }

    #[test]
    fn test_bare_host_resolves_to_droidcam_url() {
        let config = CaptureConfig {
            address: "10.0.0.7".to_string(),
            ..Default::default()
        };
        assert_eq!(config.stream_url(), "http://10.0.0.7:4747/video");
    }

    #[test]
    fn test_full_url_used_verbatim() {
        let config = CaptureConfig {
            address: "http://cam.local:8080/mjpeg".to_string(),
            ..Default::default()
        };
        assert_eq!(config.stream_url(), "http://cam.local:8080/mjpeg");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: FileConfig = toml::from_str(
            r#"
            [capture]
            address = "192.168.1.20"
            duration_secs = 30

            [health]
            threshold = 25.0
            policy = "linear"
            "#,
        )
        .unwrap();

        assert_eq!(config.capture.address, "192.168.1.20");
        assert_eq!(config.capture.duration_secs, 30);
        assert_eq!(config.capture.min_interval_ms, 100);
        assert_eq!(config.health.policy, ScoringPolicy::Linear);
        assert_eq!(config.health.window, 50);
        assert_eq!(config.log.path, PathBuf::from("vibration_log.csv"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_validates() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("monitor.toml");

        std::fs::write(&path, "[log]\npath = \"/var/lib/vib.csv\"\n").unwrap();
        let config = FileConfig::from_file(&path).unwrap();
        assert_eq!(config.log.path, PathBuf::from("/var/lib/vib.csv"));

        std::fs::write(&path, "[capture]\nduration_secs = 0\n").unwrap();
        assert!(matches!(
            FileConfig::from_file(&path),
            Err(ConfigError::InvalidDuration)
        ));

        assert!(matches!(
            FileConfig::from_file(dir.path().join("missing.toml")),
            Err(ConfigError::FileReadError(_))
        ));
    }

    #[test]
    fn test_non_positive_threshold_invalid() {
        let health = HealthConfig {
            threshold: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            health.validate(),
            Err(ConfigError::InvalidThreshold)
        ));
    }
}
