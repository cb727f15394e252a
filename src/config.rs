//! Persistent configuration for the Theia SDK and CLI.

use crate::core::windowing::InvalidSpan;
use crate::core::PipelineSettings;
use crate::platform::PlatformConfig;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main configuration.
///
/// Fields missing from the file take their default values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// License key; `THEIA_LICENSE_KEY` or an explicit flag takes precedence
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_key: Option<String>,

    /// Selected platform and its connection settings
    pub device: PlatformConfig,

    /// Length of each cognitive load window
    #[serde(with = "duration_serde")]
    pub cog_load_window: Duration,

    /// Length of each drowsiness window
    #[serde(with = "duration_serde")]
    pub drowsiness_window: Duration,

    /// Recording time skipped before the first batch cognitive load result
    #[serde(with = "duration_serde")]
    pub cog_load_warmup: Duration,

    /// Gap between samples that starts a new window series (in seconds)
    pub session_gap_threshold_secs: u64,

    /// IANA timezone used for the time-of-day feature
    pub timezone: String,

    /// Reconnect to a networked device after the stream drops
    pub reconnect: bool,

    /// How long to wait for a networked device to accept the connection
    #[serde(with = "duration_serde")]
    pub connect_timeout: Duration,

    /// Path for exporting session snapshots
    pub export_path: PathBuf,

    /// Path for storing session statistics
    pub data_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("theia-sdk");

        Self {
            license_key: None,
            device: PlatformConfig::default(),
            cog_load_window: Duration::from_secs(5),
            drowsiness_window: Duration::from_secs(120),
            cog_load_warmup: Duration::from_secs(20),
            session_gap_threshold_secs: 30,
            timezone: "UTC".to_string(),
            reconnect: true,
            connect_timeout: Duration::from_secs(5),
            export_path: data_dir.join("exports"),
            data_path: data_dir,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from a specific file, falling back to defaults
    /// when it does not exist.
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let config: Config =
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the timezone and window settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        PipelineSettings::from_config(self).map(|_| ())
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::Io(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("theia-sdk")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.export_path).map_err(|e| ConfigError::Io(e.to_string()))?;
        std::fs::create_dir_all(&self.data_path).map_err(|e| ConfigError::Io(e.to_string()))?;
        Ok(())
    }

    /// The configured timezone.
    pub fn tz(&self) -> Result<Tz, ConfigError> {
        parse_timezone(&self.timezone)
    }

    /// Path of the persisted session statistics.
    pub fn stats_path(&self) -> PathBuf {
        self.data_path.join("session_stats.json")
    }
}

/// Parse an IANA timezone name such as `America/New_York`.
pub fn parse_timezone(name: &str) -> Result<Tz, ConfigError> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| ConfigError::InvalidTimezone(name.to_string()))
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Serialize error: {0}")]
    Serialize(String),
    #[error("Unknown timezone: {0}")]
    InvalidTimezone(String),
    #[error("Invalid setting: {0}")]
    InvalidSpan(#[from] InvalidSpan),
}

/// Serde support for Duration.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
