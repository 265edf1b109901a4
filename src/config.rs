//! Configuration for the IMU event monitor.

use crate::collector::serial::{SerialSettings, DEFAULT_BAUD_RATE};
use crate::collector::types::WIRE_HEADER;
use crate::core::events::{ThresholdSet, Units};
use crate::core::series::DEFAULT_CAPACITY;
use crate::monitor::MonitorConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for the monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Unit regime of the incoming stream
    pub units: Units,

    /// Event thresholds, in the same regime as `units`
    pub thresholds: ThresholdSet,

    /// Number of samples kept for plotting
    pub buffer_capacity: usize,

    /// Renderer updates per second
    pub render_fps: u32,

    /// Serial link speed
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Longest blocking wait on the transport before the stop flag is checked
    #[serde(rename = "read_timeout_ms", with = "duration_millis")]
    pub read_timeout: Duration,

    /// Path for exporting session reports
    pub export_path: PathBuf,

    /// Path for storing cumulative statistics
    pub data_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("imu-event-monitor");

        Self {
            units: Units::Raw,
            thresholds: ThresholdSet::raw_counts(),
            buffer_capacity: DEFAULT_CAPACITY,
            render_fps: 15,
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: Duration::from_millis(100),
            export_path: data_dir.join("exports"),
            data_path: data_dir,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::IoError(e.to_string()))?;
            Self::from_json(&content)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse and validate a configuration document.
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            serde_json::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(&config_path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("imu-event-monitor")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.export_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        std::fs::create_dir_all(&self.data_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }

    /// Switch unit regime and load that regime's threshold preset.
    pub fn use_units(&mut self, units: Units) {
        self.units = units;
        self.thresholds = ThresholdSet::for_units(units);
    }

    /// Reject settings the monitor cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.thresholds.units != self.units {
            return Err(ConfigError::Invalid(format!(
                "thresholds are in {} units but the stream is {}",
                self.thresholds.units, self.units
            )));
        }
        self.thresholds.validate().map_err(ConfigError::Invalid)?;
        if self.buffer_capacity == 0 {
            return Err(ConfigError::Invalid(
                "buffer_capacity must be at least 1".to_string(),
            ));
        }
        if self.render_fps == 0 {
            return Err(ConfigError::Invalid(
                "render_fps must be at least 1".to_string(),
            ));
        }
        if self.baud_rate == 0 {
            return Err(ConfigError::Invalid(
                "baud_rate must be greater than zero".to_string(),
            ));
        }
        if self.read_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "read_timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Interval between renderer polls.
    pub fn render_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.render_fps.max(1)))
    }

    /// How to open a serial device. Device reads time out at `read_timeout`.
    pub fn serial_settings(&self) -> SerialSettings {
        SerialSettings {
            baud_rate: self.baud_rate,
            timeout: self.read_timeout,
        }
    }

    /// Settings for the producer thread.
    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            thresholds: self.thresholds,
            buffer_capacity: self.buffer_capacity,
            read_timeout: self.read_timeout,
            header: WIRE_HEADER.to_string(),
            ..MonitorConfig::default()
        }
    }
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            ConfigError::Invalid(e) => write!(f, "Invalid configuration: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration as whole milliseconds.
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
