//! ==============================================================================
//! config.rs - Runtime Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `vitals.toml`.
//!     loads configuration from file or falls back to defaults.
//!
//! structure:
//!     - DeviceConfig: where the pulse-oximeter node lives and how long to wait.
//!     - PollingConfig: how often to poll and how many polls may overlap.
//!     - StorageConfig: sqlite file holding the reading history.
//!     - ServerConfig: bind address of the history API.
//!     - LoggingConfig: default log filter and per-reading log lines.
//!
//! every section and key is optional; missing ones take the defaults below.
//!
//! ==============================================================================

use crate::error::ConfigError;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// env var pointing at an explicit config file
pub const CONFIG_ENV: &str = "VITALS_CONFIG";

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct VitalsConfig {
    pub device: DeviceConfig,
    pub polling: PollingConfig,
    pub storage: StorageConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    /// file this config was read from (None = built-in defaults)
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DeviceConfig {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_ms: u64,
    pub max_in_flight: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub show_readings: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            host: "192.168.137.217".to_string(),
            port: 80,
            path: "/".to_string(),
            timeout_ms: 2000,
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self { interval_ms: 1000, max_in_flight: 2 }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { path: PathBuf::from("health_data.db") }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: "127.0.0.1:5000".to_string() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), show_readings: true }
    }
}

impl DeviceConfig {
    /// full url of the sensor endpoint
    pub fn url(&self) -> String {
        format!("http://{}:{}{}", self.host, self.port, self.path)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl VitalsConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        let mut config = Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.source = Some(path.to_path_buf());
        config.validate()?;

        Ok(config)
    }

    fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load from $VITALS_CONFIG, then the usual locations, then defaults.
    ///
    /// a file that exists but does not load is an error, not a fallback.
    pub fn load_or_default() -> Result<Self, ConfigError> {
        if let Ok(explicit) = std::env::var(CONFIG_ENV) {
            return Self::load(explicit);
        }

        let paths = [
            PathBuf::from("config").join("vitals.toml"),
            PathBuf::from("..").join("config").join("vitals.toml"),
        ];

        for path in &paths {
            if path.exists() {
                return Self::load(path);
            }
        }

        let config = Self::default();
        config.validate()?;
        Ok(config)
    }

    /// Reject values the poller cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device.host.trim().is_empty() {
            return Err(ConfigError::Invalid("device.host must not be empty".into()));
        }
        if !self.device.path.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "device.path must start with '/', got {:?}",
                self.device.path
            )));
        }
        if self.device.timeout_ms == 0 {
            return Err(ConfigError::Invalid("device.timeout_ms must be > 0".into()));
        }
        if self.polling.interval_ms == 0 {
            return Err(ConfigError::Invalid("polling.interval_ms must be > 0".into()));
        }
        if self.polling.max_in_flight == 0 {
            return Err(ConfigError::Invalid("polling.max_in_flight must be >= 1".into()));
        }
        Ok(())
    }

    /// Log configuration summary
    pub fn log_summary(&self) {
        let source = self
            .source
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "built-in defaults".to_string());

        info!(
            source = %source,
            device = %self.device.url(),
            timeout_ms = self.device.timeout_ms,
            interval_ms = self.polling.interval_ms,
            max_in_flight = self.polling.max_in_flight,
            store = %self.storage.path.display(),
            bind = %self.server.bind,
            "configuration loaded"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_reference_deployment() {
        let config = VitalsConfig::default();
        assert_eq!(config.device.url(), "http://192.168.137.217:80/");
        assert_eq!(config.device.timeout(), Duration::from_secs(2));
        assert_eq!(config.polling.interval(), Duration::from_secs(1));
        assert_eq!(config.polling.max_in_flight, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_keys() {
        let config = VitalsConfig::parse(
            r#"
            [device]
            host = "10.0.0.5"

            [polling]
            max_in_flight = 4
            "#,
        )
        .unwrap();

        assert_eq!(config.device.host, "10.0.0.5");
        assert_eq!(config.device.port, 80);
        assert_eq!(config.polling.max_in_flight, 4);
        assert_eq!(config.polling.interval_ms, 1000);
        assert_eq!(config.server.bind, "127.0.0.1:5000");
    }

    #[test]
    fn zero_cap_is_rejected() {
        let mut config = VitalsConfig::default();
        config.polling.max_in_flight = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let mut config = VitalsConfig::default();
        config.polling.interval_ms = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn relative_device_path_is_rejected() {
        let mut config = VitalsConfig::default();
        config.device.path = "data".into();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn load_records_source_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[storage]\npath = \"/tmp/vitals-test.db\"").unwrap();

        let config = VitalsConfig::load(file.path()).unwrap();
        assert_eq!(config.storage.path, PathBuf::from("/tmp/vitals-test.db"));
        assert_eq!(config.source.as_deref(), Some(file.path()));
    }

    #[test]
    fn broken_file_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[polling\ninterval_ms = ").unwrap();

        assert!(matches!(
            VitalsConfig::load(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }
}
