//! Exporter configuration.

use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result, ValidationErrors};
use crate::validate;

/// Default bind address.
pub const DEFAULT_ADDRESS: &str = "127.0.0.1";
/// Default listen port.
pub const DEFAULT_PORT: i64 = 9062;
/// Default metrics path.
pub const DEFAULT_METRICS_PATH: &str = "/metrics";
/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "debug";
/// Default log file.
pub const DEFAULT_LOG_PATH: &str = "/var/log/tc-exporter.log";
/// Default log file size limit.
pub const DEFAULT_MAX_SIZE: &str = "10MB";
/// Default retention of rotated log files.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Logging section of the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// One of debug, info, warn, error.
    pub level: String,
    /// Log file path. Empty logs to stdout only.
    pub log_path: String,
    /// Size limit of one log file, e.g. `10MB`.
    pub max_size: String,
    /// How long rotated files are kept.
    #[serde(with = "humantime_serde")]
    pub max_age: Duration,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            log_path: DEFAULT_LOG_PATH.to_string(),
            max_size: DEFAULT_MAX_SIZE.to_string(),
            max_age: DEFAULT_MAX_AGE,
        }
    }
}

/// Top-level exporter configuration.
///
/// Values are replaced wholesale on reload and never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging settings.
    pub log: LogConfig,
    /// Address the HTTP server binds to.
    pub address: String,
    /// Port the HTTP server listens on.
    pub port: i64,
    /// Path the metrics are served under.
    #[serde(rename = "metricsPath")]
    pub metrics_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log: LogConfig::default(),
            address: DEFAULT_ADDRESS.to_string(),
            port: DEFAULT_PORT,
            metrics_path: DEFAULT_METRICS_PATH.to_string(),
        }
    }
}

impl Config {
    /// Reads, parses and validates a config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] if the file does not exist, and a
    /// read, parse or validation error otherwise.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Self = serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Parses and validates YAML without touching the filesystem.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation error.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
            path: "<inline>".into(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every field and reports all failures together.
    ///
    /// # Errors
    ///
    /// Returns the collected messages when any check fails.
    pub fn validate(&self) -> std::result::Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Err(e) = validate::address(&self.address) {
            errors.push(format!("address validation failed: {e}"));
        }
        if let Err(e) = validate::port(self.port) {
            errors.push(format!("port validation failed: {e}"));
        }
        if let Err(e) = validate::metrics_path(&self.metrics_path) {
            errors.push(format!("metrics path validation failed: {e}"));
        }
        if let Err(e) = self.log.validate() {
            errors.push(format!("logging validation failed: {e}"));
        }

        errors.into_result()
    }

    /// `address:port`, suitable for binding a listener.
    #[must_use]
    pub fn bind_address(&self) -> String {
        match self.address.parse::<IpAddr>() {
            Ok(IpAddr::V6(ip)) => format!("[{ip}]:{}", self.port),
            _ => format!("{}:{}", self.address, self.port),
        }
    }

    /// Whether the server only listens on the loopback interface.
    #[must_use]
    pub fn is_localhost(&self) -> bool {
        matches!(self.address.as_str(), "127.0.0.1" | "localhost" | "::1")
    }

    /// Whether the server binds an IP other than loopback.
    #[must_use]
    pub fn is_public(&self) -> bool {
        self.address.parse::<IpAddr>().is_ok() && !self.is_localhost()
    }
}

impl LogConfig {
    /// Checks the logging section, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns the failure message.
    pub fn validate(&self) -> std::result::Result<(), String> {
        validate::log_level(&self.level)?;
        validate::log_path(&self.log_path)?;
        validate::max_size(&self.max_size)
    }

    /// Number of daily log files to retain, at least one.
    #[must_use]
    pub fn retained_files(&self) -> usize {
        let days = self.max_age.as_secs() / (24 * 60 * 60);
        usize::try_from(days).unwrap_or(usize::MAX).max(1)
    }
}
