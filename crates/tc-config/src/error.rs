//! Error types for configuration loading and reloading.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Every message produced by one validation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(Vec<String>);

impl ValidationErrors {
    /// Creates an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one failure.
    pub fn push(&mut self, message: impl Into<String>) {
        self.0.push(message.into());
    }

    /// Returns true if nothing failed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The individual messages in check order.
    #[must_use]
    pub fn messages(&self) -> &[String] {
        &self.0
    }

    /// Converts into a `Result`, failing if any message was recorded.
    pub fn into_result(self) -> std::result::Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "configuration validation failed:\n{}", self.0.join("\n"))
    }
}

impl std::error::Error for ValidationErrors {}

/// Errors that can occur while loading, reloading or watching the config.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The backing file does not exist.
    #[error("config file not found: {}", path.display())]
    NotFound {
        /// Path that was looked up.
        path: PathBuf,
    },

    /// The file exists but could not be read.
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        /// Path of the file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid YAML for [`crate::Config`].
    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        /// Path of the file.
        path: PathBuf,
        /// Underlying parser error.
        #[source]
        source: serde_yaml::Error,
    },

    /// The file parsed but failed validation.
    #[error("config validation failed: {0}")]
    Validation(#[from] ValidationErrors),

    /// The reload callback rejected the new config; the old one was restored.
    #[error("reload callback failed: {0}")]
    Callback(String),

    /// The file watcher could not be set up.
    #[error("failed to watch config file: {0}")]
    Watch(#[from] notify::Error),

    /// `start_watching` was called while a watch loop is running.
    #[error("config watcher already running")]
    AlreadyWatching,

    /// The watch loop needs a tokio runtime.
    #[error("config watcher requires a running tokio runtime")]
    NoRuntime,
}

impl ConfigError {
    /// Returns true for a missing backing file, the one failure that callers
    /// answer by falling back to defaults.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_display() {
        let mut errors = ValidationErrors::new();
        errors.push("port validation failed: port must be between 1 and 65535, got 0");
        errors.push("metrics path validation failed: metrics path cannot be empty");

        assert_eq!(
            errors.to_string(),
            "configuration validation failed:\n\
             port validation failed: port must be between 1 and 65535, got 0\n\
             metrics path validation failed: metrics path cannot be empty"
        );
        assert_eq!(errors.messages().len(), 2);
    }

    #[test]
    fn test_into_result() {
        assert!(ValidationErrors::new().into_result().is_ok());

        let mut errors = ValidationErrors::new();
        errors.push("bad");
        assert!(errors.into_result().is_err());
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::NotFound {
            path: PathBuf::from("/etc/tc.yaml"),
        };
        assert_eq!(err.to_string(), "config file not found: /etc/tc.yaml");
        assert!(err.is_not_found());

        let err = ConfigError::Callback("listener refused".into());
        assert_eq!(err.to_string(), "reload callback failed: listener refused");
        assert!(!err.is_not_found());
    }
}
