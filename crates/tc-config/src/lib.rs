//! # tc-config
//!
//! Configuration for tc-exporter: the YAML model, its validation rules, and
//! a [`ConfigManager`] that hot-reloads the file with debounce and rollback.
//!
//! # Example
//!
//! ```rust
//! use tc_config::Config;
//!
//! let config = Config::from_yaml("address: 0.0.0.0\nport: 9100\n").unwrap();
//! assert_eq!(config.bind_address(), "0.0.0.0:9100");
//! assert_eq!(config.metrics_path, "/metrics");
//!
//! assert!(Config::from_yaml("port: 99999\n").is_err());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod manager;
pub mod validate;

pub use config::{Config, LogConfig};
pub use error::{ConfigError, Result, ValidationErrors};
pub use manager::{ConfigManager, DEFAULT_RELOAD_DELAY, ReloadCallback, ReloadStats};
