//! Tracing subscriber setup driven by the `log` config section.

use std::path::Path;

use tc_config::LogConfig;
use tc_config::validate::parse_size;
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{Builder, RollingFileAppender, Rotation};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Registry, fmt, reload};

use crate::error::{ExporterError, ExporterResult};

const DEFAULT_LEVEL: &str = "info";

/// Keeps the file writer alive and allows changing the level at runtime.
pub struct LoggingHandle {
    filter: reload::Handle<EnvFilter, Registry>,
    _guard: Option<WorkerGuard>,
}

impl std::fmt::Debug for LoggingHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggingHandle").finish_non_exhaustive()
    }
}

impl LoggingHandle {
    /// Switches to `level`. `RUST_LOG`, when set, keeps precedence.
    pub fn set_level(&self, level: &str) -> ExporterResult<()> {
        if std::env::var_os(EnvFilter::DEFAULT_ENV).is_some() {
            debug!(level, "RUST_LOG is set, keeping the current filter");
            return Ok(());
        }
        self.filter
            .reload(level_filter(level))
            .map_err(|e| ExporterError::Logging(e.to_string()))
    }
}

fn level_filter(level: &str) -> EnvFilter {
    let level = if level.is_empty() { DEFAULT_LEVEL } else { level };
    EnvFilter::new(level.to_ascii_lowercase())
}

fn initial_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| level_filter(level))
}

/// Installs the global subscriber: stdout always, plus a daily-rotated file
/// when `log_path` is set.
pub fn init(config: &LogConfig) -> ExporterResult<LoggingHandle> {
    let (filter, handle) = reload::Layer::new(initial_filter(&config.level));

    let (file_layer, guard) = if config.log_path.is_empty() {
        (None, None)
    } else {
        let (writer, guard) = tracing_appender::non_blocking(file_appender(config)?);
        let layer = fmt::layer().with_ansi(false).with_writer(writer);
        (Some(layer), Some(guard))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .try_init()
        .map_err(|e| ExporterError::Logging(e.to_string()))?;

    if let Some(bytes) = parse_size(&config.max_size) {
        debug!(max_size = bytes, "Log file size limit is advisory");
    }
    info!(
        level = %config.level,
        path = %config.log_path,
        retained_files = config.retained_files(),
        "Logging initialized"
    );

    Ok(LoggingHandle {
        filter: handle,
        _guard: guard,
    })
}

fn file_appender(config: &LogConfig) -> ExporterResult<RollingFileAppender> {
    let path = Path::new(&config.log_path);
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let prefix = path.file_name().ok_or_else(|| {
        ExporterError::Logging(format!("log path has no file name: {}", config.log_path))
    })?;

    Builder::new()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix.to_string_lossy())
        .max_log_files(config.retained_files())
        .build(dir)
        .map_err(|e| ExporterError::Logging(format!("failed to open {}: {e}", config.log_path)))
}
