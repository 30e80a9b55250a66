//! Applies a reloaded config to the running exporter.

use std::sync::Arc;

use tc_config::Config;
use tracing::{info, warn};

use crate::logging::LoggingHandle;

/// Reacts to configs committed by the config manager.
///
/// Logging follows the new config immediately. The listener and routes are
/// fixed at startup, so address and path changes only take effect after a
/// restart.
#[derive(Debug)]
pub struct ReloadHandler {
    bind_address: String,
    metrics_path: String,
    logging: Option<Arc<LoggingHandle>>,
}

impl ReloadHandler {
    /// Remembers what the server was started with.
    pub fn new(running: &Config, logging: Option<Arc<LoggingHandle>>) -> Self {
        Self {
            bind_address: running.bind_address(),
            metrics_path: running.metrics_path.clone(),
            logging,
        }
    }

    /// Applies an already validated `config`. An error rejects the reload.
    pub fn apply(&self, config: &Config) -> Result<(), String> {
        if let Some(logging) = &self.logging {
            logging.set_level(&config.log.level).map_err(|e| e.to_string())?;
        }

        if self.requires_restart(config) {
            warn!(
                running = %self.bind_address,
                configured = %config.bind_address(),
                running_path = %self.metrics_path,
                configured_path = %config.metrics_path,
                "Listen address or metrics path changed, restart to apply"
            );
        }

        info!(level = %config.log.level, "Configuration applied");
        Ok(())
    }

    /// Whether `config` differs from the running server in a way that
    /// needs a restart.
    pub fn requires_restart(&self, config: &Config) -> bool {
        config.bind_address() != self.bind_address || config.metrics_path != self.metrics_path
    }
}
