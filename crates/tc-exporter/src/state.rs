//! Shared state for the HTTP handlers.

use std::sync::Arc;

use tc_ratelimit::RateLimiter;

use crate::health::HealthManager;
use crate::metrics::ExporterRegistry;

/// Shared state for the exporter server.
#[derive(Debug)]
pub struct AppState {
    /// Registry served on the metrics path.
    registry: Arc<ExporterRegistry>,
    /// Health and readiness tracking.
    health: Arc<HealthManager>,
    /// Scrape rate limiter, when enabled.
    limiter: Option<Arc<RateLimiter>>,
    /// Path the metrics are served under.
    metrics_path: String,
}

impl AppState {
    /// Creates the state without a rate limiter.
    pub fn new(
        registry: Arc<ExporterRegistry>,
        health: Arc<HealthManager>,
        metrics_path: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            health,
            limiter: None,
            metrics_path: metrics_path.into(),
        }
    }

    /// Guards the metrics path with `limiter`.
    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// The exporter registry.
    pub fn registry(&self) -> &Arc<ExporterRegistry> {
        &self.registry
    }

    /// The health manager.
    pub fn health(&self) -> &Arc<HealthManager> {
        &self.health
    }

    /// The rate limiter, if scrapes are limited.
    pub fn limiter(&self) -> Option<&Arc<RateLimiter>> {
        self.limiter.as_ref()
    }

    /// Path the metrics are served under.
    pub fn metrics_path(&self) -> &str {
        &self.metrics_path
    }
}
