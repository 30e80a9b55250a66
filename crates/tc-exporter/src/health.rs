//! Health, readiness and liveness reporting.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tc_metrics::{CollectorRegistry, TcSource};
use tracing::{debug, info};

/// Status of a passing check.
pub const CHECK_OK: &str = "ok";
/// Status of a failing check.
pub const CHECK_FAILED: &str = "failed";

/// Outcome of one health checker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckDetail {
    /// `ok` or `failed`.
    pub status: String,
    /// Human-readable summary.
    pub message: String,
    /// The failure, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckDetail {
    fn passed() -> Self {
        Self {
            status: CHECK_OK.to_string(),
            message: "Health check passed".to_string(),
            error: None,
        }
    }

    fn failed(error: String) -> Self {
        Self {
            status: CHECK_FAILED.to_string(),
            message: "Health check failed".to_string(),
            error: Some(error),
        }
    }
}

/// Body of every health endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    /// `healthy`, `unhealthy`, `ready`, `not ready` or `alive`.
    pub status: String,
    /// RFC 3339 UTC time the status was produced.
    pub timestamp: String,
    /// Exporter version.
    pub version: String,
    /// Time since the exporter started.
    pub uptime: String,
    /// Per-checker results, keyed by checker name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, CheckDetail>,
}

/// A named health check.
pub trait HealthChecker: Send + Sync {
    /// Key of this checker in [`HealthStatus::details`].
    fn name(&self) -> &str;

    /// Runs the check.
    fn check(&self) -> Result<(), String>;
}

/// Checks that the data source can enumerate namespaces.
pub struct TcSourceChecker {
    source: Arc<dyn TcSource>,
}

impl TcSourceChecker {
    /// Checks `source`.
    pub fn new(source: Arc<dyn TcSource>) -> Self {
        Self { source }
    }
}

impl HealthChecker for TcSourceChecker {
    fn name(&self) -> &str {
        "tc"
    }

    fn check(&self) -> Result<(), String> {
        let namespaces = self.source.list_namespaces().map_err(|e| e.to_string())?;
        debug!(namespaces = namespaces.len(), "TC health check passed");
        Ok(())
    }
}

/// Checks that at least one collector is enabled.
pub struct CollectorsChecker {
    registry: Arc<CollectorRegistry>,
}

impl CollectorsChecker {
    /// Checks `registry`.
    pub fn new(registry: Arc<CollectorRegistry>) -> Self {
        Self { registry }
    }
}

impl HealthChecker for CollectorsChecker {
    fn name(&self) -> &str {
        "metrics"
    }

    fn check(&self) -> Result<(), String> {
        if self.registry.enabled_collectors().is_empty() {
            return Err("no collectors enabled".to_string());
        }
        Ok(())
    }
}

/// Tracks uptime and readiness and runs the registered checkers.
pub struct HealthManager {
    started: Instant,
    version: String,
    checkers: RwLock<Vec<Arc<dyn HealthChecker>>>,
    ready: AtomicBool,
}

impl std::fmt::Debug for HealthManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthManager")
            .field("version", &self.version)
            .field("checkers", &self.checkers.read().len())
            .field("ready", &self.is_ready())
            .finish_non_exhaustive()
    }
}

impl HealthManager {
    /// Starts the uptime clock. The service begins not ready.
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            started: Instant::now(),
            version: version.into(),
            checkers: RwLock::new(Vec::new()),
            ready: AtomicBool::new(false),
        }
    }

    /// Adds a checker to the `/health` endpoint.
    pub fn register_checker(&self, checker: Arc<dyn HealthChecker>) {
        self.checkers.write().push(checker);
    }

    /// Marks the service ready or not ready.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
        info!(ready, "Service readiness changed");
    }

    /// Whether the service accepts traffic.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Time since start, rounded down to whole seconds.
    pub fn uptime(&self) -> String {
        let elapsed = Duration::from_secs(self.started.elapsed().as_secs());
        humantime::format_duration(elapsed).to_string()
    }

    fn status(&self, status: &str, details: BTreeMap<String, CheckDetail>) -> HealthStatus {
        HealthStatus {
            status: status.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            version: self.version.clone(),
            uptime: self.uptime(),
            details,
        }
    }

    /// Runs every checker. Returns whether all passed, and the report.
    pub fn health(&self) -> (bool, HealthStatus) {
        let checkers = self.checkers.read().clone();
        let mut healthy = true;
        let mut details = BTreeMap::new();

        for checker in checkers {
            let detail = match checker.check() {
                Ok(()) => CheckDetail::passed(),
                Err(e) => {
                    healthy = false;
                    CheckDetail::failed(e)
                }
            };
            details.insert(checker.name().to_string(), detail);
        }

        let status = if healthy { "healthy" } else { "unhealthy" };
        (healthy, self.status(status, details))
    }

    /// Readiness report.
    pub fn readiness(&self) -> (bool, HealthStatus) {
        let ready = self.is_ready();
        let status = if ready { "ready" } else { "not ready" };
        (ready, self.status(status, BTreeMap::new()))
    }

    /// Liveness report. Always alive.
    pub fn liveness(&self) -> HealthStatus {
        self.status("alive", BTreeMap::new())
    }
}
