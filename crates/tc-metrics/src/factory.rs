//! Collector factories.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::collector::{Collector, CollectorConfig};
use crate::error::{MetricsError, Result};
use crate::qdisc::{SUPPORTED_KINDS, build_kind_collector};
use crate::source::TcSource;

/// Builds collectors of one family by kind.
pub trait CollectorFactory: Send + Sync {
    /// Creates a collector for `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::UnsupportedKind`] for kinds outside
    /// [`CollectorFactory::supported_types`].
    fn create_collector(&self, kind: &str) -> Result<Arc<dyn Collector>>;

    /// The closed set of kinds this factory can build.
    fn supported_types(&self) -> Vec<String>;
}

/// Factory for the per-kind qdisc collectors.
///
/// Per-kind configuration overrides can be registered up front; kinds
/// without an override get every field enabled.
pub struct QdiscFactory {
    source: Arc<dyn TcSource>,
    configs: RwLock<HashMap<String, CollectorConfig>>,
}

impl std::fmt::Debug for QdiscFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdiscFactory")
            .field("overrides", &self.configs.read().len())
            .finish_non_exhaustive()
    }
}

impl QdiscFactory {
    /// Name under which the factory is usually registered.
    pub const NAME: &'static str = "qdisc";

    /// Creates a factory whose collectors read from `source`.
    pub fn new(source: Arc<dyn TcSource>) -> Self {
        Self {
            source,
            configs: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a config override for `kind`.
    pub fn add_config(&self, kind: impl Into<String>, config: CollectorConfig) {
        self.configs.write().insert(kind.into(), config);
    }

    /// Returns the override for `kind`, if any.
    #[must_use]
    pub fn config(&self, kind: &str) -> Option<CollectorConfig> {
        self.configs.read().get(kind).cloned()
    }

    /// Drops the override for `kind`.
    pub fn remove_config(&self, kind: &str) {
        self.configs.write().remove(kind);
    }
}

impl CollectorFactory for QdiscFactory {
    fn create_collector(&self, kind: &str) -> Result<Arc<dyn Collector>> {
        let collector = build_kind_collector(kind, Arc::clone(&self.source), self.config(kind))
            .ok_or_else(|| MetricsError::UnsupportedKind {
                kind: kind.to_string(),
            })?;
        debug!(kind, id = collector.id(), "created qdisc collector");
        Ok(Arc::new(collector))
    }

    fn supported_types(&self) -> Vec<String> {
        SUPPORTED_KINDS.iter().map(ToString::to_string).collect()
    }
}
