//! The collector registry.
//!
//! Holds every live collector and factory. Scrapes take the shared lock to
//! snapshot the enabled collectors; registration takes the exclusive lock.
//! Collection itself runs outside the lock and strictly sequentially, in
//! collector ID order.

use std::collections::{BTreeMap, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, error, info};

use crate::collector::Collector;
use crate::error::{MetricsError, Result};
use crate::factory::CollectorFactory;
use crate::sample::MetricSink;

/// Outcome of one [`CollectorRegistry::collect_all`] pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectReport {
    /// Collectors that were invoked.
    pub invoked: usize,
    /// IDs of collectors that faulted; their partial output was discarded.
    pub faulted: Vec<String>,
    /// Samples in the sink after the pass.
    pub samples: usize,
}

/// Registry of collectors and collector factories.
#[derive(Default)]
pub struct CollectorRegistry {
    collectors: RwLock<BTreeMap<String, Arc<dyn Collector>>>,
    factories: RwLock<HashMap<String, Arc<dyn CollectorFactory>>>,
}

impl std::fmt::Debug for CollectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectorRegistry")
            .field("collectors", &self.collectors.read().keys().collect::<Vec<_>>())
            .field("factories", &self.factories.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl CollectorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a collector under its ID.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::DuplicateCollector`] if the ID is taken; the
    /// existing collector is kept.
    pub fn register(&self, collector: Arc<dyn Collector>) -> Result<()> {
        let id = collector.id().to_string();
        let mut collectors = self.collectors.write();
        if collectors.contains_key(&id) {
            return Err(MetricsError::DuplicateCollector { id });
        }
        debug!(id = %id, "registered collector");
        collectors.insert(id, collector);
        Ok(())
    }

    /// Removes a collector. Unknown IDs are ignored.
    pub fn unregister(&self, id: &str) {
        if self.collectors.write().remove(id).is_some() {
            debug!(id, "unregistered collector");
        }
    }

    /// Looks up a collector by ID.
    #[must_use]
    pub fn collector(&self, id: &str) -> Option<Arc<dyn Collector>> {
        self.collectors.read().get(id).cloned()
    }

    /// Every registered collector, in ID order.
    #[must_use]
    pub fn collectors(&self) -> Vec<Arc<dyn Collector>> {
        self.collectors.read().values().cloned().collect()
    }

    /// Collectors whose enabled flag is set right now, in ID order.
    #[must_use]
    pub fn enabled_collectors(&self) -> Vec<Arc<dyn Collector>> {
        self.collectors
            .read()
            .values()
            .filter(|c| c.enabled())
            .cloned()
            .collect()
    }

    /// Number of registered collectors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.collectors.read().len()
    }

    /// Returns true if no collector is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.collectors.read().is_empty()
    }

    /// Registers a factory.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::DuplicateFactory`] if the name is taken.
    pub fn register_factory(
        &self,
        name: impl Into<String>,
        factory: Arc<dyn CollectorFactory>,
    ) -> Result<()> {
        let name = name.into();
        let mut factories = self.factories.write();
        if factories.contains_key(&name) {
            return Err(MetricsError::DuplicateFactory { name });
        }
        debug!(factory = %name, "registered factory");
        factories.insert(name, factory);
        Ok(())
    }

    /// Removes a factory. Unknown names are ignored.
    pub fn unregister_factory(&self, name: &str) {
        self.factories.write().remove(name);
    }

    /// Looks up a factory by name.
    #[must_use]
    pub fn factory(&self, name: &str) -> Option<Arc<dyn CollectorFactory>> {
        self.factories.read().get(name).cloned()
    }

    /// Builds a collector through the named factory without registering it.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::FactoryNotFound`] for unknown factories and
    /// propagates the factory's own errors.
    pub fn create_collector(&self, factory_name: &str, kind: &str) -> Result<Arc<dyn Collector>> {
        let factory = self
            .factory(factory_name)
            .ok_or_else(|| MetricsError::FactoryNotFound {
                name: factory_name.to_string(),
            })?;
        factory.create_collector(kind)
    }

    /// Builds and registers one collector per kind the named factory
    /// supports. Returns the number registered.
    ///
    /// # Errors
    ///
    /// Fails on the first factory or registration error.
    pub fn register_supported(&self, factory_name: &str) -> Result<usize> {
        let factory = self
            .factory(factory_name)
            .ok_or_else(|| MetricsError::FactoryNotFound {
                name: factory_name.to_string(),
            })?;
        let kinds = factory.supported_types();
        for kind in &kinds {
            self.register(factory.create_collector(kind)?)?;
        }
        info!(factory = factory_name, collectors = kinds.len(), "registered factory collectors");
        Ok(kinds.len())
    }

    /// Runs every enabled collector once, in ID order, pushing into `sink`.
    ///
    /// A collector that panics is logged and skipped, and any samples it
    /// pushed before faulting are removed, so the remaining collectors still
    /// produce a complete scrape.
    pub fn collect_all(&self, sink: &mut MetricSink) -> CollectReport {
        let collectors = self.enabled_collectors();
        let mut report = CollectReport::default();

        for collector in &collectors {
            let mark = sink.len();
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| collector.collect(sink)));
            report.invoked += 1;

            if let Err(payload) = outcome {
                sink.truncate(mark);
                error!(
                    collector = collector.id(),
                    panic = panic_message(payload.as_ref()),
                    "collector faulted during collection"
                );
                report.faulted.push(collector.id().to_string());
            }
        }

        report.samples = sink.len();
        report
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}
