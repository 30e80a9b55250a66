//! Qdisc and class collectors.
//!
//! Every collector in this module is a [`QdiscCollector`]: one base type that
//! walks namespaces, interfaces and objects through a [`TcSource`] and hands
//! each object to an injected [`QdiscKind`]. The kind decides whether the
//! object is relevant and which samples it produces; the base owns identity,
//! enablement, configuration and bookkeeping.

pub mod generic;
pub mod kinds;

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, trace, warn};

use crate::collector::{Collector, CollectorConfig};
use crate::error::{MetricsError, Result};
use crate::sample::{MetricDescriptor, MetricSink};
use crate::source::TcSource;
use crate::tc::{Interface, ObjectScope, TcObject};

pub use generic::{GENERIC_FIELDS, GenericStats, class_collector, qdisc_collector};
pub use kinds::{KindStats, SUPPORTED_KINDS, build_kind_collector, default_kind_config};

/// Labels carried by per-kind collectors.
pub const KIND_LABELS: &[&str] = &["namespace", "device", "kind"];

/// Labels carried by the generic collectors.
pub const GENERIC_LABELS: &[&str] = &["namespace", "device"];

/// Per-kind behavior injected into a [`QdiscCollector`].
pub trait QdiscKind: Send + Sync {
    /// Kind discriminator this behavior handles.
    fn kind(&self) -> &str;

    /// Returns true if `object` should be collected.
    fn validate(&self, object: &TcObject) -> bool;

    /// Emits samples for one object.
    fn collect_into(
        &self,
        metrics: &MetricSet,
        sink: &mut MetricSink,
        namespace: &str,
        device: &str,
        object: &TcObject,
    );
}

/// The descriptors a collector emits, keyed by short metric name.
#[derive(Debug, Clone, Default)]
pub struct MetricSet {
    entries: Vec<(String, Arc<MetricDescriptor>)>,
}

impl MetricSet {
    /// Builds descriptors named `<prefix><metric>` for every enabled metric.
    #[must_use]
    pub fn build(prefix: &str, labels: &[&str], config: &CollectorConfig) -> Self {
        let entries = config
            .enabled_metrics()
            .map(|metric| {
                let descriptor = MetricDescriptor::new(
                    format!("{prefix}{}", metric.name),
                    metric.help.clone(),
                    labels.iter().copied(),
                );
                (metric.name.clone(), Arc::new(descriptor))
            })
            .collect();
        Self { entries }
    }

    /// Iterates `(short name, descriptor)` pairs in configuration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<MetricDescriptor>)> {
        self.entries.iter().map(|(name, desc)| (name.as_str(), desc))
    }

    /// Looks up a descriptor by short name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<MetricDescriptor>> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, desc)| desc)
    }

    /// Number of descriptors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no metric is enabled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug)]
struct CollectorState {
    config: Arc<CollectorConfig>,
    metrics: MetricSet,
    last_error: Option<String>,
    last_collect: Option<DateTime<Utc>>,
}

/// Shared base for every qdisc and class collector.
pub struct QdiscCollector {
    id: String,
    name: String,
    description: String,
    scope: ObjectScope,
    metric_prefix: String,
    labels: &'static [&'static str],
    source: Arc<dyn TcSource>,
    kind: Box<dyn QdiscKind>,
    enabled: AtomicBool,
    state: RwLock<CollectorState>,
}

impl std::fmt::Debug for QdiscCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdiscCollector")
            .field("id", &self.id)
            .field("kind", &self.kind.kind())
            .field("scope", &self.scope)
            .field("enabled", &self.enabled())
            .finish_non_exhaustive()
    }
}

impl QdiscCollector {
    /// Creates a per-kind collector with id `qdisc_<kind>`, metric names
    /// `qdisc_<kind>_<metric>` and labels `(namespace, device, kind)`.
    pub fn new(
        kind: Box<dyn QdiscKind>,
        source: Arc<dyn TcSource>,
        config: CollectorConfig,
    ) -> Self {
        let kind_name = kind.kind().to_string();
        let metric_prefix = format!("qdisc_{kind_name}_");
        let metrics = MetricSet::build(&metric_prefix, KIND_LABELS, &config);
        Self {
            id: format!("qdisc_{kind_name}"),
            name: kind_name.clone(),
            description: format!("{kind_name} extended statistics"),
            scope: ObjectScope::Qdiscs,
            metric_prefix,
            labels: KIND_LABELS,
            source,
            kind,
            enabled: AtomicBool::new(config.enabled),
            state: RwLock::new(CollectorState {
                config: Arc::new(config),
                metrics,
                last_error: None,
                last_collect: None,
            }),
        }
    }

    /// Overrides the collector id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Overrides the human readable name and description.
    #[must_use]
    pub fn with_description(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        self.name = name.into();
        self.description = description.into();
        self
    }

    /// Selects which objects are walked.
    #[must_use]
    pub const fn with_scope(mut self, scope: ObjectScope) -> Self {
        self.scope = scope;
        self
    }

    /// Changes the metric name prefix and label set.
    #[must_use]
    pub fn with_naming(
        mut self,
        prefix: impl Into<String>,
        labels: &'static [&'static str],
    ) -> Self {
        self.metric_prefix = prefix.into();
        self.labels = labels;
        let state = self.state.get_mut();
        state.metrics = MetricSet::build(&self.metric_prefix, self.labels, &state.config);
        self
    }

    /// Objects this collector walks.
    #[must_use]
    pub const fn scope(&self) -> ObjectScope {
        self.scope
    }

    /// Kind discriminator of the injected behavior.
    #[must_use]
    pub fn kind(&self) -> &str {
        self.kind.kind()
    }

    /// Label names carried by every sample.
    #[must_use]
    pub const fn labels(&self) -> &'static [&'static str] {
        self.labels
    }

    fn collect_namespace(
        &self,
        metrics: &MetricSet,
        sink: &mut MetricSink,
        namespace: &str,
        last_error: &mut Option<String>,
    ) {
        let interfaces = match self.source.list_interfaces(namespace) {
            Ok(interfaces) => interfaces,
            Err(e) => {
                warn!(collector = %self.id, namespace, error = %e, "failed to list interfaces");
                *last_error = Some(e.to_string());
                return;
            }
        };

        for interface in &interfaces {
            let objects = match self.scope {
                ObjectScope::Qdiscs => self.source.list_qdiscs(namespace, interface),
                ObjectScope::Classes => self.source.list_classes(namespace, interface),
            };
            self.collect_objects(metrics, sink, namespace, interface, objects, last_error);
        }
    }

    fn collect_objects(
        &self,
        metrics: &MetricSet,
        sink: &mut MetricSink,
        namespace: &str,
        interface: &Interface,
        objects: Result<Vec<TcObject>>,
        last_error: &mut Option<String>,
    ) {
        let objects = match objects {
            Ok(objects) => objects,
            Err(e) => {
                warn!(
                    collector = %self.id,
                    namespace,
                    device = %interface.name,
                    error = %e,
                    "failed to list tc objects"
                );
                *last_error = Some(e.to_string());
                return;
            }
        };

        for object in &objects {
            if !self.kind.validate(object) {
                trace!(collector = %self.id, kind = %object.kind, "skipping object");
                continue;
            }
            self.kind
                .collect_into(metrics, sink, namespace, &interface.name, object);
        }
    }
}

impl Collector for QdiscCollector {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn collect(&self, sink: &mut MetricSink) {
        if !self.enabled() {
            return;
        }

        let metrics = self.state.read().metrics.clone();
        let before = sink.len();
        let mut last_error = None;

        match self.source.list_namespaces() {
            Ok(namespaces) => {
                for namespace in &namespaces {
                    self.collect_namespace(&metrics, sink, namespace, &mut last_error);
                }
            }
            Err(e) => {
                warn!(collector = %self.id, error = %e, "failed to list namespaces");
                last_error = Some(e.to_string());
            }
        }

        debug!(collector = %self.id, samples = sink.len() - before, "collection pass finished");

        let mut state = self.state.write();
        state.last_error = last_error;
        state.last_collect = Some(Utc::now());
    }

    fn config(&self) -> Arc<dyn Any + Send + Sync> {
        self.state.read().config.clone()
    }

    fn set_config(&self, config: &dyn Any) -> Result<()> {
        let config = config
            .downcast_ref::<CollectorConfig>()
            .ok_or(MetricsError::InvalidConfigType)?;

        let metrics = MetricSet::build(&self.metric_prefix, self.labels, config);
        {
            let mut state = self.state.write();
            state.config = Arc::new(config.clone());
            state.metrics = metrics;
        }
        self.set_enabled(config.enabled);
        debug!(collector = %self.id, metrics = config.metrics.len(), "collector config replaced");
        Ok(())
    }

    fn descriptors(&self) -> Vec<Arc<MetricDescriptor>> {
        self.state
            .read()
            .metrics
            .iter()
            .map(|(_, desc)| Arc::clone(desc))
            .collect()
    }

    fn last_error(&self) -> Option<String> {
        self.state.read().last_error.clone()
    }

    fn last_collect(&self) -> Option<DateTime<Utc>> {
        self.state.read().last_collect
    }
}
