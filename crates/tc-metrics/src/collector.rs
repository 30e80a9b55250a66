//! The collector contract and its configuration.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::sample::{MetricDescriptor, MetricSink};

/// A pluggable producer of samples for one statistics family.
///
/// Collectors are shared between the registry and in-flight scrapes, so all
/// mutation goes through `&self`.
pub trait Collector: Send + Sync + fmt::Debug {
    /// Stable identifier, unique within a registry.
    fn id(&self) -> &str;

    /// Human readable name.
    fn name(&self) -> &str;

    /// One line description.
    fn description(&self) -> &str;

    /// Whether the collector takes part in collection passes.
    fn enabled(&self) -> bool;

    /// Enables or disables the collector.
    fn set_enabled(&self, enabled: bool);

    /// Pushes this collector's samples into `sink`.
    fn collect(&self, sink: &mut MetricSink);

    /// Current configuration. Downcast to the collector's config type.
    fn config(&self) -> Arc<dyn Any + Send + Sync>;

    /// Replaces the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`crate::MetricsError::InvalidConfigType`] when `config` is not
    /// the type this collector expects.
    fn set_config(&self, config: &dyn Any) -> Result<()>;

    /// Descriptors this collector currently emits.
    fn descriptors(&self) -> Vec<Arc<MetricDescriptor>> {
        Vec::new()
    }

    /// Last error recorded during collection.
    fn last_error(&self) -> Option<String> {
        None
    }

    /// When the last collection pass finished.
    fn last_collect(&self) -> Option<DateTime<Utc>> {
        None
    }
}

/// Configuration of a single metric inside a collector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricConfig {
    /// Short metric name, e.g. `drop_overlimit`.
    pub name: String,
    /// Help text.
    pub help: String,
    /// Whether the metric is emitted.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl MetricConfig {
    /// Creates an enabled metric.
    #[must_use]
    pub fn new(name: impl Into<String>, help: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            enabled: true,
        }
    }
}

/// Configuration handed to a collector at construction or via
/// [`Collector::set_config`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Initial enabled state.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Metrics to emit, in emission order.
    #[serde(default)]
    pub metrics: Vec<MetricConfig>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            metrics: Vec::new(),
        }
    }
}

impl CollectorConfig {
    /// Builds an enabled config from `(name, help)` pairs.
    #[must_use]
    pub fn from_fields(fields: &[(&str, &str)]) -> Self {
        Self {
            enabled: true,
            metrics: fields
                .iter()
                .map(|(name, help)| MetricConfig::new(*name, *help))
                .collect(),
        }
    }

    /// Adds a metric.
    #[must_use]
    pub fn with_metric(mut self, name: impl Into<String>, help: impl Into<String>) -> Self {
        self.metrics.push(MetricConfig::new(name, help));
        self
    }

    /// Keeps only the metrics named in `names`.
    #[must_use]
    pub fn only(mut self, names: &[&str]) -> Self {
        self.metrics.retain(|m| names.contains(&m.name.as_str()));
        self
    }

    /// Names of enabled metrics in order.
    pub fn enabled_metrics(&self) -> impl Iterator<Item = &MetricConfig> {
        self.metrics.iter().filter(|m| m.enabled)
    }
}

const fn default_true() -> bool {
    true
}
