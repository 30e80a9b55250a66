//! Prometheus registry of the exporter.
//!
//! One `prometheus_client` [`Registry`] carries the exporter's own metrics,
//! the traffic-control collectors (through [`TcExposition`]) and, on request,
//! the process metrics.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use tc_exporter::metrics::ExporterRegistry;
//! use tc_metrics::CollectorRegistry;
//!
//! let registry = ExporterRegistry::new(Arc::new(CollectorRegistry::new()), false);
//! let output = registry.scrape().unwrap();
//! assert!(output.contains("tc_exporter_scrapes_total 1"));
//! assert!(output.contains("tc_exporter_build_info{version="));
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use tc_metrics::{
    CollectReport, CollectorRegistry, QdiscFactory, TcExposition, TcSource, class_collector,
    qdisc_collector,
};
use tracing::info;

use crate::error::{ExporterError, ExporterResult};
use crate::process::ProcessCollector;

/// Label set of the build info gauge.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct BuildInfoLabels {
    /// Crate version.
    pub version: String,
}

/// Label set of the per-collector error counter.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct CollectorLabels {
    /// Collector ID.
    pub collector: String,
}

/// Metrics about the exporter itself.
#[derive(Clone)]
pub struct ExporterMetrics {
    scrapes: Counter,
    scrape_duration_seconds: Histogram,
    rate_limited_requests: Counter,
    collector_errors: Family<CollectorLabels, Counter>,
    collectors_enabled: Gauge,
    build_info: Family<BuildInfoLabels, Gauge>,
}

impl std::fmt::Debug for ExporterMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExporterMetrics")
            .field("scrapes", &self.scrapes.get())
            .field("rate_limited_requests", &self.rate_limited_requests.get())
            .field("collectors_enabled", &self.collectors_enabled.get())
            .finish_non_exhaustive()
    }
}

impl ExporterMetrics {
    /// Creates the metrics and registers them with `registry`.
    pub fn new(registry: &mut Registry) -> Self {
        let scrapes = Counter::default();
        registry.register("tc_exporter_scrapes", "Scrapes served", scrapes.clone());

        // 1ms to ~8s
        let scrape_duration_seconds = Histogram::new(exponential_buckets(0.001, 2.0, 14));
        registry.register(
            "tc_exporter_scrape_duration_seconds",
            "Time taken to collect and encode one scrape",
            scrape_duration_seconds.clone(),
        );

        let rate_limited_requests = Counter::default();
        registry.register(
            "tc_exporter_rate_limited_requests",
            "Scrapes refused by the rate limiter",
            rate_limited_requests.clone(),
        );

        let collector_errors = Family::<CollectorLabels, Counter>::default();
        registry.register(
            "tc_exporter_collector_errors",
            "Collection passes in which a collector faulted",
            collector_errors.clone(),
        );

        let collectors_enabled = Gauge::default();
        registry.register(
            "tc_exporter_collectors_enabled",
            "Collectors enabled in the registry",
            collectors_enabled.clone(),
        );

        let build_info = Family::<BuildInfoLabels, Gauge>::default();
        registry.register(
            "tc_exporter_build_info",
            "Build information, always 1",
            build_info.clone(),
        );
        build_info
            .get_or_create(&BuildInfoLabels {
                version: env!("CARGO_PKG_VERSION").to_string(),
            })
            .set(1);

        Self {
            scrapes,
            scrape_duration_seconds,
            rate_limited_requests,
            collector_errors,
            collectors_enabled,
            build_info,
        }
    }

    /// Counts one served scrape.
    pub fn inc_scrapes(&self) {
        self.scrapes.inc();
    }

    /// Scrapes served so far.
    #[must_use]
    pub fn scrapes(&self) -> u64 {
        self.scrapes.get()
    }

    /// Records how long a scrape took.
    pub fn observe_scrape_duration(&self, duration: Duration) {
        self.scrape_duration_seconds.observe(duration.as_secs_f64());
    }

    /// Counts one scrape refused by the rate limiter.
    pub fn inc_rate_limited(&self) {
        self.rate_limited_requests.inc();
    }

    /// Scrapes refused so far.
    #[must_use]
    pub fn rate_limited(&self) -> u64 {
        self.rate_limited_requests.get()
    }

    /// Counts the faulted collectors of one collection pass.
    pub fn record_collect_report(&self, report: &CollectReport) {
        for id in &report.faulted {
            self.collector_errors
                .get_or_create(&CollectorLabels {
                    collector: id.clone(),
                })
                .inc();
        }
    }

    /// Faults recorded for collector `id`.
    #[must_use]
    pub fn collector_errors(&self, id: &str) -> u64 {
        self.collector_errors
            .get_or_create(&CollectorLabels {
                collector: id.to_string(),
            })
            .get()
    }

    /// Sets the number of enabled collectors.
    pub fn set_collectors_enabled(&self, count: usize) {
        self.collectors_enabled.set(count as i64);
    }

    /// Build info value of this build.
    #[must_use]
    pub fn build_info(&self) -> i64 {
        self.build_info
            .get_or_create(&BuildInfoLabels {
                version: env!("CARGO_PKG_VERSION").to_string(),
            })
            .get()
    }
}

/// Builds the standard collector set over `source`: the generic qdisc and
/// class collectors plus one collector per supported kind.
pub fn default_collectors(source: Arc<dyn TcSource>) -> tc_metrics::Result<Arc<CollectorRegistry>> {
    let registry = CollectorRegistry::new();
    registry.register(Arc::new(qdisc_collector(Arc::clone(&source), None)))?;
    registry.register(Arc::new(class_collector(Arc::clone(&source), None)))?;

    registry.register_factory(QdiscFactory::NAME, Arc::new(QdiscFactory::new(source)))?;
    let kinds = registry.register_supported(QdiscFactory::NAME)?;

    info!(collectors = registry.len(), kinds, "Collectors registered");
    Ok(Arc::new(registry))
}

/// The registry served on the metrics path.
#[derive(Debug)]
pub struct ExporterRegistry {
    registry: Registry,
    collectors: Arc<CollectorRegistry>,
    metrics: ExporterMetrics,
}

impl ExporterRegistry {
    /// Builds the registry over `collectors`.
    ///
    /// `process_metrics` additionally exposes the `process_*` family read
    /// from `/proc/self`.
    #[must_use]
    pub fn new(collectors: Arc<CollectorRegistry>, process_metrics: bool) -> Self {
        let mut registry = Registry::default();
        let metrics = ExporterMetrics::new(&mut registry);
        let hook_metrics = metrics.clone();
        let exposition = TcExposition::new(Arc::clone(&collectors)).with_report_hook(Arc::new(
            move |report: &CollectReport| hook_metrics.record_collect_report(report),
        ));
        registry.register_collector(Box::new(exposition));
        if process_metrics {
            registry.register_collector(Box::new(ProcessCollector::new()));
        }

        Self {
            registry,
            collectors,
            metrics,
        }
    }

    /// The exporter's own metrics.
    #[must_use]
    pub fn metrics(&self) -> &ExporterMetrics {
        &self.metrics
    }

    /// The traffic-control collectors.
    #[must_use]
    pub fn collectors(&self) -> &Arc<CollectorRegistry> {
        &self.collectors
    }

    /// Runs one collection pass and encodes everything in text format.
    ///
    /// Blocks for as long as the collectors take; call it off the async
    /// workers.
    pub fn scrape(&self) -> ExporterResult<String> {
        let start = Instant::now();
        self.metrics.inc_scrapes();
        self.metrics
            .set_collectors_enabled(self.collectors.enabled_collectors().len());

        let mut buffer = String::new();
        encode(&mut buffer, &self.registry).map_err(|e| ExporterError::Encode(e.to_string()))?;

        self.metrics.observe_scrape_duration(start.elapsed());
        Ok(buffer)
    }

    /// Content type of [`Self::scrape`] output.
    #[must_use]
    pub const fn content_type() -> &'static str {
        "application/openmetrics-text; version=1.0.0; charset=utf-8"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tc_metrics::{
        DEFAULT_NAMESPACE, FakeTcSource, Interface, Stats2, TcObject, qdisc_collector,
    };

    fn collectors() -> Arc<CollectorRegistry> {
        let source = Arc::new(
            FakeTcSource::new()
                .with_namespace(DEFAULT_NAMESPACE, vec![Interface::new(2, "eth0")])
                .with_qdisc(
                    DEFAULT_NAMESPACE,
                    "eth0",
                    TcObject::new("fq_codel").with_stats2(Stats2 {
                        bytes: 1500,
                        packets: 10,
                        ..Stats2::default()
                    }),
                ),
        );
        let registry = Arc::new(CollectorRegistry::new());
        registry.register(Arc::new(qdisc_collector(source, None))).unwrap();
        registry
    }

    #[test]
    fn test_scrape_contains_tc_and_self_metrics() {
        let registry = ExporterRegistry::new(collectors(), false);
        let output = registry.scrape().unwrap();

        assert!(output.contains("qdisc_bytes_total{namespace=\"default\",device=\"eth0\"} 1500.0"));
        assert!(output.contains("tc_exporter_scrapes_total 1"));
        assert!(output.contains("tc_exporter_collectors_enabled 1"));
        assert!(output.contains("tc_exporter_scrape_duration_seconds_bucket"));
        assert!(!output.contains("process_threads"));
        assert!(output.ends_with("# EOF\n"));
    }

    #[test]
    fn test_scrapes_are_counted() {
        let registry = ExporterRegistry::new(collectors(), false);
        registry.scrape().unwrap();
        registry.scrape().unwrap();
        assert_eq!(registry.metrics().scrapes(), 2);
    }

    #[test]
    fn test_build_info_is_one() {
        let registry = ExporterRegistry::new(collectors(), false);
        assert_eq!(registry.metrics().build_info(), 1);
        let output = registry.scrape().unwrap();
        assert!(output.contains(&format!(
            "tc_exporter_build_info{{version=\"{}\"}} 1",
            env!("CARGO_PKG_VERSION")
        )));
    }

    #[test]
    fn test_rate_limited_counter() {
        let registry = ExporterRegistry::new(collectors(), false);
        registry.metrics().inc_rate_limited();
        let output = registry.scrape().unwrap();
        assert!(output.contains("tc_exporter_rate_limited_requests_total 1"));
    }

    #[test]
    fn test_collect_report_counts_faults_per_collector() {
        let registry = ExporterRegistry::new(collectors(), false);
        let report = CollectReport {
            invoked: 3,
            faulted: vec!["qdisc_htb".into(), "qdisc_pie".into()],
            samples: 0,
        };
        registry.metrics().record_collect_report(&report);
        registry.metrics().record_collect_report(&report);

        assert_eq!(registry.metrics().collector_errors("qdisc_htb"), 2);
        assert_eq!(registry.metrics().collector_errors("qdisc_generic"), 0);
        let output = registry.scrape().unwrap();
        assert!(output.contains("tc_exporter_collector_errors_total{collector=\"qdisc_pie\"} 2"));
    }

    #[test]
    fn test_default_collectors() {
        let registry = default_collectors(Arc::new(FakeTcSource::new())).unwrap();
        assert_eq!(registry.len(), 13);
        assert!(registry.collector("qdisc_generic").is_some());
        assert!(registry.collector("class_generic").is_some());
        assert!(registry.collector("qdisc_htb").is_some());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_process_metrics_when_enabled() {
        let registry = ExporterRegistry::new(collectors(), true);
        let output = registry.scrape().unwrap();
        assert!(output.contains("process_threads"));
        assert!(output.contains("process_open_fds"));
    }
}
