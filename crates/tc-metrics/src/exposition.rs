//! Bridges collection passes into the Prometheus text exposition.
//!
//! [`TcExposition`] is registered with a `prometheus_client` registry as a
//! custom collector. Every encode runs one [`CollectorRegistry::collect_all`]
//! pass into a fresh sink and writes the samples out as gauge families.

use std::fmt;
use std::sync::Arc;

use prometheus_client::collector::Collector as PromCollector;
use prometheus_client::encoding::{DescriptorEncoder, EncodeMetric};
use prometheus_client::metrics::MetricType;
use prometheus_client::metrics::gauge::ConstGauge;
use tracing::{debug, warn};

use crate::registry::{CollectReport, CollectorRegistry};
use crate::sample::MetricSink;

/// Called with the report of every collection pass.
pub type ReportHook = Arc<dyn Fn(&CollectReport) + Send + Sync>;

/// Exposes a [`CollectorRegistry`] through `prometheus_client`.
#[derive(Clone)]
pub struct TcExposition {
    registry: Arc<CollectorRegistry>,
    on_report: Option<ReportHook>,
}

impl fmt::Debug for TcExposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcExposition")
            .field("registry", &self.registry)
            .field("on_report", &self.on_report.is_some())
            .finish()
    }
}

impl TcExposition {
    /// Wraps `registry`.
    #[must_use]
    pub fn new(registry: Arc<CollectorRegistry>) -> Self {
        Self {
            registry,
            on_report: None,
        }
    }

    /// Hands every pass report to `hook`, e.g. to count faulted collectors.
    #[must_use]
    pub fn with_report_hook(mut self, hook: ReportHook) -> Self {
        self.on_report = Some(hook);
        self
    }

    /// The wrapped registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<CollectorRegistry> {
        &self.registry
    }
}

impl PromCollector for TcExposition {
    fn encode(&self, mut encoder: DescriptorEncoder) -> Result<(), fmt::Error> {
        let mut sink = MetricSink::new();
        let report: CollectReport = self.registry.collect_all(&mut sink);
        if !report.faulted.is_empty() {
            warn!(faulted = ?report.faulted, "scrape completed with faulted collectors");
        }
        debug!(collectors = report.invoked, samples = report.samples, "collection pass finished");
        if let Some(hook) = &self.on_report {
            hook(&report);
        }
        encode_sink(&sink, &mut encoder)
    }
}

/// Writes every family in `sink` as a gauge.
///
/// # Errors
///
/// Propagates formatter errors from the encoder.
pub fn encode_sink(sink: &MetricSink, encoder: &mut DescriptorEncoder) -> Result<(), fmt::Error> {
    for (descriptor, samples) in sink.families() {
        let mut family = encoder.encode_descriptor(
            descriptor.name(),
            descriptor.help(),
            None,
            MetricType::Gauge,
        )?;
        for sample in samples {
            let labels: Vec<(&str, &str)> = sample.labels().collect();
            let metric = family.encode_family(&labels)?;
            ConstGauge::new(sample.value).encode(metric)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use prometheus_client::encoding::text::encode;
    use prometheus_client::registry::Registry;

    use super::*;
    use crate::qdisc::{build_kind_collector, qdisc_collector};
    use crate::source::{DEFAULT_NAMESPACE, FakeTcSource};
    use crate::tc::{FqCodelXStats, Interface, Stats2, TcObject};

    fn render(registry: Arc<CollectorRegistry>) -> String {
        let mut prom = Registry::default();
        prom.register_collector(Box::new(TcExposition::new(registry)));
        let mut out = String::new();
        encode(&mut out, &prom).unwrap();
        out
    }

    fn source() -> Arc<FakeTcSource> {
        Arc::new(
            FakeTcSource::new()
                .with_namespace(DEFAULT_NAMESPACE, vec![Interface::new(2, "eth0")])
                .with_qdisc(
                    DEFAULT_NAMESPACE,
                    "eth0",
                    TcObject::new("fq_codel")
                        .with_stats2(Stats2 {
                            bytes: 1500,
                            ..Stats2::default()
                        })
                        .with_xstats(FqCodelXStats {
                            drop_overlimit: 3,
                            ..FqCodelXStats::default()
                        }),
                ),
        )
    }

    #[test]
    fn test_exposition_renders_gauges() {
        let registry = Arc::new(CollectorRegistry::new());
        registry.register(Arc::new(qdisc_collector(source(), None))).unwrap();
        registry
            .register(Arc::new(build_kind_collector("fq_codel", source(), None).unwrap()))
            .unwrap();

        let out = render(registry);
        assert!(out.contains("# TYPE qdisc_bytes_total gauge"));
        assert!(out.contains(r#"qdisc_bytes_total{namespace="default",device="eth0"} 1500.0"#));
        assert!(out.contains(
            r#"qdisc_fq_codel_drop_overlimit{namespace="default",device="eth0",kind="fq_codel"} 3.0"#
        ));
        assert!(out.ends_with("# EOF\n"));
    }

    #[test]
    fn test_report_hook_sees_every_pass() {
        let registry = Arc::new(CollectorRegistry::new());
        registry.register(Arc::new(qdisc_collector(source(), None))).unwrap();

        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let hook: ReportHook = Arc::new(move |report: &CollectReport| {
            assert!(report.faulted.is_empty());
            counter.fetch_add(report.invoked, Ordering::SeqCst);
        });
        let exposition = TcExposition::new(registry).with_report_hook(hook);

        let mut prom = Registry::default();
        prom.register_collector(Box::new(exposition));
        let mut out = String::new();
        encode(&mut out, &prom).unwrap();
        encode(&mut out, &prom).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_empty_registry_renders_only_eof() {
        let out = render(Arc::new(CollectorRegistry::new()));
        assert_eq!(out, "# EOF\n");
    }
}
