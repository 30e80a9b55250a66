//! Per-kind extended statistics collectors.

use std::marker::PhantomData;
use std::sync::Arc;

use tracing::{trace, warn};

use super::{MetricSet, QdiscCollector, QdiscKind};
use crate::collector::CollectorConfig;
use crate::sample::MetricSink;
use crate::source::TcSource;
use crate::tc::{
    CbqXStats, ChokeXStats, CodelXStats, ExtendedStats, FqCodelXStats, FqXStats, HfscXStats,
    HtbXStats, PieXStats, RedXStats, SfbXStats, SfqXStats, TcObject,
};

/// Kinds with a dedicated collector.
pub const SUPPORTED_KINDS: [&str; 11] = [
    "codel", "cbq", "htb", "fq", "fq_codel", "choke", "pie", "red", "sfb", "sfq", "hfsc",
];

/// Emits one sample per configured field of `S` for objects of kind `S::KIND`.
pub struct KindStats<S> {
    _stats: PhantomData<fn() -> S>,
}

impl<S> KindStats<S> {
    /// Creates the behavior.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _stats: PhantomData,
        }
    }
}

impl<S> Default for KindStats<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> std::fmt::Debug for KindStats<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KindStats").finish()
    }
}

impl<S: ExtendedStats> QdiscKind for KindStats<S> {
    fn kind(&self) -> &str {
        S::KIND
    }

    fn validate(&self, object: &TcObject) -> bool {
        object.kind == S::KIND
    }

    fn collect_into(
        &self,
        metrics: &MetricSet,
        sink: &mut MetricSink,
        namespace: &str,
        device: &str,
        object: &TcObject,
    ) {
        let Some(stats) = object.xstats.as_ref().and_then(S::from_xstats) else {
            trace!(namespace, device, kind = S::KIND, "no extended statistics");
            return;
        };

        for (name, descriptor) in metrics.iter() {
            let Some(value) = stats.field(name) else {
                warn!(kind = S::KIND, metric = name, namespace, device, "unsupported metric");
                continue;
            };
            sink.push(
                descriptor,
                value,
                vec![namespace.to_string(), device.to_string(), S::KIND.to_string()],
            );
        }
    }
}

fn collector_for<S: ExtendedStats>(
    source: Arc<dyn TcSource>,
    config: Option<CollectorConfig>,
) -> QdiscCollector {
    let config = config.unwrap_or_else(|| CollectorConfig::from_fields(S::FIELDS));
    QdiscCollector::new(Box::new(KindStats::<S>::new()), source, config)
}

/// Builds the collector for `kind`, or `None` if the kind is not supported.
///
/// Without an explicit `config` every field of the kind is enabled.
pub fn build_kind_collector(
    kind: &str,
    source: Arc<dyn TcSource>,
    config: Option<CollectorConfig>,
) -> Option<QdiscCollector> {
    Some(match kind {
        "codel" => collector_for::<CodelXStats>(source, config),
        "cbq" => collector_for::<CbqXStats>(source, config),
        "choke" => collector_for::<ChokeXStats>(source, config),
        "fq" => collector_for::<FqXStats>(source, config),
        "fq_codel" => collector_for::<FqCodelXStats>(source, config),
        "hfsc" => collector_for::<HfscXStats>(source, config),
        "htb" => collector_for::<HtbXStats>(source, config),
        "pie" => collector_for::<PieXStats>(source, config),
        "red" => collector_for::<RedXStats>(source, config),
        "sfb" => collector_for::<SfbXStats>(source, config),
        "sfq" => collector_for::<SfqXStats>(source, config),
        _ => return None,
    })
}

/// The config a kind collector gets when none is supplied.
#[must_use]
pub fn default_kind_config(kind: &str) -> Option<CollectorConfig> {
    let fields = match kind {
        "codel" => CodelXStats::FIELDS,
        "cbq" => CbqXStats::FIELDS,
        "choke" => ChokeXStats::FIELDS,
        "fq" => FqXStats::FIELDS,
        "fq_codel" => FqCodelXStats::FIELDS,
        "hfsc" => HfscXStats::FIELDS,
        "htb" => HtbXStats::FIELDS,
        "pie" => PieXStats::FIELDS,
        "red" => RedXStats::FIELDS,
        "sfb" => SfbXStats::FIELDS,
        "sfq" => SfqXStats::FIELDS,
        _ => return None,
    };
    Some(CollectorConfig::from_fields(fields))
}
