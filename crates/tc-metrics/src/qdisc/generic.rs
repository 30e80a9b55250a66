//! Generic byte/packet counters shared by every qdisc and class.

use std::sync::Arc;

use tracing::{debug, warn};

use super::{GENERIC_LABELS, MetricSet, QdiscCollector, QdiscKind};
use crate::collector::CollectorConfig;
use crate::sample::MetricSink;
use crate::source::TcSource;
use crate::tc::{ObjectScope, Stats, Stats2, TcObject};

/// Metrics emitted by the generic collectors.
pub const GENERIC_FIELDS: &[(&str, &str)] = &[
    ("bytes_total", "Bytes sent"),
    ("packets_total", "Packets sent"),
    ("drops_total", "Packets dropped"),
    ("overlimits_total", "Times the queue went over its limit"),
    ("qlen", "Current queue length in packets"),
    ("backlog", "Current backlog in bytes"),
    ("requeues_total", "Packets requeued"),
    ("bps", "Rate estimate in bytes per second"),
    ("pps", "Rate estimate in packets per second"),
];

/// Counters present in both statistics blocks.
#[derive(Debug, Clone, Copy)]
struct Counters {
    bytes: u64,
    packets: u64,
    drops: u64,
    overlimits: u64,
    qlen: u64,
    backlog: u64,
}

impl From<&Stats2> for Counters {
    fn from(s: &Stats2) -> Self {
        Self {
            bytes: s.bytes,
            packets: s.packets,
            drops: s.drops,
            overlimits: s.overlimits,
            qlen: s.qlen,
            backlog: s.backlog,
        }
    }
}

impl From<&Stats> for Counters {
    fn from(s: &Stats) -> Self {
        Self {
            bytes: s.bytes,
            packets: s.packets,
            drops: s.drops,
            overlimits: s.overlimits,
            qlen: s.qlen,
            backlog: s.backlog,
        }
    }
}

/// Reads the generic statistics blocks of every object.
///
/// Counters come from `stats2` when present and from the legacy `stats`
/// block otherwise. `requeues_total` needs `stats2`; `bps` and `pps` need the
/// legacy block, the only one carrying rate estimates.
#[derive(Debug, Clone, Copy)]
pub struct GenericStats {
    family: &'static str,
}

impl GenericStats {
    /// Behavior for qdiscs.
    pub const QDISC: Self = Self { family: "qdisc" };
    /// Behavior for classes.
    pub const CLASS: Self = Self { family: "class" };
}

impl QdiscKind for GenericStats {
    fn kind(&self) -> &str {
        self.family
    }

    fn validate(&self, _object: &TcObject) -> bool {
        true
    }

    fn collect_into(
        &self,
        metrics: &MetricSet,
        sink: &mut MetricSink,
        namespace: &str,
        device: &str,
        object: &TcObject,
    ) {
        let counters = match (&object.stats2, &object.stats) {
            (Some(stats2), _) => Counters::from(stats2),
            (None, Some(stats)) => Counters::from(stats),
            (None, None) => {
                debug!(namespace, device, kind = %object.kind, "object has no statistics block");
                return;
            }
        };

        for (name, descriptor) in metrics.iter() {
            let value = match name {
                "bytes_total" => counters.bytes,
                "packets_total" => counters.packets,
                "drops_total" => counters.drops,
                "overlimits_total" => counters.overlimits,
                "qlen" => counters.qlen,
                "backlog" => counters.backlog,
                "requeues_total" => match &object.stats2 {
                    Some(stats2) => stats2.requeues,
                    None => continue,
                },
                "bps" => match &object.stats {
                    Some(stats) => stats.bps,
                    None => continue,
                },
                "pps" => match &object.stats {
                    Some(stats) => stats.pps,
                    None => continue,
                },
                other => {
                    warn!(family = self.family, metric = other, "unsupported metric");
                    continue;
                }
            };
            sink.push(
                descriptor,
                value as f64,
                vec![namespace.to_string(), device.to_string()],
            );
        }
    }
}

/// Builds the generic qdisc collector (`qdisc_generic`, metrics `qdisc_*`).
pub fn qdisc_collector(
    source: Arc<dyn TcSource>,
    config: Option<CollectorConfig>,
) -> QdiscCollector {
    let config = config.unwrap_or_else(|| CollectorConfig::from_fields(GENERIC_FIELDS));
    QdiscCollector::new(Box::new(GenericStats::QDISC), source, config)
        .with_id("qdisc_generic")
        .with_description("qdisc", "Generic qdisc statistics")
        .with_naming("qdisc_", GENERIC_LABELS)
}

/// Builds the generic class collector (`class_generic`, metrics `class_*`).
pub fn class_collector(
    source: Arc<dyn TcSource>,
    config: Option<CollectorConfig>,
) -> QdiscCollector {
    let config = config.unwrap_or_else(|| CollectorConfig::from_fields(GENERIC_FIELDS));
    QdiscCollector::new(Box::new(GenericStats::CLASS), source, config)
        .with_id("class_generic")
        .with_description("class", "Generic class statistics")
        .with_naming("class_", GENERIC_LABELS)
        .with_scope(ObjectScope::Classes)
}
