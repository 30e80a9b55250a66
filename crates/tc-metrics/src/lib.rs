//! # tc-metrics
//!
//! Collector framework for Linux traffic-control statistics.
//!
//! - [`tc`]: the qdisc/class data model and per-kind extended statistics
//! - [`source`]: the [`TcSource`] seam the collectors read through
//! - [`qdisc`]: generic and per-kind collectors
//! - [`factory`]: builds collectors by kind
//! - [`registry`]: registration, enablement and the per-collector fault barrier
//! - [`exposition`]: renders a collection pass through `prometheus_client`
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use tc_metrics::{CollectorRegistry, FakeTcSource, MetricSink, QdiscFactory};
//!
//! let source = Arc::new(FakeTcSource::new());
//! let registry = CollectorRegistry::new();
//! registry
//!     .register_factory(QdiscFactory::NAME, Arc::new(QdiscFactory::new(source)))
//!     .unwrap();
//! registry.register_supported(QdiscFactory::NAME).unwrap();
//!
//! let mut sink = MetricSink::new();
//! let report = registry.collect_all(&mut sink);
//! assert_eq!(report.invoked, 11);
//! assert!(sink.is_empty());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod collector;
pub mod error;
pub mod exposition;
pub mod factory;
pub mod qdisc;
pub mod registry;
pub mod sample;
pub mod source;
pub mod tc;

pub use collector::{Collector, CollectorConfig, MetricConfig};
pub use error::{MetricsError, Result};
pub use exposition::{ReportHook, TcExposition, encode_sink};
pub use factory::{CollectorFactory, QdiscFactory};
pub use qdisc::{
    GENERIC_FIELDS, QdiscCollector, SUPPORTED_KINDS, build_kind_collector, class_collector,
    default_kind_config, qdisc_collector,
};
pub use registry::{CollectReport, CollectorRegistry};
pub use sample::{MetricDescriptor, MetricSink, Sample};
pub use source::{DEFAULT_NAMESPACE, FakeTcSource, TcSource};
pub use tc::{Interface, ObjectScope, Stats, Stats2, TcObject, XStats};
