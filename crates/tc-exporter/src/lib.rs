//! # tc-exporter
//!
//! Prometheus exporter for Linux traffic-control statistics.
//!
//! This crate wires the collector framework from `tc-metrics`, the config
//! manager from `tc-config` and the scrape limiter from `tc-ratelimit` into
//! an `axum` server:
//!
//! - `GET <metricsPath>`: qdisc and class metrics plus the exporter's own
//! - `GET /health`, `/ready`, `/live`: JSON health reports
//! - `GET /`: landing page
//!
//! Traffic-control state is read through [`iproute2::Iproute2Source`], which
//! runs `ip` and `tc` in JSON mode across every network namespace.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod error;
pub mod handlers;
pub mod health;
pub mod iproute2;
pub mod logging;
pub mod metrics;
pub mod process;
pub mod reload;
pub mod routes;
pub mod server;
pub mod state;

pub use cli::Cli;
pub use error::{ExporterError, ExporterResult};
pub use health::{CollectorsChecker, HealthChecker, HealthManager, HealthStatus, TcSourceChecker};
pub use iproute2::Iproute2Source;
pub use metrics::{ExporterMetrics, ExporterRegistry, default_collectors};
pub use reload::ReloadHandler;
pub use routes::create_router;
pub use server::{ExporterServer, shutdown_signal};
pub use state::AppState;
