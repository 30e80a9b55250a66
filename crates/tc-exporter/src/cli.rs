//! Command-line interface.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Default config file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/uos-exporter/tc-exporter.yaml";

/// Prometheus exporter for Linux traffic-control statistics.
#[derive(Debug, Clone, Parser)]
#[command(name = "tc-exporter")]
#[command(about = "Prometheus exporter for Linux traffic-control qdisc and class statistics")]
#[command(version)]
pub struct Cli {
    /// Path to the YAML config file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Also expose process metrics
    #[arg(long = "enable-default-prom-reg")]
    pub enable_default_prom_reg: bool,

    /// Rate-limit scrapes of the metrics path
    #[arg(long = "use_ratelimit")]
    pub use_ratelimit: bool,

    /// Token refill interval of the rate limiter
    #[arg(
        long = "rate_limit_interval",
        default_value = "1s",
        value_parser = humantime::parse_duration
    )]
    pub rate_limit_interval: Duration,

    /// Token bucket size of the rate limiter
    #[arg(long = "rate_limit_size", default_value_t = 100)]
    pub rate_limit_size: usize,
}
