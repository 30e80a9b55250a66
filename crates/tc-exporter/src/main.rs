//! tc-exporter - Prometheus exporter for Linux traffic-control statistics
//!
//! Loads the config file, starts watching it for changes and serves qdisc
//! and class statistics of every network namespace over HTTP.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tc_config::ConfigManager;
use tc_exporter::{
    AppState, Cli, CollectorsChecker, ExporterRegistry, ExporterServer, HealthManager,
    Iproute2Source, ReloadHandler, TcSourceChecker, default_collectors, logging, shutdown_signal,
};
use tc_metrics::TcSource;
use tc_ratelimit::RateLimiter;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let manager = Arc::new(ConfigManager::new(cli.config.clone()));
    let loaded = manager.load_config();
    let config = manager.config();

    let logging = Arc::new(logging::init(&config.log).context("failed to initialize logging")?);
    if let Err(e) = loaded {
        warn!(path = %cli.config.display(), error = %e, "Using default configuration");
    }
    info!(version = env!("CARGO_PKG_VERSION"), "Starting tc-exporter");

    let source: Arc<dyn TcSource> = Arc::new(Iproute2Source::new());
    let collectors =
        default_collectors(Arc::clone(&source)).context("failed to register collectors")?;
    let registry = Arc::new(ExporterRegistry::new(
        Arc::clone(&collectors),
        cli.enable_default_prom_reg,
    ));

    let health = Arc::new(HealthManager::new(env!("CARGO_PKG_VERSION")));
    health.register_checker(Arc::new(TcSourceChecker::new(Arc::clone(&source))));
    health.register_checker(Arc::new(CollectorsChecker::new(collectors)));

    let mut state = AppState::new(registry, health, config.metrics_path.clone());
    if cli.use_ratelimit {
        let limiter = RateLimiter::new(cli.rate_limit_interval, cli.rate_limit_size)
            .context("failed to initialize rate limiter")?;
        info!(
            interval = ?cli.rate_limit_interval,
            size = cli.rate_limit_size,
            "Rate limiting scrapes"
        );
        state = state.with_rate_limiter(Arc::new(limiter));
    }

    let handler = ReloadHandler::new(&config, Some(logging));
    manager.set_reload_callback(move |next| handler.apply(next));
    if let Err(e) = manager.start_watching() {
        warn!(error = %e, "Config hot reload disabled");
    }

    if config.is_public() {
        warn!(address = %config.address, "Metrics are exposed on a non-loopback address");
    }

    let server = ExporterServer::new(Arc::new(state));
    let result = server
        .serve_with_shutdown(&config.bind_address(), shutdown_signal())
        .await;

    manager.stop_watching().await;
    if let Err(e) = &result {
        error!(error = %e, "Server stopped with an error");
    }
    result.context("server failed")
}
