//! Exporter HTTP server.

use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use crate::error::{ExporterError, ExporterResult};
use crate::routes::create_router;
use crate::state::AppState;

/// Serves the metrics and health endpoints.
#[derive(Debug, Clone)]
pub struct ExporterServer {
    state: Arc<AppState>,
}

impl ExporterServer {
    /// Creates a server over `state`.
    #[must_use]
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Get the shared state.
    #[must_use]
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Create the router without starting the server.
    pub fn router(&self) -> axum::Router {
        create_router(Arc::clone(&self.state))
    }

    /// Binds `addr` and serves until `shutdown` completes.
    ///
    /// # Errors
    ///
    /// Returns an error if binding to the address fails.
    pub async fn serve_with_shutdown<F>(&self, addr: &str, shutdown: F) -> ExporterResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ExporterError::BindFailed(addr.to_string(), e))?;
        self.serve_listener(listener, shutdown).await
    }

    /// Serves on an already bound listener until `shutdown` completes.
    ///
    /// The service is ready while it serves.
    pub async fn serve_listener<F>(&self, listener: TcpListener, shutdown: F) -> ExporterResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local = listener
            .local_addr()
            .map_err(|e| ExporterError::Internal(e.to_string()))?;
        info!(
            addr = %local,
            metrics_path = %self.state.metrics_path(),
            "Exporter server listening"
        );

        self.state.health().set_ready(true);
        let result = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ExporterError::Internal(e.to_string()));
        self.state.health().set_ready(false);

        if let Some(limiter) = self.state.limiter() {
            limiter.stop().await;
        }

        info!("Exporter server shut down");
        result
    }
}

/// Completes on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received SIGINT"),
        () = terminate => info!("Received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tc_metrics::CollectorRegistry;
    use tc_ratelimit::RateLimiter;
    use std::time::Duration;

    use crate::health::HealthManager;
    use crate::metrics::ExporterRegistry;

    fn make_state(limiter: Option<Arc<RateLimiter>>) -> Arc<AppState> {
        let registry = Arc::new(ExporterRegistry::new(Arc::new(CollectorRegistry::new()), false));
        let state = AppState::new(registry, Arc::new(HealthManager::new("0.1.0")), "/metrics");
        Arc::new(match limiter {
            Some(limiter) => state.with_rate_limiter(limiter),
            None => state,
        })
    }

    #[tokio::test]
    async fn test_bind_failure() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap().to_string();

        let server = ExporterServer::new(make_state(None));
        let err = server.serve_with_shutdown(&addr, async {}).await.unwrap_err();
        assert!(matches!(err, ExporterError::BindFailed(_, _)));
    }

    #[tokio::test]
    async fn test_shutdown_clears_readiness_and_stops_limiter() {
        let limiter = Arc::new(RateLimiter::new(Duration::from_secs(1), 10).unwrap());
        let state = make_state(Some(Arc::clone(&limiter)));
        let server = ExporterServer::new(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            server
                .serve_listener(listener, async {
                    let _ = rx.await;
                })
                .await
        });

        for _ in 0..50 {
            if state.health().is_ready() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(state.health().is_ready());

        tx.send(()).unwrap();
        task.await.unwrap().unwrap();
        assert!(!state.health().is_ready());
        assert!(limiter.is_closed());
    }
}
