//! HTTP request handlers.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::Next;
use axum::response::{Html, IntoResponse, Response};
use tracing::debug;

use crate::error::{ExporterError, ExporterResult};
use crate::health::HealthStatus;
use crate::metrics::ExporterRegistry;
use crate::state::AppState;

/// Refuses the request when the rate limiter has no token left.
pub async fn rate_limit(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    if let Some(limiter) = state.limiter() {
        if let Err(e) = limiter.get() {
            state.registry().metrics().inc_rate_limited();
            debug!(path = %req.uri().path(), error = %e, "Scrape rejected by rate limiter");
            return ExporterError::from(e).into_response();
        }
    }
    next.run(req).await
}

/// Handle GET on the metrics path.
pub async fn metrics(State(state): State<Arc<AppState>>) -> ExporterResult<Response> {
    let registry = Arc::clone(state.registry());
    let body = tokio::task::spawn_blocking(move || registry.scrape())
        .await
        .map_err(|e| ExporterError::Internal(format!("scrape task failed: {e}")))??;

    Ok(([(header::CONTENT_TYPE, ExporterRegistry::content_type())], body).into_response())
}

/// Handle GET /health - run every health checker.
pub async fn health(
    State(state): State<Arc<AppState>>,
) -> ExporterResult<(StatusCode, Json<HealthStatus>)> {
    let health = Arc::clone(state.health());
    let (healthy, status) = tokio::task::spawn_blocking(move || health.health())
        .await
        .map_err(|e| ExporterError::Internal(format!("health check task failed: {e}")))?;

    let code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    Ok((code, Json(status)))
}

/// Handle GET /ready.
pub async fn ready(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthStatus>) {
    let (ready, status) = state.health().readiness();
    let code = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(status))
}

/// Handle GET /live.
pub async fn live(State(state): State<Arc<AppState>>) -> Json<HealthStatus> {
    Json(state.health().liveness())
}

/// Handle GET / - a minimal landing page.
pub async fn landing_page(State(state): State<Arc<AppState>>) -> Html<String> {
    Html(format!(
        "<!DOCTYPE html>\n<html>\n<head><title>TC Exporter</title></head>\n<body>\n\
         <h1>TC Exporter</h1>\n<ul>\n\
         <li><a href=\"{path}\">Metrics</a></li>\n\
         <li><a href=\"/health\">Health</a></li>\n\
         </ul>\n<p class=\"version\">Version {version}</p>\n</body>\n</html>\n",
        path = state.metrics_path(),
        version = env!("CARGO_PKG_VERSION"),
    ))
}
