//! Route configuration for the exporter.

use std::sync::Arc;

use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::routing::get;
use tower_http::trace::TraceLayer;

use crate::handlers::{health, landing_page, live, metrics, rate_limit, ready};
use crate::state::AppState;

/// Create the exporter router.
///
/// The rate limiter only guards the metrics path. A fixed route whose path
/// is taken by the metrics path is left out.
pub fn create_router(state: Arc<AppState>) -> Router {
    let metrics_route =
        get(metrics).route_layer(from_fn_with_state(Arc::clone(&state), rate_limit));
    let mut router = Router::new().route(state.metrics_path(), metrics_route);

    let fixed = [
        ("/health", get(health)),
        ("/ready", get(ready)),
        ("/live", get(live)),
        ("/", get(landing_page)),
    ];
    for (path, route) in fixed {
        if path != state.metrics_path() {
            router = router.route(path, route);
        }
    }

    router
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
