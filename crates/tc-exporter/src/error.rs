//! Error types for the exporter service.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Result type alias for exporter operations.
pub type ExporterResult<T> = Result<T, ExporterError>;

/// Errors that can occur in the exporter service.
#[derive(Debug, Error)]
pub enum ExporterError {
    /// Failed to bind the listen address.
    #[error("failed to bind to {0}: {1}")]
    BindFailed(String, std::io::Error),

    /// The scrape was refused by the rate limiter.
    #[error("too many requests: {0}")]
    RateLimited(#[from] tc_ratelimit::RateLimitError),

    /// Encoding the exposition failed.
    #[error("failed to encode metrics: {0}")]
    Encode(String),

    /// Running `ip` or `tc` failed.
    #[error("command `{command}` failed: {reason}")]
    Command {
        /// The command line that was run.
        command: String,
        /// What went wrong.
        reason: String,
    },

    /// Command output could not be parsed.
    #[error("failed to parse {what}: {reason}")]
    Parse {
        /// What was being parsed.
        what: &'static str,
        /// Parser message.
        reason: String,
    },

    /// Logging could not be set up.
    #[error("logging setup failed: {0}")]
    Logging(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for ExporterError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            Self::RateLimited(e) if e.is_retryable() => {
                (StatusCode::TOO_MANY_REQUESTS, "rate_limited")
            }
            Self::RateLimited(_) => (StatusCode::SERVICE_UNAVAILABLE, "shutting_down"),
            Self::BindFailed(_, _)
            | Self::Encode(_)
            | Self::Command { .. }
            | Self::Parse { .. }
            | Self::Logging(_)
            | Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        let body = ErrorResponse {
            error: error_type.to_string(),
            message: self.to_string(),
        };

        let json = serde_json::to_string(&body).unwrap_or_else(|_| {
            r#"{"error":"internal_error","message":"failed to serialize error"}"#.to_string()
        });

        (status, [("content-type", "application/json")], json).into_response()
    }
}

impl From<ExporterError> for tc_metrics::MetricsError {
    fn from(err: ExporterError) -> Self {
        Self::source_error(err)
    }
}
