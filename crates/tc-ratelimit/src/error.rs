//! Error types for the rate limiter.

use thiserror::Error;

/// Errors returned by [`crate::RateLimiter`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateLimitError {
    /// No token is available right now. Retryable.
    #[error("rate limited: no tokens available")]
    RateLimited,

    /// The bucket capacity was zero.
    #[error("rate limit error: bucket size must be greater than zero")]
    InvalidSize,

    /// The bucket capacity was above what the token pool can hold.
    #[error("rate limit error: bucket size must not exceed {max}")]
    SizeTooLarge {
        /// Largest accepted capacity.
        max: usize,
    },

    /// The refill interval was zero.
    #[error("rate limit error: time interval must be greater than zero")]
    InvalidInterval,

    /// The limiter has been stopped. Permanent.
    #[error("rate limiter is closed")]
    Closed,

    /// The limiter was constructed outside a tokio runtime.
    #[error("rate limiter requires a running tokio runtime")]
    NoRuntime,
}

impl RateLimitError {
    /// Returns true when a later attempt may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited)
    }
}

/// Result type for rate limiter operations.
pub type Result<T> = std::result::Result<T, RateLimitError>;
