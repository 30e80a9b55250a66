//! # tc-ratelimit
//!
//! Token-bucket rate limiting for the tc-exporter scrape endpoint.
//!
//! The bucket starts full. A background task adds one token per refill
//! interval and drops the token when the bucket is already at capacity, so
//! idle time never accumulates beyond the configured burst.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use tc_ratelimit::{RateLimiter, RateLimitError};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), RateLimitError> {
//! let limiter = RateLimiter::new(Duration::from_secs(1), 2)?;
//!
//! assert!(limiter.get().is_ok());
//! assert!(limiter.get().is_ok());
//! assert!(matches!(limiter.get(), Err(RateLimitError::RateLimited)));
//!
//! limiter.stop().await;
//! assert!(matches!(limiter.get(), Err(RateLimitError::Closed)));
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod limiter;

pub use error::{RateLimitError, Result};
pub use limiter::RateLimiter;
