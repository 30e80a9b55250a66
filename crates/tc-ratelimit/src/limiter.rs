//! Token bucket with background refill.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{Semaphore, TryAcquireError};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::error::{RateLimitError, Result};

/// A token-bucket rate limiter.
///
/// Tokens live in a semaphore sized to the bucket capacity. Acquiring a token
/// forgets the permit; the refill task is the only producer and never raises
/// the permit count above capacity.
#[derive(Debug)]
pub struct RateLimiter {
    tokens: Arc<Semaphore>,
    interval: Duration,
    capacity: usize,
    closed: AtomicBool,
    cancel: CancellationToken,
    refill: Mutex<Option<JoinHandle<()>>>,
}

impl RateLimiter {
    /// Creates a limiter with a full bucket of `capacity` tokens that gains
    /// one token every `interval`.
    ///
    /// Must be called from within a tokio runtime; the refill task is spawned
    /// on the current runtime.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitError::InvalidSize`] when `capacity` is zero,
    /// [`RateLimitError::SizeTooLarge`] above [`Semaphore::MAX_PERMITS`],
    /// [`RateLimitError::InvalidInterval`] when `interval` is zero, and
    /// [`RateLimitError::NoRuntime`] outside a runtime.
    pub fn new(interval: Duration, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(RateLimitError::InvalidSize);
        }
        if capacity > Semaphore::MAX_PERMITS {
            return Err(RateLimitError::SizeTooLarge {
                max: Semaphore::MAX_PERMITS,
            });
        }
        if interval.is_zero() {
            return Err(RateLimitError::InvalidInterval);
        }
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| RateLimitError::NoRuntime)?;

        let tokens = Arc::new(Semaphore::new(capacity));
        let cancel = CancellationToken::new();
        let task = runtime.spawn(refill_tokens(
            Arc::clone(&tokens),
            capacity,
            interval,
            cancel.clone(),
        ));

        debug!(interval = ?interval, capacity, "rate limiter started");

        Ok(Self {
            tokens,
            interval,
            capacity,
            closed: AtomicBool::new(false),
            cancel,
            refill: Mutex::new(Some(task)),
        })
    }

    /// Takes one token without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitError::RateLimited`] when the bucket is empty and
    /// [`RateLimitError::Closed`] once the limiter has been stopped.
    pub fn get(&self) -> Result<()> {
        if self.is_closed() {
            return Err(RateLimitError::Closed);
        }
        match self.tokens.try_acquire() {
            Ok(permit) => {
                permit.forget();
                Ok(())
            }
            Err(TryAcquireError::NoPermits) => Err(RateLimitError::RateLimited),
            Err(TryAcquireError::Closed) => Err(RateLimitError::Closed),
        }
    }

    /// Waits up to `timeout` for a token.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitError::RateLimited`] if the timeout elapses first and
    /// [`RateLimitError::Closed`] if the limiter is stopped before or while
    /// waiting.
    pub async fn try_get_with_timeout(&self, timeout: Duration) -> Result<()> {
        if self.is_closed() {
            return Err(RateLimitError::Closed);
        }
        match time::timeout(timeout, self.tokens.acquire()).await {
            Ok(Ok(permit)) => {
                permit.forget();
                Ok(())
            }
            Ok(Err(_)) => Err(RateLimitError::Closed),
            Err(_) => Err(RateLimitError::RateLimited),
        }
    }

    /// Stops the limiter.
    ///
    /// Cancels the refill task, waits for it to exit, then closes the bucket
    /// so that pending [`Self::try_get_with_timeout`] callers return
    /// [`RateLimitError::Closed`]. Calling this more than once is a no-op.
    pub async fn stop(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.cancel.cancel();
        let task = self.refill.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "rate limiter refill task did not exit cleanly");
            }
        }
        self.tokens.close();

        info!("rate limiter stopped");
    }

    /// Returns true once [`Self::stop`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Returns the refill interval.
    #[must_use]
    pub const fn limit(&self) -> Duration {
        self.interval
    }

    /// Returns the bucket capacity.
    #[must_use]
    pub const fn bucket_size(&self) -> usize {
        self.capacity
    }

    /// Returns the number of tokens currently in the bucket, or zero when
    /// closed. The value is a snapshot and may be stale under contention.
    #[must_use]
    pub fn available_tokens(&self) -> usize {
        if self.is_closed() {
            return 0;
        }
        self.tokens.available_permits()
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.tokens.close();
    }
}

async fn refill_tokens(
    tokens: Arc<Semaphore>,
    capacity: usize,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if tokens.available_permits() < capacity {
                    tokens.add_permits(1);
                } else {
                    trace!("bucket full, refill dropped");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    #[tokio::test]
    async fn test_new_rejects_zero_capacity() {
        let err = RateLimiter::new(Duration::from_secs(1), 0).unwrap_err();
        assert_eq!(err, RateLimitError::InvalidSize);
    }

    #[tokio::test]
    async fn test_new_rejects_oversized_capacity() {
        let err = RateLimiter::new(Duration::from_millis(10), usize::MAX).unwrap_err();
        assert_eq!(
            err,
            RateLimitError::SizeTooLarge {
                max: Semaphore::MAX_PERMITS
            }
        );

        let limiter = RateLimiter::new(HOUR, Semaphore::MAX_PERMITS).unwrap();
        assert!(limiter.get().is_ok());
        limiter.stop().await;
    }

    #[tokio::test]
    async fn test_new_rejects_zero_interval() {
        let err = RateLimiter::new(Duration::ZERO, 10).unwrap_err();
        assert_eq!(err, RateLimitError::InvalidInterval);
    }

    #[test]
    fn test_new_outside_runtime() {
        let err = RateLimiter::new(Duration::from_secs(1), 1).unwrap_err();
        assert_eq!(err, RateLimitError::NoRuntime);
    }

    #[tokio::test]
    async fn test_bucket_starts_full() {
        let limiter = RateLimiter::new(HOUR, 5).unwrap();
        assert_eq!(limiter.available_tokens(), 5);
        assert_eq!(limiter.bucket_size(), 5);
        assert_eq!(limiter.limit(), HOUR);
        assert!(!limiter.is_closed());
    }

    #[tokio::test]
    async fn test_get_exhausts_capacity() {
        let limiter = RateLimiter::new(HOUR, 3).unwrap();
        for _ in 0..3 {
            limiter.get().unwrap();
        }
        assert_eq!(limiter.get(), Err(RateLimitError::RateLimited));
        assert_eq!(limiter.available_tokens(), 0);
    }

    #[tokio::test]
    async fn test_refill_adds_tokens() {
        let limiter = RateLimiter::new(Duration::from_millis(10), 2).unwrap();
        limiter.get().unwrap();
        limiter.get().unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;

        let available = limiter.available_tokens();
        assert!(available >= 1);
        assert!(available <= 2);
    }

    #[tokio::test]
    async fn test_refill_never_exceeds_capacity() {
        let limiter = RateLimiter::new(Duration::from_millis(5), 3).unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(limiter.available_tokens(), 3);
    }

    #[tokio::test]
    async fn test_try_get_with_timeout_times_out() {
        let limiter = RateLimiter::new(HOUR, 1).unwrap();
        limiter.get().unwrap();

        let result = limiter
            .try_get_with_timeout(Duration::from_millis(20))
            .await;
        assert_eq!(result, Err(RateLimitError::RateLimited));
    }

    #[tokio::test]
    async fn test_try_get_with_timeout_waits_for_refill() {
        let limiter = RateLimiter::new(Duration::from_millis(10), 1).unwrap();
        limiter.get().unwrap();

        let result = limiter.try_get_with_timeout(Duration::from_secs(5)).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_stop_closes_limiter() {
        let limiter = RateLimiter::new(HOUR, 4).unwrap();
        limiter.stop().await;

        assert!(limiter.is_closed());
        assert_eq!(limiter.get(), Err(RateLimitError::Closed));
        assert_eq!(limiter.available_tokens(), 0);
        assert_eq!(
            limiter.try_get_with_timeout(Duration::from_millis(5)).await,
            Err(RateLimitError::Closed)
        );
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let limiter = RateLimiter::new(HOUR, 1).unwrap();
        limiter.stop().await;
        limiter.stop().await;
        assert!(limiter.is_closed());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stop_wakes_blocked_waiter() {
        let limiter = Arc::new(RateLimiter::new(HOUR, 1).unwrap());
        limiter.get().unwrap();

        let waiter = {
            let limiter = Arc::clone(&limiter);
            tokio::spawn(async move { limiter.try_get_with_timeout(HOUR).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        limiter.stop().await;

        let result = tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result, Err(RateLimitError::Closed));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_get_respects_capacity() {
        let limiter = Arc::new(RateLimiter::new(HOUR, 10).unwrap());
        let mut handles = Vec::new();
        for _ in 0..50 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move { limiter.get().is_ok() }));
        }

        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                granted += 1;
            }
        }
        assert_eq!(granted, 10);
    }
}
