//! Process-wide pacing of upstream calls.
//!
//! The upstream usage policy allows at most one request per second, so every
//! fetch goes through one shared [`RateLimiter`]. Pacing is global, not per
//! query.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

use super::{FetchError, LocationFetcher};
use crate::location::Location;

/// Grants call slots at least `min_interval` apart.
///
/// Each caller takes the lock just long enough to reserve the slot after the
/// previous one and stamp it as the last call, then sleeps until that slot
/// without holding the lock. With N callers arriving together the last one
/// starts no earlier than `(N - 1) * min_interval` after the first.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Creates a limiter; the first call is never delayed.
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    /// The minimum spacing between granted calls.
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Waits until the caller may proceed.
    ///
    /// A caller dropped while waiting forfeits its slot; later callers are not
    /// moved forward.
    pub async fn acquire(&self) {
        let slot = {
            let mut last_call = self.last_call.lock();
            let now = Instant::now();
            let slot = match *last_call {
                Some(previous) => now.max(previous + self.min_interval),
                None => now,
            };
            *last_call = Some(slot);
            slot
        };

        let wait = slot.saturating_duration_since(Instant::now());
        if !wait.is_zero() {
            debug!(wait_ms = wait.as_millis() as u64, "throttling upstream call");
            tokio::time::sleep_until(slot).await;
        }
    }
}

/// A fetcher whose calls are paced by a shared [`RateLimiter`].
///
/// Only the start of each call is paced; the wrapped fetch runs after the
/// limiter is released, so a slow upstream does not stretch the window for
/// other callers.
#[derive(Debug)]
pub struct Throttled<F> {
    inner: F,
    limiter: Arc<RateLimiter>,
}

impl<F> Throttled<F> {
    /// Wraps `inner` so every call first waits on `limiter`.
    pub fn new(inner: F, limiter: Arc<RateLimiter>) -> Self {
        Self { inner, limiter }
    }
}

#[async_trait]
impl<F> LocationFetcher for Throttled<F>
where
    F: LocationFetcher,
{
    async fn fetch(&self, query: &str) -> Result<Vec<Location>, FetchError> {
        self.limiter.acquire().await;
        self.inner.fetch(query).await
    }
}
