//! Process-wide token bucket guarding the upstream catalog.

use governor::clock::{Clock, DefaultClock};
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as Governor};
use nonzero_ext::nonzero;
use std::fmt;
use std::num::NonZeroU32;
use std::time::Duration;

use crate::config::RateLimitConfig;

/// Raised when no token became available within the configured wait
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("request budget exhausted, retry after {retry_after:?}")]
pub struct Throttled {
    pub retry_after: Duration,
}

/// Interval between refills, or `None` when `requests_per_second` is not a
/// positive rate governor can represent
pub fn refill_period(requests_per_second: f64) -> Option<Duration> {
    if !(requests_per_second.is_finite() && requests_per_second > 0.0) {
        return None;
    }
    let period = Duration::try_from_secs_f64(1.0 / requests_per_second).ok()?;
    (!period.is_zero()).then_some(period)
}

/// Token bucket refilled at `requests_per_second`, holding up to `burst` tokens
pub struct RateLimiter {
    limiter: Governor<NotKeyed, InMemoryState, DefaultClock>,
    clock: DefaultClock,
    max_wait: Duration,
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("max_wait", &self.max_wait)
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    /// Rates without a usable [`refill_period`] fall back to one per second;
    /// `Config::validate` rejects them before they get here.
    pub fn new(requests_per_second: f64, burst: u32, max_wait: Duration) -> Self {
        let period = refill_period(requests_per_second).unwrap_or_else(|| {
            tracing::warn!(requests_per_second, "Unusable request rate, limiting to 1 per second");
            Duration::from_secs(1)
        });
        let burst = NonZeroU32::new(burst).unwrap_or(nonzero!(1u32));
        let quota = Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_second(nonzero!(1u32)))
            .allow_burst(burst);

        Self {
            limiter: Governor::direct(quota),
            clock: DefaultClock::default(),
            max_wait,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.requests_per_second, config.burst, config.max_wait())
    }

    /// Take one token, waiting at most `max_wait` for it
    pub async fn acquire(&self) -> Result<(), Throttled> {
        if self.limiter.check().is_ok() {
            return Ok(());
        }

        tracing::debug!(max_wait = ?self.max_wait, "Upstream budget exhausted, waiting for a token");
        if tokio::time::timeout(self.max_wait, self.limiter.until_ready())
            .await
            .is_ok()
        {
            return Ok(());
        }

        match self.limiter.check() {
            Ok(()) => Ok(()),
            Err(not_until) => {
                let retry_after = not_until.wait_time_from(self.clock.now());
                tracing::warn!(?retry_after, "Rate limit wait exceeded");
                Err(Throttled { retry_after })
            }
        }
    }
}
