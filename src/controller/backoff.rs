//! # Requeue Rate Limiting
//!
//! Decides how long a failed key waits before it is reconciled again.
//!
//! Two limits apply to every retry and the later of them wins:
//!
//! - `ItemExponentialBackoff` - per key, `base * 2^failures`, capped at `max`
//! - `OverallRateLimiter` - `governor` limiter shared by all keys,
//!   bounding the overall retry rate
//!
//! Retries are unbounded; a permanently broken claim settles at the capped delay.
//!
//! ## Usage
//!
//! ```rust
//! use generic_secrets_controller::controller::backoff::{ItemExponentialBackoff, RateLimiter};
//! use std::time::Duration;
//!
//! let limiter = ItemExponentialBackoff::new(Duration::from_millis(5), Duration::from_secs(1000));
//! assert_eq!(limiter.when("ns/a"), Duration::from_millis(5));
//! assert_eq!(limiter.when("ns/a"), Duration::from_millis(10));
//! assert_eq!(limiter.when("ns/a"), Duration::from_millis(20));
//! limiter.forget("ns/a");
//! assert_eq!(limiter.when("ns/a"), Duration::from_millis(5));
//! ```

use governor::{DefaultDirectRateLimiter, Quota};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

/// Computes requeue delays per key
pub trait RateLimiter: Send + Sync + std::fmt::Debug {
    /// Delay before `key` may be processed again; records one more failure
    fn when(&self, key: &str) -> Duration;

    /// Stop tracking `key`, resetting its backoff
    fn forget(&self, key: &str);

    /// Failures recorded for `key` since it was last forgotten
    fn num_requeues(&self, key: &str) -> u32;
}

/// Per-key exponential backoff
#[derive(Debug)]
pub struct ItemExponentialBackoff {
    base: Duration,
    max: Duration,
    failures: Mutex<HashMap<String, u32>>,
}

impl ItemExponentialBackoff {
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            failures: Mutex::new(HashMap::new()),
        }
    }

    fn delay_for(&self, failures: u32) -> Duration {
        // 2^63 already exceeds any sane cap
        let exp = failures.min(63);
        let factor = 1u64 << exp;
        let nanos = u64::try_from(self.base.as_nanos())
            .unwrap_or(u64::MAX)
            .saturating_mul(factor);
        Duration::from_nanos(nanos).min(self.max)
    }
}

impl RateLimiter for ItemExponentialBackoff {
    fn when(&self, key: &str) -> Duration {
        let mut failures = match self.failures.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let count = failures.entry(key.to_string()).or_insert(0);
        let delay = self.delay_for(*count);
        *count = count.saturating_add(1);
        delay
    }

    fn forget(&self, key: &str) {
        let mut failures = match self.failures.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        failures.remove(key);
    }

    fn num_requeues(&self, key: &str) -> u32 {
        let failures = match self.failures.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        failures.get(key).copied().unwrap_or(0)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum RateLimitConfigError {
    #[error("requeue rate must be a positive number of events per second, got {0}")]
    InvalidQps(f64),
    #[error("requeue burst must be at least 1")]
    ZeroBurst,
}

/// Token bucket shared by all keys
///
/// Grants `burst` requeues at once and refills at `qps` per second. Keys are
/// not tracked.
pub struct OverallRateLimiter {
    limiter: DefaultDirectRateLimiter,
}

impl std::fmt::Debug for OverallRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverallRateLimiter").finish_non_exhaustive()
    }
}

impl OverallRateLimiter {
    /// # Errors
    ///
    /// Returns `RateLimitConfigError` if `qps` is not positive and finite or
    /// `burst` is zero.
    pub fn new(qps: f64, burst: u32) -> Result<Self, RateLimitConfigError> {
        let burst = NonZeroU32::new(burst).ok_or(RateLimitConfigError::ZeroBurst)?;
        let quota = Duration::try_from_secs_f64(1.0 / qps)
            .ok()
            .and_then(Quota::with_period)
            .ok_or(RateLimitConfigError::InvalidQps(qps))?;
        Ok(Self {
            limiter: DefaultDirectRateLimiter::direct(quota.allow_burst(burst)),
        })
    }

    /// Take one token, waiting for the bucket to refill if it is empty
    pub async fn until_ready(&self) {
        self.limiter.until_ready().await;
    }

    /// Take one token if one is available right now
    #[must_use]
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }
}
