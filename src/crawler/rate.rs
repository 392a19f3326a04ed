//! Global request pacing
//!
//! One gate paces every request the run makes, across all workers and
//! strategies: a requests-per-minute budget plus a minimum spacing between
//! consecutive requests. Sites see the whole process as one polite client
//! regardless of concurrency.

use crate::config::LimitsConfig;
use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use parking_lot::Mutex;
use std::num::NonZeroU32;
use std::time::{Duration, Instant};

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

pub struct RateGate {
    limiter: Option<DirectLimiter>,
    min_interval: Duration,
    last_release: Mutex<Option<Instant>>,
}

impl RateGate {
    pub fn new(requests_per_minute: u32, min_interval: Duration) -> Self {
        let limiter = NonZeroU32::new(requests_per_minute)
            .map(|rpm| RateLimiter::direct(Quota::per_minute(rpm)));
        Self {
            limiter,
            min_interval,
            last_release: Mutex::new(None),
        }
    }

    pub fn from_limits(limits: &LimitsConfig) -> Self {
        Self::new(
            limits.requests_per_minute,
            Duration::from_millis(limits.request_interval_ms),
        )
    }

    /// Waits until the caller may issue one request
    pub async fn acquire(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }

        if self.min_interval.is_zero() {
            return;
        }

        // The lock is never held across an await; losing a race just means
        // another round of sleeping
        loop {
            let wait = {
                let mut last = self.last_release.lock();
                let now = Instant::now();
                match *last {
                    Some(prev) if now < prev + self.min_interval => {
                        prev + self.min_interval - now
                    }
                    _ => {
                        *last = Some(now);
                        return;
                    }
                }
            };
            tokio::time::sleep(wait).await;
        }
    }
}
