//! Per-endpoint health state
//!
//! One `EndpointHealth` per catalog endpoint, owned exclusively by the pool
//! and mutated only through its record-outcome path. All methods take an
//! explicit `now` so cooldown behavior is testable with simulated time.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Mutable health counters and cooldown for one proxy endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct EndpointHealth {
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub total_attempts: u64,
    pub total_successes: u64,
}

impl EndpointHealth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the endpoint is inside an active cooldown window
    ///
    /// An expired window counts as cleared; the stale timestamp is dropped on
    /// the next mutation.
    pub fn in_cooldown(&self, now: DateTime<Utc>) -> bool {
        matches!(self.cooldown_until, Some(until) if now < until)
    }

    /// Records a successful attempt through this endpoint
    pub fn record_success(&mut self, now: DateTime<Utc>) {
        self.consecutive_failures = 0;
        self.consecutive_successes += 1;
        self.total_attempts += 1;
        self.total_successes += 1;
        self.last_checked_at = Some(now);
        if !self.in_cooldown(now) {
            self.cooldown_until = None;
        }
    }

    /// Records a failed attempt; starts a cooldown once `failure_threshold`
    /// consecutive failures accumulate
    pub fn record_failure(
        &mut self,
        now: DateTime<Utc>,
        failure_threshold: u32,
        cooldown: Duration,
    ) {
        self.consecutive_successes = 0;
        self.consecutive_failures += 1;
        self.total_attempts += 1;
        self.last_checked_at = Some(now);
        if self.consecutive_failures >= failure_threshold {
            self.start_cooldown(now, cooldown);
        }
    }

    /// Puts the endpoint into cooldown immediately, regardless of counters
    ///
    /// Used on hard blocks: one WAF hit is enough evidence.
    pub fn force_cooldown(&mut self, now: DateTime<Utc>, cooldown: Duration) {
        self.consecutive_successes = 0;
        self.consecutive_failures += 1;
        self.total_attempts += 1;
        self.last_checked_at = Some(now);
        self.start_cooldown(now, cooldown);
    }

    fn start_cooldown(&mut self, now: DateTime<Utc>, cooldown: Duration) {
        let until = now + cooldown;
        // Never shorten an already-longer cooldown
        if self.cooldown_until.map_or(true, |existing| until > existing) {
            self.cooldown_until = Some(until);
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_attempts == 0 {
            return 0.0;
        }
        self.total_successes as f64 / self.total_attempts as f64
    }
}
