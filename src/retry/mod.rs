//! Retry and backoff control
//!
//! One `RetryController` covers one (entity, strategy) pairing. It decides,
//! from a verdict and the attempt count so far, whether the strategy gets
//! another attempt after a backoff delay or hands control back to the chain
//! for escalation. The decision is pure: delays are computed here, slept by
//! the caller, so the whole state machine unit-tests without a clock.

use crate::classify::Verdict;
use rand::Rng;
use std::time::Duration;

/// Backoff and attempt-budget parameters for one strategy execution
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum attempts per strategy, counting the first one
    pub max_attempts: u32,
    pub base: Duration,
    pub factor: f64,
    /// Relative jitter, e.g. 0.2 for ±20%
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base: Duration::from_secs(1),
            factor: 2.0,
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    /// Backoff delay before attempt number `attempt + 1`
    ///
    /// `base * factor^attempt`, scaled by a uniform `1 ± jitter` factor.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = self.base.as_secs_f64() * self.factor.powi(attempt as i32);
        let spread = if self.jitter > 0.0 {
            rand::thread_rng().gen_range(1.0 - self.jitter..=1.0 + self.jitter)
        } else {
            1.0
        };
        Duration::from_secs_f64((exp * spread).max(0.0))
    }
}

/// What the chain should do with the current strategy next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for the delay, then retry the same strategy
    Retry(DurationMs),
    /// Stop this strategy and move to the next one in priority order
    Escalate,
}

/// Millisecond wrapper so `RetryDecision` stays `Eq` for assertions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurationMs(pub u64);

impl DurationMs {
    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(self.0)
    }
}

/// Attempt bookkeeping for one (entity, strategy) pairing
#[derive(Debug)]
pub struct RetryController {
    policy: RetryPolicy,
    attempts: u32,
}

impl RetryController {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy, attempts: 0 }
    }

    /// Records one finished attempt and decides what happens next
    ///
    /// - `TransientError` / `RateLimited` / `SoftBlock`: retry with
    ///   exponential backoff while the attempt budget lasts, then escalate.
    /// - `HardBlock`: escalate immediately. The WAF has identified this
    ///   egress as antagonistic; repeating the same strategy through it only
    ///   burns budget and deepens the cooldown.
    /// - `ParseFailure`: escalate immediately. The source answered but the
    ///   payload shape is wrong, and a different network path cannot fix a
    ///   structural mismatch.
    /// - `Success` / `Cancelled` are terminal for the whole entity; callers
    ///   handle them before consulting the controller, and a defensive call
    ///   here escalates.
    pub fn decide(&mut self, verdict: Verdict) -> RetryDecision {
        self.attempts += 1;
        match verdict {
            Verdict::TransientError | Verdict::RateLimited | Verdict::SoftBlock => {
                if self.attempts < self.policy.max_attempts {
                    let delay = self.policy.backoff_delay(self.attempts - 1);
                    RetryDecision::Retry(DurationMs(delay.as_millis() as u64))
                } else {
                    RetryDecision::Escalate
                }
            }
            Verdict::HardBlock | Verdict::ParseFailure => RetryDecision::Escalate,
            Verdict::Success | Verdict::Cancelled => RetryDecision::Escalate,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
