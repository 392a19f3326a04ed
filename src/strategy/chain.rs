//! Strategy fallback chain
//!
//! The chain walks the enabled strategies in priority order and owns all
//! escalation decisions for one entity:
//!
//! - transient trouble retries the same strategy with exponential backoff
//! - a hard block through a proxy retries the same strategy through a
//!   different egress (the blocked endpoint is cooling down, so selection
//!   moves on); a hard block through direct egress escalates
//! - a parse failure escalates immediately, a different network path cannot
//!   fix a structural mismatch
//! - an exhausted pool escalates, and ends the entity when no strategies
//!   remain
//!
//! Every attempt passes the rate gate first and is recorded on the task and
//! reported to the pool, whatever its verdict.

use crate::classify::{Classifier, MarkerProbe, PayloadProbe, TransportError, Verdict};
use crate::config::LimitsConfig;
use crate::crawler::{CancelToken, RateGate};
use crate::proxy::{ProxyPool, ProxyExhausted};
use crate::retry::{RetryController, RetryDecision, RetryPolicy};
use crate::strategy::Strategy;
use crate::task::{AcquisitionAttempt, EntityTask, FailureReason};
use crate::transport::Transport;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Per-attempt timeout and retry parameters shared by all strategies
#[derive(Debug, Clone, Copy)]
pub struct ChainPolicy {
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl ChainPolicy {
    pub fn from_limits(limits: &LimitsConfig) -> Self {
        Self {
            timeout: Duration::from_secs(limits.attempt_timeout_secs),
            retry: RetryPolicy {
                max_attempts: limits.retry_max_attempts,
                base: Duration::from_millis(limits.backoff_base_ms),
                factor: limits.backoff_factor,
                jitter: limits.backoff_jitter,
            },
        }
    }
}

pub struct StrategyChain {
    strategies: Vec<Arc<dyn Strategy>>,
    pool: Arc<ProxyPool>,
    gate: Arc<RateGate>,
    transport: Arc<dyn Transport>,
    classifier: Classifier,
    policy: ChainPolicy,
}

impl StrategyChain {
    pub fn new(
        mut strategies: Vec<Arc<dyn Strategy>>,
        pool: Arc<ProxyPool>,
        gate: Arc<RateGate>,
        transport: Arc<dyn Transport>,
        classifier: Classifier,
        policy: ChainPolicy,
    ) -> Self {
        strategies.sort_by_key(|s| s.descriptor().priority);
        Self {
            strategies,
            pool,
            gate,
            transport,
            classifier,
            policy,
        }
    }

    pub fn strategy_count(&self) -> usize {
        self.strategies.len()
    }

    /// Resolves one entity to a terminal state
    pub async fn resolve(&self, task: &mut EntityTask, cancel: &CancelToken) {
        task.start();
        let mut last_failure: Option<FailureReason> = None;

        'strategies: for strategy in &self.strategies {
            let descriptor = strategy.descriptor();
            let probe = MarkerProbe::new(descriptor.payload_markers.clone());
            let mut controller = RetryController::new(self.policy.retry);
            // Egress paths this strategy was hard-blocked through
            let mut blocked: HashSet<String> = HashSet::new();

            loop {
                if cancel.is_cancelled() {
                    task.fail(FailureReason::Verdict(Verdict::Cancelled));
                    return;
                }

                // Pace first, pick the path second: an endpoint chosen before
                // a long gate wait could be cooling down by the time it fires
                tokio::select! {
                    _ = self.gate.acquire() => {}
                    _ = cancel.cancelled() => {
                        task.fail(FailureReason::Verdict(Verdict::Cancelled));
                        return;
                    }
                }

                let egress = match self.pool.select_egress(&descriptor.site) {
                    Ok(egress) => egress,
                    Err(ProxyExhausted) => {
                        tracing::warn!(
                            "No egress left for {} on {}, escalating",
                            task.key,
                            descriptor.name
                        );
                        last_failure = Some(FailureReason::ProxyExhausted);
                        continue 'strategies;
                    }
                };

                let egress_id = egress.key().unwrap_or_else(|| "direct".to_string());
                if blocked.contains(&egress_id) {
                    // The pool is cycling back to a path this strategy was
                    // already blocked through; nothing new to try here
                    last_failure = Some(FailureReason::Verdict(Verdict::HardBlock));
                    continue 'strategies;
                }

                let started_at = Utc::now();
                let start = Instant::now();
                let outcome = tokio::select! {
                    result = tokio::time::timeout(
                        self.policy.timeout,
                        strategy.acquire(
                            &task.request,
                            &egress,
                            self.transport.as_ref(),
                            self.policy.timeout,
                        ),
                    ) => match result {
                        Ok(outcome) => outcome,
                        Err(_) => Err(TransportError::Timeout),
                    },
                    _ = cancel.cancelled() => Err(TransportError::Cancelled),
                };

                let confirmed = outcome
                    .as_ref()
                    .map(|response| probe.confirm(response))
                    .unwrap_or(false);
                let verdict = self
                    .classifier
                    .classify(&outcome, descriptor.expected, confirmed);

                task.push_attempt(AcquisitionAttempt {
                    entity_key: task.key.clone(),
                    strategy: descriptor.name.clone(),
                    egress: egress.label(),
                    started_at,
                    duration_ms: start.elapsed().as_millis() as u64,
                    verdict,
                });
                self.pool.record_outcome(&egress, verdict);

                tracing::debug!(
                    "{}: {} via {} -> {}",
                    task.key,
                    descriptor.name,
                    egress.label(),
                    verdict
                );

                match verdict {
                    Verdict::Success => {
                        if let Ok(response) = outcome {
                            task.succeed(&descriptor.name, response);
                        }
                        return;
                    }
                    Verdict::Cancelled => {
                        task.fail(FailureReason::Verdict(Verdict::Cancelled));
                        return;
                    }
                    Verdict::HardBlock => {
                        last_failure = Some(FailureReason::Verdict(verdict));
                        blocked.insert(egress_id);
                        if egress.is_direct() {
                            // There is no other direct path to rotate to
                            continue 'strategies;
                        }
                        // The blocked endpoint is cooling down; try the same
                        // strategy through whatever the pool offers next
                        continue;
                    }
                    Verdict::ParseFailure => {
                        last_failure = Some(FailureReason::Verdict(verdict));
                        continue 'strategies;
                    }
                    Verdict::TransientError | Verdict::RateLimited | Verdict::SoftBlock => {
                        last_failure = Some(FailureReason::Verdict(verdict));
                        match controller.decide(verdict) {
                            RetryDecision::Retry(delay) => {
                                tokio::select! {
                                    _ = tokio::time::sleep(delay.as_duration()) => {}
                                    _ = cancel.cancelled() => {
                                        task.fail(FailureReason::Verdict(Verdict::Cancelled));
                                        return;
                                    }
                                }
                            }
                            RetryDecision::Escalate => continue 'strategies,
                        }
                    }
                }
            }
        }

        task.fail(last_failure.unwrap_or(FailureReason::ProxyExhausted));
    }
}
