//! Run statistics
//!
//! Aggregated counters for one batch run, folded in from terminal tasks and
//! rendered in the run summary.

use crate::classify::Verdict;
use crate::task::{EntityTask, FailureReason, TaskStatus};
use std::collections::BTreeMap;

/// Aggregated counters for a batch run
#[derive(Debug, Clone, Default)]
pub struct RunStatistics {
    /// Batch rows after deduplication
    pub total_entities: u64,
    /// Batch rows dropped because an earlier row shared their key
    pub deduplicated: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Failed entities whose last recorded reason was run cancellation
    pub cancelled: u64,
    /// Network attempts across all entities, successful or not
    pub total_attempts: u64,
    /// Entities with at least one hard-block verdict in their history
    pub waf_triggered: u64,
    /// Successful entities keyed by the strategy that produced the payload
    pub per_strategy_success: BTreeMap<String, u64>,
    /// Successful entities keyed by the egress label of the final attempt
    pub per_egress_success: BTreeMap<String, u64>,
}

impl RunStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one terminal task into the counters
    pub fn record_terminal(&mut self, task: &EntityTask) {
        self.total_entities += 1;
        self.total_attempts += task.attempts.len() as u64;
        if task.saw_hard_block() {
            self.waf_triggered += 1;
        }

        match task.status {
            TaskStatus::Succeeded => {
                self.succeeded += 1;
                if let Some(strategy) = &task.succeeded_via {
                    *self
                        .per_strategy_success
                        .entry(strategy.clone())
                        .or_default() += 1;
                }
                if let Some(attempt) = task.attempts.last() {
                    *self
                        .per_egress_success
                        .entry(attempt.egress.clone())
                        .or_default() += 1;
                }
            }
            TaskStatus::Failed => {
                self.failed += 1;
                if task.failure == Some(FailureReason::Verdict(Verdict::Cancelled)) {
                    self.cancelled += 1;
                }
            }
            TaskStatus::Pending | TaskStatus::InProgress => {
                debug_assert!(false, "non-terminal task folded into statistics");
            }
        }
    }

    pub fn record_deduplicated(&mut self) {
        self.deduplicated += 1;
    }

    /// Success ratio over all counted entities, 0.0 for an empty run
    pub fn success_rate(&self) -> f64 {
        if self.total_entities == 0 {
            return 0.0;
        }
        self.succeeded as f64 / self.total_entities as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::RawResponse;
    use crate::task::{AcquisitionAttempt, EntityRequest};
    use chrono::Utc;

    fn attempt(strategy: &str, egress: &str, verdict: Verdict) -> AcquisitionAttempt {
        AcquisitionAttempt {
            entity_key: "k".to_string(),
            strategy: strategy.to_string(),
            egress: egress.to_string(),
            started_at: Utc::now(),
            duration_ms: 10,
            verdict,
        }
    }

    fn payload() -> RawResponse {
        RawResponse {
            status: 200,
            content_type: Some("application/json".to_string()),
            body: "{}".to_string(),
            final_url: "https://example.test/q".to_string(),
        }
    }

    #[test]
    fn test_success_counted_per_strategy_and_egress() {
        let mut stats = RunStatistics::new();

        let mut task = EntityTask::new(EntityRequest::new("Civil Code"));
        task.start();
        task.push_attempt(attempt("database", "paid-1", Verdict::Success));
        task.succeed("database", payload());
        stats.record_terminal(&task);

        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.total_attempts, 1);
        assert_eq!(stats.per_strategy_success["database"], 1);
        assert_eq!(stats.per_egress_success["paid-1"], 1);
    }

    #[test]
    fn test_hard_block_history_counts_as_waf() {
        let mut stats = RunStatistics::new();

        let mut task = EntityTask::new(EntityRequest::new("Civil Code"));
        task.start();
        task.push_attempt(attempt("database", "paid-1", Verdict::HardBlock));
        task.push_attempt(attempt("search", "direct", Verdict::Success));
        task.succeed("search", payload());
        stats.record_terminal(&task);

        assert_eq!(stats.waf_triggered, 1);
        assert_eq!(stats.succeeded, 1);
    }

    #[test]
    fn test_cancelled_counted_within_failed() {
        let mut stats = RunStatistics::new();

        let mut task = EntityTask::new(EntityRequest::new("Civil Code"));
        task.start();
        task.fail(FailureReason::Verdict(Verdict::Cancelled));
        stats.record_terminal(&task);

        assert_eq!(stats.failed, 1);
        assert_eq!(stats.cancelled, 1);
    }

    #[test]
    fn test_success_rate() {
        let mut stats = RunStatistics::new();
        assert_eq!(stats.success_rate(), 0.0);

        let mut ok = EntityTask::new(EntityRequest::new("a"));
        ok.start();
        ok.succeed("database", payload());
        stats.record_terminal(&ok);

        let mut bad = EntityTask::new(EntityRequest::new("b"));
        bad.start();
        bad.fail(FailureReason::ProxyExhausted);
        stats.record_terminal(&bad);

        assert!((stats.success_rate() - 0.5).abs() < f64::EPSILON);
    }
}
