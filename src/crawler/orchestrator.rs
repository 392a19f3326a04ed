//! Batch orchestration
//!
//! The orchestrator turns a batch of entity requests into a run report. One
//! worker per entity, admission capped by a semaphore, duplicates folded
//! through the dedupe cache so each key resolves at most once. A single
//! cancel flag (external request or run deadline) stops admission and
//! abandons in-flight attempts.

use crate::cache::{Claim, DedupeCache};
use crate::classify::Verdict;
use crate::config::LimitsConfig;
use crate::crawler::cancel::{cancel_pair, CancelToken};
use crate::stats::RunStatistics;
use crate::strategy::StrategyChain;
use crate::task::{EntityRequest, EntityTask, FailureReason};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Outcome of one batch run
pub struct RunReport {
    pub stats: RunStatistics,
    /// One terminal task per unique entity key, sorted by key
    pub tasks: Vec<Arc<EntityTask>>,
}

pub struct Orchestrator {
    chain: Arc<StrategyChain>,
    cache: Arc<DedupeCache>,
    max_concurrent: usize,
    run_deadline: Option<Duration>,
}

impl Orchestrator {
    pub fn new(chain: Arc<StrategyChain>, limits: &LimitsConfig) -> Self {
        Self {
            chain,
            cache: Arc::new(DedupeCache::new()),
            max_concurrent: limits.max_concurrent as usize,
            run_deadline: limits.run_deadline_secs.map(Duration::from_secs),
        }
    }

    /// Runs the batch to completion or cancellation
    pub async fn run_batch(
        &self,
        requests: Vec<EntityRequest>,
        external: CancelToken,
    ) -> RunReport {
        let (handle, token) = cancel_pair();

        // One watcher folds the external cancel request and the run deadline
        // into the internal flag
        let watcher = {
            let external = external.clone();
            let deadline = self.run_deadline;
            tokio::spawn(async move {
                let deadline_wait = async {
                    match deadline {
                        Some(d) => tokio::time::sleep(d).await,
                        None => std::future::pending().await,
                    }
                };
                tokio::select! {
                    _ = external.cancelled() => {
                        tracing::info!("Cancellation requested, stopping run");
                    }
                    _ = deadline_wait => {
                        tracing::info!("Run deadline reached, stopping run");
                    }
                }
                handle.cancel();
            })
        };

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut workers = JoinSet::new();

        for request in requests {
            let chain = Arc::clone(&self.chain);
            let cache = Arc::clone(&self.cache);
            let semaphore = Arc::clone(&semaphore);
            let token = token.clone();

            workers.spawn(async move {
                let key = request.key();
                match cache.claim(&key).await {
                    Claim::Cached(task) => {
                        tracing::debug!("{}: served from dedupe cache", key);
                        (task, true)
                    }
                    Claim::Owner(ticket) => {
                        let permit = tokio::select! {
                            permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
                            _ = token.cancelled() => None,
                        };

                        let mut task = EntityTask::new(request);
                        match permit {
                            Some(_permit) => chain.resolve(&mut task, &token).await,
                            None => {
                                // Never admitted before the run stopped
                                task.start();
                                task.fail(FailureReason::Verdict(Verdict::Cancelled));
                            }
                        }

                        let task = Arc::new(task);
                        cache.fulfill(ticket, Arc::clone(&task));
                        (task, false)
                    }
                }
            });
        }

        let mut stats = RunStatistics::new();
        let mut tasks = Vec::new();
        while let Some(result) = workers.join_next().await {
            match result {
                Ok((_, true)) => stats.record_deduplicated(),
                Ok((task, false)) => {
                    stats.record_terminal(&task);
                    tasks.push(task);
                }
                Err(e) => tracing::error!("Worker failed: {}", e),
            }
        }
        watcher.abort();

        tasks.sort_by(|a, b| a.key.cmp(&b.key));
        RunReport { stats, tasks }
    }
}
