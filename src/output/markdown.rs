//! Markdown summary generation
//!
//! Renders a human-readable markdown summary of a batch run: statistics,
//! per-strategy and per-egress breakdowns, pool availability, and the full
//! attempt history of every failed entity.

use crate::output::{ReportError, RunSummary};
use crate::task::TaskStatus;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Writes the markdown summary to `output_path`
pub fn generate_markdown_summary(
    summary: &RunSummary,
    output_path: &Path,
) -> Result<(), ReportError> {
    let markdown = format_markdown_summary(summary);

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats a run summary as markdown
pub fn format_markdown_summary(summary: &RunSummary) -> String {
    let stats = &summary.stats;
    let mut md = String::new();

    md.push_str("# Lexfetch Run Summary\n\n");

    md.push_str("## Run Information\n\n");
    md.push_str(&format!("- **Started**: {}\n", summary.started_at));
    md.push_str(&format!("- **Finished**: {}\n", summary.finished_at));
    md.push_str(&format!(
        "- **Duration**: {} seconds\n",
        summary.duration_seconds()
    ));
    md.push_str(&format!("- **Config Hash**: {}\n\n", summary.config_hash));

    md.push_str("## Overall Statistics\n\n");
    md.push_str(&format!("- **Entities**: {}\n", stats.total_entities));
    md.push_str(&format!("- **Deduplicated**: {}\n", stats.deduplicated));
    md.push_str(&format!("- **Succeeded**: {}\n", stats.succeeded));
    md.push_str(&format!("- **Failed**: {}\n", stats.failed));
    md.push_str(&format!("- **Cancelled**: {}\n", stats.cancelled));
    md.push_str(&format!("- **Total Attempts**: {}\n", stats.total_attempts));
    md.push_str(&format!(
        "- **WAF-Triggered Entities**: {}\n",
        stats.waf_triggered
    ));
    md.push_str(&format!(
        "- **Success Rate**: {:.2}%\n\n",
        stats.success_rate() * 100.0
    ));

    if !stats.per_strategy_success.is_empty() {
        md.push_str("## Successes by Strategy\n\n");
        md.push_str("| Strategy | Entities |\n");
        md.push_str("|----------|----------|\n");
        for (strategy, count) in &stats.per_strategy_success {
            md.push_str(&format!("| {} | {} |\n", strategy, count));
        }
        md.push('\n');
    }

    if !stats.per_egress_success.is_empty() {
        md.push_str("## Successes by Egress\n\n");
        md.push_str("| Egress | Entities |\n");
        md.push_str("|--------|----------|\n");
        for (egress, count) in &stats.per_egress_success {
            md.push_str(&format!("| {} | {} |\n", egress, count));
        }
        md.push('\n');
    }

    md.push_str("## Proxy Pool\n\n");
    md.push_str("| Tier | Available | Total |\n");
    md.push_str("|------|-----------|-------|\n");
    md.push_str(&format!(
        "| paid | {} | {} |\n",
        summary.pool.paid_available, summary.pool.paid_total
    ));
    md.push_str(&format!(
        "| free | {} | {} |\n\n",
        summary.pool.free_available, summary.pool.free_total
    ));

    let failed: Vec<_> = summary
        .tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Failed)
        .collect();
    if !failed.is_empty() {
        md.push_str("## Failed Entities\n\n");
        for task in failed {
            let reason = task
                .failure
                .map(|r| r.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            md.push_str(&format!("### {} ({})\n\n", task.request.name, reason));
            if task.attempts.is_empty() {
                md.push_str("No attempts were made.\n\n");
                continue;
            }
            md.push_str("| # | Strategy | Egress | Verdict | Duration |\n");
            md.push_str("|---|----------|--------|---------|----------|\n");
            for (i, attempt) in task.attempts.iter().enumerate() {
                md.push_str(&format!(
                    "| {} | {} | {} | {} | {}ms |\n",
                    i + 1,
                    attempt.strategy,
                    attempt.egress,
                    attempt.verdict,
                    attempt.duration_ms
                ));
            }
            md.push('\n');
        }
    }

    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Verdict;
    use crate::proxy::PoolSnapshot;
    use crate::stats::RunStatistics;
    use crate::task::{AcquisitionAttempt, EntityRequest, EntityTask, FailureReason};
    use chrono::Utc;
    use std::sync::Arc;

    fn summary_with_tasks(tasks: Vec<EntityTask>) -> RunSummary {
        let mut stats = RunStatistics::new();
        for task in &tasks {
            stats.record_terminal(task);
        }
        RunSummary {
            started_at: Utc::now(),
            finished_at: Utc::now(),
            config_hash: "abc123".to_string(),
            stats,
            pool: PoolSnapshot {
                paid_total: 2,
                paid_available: 1,
                free_total: 3,
                free_available: 3,
            },
            tasks: tasks.into_iter().map(Arc::new).collect(),
        }
    }

    fn failed_task() -> EntityTask {
        let mut task = EntityTask::new(EntityRequest::new("Civil Code"));
        task.start();
        task.push_attempt(AcquisitionAttempt {
            entity_key: task.key.clone(),
            strategy: "database".to_string(),
            egress: "paid-hk-1".to_string(),
            started_at: Utc::now(),
            duration_ms: 412,
            verdict: Verdict::HardBlock,
        });
        task.fail(FailureReason::Verdict(Verdict::HardBlock));
        task
    }

    #[test]
    fn test_summary_contains_core_sections() {
        let md = format_markdown_summary(&summary_with_tasks(vec![]));
        assert!(md.contains("# Lexfetch Run Summary"));
        assert!(md.contains("## Run Information"));
        assert!(md.contains("## Overall Statistics"));
        assert!(md.contains("## Proxy Pool"));
        assert!(md.contains("**Config Hash**: abc123"));
        assert!(md.contains("| paid | 1 | 2 |"));
    }

    #[test]
    fn test_failed_entity_attempts_are_listed() {
        let md = format_markdown_summary(&summary_with_tasks(vec![failed_task()]));
        assert!(md.contains("## Failed Entities"));
        assert!(md.contains("### Civil Code (hard-block)"));
        assert!(md.contains("| 1 | database | paid-hk-1 | hard-block | 412ms |"));
    }

    #[test]
    fn test_summary_writes_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.md");

        generate_markdown_summary(&summary_with_tasks(vec![failed_task()]), &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("# Lexfetch Run Summary"));
    }
}
