//! Output module for run summaries
//!
//! This module renders the outcome of a batch run for operators:
//! - a markdown summary file with statistics and failure histories
//! - a short console digest printed at the end of a run

mod markdown;

pub use markdown::{format_markdown_summary, generate_markdown_summary};

use crate::proxy::PoolSnapshot;
use crate::stats::RunStatistics;
use crate::task::EntityTask;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

/// Errors from report generation
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to write summary: {0}")]
    Io(#[from] std::io::Error),
}

/// Everything the summary renders about one finished run
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub config_hash: String,
    pub stats: RunStatistics,
    pub pool: PoolSnapshot,
    pub tasks: Vec<Arc<EntityTask>>,
}

impl RunSummary {
    pub fn duration_seconds(&self) -> i64 {
        (self.finished_at - self.started_at).num_seconds()
    }
}

/// Destination for a finished run's summary
pub trait ReportSink: Send + Sync {
    fn publish(&self, summary: &RunSummary) -> Result<(), ReportError>;
}

/// Default sink: one markdown file per run
pub struct MarkdownReportSink {
    path: std::path::PathBuf,
}

impl MarkdownReportSink {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ReportSink for MarkdownReportSink {
    fn publish(&self, summary: &RunSummary) -> Result<(), ReportError> {
        generate_markdown_summary(summary, &self.path)
    }
}

/// Prints a short digest of the run to stdout
pub fn print_digest(summary: &RunSummary) {
    let stats = &summary.stats;
    println!("Run finished in {}s", summary.duration_seconds());
    println!(
        "  entities: {} ({} deduplicated)",
        stats.total_entities, stats.deduplicated
    );
    println!(
        "  succeeded: {}  failed: {}  cancelled: {}",
        stats.succeeded, stats.failed, stats.cancelled
    );
    println!(
        "  attempts: {}  waf-triggered entities: {}",
        stats.total_attempts, stats.waf_triggered
    );
    println!(
        "  proxy pool: {}/{} paid, {}/{} free available",
        summary.pool.paid_available,
        summary.pool.paid_total,
        summary.pool.free_available,
        summary.pool.free_total
    );
}
