//! Entity task model
//!
//! This module provides the per-entity bookkeeping for an acquisition run:
//!
//! - `EntityRequest`: one batch item as submitted by the caller
//! - `EntityTask`: the unit of work, with its ordered attempt history
//! - `AcquisitionAttempt`: the record of a single network attempt
//! - Entity key normalization used for deduplication

use crate::classify::{RawResponse, Verdict};
use chrono::{DateTime, Utc};

/// Normalizes an entity name (and optional document number) into a dedupe key
///
/// Normalization trims, lowercases, and collapses inner whitespace so that
/// batch rows that differ only in spacing or case resolve to the same key.
pub fn normalize_entity_key(name: &str, number: Option<&str>) -> String {
    let mut key = String::with_capacity(name.len());
    let mut last_was_space = false;
    for c in name.trim().chars() {
        if c.is_whitespace() {
            if !last_was_space && !key.is_empty() {
                key.push(' ');
                last_was_space = true;
            }
        } else {
            for lower in c.to_lowercase() {
                key.push(lower);
            }
            last_was_space = false;
        }
    }
    if let Some(number) = number {
        let number = number.trim();
        if !number.is_empty() {
            key.push('#');
            key.push_str(&number.to_lowercase());
        }
    }
    key
}

/// One batch item as submitted by the caller
#[derive(Debug, Clone)]
pub struct EntityRequest {
    /// Display name of the target document (e.g. a statute title)
    pub name: String,

    /// Official document number, when the batch provides one
    pub number: Option<String>,
}

impl EntityRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            number: None,
        }
    }

    pub fn with_number(name: impl Into<String>, number: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            number: Some(number.into()),
        }
    }

    /// Returns the normalized dedupe key for this request
    pub fn key(&self) -> String {
        normalize_entity_key(&self.name, self.number.as_deref())
    }
}

/// Lifecycle status of an entity task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    InProgress,
    Succeeded,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Failed)
    }
}

/// Why a task ended `Failed`
///
/// Most failures carry the classified verdict of the last attempt;
/// `ProxyExhausted` is recorded when no eligible egress remained and the
/// site policy forbade direct access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    Verdict(Verdict),
    ProxyExhausted,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::Verdict(v) => write!(f, "{}", v),
            FailureReason::ProxyExhausted => write!(f, "proxy-exhausted"),
        }
    }
}

/// Record of a single network attempt
///
/// Attempts are append-only: created when the attempt finishes and never
/// mutated afterwards. The full list is retained on the task for diagnostics
/// so operators can distinguish "never responded" from "consistently blocked".
#[derive(Debug, Clone)]
pub struct AcquisitionAttempt {
    pub entity_key: String,
    pub strategy: String,
    /// Egress label: "direct" or the proxy endpoint name
    pub egress: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub verdict: Verdict,
}

/// One unit of acquisition work for a single named target
#[derive(Debug, Clone)]
pub struct EntityTask {
    pub request: EntityRequest,
    pub key: String,
    pub attempts: Vec<AcquisitionAttempt>,
    pub status: TaskStatus,
    /// Strategy that produced the successful payload
    pub succeeded_via: Option<String>,
    /// Raw payload of the successful attempt, handed to the parsing collaborator
    pub payload: Option<RawResponse>,
    pub failure: Option<FailureReason>,
}

impl EntityTask {
    pub fn new(request: EntityRequest) -> Self {
        let key = request.key();
        Self {
            request,
            key,
            attempts: Vec::new(),
            status: TaskStatus::Pending,
            succeeded_via: None,
            payload: None,
            failure: None,
        }
    }

    /// Marks the task as in progress. No-op once terminal.
    pub fn start(&mut self) {
        if !self.status.is_terminal() {
            self.status = TaskStatus::InProgress;
        }
    }

    pub fn push_attempt(&mut self, attempt: AcquisitionAttempt) {
        debug_assert!(!self.status.is_terminal(), "attempt after terminal state");
        self.attempts.push(attempt);
    }

    /// Transitions to `Succeeded`. A terminal task is never re-transitioned.
    pub fn succeed(&mut self, strategy: &str, payload: RawResponse) {
        if self.status.is_terminal() {
            return;
        }
        self.status = TaskStatus::Succeeded;
        self.succeeded_via = Some(strategy.to_string());
        self.payload = Some(payload);
    }

    /// Transitions to `Failed` with the given reason. No-op once terminal.
    pub fn fail(&mut self, reason: FailureReason) {
        if self.status.is_terminal() {
            return;
        }
        self.status = TaskStatus::Failed;
        self.failure = Some(reason);
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Number of attempts made with the given strategy
    pub fn attempts_for(&self, strategy: &str) -> usize {
        self.attempts
            .iter()
            .filter(|a| a.strategy == strategy)
            .count()
    }

    /// Whether any attempt was classified as a hard block
    pub fn saw_hard_block(&self) -> bool {
        self.attempts
            .iter()
            .any(|a| a.verdict == Verdict::HardBlock)
    }
}
