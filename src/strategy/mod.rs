//! Acquisition strategies
//!
//! A strategy knows how to ask one source about one entity. The chain
//! (see [`chain`]) owns ordering, retries, and escalation; strategies stay
//! small and declarative: a descriptor plus a URL to fetch.

mod chain;
mod source;

use crate::classify::{FetchOutcome, PayloadKind};
use crate::proxy::Egress;
use crate::task::EntityRequest;
use crate::transport::Transport;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

pub use chain::{ChainPolicy, StrategyChain};
pub use source::{build_strategies, SourceStrategy};

/// Kind of acquisition path a source represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// Structured query against a statute database API
    Database,
    /// Site search over a portal
    Search,
    /// Script-rendered page needing a browser-grade transport
    Browser,
    /// Direct fetch of a known document URL
    Direct,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StrategyKind::Database => "database",
            StrategyKind::Search => "search",
            StrategyKind::Browser => "browser",
            StrategyKind::Direct => "direct",
        };
        write!(f, "{}", s)
    }
}

/// Static facts about one strategy, shared with the chain
#[derive(Debug, Clone)]
pub struct StrategyDescriptor {
    pub name: String,
    pub kind: StrategyKind,
    /// Host used for site policy matching
    pub site: String,
    /// Lower value tries first
    pub priority: u32,
    pub expected: PayloadKind,
    /// Substrings confirming a genuine payload; empty accepts anything
    pub payload_markers: Vec<String>,
}

/// One way of asking one source about an entity
#[async_trait]
pub trait Strategy: Send + Sync {
    fn descriptor(&self) -> &StrategyDescriptor;

    /// Performs one network attempt for `entity` through `egress`
    async fn acquire(
        &self,
        entity: &EntityRequest,
        egress: &Egress,
        transport: &dyn Transport,
        timeout: Duration,
    ) -> FetchOutcome;
}
