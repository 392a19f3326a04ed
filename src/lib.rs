//! Lexfetch: a batch acquisition core for legal-document metadata
//!
//! This crate implements the request-acquisition machinery for pulling
//! structured legal-document metadata out of a small catalog of rate-limited,
//! anti-bot-protected sources: a proxy pool with rotation and cooldown, a
//! strategy fallback chain, response classification, bounded retries, and a
//! concurrency-capped batch orchestrator.

pub mod cache;
pub mod classify;
pub mod config;
pub mod crawler;
pub mod output;
pub mod proxy;
pub mod retry;
pub mod stats;
pub mod strategy;
pub mod task;
pub mod transport;

use thiserror::Error;

/// Main error type for lexfetch operations
///
/// Per-entity failures never surface here; they are folded into the entity's
/// terminal verdict. This enum covers failures that abort the run or an
/// infrastructure operation.
#[derive(Debug, Error)]
pub enum LexError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Proxy catalog is empty but site policy requires proxies")]
    EmptyProxyCatalog,

    #[error("Failed to load pool state from {path}: {message}")]
    PoolStateLoad { path: String, message: String },

    #[error("Failed to persist pool state to {path}: {message}")]
    PoolStateSave { path: String, message: String },

    #[error("Report error: {0}")]
    Report(#[from] output::ReportError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid proxy endpoint '{name}': {message}")]
    InvalidEndpoint { name: String, message: String },

    #[error("Invalid site policy pattern: {0}")]
    InvalidPattern(String),
}

/// Result type alias for lexfetch operations
pub type Result<T> = std::result::Result<T, LexError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use classify::Verdict;
pub use config::Config;
pub use proxy::{Egress, ProxyEndpoint, ProxyPool};
pub use stats::RunStatistics;
pub use task::{EntityRequest, EntityTask, TaskStatus};
