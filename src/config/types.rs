use crate::classify::{ClassifierConfig, PayloadKind};
use crate::proxy::{ProxyEndpoint, ProxyTier};
use crate::strategy::StrategyKind;
use serde::Deserialize;

/// Main configuration structure for lexfetch
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    pub limits: LimitsConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub sources: Vec<SourceEntry>,
}

/// Concurrency, pacing, and retry limits
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LimitsConfig {
    /// Maximum number of entities resolved concurrently
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: u32,

    /// Global request budget per minute, across all workers
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,

    /// Minimum spacing between any two requests (milliseconds)
    #[serde(default = "default_request_interval_ms")]
    pub request_interval_ms: u64,

    /// Per-attempt timeout (seconds)
    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,

    /// Maximum attempts per strategy, counting the first one
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,

    /// Base backoff delay (milliseconds)
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Exponential backoff multiplier
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,

    /// Relative backoff jitter, e.g. 0.2 for ±20%
    #[serde(default = "default_backoff_jitter")]
    pub backoff_jitter: f64,

    /// Wall-clock deadline for the whole run (seconds), unlimited when absent
    #[serde(default)]
    pub run_deadline_secs: Option<u64>,
}

/// Proxy pool configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PoolConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Round-robin rotation within the leading endpoint group
    #[serde(default = "default_true")]
    pub rotation_enabled: bool,

    /// Where rotation and health state persist; empty disables persistence
    #[serde(default = "default_state_path")]
    pub state_path: String,

    /// Cooldown window after a hard block or failure streak (seconds)
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    /// Consecutive failures that trigger a cooldown
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    #[serde(default)]
    pub endpoints: Vec<ProxyEndpoint>,

    #[serde(default)]
    pub sites: Vec<SitePolicy>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rotation_enabled: true,
            state_path: default_state_path(),
            cooldown_secs: default_cooldown_secs(),
            failure_threshold: default_failure_threshold(),
            endpoints: Vec::new(),
            sites: Vec::new(),
        }
    }
}

/// Per-site egress policy, matched by host pattern
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SitePolicy {
    /// Host pattern: exact host, `*`, or `*.suffix`
    pub host: String,

    #[serde(default = "default_true")]
    pub use_proxy: bool,

    /// Whether direct egress is acceptable when no proxy is eligible
    #[serde(default = "default_true")]
    pub direct_allowed: bool,

    /// Restricts selection to one tier when set
    #[serde(default)]
    pub preferred_tier: Option<ProxyTier>,
}

/// One acquisition source, ordered into the fallback chain by priority
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SourceEntry {
    pub name: String,

    pub kind: StrategyKind,

    /// Request URL with a `{query}` placeholder for the entity name
    pub query_template: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Lower value tries first
    #[serde(default = "default_source_priority")]
    pub priority: u32,

    /// Host used for site policy matching, derived from the template
    /// when omitted
    #[serde(default)]
    pub site: Option<String>,

    /// Expected payload shape of a genuine answer
    #[serde(default = "default_payload_kind")]
    pub payload: PayloadKind,

    /// Substrings that must all appear in a genuine payload
    #[serde(default)]
    pub payload_markers: Vec<String>,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Path to the markdown run summary
    pub summary_path: String,
}

fn default_true() -> bool {
    true
}

fn default_max_concurrent() -> u32 {
    3
}

fn default_requests_per_minute() -> u32 {
    60
}

fn default_request_interval_ms() -> u64 {
    1000
}

fn default_attempt_timeout_secs() -> u64 {
    30
}

fn default_retry_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_backoff_factor() -> f64 {
    2.0
}

fn default_backoff_jitter() -> f64 {
    0.2
}

fn default_state_path() -> String {
    "./pool_state.toml".to_string()
}

fn default_cooldown_secs() -> u64 {
    300
}

fn default_failure_threshold() -> u32 {
    2
}

fn default_source_priority() -> u32 {
    10
}

fn default_payload_kind() -> PayloadKind {
    PayloadKind::Html
}
