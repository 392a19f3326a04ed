//! Configuration module
//!
//! Loading, parsing, and validating TOML configuration files: limits,
//! proxy pool and site policies, sources, classifier markers, and output
//! paths.

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, LimitsConfig, OutputConfig, PoolConfig, SitePolicy, SourceEntry};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
