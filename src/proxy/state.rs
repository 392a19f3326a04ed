//! Persisted pool state
//!
//! A small TOML record keeping rotation position and per-endpoint health
//! across process restarts. Short-lived batch runs must not forget which
//! endpoints were blocked five minutes ago, so the file is read at startup
//! and rewritten after every mutation.

use crate::proxy::health::EndpointHealth;
use crate::LexError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// On-disk pool state
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PoolState {
    /// Format version, bumped on incompatible layout changes
    pub version: u32,
    pub rotation_index: usize,
    pub last_updated: DateTime<Utc>,
    /// Keyed by `address:port`
    #[serde(default)]
    pub endpoints: BTreeMap<String, EndpointHealth>,
}

pub const POOL_STATE_VERSION: u32 = 1;

impl PoolState {
    pub fn new() -> Self {
        Self {
            version: POOL_STATE_VERSION,
            rotation_index: 0,
            last_updated: Utc::now(),
            endpoints: BTreeMap::new(),
        }
    }

    /// Loads state from `path`; a missing file yields fresh state
    ///
    /// An unreadable or incompatible file is an error rather than silently
    /// discarded state: losing cooldowns would let a blocked endpoint be
    /// hammered again immediately.
    pub fn load(path: &Path) -> Result<Self, LexError> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let content = std::fs::read_to_string(path).map_err(|e| LexError::PoolStateLoad {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let state: PoolState =
            toml::from_str(&content).map_err(|e| LexError::PoolStateLoad {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        if state.version != POOL_STATE_VERSION {
            return Err(LexError::PoolStateLoad {
                path: path.display().to_string(),
                message: format!(
                    "unsupported state version {} (expected {})",
                    state.version, POOL_STATE_VERSION
                ),
            });
        }
        Ok(state)
    }

    /// Writes state to `path`, stamping `last_updated`
    pub fn save(&mut self, path: &Path) -> Result<(), LexError> {
        self.last_updated = Utc::now();
        let content = toml::to_string_pretty(self).map_err(|e| LexError::PoolStateSave {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        std::fs::write(path, content).map_err(|e| LexError::PoolStateSave {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }
}

impl Default for PoolState {
    fn default() -> Self {
        Self::new()
    }
}
