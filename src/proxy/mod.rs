//! Proxy pool module
//!
//! This module owns everything about network egress:
//!
//! - `ProxyEndpoint`: the immutable endpoint catalog (from configuration)
//! - `EndpointHealth`: per-endpoint counters and cooldown windows
//! - `ProxyPool`: selection, rotation, outcome recording
//! - `PoolState`: the small persisted record surviving process restarts

mod endpoint;
mod health;
mod pool;
mod state;

pub use endpoint::{Egress, ProxyEndpoint, ProxyProtocol, ProxyTier};
pub use health::EndpointHealth;
pub use pool::{host_matches, PoolSnapshot, ProxyExhausted, ProxyPool};
pub use state::{PoolState, POOL_STATE_VERSION};
