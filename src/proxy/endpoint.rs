//! Proxy endpoint catalog types
//!
//! Endpoints are immutable after configuration load. Mutable health state
//! lives in the pool, keyed by `address:port`, never inside the endpoint.

use serde::Deserialize;
use std::sync::Arc;

/// Wire protocol spoken to a proxy endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyProtocol {
    Http,
    Https,
    Socks5,
    /// Handled by an external transport; the core only carries the endpoint
    Trojan,
}

impl ProxyProtocol {
    pub fn scheme(&self) -> &'static str {
        match self {
            ProxyProtocol::Http => "http",
            ProxyProtocol::Https => "https",
            ProxyProtocol::Socks5 => "socks5",
            ProxyProtocol::Trojan => "trojan",
        }
    }
}

/// Pricing tier of an endpoint; paid endpoints are preferred and get a more
/// forgiving failure budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyTier {
    Paid,
    Free,
}

impl std::fmt::Display for ProxyTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProxyTier::Paid => write!(f, "paid"),
            ProxyTier::Free => write!(f, "free"),
        }
    }
}

fn default_priority() -> u32 {
    1
}

/// One proxy endpoint as declared in configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProxyEndpoint {
    pub name: String,
    pub address: String,
    pub port: u16,
    pub protocol: ProxyProtocol,
    #[serde(default)]
    pub tls: bool,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    pub tier: ProxyTier,
    /// Higher wins within a tier
    #[serde(default = "default_priority")]
    pub priority: u32,
}

impl ProxyEndpoint {
    /// Stable identity used by health tracking and the persisted state file
    pub fn key(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    /// Proxy URL for transports that accept one
    pub fn proxy_url(&self) -> String {
        match (&self.username, &self.password) {
            // Trojan carries only the password in its URL form
            _ if self.protocol == ProxyProtocol::Trojan => format!(
                "trojan://{}@{}:{}",
                self.password.as_deref().unwrap_or(""),
                self.address,
                self.port
            ),
            (Some(user), Some(pass)) => format!(
                "{}://{}:{}@{}:{}",
                self.protocol.scheme(),
                user,
                pass,
                self.address,
                self.port
            ),
            _ => format!("{}://{}:{}", self.protocol.scheme(), self.address, self.port),
        }
    }
}

/// The network path a request takes: direct, or via one proxy endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Egress {
    Direct,
    Proxy(Arc<ProxyEndpoint>),
}

impl Egress {
    /// Identity used for attempt records and per-egress statistics
    pub fn label(&self) -> String {
        match self {
            Egress::Direct => "direct".to_string(),
            Egress::Proxy(endpoint) => endpoint.name.clone(),
        }
    }

    /// Health-tracking key; `None` for direct egress, which has no health state
    pub fn key(&self) -> Option<String> {
        match self {
            Egress::Direct => None,
            Egress::Proxy(endpoint) => Some(endpoint.key()),
        }
    }

    pub fn is_direct(&self) -> bool {
        matches!(self, Egress::Direct)
    }
}
