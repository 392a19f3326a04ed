//! HTTP transport
//!
//! The transport seam between the strategy chain and the network. Strategies
//! describe what to fetch; the transport owns HTTP clients, proxy wiring, and
//! the mapping of client-library failures onto `TransportError`.
//!
//! One `reqwest::Client` is built per egress and cached for the life of the
//! run, so connection pools survive across attempts through the same path.

use crate::classify::{PayloadKind, RawResponse, TransportError};
use crate::proxy::{Egress, ProxyProtocol};
use async_trait::async_trait;
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;

/// How a strategy wants its page fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Plain HTTP GET
    Plain,
    /// The source renders its payload client-side; a headless-browser
    /// transport would execute scripts here
    Rendered,
}

/// One fetch as described by a strategy
#[derive(Debug, Clone)]
pub struct AcquisitionRequest {
    pub url: String,
    pub mode: FetchMode,
    pub expected: PayloadKind,
}

/// Network seam used by the strategy chain
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(
        &self,
        request: &AcquisitionRequest,
        egress: &Egress,
        timeout: Duration,
    ) -> Result<RawResponse, TransportError>;
}

/// Browser user agents presented to the sources, picked at random per request
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
];

/// Default transport: reqwest with per-egress client caching
pub struct HttpTransport {
    clients: Mutex<HashMap<String, Client>>,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached client for `egress`, building one on first use
    fn client_for(&self, egress: &Egress) -> Result<Client, TransportError> {
        let cache_key = egress.key().unwrap_or_else(|| "direct".to_string());

        if let Some(client) = self.clients.lock().get(&cache_key) {
            return Ok(client.clone());
        }

        let mut builder = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .gzip(true)
            .brotli(true);

        if let Egress::Proxy(endpoint) = egress {
            if endpoint.protocol == ProxyProtocol::Trojan {
                // Trojan needs an external client; it cannot be spoken here
                return Err(TransportError::Other(format!(
                    "proxy {} uses an unsupported protocol",
                    endpoint.name
                )));
            }
            let proxy = reqwest::Proxy::all(endpoint.proxy_url())
                .map_err(|e| TransportError::Other(e.to_string()))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| TransportError::Other(e.to_string()))?;
        self.clients.lock().insert(cache_key, client.clone());
        Ok(client)
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(
        &self,
        request: &AcquisitionRequest,
        egress: &Egress,
        timeout: Duration,
    ) -> Result<RawResponse, TransportError> {
        if request.mode == FetchMode::Rendered {
            // No headless browser is wired in; a plain GET still yields the
            // server-rendered shell, which the classifier can judge
            tracing::debug!("No rendered transport available, fetching {} plain", request.url);
        }

        let client = self.client_for(egress)?;
        let user_agent = USER_AGENTS
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(USER_AGENTS[0]);

        let response = client
            .get(&request.url)
            .header(reqwest::header::USER_AGENT, user_agent)
            .header(reqwest::header::ACCEPT_LANGUAGE, "zh-CN,zh;q=0.9,en;q=0.5")
            .timeout(timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());
        let final_url = response.url().to_string();

        let body = response.text().await.map_err(map_reqwest_error)?;

        Ok(RawResponse {
            status,
            content_type,
            body,
            final_url,
        })
    }
}

fn map_reqwest_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else if e.is_connect() {
        TransportError::Connect
    } else {
        TransportError::Other(e.to_string())
    }
}
