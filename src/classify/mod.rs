//! Response classification
//!
//! This module turns the raw outcome of one network attempt into a verdict.
//! The mapping is total and side-effect-free: every transport result lands in
//! exactly one `Verdict`, and the classifier never touches pool or retry
//! state. Callers feed the verdict into the retry controller and report it to
//! the proxy pool.
//!
//! Block-detection markers are configuration, not code: the sites' WAF pages
//! change wording over time, so the keyword sets load from the config file.

use serde::Deserialize;

/// Classified outcome of one network attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    /// The source answered with the expected payload shape
    Success,
    /// The source answered but served a challenge page (captcha, verification)
    SoftBlock,
    /// Active detection: 403/451, a block page, or a structural bait-and-switch
    HardBlock,
    /// The source is throttling us (429 or throttle phrasing)
    RateLimited,
    /// Network-level trouble: timeout, reset, DNS, 5xx
    TransientError,
    /// Well-formed answer without the expected payload markers
    ParseFailure,
    /// The run was cancelled while this attempt was in flight
    Cancelled,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Verdict::Success => "success",
            Verdict::SoftBlock => "soft-block",
            Verdict::HardBlock => "hard-block",
            Verdict::RateLimited => "rate-limited",
            Verdict::TransientError => "transient-error",
            Verdict::ParseFailure => "parse-failure",
            Verdict::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// Payload shape a strategy expects from its source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadKind {
    Json,
    Html,
}

/// Raw response handed back by the transport collaborator
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
    /// URL after redirects
    pub final_url: String,
}

impl RawResponse {
    /// Whether the Content-Type header names the given payload shape
    fn content_type_matches(&self, expected: PayloadKind) -> bool {
        let Some(ct) = self.content_type.as_deref() else {
            // No header: give the payload probe the benefit of the doubt
            return true;
        };
        match expected {
            PayloadKind::Json => ct.contains("json") || ct.contains("javascript"),
            PayloadKind::Html => ct.contains("html") || ct.contains("text"),
        }
    }
}

/// Transport-level failure, already stripped of client-library detail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    Timeout,
    Connect,
    Dns,
    Reset,
    Cancelled,
    Other(String),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Timeout => write!(f, "request timeout"),
            TransportError::Connect => write!(f, "connection failed"),
            TransportError::Dns => write!(f, "dns resolution failed"),
            TransportError::Reset => write!(f, "connection reset"),
            TransportError::Cancelled => write!(f, "cancelled"),
            TransportError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

/// Outcome of one transport call
pub type FetchOutcome = std::result::Result<RawResponse, TransportError>;

/// Marker sets driving block detection
///
/// Defaults cover the phrasings observed on the target sites, but operators
/// are expected to extend them from the config file as the WAFs evolve.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ClassifierConfig {
    /// Body substrings that mark an active block page
    pub hard_block_markers: Vec<String>,

    /// Body substrings that mark a challenge page on an otherwise-OK response
    pub soft_block_markers: Vec<String>,

    /// Body substrings that mark throttling without a 429 status
    pub throttle_markers: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            hard_block_markers: [
                "Access Denied",
                "403 Forbidden",
                "blocked",
                "访问被拒绝",
                "安全拦截",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            soft_block_markers: ["captcha", "验证码", "安全验证", "请完成验证"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            throttle_markers: ["too many requests", "请求过于频繁"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Lightweight signal from the parsing collaborator
///
/// The core never parses document text; it only needs a yes/no on whether the
/// expected payload shape is present, to tell `Success` from `ParseFailure`.
pub trait PayloadProbe: Send + Sync {
    fn confirm(&self, response: &RawResponse) -> bool;
}

/// Default probe: the payload is confirmed when every configured marker for
/// the strategy appears in the body (no markers configured = always confirmed)
pub struct MarkerProbe {
    markers: Vec<String>,
}

impl MarkerProbe {
    pub fn new(markers: Vec<String>) -> Self {
        Self { markers }
    }
}

impl PayloadProbe for MarkerProbe {
    fn confirm(&self, response: &RawResponse) -> bool {
        self.markers.iter().all(|m| response.body.contains(m))
    }
}

/// Pure verdict mapping over raw attempt outcomes
#[derive(Debug, Clone)]
pub struct Classifier {
    config: ClassifierConfig,
}

impl Classifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    /// Classifies one attempt outcome
    ///
    /// `payload_confirmed` is the parsing collaborator's signal; it only
    /// matters when the response would otherwise classify as `Success`.
    ///
    /// Mapping, in order:
    /// - transport errors → `TransientError` (timeouts are latency, not
    ///   detection), except an aborted call → `Cancelled`
    /// - 403/451 → `HardBlock`
    /// - 429 → `RateLimited`
    /// - 5xx → `TransientError`
    /// - hard-block body markers, or a content-type structurally different
    ///   from the expected payload → `HardBlock`
    /// - soft-challenge markers → `SoftBlock`
    /// - throttle markers → `RateLimited`
    /// - expected payload signal absent → `ParseFailure`
    /// - otherwise → `Success`
    pub fn classify(
        &self,
        outcome: &FetchOutcome,
        expected: PayloadKind,
        payload_confirmed: bool,
    ) -> Verdict {
        let response = match outcome {
            Err(TransportError::Cancelled) => return Verdict::Cancelled,
            Err(_) => return Verdict::TransientError,
            Ok(response) => response,
        };

        match response.status {
            403 | 451 => return Verdict::HardBlock,
            429 => return Verdict::RateLimited,
            s if s >= 500 => return Verdict::TransientError,
            _ => {}
        }

        if self.contains_any(&response.body, &self.config.hard_block_markers) {
            return Verdict::HardBlock;
        }

        // A block page served as HTML where JSON was expected is the classic
        // WAF bait-and-switch, even with a 200 status.
        if !response.content_type_matches(expected) {
            return Verdict::HardBlock;
        }

        if self.contains_any(&response.body, &self.config.soft_block_markers) {
            return Verdict::SoftBlock;
        }

        if self.contains_any(&response.body, &self.config.throttle_markers) {
            return Verdict::RateLimited;
        }

        if !payload_confirmed {
            return Verdict::ParseFailure;
        }

        Verdict::Success
    }

    fn contains_any(&self, body: &str, markers: &[String]) -> bool {
        let lower = body.to_lowercase();
        markers.iter().any(|m| lower.contains(&m.to_lowercase()))
    }
}
