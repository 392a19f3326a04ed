//! Proxy pool: selection, rotation, health tracking
//!
//! The pool is the sole owner of all mutable proxy state. Workers interact
//! with it through exactly two entry points, `select_egress` and
//! `record_outcome`, both atomic behind one lock, so concurrent workers can
//! never lose or double-apply a health transition.
//!
//! Selection policy: among endpoints with no active cooldown (and matching
//! the site's tier preference, when one is declared), the preferred tier and
//! highest priority win; within that leading group selection is round-robin
//! on an index persisted across process restarts. When nothing is eligible
//! the pool falls back to direct egress unless the site forbids it.

use crate::classify::Verdict;
use crate::config::{PoolConfig, SitePolicy};
use crate::proxy::endpoint::{Egress, ProxyEndpoint, ProxyTier};
use crate::proxy::state::PoolState;
use crate::LexError;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// No eligible egress exists for the requested site
///
/// Reported to the caller, never retried internally: the strategy chain
/// decides whether to escalate or abandon.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("No eligible egress available")]
pub struct ProxyExhausted;

/// Per-site policy after pattern matching, with defaults applied
#[derive(Debug, Clone, Copy)]
struct ResolvedPolicy {
    use_proxy: bool,
    direct_allowed: bool,
    preferred_tier: Option<ProxyTier>,
}

/// Point-in-time pool counters for logging and the run summary
#[derive(Debug, Clone, Default)]
pub struct PoolSnapshot {
    pub paid_total: usize,
    pub paid_available: usize,
    pub free_total: usize,
    pub free_available: usize,
}

pub struct ProxyPool {
    endpoints: Vec<Arc<ProxyEndpoint>>,
    sites: Vec<SitePolicy>,
    enabled: bool,
    rotation_enabled: bool,
    cooldown: Duration,
    failure_threshold: u32,
    state_path: Option<PathBuf>,
    inner: Mutex<PoolState>,
}

impl ProxyPool {
    /// Builds the pool from configuration, loading persisted rotation and
    /// health state when a state file exists
    pub fn new(config: &PoolConfig) -> Result<Self, LexError> {
        // A proxy-only site policy with nothing to satisfy it can never
        // produce an egress; refuse to start rather than fail every task
        let proxyless = config.endpoints.is_empty() || !config.enabled;
        if proxyless && config.sites.iter().any(|s| s.use_proxy && !s.direct_allowed) {
            return Err(LexError::EmptyProxyCatalog);
        }

        let endpoints: Vec<Arc<ProxyEndpoint>> =
            config.endpoints.iter().cloned().map(Arc::new).collect();

        let state_path = if config.enabled && !config.state_path.is_empty() {
            Some(PathBuf::from(&config.state_path))
        } else {
            None
        };

        let mut state = match &state_path {
            Some(path) => PoolState::load(path)?,
            None => PoolState::new(),
        };
        // Drop health entries for endpoints no longer in the catalog
        state
            .endpoints
            .retain(|key, _| endpoints.iter().any(|e| &e.key() == key));

        tracing::info!(
            "Proxy pool loaded: {} endpoints, rotation index {}",
            endpoints.len(),
            state.rotation_index
        );

        Ok(Self {
            endpoints,
            sites: config.sites.clone(),
            enabled: config.enabled,
            rotation_enabled: config.rotation_enabled,
            cooldown: Duration::seconds(config.cooldown_secs as i64),
            failure_threshold: config.failure_threshold,
            state_path,
            inner: Mutex::new(state),
        })
    }

    /// Picks the egress for the next request to `site`
    pub fn select_egress(&self, site: &str) -> Result<Egress, ProxyExhausted> {
        self.select_egress_at(site, Utc::now())
    }

    /// Same as [`select_egress`](Self::select_egress) with an explicit clock,
    /// for cooldown-sensitive tests
    pub fn select_egress_at(
        &self,
        site: &str,
        now: DateTime<Utc>,
    ) -> Result<Egress, ProxyExhausted> {
        let policy = self.policy_for(site);

        if !self.enabled || !policy.use_proxy {
            return if policy.direct_allowed {
                Ok(Egress::Direct)
            } else {
                Err(ProxyExhausted)
            };
        }

        let mut inner = self.inner.lock();

        let eligible: Vec<&Arc<ProxyEndpoint>> = self
            .endpoints
            .iter()
            .filter(|e| {
                policy
                    .preferred_tier
                    .map_or(true, |tier| e.tier == tier)
            })
            .filter(|e| {
                inner
                    .endpoints
                    .get(&e.key())
                    .map_or(true, |h| !h.in_cooldown(now))
            })
            .collect();

        let Some(best) = eligible
            .iter()
            .map(|e| (e.tier, std::cmp::Reverse(e.priority)))
            .min()
        else {
            return if policy.direct_allowed {
                tracing::debug!("No eligible proxy for {}, falling back to direct", site);
                Ok(Egress::Direct)
            } else {
                tracing::warn!("Proxy pool exhausted for {} (direct disallowed)", site);
                Err(ProxyExhausted)
            };
        };

        let group: Vec<&Arc<ProxyEndpoint>> = eligible
            .iter()
            .filter(|e| (e.tier, std::cmp::Reverse(e.priority)) == best)
            .copied()
            .collect();

        let chosen = if self.rotation_enabled {
            let idx = inner.rotation_index % group.len();
            inner.rotation_index = inner.rotation_index.wrapping_add(1);
            let chosen = Arc::clone(group[idx]);
            self.flush(&mut inner);
            chosen
        } else {
            Arc::clone(group[0])
        };

        tracing::debug!(
            "Selected egress {} ({} tier) for {}",
            chosen.name,
            chosen.tier,
            site
        );
        Ok(Egress::Proxy(chosen))
    }

    /// Reports the classified outcome of an attempt through `egress`
    pub fn record_outcome(&self, egress: &Egress, verdict: Verdict) {
        self.record_outcome_at(egress, verdict, Utc::now());
    }

    /// Same as [`record_outcome`](Self::record_outcome) with an explicit clock
    pub fn record_outcome_at(&self, egress: &Egress, verdict: Verdict, now: DateTime<Utc>) {
        let Some(key) = egress.key() else {
            // Direct egress carries no health state
            return;
        };

        let mut inner = self.inner.lock();
        let health = inner.endpoints.entry(key.clone()).or_default();

        match verdict {
            Verdict::Success => health.record_success(now),
            Verdict::HardBlock => {
                health.force_cooldown(now, self.cooldown);
                tracing::warn!(
                    "Hard block via {}, cooling down for {}s",
                    egress.label(),
                    self.cooldown.num_seconds()
                );
            }
            Verdict::TransientError | Verdict::RateLimited | Verdict::SoftBlock => {
                health.record_failure(now, self.failure_threshold, self.cooldown);
                if health.in_cooldown(now) {
                    tracing::info!(
                        "{} reached {} consecutive failures, cooling down",
                        egress.label(),
                        health.consecutive_failures
                    );
                }
            }
            // A structural mismatch or an aborted run says nothing about the
            // egress itself
            Verdict::ParseFailure | Verdict::Cancelled => return,
        }

        self.flush(&mut inner);
    }

    /// Current per-tier totals and availability
    pub fn snapshot(&self) -> PoolSnapshot {
        self.snapshot_at(Utc::now())
    }

    pub fn snapshot_at(&self, now: DateTime<Utc>) -> PoolSnapshot {
        let inner = self.inner.lock();
        let mut snap = PoolSnapshot::default();
        for endpoint in &self.endpoints {
            let available = inner
                .endpoints
                .get(&endpoint.key())
                .map_or(true, |h| !h.in_cooldown(now));
            match endpoint.tier {
                ProxyTier::Paid => {
                    snap.paid_total += 1;
                    if available {
                        snap.paid_available += 1;
                    }
                }
                ProxyTier::Free => {
                    snap.free_total += 1;
                    if available {
                        snap.free_available += 1;
                    }
                }
            }
        }
        snap
    }

    pub fn endpoint_count(&self) -> usize {
        self.endpoints.len()
    }

    fn policy_for(&self, site: &str) -> ResolvedPolicy {
        for entry in &self.sites {
            if host_matches(&entry.host, site) {
                return ResolvedPolicy {
                    use_proxy: entry.use_proxy && self.enabled,
                    direct_allowed: entry.direct_allowed,
                    preferred_tier: entry.preferred_tier,
                };
            }
        }
        ResolvedPolicy {
            use_proxy: self.enabled && !self.endpoints.is_empty(),
            direct_allowed: true,
            preferred_tier: None,
        }
    }

    fn flush(&self, inner: &mut PoolState) {
        if let Some(path) = &self.state_path {
            if let Err(e) = inner.save(path) {
                tracing::warn!("Failed to persist pool state: {}", e);
            }
        }
    }
}

/// Matches a site host against a policy pattern
///
/// Patterns are an exact host, `*` for everything, or `*.suffix` which
/// matches the suffix itself and any subdomain of it.
pub fn host_matches(pattern: &str, host: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(suffix) = pattern.strip_prefix("*.") {
        return host == suffix || host.ends_with(&format!(".{}", suffix));
    }
    pattern == host
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::endpoint::ProxyProtocol;

    fn endpoint(name: &str, port: u16, tier: ProxyTier, priority: u32) -> ProxyEndpoint {
        ProxyEndpoint {
            name: name.to_string(),
            address: "10.0.0.1".to_string(),
            port,
            protocol: ProxyProtocol::Socks5,
            tls: false,
            username: None,
            password: None,
            region: None,
            tier,
            priority,
        }
    }

    fn pool_config(endpoints: Vec<ProxyEndpoint>, sites: Vec<SitePolicy>) -> PoolConfig {
        PoolConfig {
            enabled: true,
            rotation_enabled: true,
            state_path: String::new(), // no persistence in unit tests
            cooldown_secs: 300,
            failure_threshold: 2,
            endpoints,
            sites,
        }
    }

    fn proxy_name(egress: &Egress) -> String {
        match egress {
            Egress::Proxy(e) => e.name.clone(),
            Egress::Direct => panic!("expected proxy egress, got direct"),
        }
    }

    #[test]
    fn test_host_matches() {
        assert!(host_matches("*", "anything.test"));
        assert!(host_matches("flk.npc.gov.cn", "flk.npc.gov.cn"));
        assert!(!host_matches("flk.npc.gov.cn", "www.gov.cn"));
        assert!(host_matches("*.gov.cn", "flk.npc.gov.cn"));
        assert!(host_matches("*.gov.cn", "gov.cn"));
        assert!(!host_matches("*.gov.cn", "notgov.cn"));
    }

    #[test]
    fn test_round_robin_within_tier() {
        let config = pool_config(
            vec![
                endpoint("p1", 1001, ProxyTier::Paid, 1),
                endpoint("p2", 1002, ProxyTier::Paid, 1),
                endpoint("p3", 1003, ProxyTier::Paid, 1),
            ],
            vec![],
        );
        let pool = ProxyPool::new(&config).unwrap();
        let now = Utc::now();

        // 9 selections over 3 eligible proxies: each picked exactly 3 times
        let mut counts = std::collections::HashMap::new();
        for _ in 0..9 {
            let egress = pool.select_egress_at("example.test", now).unwrap();
            *counts.entry(proxy_name(&egress)).or_insert(0u32) += 1;
        }
        assert_eq!(counts.len(), 3);
        for (_, count) in counts {
            assert_eq!(count, 3);
        }
    }

    #[test]
    fn test_paid_tier_selected_before_free() {
        let config = pool_config(
            vec![
                endpoint("free-1", 2001, ProxyTier::Free, 9),
                endpoint("paid-1", 1001, ProxyTier::Paid, 1),
            ],
            vec![],
        );
        let pool = ProxyPool::new(&config).unwrap();
        let egress = pool.select_egress_at("example.test", Utc::now()).unwrap();
        assert_eq!(proxy_name(&egress), "paid-1");
    }

    #[test]
    fn test_higher_priority_wins_within_tier() {
        let config = pool_config(
            vec![
                endpoint("low", 1001, ProxyTier::Paid, 1),
                endpoint("high", 1002, ProxyTier::Paid, 5),
            ],
            vec![],
        );
        let pool = ProxyPool::new(&config).unwrap();
        for _ in 0..4 {
            let egress = pool.select_egress_at("example.test", Utc::now()).unwrap();
            assert_eq!(proxy_name(&egress), "high");
        }
    }

    #[test]
    fn test_hard_block_starts_cooldown_immediately() {
        let config = pool_config(vec![endpoint("p1", 1001, ProxyTier::Paid, 1)], vec![]);
        let pool = ProxyPool::new(&config).unwrap();
        let now = Utc::now();

        let egress = pool.select_egress_at("example.test", now).unwrap();
        pool.record_outcome_at(&egress, Verdict::HardBlock, now);

        // Only the blocked endpoint exists, so selection falls back to direct
        let next = pool.select_egress_at("example.test", now).unwrap();
        assert!(next.is_direct());

        // ... until the cooldown window passes
        let later = now + Duration::seconds(301);
        let next = pool.select_egress_at("example.test", later).unwrap();
        assert_eq!(proxy_name(&next), "p1");
    }

    #[test]
    fn test_transient_failures_reach_threshold() {
        let config = pool_config(vec![endpoint("p1", 1001, ProxyTier::Paid, 1)], vec![]);
        let pool = ProxyPool::new(&config).unwrap();
        let now = Utc::now();

        let egress = pool.select_egress_at("example.test", now).unwrap();
        pool.record_outcome_at(&egress, Verdict::TransientError, now);
        // One failure is below the threshold of 2
        assert!(!pool.select_egress_at("example.test", now).unwrap().is_direct());

        pool.record_outcome_at(&egress, Verdict::TransientError, now);
        assert!(pool.select_egress_at("example.test", now).unwrap().is_direct());
    }

    #[test]
    fn test_default_threshold_cools_down_after_two_failures() {
        let mut config = pool_config(vec![endpoint("p1", 1001, ProxyTier::Paid, 1)], vec![]);
        config.failure_threshold = PoolConfig::default().failure_threshold;
        let pool = ProxyPool::new(&config).unwrap();
        let now = Utc::now();

        let egress = pool.select_egress_at("example.test", now).unwrap();
        pool.record_outcome_at(&egress, Verdict::TransientError, now);
        assert!(!pool.select_egress_at("example.test", now).unwrap().is_direct());

        // Two consecutive failures trip the out-of-the-box threshold
        pool.record_outcome_at(&egress, Verdict::TransientError, now);
        assert!(pool.select_egress_at("example.test", now).unwrap().is_direct());
    }

    #[test]
    fn test_success_resets_failure_streak() {
        let config = pool_config(vec![endpoint("p1", 1001, ProxyTier::Paid, 1)], vec![]);
        let pool = ProxyPool::new(&config).unwrap();
        let now = Utc::now();
        let egress = pool.select_egress_at("example.test", now).unwrap();

        pool.record_outcome_at(&egress, Verdict::TransientError, now);
        pool.record_outcome_at(&egress, Verdict::Success, now);
        pool.record_outcome_at(&egress, Verdict::TransientError, now);

        // Streak was broken, endpoint still eligible
        assert!(!pool.select_egress_at("example.test", now).unwrap().is_direct());
    }

    #[test]
    fn test_proxy_exhausted_when_direct_disallowed() {
        let config = pool_config(
            vec![endpoint("p1", 1001, ProxyTier::Paid, 1)],
            vec![SitePolicy {
                host: "secure.gov.test".to_string(),
                use_proxy: true,
                direct_allowed: false,
                preferred_tier: None,
            }],
        );
        let pool = ProxyPool::new(&config).unwrap();
        let now = Utc::now();

        let egress = pool.select_egress_at("secure.gov.test", now).unwrap();
        pool.record_outcome_at(&egress, Verdict::HardBlock, now);

        assert_eq!(
            pool.select_egress_at("secure.gov.test", now),
            Err(ProxyExhausted)
        );
    }

    #[test]
    fn test_site_tier_preference_filters_eligibility() {
        let config = pool_config(
            vec![
                endpoint("paid-1", 1001, ProxyTier::Paid, 1),
                endpoint("free-1", 2001, ProxyTier::Free, 1),
            ],
            vec![SitePolicy {
                host: "*.gov.test".to_string(),
                use_proxy: true,
                direct_allowed: true,
                preferred_tier: Some(ProxyTier::Paid),
            }],
        );
        let pool = ProxyPool::new(&config).unwrap();
        let now = Utc::now();

        let egress = pool.select_egress_at("flk.gov.test", now).unwrap();
        assert_eq!(proxy_name(&egress), "paid-1");
        pool.record_outcome_at(&egress, Verdict::HardBlock, now);

        // Free tier is not acceptable for this site: fall back to direct
        assert!(pool.select_egress_at("flk.gov.test", now).unwrap().is_direct());
        // Unconstrained sites may still use the free endpoint
        assert_eq!(
            proxy_name(&pool.select_egress_at("other.test", now).unwrap()),
            "free-1"
        );
    }

    #[test]
    fn test_site_policy_can_force_direct() {
        let config = pool_config(
            vec![endpoint("p1", 1001, ProxyTier::Paid, 1)],
            vec![SitePolicy {
                host: "local.test".to_string(),
                use_proxy: false,
                direct_allowed: true,
                preferred_tier: None,
            }],
        );
        let pool = ProxyPool::new(&config).unwrap();
        assert!(pool
            .select_egress_at("local.test", Utc::now())
            .unwrap()
            .is_direct());
    }

    #[test]
    fn test_disabled_pool_goes_direct() {
        let mut config = pool_config(vec![endpoint("p1", 1001, ProxyTier::Paid, 1)], vec![]);
        config.enabled = false;
        let pool = ProxyPool::new(&config).unwrap();
        assert!(pool
            .select_egress_at("example.test", Utc::now())
            .unwrap()
            .is_direct());
    }

    #[test]
    fn test_rotation_index_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let state_path = dir.path().join("pool_state.toml");
        let mut config = pool_config(
            vec![
                endpoint("p1", 1001, ProxyTier::Paid, 1),
                endpoint("p2", 1002, ProxyTier::Paid, 1),
            ],
            vec![],
        );
        config.state_path = state_path.display().to_string();

        let now = Utc::now();
        let first = {
            let pool = ProxyPool::new(&config).unwrap();
            proxy_name(&pool.select_egress_at("example.test", now).unwrap())
        };

        // A fresh process resumes rotation where the previous one stopped
        let pool = ProxyPool::new(&config).unwrap();
        let second = proxy_name(&pool.select_egress_at("example.test", now).unwrap());
        assert_ne!(first, second);
    }

    #[test]
    fn test_cooldown_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let state_path = dir.path().join("pool_state.toml");
        let mut config = pool_config(vec![endpoint("p1", 1001, ProxyTier::Paid, 1)], vec![]);
        config.state_path = state_path.display().to_string();

        let now = Utc::now();
        {
            let pool = ProxyPool::new(&config).unwrap();
            let egress = pool.select_egress_at("example.test", now).unwrap();
            pool.record_outcome_at(&egress, Verdict::HardBlock, now);
        }

        // The restarted pool still refuses the blocked endpoint
        let pool = ProxyPool::new(&config).unwrap();
        assert!(pool.select_egress_at("example.test", now).unwrap().is_direct());
    }

    #[test]
    fn test_proxy_only_policy_needs_a_catalog() {
        let config = pool_config(
            vec![],
            vec![SitePolicy {
                host: "secure.gov.test".to_string(),
                use_proxy: true,
                direct_allowed: false,
                preferred_tier: None,
            }],
        );
        assert!(matches!(
            ProxyPool::new(&config),
            Err(LexError::EmptyProxyCatalog)
        ));
    }

    #[test]
    fn test_snapshot_counts_by_tier() {
        let config = pool_config(
            vec![
                endpoint("p1", 1001, ProxyTier::Paid, 1),
                endpoint("p2", 1002, ProxyTier::Paid, 1),
                endpoint("f1", 2001, ProxyTier::Free, 1),
            ],
            vec![],
        );
        let pool = ProxyPool::new(&config).unwrap();
        let now = Utc::now();

        let egress = pool.select_egress_at("example.test", now).unwrap();
        pool.record_outcome_at(&egress, Verdict::HardBlock, now);

        let snap = pool.snapshot_at(now);
        assert_eq!(snap.paid_total, 2);
        assert_eq!(snap.paid_available, 1);
        assert_eq!(snap.free_total, 1);
        assert_eq!(snap.free_available, 1);
    }
}
