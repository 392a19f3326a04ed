use crate::config::types::{Config, LimitsConfig, PoolConfig, SourceEntry};
use crate::proxy::ProxyProtocol;
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_limits(&config.limits)?;
    validate_pool(&config.pool)?;
    validate_sources(&config.sources)?;

    if config.output.summary_path.is_empty() {
        return Err(ConfigError::Validation(
            "summary_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_limits(limits: &LimitsConfig) -> Result<(), ConfigError> {
    if limits.max_concurrent < 1 || limits.max_concurrent > 100 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent must be between 1 and 100, got {}",
            limits.max_concurrent
        )));
    }

    if limits.requests_per_minute < 1 {
        return Err(ConfigError::Validation(
            "requests_per_minute must be >= 1".to_string(),
        ));
    }

    if limits.attempt_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "attempt_timeout_secs must be >= 1".to_string(),
        ));
    }

    if limits.retry_max_attempts < 1 || limits.retry_max_attempts > 10 {
        return Err(ConfigError::Validation(format!(
            "retry_max_attempts must be between 1 and 10, got {}",
            limits.retry_max_attempts
        )));
    }

    if limits.backoff_factor < 1.0 {
        return Err(ConfigError::Validation(format!(
            "backoff_factor must be >= 1.0, got {}",
            limits.backoff_factor
        )));
    }

    if !(0.0..1.0).contains(&limits.backoff_jitter) {
        return Err(ConfigError::Validation(format!(
            "backoff_jitter must be in [0.0, 1.0), got {}",
            limits.backoff_jitter
        )));
    }

    if limits.run_deadline_secs == Some(0) {
        return Err(ConfigError::Validation(
            "run_deadline_secs must be >= 1 when set".to_string(),
        ));
    }

    Ok(())
}

fn validate_pool(pool: &PoolConfig) -> Result<(), ConfigError> {
    if pool.cooldown_secs < 1 {
        return Err(ConfigError::Validation(
            "cooldown_secs must be >= 1".to_string(),
        ));
    }

    if pool.failure_threshold < 1 {
        return Err(ConfigError::Validation(
            "failure_threshold must be >= 1".to_string(),
        ));
    }

    let mut seen_keys = HashSet::new();
    for endpoint in &pool.endpoints {
        if endpoint.name.is_empty() {
            return Err(ConfigError::InvalidEndpoint {
                name: endpoint.key(),
                message: "endpoint name cannot be empty".to_string(),
            });
        }

        if endpoint.address.is_empty() {
            return Err(ConfigError::InvalidEndpoint {
                name: endpoint.name.clone(),
                message: "address cannot be empty".to_string(),
            });
        }

        if endpoint.port == 0 {
            return Err(ConfigError::InvalidEndpoint {
                name: endpoint.name.clone(),
                message: "port cannot be 0".to_string(),
            });
        }

        if endpoint.protocol == ProxyProtocol::Trojan && endpoint.password.is_none() {
            return Err(ConfigError::InvalidEndpoint {
                name: endpoint.name.clone(),
                message: "trojan endpoints require a password".to_string(),
            });
        }

        if !seen_keys.insert(endpoint.key()) {
            return Err(ConfigError::InvalidEndpoint {
                name: endpoint.name.clone(),
                message: format!("duplicate endpoint {}", endpoint.key()),
            });
        }
    }

    for site in &pool.sites {
        validate_host_pattern(&site.host)?;
    }

    Ok(())
}

fn validate_sources(sources: &[SourceEntry]) -> Result<(), ConfigError> {
    if !sources.iter().any(|s| s.enabled) {
        return Err(ConfigError::Validation(
            "at least one enabled source is required".to_string(),
        ));
    }

    let mut seen_names = HashSet::new();
    for source in sources {
        if source.name.is_empty() {
            return Err(ConfigError::Validation(
                "source name cannot be empty".to_string(),
            ));
        }

        if !seen_names.insert(source.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate source name '{}'",
                source.name
            )));
        }

        if !source.query_template.contains("{query}") {
            return Err(ConfigError::Validation(format!(
                "source '{}' query_template must contain a {{query}} placeholder",
                source.name
            )));
        }

        // A probe substitution must yield a well-formed http(s) URL with a
        // host, otherwise the site policy has nothing to match against
        let probe = source.query_template.replace("{query}", "probe");
        let url = Url::parse(&probe).map_err(|e| {
            ConfigError::Validation(format!(
                "source '{}' query_template is not a valid URL: {}",
                source.name, e
            ))
        })?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::Validation(format!(
                "source '{}' query_template must use http or https",
                source.name
            )));
        }

        if source.site.is_none() && url.host_str().is_none() {
            return Err(ConfigError::Validation(format!(
                "source '{}' has no site and the template has no host",
                source.name
            )));
        }
    }

    Ok(())
}

/// Validates a site policy host pattern (supports `*` and `*.suffix`)
fn validate_host_pattern(pattern: &str) -> Result<(), ConfigError> {
    if pattern.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "host pattern cannot be empty".to_string(),
        ));
    }

    if pattern == "*" {
        return Ok(());
    }

    let host = pattern.strip_prefix("*.").unwrap_or(pattern);

    if host.is_empty() {
        return Err(ConfigError::InvalidPattern(format!(
            "host pattern '{}' has no host part",
            pattern
        )));
    }

    if !host
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "host '{}' contains invalid characters",
            host
        )));
    }

    if host.starts_with('.') || host.ends_with('.') || host.contains("..") {
        return Err(ConfigError::InvalidPattern(format!(
            "host '{}' is malformed",
            host
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::{ProxyEndpoint, ProxyTier};

    fn endpoint(name: &str) -> ProxyEndpoint {
        ProxyEndpoint {
            name: name.to_string(),
            address: "10.0.0.1".to_string(),
            port: 1080,
            protocol: ProxyProtocol::Socks5,
            tls: false,
            username: None,
            password: None,
            region: None,
            tier: ProxyTier::Free,
            priority: 1,
        }
    }

    #[test]
    fn test_validate_host_pattern() {
        assert!(validate_host_pattern("*").is_ok());
        assert!(validate_host_pattern("flk.npc.gov.cn").is_ok());
        assert!(validate_host_pattern("*.gov.cn").is_ok());

        assert!(validate_host_pattern("").is_err());
        assert!(validate_host_pattern("*.").is_err());
        assert!(validate_host_pattern(".gov.cn").is_err());
        assert!(validate_host_pattern("gov..cn").is_err());
        assert!(validate_host_pattern("gov cn").is_err());
    }

    #[test]
    fn test_duplicate_endpoints_rejected() {
        let mut pool = PoolConfig::default();
        pool.endpoints = vec![endpoint("a"), endpoint("b")];

        let result = validate_pool(&pool);
        assert!(matches!(
            result,
            Err(ConfigError::InvalidEndpoint { .. })
        ));
    }

    #[test]
    fn test_trojan_requires_password() {
        let mut trojan = endpoint("t1");
        trojan.protocol = ProxyProtocol::Trojan;

        let mut pool = PoolConfig::default();
        pool.endpoints = vec![trojan];

        assert!(validate_pool(&pool).is_err());
    }

    #[test]
    fn test_template_without_placeholder_rejected() {
        let source = SourceEntry {
            name: "db".to_string(),
            kind: crate::strategy::StrategyKind::Database,
            query_template: "https://example.test/search".to_string(),
            enabled: true,
            priority: 1,
            site: None,
            payload: crate::classify::PayloadKind::Json,
            payload_markers: vec![],
        };

        assert!(validate_sources(&[source]).is_err());
    }

    #[test]
    fn test_valid_source_accepted() {
        let source = SourceEntry {
            name: "db".to_string(),
            kind: crate::strategy::StrategyKind::Database,
            query_template: "https://example.test/search?q={query}".to_string(),
            enabled: true,
            priority: 1,
            site: None,
            payload: crate::classify::PayloadKind::Json,
            payload_markers: vec![],
        };

        assert!(validate_sources(&[source]).is_ok());
    }

    #[test]
    fn test_all_sources_disabled_rejected() {
        let source = SourceEntry {
            name: "db".to_string(),
            kind: crate::strategy::StrategyKind::Database,
            query_template: "https://example.test/search?q={query}".to_string(),
            enabled: false,
            priority: 1,
            site: None,
            payload: crate::classify::PayloadKind::Json,
            payload_markers: vec![],
        };

        assert!(validate_sources(&[source]).is_err());
    }
}
