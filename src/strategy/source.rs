//! Configuration-backed strategies
//!
//! Every configured source becomes one `SourceStrategy`: descriptor facts
//! from the config entry, the query URL built by substituting the entity
//! name into the template.

use crate::classify::FetchOutcome;
use crate::config::SourceEntry;
use crate::proxy::Egress;
use crate::strategy::{Strategy, StrategyDescriptor, StrategyKind};
use crate::task::EntityRequest;
use crate::transport::{AcquisitionRequest, FetchMode, Transport};
use crate::ConfigError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub struct SourceStrategy {
    descriptor: StrategyDescriptor,
    query_template: String,
}

impl SourceStrategy {
    pub fn from_entry(entry: &SourceEntry) -> Result<Self, ConfigError> {
        let site = match &entry.site {
            Some(site) => site.clone(),
            None => {
                let probe = entry.query_template.replace("{query}", "probe");
                let url = Url::parse(&probe).map_err(|e| {
                    ConfigError::Validation(format!(
                        "source '{}' query_template is not a valid URL: {}",
                        entry.name, e
                    ))
                })?;
                url.host_str()
                    .ok_or_else(|| {
                        ConfigError::Validation(format!(
                            "source '{}' has no site and the template has no host",
                            entry.name
                        ))
                    })?
                    .to_string()
            }
        };

        Ok(Self {
            descriptor: StrategyDescriptor {
                name: entry.name.clone(),
                kind: entry.kind,
                site,
                priority: entry.priority,
                expected: entry.payload,
                payload_markers: entry.payload_markers.clone(),
            },
            query_template: entry.query_template.clone(),
        })
    }

    /// Builds the query URL for `entity`
    ///
    /// The name (plus document number, when present) is percent-encoded
    /// before substitution; the sites are query-by-title, so the number only
    /// narrows the search.
    fn query_url(&self, entity: &EntityRequest) -> String {
        let query = match &entity.number {
            Some(number) => format!("{} {}", entity.name, number),
            None => entity.name.clone(),
        };
        let encoded: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
        self.query_template.replace("{query}", &encoded)
    }

    fn fetch_mode(&self) -> FetchMode {
        match self.descriptor.kind {
            StrategyKind::Browser => FetchMode::Rendered,
            _ => FetchMode::Plain,
        }
    }
}

#[async_trait]
impl Strategy for SourceStrategy {
    fn descriptor(&self) -> &StrategyDescriptor {
        &self.descriptor
    }

    async fn acquire(
        &self,
        entity: &EntityRequest,
        egress: &Egress,
        transport: &dyn Transport,
        timeout: Duration,
    ) -> FetchOutcome {
        let request = AcquisitionRequest {
            url: self.query_url(entity),
            mode: self.fetch_mode(),
            expected: self.descriptor.expected,
        };
        tracing::debug!(
            "Strategy {} fetching {} via {}",
            self.descriptor.name,
            request.url,
            egress.label()
        );
        transport.fetch(&request, egress, timeout).await
    }
}

/// Builds the enabled strategies from configuration, in chain order
pub fn build_strategies(
    sources: &[SourceEntry],
) -> Result<Vec<Arc<dyn Strategy>>, ConfigError> {
    let mut strategies: Vec<(u32, Arc<dyn Strategy>)> = Vec::new();
    for entry in sources.iter().filter(|s| s.enabled) {
        let strategy = SourceStrategy::from_entry(entry)?;
        strategies.push((entry.priority, Arc::new(strategy)));
    }
    strategies.sort_by_key(|(priority, _)| *priority);
    Ok(strategies.into_iter().map(|(_, s)| s).collect())
}
