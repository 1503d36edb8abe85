//! SQL server firewall rule filter
//!
//! Fetches the firewall rules of every server in parallel, stores them under
//! [`FIREWALL_RULES_KEY`] and then matches like a value filter against that
//! data:
//!
//! ```yaml
//! - type: firewall
//!   key: c7n:firewall_rules
//!   value_type: size
//!   op: eq
//!   value: 0
//! ```

use super::value::{ValueMatcher, VALUE_PROPERTIES};
use super::Filter;
use crate::enrich::{execute_in_parallel, Annotations, Enricher};
use crate::error::{FetchError, Result, SchemaError};
use crate::provider::ProviderClient;
use crate::resource::{extract_str, Resource, ResourceManager, ResourceType};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::warn;

/// Resource key holding the fetched rules
pub const FIREWALL_RULES_KEY: &str = "c7n:firewall_rules";

const FIREWALL_COLLECTION: &str = "firewallRules";

#[derive(Debug, Clone)]
pub struct FirewallFilter {
    matcher: ValueMatcher,
}

impl FirewallFilter {
    pub fn new(matcher: ValueMatcher) -> Self {
        Self { matcher }
    }

    pub fn from_config(data: &Map<String, Value>) -> std::result::Result<Box<dyn Filter>, SchemaError> {
        let matcher = ValueMatcher::from_config(data, VALUE_PROPERTIES)?;
        Ok(Box::new(Self::new(matcher)))
    }
}

#[async_trait]
impl Filter for FirewallFilter {
    fn type_name(&self) -> &str {
        "firewall"
    }

    async fn enrich(
        &self,
        resources: Vec<Resource>,
        manager: &ResourceManager,
    ) -> Result<Vec<Resource>> {
        let enricher = Arc::new(FirewallRulesEnricher {
            client: manager.get_client(),
            resource_type: manager.resource_type().clone(),
        });

        let outcome = execute_in_parallel(resources, enricher, manager.pool_config()).await;
        if !outcome.errors.is_empty() {
            warn!(
                "Firewall rules unavailable for {} of {} resources",
                outcome.errors.len(),
                outcome.resources.len()
            );
        }
        Ok(outcome.resources)
    }

    fn matches(&self, resource: &Resource) -> bool {
        self.matcher.matches(resource)
    }
}

/// Lists the firewall rules of one SQL server
pub struct FirewallRulesEnricher {
    client: Arc<dyn ProviderClient>,
    resource_type: ResourceType,
}

impl FirewallRulesEnricher {
    pub fn new(client: Arc<dyn ProviderClient>, resource_type: ResourceType) -> Self {
        Self {
            client,
            resource_type,
        }
    }
}

#[async_trait]
impl Enricher for FirewallRulesEnricher {
    fn name(&self) -> &str {
        "firewall-rules"
    }

    async fn fetch(&self, resource: &Resource) -> std::result::Result<Annotations, FetchError> {
        let group = resource
            .resource_group()
            .ok_or_else(|| FetchError::MissingField("resourceGroup".into()))?;
        let name_field = &self.resource_type.name_field;
        let server = extract_str(resource.fields(), name_field)
            .ok_or_else(|| FetchError::MissingField(name_field.clone()))?;

        let rules = self
            .client
            .list_sub_resources(&self.resource_type, group, server, FIREWALL_COLLECTION)
            .await?;

        let rules = rules.iter().map(project_rule).collect();

        let mut annotations = Annotations::new();
        annotations.insert(FIREWALL_RULES_KEY.to_string(), Value::Array(rules));
        Ok(annotations)
    }
}

/// ARM firewall rule -> `{name, start_ip_address, end_ip_address}`.
/// Fields the rule lacks are projected as null.
fn project_rule(rule: &Value) -> Value {
    let field = |path: &str| -> Value {
        path.split('.')
            .try_fold(rule, |current, part| current.get(part))
            .cloned()
            .unwrap_or(Value::Null)
    };

    json!({
        "name": field("name"),
        "start_ip_address": field("properties.startIpAddress"),
        "end_ip_address": field("properties.endIpAddress"),
    })
}
