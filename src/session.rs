//! Run session
//!
//! Everything built once per process and shared by every policy: the
//! configuration, the resource type registry, one filter registry per
//! resource type and the action registry. Provider clients are created on
//! demand unless one was injected.

use crate::actions::ActionRegistry;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::filters::FilterRegistry;
use crate::provider::{self, ProviderClient};
use crate::resource::{ProviderKind, ResourceManager, ResourceRegistry};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

pub struct Session {
    config: Config,
    resources: ResourceRegistry,
    filters: BTreeMap<String, Arc<FilterRegistry>>,
    actions: Arc<ActionRegistry>,
    clients: HashMap<ProviderKind, Arc<dyn ProviderClient>>,
}

impl Session {
    /// Session over the built-in resource types
    pub fn new(config: Config) -> Result<Self> {
        Self::with_registry(config, ResourceRegistry::builtin()?)
    }

    pub fn with_registry(config: Config, resources: ResourceRegistry) -> Result<Self> {
        let filters = resources
            .iter()
            .map(|rt| Ok((rt.key.clone(), Arc::new(FilterRegistry::for_resource(rt)?))))
            .collect::<Result<BTreeMap<_, _>>>()?;

        Ok(Self {
            config,
            resources,
            filters,
            actions: Arc::new(ActionRegistry::builtin()),
            clients: HashMap::new(),
        })
    }

    /// Use `client` for every resource type of `kind`
    pub fn with_client(mut self, kind: ProviderKind, client: Arc<dyn ProviderClient>) -> Self {
        self.clients.insert(kind, client);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn resource_registry(&self) -> &ResourceRegistry {
        &self.resources
    }

    pub fn filter_registry(&self, resource_type: &str) -> Result<&FilterRegistry> {
        self.filters
            .get(resource_type)
            .map(Arc::as_ref)
            .ok_or_else(|| self.unknown(resource_type))
    }

    pub fn action_registry(&self) -> &ActionRegistry {
        &self.actions
    }

    /// Manager for one resource type. Builds the provider client unless
    /// one was injected.
    pub fn manager(&self, resource_type: &str, resource_group: Option<&str>) -> Result<ResourceManager> {
        let rt = self.resources.require(resource_type)?;
        let filters = self
            .filters
            .get(resource_type)
            .cloned()
            .ok_or_else(|| self.unknown(resource_type))?;

        let client = match self.clients.get(&rt.provider) {
            Some(client) => Arc::clone(client),
            None => provider::client_for(rt.provider, &self.config)?,
        };

        Ok(ResourceManager::new(
            rt.clone(),
            client,
            filters,
            Arc::clone(&self.actions),
            self.config.pool_config()?,
        )
        .with_resource_group(resource_group.map(str::to_string)))
    }

    fn unknown(&self, resource_type: &str) -> Error {
        Error::Config(format!(
            "Unknown resource type '{}' (known: {})",
            resource_type,
            self.resources.keys().join(", ")
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::mock::MockClient;

    #[test]
    fn test_filter_registries_per_type() {
        let session = Session::new(Config::default()).unwrap();
        assert!(session.filter_registry("azure.sqlserver").unwrap().contains("firewall"));
        assert!(!session.filter_registry("kube.secret").unwrap().contains("firewall"));
        assert!(session.filter_registry("aws.ec2").is_err());
    }

    #[test]
    fn test_manager_uses_injected_client() {
        let session = Session::new(Config::default())
            .unwrap()
            .with_client(ProviderKind::Azure, Arc::new(MockClient::default()));

        let manager = session.manager("azure.sqlserver", Some("rg")).unwrap();
        assert_eq!(manager.resource_type().key, "azure.sqlserver");
        assert_eq!(manager.resource_group(), Some("rg"));
    }

    #[test]
    fn test_unknown_resource_type() {
        let session = Session::new(Config::default()).unwrap();
        assert!(matches!(session.manager("gcp.instance", None), Err(Error::Config(_))));
    }

    #[test]
    fn test_bad_pool_settings_fail_manager_creation() {
        let config = Config {
            max_workers: Some(0),
            ..Config::default()
        };
        let session = Session::new(config)
            .unwrap()
            .with_client(ProviderKind::Kube, Arc::new(MockClient::default()));
        assert!(session.manager("kube.secret", None).is_err());
    }
}
