//! Resource manager
//!
//! Binds one resource type to the client that lists it, the filter and
//! action registries that apply to it and the enrichment pool settings.

use super::fetcher::fetch_resources;
use super::record::Resource;
use super::registry::ResourceType;
use crate::actions::ActionRegistry;
use crate::enrich::PoolConfig;
use crate::error::Result;
use crate::filters::FilterRegistry;
use crate::provider::ProviderClient;
use std::fmt;
use std::sync::Arc;
use tracing::info;

pub struct ResourceManager {
    resource_type: ResourceType,
    client: Arc<dyn ProviderClient>,
    filters: Arc<FilterRegistry>,
    actions: Arc<ActionRegistry>,
    pool: PoolConfig,
    resource_group: Option<String>,
}

impl ResourceManager {
    pub fn new(
        resource_type: ResourceType,
        client: Arc<dyn ProviderClient>,
        filters: Arc<FilterRegistry>,
        actions: Arc<ActionRegistry>,
        pool: PoolConfig,
    ) -> Self {
        Self {
            resource_type,
            client,
            filters,
            actions,
            pool,
            resource_group: None,
        }
    }

    /// Limit enumeration to one resource group (Azure) or namespace (Kubernetes)
    pub fn with_resource_group(mut self, resource_group: Option<String>) -> Self {
        self.resource_group = resource_group;
        self
    }

    /// List every resource of the managed type, in provider order
    pub async fn enumerate(&self) -> Result<Vec<Resource>> {
        let resources = fetch_resources(
            self.client.as_ref(),
            &self.resource_type,
            self.resource_group.as_deref(),
        )
        .await?;
        info!("Enumerated {} {} resources", resources.len(), self.resource_type.key);
        Ok(resources)
    }

    /// Client shared by the enrichment workers
    pub fn get_client(&self) -> Arc<dyn ProviderClient> {
        Arc::clone(&self.client)
    }

    pub fn resource_type(&self) -> &ResourceType {
        &self.resource_type
    }

    pub fn resource_group(&self) -> Option<&str> {
        self.resource_group.as_deref()
    }

    pub fn filter_registry(&self) -> &FilterRegistry {
        &self.filters
    }

    pub fn action_registry(&self) -> &ActionRegistry {
        &self.actions
    }

    pub fn pool_config(&self) -> PoolConfig {
        self.pool
    }
}

impl fmt::Debug for ResourceManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceManager")
            .field("resource_type", &self.resource_type.key)
            .field("resource_group", &self.resource_group)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}
