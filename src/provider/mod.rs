//! Provider API interaction module
//!
//! The policy engine only needs two things from a cloud provider: list the
//! records of a resource type, and list a child collection of one record
//! (e.g. the firewall rules of a SQL server). [`ProviderClient`] captures
//! that, and each provider implements it over its REST API.
//!
//! # Module Structure
//!
//! - [`azure`] - Azure Resource Manager client
//! - [`kube`] - Kubernetes API client
//! - [`http`] - HTTP utilities shared by both

pub mod azure;
pub mod http;
pub mod kube;

#[cfg(test)]
pub(crate) mod mock;

use crate::config::Config;
use crate::resource::{ProviderKind, ResourceType};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Minimal provider surface used by resource managers and filters.
/// Implementations are shared read-only across enrichment workers.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// List all raw records of a resource type, optionally scoped to a
    /// resource group (Azure) or namespace (Kubernetes)
    async fn list_resources(
        &self,
        resource_type: &ResourceType,
        resource_group: Option<&str>,
    ) -> Result<Vec<Value>>;

    /// List a child collection of one parent record
    async fn list_sub_resources(
        &self,
        resource_type: &ResourceType,
        resource_group: &str,
        parent_name: &str,
        collection: &str,
    ) -> Result<Vec<Value>>;
}

/// Build the client for a provider from the effective configuration
pub fn client_for(kind: ProviderKind, config: &Config) -> Result<Arc<dyn ProviderClient>> {
    match kind {
        ProviderKind::Azure => Ok(Arc::new(azure::ArmClient::from_config(config)?)),
        ProviderKind::Kube => Ok(Arc::new(kube::KubeClient::from_config(config)?)),
    }
}
