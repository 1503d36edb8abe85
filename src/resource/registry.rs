//! Resource Registry - Load resource type definitions from JSON
//!
//! Resource types are described in JSON files embedded at compile time.
//! The registry is built once at startup and handed to whatever needs it.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;

/// Embedded resource JSON files (compiled into the binary)
const RESOURCE_FILES: &[&str] = &[
    include_str!("../resources/azure.json"),
    include_str!("../resources/kube.json"),
];

/// Cloud provider a resource type belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Azure,
    Kube,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Azure => f.write_str("azure"),
            ProviderKind::Kube => f.write_str("kube"),
        }
    }
}

/// Resource type definition from JSON
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceType {
    /// Registry key, filled in from the map key (e.g. `azure.sqlserver`)
    #[serde(skip)]
    pub key: String,
    pub display_name: String,
    pub provider: ProviderKind,
    /// ARM provider path (`Microsoft.Sql/servers`) or Kubernetes API path
    pub provider_type: String,
    pub api_version: String,
    /// Field of the list response holding the records
    pub response_path: String,
    pub id_field: String,
    /// Dot path of the record's name, used as the parent in sub-resource calls
    pub name_field: String,
    /// Resource-specific filter types on top of the generic ones
    #[serde(default)]
    pub filters: Vec<String>,
}

/// Root structure of resources/*.json
#[derive(Debug, Deserialize)]
struct ResourceFile {
    #[serde(default)]
    resources: BTreeMap<String, ResourceType>,
}

/// All known resource types
#[derive(Debug, Clone, Default)]
pub struct ResourceRegistry {
    resources: BTreeMap<String, ResourceType>,
}

impl ResourceRegistry {
    /// Load the resource types compiled into the binary
    pub fn builtin() -> Result<Self> {
        let mut registry = Self::default();
        for content in RESOURCE_FILES {
            registry.extend_from_json(content)?;
        }
        Ok(registry)
    }

    /// Merge the resource types of one JSON document
    pub fn extend_from_json(&mut self, content: &str) -> Result<()> {
        let file: ResourceFile = serde_json::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse resource JSON: {}", e)))?;

        for (key, mut resource_type) in file.resources {
            if self.resources.contains_key(&key) {
                return Err(Error::Config(format!("Duplicate resource type: {}", key)));
            }
            resource_type.key = key.clone();
            self.resources.insert(key, resource_type);
        }
        Ok(())
    }

    /// Get a resource definition by key
    pub fn get(&self, key: &str) -> Option<&ResourceType> {
        self.resources.get(key)
    }

    /// Get a resource definition or fail with a config error
    pub fn require(&self, key: &str) -> Result<&ResourceType> {
        self.get(key).ok_or_else(|| {
            Error::Config(format!(
                "Unknown resource type '{}' (known: {})",
                key,
                self.keys().join(", ")
            ))
        })
    }

    /// All resource keys, sorted
    pub fn keys(&self) -> Vec<&str> {
        self.resources.keys().map(|s| s.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceType> {
        self.resources.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_loads_successfully() {
        let registry = ResourceRegistry::builtin().unwrap();
        assert!(!registry.keys().is_empty(), "Registry should have resources");
    }

    #[test]
    fn test_sqlserver_resource_exists() {
        let registry = ResourceRegistry::builtin().unwrap();
        let resource = registry.get("azure.sqlserver").expect("sqlserver should exist");
        assert_eq!(resource.key, "azure.sqlserver");
        assert_eq!(resource.provider, ProviderKind::Azure);
        assert_eq!(resource.provider_type, "Microsoft.Sql/servers");
        assert_eq!(resource.filters, vec!["firewall".to_string()]);
    }

    #[test]
    fn test_kube_secret_resource_exists() {
        let registry = ResourceRegistry::builtin().unwrap();
        let resource = registry.require("kube.secret").unwrap();
        assert_eq!(resource.provider, ProviderKind::Kube);
        assert_eq!(resource.response_path, "items");
    }

    #[test]
    fn test_unknown_resource_lists_known_keys() {
        let registry = ResourceRegistry::builtin().unwrap();
        let err = registry.require("aws.ec2").unwrap_err().to_string();
        assert!(err.contains("azure.storage"));
    }

    #[test]
    fn test_duplicate_resource_type_rejected() {
        let mut registry = ResourceRegistry::builtin().unwrap();
        assert!(registry
            .extend_from_json(include_str!("../resources/kube.json"))
            .is_err());
    }
}
