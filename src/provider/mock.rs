//! In-memory provider client for unit tests

use super::ProviderClient;
use crate::resource::ResourceType;
use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct MockClient {
    records: Vec<Value>,
    sub_resources: HashMap<String, Vec<Value>>,
    failing: HashSet<String>,
    pub sub_resource_calls: Arc<AtomicUsize>,
}

impl MockClient {
    pub fn with_records(mut self, records: Vec<Value>) -> Self {
        self.records = records;
        self
    }

    pub fn with_sub_resources(mut self, parent: &str, items: Vec<Value>) -> Self {
        self.sub_resources.insert(parent.to_string(), items);
        self
    }

    pub fn failing(mut self, parent: &str) -> Self {
        self.failing.insert(parent.to_string());
        self
    }
}

#[async_trait]
impl ProviderClient for MockClient {
    async fn list_resources(
        &self,
        _resource_type: &ResourceType,
        resource_group: Option<&str>,
    ) -> Result<Vec<Value>> {
        Ok(self
            .records
            .iter()
            .filter(|r| {
                resource_group.is_none()
                    || r.get("resourceGroup").and_then(Value::as_str) == resource_group
            })
            .cloned()
            .collect())
    }

    async fn list_sub_resources(
        &self,
        _resource_type: &ResourceType,
        _resource_group: &str,
        parent_name: &str,
        _collection: &str,
    ) -> Result<Vec<Value>> {
        self.sub_resource_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(parent_name) {
            bail!("HTTP 500 Internal Server Error for {}", parent_name);
        }
        Ok(self.sub_resources.get(parent_name).cloned().unwrap_or_default())
    }
}
