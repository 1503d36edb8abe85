//! Resource records
//!
//! A resource is a snapshot of one cloud object as the provider reported it:
//! an ordered map of field name to JSON value. Enrichment adds keys to it.

use super::path::KeyPath;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One cloud object snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Resource(Map<String, Value>);

impl Resource {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Set a field, replacing any previous value
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Resolve a key path. JSON null resolves to `None`, same as a missing key.
    pub fn resolve(&self, path: &KeyPath) -> Option<Value> {
        path.resolve(&self.0)
    }

    pub fn name(&self) -> Option<&str> {
        self.get_str("name").or_else(|| {
            self.0
                .get("metadata")
                .and_then(|m| m.get("name"))
                .and_then(|v| v.as_str())
        })
    }

    pub fn resource_group(&self) -> Option<&str> {
        self.get_str("resourceGroup")
    }

    /// Best identifier for log lines: `id`, then `resourceGroup/name`, then name
    pub fn label(&self) -> String {
        if let Some(id) = self.get_str("id") {
            return id.to_string();
        }
        match (self.resource_group(), self.name()) {
            (Some(group), Some(name)) => format!("{}/{}", group, name),
            (None, Some(name)) => name.to_string(),
            _ => "<unnamed>".to_string(),
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for Resource {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

impl TryFrom<Value> for Resource {
    type Error = Value;

    /// Only JSON objects are resources; anything else is handed back
    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(other),
        }
    }
}
