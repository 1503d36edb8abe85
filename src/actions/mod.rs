//! Actions
//!
//! Actions run once per policy over the resources that passed every filter.
//!
//! # Module Structure
//!
//! - [`log`] - emit one log event per resource
//! - [`webhook`] - POST resources to an HTTP endpoint

pub mod log;
pub mod webhook;

pub use self::log::LogAction;
pub use self::webhook::WebhookAction;

use crate::error::{Result, SchemaError};
use crate::plugin::Registry;
use crate::resource::{Resource, ResourceManager};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt;

#[async_trait]
pub trait Action: Send + Sync + fmt::Debug {
    /// Registered type name
    fn type_name(&self) -> &str;

    /// Act on the matched resources
    async fn process(&self, resources: &[Resource], manager: &ResourceManager) -> Result<()>;
}

/// Builds an action from its configuration mapping
pub type ActionFactory = fn(&Map<String, Value>) -> std::result::Result<Box<dyn Action>, SchemaError>;

pub type ActionRegistry = Registry<ActionFactory>;

impl Registry<ActionFactory> {
    /// Actions available to every resource type
    pub fn builtin() -> Self {
        let mut registry = Registry::new("action");
        registry
            .register("log", LogAction::from_config as ActionFactory)
            .register("webhook", WebhookAction::from_config as ActionFactory);
        registry
    }

    /// Build an action from `{type: name, ...}` or the bare name
    pub fn build(&self, value: &Value) -> std::result::Result<Box<dyn Action>, SchemaError> {
        let data = match value {
            Value::String(name) => {
                let mut data = Map::new();
                data.insert("type".into(), Value::String(name.clone()));
                data
            }
            Value::Object(map) => map.clone(),
            _ => return Err(SchemaError::new("", "action must be a name or a mapping")),
        };

        let type_name = match data.get("type") {
            Some(Value::String(name)) => name.as_str(),
            Some(_) => return Err(SchemaError::new("type", "must be a string")),
            None => return Err(SchemaError::new("type", "is required")),
        };

        let factory = self.get(type_name).ok_or_else(|| {
            SchemaError::new(
                "type",
                format!(
                    "unknown action type '{}' (available: {})",
                    type_name,
                    self.names().collect::<Vec<_>>().join(", ")
                ),
            )
        })?;
        factory(&data)
    }
}

/// Reject properties an action does not know
pub(crate) fn check_properties(
    data: &Map<String, Value>,
    properties: &[&str],
) -> std::result::Result<(), SchemaError> {
    match data.keys().find(|k| !properties.contains(&k.as_str())) {
        Some(unknown) => Err(SchemaError::new(
            unknown.as_str(),
            format!("unknown property (allowed: {})", properties.join(", ")),
        )),
        None => Ok(()),
    }
}
