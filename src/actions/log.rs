//! `log` action

use super::{check_properties, Action};
use crate::error::{Result, SchemaError};
use crate::resource::{Resource, ResourceManager};
use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::info;

const PROPERTIES: &[&str] = &["type", "message"];

/// Emits one `info` event per matched resource
#[derive(Debug, Clone)]
pub struct LogAction {
    message: String,
}

impl LogAction {
    pub fn from_config(data: &Map<String, Value>) -> std::result::Result<Box<dyn Action>, SchemaError> {
        check_properties(data, PROPERTIES)?;
        let message = match data.get("message") {
            None => "matched".to_string(),
            Some(Value::String(message)) => message.clone(),
            Some(_) => return Err(SchemaError::new("message", "must be a string")),
        };
        Ok(Box::new(Self { message }))
    }
}

#[async_trait]
impl Action for LogAction {
    fn type_name(&self) -> &str {
        "log"
    }

    async fn process(&self, resources: &[Resource], manager: &ResourceManager) -> Result<()> {
        for resource in resources {
            info!(
                resource_type = %manager.resource_type().key,
                resource = %resource.label(),
                "{}",
                self.message
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_config() {
        let ok = json!({"type": "log", "message": "public server"});
        assert!(LogAction::from_config(ok.as_object().unwrap()).is_ok());

        let bad = json!({"type": "log", "message": 1});
        assert_eq!(
            LogAction::from_config(bad.as_object().unwrap()).unwrap_err().location,
            "message"
        );

        let unknown = json!({"type": "log", "level": "warn"});
        assert_eq!(
            LogAction::from_config(unknown.as_object().unwrap()).unwrap_err().location,
            "level"
        );
    }
}
