//! `webhook` action
//!
//! ```yaml
//! actions:
//!   - type: webhook
//!     url: https://hooks.example.com/custodian
//!     batch: false      # one request per resource (default: one request)
//! ```
//!
//! Batched body: `{"resource_type": .., "resources": [..]}`.
//! Per-resource body: `{"resource_type": .., "resource": {..}}`.

use super::{check_properties, Action};
use crate::config::DEFAULT_REQUEST_TIMEOUT_SECS;
use crate::error::{Error, Result, SchemaError};
use crate::provider::http::HttpClient;
use crate::resource::{Resource, ResourceManager};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

const PROPERTIES: &[&str] = &["type", "url", "batch", "timeout"];

#[derive(Debug, Clone)]
pub struct WebhookAction {
    url: Url,
    batch: bool,
    timeout: Duration,
}

impl WebhookAction {
    pub fn from_config(data: &Map<String, Value>) -> std::result::Result<Box<dyn Action>, SchemaError> {
        check_properties(data, PROPERTIES)?;

        let url = match data.get("url") {
            Some(Value::String(url)) => Url::parse(url)
                .map_err(|e| SchemaError::new("url", format!("invalid URL: {}", e)))?,
            Some(_) => return Err(SchemaError::new("url", "must be a string")),
            None => return Err(SchemaError::new("url", "is required")),
        };
        if !matches!(url.scheme(), "http" | "https") {
            return Err(SchemaError::new("url", "must be an http(s) URL"));
        }

        let batch = match data.get("batch") {
            None => true,
            Some(Value::Bool(batch)) => *batch,
            Some(_) => return Err(SchemaError::new("batch", "must be a boolean")),
        };

        let timeout = match data.get("timeout") {
            None => Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            Some(value) => match value.as_u64() {
                Some(secs) if secs > 0 => Duration::from_secs(secs),
                _ => return Err(SchemaError::new("timeout", "must be a positive number of seconds")),
            },
        };

        Ok(Box::new(Self {
            url,
            batch,
            timeout,
        }))
    }

    fn failure(&self, error: anyhow::Error) -> Error {
        Error::Action {
            action: "webhook".into(),
            message: format!("{:#}", error),
        }
    }
}

#[async_trait]
impl Action for WebhookAction {
    fn type_name(&self) -> &str {
        "webhook"
    }

    async fn process(&self, resources: &[Resource], manager: &ResourceManager) -> Result<()> {
        if resources.is_empty() {
            debug!("webhook: nothing to send");
            return Ok(());
        }

        let http = HttpClient::new(self.timeout).map_err(|e| self.failure(e))?;
        let resource_type = manager.resource_type().key.as_str();

        if self.batch {
            let body = json!({"resource_type": resource_type, "resources": resources});
            http.post(self.url.as_str(), None, &body)
                .await
                .map_err(|e| self.failure(e))?;
        } else {
            for resource in resources {
                let body = json!({"resource_type": resource_type, "resource": resource});
                http.post(self.url.as_str(), None, &body)
                    .await
                    .map_err(|e| self.failure(e))?;
            }
        }

        info!("webhook: sent {} resources to {}", resources.len(), self.url);
        Ok(())
    }
}
