//! Resource Fetcher
//!
//! Turns the raw records a provider returns into [`Resource`]s.

use super::record::Resource;
use super::registry::{ProviderKind, ResourceType};
use crate::provider::azure::resource_group_from_id;
use crate::provider::ProviderClient;
use anyhow::Result;
use serde_json::Value;
use tracing::{debug, warn};

/// Fetch all records of a resource type, optionally limited to one
/// resource group / namespace
pub async fn fetch_resources(
    client: &dyn ProviderClient,
    resource_type: &ResourceType,
    resource_group: Option<&str>,
) -> Result<Vec<Resource>> {
    let items = client.list_resources(resource_type, resource_group).await?;
    debug!("{}: provider returned {} records", resource_type.key, items.len());

    Ok(items
        .into_iter()
        .filter_map(|item| post_process_item(item, resource_type))
        .collect())
}

/// Add derived fields. Records that are not JSON objects are dropped.
fn post_process_item(item: Value, resource_type: &ResourceType) -> Option<Resource> {
    let mut resource = match Resource::try_from(item) {
        Ok(resource) => resource,
        Err(other) => {
            warn!(
                "{}: skipping non-object record ({})",
                resource_type.key,
                json_kind(&other)
            );
            return None;
        }
    };

    if resource_type.provider == ProviderKind::Azure && !resource.contains_key("resourceGroup") {
        let group = extract_str(resource.fields(), &resource_type.id_field)
            .and_then(resource_group_from_id)
            .map(str::to_string);
        if let Some(group) = group {
            resource.insert("resourceGroup", Value::String(group));
        }
    }

    Some(resource)
}

/// Read a string at a dot-notation path
pub fn extract_str<'a>(fields: &'a serde_json::Map<String, Value>, path: &str) -> Option<&'a str> {
    let mut parts = path.split('.');
    let first = fields.get(parts.next()?)?;
    parts
        .try_fold(first, |current, part| current.get(part))
        .and_then(Value::as_str)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::mock::MockClient;
    use crate::resource::ResourceRegistry;
    use serde_json::json;

    fn resource_type(key: &str) -> ResourceType {
        ResourceRegistry::builtin().unwrap().get(key).unwrap().clone()
    }

    #[tokio::test]
    async fn test_resource_group_from_arm_id() {
        let client = MockClient::default().with_records(vec![
            json!({
                "id": "/subscriptions/0000/resourceGroups/prod-rg/providers/Microsoft.Sql/servers/sql1",
                "name": "sql1"
            }),
            json!({"id": "/subscriptions/0000/resourceGroups/x/providers/Microsoft.Sql/servers/sql2", "name": "sql2", "resourceGroup": "kept"}),
            json!("not a record"),
        ]);

        let resources = fetch_resources(&client, &resource_type("azure.sqlserver"), None)
            .await
            .unwrap();

        assert_eq!(resources.len(), 2);
        assert_eq!(resources[0].resource_group(), Some("prod-rg"));
        assert_eq!(resources[1].resource_group(), Some("kept"));
    }

    #[tokio::test]
    async fn test_kube_records_are_untouched() {
        let record = json!({"metadata": {"name": "token", "uid": "abc"}, "type": "Opaque"});
        let client = MockClient::default().with_records(vec![record.clone()]);

        let resources = fetch_resources(&client, &resource_type("kube.secret"), None)
            .await
            .unwrap();

        assert_eq!(resources[0].clone().into_value(), record);
    }

    #[test]
    fn test_extract_str() {
        let record = json!({"metadata": {"uid": "abc"}, "n": 1});
        let fields = record.as_object().unwrap();
        assert_eq!(extract_str(fields, "metadata.uid"), Some("abc"));
        assert_eq!(extract_str(fields, "metadata.name"), None);
        assert_eq!(extract_str(fields, "n"), None);
    }
}
