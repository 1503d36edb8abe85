//! Policies
//!
//! A policy file holds a list of policies:
//!
//! ```yaml
//! policies:
//!   - name: sql-open-to-nobody
//!     resource: azure.sqlserver
//!     resource_group: prod-rg          # optional
//!     filters:
//!       - type: firewall
//!         key: c7n:firewall_rules
//!         value_type: size
//!         op: eq
//!         value: 0
//!     actions:
//!       - type: webhook
//!         url: https://hooks.example.com/custodian
//! ```
//!
//! Loading builds every filter and action, so configuration mistakes
//! surface before anything is fetched. Running a policy enumerates its
//! resources, pipes them through the filters (implicit AND), records the
//! result under the output directory and runs the actions.

use crate::actions::Action;
use crate::error::{Error, Result, SchemaError};
use crate::filters::Filter;
use crate::resource::{Resource, ResourceManager};
use crate::session::Session;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info};
use uuid::Uuid;

pub const RESOURCES_FILE: &str = "resources.json";
pub const METADATA_FILE: &str = "metadata.json";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PolicyFile {
    #[serde(default)]
    policies: Vec<PolicyDef>,
}

/// Policy as written in the policy file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyDef {
    pub name: String,
    pub resource: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_group: Option<String>,
    #[serde(default)]
    pub filters: Vec<Value>,
    #[serde(default)]
    pub actions: Vec<Value>,
}

/// Validated policy, filters and actions built
#[derive(Debug)]
pub struct Policy {
    def: PolicyDef,
    filters: Vec<Box<dyn Filter>>,
    actions: Vec<Box<dyn Action>>,
}

/// Where and how to run
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub output_dir: PathBuf,
    pub dry_run: bool,
}

/// Result of one policy run
#[derive(Debug, Clone, Serialize)]
pub struct PolicyReport {
    pub policy: String,
    pub resource_type: String,
    pub execution_id: String,
    pub start: String,
    pub duration_secs: f64,
    pub total: usize,
    pub matched: usize,
    pub dry_run: bool,
    pub actions: Vec<String>,
    /// `type: message` for every action that failed
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub action_errors: Vec<String>,
}

impl Policy {
    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub fn resource_type(&self) -> &str {
        &self.def.resource
    }

    pub fn definition(&self) -> &PolicyDef {
        &self.def
    }

    /// Build one policy against the session's registries
    pub fn build(def: PolicyDef, session: &Session) -> Result<Self> {
        validate_name(&def.name)?;
        let filter_registry = session.filter_registry(&def.resource)?;

        let filters = def
            .filters
            .iter()
            .enumerate()
            .map(|(i, value)| {
                filter_registry
                    .build_value(value)
                    .map_err(|e| e.within(&format!("filters[{}]", i)))
            })
            .collect::<std::result::Result<Vec<_>, SchemaError>>()?;

        let actions = def
            .actions
            .iter()
            .enumerate()
            .map(|(i, value)| {
                session
                    .action_registry()
                    .build(value)
                    .map_err(|e| e.within(&format!("actions[{}]", i)))
            })
            .collect::<std::result::Result<Vec<_>, SchemaError>>()?;

        Ok(Self {
            def,
            filters,
            actions,
        })
    }

    /// Enumerate, filter, record and act
    pub async fn run(&self, session: &Session, options: &RunOptions) -> Result<PolicyReport> {
        let manager = session.manager(&self.def.resource, self.def.resource_group.as_deref())?;
        self.run_with(&manager, options).await
    }

    /// Run against an existing manager
    pub async fn run_with(&self, manager: &ResourceManager, options: &RunOptions) -> Result<PolicyReport> {
        let execution_id = Uuid::new_v4().to_string();
        let start: DateTime<Utc> = Utc::now();
        let started = Instant::now();
        info!("Policy {} ({}) starting, execution {}", self.def.name, self.def.resource, execution_id);

        let resources = manager.enumerate().await?;
        let total = resources.len();
        let matched = self.filter(resources, manager).await?;
        info!("Policy {} matched {} of {} resources", self.def.name, matched.len(), total);

        let out = options.output_dir.join(&self.def.name);
        write_json(&out.join(RESOURCES_FILE), &matched)?;

        let mut outcome = ActionOutcome::default();
        if options.dry_run {
            info!("Policy {}: dry run, skipping {} actions", self.def.name, self.actions.len());
        } else if !matched.is_empty() {
            outcome = self.act(&matched, manager).await;
        }

        let report = PolicyReport {
            policy: self.def.name.clone(),
            resource_type: self.def.resource.clone(),
            execution_id,
            start: start.to_rfc3339(),
            duration_secs: started.elapsed().as_secs_f64(),
            total,
            matched: matched.len(),
            dry_run: options.dry_run,
            actions: outcome.ran,
            action_errors: outcome
                .failures
                .iter()
                .map(|(action, e)| format!("{}: {}", action, e))
                .collect(),
        };
        write_json(&out.join(METADATA_FILE), &report)?;

        match outcome.failures.into_iter().next() {
            Some((_, e)) => Err(e),
            None => Ok(report),
        }
    }

    /// Apply the filters in order, stopping early once nothing is left
    pub async fn filter(&self, mut resources: Vec<Resource>, manager: &ResourceManager) -> Result<Vec<Resource>> {
        for (i, filter) in self.filters.iter().enumerate() {
            if resources.is_empty() {
                break;
            }
            let before = resources.len();
            resources = filter.process(resources, manager).await?;
            debug!(
                "Policy {} filter[{}] {}: {} -> {}",
                self.def.name,
                i,
                filter.type_name(),
                before,
                resources.len()
            );
        }
        Ok(resources)
    }

    /// Run every action, collecting failures instead of stopping at the first
    async fn act(&self, resources: &[Resource], manager: &ResourceManager) -> ActionOutcome {
        let mut outcome = ActionOutcome::default();
        for action in &self.actions {
            match action.process(resources, manager).await {
                Ok(()) => outcome.ran.push(action.type_name().to_string()),
                Err(e) => {
                    error!("Policy {} action {} failed: {}", self.def.name, action.type_name(), e);
                    outcome.failures.push((action.type_name().to_string(), e));
                }
            }
        }
        outcome
    }
}

#[derive(Debug, Default)]
struct ActionOutcome {
    ran: Vec<String>,
    failures: Vec<(String, Error)>,
}

/// Parse and build every policy of a YAML document
pub fn load_str(content: &str, session: &Session) -> Result<Vec<Policy>> {
    let file: PolicyFile = serde_yaml::from_str(content)
        .map_err(|e| Error::PolicyLoad(format!("Invalid policy file: {}", e)))?;

    let mut seen = HashSet::new();
    let mut policies = Vec::with_capacity(file.policies.len());
    for (i, def) in file.policies.into_iter().enumerate() {
        if !seen.insert(def.name.clone()) {
            return Err(Error::PolicyLoad(format!("Duplicate policy name: {}", def.name)));
        }
        let policy = Policy::build(def, session).map_err(|e| match e {
            Error::Schema(schema) => Error::Schema(schema.within(&format!("policies[{}]", i))),
            other => other,
        })?;
        policies.push(policy);
    }
    Ok(policies)
}

/// Load a policy file from disk
pub fn load_file(path: &Path, session: &Session) -> Result<Vec<Policy>> {
    let content = fs::read_to_string(path)
        .map_err(|e| Error::PolicyLoad(format!("Cannot read {:?}: {}", path, e)))?;
    load_str(&content, session)
}

/// Policy names become directory names
fn validate_name(name: &str) -> std::result::Result<(), SchemaError> {
    let mut chars = name.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(SchemaError::new(
            "name",
            format!("'{}' must start with a letter and use only letters, digits, '-' and '_'", name),
        ))
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::provider::mock::MockClient;
    use crate::resource::ProviderKind;
    use serde_json::json;
    use std::sync::Arc;

    fn session(client: MockClient) -> Session {
        Session::new(Config::default())
            .unwrap()
            .with_client(ProviderKind::Azure, Arc::new(client))
    }

    const POLICY: &str = r#"
policies:
  - name: sql-no-rules
    resource: azure.sqlserver
    filters:
      - location: eastus
      - type: firewall
        key: c7n:firewall_rules
        value_type: size
        op: eq
        value: 0
    actions:
      - log
"#;

    fn servers() -> MockClient {
        let server = |name: &str, location: &str| {
            json!({
                "id": format!("/subscriptions/s/resourceGroups/rg/providers/Microsoft.Sql/servers/{name}"),
                "name": name,
                "location": location
            })
        };
        MockClient::default()
            .with_records(vec![server("A", "eastus"), server("B", "eastus"), server("C", "eastus"), server("D", "westus")])
            .with_sub_resources(
                "A",
                vec![json!({"name": "all", "properties": {"startIpAddress": "0.0.0.0", "endIpAddress": "255.255.255.255"}})],
            )
            .with_sub_resources("B", vec![])
            .failing("C")
    }

    #[tokio::test]
    async fn test_run_writes_outputs() {
        let session = session(servers());
        let policies = load_str(POLICY, &session).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let options = RunOptions {
            output_dir: dir.path().to_path_buf(),
            dry_run: false,
        };

        let report = policies[0].run(&session, &options).await.unwrap();
        assert_eq!(report.total, 4);
        assert_eq!(report.matched, 1);
        assert_eq!(report.actions, vec!["log"]);

        let written: Vec<Value> = serde_json::from_str(
            &fs::read_to_string(dir.path().join("sql-no-rules").join(RESOURCES_FILE)).unwrap(),
        )
        .unwrap();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0]["name"], "B");
        assert_eq!(written[0]["resourceGroup"], "rg");
        assert_eq!(written[0]["c7n:firewall_rules"], json!([]));

        let metadata: Value = serde_json::from_str(
            &fs::read_to_string(dir.path().join("sql-no-rules").join(METADATA_FILE)).unwrap(),
        )
        .unwrap();
        assert_eq!(metadata["execution_id"], report.execution_id);
        assert_eq!(metadata["matched"], 1);
    }

    #[tokio::test]
    async fn test_failed_action_still_writes_metadata() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let hook = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&hook)
            .await;

        let session = session(servers());
        let content = format!(
            "policies:\n  - name: hooked\n    resource: azure.sqlserver\n    filters:\n      - location: westus\n    actions:\n      - type: webhook\n        url: {}\n      - log\n",
            hook.uri()
        );
        let policies = load_str(&content, &session).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let options = RunOptions {
            output_dir: dir.path().to_path_buf(),
            dry_run: false,
        };

        let err = policies[0].run(&session, &options).await.unwrap_err();
        assert!(matches!(err, Error::Action { ref action, .. } if action == "webhook"));

        let metadata: Value = serde_json::from_str(
            &fs::read_to_string(dir.path().join("hooked").join(METADATA_FILE)).unwrap(),
        )
        .unwrap();
        assert_eq!(metadata["matched"], 1);
        assert_eq!(metadata["actions"], json!(["log"]));
        assert_eq!(metadata["action_errors"].as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn test_dry_run_skips_actions() {
        let session = session(servers());
        let policies = load_str(POLICY, &session).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let options = RunOptions {
            output_dir: dir.path().to_path_buf(),
            dry_run: true,
        };

        let report = policies[0].run(&session, &options).await.unwrap();
        assert!(report.dry_run);
        assert!(report.actions.is_empty());
    }

    #[tokio::test]
    async fn test_filters_stop_when_nothing_left() {
        let client = servers();
        let calls = Arc::clone(&client.sub_resource_calls);
        let session = session(client);
        let policies = load_str(
            r#"
policies:
  - name: nowhere
    resource: azure.sqlserver
    filters:
      - location: northpole
      - type: firewall
        key: c7n:firewall_rules
        value: empty
"#,
            &session,
        )
        .unwrap();

        let manager = session.manager("azure.sqlserver", None).unwrap();
        let resources = manager.enumerate().await.unwrap();
        let matched = policies[0].filter(resources, &manager).await.unwrap();
        assert!(matched.is_empty());
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[test]
    fn test_schema_errors_point_at_the_filter() {
        let session = session(MockClient::default());
        let err = load_str(
            r#"
policies:
  - name: ok
    resource: azure.sqlserver
  - name: broken
    resource: azure.sqlserver
    filters:
      - name: x
      - type: value
        key: name
        op: almost
        value: x
"#,
            &session,
        )
        .unwrap_err();

        match err {
            Error::Schema(e) => assert_eq!(e.location, "policies[1].filters[1].op"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_load_errors() {
        let session = session(MockClient::default());

        let unknown_field = "policies:\n  - name: a\n    resource: azure.storage\n    mode: pull\n";
        assert!(matches!(load_str(unknown_field, &session), Err(Error::PolicyLoad(_))));

        let duplicate = "policies:\n  - {name: a, resource: azure.storage}\n  - {name: a, resource: kube.secret}\n";
        assert!(matches!(load_str(duplicate, &session), Err(Error::PolicyLoad(_))));

        let unknown_type = "policies:\n  - {name: a, resource: aws.s3}\n";
        assert!(matches!(load_str(unknown_type, &session), Err(Error::Config(_))));

        let bad_name = "policies:\n  - {name: ../etc, resource: azure.storage}\n";
        assert!(matches!(load_str(bad_name, &session), Err(Error::Schema(_))));

        let firewall_on_storage =
            "policies:\n  - name: a\n    resource: azure.storage\n    filters:\n      - {type: firewall, key: x, value: 1}\n";
        assert!(matches!(load_str(firewall_on_storage, &session), Err(Error::Schema(_))));
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("sql-open_1").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("1abc").is_err());
        assert!(validate_name("a b").is_err());
    }
}
