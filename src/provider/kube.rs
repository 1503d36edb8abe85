//! Kubernetes API client
//!
//! Lists core resources across all namespaces (or one namespace when a
//! resource group is given), following `metadata.continue` tokens.

use super::http::HttpClient;
use super::ProviderClient;
use crate::config::Config;
use crate::resource::ResourceType;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use url::Url;

/// Page size requested from the API server
const PAGE_LIMIT: u32 = 500;

/// Upper bound on followed pages, guards against servers that never finish
const MAX_PAGES: usize = 1000;

/// Kubernetes API client
#[derive(Clone)]
pub struct KubeClient {
    http: HttpClient,
    server: Url,
    token: Option<String>,
}

impl KubeClient {
    pub fn new(server: &str, token: Option<&str>, http: HttpClient) -> Result<Self> {
        let server =
            Url::parse(server).with_context(|| format!("Invalid Kubernetes API server: {}", server))?;

        Ok(Self {
            http,
            server,
            token: token.map(str::to_string),
        })
    }

    /// Create a client from the effective configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let server = config
            .effective_kube_server()
            .context("No Kubernetes API server configured. Set KUBE_API_SERVER")?;
        let token = config.effective_kube_token();
        let http = HttpClient::new(config.request_timeout())?;

        Self::new(&server, token.as_deref(), http)
    }

    /// List URL, namespaced when a namespace is given.
    /// `api/v1/secrets` -> `api/v1/namespaces/{ns}/secrets`
    pub fn list_url(&self, resource_type: &ResourceType, namespace: Option<&str>) -> String {
        let base = self.server.as_str().trim_end_matches('/');
        let path = resource_type.provider_type.trim_matches('/');

        match (namespace, path.rsplit_once('/')) {
            (Some(ns), Some((prefix, plural))) => format!(
                "{}/{}/namespaces/{}/{}",
                base,
                prefix,
                urlencoding::encode(ns),
                plural
            ),
            _ => format!("{}/{}", base, path),
        }
    }
}

#[async_trait]
impl ProviderClient for KubeClient {
    async fn list_resources(
        &self,
        resource_type: &ResourceType,
        resource_group: Option<&str>,
    ) -> Result<Vec<Value>> {
        let base_url = self.list_url(resource_type, resource_group);
        let mut items = Vec::new();
        let mut continue_token: Option<String> = None;
        let mut pages = 0;

        loop {
            pages += 1;
            if pages > MAX_PAGES {
                anyhow::bail!("Gave up listing {} after {} pages", resource_type.key, MAX_PAGES);
            }

            let mut url = format!("{}?limit={}", base_url, PAGE_LIMIT);
            if let Some(token) = &continue_token {
                url.push_str("&continue=");
                url.push_str(&urlencoding::encode(token));
            }

            let response = self
                .http
                .get(&url, self.token.as_deref())
                .await
                .with_context(|| format!("Failed to list {}", resource_type.key))?;

            if let Some(page) = response
                .get(&resource_type.response_path)
                .and_then(|v| v.as_array())
            {
                items.extend(page.iter().cloned());
            }

            let next = response
                .get("metadata")
                .and_then(|m| m.get("continue"))
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .map(str::to_string);

            match next {
                None => break,
                Some(token) if continue_token.as_deref() == Some(token.as_str()) => {
                    anyhow::bail!(
                        "API server repeated continue token while listing {}",
                        resource_type.key
                    );
                }
                Some(token) => continue_token = Some(token),
            }
        }

        Ok(items)
    }

    async fn list_sub_resources(
        &self,
        resource_type: &ResourceType,
        _resource_group: &str,
        _parent_name: &str,
        collection: &str,
    ) -> Result<Vec<Value>> {
        anyhow::bail!(
            "{} has no sub-resource collection '{}'",
            resource_type.key,
            collection
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceRegistry;
    use std::time::Duration;

    #[test]
    fn test_list_url_all_namespaces_and_namespaced() {
        let registry = ResourceRegistry::builtin().unwrap();
        let secret = registry.get("kube.secret").unwrap();
        let http = HttpClient::new(Duration::from_secs(5)).unwrap();
        let client = KubeClient::new("https://10.0.0.1:6443/", None, http).unwrap();

        assert_eq!(client.list_url(secret, None), "https://10.0.0.1:6443/api/v1/secrets");
        assert_eq!(
            client.list_url(secret, Some("prod")),
            "https://10.0.0.1:6443/api/v1/namespaces/prod/secrets"
        );
    }
}
