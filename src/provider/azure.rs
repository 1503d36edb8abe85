//! Azure Resource Manager client
//!
//! Lists resources through the ARM REST API, following `nextLink` pages.

use super::http::HttpClient;
use super::ProviderClient;
use crate::config::Config;
use crate::resource::ResourceType;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use url::Url;

/// Upper bound on followed `nextLink` pages, guards against link loops
const MAX_PAGES: usize = 1000;

/// ARM child collections always page under `value`
const SUB_RESOURCE_PAGE_KEY: &str = "value";

/// Azure Resource Manager client
#[derive(Clone)]
pub struct ArmClient {
    http: HttpClient,
    endpoint: Url,
    subscription_id: String,
    token: String,
}

impl ArmClient {
    pub fn new(endpoint: &str, subscription_id: &str, token: &str, http: HttpClient) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .with_context(|| format!("Invalid ARM endpoint: {}", endpoint))?;

        Ok(Self {
            http,
            endpoint,
            subscription_id: subscription_id.to_string(),
            token: token.to_string(),
        })
    }

    /// Create a client from the effective configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let subscription_id = config.effective_subscription().context(
            "No Azure subscription configured. Set AZURE_SUBSCRIPTION_ID or use --subscription",
        )?;
        let token = config
            .effective_azure_token()
            .context("No Azure access token. Set AZURE_ACCESS_TOKEN")?;
        let http = HttpClient::new(config.request_timeout())?;

        Self::new(&config.effective_arm_endpoint(), &subscription_id, &token, http)
    }

    // =========================================================================
    // URL helpers
    // =========================================================================

    fn base(&self) -> String {
        self.endpoint.as_str().trim_end_matches('/').to_string()
    }

    /// Subscription-wide list URL for a resource type
    pub fn subscription_url(&self, resource_type: &ResourceType) -> String {
        format!(
            "{}/subscriptions/{}/providers/{}?api-version={}",
            self.base(),
            urlencoding::encode(&self.subscription_id),
            resource_type.provider_type,
            resource_type.api_version
        )
    }

    /// Resource-group scoped path for a resource type (no query string)
    fn group_path(&self, resource_type: &ResourceType, resource_group: &str) -> String {
        format!(
            "{}/subscriptions/{}/resourceGroups/{}/providers/{}",
            self.base(),
            urlencoding::encode(&self.subscription_id),
            urlencoding::encode(resource_group),
            resource_type.provider_type
        )
    }

    /// Resource-group scoped list URL
    pub fn resource_group_url(&self, resource_type: &ResourceType, resource_group: &str) -> String {
        format!(
            "{}?api-version={}",
            self.group_path(resource_type, resource_group),
            resource_type.api_version
        )
    }

    /// Child collection URL, e.g. `.../servers/{name}/firewallRules`
    pub fn sub_resource_url(
        &self,
        resource_type: &ResourceType,
        resource_group: &str,
        parent_name: &str,
        collection: &str,
    ) -> String {
        format!(
            "{}/{}/{}?api-version={}",
            self.group_path(resource_type, resource_group),
            urlencoding::encode(parent_name),
            collection,
            resource_type.api_version
        )
    }

    /// Only follow continuation links that stay on the configured endpoint
    fn check_next_link(&self, link: &str) -> Result<()> {
        let next = Url::parse(link).with_context(|| format!("Invalid nextLink: {}", link))?;
        if next.origin() != self.endpoint.origin() {
            anyhow::bail!("nextLink points outside the ARM endpoint: {}", next.origin().ascii_serialization());
        }
        Ok(())
    }

    /// Fetch every page of an ARM list call, reading records from `page_key`
    async fn get_all(&self, url: String, page_key: &str) -> Result<Vec<Value>> {
        let mut items = Vec::new();
        let mut next = Some(url);
        let mut pages = 0;

        while let Some(url) = next.take() {
            pages += 1;
            if pages > MAX_PAGES {
                anyhow::bail!("Gave up after {} pages", MAX_PAGES);
            }

            let response = self.http.get(&url, Some(&self.token)).await?;
            if let Some(page) = response.get(page_key).and_then(|v| v.as_array()) {
                items.extend(page.iter().cloned());
            }

            if let Some(link) = response.get("nextLink").and_then(|v| v.as_str()) {
                self.check_next_link(link)?;
                next = Some(link.to_string());
            }
        }

        Ok(items)
    }
}

#[async_trait]
impl ProviderClient for ArmClient {
    async fn list_resources(
        &self,
        resource_type: &ResourceType,
        resource_group: Option<&str>,
    ) -> Result<Vec<Value>> {
        let url = match resource_group {
            Some(group) => self.resource_group_url(resource_type, group),
            None => self.subscription_url(resource_type),
        };
        self.get_all(url, &resource_type.response_path)
            .await
            .with_context(|| format!("Failed to list {}", resource_type.key))
    }

    async fn list_sub_resources(
        &self,
        resource_type: &ResourceType,
        resource_group: &str,
        parent_name: &str,
        collection: &str,
    ) -> Result<Vec<Value>> {
        let url = self.sub_resource_url(resource_type, resource_group, parent_name, collection);
        self.get_all(url, SUB_RESOURCE_PAGE_KEY)
            .await
            .with_context(|| format!("Failed to list {} of {}", collection, parent_name))
    }
}

/// Extract the resource group from an ARM id:
/// `/subscriptions/{sub}/resourceGroups/{group}/providers/...` -> `{group}`
pub fn resource_group_from_id(id: &str) -> Option<&str> {
    let mut parts = id.split('/');
    while let Some(part) = parts.next() {
        if part.eq_ignore_ascii_case("resourceGroups") {
            return parts.next().filter(|g| !g.is_empty());
        }
    }
    None
}
