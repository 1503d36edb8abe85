//! Configuration Management
//!
//! Persistent settings live in `<config_dir>/custodian/config.json`.
//! Effective values resolve as CLI flag > config file > environment > default;
//! the CLI layer writes its overrides into the loaded [`Config`].

use crate::enrich::PoolConfig;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_ARM_ENDPOINT: &str = "https://management.azure.com";
pub const DEFAULT_MAX_WORKERS: usize = 3;
pub const DEFAULT_CHUNK_SIZE: usize = 20;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Azure subscription to query
    pub subscription_id: Option<String>,
    /// Azure Resource Manager endpoint (sovereign clouds, test servers)
    pub arm_endpoint: Option<String>,
    /// Kubernetes API server URL
    pub kube_api_server: Option<String>,
    /// Concurrent enrichment workers
    pub max_workers: Option<usize>,
    /// Resources handled per enrichment task
    pub chunk_size: Option<usize>,
    /// Per-resource enrichment timeout
    pub fetch_timeout_secs: Option<u64>,
    /// Per-HTTP-request timeout
    pub request_timeout_secs: Option<u64>,
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("custodian").join("config.json"))
    }

    /// Load configuration from the default location.
    /// A missing or unreadable file yields the defaults.
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_or_default(&path),
            None => Self::default(),
        }
    }

    /// Lenient load: a missing file is the defaults, a broken one is
    /// reported and ignored
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        Self::load_from(path).unwrap_or_else(|e| {
            tracing::warn!("Ignoring config file {:?}: {}", path, e);
            Self::default()
        })
    }

    /// Load configuration from a file the user named. The file must exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Cannot read config file {:?}: {}", path, e)))?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Invalid config file {:?}: {}", path, e)))
    }

    /// Effective subscription (CLI/config > AZURE_SUBSCRIPTION_ID)
    pub fn effective_subscription(&self) -> Option<String> {
        self.subscription_id
            .clone()
            .or_else(|| env_var("AZURE_SUBSCRIPTION_ID"))
    }

    /// Bearer token for ARM. Never persisted; environment only.
    pub fn effective_azure_token(&self) -> Option<String> {
        env_var("AZURE_ACCESS_TOKEN")
    }

    pub fn effective_arm_endpoint(&self) -> String {
        self.arm_endpoint
            .clone()
            .or_else(|| env_var("AZURE_ARM_ENDPOINT"))
            .unwrap_or_else(|| DEFAULT_ARM_ENDPOINT.to_string())
    }

    pub fn effective_kube_server(&self) -> Option<String> {
        self.kube_api_server
            .clone()
            .or_else(|| env_var("KUBE_API_SERVER"))
    }

    /// Bearer token for the Kubernetes API. Never persisted; environment only.
    pub fn effective_kube_token(&self) -> Option<String> {
        env_var("KUBE_TOKEN")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.request_timeout_secs
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        )
    }

    /// Worker pool settings for enrichment filters
    pub fn pool_config(&self) -> Result<PoolConfig> {
        PoolConfig::new(
            self.max_workers.unwrap_or(DEFAULT_MAX_WORKERS),
            self.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE),
            Duration::from_secs(self.fetch_timeout_secs.unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS)),
        )
    }
}
