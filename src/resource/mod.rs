//! Resource abstraction layer
//!
//! Resource types are data: JSON definitions under `src/resources/` are
//! compiled into the binary and loaded into a [`ResourceRegistry`], so a new
//! type only needs a definition and, when it has special filters, their
//! registration.
//!
//! # Architecture
//!
//! - [`registry`] - resource type definitions
//! - [`record`] - [`Resource`], one fetched cloud object
//! - [`path`] - [`KeyPath`], field lookup expressions used by filters
//! - [`fetcher`] - provider records to resources
//! - [`manager`] - [`ResourceManager`], everything a policy needs for one type
//!
//! # Resource Definitions
//!
//! - `azure.json` - SQL servers, storage accounts
//! - `kube.json` - Kubernetes secrets

mod fetcher;
mod manager;
mod path;
mod record;
mod registry;

pub use fetcher::{extract_str, fetch_resources};
pub use manager::ResourceManager;
pub use path::KeyPath;
pub use record::Resource;
pub use registry::*;
