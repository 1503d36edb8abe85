//! Policy engine for cloud resources
//!
//! Policies select resources of one type from a provider (Azure Resource
//! Manager or Kubernetes), narrow them with declarative filters and hand the
//! survivors to actions. Filters that need more data than the list call
//! returns enrich the resources first through a bounded parallel fetcher.
//!
//! # Module Structure
//!
//! - [`policy`] - policy files, validation and execution
//! - [`session`] - registries and clients shared by all policies
//! - [`resource`] - resource types, records and managers
//! - [`filters`] / [`actions`] - the plugin families
//! - [`enrich`] - parallel per-resource enrichment
//! - [`provider`] - provider REST clients
//! - [`config`] / [`error`] - configuration and error types

pub mod actions;
pub mod config;
pub mod enrich;
pub mod error;
pub mod filters;
pub mod plugin;
pub mod policy;
pub mod provider;
pub mod resource;
pub mod session;

pub use error::{Error, Result};
