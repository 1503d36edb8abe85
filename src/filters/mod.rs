//! Filters
//!
//! A filter narrows a batch of resources. Each filter has two steps:
//! an optional [`Filter::enrich`] that adds data to the resources (through
//! the parallel enricher), and [`Filter::matches`], a pure predicate over
//! one resource. [`Filter::process`] runs both.
//!
//! # Module Structure
//!
//! - [`value`] - generic value comparison (`type: value`)
//! - [`ops`] / [`value_type`] - operators and coercions used by it
//! - [`boolean`] - `and` / `or` / `not` composition
//! - [`firewall`] - SQL server firewall rules (enriching)
//! - [`spec`] - parsing filter configuration
//! - [`registry`] - name to constructor lookup

pub mod boolean;
pub mod firewall;
pub mod ops;
pub mod registry;
pub mod spec;
pub mod value;
pub mod value_type;

pub use registry::{FilterFactory, FilterRegistry};
pub use spec::FilterSpec;
pub use value::{ValueFilter, ValueMatcher};

use crate::error::Result;
use crate::resource::{Resource, ResourceManager};
use async_trait::async_trait;
use std::fmt;

#[async_trait]
pub trait Filter: Send + Sync + fmt::Debug {
    /// Registered type name
    fn type_name(&self) -> &str;

    /// Add whatever data `matches` needs. Must keep every resource.
    async fn enrich(
        &self,
        resources: Vec<Resource>,
        _manager: &ResourceManager,
    ) -> Result<Vec<Resource>> {
        Ok(resources)
    }

    fn matches(&self, resource: &Resource) -> bool;

    /// Enrich, then keep the matching resources in order
    async fn process(
        &self,
        resources: Vec<Resource>,
        manager: &ResourceManager,
    ) -> Result<Vec<Resource>> {
        let enriched = self.enrich(resources, manager).await?;
        Ok(enriched.into_iter().filter(|r| self.matches(r)).collect())
    }
}
