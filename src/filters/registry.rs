//! Filter registry
//!
//! Every resource type gets its own registry: the generic filters plus the
//! resource-specific ones its definition lists.

use super::boolean::BooleanFilter;
use super::firewall::FirewallFilter;
use super::spec::FilterSpec;
use super::value::ValueFilter;
use super::Filter;
use crate::error::{Error, Result, SchemaError};
use crate::plugin::Registry;
use crate::resource::ResourceType;
use serde_json::{Map, Value};

/// Builds a filter from its validated configuration mapping
pub type FilterFactory = fn(&Map<String, Value>) -> std::result::Result<Box<dyn Filter>, SchemaError>;

pub type FilterRegistry = Registry<FilterFactory>;

/// Resource-specific filters, by type name
const RESOURCE_FILTERS: &[(&str, FilterFactory)] =
    &[("firewall", FirewallFilter::from_config as FilterFactory)];

impl Registry<FilterFactory> {
    /// Registry holding only the generic filters
    pub fn generic() -> Self {
        let mut registry = Registry::new("filter");
        registry.register("value", ValueFilter::from_config as FilterFactory);
        registry
    }

    /// Registry for one resource type
    pub fn for_resource(resource_type: &ResourceType) -> Result<Self> {
        let mut registry = Self::generic();
        for name in &resource_type.filters {
            let factory = RESOURCE_FILTERS
                .iter()
                .find(|(known, _)| known == name)
                .map(|(_, factory)| *factory)
                .ok_or_else(|| {
                    Error::Config(format!(
                        "Resource type {} lists unknown filter '{}'",
                        resource_type.key, name
                    ))
                })?;
            registry.register(name.as_str(), factory);
        }
        Ok(registry)
    }

    /// Build the filter tree for a parsed configuration
    pub fn build(&self, spec: &FilterSpec) -> std::result::Result<Box<dyn Filter>, SchemaError> {
        match spec {
            FilterSpec::Boolean(op, children) => {
                let children = children
                    .iter()
                    .enumerate()
                    .map(|(i, child)| {
                        self.build(child)
                            .map_err(|e| e.within(&format!("{}[{}]", op.as_str(), i)))
                    })
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(Box::new(BooleanFilter::new(*op, children)))
            }
            FilterSpec::Typed { type_name, data } => {
                let factory = self.get(type_name).ok_or_else(|| {
                    SchemaError::new(
                        "type",
                        format!(
                            "unknown filter type '{}' (available: {})",
                            type_name,
                            self.names().collect::<Vec<_>>().join(", ")
                        ),
                    )
                })?;
                factory(data)
            }
        }
    }

    /// Parse and build one filter from raw configuration
    pub fn build_value(&self, value: &Value) -> std::result::Result<Box<dyn Filter>, SchemaError> {
        let spec = FilterSpec::parse(value)?;
        self.build(&spec)
    }
}
