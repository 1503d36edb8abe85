//! Filter configuration parsing
//!
//! Accepted shapes:
//!
//! ```yaml
//! - type: value            # typed filter, handed to its registered constructor
//!   key: name
//!   value: sql1
//! - or:                    # boolean node
//!     - {type: value, key: location, value: eastus}
//!     - "tag:Owner": absent
//! - "tag:Env": prod        # shorthand for {type: value, key: "tag:Env", value: prod}
//! ```

use super::boolean::BooleanOp;
use crate::error::SchemaError;
use serde_json::{Map, Value};

/// Parsed filter configuration
#[derive(Debug, Clone, PartialEq)]
pub enum FilterSpec {
    Boolean(BooleanOp, Vec<FilterSpec>),
    Typed {
        type_name: String,
        data: Map<String, Value>,
    },
}

impl FilterSpec {
    pub fn parse(value: &Value) -> Result<Self, SchemaError> {
        let Some(map) = value.as_object() else {
            return Err(SchemaError::new("", "filter must be a mapping"));
        };

        if let Some(type_value) = map.get("type") {
            let type_name = type_value
                .as_str()
                .ok_or_else(|| SchemaError::new("type", "must be a string"))?;
            return Ok(FilterSpec::Typed {
                type_name: type_name.to_string(),
                data: map.clone(),
            });
        }

        if map.len() != 1 {
            return Err(SchemaError::new("type", "is required"));
        }
        let Some((key, inner)) = map.iter().next() else {
            return Err(SchemaError::new("type", "is required"));
        };

        let op = match key.as_str() {
            "and" => Some(BooleanOp::And),
            "or" => Some(BooleanOp::Or),
            "not" => Some(BooleanOp::Not),
            _ => None,
        };

        match op {
            Some(op) => {
                let items = inner
                    .as_array()
                    .filter(|items| !items.is_empty())
                    .ok_or_else(|| SchemaError::new(key.as_str(), "must be a non-empty list"))?;
                let children = items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| {
                        Self::parse(item).map_err(|e| e.within(&format!("{}[{}]", key, i)))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(FilterSpec::Boolean(op, children))
            }
            None => {
                let mut data = Map::new();
                data.insert("type".into(), Value::String("value".into()));
                data.insert("key".into(), Value::String(key.clone()));
                data.insert("value".into(), inner.clone());
                Ok(FilterSpec::Typed {
                    type_name: "value".into(),
                    data,
                })
            }
        }
    }
}
