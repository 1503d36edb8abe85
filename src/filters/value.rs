//! Value filter
//!
//! Compares one field of a resource against a configured value:
//!
//! ```yaml
//! - type: value
//!   key: properties.networkAcls.defaultAction
//!   op: eq
//!   value_type: normalize
//!   value: allow
//! ```
//!
//! Missing fields and JSON null are *absent*. An absent field matches only
//! `value: absent`, `value: empty` and `op: eq` against `value: null`; every
//! other comparison against it is false, including `value_type: size`.

use super::ops::Operator;
use super::value_type::ValueType;
use super::Filter;
use crate::error::SchemaError;
use crate::resource::{KeyPath, Resource};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::{Regex, RegexBuilder};
use serde_json::{Map, Value};

/// Properties accepted by a value-style filter
pub const VALUE_PROPERTIES: &[&str] = &["type", "key", "op", "value", "value_type"];

/// What the configured `value` asks for
#[derive(Debug, Clone, PartialEq)]
enum Expected {
    Absent,
    Present,
    Empty,
    NotNull,
    Value(Value),
}

impl Expected {
    fn from_value(value: Value) -> Self {
        match value.as_str() {
            Some("absent") => Expected::Absent,
            Some("present") => Expected::Present,
            Some("empty") => Expected::Empty,
            Some("not-null") => Expected::NotNull,
            _ => Expected::Value(value),
        }
    }
}

#[derive(Debug, Clone)]
enum Pattern {
    Regex(Regex),
    Glob(glob::Pattern),
}

impl Pattern {
    fn matches(&self, candidate: &str) -> bool {
        match self {
            Pattern::Regex(regex) => regex.is_match(candidate),
            Pattern::Glob(glob) => glob.matches(candidate),
        }
    }
}

/// One declarative comparison against a resource field
#[derive(Debug, Clone)]
pub struct ValueMatcher {
    key: KeyPath,
    op: Operator,
    value_type: ValueType,
    expected: Expected,
    pattern: Option<Pattern>,
}

impl ValueMatcher {
    /// Build from a filter mapping. `properties` lists the accepted keys;
    /// anything else is rejected.
    pub fn from_config(data: &Map<String, Value>, properties: &[&str]) -> Result<Self, SchemaError> {
        if let Some(unknown) = data.keys().find(|k| !properties.contains(&k.as_str())) {
            return Err(SchemaError::new(
                unknown.as_str(),
                format!("unknown property (allowed: {})", properties.join(", ")),
            ));
        }

        let key = match data.get("key") {
            Some(Value::String(key)) => key.parse::<KeyPath>()?,
            Some(_) => return Err(SchemaError::new("key", "must be a string")),
            None => return Err(SchemaError::new("key", "is required")),
        };

        let op = match data.get("op") {
            None => None,
            Some(Value::String(op)) => Some(
                op.parse::<Operator>()
                    .map_err(|e| SchemaError::new("op", e))?,
            ),
            Some(_) => return Err(SchemaError::new("op", "must be a string")),
        };

        let value_type = match data.get("value_type") {
            None => ValueType::default(),
            Some(Value::String(vt)) => vt
                .parse::<ValueType>()
                .map_err(|e| SchemaError::new("value_type", e))?,
            Some(_) => return Err(SchemaError::new("value_type", "must be a string")),
        };

        let value = data
            .get("value")
            .cloned()
            .ok_or_else(|| SchemaError::new("value", "is required"))?;

        Self::new(key, op, value_type, value)
    }

    /// Validate and assemble a matcher
    pub fn new(
        key: KeyPath,
        op: Option<Operator>,
        value_type: ValueType,
        value: Value,
    ) -> Result<Self, SchemaError> {
        let expected = Expected::from_value(value);
        let op = match (&expected, op) {
            (Expected::Value(_), op) => op.unwrap_or(Operator::Eq),
            (_, None | Some(Operator::Eq)) => Operator::Eq,
            (_, Some(op)) => {
                return Err(SchemaError::new(
                    "op",
                    format!("'{}' cannot be combined with a sentinel value", op),
                ))
            }
        };

        let mut pattern = None;
        if let Expected::Value(value) = &expected {
            if !value.is_null() {
                validate_value(op, value_type, value)?;
                pattern = compile_pattern(op, value_type, value)?;
            } else if op != Operator::Eq && op != Operator::Ne {
                return Err(SchemaError::new("value", "null only works with eq/ne"));
            }
        }

        Ok(Self {
            key,
            op,
            value_type,
            expected,
            pattern,
        })
    }

    pub fn key(&self) -> &KeyPath {
        &self.key
    }

    /// Evaluate against a resource
    pub fn matches(&self, resource: &Resource) -> bool {
        self.matches_at(resource, Utc::now())
    }

    /// Evaluate with a fixed clock (age/expiration comparisons)
    pub fn matches_at(&self, resource: &Resource, now: DateTime<Utc>) -> bool {
        let actual = resource.resolve(&self.key);

        let expected = match &self.expected {
            Expected::Absent => return actual.is_none(),
            Expected::Present => return actual.is_some(),
            Expected::Empty => return !actual.as_ref().is_some_and(is_truthy),
            Expected::NotNull => return actual.as_ref().is_some_and(is_truthy),
            Expected::Value(expected) => expected,
        };

        let Some(actual) = actual else {
            return expected.is_null() && self.op == Operator::Eq;
        };
        if expected.is_null() {
            return self.op == Operator::Ne;
        }

        let (left, right) = match self.value_type.coerce(actual, expected, now) {
            Ok(pair) => pair,
            Err(e) => {
                tracing::debug!("{} on {}: {}", self.key, resource.label(), e);
                return false;
            }
        };

        match &self.pattern {
            Some(pattern) => left.as_str().is_some_and(|s| pattern.matches(s)),
            None => self.op.apply(&left, &right),
        }
    }
}

/// Truthiness of a present value: empty collections, empty strings, zero
/// and false are falsy
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn validate_value(op: Operator, value_type: ValueType, value: &Value) -> Result<(), SchemaError> {
    value_type
        .coerce_expected(value)
        .map_err(|e| SchemaError::new("value", format!("{} (value_type {})", e, value_type)))?;

    // with swap the list sits on the resource side
    if op.takes_list() && value_type != ValueType::Swap && !value.is_array() {
        return Err(SchemaError::new("value", format!("'{}' requires a list", op)));
    }
    if op.is_ordering() && (value.is_array() || value.is_object()) {
        return Err(SchemaError::new("value", format!("'{}' requires a scalar", op)));
    }
    if op.is_pattern() && !value.is_string() {
        return Err(SchemaError::new("value", format!("'{}' requires a string pattern", op)));
    }
    if op.is_pattern() && value_type == ValueType::Swap {
        return Err(SchemaError::new(
            "value_type",
            format!("'swap' cannot be combined with '{}'", op),
        ));
    }
    Ok(())
}

fn compile_pattern(
    op: Operator,
    value_type: ValueType,
    value: &Value,
) -> Result<Option<Pattern>, SchemaError> {
    if !op.is_pattern() {
        return Ok(None);
    }
    let raw = value
        .as_str()
        .ok_or_else(|| SchemaError::new("value", "pattern must be a string"))?;
    let normalized = value_type == ValueType::Normalize;

    let pattern = match op {
        Operator::Glob => {
            let coerced = value_type
                .coerce_expected(value)
                .map_err(|e| SchemaError::new("value", e.to_string()))?;
            let source = coerced
                .as_str()
                .ok_or_else(|| SchemaError::new("value", "pattern must be a string"))?;
            Pattern::Glob(
                glob::Pattern::new(source)
                    .map_err(|e| SchemaError::new("value", format!("invalid glob: {}", e)))?,
            )
        }
        // normalize: trimmed source, case-insensitive (lowercasing would turn \D into \d).
        // Anchored at the start only, like a prefix match.
        _ => {
            let source = if normalized { raw.trim() } else { raw };
            Pattern::Regex(
                RegexBuilder::new(&format!("^(?:{})", source))
                    .case_insensitive(op == Operator::RegexCaseInsensitive || normalized)
                    .build()
                    .map_err(|e| SchemaError::new("value", format!("invalid regex: {}", e)))?,
            )
        }
    };
    Ok(Some(pattern))
}

/// `type: value` filter
#[derive(Debug, Clone)]
pub struct ValueFilter {
    matcher: ValueMatcher,
}

impl ValueFilter {
    pub fn new(matcher: ValueMatcher) -> Self {
        Self { matcher }
    }

    pub fn from_config(data: &Map<String, Value>) -> Result<Box<dyn Filter>, SchemaError> {
        let matcher = ValueMatcher::from_config(data, VALUE_PROPERTIES)?;
        Ok(Box::new(Self::new(matcher)))
    }
}

#[async_trait]
impl Filter for ValueFilter {
    fn type_name(&self) -> &str {
        "value"
    }

    fn matches(&self, resource: &Resource) -> bool {
        self.matcher.matches(resource)
    }
}
