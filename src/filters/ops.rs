//! Comparison operators of the value filter

use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Comparison between a resource value (left) and the configured value (right)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Glob,
    Regex,
    RegexCaseInsensitive,
    In,
    NotIn,
    Contains,
    Intersect,
    Difference,
}

impl Operator {
    pub const NAMES: &'static [&'static str] = &[
        "eq",
        "equal",
        "ne",
        "not-equal",
        "gt",
        "greater-than",
        "ge",
        "gte",
        "lt",
        "less-than",
        "le",
        "lte",
        "glob",
        "regex",
        "regex-case-insensitive",
        "in",
        "value-in",
        "ni",
        "not-in",
        "value-not-in",
        "contains",
        "intersect",
        "difference",
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Ne => "ne",
            Operator::Gt => "gt",
            Operator::Ge => "ge",
            Operator::Lt => "lt",
            Operator::Le => "le",
            Operator::Glob => "glob",
            Operator::Regex => "regex",
            Operator::RegexCaseInsensitive => "regex-case-insensitive",
            Operator::In => "in",
            Operator::NotIn => "not-in",
            Operator::Contains => "contains",
            Operator::Intersect => "intersect",
            Operator::Difference => "difference",
        }
    }

    /// Operators whose configured value is a list
    pub fn takes_list(&self) -> bool {
        matches!(
            self,
            Operator::In | Operator::NotIn | Operator::Intersect | Operator::Difference
        )
    }

    /// Ordering comparators
    pub fn is_ordering(&self) -> bool {
        matches!(self, Operator::Gt | Operator::Ge | Operator::Lt | Operator::Le)
    }

    /// Operators evaluated with a compiled pattern instead of [`Operator::apply`]
    pub fn is_pattern(&self) -> bool {
        matches!(
            self,
            Operator::Glob | Operator::Regex | Operator::RegexCaseInsensitive
        )
    }

    /// Apply a non-pattern operator. Incomparable operands never match.
    pub fn apply(&self, left: &Value, right: &Value) -> bool {
        match self {
            Operator::Eq => values_equal(left, right),
            Operator::Ne => !values_equal(left, right),
            Operator::Gt => compare(left, right) == Some(Ordering::Greater),
            Operator::Ge => matches!(
                compare(left, right),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Operator::Lt => compare(left, right) == Some(Ordering::Less),
            Operator::Le => matches!(compare(left, right), Some(Ordering::Less | Ordering::Equal)),
            Operator::In => right
                .as_array()
                .is_some_and(|items| items.iter().any(|item| values_equal(left, item))),
            Operator::NotIn => right
                .as_array()
                .is_some_and(|items| !items.iter().any(|item| values_equal(left, item))),
            Operator::Contains => match (left, right) {
                (Value::Array(items), _) => items.iter().any(|item| values_equal(item, right)),
                (Value::String(haystack), Value::String(needle)) => haystack.contains(needle.as_str()),
                (Value::Object(map), Value::String(key)) => map.contains_key(key),
                _ => false,
            },
            Operator::Intersect => match (left, right) {
                (Value::Array(a), Value::Array(b)) => {
                    a.iter().any(|x| b.iter().any(|y| values_equal(x, y)))
                }
                _ => false,
            },
            Operator::Difference => match (left, right) {
                (Value::Array(a), Value::Array(b)) => {
                    a.iter().any(|x| !b.iter().any(|y| values_equal(x, y)))
                }
                _ => false,
            },
            Operator::Glob | Operator::Regex | Operator::RegexCaseInsensitive => false,
        }
    }
}

impl FromStr for Operator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let op = match s {
            "eq" | "equal" => Operator::Eq,
            "ne" | "not-equal" => Operator::Ne,
            "gt" | "greater-than" => Operator::Gt,
            "ge" | "gte" => Operator::Ge,
            "lt" | "less-than" => Operator::Lt,
            "le" | "lte" => Operator::Le,
            "glob" => Operator::Glob,
            "regex" => Operator::Regex,
            "regex-case-insensitive" => Operator::RegexCaseInsensitive,
            "in" | "value-in" => Operator::In,
            "ni" | "not-in" | "value-not-in" => Operator::NotIn,
            "contains" => Operator::Contains,
            "intersect" => Operator::Intersect,
            "difference" => Operator::Difference,
            other => return Err(format!("unknown operator '{}'", other)),
        };
        Ok(op)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Equality with numeric tolerance across integer/float representations
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => a.as_f64() == b.as_f64(),
        },
        _ => left == right,
    }
}

/// Ordering between two values of the same kind
pub fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
        },
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}
