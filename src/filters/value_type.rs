//! Value type coercions
//!
//! A value type converts the resource value (and usually the configured
//! value) before the operator runs. Scalar coercions apply element-wise to
//! lists, so `integer` over `["1", "2"]` yields `[1, 2]`.

use crate::error::CoercionError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::{Number, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

const SECONDS_PER_DAY: f64 = 86_400.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValueType {
    #[default]
    Raw,
    /// Trim and lowercase strings
    Normalize,
    /// Length of a list, map or string
    Size,
    /// Number of distinct list elements
    UniqueSize,
    Integer,
    Float,
    Boolean,
    /// Swap operands: the resource value becomes the right-hand side
    Swap,
    /// Days elapsed since the resource's date
    Age,
    /// Days remaining until the resource's date
    Expiration,
    /// Compare both sides as points in time
    Date,
}

impl ValueType {
    pub const NAMES: &'static [&'static str] = &[
        "raw",
        "normalize",
        "size",
        "unique_size",
        "integer",
        "float",
        "boolean",
        "swap",
        "age",
        "expiration",
        "date",
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::Raw => "raw",
            ValueType::Normalize => "normalize",
            ValueType::Size => "size",
            ValueType::UniqueSize => "unique_size",
            ValueType::Integer => "integer",
            ValueType::Float => "float",
            ValueType::Boolean => "boolean",
            ValueType::Swap => "swap",
            ValueType::Age => "age",
            ValueType::Expiration => "expiration",
            ValueType::Date => "date",
        }
    }

    /// Value types that compare the resource value against a number
    pub fn expects_number(&self) -> bool {
        matches!(
            self,
            ValueType::Size | ValueType::UniqueSize | ValueType::Age | ValueType::Expiration
        )
    }

    /// Coerce the configured value alone. Used at load time for validation
    /// and to precompile patterns.
    pub fn coerce_expected(&self, expected: &Value) -> Result<Value, CoercionError> {
        match self {
            ValueType::Normalize => Ok(normalize(expected)),
            ValueType::Integer => map_scalars(expected, to_integer),
            ValueType::Float => map_scalars(expected, to_float),
            ValueType::Boolean => map_scalars(expected, to_boolean),
            ValueType::Date => to_timestamp(expected),
            ValueType::Size | ValueType::UniqueSize | ValueType::Age | ValueType::Expiration => {
                match expected {
                    Value::Number(_) => Ok(expected.clone()),
                    other => Err(CoercionError::new("number", other)),
                }
            }
            ValueType::Raw | ValueType::Swap => Ok(expected.clone()),
        }
    }

    /// Coerce both operands, returning `(left, right)` for the operator
    pub fn coerce(
        &self,
        actual: Value,
        expected: &Value,
        now: DateTime<Utc>,
    ) -> Result<(Value, Value), CoercionError> {
        let expected = self.coerce_expected(expected)?;
        let actual = match self {
            ValueType::Raw => actual,
            ValueType::Swap => return Ok((expected, actual)),
            ValueType::Normalize => normalize(&actual),
            ValueType::Size => Value::from(size_of(&actual)?),
            ValueType::UniqueSize => Value::from(unique_size_of(&actual)?),
            ValueType::Integer => map_scalars(&actual, to_integer)?,
            ValueType::Float => map_scalars(&actual, to_float)?,
            ValueType::Boolean => map_scalars(&actual, to_boolean)?,
            ValueType::Age => {
                let date = parse_date(&actual).ok_or_else(|| CoercionError::new("date", &actual))?;
                float_value((now - date).num_seconds() as f64 / SECONDS_PER_DAY)?
            }
            ValueType::Expiration => {
                let date = parse_date(&actual).ok_or_else(|| CoercionError::new("date", &actual))?;
                float_value((date - now).num_seconds() as f64 / SECONDS_PER_DAY)?
            }
            ValueType::Date => to_timestamp(&actual)?,
        };
        Ok((actual, expected))
    }
}

impl FromStr for ValueType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value_type = match s {
            "raw" => ValueType::Raw,
            "normalize" => ValueType::Normalize,
            "size" => ValueType::Size,
            "unique_size" => ValueType::UniqueSize,
            "integer" => ValueType::Integer,
            "float" => ValueType::Float,
            "boolean" | "bool" => ValueType::Boolean,
            "swap" => ValueType::Swap,
            "age" => ValueType::Age,
            "expiration" => ValueType::Expiration,
            "date" => ValueType::Date,
            other => return Err(format!("unknown value_type '{}'", other)),
        };
        Ok(value_type)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn normalize(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.trim().to_lowercase()),
        Value::Array(items) => Value::Array(items.iter().map(normalize).collect()),
        other => other.clone(),
    }
}

fn map_scalars(
    value: &Value,
    convert: fn(&Value) -> Result<Value, CoercionError>,
) -> Result<Value, CoercionError> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(convert)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        scalar => convert(scalar),
    }
}

fn size_of(value: &Value) -> Result<usize, CoercionError> {
    match value {
        Value::Array(items) => Ok(items.len()),
        Value::Object(map) => Ok(map.len()),
        Value::String(s) => Ok(s.chars().count()),
        other => Err(CoercionError::new("size", other)),
    }
}

fn unique_size_of(value: &Value) -> Result<usize, CoercionError> {
    match value {
        Value::Array(items) => Ok(items
            .iter()
            .map(|item| item.to_string())
            .collect::<BTreeSet<_>>()
            .len()),
        other => Err(CoercionError::new("unique_size", other)),
    }
}

fn to_integer(value: &Value) -> Result<Value, CoercionError> {
    let parsed = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
        }
        _ => None,
    };
    parsed
        .map(Value::from)
        .ok_or_else(|| CoercionError::new("integer", value))
}

fn to_float(value: &Value) -> Result<Value, CoercionError> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| CoercionError::new("float", value))
}

fn to_boolean(value: &Value) -> Result<Value, CoercionError> {
    let parsed = match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "on" | "1" | "enabled" => Some(true),
            "false" | "no" | "off" | "0" | "disabled" => Some(false),
            _ => None,
        },
        _ => None,
    };
    parsed
        .map(Value::Bool)
        .ok_or_else(|| CoercionError::new("boolean", value))
}

fn to_timestamp(value: &Value) -> Result<Value, CoercionError> {
    let date = parse_date(value).ok_or_else(|| CoercionError::new("date", value))?;
    Ok(Value::from(date.timestamp()))
}

fn float_value(f: f64) -> Result<Value, CoercionError> {
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| CoercionError::new("float", &Value::Null))
}

/// Parse RFC 3339, naive `YYYY-MM-DD[ HH:MM:SS]` (taken as UTC) or epoch
/// seconds (milliseconds when the number is too large for seconds)
pub fn parse_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if let Ok(date) = DateTime::parse_from_rfc3339(s) {
                return Some(date.with_timezone(&Utc));
            }
            for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
                if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
                    return Some(Utc.from_utc_datetime(&naive));
                }
            }
            let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?;
            Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
        }
        Value::Number(n) => {
            let raw = n.as_f64()?;
            let seconds = if raw.abs() > 1e11 { raw / 1000.0 } else { raw };
            Utc.timestamp_opt(seconds.trunc() as i64, 0).single()
        }
        _ => None,
    }
}
