//! Key paths into resource records
//!
//! Supported syntax:
//! - `properties.state` - dotted fields
//! - `properties.rules[0].name` - array index (negative counts from the end)
//! - `properties.subnets[*].id` - projection over every element
//! - `tags."cost.center"` - quoted field containing dots
//! - `tag:Owner` - shorthand for the `Owner` entry of `tags`

use crate::error::SchemaError;
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Field(String),
    Index(i64),
    Wildcard,
}

/// A parsed key path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPath {
    raw: String,
    segments: Vec<Segment>,
}

impl KeyPath {
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Walk the path through `root`. Null leaves count as missing.
    pub fn resolve(&self, root: &Map<String, Value>) -> Option<Value> {
        let (first, rest) = self.segments.split_first()?;
        let Segment::Field(name) = first else {
            return None;
        };
        let resolved = resolve_at(root.get(name)?, rest)?;
        if resolved.is_null() {
            None
        } else {
            Some(resolved)
        }
    }
}

fn resolve_at(value: &Value, segments: &[Segment]) -> Option<Value> {
    let Some((first, rest)) = segments.split_first() else {
        return Some(value.clone());
    };

    match first {
        Segment::Field(name) => resolve_at(value.as_object()?.get(name)?, rest),
        Segment::Index(index) => {
            let items = value.as_array()?;
            let position = if *index < 0 {
                items.len() as i64 + index
            } else {
                *index
            };
            let position = usize::try_from(position).ok()?;
            resolve_at(items.get(position)?, rest)
        }
        Segment::Wildcard => {
            let projected = value
                .as_array()?
                .iter()
                .filter_map(|item| resolve_at(item, rest))
                .filter(|v| !v.is_null())
                .collect();
            Some(Value::Array(projected))
        }
    }
}

impl FromStr for KeyPath {
    type Err = SchemaError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = |message: &str| SchemaError::new("key", format!("{} in '{}'", message, raw));

        if raw.is_empty() {
            return Err(SchemaError::new("key", "key must not be empty"));
        }

        if let Some(tag) = raw.strip_prefix("tag:") {
            if tag.is_empty() {
                return Err(invalid("missing tag name"));
            }
            return Ok(Self {
                raw: raw.to_string(),
                segments: vec![Segment::Field("tags".into()), Segment::Field(tag.into())],
            });
        }

        let chars: Vec<char> = raw.chars().collect();
        let mut segments = Vec::new();
        let mut pos = 0;

        loop {
            // field name, quoted or bare
            let field = if chars.get(pos) == Some(&'"') {
                let close = chars[pos + 1..]
                    .iter()
                    .position(|c| *c == '"')
                    .ok_or_else(|| invalid("unterminated quote"))?;
                let name: String = chars[pos + 1..pos + 1 + close].iter().collect();
                pos += close + 2;
                name
            } else {
                let start = pos;
                while pos < chars.len() && chars[pos] != '.' && chars[pos] != '[' {
                    pos += 1;
                }
                chars[start..pos].iter().collect()
            };
            if field.is_empty() {
                return Err(invalid("empty field name"));
            }
            segments.push(Segment::Field(field));

            while chars.get(pos) == Some(&'[') {
                let close = chars[pos..]
                    .iter()
                    .position(|c| *c == ']')
                    .ok_or_else(|| invalid("unterminated '['"))?;
                let inner: String = chars[pos + 1..pos + close].iter().collect();
                let segment = match inner.trim() {
                    "*" => Segment::Wildcard,
                    index => Segment::Index(
                        index
                            .parse()
                            .map_err(|_| invalid("index must be an integer or '*'"))?,
                    ),
                };
                segments.push(segment);
                pos += close + 1;
            }

            match chars.get(pos) {
                None => break,
                Some('.') => pos += 1,
                Some(_) => return Err(invalid("expected '.' or '['")),
            }
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn root() -> Map<String, Value> {
        json!({
            "name": "cctstorage01",
            "tags": {"Owner": "team-a", "cost.center": "42"},
            "properties": {
                "networkAcls": {
                    "ipRules": [
                        {"value": "11.12.13.14", "action": "Allow"},
                        {"value": "21.22.23.24", "action": "Allow"}
                    ]
                },
                "encryption": null
            }
        })
        .as_object()
        .unwrap()
        .clone()
    }

    fn resolve(path: &str) -> Option<Value> {
        path.parse::<KeyPath>().unwrap().resolve(&root())
    }

    #[test]
    fn test_top_level_field() {
        assert_eq!(resolve("name"), Some(json!("cctstorage01")));
    }

    #[test]
    fn test_nested_index() {
        assert_eq!(
            resolve("properties.networkAcls.ipRules[1].value"),
            Some(json!("21.22.23.24"))
        );
        assert_eq!(
            resolve("properties.networkAcls.ipRules[-1].value"),
            Some(json!("21.22.23.24"))
        );
    }

    #[test]
    fn test_wildcard_projection() {
        assert_eq!(
            resolve("properties.networkAcls.ipRules[*].value"),
            Some(json!(["11.12.13.14", "21.22.23.24"]))
        );
    }

    #[test]
    fn test_tag_shorthand_and_quoted_field() {
        assert_eq!(resolve("tag:Owner"), Some(json!("team-a")));
        assert_eq!(resolve("tags.\"cost.center\""), Some(json!("42")));
    }

    #[test]
    fn test_missing_and_null_are_absent() {
        assert_eq!(resolve("properties.missing"), None);
        assert_eq!(resolve("properties.encryption"), None);
        assert_eq!(resolve("properties.networkAcls.ipRules[7].value"), None);
        assert_eq!(resolve("name.inner"), None);
    }

    #[test]
    fn test_invalid_paths_rejected() {
        for bad in ["", "a..b", "a[", "a[x]", "\"open", "tag:", "a[0]b"] {
            assert!(bad.parse::<KeyPath>().is_err(), "{bad} should fail");
        }
    }
}
