//! Error types
//!
//! Library-level errors use `thiserror`. Provider and CLI code stays on
//! `anyhow` and converts at the boundary through [`Error::Provider`].

use std::time::Duration;
use thiserror::Error;

/// Result alias used across the library
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for policy loading and execution
#[derive(Error, Debug)]
pub enum Error {
    /// A filter, action or policy failed validation
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Policy file could not be read or parsed
    #[error("Policy load error: {0}")]
    PolicyLoad(String),

    /// Unknown resource type or bad registry contents
    #[error("Configuration error: {0}")]
    Config(String),

    /// Provider failure that affects the whole run (client, enumeration)
    #[error("Provider error: {0:#}")]
    Provider(#[from] anyhow::Error),

    /// Action execution failed
    #[error("Action '{action}' failed: {message}")]
    Action {
        /// Action type name
        action: String,
        /// Failure details
        message: String,
    },

    /// Output could not be written
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Invalid filter/action/policy configuration. Always fatal at load time.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{location}: {message}")]
pub struct SchemaError {
    /// Where the problem is (e.g. `filters[1].op`)
    pub location: String,
    /// What is wrong
    pub message: String,
}

impl SchemaError {
    pub fn new(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            message: message.into(),
        }
    }

    /// Prefix the location with an enclosing path segment
    pub fn within(mut self, parent: &str) -> Self {
        self.location = if self.location.is_empty() {
            parent.to_string()
        } else {
            format!("{}.{}", parent, self.location)
        };
        self
    }
}

/// Failure of a single per-resource sub-query
#[derive(Error, Debug)]
pub enum FetchError {
    /// The provider call returned an error
    #[error("{0:#}")]
    Provider(#[from] anyhow::Error),

    /// The resource lacks a field the sub-query needs
    #[error("resource has no '{0}' field")]
    MissingField(String),

    /// The call did not finish in time
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The fetch panicked
    #[error("fetch panicked: {0}")]
    Panicked(String),
}

/// A value could not be converted to the requested value type.
/// Never surfaced to callers; the comparison is a non-match.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot coerce {found} to {target}")]
pub struct CoercionError {
    pub target: &'static str,
    pub found: String,
}

impl CoercionError {
    pub fn new(target: &'static str, found: &serde_json::Value) -> Self {
        let rendered = found.to_string();
        let mut found: String = rendered.chars().take(40).collect();
        if found.len() < rendered.len() {
            found.push_str("...");
        }
        Self { target, found }
    }
}
