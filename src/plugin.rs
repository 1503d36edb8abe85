//! Name to constructor registry shared by filters and actions

use std::collections::BTreeMap;
use std::fmt;

/// Plugin constructors keyed by their configuration `type` name
#[derive(Clone)]
pub struct Registry<F> {
    kind: &'static str,
    entries: BTreeMap<String, F>,
}

impl<F: Copy> Registry<F> {
    /// `kind` names the plugin family in error messages ("filter", "action")
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: BTreeMap::new(),
        }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Register a constructor. A later registration under the same name
    /// replaces the earlier one.
    pub fn register(&mut self, name: impl Into<String>, factory: F) -> &mut Self {
        self.entries.insert(name.into(), factory);
        self
    }

    pub fn get(&self, name: &str) -> Option<F> {
        self.entries.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl<F> fmt::Debug for Registry<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("kind", &self.kind)
            .field("names", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}
