//! Boolean composition of filters
//!
//! Children enrich first (in order), then matching short-circuits per
//! resource.

use super::Filter;
use crate::error::Result;
use crate::resource::{Resource, ResourceManager};
use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BooleanOp {
    And,
    Or,
    Not,
}

impl BooleanOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            BooleanOp::And => "and",
            BooleanOp::Or => "or",
            BooleanOp::Not => "not",
        }
    }
}

/// `and` / `or` / `not` over child filters. `not` negates the AND of its
/// children.
#[derive(Debug)]
pub struct BooleanFilter {
    op: BooleanOp,
    children: Vec<Box<dyn Filter>>,
}

impl BooleanFilter {
    pub fn new(op: BooleanOp, children: Vec<Box<dyn Filter>>) -> Self {
        Self { op, children }
    }
}

#[async_trait]
impl Filter for BooleanFilter {
    fn type_name(&self) -> &str {
        self.op.as_str()
    }

    async fn enrich(
        &self,
        mut resources: Vec<Resource>,
        manager: &ResourceManager,
    ) -> Result<Vec<Resource>> {
        for child in &self.children {
            resources = child.enrich(resources, manager).await?;
        }
        Ok(resources)
    }

    fn matches(&self, resource: &Resource) -> bool {
        match self.op {
            BooleanOp::And => self.children.iter().all(|c| c.matches(resource)),
            BooleanOp::Or => self.children.iter().any(|c| c.matches(resource)),
            BooleanOp::Not => !self.children.iter().all(|c| c.matches(resource)),
        }
    }
}
