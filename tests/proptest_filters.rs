//! Property-based tests using proptest
//!
//! These tests check the enricher and the value matcher over randomized
//! inputs: enrichment never loses or reorders resources whatever the pool
//! shape, and matching is a pure function of the resource.

use async_trait::async_trait;
use custodian::enrich::{execute_in_parallel, Annotations, Enricher, PoolConfig};
use custodian::error::FetchError;
use custodian::filters::value::VALUE_PROPERTIES;
use custodian::filters::ValueMatcher;
use custodian::resource::Resource;
use proptest::prelude::*;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Fails for every resource whose `n` is in `failing`
struct FlakyEnricher {
    failing: HashSet<u64>,
}

#[async_trait]
impl Enricher for FlakyEnricher {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn fetch(&self, resource: &Resource) -> Result<Annotations, FetchError> {
        let n = resource.get("n").and_then(Value::as_u64).unwrap_or_default();
        if self.failing.contains(&n) {
            return Err(FetchError::MissingField("n".into()));
        }
        let mut annotations = Annotations::new();
        annotations.insert("c7n:double".into(), json!(n * 2));
        Ok(annotations)
    }
}

fn numbered(count: usize) -> Vec<Resource> {
    (0..count as u64)
        .map(|n| Resource::try_from(json!({"n": n, "name": format!("r{n}")})).unwrap())
        .collect()
}

/// Generate arbitrary storage-account-like records
fn arb_resource() -> impl Strategy<Value = Resource> {
    (
        "[a-z][a-z0-9]{0,23}",
        prop_oneof!["eastus", "westus", "westeurope"],
        prop::option::of(0u64..5000),
        prop::collection::vec("[a-z]{1,8}", 0..4),
    )
        .prop_map(|(name, location, size, tags)| {
            let mut value = json!({"name": name, "location": location, "zones": tags});
            if let Some(size) = size {
                value["properties"] = json!({"sizeGb": size});
            }
            Resource::try_from(value).unwrap()
        })
}

fn arb_matcher_config() -> impl Strategy<Value = Value> {
    prop_oneof![
        "[a-z]{1,6}".prop_map(|v| json!({"key": "name", "op": "glob", "value": format!("{v}*")})),
        (0u64..5000).prop_map(|v| json!({"key": "properties.sizeGb", "op": "gt", "value": v})),
        Just(json!({"key": "properties.sizeGb", "value": "absent"})),
        Just(json!({"key": "zones", "value_type": "size", "op": "ge", "value": 2})),
        Just(json!({"key": "location", "op": "in", "value": ["eastus", "westus"]})),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Output is the input, in input order, with exactly the failing
    /// resources left unenriched
    #[test]
    fn enrichment_preserves_resources(
        count in 0usize..60,
        chunk_size in 1usize..12,
        max_workers in 1usize..6,
        failing in prop::collection::hash_set(0u64..60, 0..10),
    ) {
        let pool = PoolConfig::new(max_workers, chunk_size, Duration::from_secs(5)).unwrap();
        let input = numbered(count);
        let enricher = Arc::new(FlakyEnricher { failing: failing.clone() });

        let outcome = tokio_test::block_on(execute_in_parallel(input.clone(), enricher, pool));

        prop_assert_eq!(outcome.resources.len(), input.len());
        for (before, after) in input.iter().zip(&outcome.resources) {
            prop_assert_eq!(before.get("n"), after.get("n"));
            let n = before.get("n").and_then(Value::as_u64).unwrap();
            prop_assert_eq!(after.contains_key("c7n:double"), !failing.contains(&n));
        }

        let expected_errors = (0..count as u64).filter(|n| failing.contains(n)).count();
        prop_assert_eq!(outcome.errors.len(), expected_errors);
    }

    /// `matches` gives the same answer every time and never changes the resource
    #[test]
    fn matching_is_idempotent(resource in arb_resource(), config in arb_matcher_config()) {
        let matcher = ValueMatcher::from_config(config.as_object().unwrap(), VALUE_PROPERTIES).unwrap();
        let snapshot = resource.clone();

        let first = matcher.matches(&resource);
        let second = matcher.matches(&resource);

        prop_assert_eq!(first, second);
        prop_assert_eq!(resource, snapshot);
    }

    /// A missing key only matches `absent`; ordering comparisons are false
    #[test]
    fn absent_key_never_compares(resource in arb_resource(), threshold in 0u64..5000) {
        let gt = json!({"key": "properties.sizeGb", "op": "gt", "value": threshold});
        let le = json!({"key": "properties.sizeGb", "op": "le", "value": threshold});
        let absent = json!({"key": "properties.sizeGb", "value": "absent"});
        let build = |v: &Value| ValueMatcher::from_config(v.as_object().unwrap(), VALUE_PROPERTIES).unwrap();

        let present = resource.get("properties").is_some();
        if !present {
            prop_assert!(!build(&gt).matches(&resource));
            prop_assert!(!build(&le).matches(&resource));
        } else {
            prop_assert!(build(&gt).matches(&resource) != build(&le).matches(&resource));
        }
        prop_assert_eq!(build(&absent).matches(&resource), !present);
    }
}
