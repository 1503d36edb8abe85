//! Parallel resource enrichment
//!
//! Filters that test data a list call does not return (firewall rules of a
//! SQL server, for instance) first run an [`Enricher`] over the resources.
//! [`execute_in_parallel`] splits the batch into chunks, runs the chunks on
//! a bounded set of workers and merges everything back once every chunk is
//! done. A failing fetch only costs the enrichment of its own resource.

use crate::error::{Error, FetchError, Result};
use crate::resource::Resource;
use async_trait::async_trait;
use futures::FutureExt;
use serde_json::{Map, Value};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Keys (and values) an enricher wants written onto a resource
pub type Annotations = Map<String, Value>;

/// Per-resource sub-query used to enrich a batch
#[async_trait]
pub trait Enricher: Send + Sync {
    /// Short name for log lines
    fn name(&self) -> &str;

    /// Fetch extra data for one resource. The returned annotations are
    /// written onto the resource only if the call succeeds.
    async fn fetch(&self, resource: &Resource) -> std::result::Result<Annotations, FetchError>;
}

/// Worker pool settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    max_workers: usize,
    chunk_size: usize,
    fetch_timeout: Duration,
}

impl PoolConfig {
    pub fn new(max_workers: usize, chunk_size: usize, fetch_timeout: Duration) -> Result<Self> {
        if max_workers == 0 {
            return Err(Error::Config("max_workers must be at least 1".into()));
        }
        if chunk_size == 0 {
            return Err(Error::Config("chunk_size must be at least 1".into()));
        }
        if fetch_timeout.is_zero() {
            return Err(Error::Config("fetch timeout must be positive".into()));
        }
        Ok(Self {
            max_workers,
            chunk_size,
            fetch_timeout,
        })
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_workers: crate::config::DEFAULT_MAX_WORKERS,
            chunk_size: crate::config::DEFAULT_CHUNK_SIZE,
            fetch_timeout: Duration::from_secs(crate::config::DEFAULT_FETCH_TIMEOUT_SECS),
        }
    }
}

/// A resource whose enrichment failed
#[derive(Debug)]
pub struct EnrichmentError {
    /// Position of the resource in the input batch
    pub index: usize,
    /// Resource label at the time of the failure
    pub resource: String,
    pub error: FetchError,
}

/// Result of one enrichment run
#[derive(Debug, Default)]
pub struct EnrichmentOutcome {
    /// Every input resource, in input order
    pub resources: Vec<Resource>,
    /// One entry per failed fetch, ordered by `index`
    pub errors: Vec<EnrichmentError>,
}

struct ChunkResult {
    offset: usize,
    resources: Vec<Resource>,
    errors: Vec<EnrichmentError>,
}

/// Enrich `resources` with `enricher`, at most `pool.max_workers()` chunks at
/// a time. Returns once every chunk has completed. Dropping the returned
/// future aborts all chunk tasks still running.
pub async fn execute_in_parallel(
    resources: Vec<Resource>,
    enricher: Arc<dyn Enricher>,
    pool: PoolConfig,
) -> EnrichmentOutcome {
    if resources.is_empty() {
        return EnrichmentOutcome::default();
    }

    let started = Instant::now();
    let total = resources.len();
    let semaphore = Arc::new(Semaphore::new(pool.max_workers));
    let mut tasks = JoinSet::new();
    let mut offset = 0;

    for chunk in into_chunks(resources, pool.chunk_size) {
        let len = chunk.len();
        let semaphore = Arc::clone(&semaphore);
        let enricher = Arc::clone(&enricher);
        let timeout = pool.fetch_timeout;

        tasks.spawn(async move {
            // The semaphore lives until every task is joined, so acquire cannot fail
            let _permit = semaphore.acquire_owned().await.ok();
            process_chunk(offset, chunk, enricher.as_ref(), timeout).await
        });
        offset += len;
    }

    let chunk_count = tasks.len();
    let mut finished = Vec::with_capacity(chunk_count);
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(chunk) => finished.push(chunk),
            // process_chunk contains fetch panics itself; this is a bug path
            Err(e) => tracing::error!("Enrichment task for {} failed: {}", enricher.name(), e),
        }
    }

    finished.sort_by_key(|chunk| chunk.offset);
    let mut outcome = EnrichmentOutcome {
        resources: Vec::with_capacity(total),
        errors: Vec::new(),
    };
    for chunk in finished {
        outcome.resources.extend(chunk.resources);
        outcome.errors.extend(chunk.errors);
    }

    tracing::debug!(
        "{}: enriched {} resources in {} chunks ({} failed) in {:?}",
        enricher.name(),
        total,
        chunk_count,
        outcome.errors.len(),
        started.elapsed()
    );

    outcome
}

/// Split into contiguous chunks of `size`; the last one may be shorter
fn into_chunks(mut resources: Vec<Resource>, size: usize) -> Vec<Vec<Resource>> {
    let mut chunks = Vec::with_capacity(resources.len().div_ceil(size));
    while resources.len() > size {
        let rest = resources.split_off(size);
        chunks.push(resources);
        resources = rest;
    }
    if !resources.is_empty() {
        chunks.push(resources);
    }
    chunks
}

async fn process_chunk(
    offset: usize,
    mut chunk: Vec<Resource>,
    enricher: &dyn Enricher,
    timeout: Duration,
) -> ChunkResult {
    let mut errors = Vec::new();

    for (position, resource) in chunk.iter_mut().enumerate() {
        let call = AssertUnwindSafe(enricher.fetch(&*resource)).catch_unwind();
        let outcome = match tokio::time::timeout(timeout, call).await {
            Ok(Ok(result)) => result,
            Ok(Err(panic)) => Err(FetchError::Panicked(panic_message(&*panic))),
            Err(_) => Err(FetchError::Timeout(timeout)),
        };

        match outcome {
            Ok(annotations) => {
                for (key, value) in annotations {
                    resource.insert(key, value);
                }
            }
            Err(error) => {
                let label = resource.label();
                tracing::warn!("{}: enrichment of {} failed: {}", enricher.name(), label, error);
                errors.push(EnrichmentError {
                    index: offset + position,
                    resource: label,
                    error,
                });
            }
        }
    }

    ChunkResult {
        offset,
        resources: chunk,
        errors,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn resources(n: usize) -> Vec<Resource> {
        (0..n)
            .map(|i| Resource::try_from(json!({"name": format!("r{}", i), "resourceGroup": "rg"})).unwrap())
            .collect()
    }

    /// Writes `c7n:seen`; fails, hangs or panics on configured names
    struct TestEnricher {
        fail: Vec<&'static str>,
        hang: Vec<&'static str>,
        panic: Vec<&'static str>,
        delay: Duration,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl TestEnricher {
        fn new() -> Self {
            Self {
                fail: vec![],
                hang: vec![],
                panic: vec![],
                delay: Duration::ZERO,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Enricher for TestEnricher {
        fn name(&self) -> &str {
            "test"
        }

        async fn fetch(&self, resource: &Resource) -> std::result::Result<Annotations, FetchError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            let name = resource.name().unwrap_or_default().to_string();
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.hang.contains(&name.as_str()) {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.panic.contains(&name.as_str()) {
                panic!("boom on {}", name);
            }
            if self.fail.contains(&name.as_str()) {
                return Err(FetchError::Provider(anyhow::anyhow!("API request failed: 500")));
            }

            let mut annotations = Annotations::new();
            annotations.insert("c7n:seen".into(), json!(name));
            Ok(annotations)
        }
    }

    fn pool(workers: usize, chunk: usize) -> PoolConfig {
        PoolConfig::new(workers, chunk, Duration::from_secs(5)).unwrap()
    }

    fn names(resources: &[Resource]) -> Vec<String> {
        resources.iter().map(|r| r.name().unwrap().to_string()).collect()
    }

    #[test]
    fn test_into_chunks_sizes() {
        let sizes: Vec<usize> = into_chunks(resources(7), 3).iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
        let sizes: Vec<usize> = into_chunks(resources(6), 3).iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![3, 3]);
        assert!(into_chunks(Vec::new(), 3).is_empty());
    }

    #[test]
    fn test_pool_config_rejects_zero() {
        assert!(PoolConfig::new(0, 1, Duration::from_secs(1)).is_err());
        assert!(PoolConfig::new(1, 0, Duration::from_secs(1)).is_err());
        assert!(PoolConfig::new(1, 1, Duration::ZERO).is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_all_resources_enriched_in_input_order() {
        let input = resources(25);
        let expected = names(&input);
        let outcome = execute_in_parallel(input, Arc::new(TestEnricher::new()), pool(3, 4)).await;

        assert!(outcome.errors.is_empty());
        assert_eq!(names(&outcome.resources), expected);
        for resource in &outcome.resources {
            assert_eq!(resource.get("c7n:seen"), Some(&json!(resource.name().unwrap())));
        }
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_resource_without_field() {
        let mut enricher = TestEnricher::new();
        enricher.fail = vec!["r2"];
        let outcome = execute_in_parallel(resources(5), Arc::new(enricher), pool(2, 2)).await;

        assert_eq!(outcome.resources.len(), 5);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].index, 2);
        assert_eq!(outcome.errors[0].resource, "rg/r2");

        let failed = &outcome.resources[2];
        assert_eq!(failed.name(), Some("r2"));
        assert!(!failed.contains_key("c7n:seen"));
        assert!(outcome.resources[3].contains_key("c7n:seen"));
    }

    #[tokio::test]
    async fn test_timeout_is_per_resource() {
        let mut enricher = TestEnricher::new();
        enricher.hang = vec!["r1"];
        let pool = PoolConfig::new(2, 10, Duration::from_millis(50)).unwrap();
        let outcome = execute_in_parallel(resources(3), Arc::new(enricher), pool).await;

        assert_eq!(outcome.resources.len(), 3);
        assert_eq!(outcome.errors.len(), 1);
        assert!(matches!(outcome.errors[0].error, FetchError::Timeout(_)));
        assert!(outcome.resources[2].contains_key("c7n:seen"));
    }

    #[tokio::test]
    async fn test_panicking_fetch_is_contained() {
        let mut enricher = TestEnricher::new();
        enricher.panic = vec!["r0"];
        let outcome = execute_in_parallel(resources(3), Arc::new(enricher), pool(1, 3)).await;

        assert_eq!(outcome.resources.len(), 3);
        match &outcome.errors[0].error {
            FetchError::Panicked(message) => assert!(message.contains("boom on r0")),
            other => panic!("unexpected error {other:?}"),
        }
        assert!(outcome.resources[1].contains_key("c7n:seen"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_worker_count_is_bounded() {
        let mut enricher = TestEnricher::new();
        enricher.delay = Duration::from_millis(10);
        let enricher = Arc::new(enricher);
        let outcome =
            execute_in_parallel(resources(12), enricher.clone() as Arc<dyn Enricher>, pool(2, 1)).await;

        assert_eq!(outcome.resources.len(), 12);
        assert!(enricher.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let outcome = execute_in_parallel(Vec::new(), Arc::new(TestEnricher::new()), pool(1, 1)).await;
        assert!(outcome.resources.is_empty());
        assert!(outcome.errors.is_empty());
    }
}
