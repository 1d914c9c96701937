//! Integration tests for the store registry and the services reading it.
//!
//! Every store is replaced by an in-process double, so no backend needs to
//! be running.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio_test::{assert_err, assert_ok};

use datastore_hub::config::Config;
use datastore_hub::errors::AppError;
use datastore_hub::infra::{
    CacheStore, PoolStats, StoreConnector, StoreError, StoreHandle, StoreKind, StoreRegistry,
    StoreResult,
};
use datastore_hub::services::{
    CacheAsideService, HealthAggregator, HealthState, MetricsCollector, MetricsSink, PoolSample,
    NOT_INITIALIZED,
};

// =============================================================================
// Store Doubles
// =============================================================================

/// Store double counting probes and closes.
struct FakeStore {
    kind: StoreKind,
    fail_close: bool,
    probes: AtomicUsize,
    closed: AtomicBool,
}

impl FakeStore {
    fn new(kind: StoreKind) -> Self {
        Self {
            kind,
            fail_close: false,
            probes: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    fn failing_close(kind: StoreKind) -> Self {
        Self {
            fail_close: true,
            ..Self::new(kind)
        }
    }

    fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StoreHandle for FakeStore {
    fn kind(&self) -> StoreKind {
        self.kind
    }

    async fn ping(&self) -> StoreResult<()> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn pool_stats(&self) -> Option<PoolStats> {
        Some(PoolStats {
            open_connections: 3,
            in_use: 1,
            idle: 2,
            max_connections: 25,
            ..PoolStats::default()
        })
    }

    async fn close(&self) -> StoreResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        if self.fail_close {
            return Err(StoreError::connect(self.kind, "close failed"));
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Cache double without expiry; patterns support a trailing `*` only.
#[derive(Default)]
struct FakeCache {
    entries: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl StoreHandle for FakeCache {
    fn kind(&self) -> StoreKind {
        StoreKind::Cache
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn close(&self) -> StoreResult<()> {
        Ok(())
    }

    fn is_closed(&self) -> bool {
        false
    }

    fn as_cache(&self) -> Option<&dyn CacheStore> {
        Some(self)
    }
}

#[async_trait]
impl CacheStore for FakeCache {
    async fn get_raw(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    async fn set_raw(&self, key: &str, value: String, _ttl: Duration) -> StoreResult<()> {
        self.entries.lock().unwrap().insert(key.to_string(), value);
        Ok(())
    }

    async fn delete_matching(&self, pattern: &str) -> StoreResult<u64> {
        let prefix = pattern.trim_end_matches('*');
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        Ok((before - entries.len()) as u64)
    }
}

/// Connector failing for the listed kinds and never answering for the hanging ones.
#[derive(Default)]
struct FakeConnector {
    failing: Vec<StoreKind>,
    hanging: Vec<StoreKind>,
}

#[async_trait]
impl StoreConnector for FakeConnector {
    async fn connect(&self, kind: StoreKind, _config: &Config) -> StoreResult<Arc<dyn StoreHandle>> {
        if self.hanging.contains(&kind) {
            std::future::pending::<()>().await;
        }
        if self.failing.contains(&kind) {
            return Err(StoreError::connect(kind, "connection refused"));
        }
        Ok(Arc::new(FakeStore::new(kind)))
    }
}

/// Sink counting published samples.
#[derive(Default)]
struct CountingSink {
    published: AtomicUsize,
}

#[async_trait]
impl MetricsSink for CountingSink {
    async fn publish(&self, _sample: &PoolSample) -> StoreResult<()> {
        self.published.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn registry_with_cache() -> (Arc<StoreRegistry>, Arc<FakeCache>) {
    let cache = Arc::new(FakeCache::default());
    let registry = StoreRegistry::from_handles([
        Arc::new(FakeStore::new(StoreKind::Primary)) as Arc<dyn StoreHandle>,
        cache.clone() as Arc<dyn StoreHandle>,
    ]);
    (Arc::new(registry), cache)
}

// =============================================================================
// Registry Tests
// =============================================================================

#[tokio::test]
async fn test_primary_failure_aborts_initialization() {
    let connector = FakeConnector {
        failing: vec![StoreKind::Primary],
        ..Default::default()
    };

    let result = StoreRegistry::initialize(&Config::default(), &connector).await;

    assert!(matches!(result, Err(AppError::PrimaryStoreUnavailable(_))));
}

#[tokio::test]
async fn test_optional_failure_runs_degraded() {
    let connector = FakeConnector {
        failing: vec![StoreKind::Cache],
        ..Default::default()
    };

    let registry = assert_ok!(StoreRegistry::initialize(&Config::default(), &connector).await);

    assert!(registry.get(StoreKind::Cache).is_none());
    assert!(registry.cache().is_none());
    assert!(registry.get(StoreKind::Primary).is_some());
}

fn short_connect_timeout() -> Config {
    Config {
        connect_timeout: Duration::from_secs(1),
        ..Config::default()
    }
}

#[tokio::test]
async fn test_hanging_optional_store_is_dropped_after_connect_timeout() {
    let connector = FakeConnector {
        hanging: vec![StoreKind::Document],
        ..Default::default()
    };

    let started = Instant::now();
    let registry = assert_ok!(StoreRegistry::initialize(&short_connect_timeout(), &connector).await);

    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(registry.get(StoreKind::Document).is_none());
    assert!(registry.get(StoreKind::Cache).is_some());
    assert!(registry.get(StoreKind::SearchIndex).is_some());
}

#[tokio::test]
async fn test_hanging_primary_fails_after_connect_timeout() {
    let connector = FakeConnector {
        hanging: vec![StoreKind::Primary],
        ..Default::default()
    };

    let started = Instant::now();
    let result = StoreRegistry::initialize(&short_connect_timeout(), &connector).await;

    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(matches!(result, Err(AppError::PrimaryStoreUnavailable(_))));
}

#[tokio::test]
async fn test_close_all_reports_one_error_and_closes_both() {
    let good = Arc::new(FakeStore::new(StoreKind::Primary));
    let bad = Arc::new(FakeStore::failing_close(StoreKind::SearchIndex));
    let registry = StoreRegistry::from_handles([
        good.clone() as Arc<dyn StoreHandle>,
        bad.clone() as Arc<dyn StoreHandle>,
    ]);

    let errors = registry.close_all().await;

    assert_eq!(errors.len(), 1);
    assert!(good.is_closed());
    assert!(bad.is_closed());
}

// =============================================================================
// Health Tests
// =============================================================================

#[tokio::test]
async fn test_absent_kinds_are_reported_without_probing() {
    let primary = Arc::new(FakeStore::new(StoreKind::Primary));
    let registry = StoreRegistry::from_handles([primary.clone() as Arc<dyn StoreHandle>]);

    let report = HealthAggregator::default().check_all(&registry).await;

    assert_eq!(primary.probes(), 1);
    for kind in [StoreKind::Cache, StoreKind::SearchIndex, StoreKind::Document] {
        let status = report.get(kind).unwrap();
        assert_eq!(status.state, HealthState::Down);
        assert_eq!(status.message, NOT_INITIALIZED);
    }
    assert!(report.primary_up());
}

// =============================================================================
// Cache-Aside Tests
// =============================================================================

#[tokio::test]
async fn test_cached_path_skips_compute() {
    let (registry, _) = registry_with_cache();
    let service = CacheAsideService::new(registry);
    let calls = AtomicUsize::new(0);

    let compute = || async {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok::<_, String>(vec![1, 2, 3])
    };

    let first = service.get_or_compute("k", Duration::from_secs(60), compute).await;
    let second = service.get_or_compute("k", Duration::from_secs(60), compute).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(assert_ok!(first), assert_ok!(second));
}

#[tokio::test]
async fn test_absent_cache_always_computes() {
    let registry = Arc::new(StoreRegistry::from_handles([
        Arc::new(FakeStore::new(StoreKind::Primary)) as Arc<dyn StoreHandle>,
    ]));
    let service = CacheAsideService::new(registry);
    let calls = AtomicUsize::new(0);

    for _ in 0..3 {
        let value = service
            .get_or_compute("k", Duration::from_secs(60), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>("fresh".to_string())
            })
            .await;
        assert_eq!(assert_ok!(value), "fresh");
    }

    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_invalidate_forces_recompute() {
    let (registry, cache) = registry_with_cache();
    let service = CacheAsideService::new(registry);
    let calls = AtomicUsize::new(0);

    let compute = || async {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok::<_, String>(42u32)
    };

    assert_ok!(service.get_or_compute("user:1", Duration::from_secs(60), compute).await);
    service.invalidate("user:*").await;
    assert!(cache.entries.lock().unwrap().is_empty());
    assert_ok!(service.get_or_compute("user:1", Duration::from_secs(60), compute).await);

    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_compute_error_propagates() {
    let (registry, _) = registry_with_cache();
    let service = CacheAsideService::new(registry);

    let value = service
        .get_or_compute("k", Duration::from_secs(60), || async {
            Err::<u32, _>("upstream failed")
        })
        .await;

    assert_err!(value);
}

// =============================================================================
// Metrics Tests
// =============================================================================

#[tokio::test]
async fn test_no_samples_after_stop() {
    let (registry, _) = registry_with_cache();
    let sink = Arc::new(CountingSink::default());
    let tick = Duration::from_millis(25);
    let collector = MetricsCollector::new(registry, sink.clone(), tick);

    assert_ok!(collector.start().await);
    tokio::time::sleep(tick * 5).await;
    collector.stop().await;

    let published = sink.published.load(Ordering::SeqCst);
    assert!(published > 0);

    tokio::time::sleep(tick * 4).await;
    assert_eq!(sink.published.load(Ordering::SeqCst), published);
}

#[tokio::test]
async fn test_collector_lifecycle_misuse() {
    let (registry, _) = registry_with_cache();
    let collector =
        MetricsCollector::new(registry, Arc::new(CountingSink::default()), Duration::from_secs(1));

    collector.stop().await;
    assert!(matches!(collector.start().await, Err(AppError::InvalidState(_))));
}
