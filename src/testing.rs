//! In-memory store doubles for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::infra::{
    CacheStore, PoolStats, StoreError, StoreHandle, StoreKind, StoreResult,
};
use crate::services::metrics::{MetricsSink, PoolSample};

/// Store handle whose probe outcome, latency and close behavior are scripted.
pub struct StubStore {
    kind: StoreKind,
    failure: Option<String>,
    delay: Option<Duration>,
    fail_close: bool,
    stats: Option<PoolStats>,
    probes: AtomicUsize,
    close_calls: AtomicUsize,
    closed: AtomicBool,
}

impl StubStore {
    pub fn up(kind: StoreKind) -> Self {
        Self {
            kind,
            failure: None,
            delay: None,
            fail_close: false,
            stats: None,
            probes: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn down(kind: StoreKind, error: impl Into<String>) -> Self {
        Self {
            failure: Some(error.into()),
            ..Self::up(kind)
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_stats(mut self, stats: PoolStats) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StoreHandle for StubStore {
    fn kind(&self) -> StoreKind {
        self.kind
    }

    async fn ping(&self) -> StoreResult<()> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.is_closed() {
            return Err(StoreError::Closed(self.kind));
        }
        match &self.failure {
            Some(message) => Err(StoreError::connect(self.kind, message.clone())),
            None => Ok(()),
        }
    }

    fn pool_stats(&self) -> Option<PoolStats> {
        assert!(!self.is_closed(), "pool stats read from a closed {} store", self.kind);
        self.stats
    }

    async fn close(&self) -> StoreResult<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
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

/// Process-local cache honoring TTLs and glob patterns.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
    ttls: Mutex<HashMap<String, Duration>>,
    offline: AtomicBool,
    closed: AtomicBool,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail as if the server went away.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Store a raw value directly, bypassing the offline switch.
    pub fn insert_raw(&self, key: &str, value: &str, ttl: Duration) {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// TTL most recently requested for `key`.
    pub fn ttl_of(&self, key: &str) -> Option<Duration> {
        self.ttls.lock().unwrap().get(key).copied()
    }

    fn check(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Closed(StoreKind::Cache));
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::connect(StoreKind::Cache, "connection refused"));
        }
        Ok(())
    }
}

#[async_trait]
impl StoreHandle for MemoryCache {
    fn kind(&self) -> StoreKind {
        StoreKind::Cache
    }

    async fn ping(&self) -> StoreResult<()> {
        self.check()
    }

    async fn close(&self) -> StoreResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn as_cache(&self) -> Option<&dyn CacheStore> {
        Some(self)
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get_raw(&self, key: &str) -> StoreResult<Option<String>> {
        self.check()?;
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some((_, expires_at)) if *expires_at <= Instant::now() => {
                entries.remove(key);
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }

    async fn set_raw(&self, key: &str, value: String, ttl: Duration) -> StoreResult<()> {
        self.check()?;
        self.ttls.lock().unwrap().insert(key.to_string(), ttl);
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }

    async fn delete_matching(&self, pattern: &str) -> StoreResult<u64> {
        self.check()?;
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|key, _| !glob_match(pattern, key));
        Ok((before - entries.len()) as u64)
    }
}

/// Records every published sample.
#[derive(Default)]
pub struct RecordingSink {
    samples: Mutex<Vec<PoolSample>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.samples.lock().unwrap().len()
    }

    pub fn samples(&self) -> Vec<PoolSample> {
        self.samples.lock().unwrap().clone()
    }
}

#[async_trait]
impl MetricsSink for RecordingSink {
    async fn publish(&self, sample: &PoolSample) -> StoreResult<()> {
        self.samples.lock().unwrap().push(sample.clone());
        Ok(())
    }
}

/// Redis-style glob matching supporting `*` and `?`.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some(&'*') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some(&c) if c == '?' || c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match backtrack {
                Some((star_p, star_t)) => {
                    p = star_p + 1;
                    t = star_t + 1;
                    backtrack = Some((star_p, star_t + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}

#[cfg(test)]
mod tests {
    use super::glob_match;

    #[test]
    fn test_glob_match() {
        assert!(glob_match("user:*", "user:42"));
        assert!(glob_match("user:?", "user:4"));
        assert!(!glob_match("user:?", "user:42"));
        assert!(glob_match("*:list", "users:list"));
        assert!(!glob_match("session:*", "user:42"));
        assert!(glob_match("*", ""));
    }
}
