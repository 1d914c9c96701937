//! Uniform capability surface over the native store clients.
//!
//! Every backend (PostgreSQL, Redis, Elasticsearch, MongoDB) is adapted
//! into a [`StoreHandle`] so the registry, the health aggregator and the
//! metrics collector can treat them alike.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::search::SearchStore;

/// Store-specific details attached to a health status.
pub type HealthDetails = serde_json::Map<String, serde_json::Value>;

/// Identifies which external backend a handle, sample or status refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    /// Relational store (PostgreSQL). The only mandatory kind.
    Primary,
    /// Key-value cache (Redis).
    Cache,
    /// Full-text search index (Elasticsearch).
    SearchIndex,
    /// Document store (MongoDB).
    Document,
}

impl StoreKind {
    /// All kinds in declaration order.
    pub const ALL: [StoreKind; 4] = [
        StoreKind::Primary,
        StoreKind::Cache,
        StoreKind::SearchIndex,
        StoreKind::Document,
    ];

    /// Stable machine name, matching the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKind::Primary => "primary",
            StoreKind::Cache => "cache",
            StoreKind::SearchIndex => "search_index",
            StoreKind::Document => "document",
        }
    }

    /// Human-readable backend name used in log lines and health messages.
    pub fn label(&self) -> &'static str {
        match self {
            StoreKind::Primary => "PostgreSQL",
            StoreKind::Cache => "Redis",
            StoreKind::SearchIndex => "Elasticsearch",
            StoreKind::Document => "MongoDB",
        }
    }

    /// Whether a connection failure for this kind aborts startup.
    pub fn is_mandatory(&self) -> bool {
        matches!(self, StoreKind::Primary)
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "primary" | "postgres" | "postgresql" => Ok(StoreKind::Primary),
            "cache" | "redis" => Ok(StoreKind::Cache),
            "search_index" | "search" | "elasticsearch" => Ok(StoreKind::SearchIndex),
            "document" | "mongo" | "mongodb" => Ok(StoreKind::Document),
            other => Err(StoreError::UnknownKind(other.to_string())),
        }
    }
}

/// Errors raised by a single store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to connect to {kind}: {message}")]
    Connect { kind: StoreKind, message: String },

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0} store is closed")]
    Closed(StoreKind),

    #[error("{0} store is not available")]
    Unavailable(StoreKind),

    #[error("unknown store kind: {0}")]
    UnknownKind(String),

    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("search request failed: {0}")]
    Search(#[from] reqwest::Error),

    #[error("search index returned status {0}")]
    SearchStatus(u16),

    #[error("document store error: {0}")]
    Document(#[from] mongodb::error::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn connect(kind: StoreKind, message: impl Into<String>) -> Self {
        StoreError::Connect {
            kind,
            message: message.into(),
        }
    }
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Connection pool statistics reported by a native client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    pub open_connections: u32,
    pub in_use: u32,
    pub idle: u32,
    pub max_connections: u32,
    /// Total number of connections waited for, when the driver tracks it.
    pub wait_count: Option<u64>,
    /// Total time spent waiting for a connection, when the driver tracks it.
    pub wait_duration: Option<Duration>,
}

/// One live connection to an external store.
///
/// Handles are created by the registry during initialization and closed
/// exactly once by [`StoreRegistry::close_all`](super::StoreRegistry::close_all).
/// Once closed, every operation fails with [`StoreError::Closed`].
#[async_trait]
pub trait StoreHandle: Send + Sync {
    /// Which backend this handle talks to.
    fn kind(&self) -> StoreKind;

    /// Native liveness round trip.
    async fn ping(&self) -> StoreResult<()>;

    /// Liveness probe returning store-specific details on success.
    async fn describe_health(&self) -> StoreResult<HealthDetails> {
        self.ping().await?;
        Ok(HealthDetails::new())
    }

    /// Pool statistics, for drivers that expose them.
    fn pool_stats(&self) -> Option<PoolStats> {
        None
    }

    /// Release the underlying connections.
    async fn close(&self) -> StoreResult<()>;

    /// Whether `close` has already run.
    fn is_closed(&self) -> bool;

    /// Cache capability of this handle, if any.
    fn as_cache(&self) -> Option<&dyn CacheStore> {
        None
    }

    /// SQL connection, for the relational primary store.
    fn as_primary(&self) -> Option<&DatabaseConnection> {
        None
    }

    /// REST client, for the search index.
    fn as_search(&self) -> Option<&SearchStore> {
        None
    }

    /// Driver client, for the document store.
    fn as_document(&self) -> Option<&mongodb::Client> {
        None
    }
}

/// Connection counters for drivers that do not expose a pool view.
///
/// Adapters report opens and closes, and bracket each round trip with
/// [`acquire`](Self::acquire).
#[derive(Debug, Default)]
pub struct ConnectionGauge {
    open: AtomicU32,
    in_use: AtomicU32,
}

impl ConnectionGauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn opened(&self) {
        self.open.fetch_add(1, Ordering::Relaxed);
    }

    pub fn closed(&self) {
        decrement(&self.open);
    }

    pub fn checked_out(&self) {
        self.in_use.fetch_add(1, Ordering::Relaxed);
    }

    pub fn checked_in(&self) {
        decrement(&self.in_use);
    }

    /// Mark one round trip in flight until the lease drops.
    pub fn acquire(&self) -> GaugeLease<'_> {
        self.checked_out();
        GaugeLease(self)
    }

    /// Current counters. In-use is capped at open, since multiplexed
    /// clients run many round trips over one connection.
    pub fn snapshot(&self, max_connections: u32) -> PoolStats {
        let open = self.open.load(Ordering::Relaxed);
        let in_use = self.in_use.load(Ordering::Relaxed).min(open);

        PoolStats {
            open_connections: open,
            in_use,
            idle: open - in_use,
            max_connections,
            wait_count: None,
            wait_duration: None,
        }
    }
}

/// Checks a round trip back into its [`ConnectionGauge`] on drop.
pub struct GaugeLease<'a>(&'a ConnectionGauge);

impl Drop for GaugeLease<'_> {
    fn drop(&mut self) {
        self.0.checked_in();
    }
}

fn decrement(counter: &AtomicU32) {
    let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
}

/// Key-value operations needed by cache-aside and the metrics sink.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Raw serialized value stored under `key`.
    async fn get_raw(&self, key: &str) -> StoreResult<Option<String>>;

    /// Store `value` under `key`, expiring after `ttl`.
    async fn set_raw(&self, key: &str, value: String, ttl: Duration) -> StoreResult<()>;

    /// Delete every key matching a glob `pattern`, returning how many matched.
    async fn delete_matching(&self, pattern: &str) -> StoreResult<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_round_trip() {
        for kind in StoreKind::ALL {
            assert_eq!(kind.as_str().parse::<StoreKind>().unwrap(), kind);
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn test_kind_aliases() {
        assert_eq!("postgres".parse::<StoreKind>().unwrap(), StoreKind::Primary);
        assert_eq!("Redis".parse::<StoreKind>().unwrap(), StoreKind::Cache);
        assert_eq!("elasticsearch".parse::<StoreKind>().unwrap(), StoreKind::SearchIndex);
        assert_eq!("mongodb".parse::<StoreKind>().unwrap(), StoreKind::Document);
        assert!(matches!(
            "cassandra".parse::<StoreKind>(),
            Err(StoreError::UnknownKind(_))
        ));
    }

    #[test]
    fn test_gauge_tracks_round_trips() {
        let gauge = ConnectionGauge::new();
        gauge.opened();
        gauge.opened();

        let lease = gauge.acquire();
        let stats = gauge.snapshot(10);
        assert_eq!((stats.open_connections, stats.in_use, stats.idle), (2, 1, 1));
        assert_eq!(stats.max_connections, 10);

        drop(lease);
        let stats = gauge.snapshot(10);
        assert_eq!((stats.in_use, stats.idle), (0, 2));
        assert_eq!(stats.wait_count, None);
    }

    #[test]
    fn test_gauge_caps_multiplexed_in_use_and_never_underflows() {
        let gauge = ConnectionGauge::new();
        gauge.opened();
        let _a = gauge.acquire();
        let _b = gauge.acquire();

        let stats = gauge.snapshot(1);
        assert_eq!((stats.open_connections, stats.in_use, stats.idle), (1, 1, 0));

        gauge.closed();
        gauge.closed();
        assert_eq!(gauge.snapshot(1).open_connections, 0);
    }

    #[test]
    fn test_only_primary_is_mandatory() {
        let mandatory: Vec<_> = StoreKind::ALL.iter().filter(|k| k.is_mandatory()).collect();
        assert_eq!(mandatory, vec![&StoreKind::Primary]);
    }
}
