//! Redis cache store.
//!
//! Wraps a multiplexed [`ConnectionManager`] and exposes it both as a
//! [`StoreHandle`] and as the [`CacheStore`] used by cache-aside and the
//! metrics sink.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client, RedisError};
use serde_json::json;

use crate::config::CacheConfig;
use crate::infra::store::{
    CacheStore, ConnectionGauge, HealthDetails, PoolStats, StoreError, StoreHandle, StoreKind,
    StoreResult,
};

/// Redis cache wrapper over one multiplexed connection.
pub struct RedisCache {
    connection: Mutex<Option<ConnectionManager>>,
    gauge: ConnectionGauge,
}

impl RedisCache {
    /// Connect to Redis and verify the connection with `PING`.
    pub async fn connect(config: &CacheConfig, connect_timeout: Duration) -> StoreResult<Self> {
        let client = Client::open(config.url())?;
        let mut connection = tokio::time::timeout(connect_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| StoreError::Timeout(connect_timeout))??;

        let _: String = redis::cmd("PING").query_async(&mut connection).await?;

        tracing::info!(host = %config.host, port = config.port, db = config.db, "Redis cache connected");

        let gauge = ConnectionGauge::new();
        gauge.opened();

        Ok(Self {
            connection: Mutex::new(Some(connection)),
            gauge,
        })
    }

    /// Get the connection manager for direct Redis operations.
    pub fn connection(&self) -> StoreResult<ConnectionManager> {
        self.connection
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
            .ok_or(StoreError::Closed(StoreKind::Cache))
    }

    /// Delete all keys matching a pattern.
    /// Uses UNLINK for non-blocking deletion, falling back to DEL.
    pub async fn delete_pattern(&self, pattern: &str) -> StoreResult<u64> {
        let mut conn = self.connection()?;
        let _lease = self.gauge.acquire();
        let keys: Vec<String> = conn.keys(pattern).await.map_err(cache_error)?;

        if keys.is_empty() {
            return Ok(0);
        }

        let count = keys.len() as u64;

        // UNLINK needs Redis 4.0+
        let unlinked: Result<i64, RedisError> =
            redis::cmd("UNLINK").arg(&keys).query_async(&mut conn).await;

        if let Err(e) = unlinked {
            tracing::debug!(error = %e, "UNLINK unavailable, falling back to DEL");
            let _: i64 = conn.del(&keys).await.map_err(cache_error)?;
        }

        Ok(count)
    }
}

#[async_trait]
impl StoreHandle for RedisCache {
    fn kind(&self) -> StoreKind {
        StoreKind::Cache
    }

    async fn ping(&self) -> StoreResult<()> {
        self.describe_health().await.map(|_| ())
    }

    async fn describe_health(&self) -> StoreResult<HealthDetails> {
        let mut conn = self.connection()?;
        let _lease = self.gauge.acquire();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(cache_error)?;

        let mut details = HealthDetails::new();
        details.insert("pong".into(), json!(pong));
        Ok(details)
    }

    async fn close(&self) -> StoreResult<()> {
        let taken = self
            .connection
            .lock()
            .map(|mut guard| guard.take())
            .unwrap_or(None);

        match taken {
            // Dropping the last manager clone closes the multiplexed connection.
            Some(_) => {
                self.gauge.closed();
                tracing::info!("Redis connection closed");
                Ok(())
            }
            None => Err(StoreError::Closed(StoreKind::Cache)),
        }
    }

    fn is_closed(&self) -> bool {
        self.connection
            .lock()
            .map(|guard| guard.is_none())
            .unwrap_or(true)
    }

    fn pool_stats(&self) -> Option<PoolStats> {
        (!self.is_closed()).then(|| self.gauge.snapshot(1))
    }

    fn as_cache(&self) -> Option<&dyn CacheStore> {
        Some(self)
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get_raw(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.connection()?;
        let _lease = self.gauge.acquire();
        let value: Option<String> = conn.get(key).await.map_err(cache_error)?;
        Ok(value)
    }

    async fn set_raw(&self, key: &str, value: String, ttl: Duration) -> StoreResult<()> {
        let mut conn = self.connection()?;
        let _lease = self.gauge.acquire();
        // SET EX rejects a zero expiry
        let ttl_seconds = ttl.as_secs().max(1);

        conn.set_ex::<_, _, ()>(key, value, ttl_seconds)
            .await
            .map_err(cache_error)?;

        Ok(())
    }

    async fn delete_matching(&self, pattern: &str) -> StoreResult<u64> {
        self.delete_pattern(pattern).await
    }
}

/// Convert Redis error to StoreError.
fn cache_error(e: RedisError) -> StoreError {
    tracing::error!("Redis error: {}", e);
    StoreError::Redis(e)
}
