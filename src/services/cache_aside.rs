//! Cache-aside reads over the registry's cache store.
//!
//! The cache is an optimization only: an absent, failing or corrupt cache
//! degrades to calling the compute function.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};

use crate::infra::StoreRegistry;

#[derive(Debug, Clone)]
pub struct CacheAsideService {
    registry: Arc<StoreRegistry>,
}

impl CacheAsideService {
    pub fn new(registry: Arc<StoreRegistry>) -> Self {
        Self { registry }
    }

    /// Return the cached value for `key`, or compute, store and return it.
    ///
    /// Compute errors are returned unchanged and nothing is cached for them.
    pub async fn get_or_compute<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        compute: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let Some(cache) = self.registry.cache() else {
            return compute().await;
        };

        match cache.get_raw(key).await {
            Ok(Some(raw)) => match serde_json::from_str::<T>(&raw) {
                Ok(value) => {
                    tracing::debug!(key, "Cache hit");
                    return Ok(value);
                }
                Err(e) => tracing::warn!(key, error = %e, "Discarding undecodable cache entry"),
            },
            Ok(None) => tracing::debug!(key, "Cache miss"),
            Err(e) => tracing::warn!(key, error = %e, "Cache read failed, computing value"),
        }

        let value = compute().await?;

        match serde_json::to_string(&value) {
            Ok(payload) => {
                if let Err(e) = cache.set_raw(key, payload, ttl).await {
                    tracing::warn!(key, error = %e, "Failed to cache computed value");
                }
            }
            Err(e) => tracing::warn!(key, error = %e, "Computed value is not serializable"),
        }

        Ok(value)
    }

    /// Delete every cached key matching a glob `pattern`.
    ///
    /// Best-effort: failures are logged and swallowed.
    pub async fn invalidate(&self, pattern: &str) {
        let Some(cache) = self.registry.cache() else {
            return;
        };

        match cache.delete_matching(pattern).await {
            Ok(deleted) => tracing::debug!(pattern, deleted, "Cache invalidated"),
            Err(e) => tracing::warn!(pattern, error = %e, "Cache invalidation failed"),
        }
    }
}
