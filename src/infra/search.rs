//! Search index store: Elasticsearch over its REST API.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::config::SearchConfig;
use crate::infra::store::{
    ConnectionGauge, HealthDetails, PoolStats, StoreError, StoreHandle, StoreKind, StoreResult,
};

/// Subset of the `GET /` info document.
#[derive(Debug, Deserialize)]
struct ClusterInfo {
    #[serde(default)]
    cluster_name: Option<String>,
    #[serde(default)]
    version: Option<ClusterVersion>,
}

#[derive(Debug, Deserialize)]
struct ClusterVersion {
    number: String,
}

/// Elasticsearch handle backed by a pooled HTTP client.
///
/// reqwest keeps its pool private, so the client counts as one logical
/// connection and in-flight requests are tracked by a [`ConnectionGauge`].
pub struct SearchStore {
    client: reqwest::Client,
    base_url: String,
    gauge: ConnectionGauge,
    closed: AtomicBool,
}

impl SearchStore {
    /// Build the HTTP client without contacting the cluster.
    pub fn new(
        config: &SearchConfig,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> StoreResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()?;

        let gauge = ConnectionGauge::new();
        gauge.opened();

        Ok(Self {
            client,
            base_url: config.url(),
            gauge,
            closed: AtomicBool::new(false),
        })
    }

    /// Build the HTTP client and verify the cluster answers its info endpoint.
    pub async fn connect(
        config: &SearchConfig,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> StoreResult<Self> {
        let store = Self::new(config, connect_timeout, request_timeout)?;
        let (_, info) = store.cluster_info().await?;

        tracing::info!(
            url = %store.base_url,
            cluster = info.cluster_name.as_deref().unwrap_or("unknown"),
            "Elasticsearch connected"
        );
        Ok(store)
    }

    /// Base URL of the cluster.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Request builder for `path` relative to the cluster root.
    pub fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        self.client.request(method, url)
    }

    /// Send a request built with [`request`](Self::request), counted in the pool stats.
    pub async fn send(&self, request: reqwest::RequestBuilder) -> StoreResult<reqwest::Response> {
        if self.is_closed() {
            return Err(StoreError::Closed(StoreKind::SearchIndex));
        }
        let _lease = self.gauge.acquire();
        Ok(request.send().await?)
    }

    async fn cluster_info(&self) -> StoreResult<(u16, ClusterInfo)> {
        let response = self
            .send(self.request(reqwest::Method::GET, "/"))
            .await?;
        let status = response.status();

        if !status.is_success() {
            return Err(StoreError::SearchStatus(status.as_u16()));
        }

        let info = response.json::<ClusterInfo>().await?;
        Ok((status.as_u16(), info))
    }
}

#[async_trait]
impl StoreHandle for SearchStore {
    fn kind(&self) -> StoreKind {
        StoreKind::SearchIndex
    }

    async fn ping(&self) -> StoreResult<()> {
        self.describe_health().await.map(|_| ())
    }

    async fn describe_health(&self) -> StoreResult<HealthDetails> {
        if self.is_closed() {
            return Err(StoreError::Closed(StoreKind::SearchIndex));
        }

        let (status_code, info) = self.cluster_info().await?;

        let mut details = HealthDetails::new();
        details.insert("status_code".into(), json!(status_code));
        if let Some(name) = info.cluster_name {
            details.insert("cluster_name".into(), json!(name));
        }
        if let Some(version) = info.version {
            details.insert("version".into(), json!(version.number));
        }
        Ok(details)
    }

    async fn close(&self) -> StoreResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(StoreError::Closed(StoreKind::SearchIndex));
        }
        // Idle pooled connections are released when the client is dropped.
        self.gauge.closed();
        tracing::info!("Elasticsearch client closed");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn pool_stats(&self) -> Option<PoolStats> {
        (!self.is_closed()).then(|| self.gauge.snapshot(1))
    }

    fn as_search(&self) -> Option<&SearchStore> {
        (!self.is_closed()).then_some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn store() -> SearchStore {
        SearchStore::new(&Config::default().search, Duration::from_secs(1), Duration::from_secs(1))
            .unwrap()
    }

    #[test]
    fn test_request_joins_paths() {
        let request = store()
            .request(reqwest::Method::GET, "/_cluster/health")
            .build()
            .unwrap();

        assert_eq!(request.url().as_str(), "http://localhost:9200/_cluster/health");
    }

    #[tokio::test]
    async fn test_pool_stats_until_closed() {
        let store = store();

        let stats = store.pool_stats().unwrap();
        assert_eq!((stats.open_connections, stats.in_use, stats.idle), (1, 0, 1));

        store.close().await.unwrap();
        assert!(store.pool_stats().is_none());
        assert!(matches!(store.close().await, Err(StoreError::Closed(_))));
    }
}
