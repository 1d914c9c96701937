//! Connection pool metrics.
//!
//! [`MetricsCollector`] runs a background task that samples pool statistics
//! from every registered store on a fixed interval and publishes each
//! sample to a [`MetricsSink`]. The production sink is the cache store,
//! used as a time-series log with a fixed retention window.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::{Config, CACHE_PREFIX_METRICS};
use crate::errors::{AppError, AppResult};
use crate::infra::{PoolStats, StoreKind, StoreRegistry, StoreResult};

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// Pool statistics of one store at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSample {
    pub kind: StoreKind,
    pub open_connections: u32,
    pub in_use: u32,
    pub idle: u32,
    pub max_connections: u32,
    pub wait_count: Option<u64>,
    pub wait_duration_ms: Option<u64>,
    pub sampled_at: DateTime<Utc>,
}

impl PoolSample {
    pub fn new(kind: StoreKind, stats: PoolStats, sampled_at: DateTime<Utc>) -> Self {
        Self {
            kind,
            open_connections: stats.open_connections,
            in_use: stats.in_use,
            idle: stats.idle,
            max_connections: stats.max_connections,
            wait_count: stats.wait_count,
            wait_duration_ms: stats.wait_duration.map(|d| d.as_millis() as u64),
            sampled_at,
        }
    }

    /// Cache key embedding the sample timestamp.
    pub fn cache_key(&self) -> String {
        format!(
            "{}{}:{}",
            CACHE_PREFIX_METRICS,
            self.kind,
            self.sampled_at.timestamp_millis()
        )
    }
}

/// Destination for pool samples.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn publish(&self, sample: &PoolSample) -> StoreResult<()>;
}

/// Writes samples into the registry's cache store with a retention TTL.
pub struct CacheMetricsSink {
    registry: Arc<StoreRegistry>,
    retention: Duration,
}

impl CacheMetricsSink {
    pub fn new(registry: Arc<StoreRegistry>, retention: Duration) -> Self {
        Self {
            registry,
            retention,
        }
    }
}

#[async_trait]
impl MetricsSink for CacheMetricsSink {
    async fn publish(&self, sample: &PoolSample) -> StoreResult<()> {
        let Some(cache) = self.registry.cache() else {
            tracing::debug!(store = %sample.kind, "No cache store, dropping pool sample");
            return Ok(());
        };

        let payload = serde_json::to_string(sample)?;
        cache
            .set_raw(&sample.cache_key(), payload, self.retention)
            .await
    }
}

/// Sample every registered store that exposes pool statistics.
///
/// All samples of one call share a timestamp.
pub fn sample_pools(registry: &StoreRegistry) -> Vec<PoolSample> {
    let sampled_at = Utc::now();
    registry
        .handles()
        .filter_map(|handle| {
            let stats = handle.pool_stats();
            if stats.is_none() {
                tracing::trace!(store = %handle.kind(), "Store exposes no pool statistics");
            }
            stats.map(|stats| PoolSample::new(handle.kind(), stats, sampled_at))
        })
        .collect()
}

enum CollectorState {
    Idle,
    Running {
        stop: watch::Sender<bool>,
        task: JoinHandle<()>,
    },
    Stopped,
}

/// Background pool sampler.
///
/// Lifecycle: idle → [`start`](Self::start) → running →
/// [`stop`](Self::stop) → stopped. A stopped collector cannot be restarted.
pub struct MetricsCollector {
    registry: Arc<StoreRegistry>,
    sink: Arc<dyn MetricsSink>,
    interval: Duration,
    state: Mutex<CollectorState>,
}

impl MetricsCollector {
    pub fn new(registry: Arc<StoreRegistry>, sink: Arc<dyn MetricsSink>, interval: Duration) -> Self {
        Self {
            registry,
            sink,
            interval,
            state: Mutex::new(CollectorState::Idle),
        }
    }

    /// Collector publishing into the registry's cache store.
    pub fn from_config(registry: Arc<StoreRegistry>, config: &Config) -> Self {
        let sink = Arc::new(CacheMetricsSink::new(
            registry.clone(),
            config.metrics_retention,
        ));
        Self::new(registry, sink, config.metrics_interval)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub async fn is_running(&self) -> bool {
        matches!(*self.state.lock().await, CollectorState::Running { .. })
    }

    /// Spawn the sampling task. The first sample is taken one interval later.
    pub async fn start(&self) -> AppResult<()> {
        let mut state = self.state.lock().await;
        match *state {
            CollectorState::Idle => {}
            CollectorState::Running { .. } => {
                return Err(AppError::invalid_state("metrics collector is already running"));
            }
            CollectorState::Stopped => {
                return Err(AppError::invalid_state("metrics collector has been stopped"));
            }
        }

        if self.interval.is_zero() {
            return Err(AppError::bad_request("metrics interval must be positive"));
        }

        let (stop, stop_rx) = watch::channel(false);
        let task = tokio::spawn(run(
            self.registry.clone(),
            self.sink.clone(),
            self.interval,
            stop_rx,
        ));

        *state = CollectorState::Running { stop, task };
        tracing::info!(interval = ?self.interval, "Metrics collector started");
        Ok(())
    }

    /// Halt sampling and wait for the task to exit.
    ///
    /// Once this returns no further samples are published. Stopping an idle
    /// or already stopped collector is a no-op apart from making it terminal.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;

        if let CollectorState::Running { stop, task } =
            std::mem::replace(&mut *state, CollectorState::Stopped)
        {
            let _ = stop.send(true);
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Metrics collector task failed");
            }
            tracing::info!("Metrics collector stopped");
        }
    }
}

impl Drop for MetricsCollector {
    fn drop(&mut self) {
        if let CollectorState::Running { task, .. } = self.state.get_mut() {
            task.abort();
        }
    }
}

async fn run(
    registry: Arc<StoreRegistry>,
    sink: Arc<dyn MetricsSink>,
    period: Duration,
    mut stop: watch::Receiver<bool>,
) {
    let mut shutdown = registry.shutdown_signal();
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = stop.changed() => break,
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                // Teardown waits for this lease, so handles stay open while sampling
                let Some(_lease) = registry.lease().await else {
                    break;
                };
                publish_tick(&registry, sink.as_ref()).await;
            }
        }
    }

    tracing::debug!("Metrics collector loop exited");
}

async fn publish_tick(registry: &StoreRegistry, sink: &dyn MetricsSink) {
    for sample in sample_pools(registry) {
        tracing::info!(
            store = %sample.kind,
            open = sample.open_connections,
            in_use = sample.in_use,
            idle = sample.idle,
            "Pool stats"
        );

        if let Err(e) = sink.publish(&sample).await {
            tracing::warn!(store = %sample.kind, error = %e, "Failed to publish pool sample");
        }
    }
}
