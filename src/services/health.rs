//! Health aggregation across every store kind.
//!
//! Each store answers its native liveness probe in its own shape; the
//! aggregator folds them into one [`HealthStatus`] per [`StoreKind`]. Every
//! probe is bounded by a timeout and every path yields a status, so a
//! report is always produced.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::DEFAULT_PROBE_TIMEOUT_SECONDS;
use crate::infra::{HealthDetails, StoreHandle, StoreKind, StoreRegistry};

/// Message reported for kinds absent from the registry.
pub const NOT_INITIALIZED: &str = "not initialized";

/// Up or down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Up,
    Down,
}

/// Outcome of one health query against one store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub kind: StoreKind,
    #[serde(rename = "status")]
    pub state: HealthState,
    pub message: String,
    pub details: HealthDetails,
    pub checked_at: DateTime<Utc>,
}

impl HealthStatus {
    pub fn up(kind: StoreKind, details: HealthDetails) -> Self {
        Self {
            kind,
            state: HealthState::Up,
            message: format!("{} is healthy", kind.label()),
            details,
            checked_at: Utc::now(),
        }
    }

    pub fn down(kind: StoreKind, message: impl Into<String>, details: HealthDetails) -> Self {
        Self {
            kind,
            state: HealthState::Down,
            message: message.into(),
            details,
            checked_at: Utc::now(),
        }
    }

    /// Status for a kind that never made it into the registry.
    pub fn not_initialized(kind: StoreKind) -> Self {
        Self::down(kind, NOT_INITIALIZED, HealthDetails::new())
    }

    pub fn is_up(&self) -> bool {
        self.state == HealthState::Up
    }
}

/// One status per store kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HealthReport(BTreeMap<StoreKind, HealthStatus>);

impl HealthReport {
    /// Whether every store is up.
    pub fn is_healthy(&self) -> bool {
        self.0.values().all(HealthStatus::is_up)
    }

    /// Whether the mandatory primary store is up.
    pub fn primary_up(&self) -> bool {
        self.state_of(StoreKind::Primary) == Some(HealthState::Up)
    }

    pub fn get(&self, kind: StoreKind) -> Option<&HealthStatus> {
        self.0.get(&kind)
    }

    pub fn state_of(&self, kind: StoreKind) -> Option<HealthState> {
        self.get(kind).map(|status| status.state)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StoreKind, &HealthStatus)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Probes registered stores and assembles health reports.
#[derive(Debug, Clone)]
pub struct HealthAggregator {
    probe_timeout: Duration,
}

impl Default for HealthAggregator {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECONDS))
    }
}

impl HealthAggregator {
    pub fn new(probe_timeout: Duration) -> Self {
        Self { probe_timeout }
    }

    pub fn probe_timeout(&self) -> Duration {
        self.probe_timeout
    }

    /// Probe every store kind concurrently.
    ///
    /// Absent kinds are reported down without any I/O. No retries.
    pub async fn check_all(&self, registry: &StoreRegistry) -> HealthReport {
        let statuses =
            futures::future::join_all(StoreKind::ALL.into_iter().map(|kind| self.check(registry, kind)))
                .await;

        HealthReport(statuses.into_iter().map(|status| (status.kind, status)).collect())
    }

    /// Probe a single store kind.
    pub async fn check(&self, registry: &StoreRegistry, kind: StoreKind) -> HealthStatus {
        match registry.get(kind) {
            Some(handle) => self.probe(kind, handle).await,
            None => HealthStatus::not_initialized(kind),
        }
    }

    async fn probe(&self, kind: StoreKind, handle: &Arc<dyn StoreHandle>) -> HealthStatus {
        match tokio::time::timeout(self.probe_timeout, handle.describe_health()).await {
            Ok(Ok(details)) => HealthStatus::up(kind, details),
            Ok(Err(e)) => {
                tracing::warn!(store = %kind, error = %e, "Health probe failed");
                let mut details = HealthDetails::new();
                details.insert("error".into(), json!(e.to_string()));
                HealthStatus::down(kind, format!("{} health probe failed", kind.label()), details)
            }
            Err(_) => {
                tracing::warn!(store = %kind, timeout = ?self.probe_timeout, "Health probe timed out");
                let mut details = HealthDetails::new();
                details.insert(
                    "error".into(),
                    json!(format!("no response within {:?}", self.probe_timeout)),
                );
                details.insert(
                    "timeout_ms".into(),
                    json!(self.probe_timeout.as_millis() as u64),
                );
                HealthStatus::down(kind, format!("{} health probe timed out", kind.label()), details)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubStore;
    use std::time::Instant;

    fn registry_of(stores: Vec<StubStore>) -> StoreRegistry {
        StoreRegistry::from_handles(
            stores
                .into_iter()
                .map(|s| Arc::new(s) as Arc<dyn StoreHandle>),
        )
    }

    #[tokio::test]
    async fn test_absent_kinds_are_not_initialized() {
        let registry = registry_of(vec![StubStore::up(StoreKind::Primary)]);

        let report = HealthAggregator::default().check_all(&registry).await;

        assert_eq!(report.len(), 4);
        assert!(report.primary_up());
        for kind in [StoreKind::Cache, StoreKind::SearchIndex, StoreKind::Document] {
            let status = report.get(kind).unwrap();
            assert_eq!(status.state, HealthState::Down);
            assert_eq!(status.message, NOT_INITIALIZED);
        }
        assert!(!report.is_healthy());
    }

    #[tokio::test]
    async fn test_failed_probe_captures_error() {
        let registry = registry_of(vec![StubStore::down(StoreKind::Primary, "connection reset")]);

        let status = HealthAggregator::default()
            .check(&registry, StoreKind::Primary)
            .await;

        assert_eq!(status.state, HealthState::Down);
        assert_eq!(status.message, "PostgreSQL health probe failed");
        assert!(status.details["error"]
            .as_str()
            .unwrap()
            .contains("connection reset"));
    }

    #[tokio::test]
    async fn test_slow_probe_times_out() {
        let registry = registry_of(vec![
            StubStore::up(StoreKind::Primary),
            StubStore::up(StoreKind::Cache).with_delay(Duration::from_secs(10)),
        ]);
        let aggregator = HealthAggregator::new(Duration::from_millis(50));

        let started = Instant::now();
        let report = aggregator.check_all(&registry).await;

        assert!(started.elapsed() < Duration::from_secs(2));
        let cache = report.get(StoreKind::Cache).unwrap();
        assert_eq!(cache.state, HealthState::Down);
        assert_eq!(cache.message, "Redis health probe timed out");
        assert_eq!(cache.details["timeout_ms"], json!(50));
        assert!(report.primary_up());
    }

    #[tokio::test]
    async fn test_report_serializes_one_entry_per_kind() {
        let registry = registry_of(vec![StubStore::up(StoreKind::Primary)]);

        let report = HealthAggregator::default().check_all(&registry).await;
        let value = serde_json::to_value(&report).unwrap();

        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 4);
        assert_eq!(object["primary"]["status"], "up");
        assert_eq!(object["primary"]["message"], "PostgreSQL is healthy");
        assert_eq!(object["search_index"]["status"], "down");
        assert_eq!(object["search_index"]["message"], "not initialized");
    }
}
