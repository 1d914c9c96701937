//! Application services layer.
//!
//! Services read from the [`StoreRegistry`](crate::infra::StoreRegistry)
//! and never own store handles themselves:
//! - health aggregation across every store kind
//! - background connection pool metrics
//! - cache-aside reads over the cache store
//! - usage analytics over the primary store

pub mod analytics;
pub mod cache_aside;
pub mod health;
pub mod metrics;

pub use analytics::{AnalyticsService, DatabaseStats, DatabaseUsage, SlowQuery, TableSize};
pub use cache_aside::CacheAsideService;
pub use health::{HealthAggregator, HealthReport, HealthState, HealthStatus, NOT_INITIALIZED};
pub use metrics::{sample_pools, CacheMetricsSink, MetricsCollector, MetricsSink, PoolSample};

#[cfg(any(test, feature = "test-utils"))]
pub use metrics::MockMetricsSink;
