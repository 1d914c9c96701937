//! Monitor command - Runs only the metrics collector.

use std::sync::Arc;
use std::time::Duration;

use crate::cli::args::MonitorArgs;
use crate::config::Config;
use crate::errors::{AppError, AppResult};
use crate::infra::StoreRegistry;
use crate::services::{CacheMetricsSink, MetricsCollector};

use super::{shutdown_signal, teardown};

/// Execute the monitor command
pub async fn execute(args: MonitorArgs, config: Config) -> AppResult<()> {
    let interval = match args.interval {
        Some(0) => return Err(AppError::bad_request("interval must be at least one second")),
        Some(secs) => Duration::from_secs(secs),
        None => config.metrics_interval,
    };

    let registry = Arc::new(StoreRegistry::connect(&config).await?);
    if registry.cache().is_none() {
        tracing::warn!("No cache store available, pool samples will only be logged");
    }

    let sink = Arc::new(CacheMetricsSink::new(registry.clone(), config.metrics_retention));
    let collector = MetricsCollector::new(registry.clone(), sink, interval);
    collector.start().await?;

    shutdown_signal().await;

    collector.stop().await;
    teardown(&registry).await
}
