//! Serve command - Starts the HTTP server and the metrics collector.

use std::sync::Arc;

use crate::api::{create_router, AppState};
use crate::cli::args::ServeArgs;
use crate::config::Config;
use crate::errors::{AppError, AppResult};
use crate::infra::StoreRegistry;
use crate::services::{HealthAggregator, MetricsCollector};

use super::{shutdown_signal, teardown};

/// Execute the serve command
pub async fn execute(args: ServeArgs, config: Config) -> AppResult<()> {
    tracing::info!("Starting server...");

    // Fails only when the primary store is unreachable
    let registry = Arc::new(StoreRegistry::connect(&config).await?);

    let collector = MetricsCollector::from_config(registry.clone(), &config);
    if args.no_metrics {
        tracing::info!("Metrics collection disabled");
    } else {
        collector.start().await?;
    }

    let app_state = AppState::new(registry.clone(), HealthAggregator::new(config.probe_timeout));
    let app = create_router(app_state);

    let host = args.host.unwrap_or_else(|| config.server_host.clone());
    let port = args.port.unwrap_or(config.server_port);
    let addr = format!("{}:{}", host, port);

    let served = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => {
            tracing::info!("Server running on http://{}", addr);
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await
                .map_err(|e| AppError::internal(format!("Server error: {}", e)))
        }
        Err(e) => Err(AppError::internal(format!("Failed to bind to {}: {}", addr, e))),
    };

    // Collector first so no sample races the teardown
    collector.stop().await;
    let closed = teardown(&registry).await;

    // A server failure outranks a teardown failure
    served.and(closed)
}
