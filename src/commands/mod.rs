//! Commands module - CLI command implementations.
//!
//! Each command is implemented in its own module for separation of concerns.

pub mod health;
pub mod monitor;
pub mod serve;

use crate::errors::{AppError, AppResult};
use crate::infra::StoreRegistry;

/// Resolve once Ctrl+C is received.
pub(crate) async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// Close every store, failing when any handle did not close cleanly.
pub(crate) async fn teardown(registry: &StoreRegistry) -> AppResult<()> {
    let errors = registry.close_all().await;
    if errors.is_empty() {
        return Ok(());
    }

    tracing::error!(failed = errors.len(), "Store teardown incomplete");
    Err(AppError::Teardown(errors))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::{StoreHandle, StoreKind};
    use crate::testing::StubStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_teardown_succeeds_when_every_store_closes() {
        let registry = StoreRegistry::from_handles([
            Arc::new(StubStore::up(StoreKind::Primary)) as Arc<dyn StoreHandle>,
            Arc::new(StubStore::up(StoreKind::Cache)),
        ]);

        assert!(teardown(&registry).await.is_ok());
    }

    #[tokio::test]
    async fn test_teardown_surfaces_close_failures() {
        let registry = StoreRegistry::from_handles([
            Arc::new(StubStore::up(StoreKind::Primary)) as Arc<dyn StoreHandle>,
            Arc::new(StubStore::up(StoreKind::Document).failing_close()),
        ]);

        match teardown(&registry).await {
            Err(AppError::Teardown(errors)) => assert_eq!(errors.len(), 1),
            other => panic!("expected teardown failure, got {:?}", other),
        }
    }
}
