//! Primary store: PostgreSQL through sea-orm.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database as SeaDatabase, DatabaseConnection, DbErr, Statement,
};
use serde_json::json;

use crate::config::PrimaryConfig;
use crate::infra::store::{HealthDetails, PoolStats, StoreError, StoreHandle, StoreKind, StoreResult};

/// Relational store handle wrapping the sea-orm connection pool.
pub struct PrimaryStore {
    connection: DatabaseConnection,
    close_timeout: Duration,
    closed: AtomicBool,
}

impl PrimaryStore {
    /// Open the pool and verify it with a round trip.
    pub async fn connect(
        config: &PrimaryConfig,
        connect_timeout: Duration,
        close_timeout: Duration,
    ) -> StoreResult<Self> {
        let mut options = ConnectOptions::new(config.url());
        options
            .max_connections(config.max_open_conns)
            .idle_timeout(config.conn_max_idle_time)
            .max_lifetime(config.conn_max_lifetime)
            .connect_timeout(connect_timeout)
            .acquire_timeout(connect_timeout)
            .sqlx_logging(false);

        let connection = SeaDatabase::connect(options).await?;
        let store = Self::from_connection(connection, close_timeout);
        store.select_one().await?;

        tracing::info!(
            host = %config.host,
            database = %config.database,
            max_connections = config.max_open_conns,
            "PostgreSQL connected"
        );
        Ok(store)
    }

    /// Wrap an already opened connection without a round trip.
    pub fn from_connection(connection: DatabaseConnection, close_timeout: Duration) -> Self {
        Self {
            connection,
            close_timeout,
            closed: AtomicBool::new(false),
        }
    }

    /// Get a reference to the database connection.
    pub fn connection(&self) -> &DatabaseConnection {
        &self.connection
    }

    fn is_postgres_pool(&self) -> bool {
        matches!(self.connection, DatabaseConnection::SqlxPostgresPoolConnection(_))
    }

    /// Check database connectivity by executing a simple query.
    async fn select_one(&self) -> Result<(), DbErr> {
        self.connection
            .execute(Statement::from_string(
                self.connection.get_database_backend(),
                "SELECT 1".to_string(),
            ))
            .await?;
        Ok(())
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.is_closed() {
            return Err(StoreError::Closed(StoreKind::Primary));
        }
        Ok(())
    }
}

#[async_trait]
impl StoreHandle for PrimaryStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Primary
    }

    async fn ping(&self) -> StoreResult<()> {
        self.ensure_open()?;
        self.select_one().await?;
        Ok(())
    }

    async fn describe_health(&self) -> StoreResult<HealthDetails> {
        self.ping().await?;

        let mut details = HealthDetails::new();
        if let Some(stats) = self.pool_stats() {
            details.insert("open_connections".into(), json!(stats.open_connections));
            details.insert("in_use".into(), json!(stats.in_use));
            details.insert("idle".into(), json!(stats.idle));
            details.insert("max_connections".into(), json!(stats.max_connections));
        }
        Ok(details)
    }

    fn pool_stats(&self) -> Option<PoolStats> {
        if self.is_closed() || !self.is_postgres_pool() {
            return None;
        }

        let pool = self.connection.get_postgres_connection_pool();
        let open = pool.size();
        let idle = u32::try_from(pool.num_idle()).unwrap_or(u32::MAX).min(open);

        Some(PoolStats {
            open_connections: open,
            in_use: open - idle,
            idle,
            max_connections: pool.options().get_max_connections(),
            wait_count: None,
            wait_duration: None,
        })
    }

    async fn close(&self) -> StoreResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(StoreError::Closed(StoreKind::Primary));
        }

        if self.is_postgres_pool() {
            let pool = self.connection.get_postgres_connection_pool();
            tokio::time::timeout(self.close_timeout, pool.close())
                .await
                .map_err(|_| StoreError::Timeout(self.close_timeout))?;
        }

        tracing::info!("PostgreSQL connection pool closed");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn as_primary(&self) -> Option<&DatabaseConnection> {
        (!self.is_closed()).then_some(&self.connection)
    }
}
