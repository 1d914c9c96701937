//! PostgreSQL usage analytics.
//!
//! Read-only catalog and statistics queries issued over the primary
//! store's connection, obtained from the registry.

use std::sync::Arc;

use sea_orm::{
    ConnectionTrait, DatabaseConnection, DbErr, FromQueryResult, Statement, Value,
};
use serde::Serialize;

use crate::infra::{StoreError, StoreKind, StoreRegistry, StoreResult};

const TABLE_SIZES_SQL: &str = r#"
SELECT
    table_name::text AS table_name,
    pg_total_relation_size(format('%I.%I', table_schema, table_name)::regclass) AS size_bytes
FROM information_schema.tables
WHERE table_schema = 'public' AND table_type = 'BASE TABLE'
ORDER BY size_bytes DESC
"#;

// Needs the pg_stat_statements extension (PostgreSQL 13+ column names)
const SLOW_QUERIES_SQL: &str = r#"
SELECT
    query,
    calls,
    total_exec_time AS total_time_ms,
    mean_exec_time AS mean_time_ms,
    rows
FROM pg_stat_statements
WHERE query NOT LIKE '%pg_stat_statements%'
ORDER BY mean_exec_time DESC
LIMIT $1
"#;

const USAGE_SQL: &str = r#"
SELECT
    pg_database_size(current_database()) AS total_size_bytes,
    (SELECT COUNT(*) FROM pg_stat_activity WHERE state = 'active') AS active_connections,
    (SELECT blks_hit::float8 * 100 / NULLIF(blks_hit + blks_read, 0)
       FROM pg_stat_database
      WHERE datname = current_database()) AS cache_hit_ratio
"#;

/// On-disk size of one table, indexes and TOAST included.
#[derive(Debug, Clone, PartialEq, Serialize, FromQueryResult)]
pub struct TableSize {
    pub table_name: String,
    pub size_bytes: i64,
}

/// One normalized statement from `pg_stat_statements`.
#[derive(Debug, Clone, PartialEq, Serialize, FromQueryResult)]
pub struct SlowQuery {
    pub query: String,
    pub calls: i64,
    pub total_time_ms: f64,
    pub mean_time_ms: f64,
    pub rows: i64,
}

/// Database-wide usage figures.
#[derive(Debug, Clone, PartialEq, Serialize, FromQueryResult)]
pub struct DatabaseUsage {
    pub total_size_bytes: i64,
    pub active_connections: i64,
    /// Buffer cache hit percentage; `None` before any block was read.
    pub cache_hit_ratio: Option<f64>,
}

/// Everything `/health/primary/stats` reports.
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseStats {
    pub usage: DatabaseUsage,
    pub table_sizes: Vec<TableSize>,
    /// `None` when `pg_stat_statements` is not installed.
    pub slow_queries: Option<Vec<SlowQuery>>,
}

#[derive(Debug, Clone)]
pub struct AnalyticsService {
    registry: Arc<StoreRegistry>,
}

impl AnalyticsService {
    pub fn new(registry: Arc<StoreRegistry>) -> Self {
        Self { registry }
    }

    fn connection(&self) -> StoreResult<&DatabaseConnection> {
        self.registry
            .primary()
            .ok_or(StoreError::Unavailable(StoreKind::Primary))
    }

    /// Sizes of every table in the `public` schema, largest first.
    pub async fn table_sizes(&self) -> StoreResult<Vec<TableSize>> {
        let conn = self.connection()?;
        let statement = Statement::from_string(conn.get_database_backend(), TABLE_SIZES_SQL);

        Ok(TableSize::find_by_statement(statement).all(conn).await?)
    }

    /// The `limit` statements with the highest mean execution time.
    pub async fn slow_queries(&self, limit: u32) -> StoreResult<Vec<SlowQuery>> {
        let conn = self.connection()?;
        let statement = Statement::from_sql_and_values(
            conn.get_database_backend(),
            SLOW_QUERIES_SQL,
            [Value::from(i64::from(limit))],
        );

        Ok(SlowQuery::find_by_statement(statement).all(conn).await?)
    }

    /// Database size, active connections and buffer cache hit ratio.
    pub async fn usage(&self) -> StoreResult<DatabaseUsage> {
        let conn = self.connection()?;
        let statement = Statement::from_string(conn.get_database_backend(), USAGE_SQL);

        DatabaseUsage::find_by_statement(statement)
            .one(conn)
            .await?
            .ok_or_else(|| StoreError::Database(DbErr::RecordNotFound("database usage".into())))
    }

    /// Usage and table sizes, plus slow queries when the extension is present.
    pub async fn snapshot(&self, slow_query_limit: u32) -> StoreResult<DatabaseStats> {
        let usage = self.usage().await?;
        let table_sizes = self.table_sizes().await?;

        let slow_queries = match self.slow_queries(slow_query_limit).await {
            Ok(queries) => Some(queries),
            Err(e) => {
                tracing::debug!(error = %e, "Slow query statistics unavailable");
                None
            }
        };

        Ok(DatabaseStats {
            usage,
            table_sizes,
            slow_queries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::{PrimaryStore, StoreHandle};
    use crate::testing::StubStore;
    use sea_orm::{DatabaseBackend, MockDatabase};
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn service_over(db: MockDatabase) -> AnalyticsService {
        let primary = PrimaryStore::from_connection(db.into_connection(), Duration::from_secs(1));
        let registry = StoreRegistry::from_handles([Arc::new(primary) as Arc<dyn StoreHandle>]);
        AnalyticsService::new(Arc::new(registry))
    }

    fn usage_row(hit_ratio: Option<f64>) -> BTreeMap<&'static str, Value> {
        BTreeMap::from([
            ("total_size_bytes", Value::from(8_388_608i64)),
            ("active_connections", Value::from(3i64)),
            ("cache_hit_ratio", Value::Double(hit_ratio)),
        ])
    }

    fn table_row(name: &str, size: i64) -> BTreeMap<&'static str, Value> {
        BTreeMap::from([
            ("table_name", Value::from(name)),
            ("size_bytes", Value::from(size)),
        ])
    }

    #[tokio::test]
    async fn test_table_sizes_are_read_from_primary() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![table_row("users", 65_536), table_row("sessions", 8_192)]]);

        let sizes = service_over(db).table_sizes().await.unwrap();

        assert_eq!(sizes.len(), 2);
        assert_eq!(sizes[0].table_name, "users");
        assert_eq!(sizes[0].size_bytes, 65_536);
    }

    #[tokio::test]
    async fn test_usage_allows_missing_hit_ratio() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![usage_row(None)]]);

        let usage = service_over(db).usage().await.unwrap();

        assert_eq!(usage.active_connections, 3);
        assert_eq!(usage.cache_hit_ratio, None);
    }

    #[tokio::test]
    async fn test_snapshot_tolerates_missing_statements_extension() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![usage_row(Some(99.5))]])
            .append_query_results([vec![table_row("users", 65_536)]])
            .append_query_errors([DbErr::Custom(
                "relation \"pg_stat_statements\" does not exist".into(),
            )]);

        let stats = service_over(db).snapshot(10).await.unwrap();

        assert_eq!(stats.usage.cache_hit_ratio, Some(99.5));
        assert_eq!(stats.table_sizes.len(), 1);
        assert!(stats.slow_queries.is_none());
    }

    #[tokio::test]
    async fn test_without_sql_connection_is_unavailable() {
        let registry = StoreRegistry::from_handles([
            Arc::new(StubStore::up(StoreKind::Primary)) as Arc<dyn StoreHandle>,
        ]);
        let service = AnalyticsService::new(Arc::new(registry));

        assert!(matches!(
            service.usage().await,
            Err(StoreError::Unavailable(StoreKind::Primary))
        ));
    }
}
