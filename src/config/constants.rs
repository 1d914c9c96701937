//! Application-wide constants
//!
//! Centralized location for defaults and key prefixes.

// =============================================================================
// Server Configuration
// =============================================================================

/// Default server host address
pub const DEFAULT_SERVER_HOST: &str = "0.0.0.0";

/// Default server port
pub const DEFAULT_SERVER_PORT: u16 = 3000;

// =============================================================================
// Primary Store (PostgreSQL)
// =============================================================================

pub const DEFAULT_DB_HOST: &str = "localhost";
pub const DEFAULT_DB_PORT: u16 = 5432;
pub const DEFAULT_DB_USER: &str = "postgres";
pub const DEFAULT_DB_PASSWORD: &str = "password";
pub const DEFAULT_DB_NAME: &str = "user_management";
pub const DEFAULT_DB_SSL_MODE: &str = "disable";

/// Upper bound on pooled connections
pub const DEFAULT_DB_MAX_OPEN_CONNS: u32 = 25;

/// Seconds an idle pooled connection survives before it is reaped
pub const DEFAULT_DB_CONN_MAX_IDLE_TIME_SECONDS: u64 = 60;

/// Maximum lifetime of a pooled connection in seconds
pub const DEFAULT_DB_CONN_MAX_LIFETIME_SECONDS: u64 = 300;

// =============================================================================
// Cache (Redis)
// =============================================================================

pub const DEFAULT_REDIS_HOST: &str = "localhost";
pub const DEFAULT_REDIS_PORT: u16 = 6379;
pub const DEFAULT_REDIS_DB: i64 = 0;

// =============================================================================
// Search Index (Elasticsearch)
// =============================================================================

pub const DEFAULT_ELASTICSEARCH_HOST: &str = "localhost";
pub const DEFAULT_ELASTICSEARCH_PORT: u16 = 9200;

// =============================================================================
// Document Store (MongoDB)
// =============================================================================

pub const DEFAULT_MONGODB_URI: &str = "mongodb://localhost:27017";

/// Database used for the liveness command
pub const MONGODB_ADMIN_DATABASE: &str = "admin";

/// Driver default for `maxPoolSize` when the URI does not set it
pub const DEFAULT_MONGODB_MAX_POOL_SIZE: u32 = 10;

// =============================================================================
// Timeouts
// =============================================================================

/// Time allowed for establishing each store connection
pub const DEFAULT_CONNECT_TIMEOUT_SECONDS: u64 = 10;

/// Time allowed for a single health probe round trip
pub const DEFAULT_PROBE_TIMEOUT_SECONDS: u64 = 5;

/// Time allowed for a store to close its connections
pub const DEFAULT_CLOSE_TIMEOUT_SECONDS: u64 = 5;

// =============================================================================
// Pool Metrics
// =============================================================================

/// Interval between pool samples
pub const DEFAULT_METRICS_INTERVAL_SECONDS: u64 = 30;

/// Expiry of a published sample in the cache store
pub const DEFAULT_METRICS_RETENTION_HOURS: u64 = 24;

/// Cache key prefix for published pool samples
pub const CACHE_PREFIX_METRICS: &str = "db_metrics:";

/// Seconds per hour
pub const SECONDS_PER_HOUR: u64 = 3600;

// =============================================================================
// Analytics
// =============================================================================

/// Statements returned by the slow query report when no limit is given
pub const DEFAULT_SLOW_QUERY_LIMIT: u32 = 10;
