//! Infrastructure layer - External systems integration
//!
//! This module handles all external store concerns:
//! - The uniform store handle contract
//! - One adapter per backend (PostgreSQL, Redis, Elasticsearch, MongoDB)
//! - The registry owning every live handle

pub mod cache;
pub mod db;
pub mod document;
pub mod registry;
pub mod search;
pub mod store;

pub use cache::RedisCache;
pub use db::PrimaryStore;
pub use document::DocumentStore;
pub use registry::{DriverConnector, RegistryLease, StoreConnector, StoreRegistry};
pub use search::SearchStore;
pub use store::{
    CacheStore, ConnectionGauge, GaugeLease, HealthDetails, PoolStats, StoreError, StoreHandle,
    StoreKind, StoreResult,
};

#[cfg(any(test, feature = "test-utils"))]
pub use registry::MockStoreConnector;
