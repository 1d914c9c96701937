//! Datastore Hub - multi-store connection orchestration
//!
//! Owns connections to a relational primary store and optional cache,
//! search and document stores, reports their health uniformly and samples
//! pool metrics in the background.
//!
//! # Architecture Layers
//!
//! - **cli**: Command-line interface
//! - **commands**: CLI command implementations
//! - **config**: Application configuration and constants
//! - **infra**: Store adapters and the store registry
//! - **services**: Health aggregation, metrics collection, cache-aside
//! - **api**: HTTP health endpoints
//! - **errors**: Centralized error handling
//!
//! # CLI Usage
//!
//! ```bash
//! # Serve health endpoints and collect metrics
//! cargo run -- serve
//!
//! # One-shot health report
//! cargo run -- health
//!
//! # Metrics collection only
//! cargo run -- monitor
//! ```

pub mod api;
pub mod cli;
pub mod commands;
pub mod config;
pub mod errors;
pub mod infra;
pub mod services;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Re-export commonly used types at crate root
pub use api::AppState;
pub use config::Config;
pub use errors::{AppError, AppResult};
pub use infra::{StoreHandle, StoreKind, StoreRegistry};
pub use services::{CacheAsideService, HealthAggregator, MetricsCollector};
