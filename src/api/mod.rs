//! API layer - HTTP health endpoints
//!
//! This module contains all HTTP-related concerns:
//! - Request handlers
//! - Route definitions
//! - Shared handler state

pub mod handlers;
pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::AppState;
