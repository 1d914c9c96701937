//! Application route configuration.

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use super::handlers::health_routes;
use super::AppState;

/// Create the application router with all routes configured
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .nest("/health", health_routes())
        // Global middleware
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Root endpoint
async fn root() -> &'static str {
    concat!("Datastore Hub v", env!("CARGO_PKG_VERSION"))
}
