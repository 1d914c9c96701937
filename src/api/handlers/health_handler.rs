//! Health check handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};

use crate::api::AppState;
use crate::config::DEFAULT_SLOW_QUERY_LIMIT;
use crate::errors::{AppError, AppResult};
use crate::infra::StoreKind;
use crate::services::{DatabaseStats, HealthReport};

/// Overall verdict derived from a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl OverallStatus {
    pub fn of(report: &HealthReport) -> Self {
        if !report.primary_up() {
            OverallStatus::Unhealthy
        } else if report.is_healthy() {
            OverallStatus::Healthy
        } else {
            OverallStatus::Degraded
        }
    }

    pub fn status_code(self) -> StatusCode {
        match self {
            OverallStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::OK,
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: OverallStatus,
    pub stores: HealthReport,
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    #[serde(default = "default_slow_limit")]
    pub slow_limit: u32,
}

fn default_slow_limit() -> u32 {
    DEFAULT_SLOW_QUERY_LIMIT
}

/// Create health routes.
pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(health_check))
        .route("/:kind", get(store_health))
        .route("/primary/stats", get(primary_stats))
}

/// Full report across every store kind.
pub async fn health_check(State(state): State<AppState>) -> Response {
    let report = state.health.check_all(&state.registry).await;
    let status = OverallStatus::of(&report);

    (
        status.status_code(),
        Json(HealthResponse {
            status,
            stores: report,
        }),
    )
        .into_response()
}

/// Status of one store; unknown kind names are 404.
pub async fn store_health(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> AppResult<Response> {
    let kind: StoreKind = kind.parse().map_err(|_| AppError::NotFound)?;
    let status = state.health.check(&state.registry, kind).await;

    let code = if status.is_up() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    Ok((code, Json(status)).into_response())
}

/// Table sizes, usage and slow statements of the primary store.
pub async fn primary_stats(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> AppResult<Json<DatabaseStats>> {
    if query.slow_limit == 0 {
        return Err(AppError::bad_request("slow_limit must be at least 1"));
    }

    let stats = state.analytics.snapshot(query.slow_limit).await?;
    Ok(Json(stats))
}
