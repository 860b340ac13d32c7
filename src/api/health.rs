use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use sqlx::SqlitePool;
use utoipa::ToSchema;

use crate::api::{internal_error, ErrorResponse};

#[derive(Clone)]
pub struct HealthState {
    pub pool: SqlitePool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Whether the service is running
    pub healthy: bool,
    /// Number of schedules known to the service
    pub schedule_count: i64,
    /// Number of schedules currently in progress
    pub in_progress_count: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct Counts {
    total: i64,
    in_progress: i64,
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service health status", body = HealthResponse)
    ),
    tag = "health"
)]
pub async fn health_check(
    State(state): State<HealthState>,
) -> Result<Json<HealthResponse>, (StatusCode, Json<ErrorResponse>)> {
    let counts: Counts = sqlx::query_as(
        r#"
        SELECT
            COUNT(*) as total,
            COALESCE(SUM(CASE WHEN status = 'in_progress' THEN 1 ELSE 0 END), 0) as in_progress
        FROM schedules
        "#,
    )
    .fetch_one(&state.pool)
    .await
    .map_err(internal_error)?;

    Ok(Json(HealthResponse {
        healthy: true,
        schedule_count: counts.total,
        in_progress_count: counts.in_progress,
    }))
}

pub fn router(pool: SqlitePool) -> Router {
    let state = HealthState { pool };
    Router::new().route("/", get(health_check)).with_state(state)
}
