use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::SchedulesState;
use crate::api::{internal_error, not_found, ErrorResponse};
use crate::db;
use crate::models::ScheduleSnapshot;
use crate::progress::{self, MarkerDescriptor};

#[derive(Debug, Deserialize, IntoParams)]
pub struct ScheduleListQuery {
    /// Restrict the snapshot to one driver's schedules
    pub driver_id: Option<i64>,
}

/// Poll endpoint: full snapshot of schedules with embedded station lists.
/// Every schedule passes through the completion normalizer before it leaves
/// the server, so viewers never receive a completed schedule with
/// half-settled stations.
#[utoipa::path(
    get,
    path = "/api/schedules",
    params(ScheduleListQuery),
    responses(
        (status = 200, description = "Current schedule snapshot", body = ScheduleSnapshot)
    ),
    tag = "schedules"
)]
pub async fn list_schedules(
    State(state): State<SchedulesState>,
    Query(query): Query<ScheduleListQuery>,
) -> Result<Json<ScheduleSnapshot>, (StatusCode, Json<ErrorResponse>)> {
    let schedules = db::load_schedules(&state.pool, query.driver_id)
        .await
        .map_err(internal_error)?;

    let now = Utc::now();
    Ok(Json(ScheduleSnapshot {
        schedules: schedules.iter().map(|s| progress::normalize(s, now)).collect(),
        last_updated: now,
    }))
}

/// Render data for the external map collaborator
#[derive(Debug, Serialize, ToSchema)]
pub struct ScheduleMapResponse {
    pub schedule_id: i64,
    /// One marker per station, in traversal order
    pub markers: Vec<MarkerDescriptor>,
    /// Ordered `[lat, lng]` polyline through all stations
    pub route_path: Vec<[f64; 2]>,
}

/// Map markers and route polyline for one schedule
#[utoipa::path(
    get,
    path = "/api/schedules/{id}/map",
    params(("id" = i64, Path, description = "Schedule id")),
    responses(
        (status = 200, description = "Map render descriptors", body = ScheduleMapResponse),
        (status = 404, description = "Unknown schedule", body = ErrorResponse)
    ),
    tag = "schedules"
)]
pub async fn get_schedule_map(
    State(state): State<SchedulesState>,
    Path(id): Path<i64>,
) -> Result<Json<ScheduleMapResponse>, (StatusCode, Json<ErrorResponse>)> {
    let schedule = db::load_schedule(&state.pool, id)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| not_found("Schedule"))?;
    let schedule = progress::normalize(&schedule, Utc::now());

    Ok(Json(ScheduleMapResponse {
        schedule_id: schedule.id,
        markers: progress::station_markers(&schedule),
        route_path: progress::route_path(&schedule.stations),
    }))
}
