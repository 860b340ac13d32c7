use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use utoipa::ToSchema;

use super::SchedulesState;
use crate::api::{internal_error, not_found, transition_rejected, ErrorResponse};
use crate::db;
use crate::engine;
use crate::fanout::{StationUpdate, TrackingEvent};
use crate::models::{Schedule, ScheduleStatus, Station, StationStatus};
use crate::progress;

/// Driver action: start a pending schedule
#[utoipa::path(
    post,
    path = "/api/schedules/{id}/start",
    params(("id" = i64, Path, description = "Schedule id")),
    responses(
        (status = 200, description = "Schedule started", body = Schedule),
        (status = 404, description = "Unknown schedule", body = ErrorResponse),
        (status = 409, description = "Transition rejected", body = ErrorResponse)
    ),
    tag = "schedules"
)]
pub async fn start_schedule(
    State(state): State<SchedulesState>,
    Path(id): Path<i64>,
) -> Result<Json<Schedule>, (StatusCode, Json<ErrorResponse>)> {
    let schedule = db::load_schedule(&state.pool, id)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| not_found("Schedule"))?;

    let started = engine::apply_schedule_transition(&schedule, ScheduleStatus::InProgress, Utc::now())
        .map_err(transition_rejected)?;
    db::update_schedule(&state.pool, &started)
        .await
        .map_err(internal_error)?;

    tracing::info!(schedule_id = id, driver_id = started.driver_id, "Schedule started");
    state
        .hub
        .publish(started.driver_id, TrackingEvent::ScheduleUpdated(started.clone()));
    Ok(Json(started))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct StationStatusRequest {
    /// Target status; must be the single legal next step for the station
    pub status: StationStatus,
}

/// Driver action: advance one station's status
#[utoipa::path(
    post,
    path = "/api/schedules/{id}/stations/{station_id}/status",
    params(
        ("id" = i64, Path, description = "Schedule id"),
        ("station_id" = i64, Path, description = "Station id")
    ),
    request_body = StationStatusRequest,
    responses(
        (status = 200, description = "Updated schedule", body = Schedule),
        (status = 404, description = "Unknown schedule or station", body = ErrorResponse),
        (status = 409, description = "Transition rejected", body = ErrorResponse)
    ),
    tag = "schedules"
)]
pub async fn update_station_status(
    State(state): State<SchedulesState>,
    Path((id, station_id)): Path<(i64, i64)>,
    Json(request): Json<StationStatusRequest>,
) -> Result<Json<Schedule>, (StatusCode, Json<ErrorResponse>)> {
    let schedule = db::load_schedule(&state.pool, id)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| not_found("Schedule"))?;
    let station = schedule
        .station(station_id)
        .ok_or_else(|| not_found("Station"))?;

    // The last stop never literally departs: completing the schedule is the
    // terminal action there
    if request.status == StationStatus::Departed
        && progress::is_last_station(station, &schedule.stations)
    {
        return Err((
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: "Last station does not depart; complete the schedule instead".to_string(),
            }),
        ));
    }

    let now = Utc::now();
    let updated = engine::apply_station_transition(station, request.status, now)
        .map_err(transition_rejected)?;
    let patch = Station::diff(station, &updated);

    let mut next = schedule.with_station(updated.clone());
    next.current_station = progress::select_active_station(&next.stations).map(|s| s.name.clone());
    next.last_updated = now;

    db::update_station(&state.pool, id, &updated)
        .await
        .map_err(internal_error)?;
    db::update_schedule(&state.pool, &next)
        .await
        .map_err(internal_error)?;

    tracing::info!(
        schedule_id = id,
        station_id,
        status = request.status.as_str(),
        "Station updated"
    );
    state.hub.publish(
        next.driver_id,
        TrackingEvent::StationUpdated(StationUpdate {
            schedule_id: id,
            station: patch,
        }),
    );
    Ok(Json(next))
}

/// Driver action: complete an in-progress schedule. Requires every station
/// finished; the persisted and published snapshot is already normalized.
#[utoipa::path(
    post,
    path = "/api/schedules/{id}/complete",
    params(("id" = i64, Path, description = "Schedule id")),
    responses(
        (status = 200, description = "Completed schedule", body = Schedule),
        (status = 404, description = "Unknown schedule", body = ErrorResponse),
        (status = 409, description = "Transition rejected", body = ErrorResponse)
    ),
    tag = "schedules"
)]
pub async fn complete_schedule(
    State(state): State<SchedulesState>,
    Path(id): Path<i64>,
) -> Result<Json<Schedule>, (StatusCode, Json<ErrorResponse>)> {
    let schedule = db::load_schedule(&state.pool, id)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| not_found("Schedule"))?;

    let completed =
        engine::apply_schedule_transition(&schedule, ScheduleStatus::Completed, Utc::now())
            .map_err(transition_rejected)?;
    db::update_schedule_with_stations(&state.pool, &completed)
        .await
        .map_err(internal_error)?;

    tracing::info!(schedule_id = id, driver_id = completed.driver_id, "Schedule completed");
    state
        .hub
        .publish(completed.driver_id, TrackingEvent::ScheduleUpdated(completed.clone()));
    Ok(Json(completed))
}
