mod actions;
mod list;

pub use actions::*;
pub use list::*;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use sqlx::SqlitePool;

use crate::fanout::FanoutHub;

#[derive(Clone)]
pub struct SchedulesState {
    pub pool: SqlitePool,
    pub hub: Arc<FanoutHub>,
}

pub fn router(pool: SqlitePool, hub: Arc<FanoutHub>) -> Router {
    let state = SchedulesState { pool, hub };
    Router::new()
        .route("/", get(list_schedules))
        .route("/{id}/map", get(get_schedule_map))
        .route("/{id}/start", post(start_schedule))
        .route("/{id}/complete", post(complete_schedule))
        .route("/{id}/stations/{station_id}/status", post(update_station_status))
        .with_state(state)
}
