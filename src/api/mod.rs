pub mod error;
pub mod health;
pub mod schedules;
pub mod ws;

pub use error::{internal_error, not_found, transition_rejected, ErrorResponse};

use std::sync::Arc;

use axum::{routing::get, Router};
use sqlx::SqlitePool;

use crate::fanout::FanoutHub;

pub fn router(pool: SqlitePool, hub: Arc<FanoutHub>) -> Router {
    let ws_state = ws::WsState { hub: hub.clone() };

    Router::new()
        .nest("/schedules", schedules::router(pool.clone(), hub))
        .nest("/health", health::router(pool))
        .route("/ws/tracking", get(ws::ws_tracking).with_state(ws_state))
}
