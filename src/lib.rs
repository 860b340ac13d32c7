//! Live collection-route progress tracking for a municipal waste-collection
//! system: the station/schedule state machine, shared state derivation, the
//! real-time fan-out channel and the per-viewer reconciliation client,
//! exposed over an axum HTTP/WebSocket API backed by sqlite.

pub mod api;
pub mod client;
pub mod config;
pub mod db;
pub mod engine;
pub mod fanout;
pub mod models;
pub mod progress;
