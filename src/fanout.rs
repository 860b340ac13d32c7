//! Scope-addressed publish/subscribe fan-out for tracking events.
//!
//! Every driver action publishes into two logical scopes: the shared
//! `monitoring` scope observed by the admin dashboard and resident views,
//! and the `driver.{id}` scope observed by that driver's own tracker
//! session. Delivery is at-least-once with no ordering guarantee between
//! event kinds, so every consumer merges idempotently.

use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use utoipa::ToSchema;

use crate::models::{Schedule, StationPatch};

/// Logical subscription scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Shared broadcast scope observing all schedules
    Monitoring,
    /// One driver's own schedules only
    Driver(i64),
}

impl Scope {
    pub fn channel_name(&self) -> String {
        match self {
            Scope::Monitoring => "monitoring".to_string(),
            Scope::Driver(id) => format!("driver.{id}"),
        }
    }

    pub fn parse(name: &str) -> Option<Scope> {
        if name == "monitoring" {
            return Some(Scope::Monitoring);
        }
        let id = name.strip_prefix("driver.")?.parse().ok()?;
        Some(Scope::Driver(id))
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.channel_name())
    }
}

/// Partial station update within one schedule
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StationUpdate {
    pub schedule_id: i64,
    pub station: StationPatch,
}

/// Event envelope carried on the fan-out channel
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", content = "payload")]
pub enum TrackingEvent {
    /// Full schedule snapshot, including nested stations
    #[serde(rename = "schedule.updated")]
    ScheduleUpdated(Schedule),
    /// Partial patch to one station within one schedule
    #[serde(rename = "station.updated")]
    StationUpdated(StationUpdate),
}

const CHANNEL_CAPACITY: usize = 64;

/// In-process fan-out hub: one broadcast channel per scope, created lazily
pub struct FanoutHub {
    channels: RwLock<HashMap<String, broadcast::Sender<TrackingEvent>>>,
}

impl FanoutHub {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
        }
    }

    fn sender(&self, scope: &Scope) -> broadcast::Sender<TrackingEvent> {
        let name = scope.channel_name();
        if let Some(tx) = self.channels.read().unwrap().get(&name) {
            return tx.clone();
        }
        let mut channels = self.channels.write().unwrap();
        channels
            .entry(name)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Subscribe to one scope. Each call returns an independent receiver;
    /// callers that re-subscribe are responsible for dropping the old one.
    pub fn subscribe(&self, scope: &Scope) -> broadcast::Receiver<TrackingEvent> {
        self.sender(scope).subscribe()
    }

    /// Publish an event for `driver_id`'s schedule: delivered both on the
    /// shared monitoring scope and on the driver's own scope. Events with no
    /// current subscribers are dropped; the periodic poll reconciles.
    pub fn publish(&self, driver_id: i64, event: TrackingEvent) {
        for scope in [Scope::Monitoring, Scope::Driver(driver_id)] {
            let tx = self.sender(&scope);
            let receivers = tx.send(event.clone()).unwrap_or(0);
            tracing::debug!(scope = %scope, receivers, "published tracking event");
        }
    }
}

impl Default for FanoutHub {
    fn default() -> Self {
        Self::new()
    }
}
