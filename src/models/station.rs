use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Lifecycle status of a single collection stop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum StationStatus {
    Pending,
    Arrived,
    Collecting,
    Completed,
    Departed,
    Failed,
}

impl StationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StationStatus::Pending => "pending",
            StationStatus::Arrived => "arrived",
            StationStatus::Collecting => "collecting",
            StationStatus::Completed => "completed",
            StationStatus::Departed => "departed",
            StationStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(StationStatus::Pending),
            "arrived" => Some(StationStatus::Arrived),
            "collecting" => Some(StationStatus::Collecting),
            "completed" => Some(StationStatus::Completed),
            "departed" => Some(StationStatus::Departed),
            "failed" => Some(StationStatus::Failed),
            _ => None,
        }
    }

    /// The single legal forward successor in the station state machine.
    /// `departed` and `failed` are terminal.
    pub fn forward_successor(&self) -> Option<StationStatus> {
        match self {
            StationStatus::Pending => Some(StationStatus::Arrived),
            StationStatus::Arrived => Some(StationStatus::Collecting),
            StationStatus::Collecting => Some(StationStatus::Completed),
            StationStatus::Completed => Some(StationStatus::Departed),
            StationStatus::Departed | StationStatus::Failed => None,
        }
    }

    /// Whether this stop counts toward schedule progress
    pub fn is_finished(&self) -> bool {
        matches!(self, StationStatus::Completed | StationStatus::Departed)
    }

    /// Position along the forward chain, used to compare optimistic local
    /// state against server confirmations without regressing progress.
    pub fn rank(&self) -> u8 {
        match self {
            StationStatus::Pending => 0,
            StationStatus::Arrived => 1,
            StationStatus::Collecting => 2,
            StationStatus::Completed => 3,
            StationStatus::Departed => 4,
            StationStatus::Failed => 5,
        }
    }
}

/// One stop on a collection route
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Station {
    /// Unique within the parent schedule's station list
    pub id: i64,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    /// 0-based traversal position; contiguous and strictly increasing
    /// within one schedule
    pub order: i64,
    pub status: StationStatus,
    /// Stamped on entering `arrived` (ISO 8601)
    pub arrived_at: Option<DateTime<Utc>>,
    /// Stamped on entering `completed`
    pub completed_at: Option<DateTime<Utc>>,
    /// Stamped on entering `departed`
    pub departed_at: Option<DateTime<Utc>>,
}

/// Partial patch to one station, carried by `station.updated` push events.
/// Absent fields leave the cached value untouched (last-write-wins per field).
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct StationPatch {
    /// Id of the station being patched
    pub id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<StationStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arrived_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub departed_at: Option<DateTime<Utc>>,
}

impl Station {
    /// Merge a partial patch, field by field
    pub fn apply_patch(&self, patch: &StationPatch) -> Station {
        let mut merged = self.clone();
        if let Some(status) = patch.status {
            merged.status = status;
        }
        if patch.arrived_at.is_some() {
            merged.arrived_at = patch.arrived_at;
        }
        if patch.completed_at.is_some() {
            merged.completed_at = patch.completed_at;
        }
        if patch.departed_at.is_some() {
            merged.departed_at = patch.departed_at;
        }
        merged
    }

    /// The station-side fields that changed between `before` and `after`,
    /// as a patch suitable for a `station.updated` event
    pub fn diff(before: &Station, after: &Station) -> StationPatch {
        StationPatch {
            id: after.id,
            status: (before.status != after.status).then_some(after.status),
            arrived_at: (before.arrived_at != after.arrived_at)
                .then_some(after.arrived_at)
                .flatten(),
            completed_at: (before.completed_at != after.completed_at)
                .then_some(after.completed_at)
                .flatten(),
            departed_at: (before.departed_at != after.departed_at)
                .then_some(after.departed_at)
                .flatten(),
        }
    }
}
