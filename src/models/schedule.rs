use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::station::Station;

/// Lifecycle status of a schedule (one driver's run over a route)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Pending,
    InProgress,
    /// Legacy payloads use `success` for the same state; it is folded into
    /// `completed` at every deserialization boundary
    #[serde(alias = "success")]
    Completed,
    Failed,
}

impl ScheduleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleStatus::Pending => "pending",
            ScheduleStatus::InProgress => "in_progress",
            ScheduleStatus::Completed => "completed",
            ScheduleStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ScheduleStatus::Pending),
            "in_progress" => Some(ScheduleStatus::InProgress),
            "completed" | "success" => Some(ScheduleStatus::Completed),
            "failed" => Some(ScheduleStatus::Failed),
            _ => None,
        }
    }
}

/// One driver's dated run over an ordered station list.
/// Stations are composed: they are fetched and serialized embedded in the
/// schedule and do not outlive it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Schedule {
    pub id: i64,
    pub driver_id: i64,
    pub route_id: i64,
    pub status: ScheduleStatus,
    /// Ordered by `order` ascending
    pub stations: Vec<Station>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Derived: round(100 * finished stations / total stations); forced to
    /// 100 when the schedule is completed
    pub progress_percentage: u8,
    /// Display label for the stop currently being worked
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_station: Option<String>,
    pub last_updated: DateTime<Utc>,
}

impl Schedule {
    /// Share of stations in `completed`/`departed`, rounded to whole percent
    pub fn derived_progress(stations: &[Station]) -> u8 {
        if stations.is_empty() {
            return 0;
        }
        let finished = stations.iter().filter(|s| s.status.is_finished()).count();
        ((100.0 * finished as f64 / stations.len() as f64).round()) as u8
    }

    pub fn station(&self, station_id: i64) -> Option<&Station> {
        self.stations.iter().find(|s| s.id == station_id)
    }

    /// Replacement-value update of one embedded station
    pub fn with_station(&self, station: Station) -> Schedule {
        let mut next = self.clone();
        if let Some(slot) = next.stations.iter_mut().find(|s| s.id == station.id) {
            *slot = station;
        }
        next.progress_percentage = Self::derived_progress(&next.stations);
        next
    }
}

/// Full state snapshot as served by the poll endpoint and consumed by the
/// reconciliation client
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ScheduleSnapshot {
    pub schedules: Vec<Schedule>,
    pub last_updated: DateTime<Utc>,
}
