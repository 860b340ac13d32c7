use chrono::{DateTime, Utc};

use crate::models::{Schedule, ScheduleStatus, StationStatus};

/// Current-station label shown for a completed schedule with no stations
pub const EMPTY_ROUTE_LABEL: &str = "Route complete";

/// Force terminal consistency onto a schedule payload.
///
/// The authoritative source may report completion before per-station details
/// have settled, so this runs defensively at every boundary: initial load,
/// poll merge, push merge, and after each local optimistic update. For a
/// completed schedule every station is forced to `completed` (backfilling a
/// missing `completed_at` from `arrived_at`, else `now`), progress is pinned
/// to 100 and the current-station label points at the final stop. Anything
/// not completed passes through untouched (the legacy `success` synonym is
/// already folded into `completed` by the status enum).
///
/// Idempotent: a second pass finds nothing left to fill in.
pub fn normalize(schedule: &Schedule, now: DateTime<Utc>) -> Schedule {
    if schedule.status != ScheduleStatus::Completed {
        return schedule.clone();
    }

    let mut next = schedule.clone();
    next.progress_percentage = 100;
    for station in &mut next.stations {
        station.status = StationStatus::Completed;
        if station.completed_at.is_none() {
            station.completed_at = station.arrived_at.or(Some(now));
        }
    }
    next.current_station = next
        .stations
        .iter()
        .max_by_key(|s| s.order)
        .map(|s| s.name.clone())
        .or_else(|| Some(EMPTY_ROUTE_LABEL.to_string()));
    next
}
