use serde::Serialize;
use utoipa::ToSchema;

use crate::models::{Schedule, Station, StationStatus};

use super::selector::select_active_station;

/// Render descriptor for one station marker, consumed by the external map
/// collaborator
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct MarkerDescriptor {
    /// `[latitude, longitude]`
    pub position: [f64; 2],
    /// CSS color for the marker pin
    pub status_color: &'static str,
    /// Whether the moving-truck marker sits on this station
    pub is_active_marker: bool,
    pub popup_content: String,
}

pub fn status_color(status: StationStatus) -> &'static str {
    match status {
        StationStatus::Pending => "#9e9e9e",
        StationStatus::Arrived => "#ff9800",
        StationStatus::Collecting => "#2196f3",
        StationStatus::Completed => "#4caf50",
        StationStatus::Departed => "#009688",
        StationStatus::Failed => "#f44336",
    }
}

/// One marker per station, in traversal order, with the active flag derived
/// through the shared selector
pub fn station_markers(schedule: &Schedule) -> Vec<MarkerDescriptor> {
    let active_id = select_active_station(&schedule.stations).map(|s| s.id);
    let mut ordered: Vec<&Station> = schedule.stations.iter().collect();
    ordered.sort_by_key(|s| s.order);

    ordered
        .into_iter()
        .map(|s| MarkerDescriptor {
            position: [s.latitude, s.longitude],
            status_color: status_color(s.status),
            is_active_marker: active_id == Some(s.id),
            popup_content: format!("{}: {}", s.name, s.status.as_str()),
        })
        .collect()
}

/// Ordered polyline of station positions for the routing collaborator
pub fn route_path(stations: &[Station]) -> Vec<[f64; 2]> {
    let mut ordered: Vec<&Station> = stations.iter().collect();
    ordered.sort_by_key(|s| s.order);
    ordered.iter().map(|s| [s.latitude, s.longitude]).collect()
}
