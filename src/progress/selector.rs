use crate::models::{Station, StationStatus};

/// Which station is "currently being worked", for placing the moving-truck
/// marker and highlighting the station list.
///
/// Priority, first match wins:
/// 1. a `collecting` station
/// 2. an `arrived` station
/// 3. the lowest-order `pending` station (the next stop in line)
/// 4. the highest-order `completed`/`departed` station (everything finished,
///    keep showing the last touched stop until the schedule itself flips)
///
/// Deterministic under any permutation of the input: candidates are examined
/// in `order` and ties within a priority class resolve to the lowest order.
pub fn select_active_station(stations: &[Station]) -> Option<&Station> {
    let mut ordered: Vec<&Station> = stations.iter().collect();
    ordered.sort_by_key(|s| s.order);

    if let Some(s) = ordered
        .iter()
        .find(|s| s.status == StationStatus::Collecting)
    {
        return Some(s);
    }
    if let Some(s) = ordered.iter().find(|s| s.status == StationStatus::Arrived) {
        return Some(s);
    }
    if let Some(s) = ordered.iter().find(|s| s.status == StationStatus::Pending) {
        return Some(s);
    }
    ordered
        .iter()
        .rev()
        .find(|s| s.status.is_finished())
        .copied()
}

/// Last-station detection underlying the "Complete Route" relabel rule
pub fn is_last_station(station: &Station, all: &[Station]) -> bool {
    all.iter()
        .map(|s| s.order)
        .max()
        .is_some_and(|max| station.order == max)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn station(id: i64, order: i64, status: StationStatus) -> Station {
        Station {
            id,
            name: format!("Station {order}"),
            latitude: 14.6,
            longitude: 121.0,
            order,
            status,
            arrived_at: None,
            completed_at: None,
            departed_at: None,
        }
    }

    #[test]
    fn collecting_outranks_everything() {
        let stations = vec![
            station(1, 0, StationStatus::Completed),
            station(2, 1, StationStatus::Collecting),
            station(3, 2, StationStatus::Pending),
        ];
        assert_eq!(select_active_station(&stations).unwrap().order, 1);
    }

    #[test]
    fn result_is_independent_of_input_order() {
        let stations = vec![
            station(3, 2, StationStatus::Pending),
            station(1, 0, StationStatus::Completed),
            station(2, 1, StationStatus::Collecting),
        ];
        // every rotation yields the same station
        let mut rotated = stations.clone();
        for _ in 0..stations.len() {
            rotated.rotate_left(1);
            assert_eq!(select_active_station(&rotated).unwrap().id, 2);
        }
    }

    #[test]
    fn arrived_outranks_pending() {
        let stations = vec![
            station(1, 0, StationStatus::Departed),
            station(2, 1, StationStatus::Pending),
            station(3, 2, StationStatus::Arrived),
        ];
        assert_eq!(select_active_station(&stations).unwrap().order, 2);
    }

    #[test]
    fn lowest_pending_is_next_when_nothing_is_active() {
        let stations = vec![
            station(1, 0, StationStatus::Departed),
            station(2, 1, StationStatus::Pending),
            station(3, 2, StationStatus::Pending),
        ];
        assert_eq!(select_active_station(&stations).unwrap().order, 1);
    }

    #[test]
    fn last_finished_station_wins_when_all_are_finished() {
        let stations = vec![
            station(1, 0, StationStatus::Completed),
            station(2, 1, StationStatus::Departed),
        ];
        assert_eq!(select_active_station(&stations).unwrap().order, 1);
    }

    #[test]
    fn empty_list_selects_nothing() {
        assert_eq!(select_active_station(&[]), None);
    }

    #[test]
    fn failed_stations_are_never_active() {
        let stations = vec![
            station(1, 0, StationStatus::Failed),
            station(2, 1, StationStatus::Departed),
        ];
        assert_eq!(select_active_station(&stations).unwrap().order, 1);
    }

    #[test]
    fn last_station_is_detected_by_max_order() {
        let stations = vec![
            station(1, 0, StationStatus::Pending),
            station(2, 1, StationStatus::Pending),
        ];
        assert!(!is_last_station(&stations[0], &stations));
        assert!(is_last_station(&stations[1], &stations));
    }
}
