//! Station and schedule state machines.
//!
//! All transitions are pure: they take the current value plus an explicit
//! `now` and either return the advanced replacement value or an error,
//! never mutating the input. The server-side action handlers and the
//! driver-side optimistic overlay both go through these functions, so the
//! transition rules are enforced in exactly one place.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{Schedule, ScheduleStatus, Station, StationStatus};
use crate::progress;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Invalid station transition: {from} -> {to}")]
    InvalidTransition { from: &'static str, to: &'static str },
    #[error("Invalid schedule transition: {from} -> {to}")]
    InvalidScheduleTransition { from: &'static str, to: &'static str },
    #[error("Precondition failed: {0}")]
    Precondition(String),
}

/// Advance one station to `target`, stamping the matching timestamp.
///
/// `target` must be the single legal successor of the current status, with
/// `failed` reachable from any state as the manual override path. Previously
/// stamped timestamps are never touched.
pub fn apply_station_transition(
    station: &Station,
    target: StationStatus,
    now: DateTime<Utc>,
) -> Result<Station, TransitionError> {
    if target != StationStatus::Failed && station.status.forward_successor() != Some(target) {
        return Err(TransitionError::InvalidTransition {
            from: station.status.as_str(),
            to: target.as_str(),
        });
    }

    let mut next = station.clone();
    next.status = target;
    match target {
        StationStatus::Arrived => next.arrived_at = Some(now),
        StationStatus::Completed => next.completed_at = Some(now),
        StationStatus::Departed => next.departed_at = Some(now),
        _ => {}
    }
    Ok(next)
}

/// Advance a schedule to `target`.
///
/// `pending -> in_progress` requires at least one station and stamps
/// `started_at`. `in_progress -> completed` requires every station finished,
/// stamps `completed_at` and runs the completion normalizer so the returned
/// value is already terminally consistent. Any state may abort to `failed`.
pub fn apply_schedule_transition(
    schedule: &Schedule,
    target: ScheduleStatus,
    now: DateTime<Utc>,
) -> Result<Schedule, TransitionError> {
    match (schedule.status, target) {
        (ScheduleStatus::Pending, ScheduleStatus::InProgress) => {
            if schedule.stations.is_empty() {
                return Err(TransitionError::Precondition(
                    "Cannot start a schedule with no stations".into(),
                ));
            }
            let mut next = schedule.clone();
            next.status = ScheduleStatus::InProgress;
            next.started_at = Some(now);
            next.last_updated = now;
            Ok(next)
        }
        (ScheduleStatus::InProgress, ScheduleStatus::Completed) => {
            if let Some(unfinished) = schedule.stations.iter().find(|s| !s.status.is_finished()) {
                return Err(TransitionError::Precondition(format!(
                    "Station '{}' is still {}",
                    unfinished.name,
                    unfinished.status.as_str()
                )));
            }
            let mut next = schedule.clone();
            next.status = ScheduleStatus::Completed;
            next.completed_at = Some(now);
            next.last_updated = now;
            Ok(progress::normalize(&next, now))
        }
        (_, ScheduleStatus::Failed) => {
            let mut next = schedule.clone();
            next.status = ScheduleStatus::Failed;
            next.last_updated = now;
            Ok(next)
        }
        (from, to) => Err(TransitionError::InvalidScheduleTransition {
            from: from.as_str(),
            to: to.as_str(),
        }),
    }
}

/// The driver-facing next action for one station
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StationAction {
    Arrive,
    StartCollecting,
    MarkCollected,
    Depart,
    /// Shown instead of `Depart` on the last stop: completing the schedule is
    /// the terminal action there, the last station never literally departs
    CompleteRoute,
}

impl StationAction {
    pub fn label(&self) -> &'static str {
        match self {
            StationAction::Arrive => "Arrive",
            StationAction::StartCollecting => "Start Collecting",
            StationAction::MarkCollected => "Mark Collected",
            StationAction::Depart => "Depart",
            StationAction::CompleteRoute => "Complete Route",
        }
    }

    /// The station status this action requests, if it is a station-level
    /// transition at all (`CompleteRoute` routes to the schedule instead)
    pub fn target_status(&self) -> Option<StationStatus> {
        match self {
            StationAction::Arrive => Some(StationStatus::Arrived),
            StationAction::StartCollecting => Some(StationStatus::Collecting),
            StationAction::MarkCollected => Some(StationStatus::Completed),
            StationAction::Depart => Some(StationStatus::Departed),
            StationAction::CompleteRoute => None,
        }
    }
}

/// Derive the next driver action for `station`, or `None` once the stop is
/// terminal (`departed`/`failed`, or `completed` was the last forward step
/// already taken on a non-last stop).
pub fn next_station_action(station: &Station, all: &[Station]) -> Option<StationAction> {
    match station.status {
        StationStatus::Pending => Some(StationAction::Arrive),
        StationStatus::Arrived => Some(StationAction::StartCollecting),
        StationStatus::Collecting => Some(StationAction::MarkCollected),
        StationStatus::Completed => {
            if progress::is_last_station(station, all) {
                Some(StationAction::CompleteRoute)
            } else {
                Some(StationAction::Depart)
            }
        }
        StationStatus::Departed | StationStatus::Failed => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, 7, 0, 0).unwrap()
    }

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

    fn schedule(status: ScheduleStatus, stations: Vec<Station>) -> Schedule {
        Schedule {
            id: 1,
            driver_id: 2,
            route_id: 3,
            status,
            stations,
            started_at: None,
            completed_at: None,
            progress_percentage: 0,
            current_station: None,
            last_updated: now(),
        }
    }

    #[test]
    fn only_the_single_successor_is_accepted() {
        let all = [
            StationStatus::Pending,
            StationStatus::Arrived,
            StationStatus::Collecting,
            StationStatus::Completed,
            StationStatus::Departed,
            StationStatus::Failed,
        ];
        for from in all {
            let s = station(1, 0, from);
            for to in all {
                let result = apply_station_transition(&s, to, now());
                if to == StationStatus::Failed || from.forward_successor() == Some(to) {
                    assert!(result.is_ok(), "{from:?} -> {to:?} should be legal");
                } else {
                    assert_eq!(
                        result,
                        Err(TransitionError::InvalidTransition {
                            from: from.as_str(),
                            to: to.as_str(),
                        }),
                        "{from:?} -> {to:?} should be rejected"
                    );
                }
            }
        }
    }

    #[test]
    fn rejected_transition_leaves_station_unchanged() {
        let s = station(1, 0, StationStatus::Pending);
        let before = s.clone();
        let _ = apply_station_transition(&s, StationStatus::Completed, now());
        assert_eq!(s, before);
    }

    #[test]
    fn arrival_stamps_timestamp_once() {
        let s = station(1, 0, StationStatus::Pending);
        let arrived = apply_station_transition(&s, StationStatus::Arrived, now()).unwrap();
        assert_eq!(arrived.arrived_at, Some(now()));
        assert_eq!(arrived.completed_at, None);

        let later = now() + chrono::Duration::minutes(10);
        let collecting =
            apply_station_transition(&arrived, StationStatus::Collecting, later).unwrap();
        // earlier stamp untouched by the forward step
        assert_eq!(collecting.arrived_at, Some(now()));
    }

    #[test]
    fn failed_is_reachable_from_any_state() {
        for from in [
            StationStatus::Pending,
            StationStatus::Collecting,
            StationStatus::Departed,
        ] {
            let s = station(1, 0, from);
            let failed = apply_station_transition(&s, StationStatus::Failed, now()).unwrap();
            assert_eq!(failed.status, StationStatus::Failed);
        }
    }

    #[test]
    fn starting_an_empty_schedule_is_a_precondition_error() {
        let s = schedule(ScheduleStatus::Pending, vec![]);
        let result = apply_schedule_transition(&s, ScheduleStatus::InProgress, now());
        assert!(matches!(result, Err(TransitionError::Precondition(_))));
        assert_eq!(s.started_at, None);
    }

    #[test]
    fn start_sets_started_at() {
        let s = schedule(
            ScheduleStatus::Pending,
            vec![station(1, 0, StationStatus::Pending)],
        );
        let started = apply_schedule_transition(&s, ScheduleStatus::InProgress, now()).unwrap();
        assert_eq!(started.status, ScheduleStatus::InProgress);
        assert_eq!(started.started_at, Some(now()));
    }

    #[test]
    fn completion_requires_every_station_finished() {
        for unfinished in [
            StationStatus::Pending,
            StationStatus::Arrived,
            StationStatus::Collecting,
        ] {
            let s = schedule(
                ScheduleStatus::InProgress,
                vec![
                    station(1, 0, StationStatus::Departed),
                    station(2, 1, unfinished),
                ],
            );
            let result = apply_schedule_transition(&s, ScheduleStatus::Completed, now());
            assert!(
                matches!(result, Err(TransitionError::Precondition(_))),
                "completion should fail with a station still {unfinished:?}"
            );
        }
    }

    #[test]
    fn completion_normalizes_the_whole_schedule() {
        let s = schedule(
            ScheduleStatus::InProgress,
            vec![
                station(1, 0, StationStatus::Departed),
                station(2, 1, StationStatus::Completed),
            ],
        );
        let done = apply_schedule_transition(&s, ScheduleStatus::Completed, now()).unwrap();
        assert_eq!(done.status, ScheduleStatus::Completed);
        assert_eq!(done.progress_percentage, 100);
        assert!(done.stations.iter().all(|s| s.completed_at.is_some()));
    }

    #[test]
    fn pending_cannot_skip_to_completed() {
        let s = schedule(
            ScheduleStatus::Pending,
            vec![station(1, 0, StationStatus::Departed)],
        );
        let result = apply_schedule_transition(&s, ScheduleStatus::Completed, now());
        assert!(matches!(
            result,
            Err(TransitionError::InvalidScheduleTransition { .. })
        ));
    }

    #[test]
    fn any_schedule_state_may_abort_to_failed() {
        for from in [
            ScheduleStatus::Pending,
            ScheduleStatus::InProgress,
            ScheduleStatus::Completed,
        ] {
            let s = schedule(from, vec![station(1, 0, StationStatus::Pending)]);
            let failed = apply_schedule_transition(&s, ScheduleStatus::Failed, now()).unwrap();
            assert_eq!(failed.status, ScheduleStatus::Failed);
        }
    }

    #[test]
    fn last_completed_station_offers_complete_route() {
        let stations = vec![
            station(1, 0, StationStatus::Departed),
            station(2, 1, StationStatus::Completed),
        ];
        assert_eq!(
            next_station_action(&stations[1], &stations),
            Some(StationAction::CompleteRoute)
        );
        assert_eq!(StationAction::CompleteRoute.label(), "Complete Route");
        assert_eq!(StationAction::CompleteRoute.target_status(), None);
    }

    #[test]
    fn completed_non_last_station_offers_depart() {
        let stations = vec![
            station(1, 0, StationStatus::Completed),
            station(2, 1, StationStatus::Pending),
        ];
        assert_eq!(
            next_station_action(&stations[0], &stations),
            Some(StationAction::Depart)
        );
    }
}
