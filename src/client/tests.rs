use std::sync::{Arc, Mutex};

use chrono::{Duration, TimeZone, Utc};
use futures::future::BoxFuture;

use super::*;
use crate::engine::{next_station_action, StationAction};
use crate::fanout::{FanoutHub, Scope, StationUpdate, TrackingEvent};
use crate::models::{Schedule, ScheduleSnapshot, ScheduleStatus, Station, StationPatch, StationStatus};

/// Poll source serving a snapshot the test can swap out
#[derive(Clone)]
struct StubPollSource {
    snapshot: Arc<Mutex<ScheduleSnapshot>>,
}

impl StubPollSource {
    fn new(snapshot: ScheduleSnapshot) -> Self {
        Self {
            snapshot: Arc::new(Mutex::new(snapshot)),
        }
    }

    fn set(&self, snapshot: ScheduleSnapshot) {
        *self.snapshot.lock().unwrap() = snapshot;
    }
}

impl PollSource for StubPollSource {
    fn fetch_snapshot(&self) -> BoxFuture<'_, Result<ScheduleSnapshot, ClientError>> {
        let snapshot = self.snapshot.lock().unwrap().clone();
        Box::pin(async move { Ok(snapshot) })
    }
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

fn schedule(id: i64, driver_id: i64, status: ScheduleStatus, stations: Vec<Station>) -> Schedule {
    Schedule {
        id,
        driver_id,
        route_id: id,
        status,
        stations,
        started_at: None,
        completed_at: None,
        progress_percentage: 0,
        current_station: None,
        last_updated: Utc.with_ymd_and_hms(2025, 6, 2, 6, 0, 0).unwrap(),
    }
}

fn snapshot(schedules: Vec<Schedule>) -> ScheduleSnapshot {
    ScheduleSnapshot {
        schedules,
        last_updated: Utc::now(),
    }
}

type TestClient = ReconciliationClient<LocalChannelClient, StubPollSource, MemorySelectionStore>;

async fn mounted(
    hub: &Arc<FanoutHub>,
    scope: Scope,
    poll: StubPollSource,
    selection: MemorySelectionStore,
) -> TestClient {
    let mut client =
        ReconciliationClient::new(scope, LocalChannelClient::new(hub.clone()), poll, selection);
    client.mount().await.unwrap();
    client
}

#[tokio::test]
async fn mount_defaults_selection_to_first_schedule() {
    let hub = Arc::new(FanoutHub::new());
    let poll = StubPollSource::new(snapshot(vec![
        schedule(2, 1, ScheduleStatus::Pending, vec![station(1, 0, StationStatus::Pending)]),
        schedule(5, 1, ScheduleStatus::Pending, vec![station(2, 0, StationStatus::Pending)]),
    ]));
    let client = mounted(&hub, Scope::Monitoring, poll, MemorySelectionStore::new()).await;
    assert_eq!(client.selected_id(), Some(2));
}

#[tokio::test]
async fn mount_restores_persisted_selection_when_still_present() {
    let hub = Arc::new(FanoutHub::new());
    let poll = StubPollSource::new(snapshot(vec![
        schedule(2, 1, ScheduleStatus::Pending, vec![station(1, 0, StationStatus::Pending)]),
        schedule(5, 1, ScheduleStatus::Pending, vec![station(2, 0, StationStatus::Pending)]),
    ]));
    let mut selection = MemorySelectionStore::new();
    selection.set("monitoring", 5);
    let client = mounted(&hub, Scope::Monitoring, poll, selection).await;
    assert_eq!(client.selected_id(), Some(5));
}

#[tokio::test]
async fn stale_persisted_selection_falls_back_to_first() {
    let hub = Arc::new(FanoutHub::new());
    let poll = StubPollSource::new(snapshot(vec![schedule(
        2,
        1,
        ScheduleStatus::Pending,
        vec![station(1, 0, StationStatus::Pending)],
    )]));
    let mut selection = MemorySelectionStore::new();
    selection.set("monitoring", 99);
    let client = mounted(&hub, Scope::Monitoring, poll, selection).await;
    assert_eq!(client.selected_id(), Some(2));
}

#[tokio::test]
async fn selecting_persists_the_pointer() {
    let hub = Arc::new(FanoutHub::new());
    let poll = StubPollSource::new(snapshot(vec![
        schedule(2, 1, ScheduleStatus::Pending, vec![station(1, 0, StationStatus::Pending)]),
        schedule(5, 1, ScheduleStatus::Pending, vec![station(2, 0, StationStatus::Pending)]),
    ]));
    let mut client = mounted(&hub, Scope::Monitoring, poll, MemorySelectionStore::new()).await;
    assert!(client.select(5));
    assert!(!client.select(42));
    assert_eq!(client.selected_id(), Some(5));
}

#[tokio::test]
async fn push_event_for_unknown_schedule_is_dropped() {
    let hub = Arc::new(FanoutHub::new());
    let poll = StubPollSource::new(snapshot(vec![schedule(
        1,
        7,
        ScheduleStatus::InProgress,
        vec![station(10, 0, StationStatus::Pending)],
    )]));
    let mut client = mounted(&hub, Scope::Monitoring, poll, MemorySelectionStore::new()).await;
    let before = client.schedules();

    client.handle_event(TrackingEvent::StationUpdated(StationUpdate {
        schedule_id: 999,
        station: StationPatch {
            id: 10,
            status: Some(StationStatus::Arrived),
            ..Default::default()
        },
    }));
    assert_eq!(client.schedules(), before);

    // unknown station within a known schedule is dropped the same way
    client.handle_event(TrackingEvent::StationUpdated(StationUpdate {
        schedule_id: 1,
        station: StationPatch {
            id: 999,
            status: Some(StationStatus::Arrived),
            ..Default::default()
        },
    }));
    assert_eq!(client.schedules(), before);
}

#[tokio::test]
async fn station_update_merges_only_the_patched_station() {
    let hub = Arc::new(FanoutHub::new());
    let poll = StubPollSource::new(snapshot(vec![schedule(
        1,
        7,
        ScheduleStatus::InProgress,
        vec![
            station(10, 0, StationStatus::Departed),
            station(11, 1, StationStatus::Pending),
        ],
    )]));
    let mut client = mounted(&hub, Scope::Monitoring, poll, MemorySelectionStore::new()).await;

    let arrived_at = Utc.with_ymd_and_hms(2025, 6, 2, 7, 0, 0).unwrap();
    client.handle_event(TrackingEvent::StationUpdated(StationUpdate {
        schedule_id: 1,
        station: StationPatch {
            id: 11,
            status: Some(StationStatus::Arrived),
            arrived_at: Some(arrived_at),
            ..Default::default()
        },
    }));

    let schedules = client.schedules();
    assert_eq!(schedules[0].stations[0].status, StationStatus::Departed);
    assert_eq!(schedules[0].stations[1].status, StationStatus::Arrived);
    assert_eq!(schedules[0].stations[1].arrived_at, Some(arrived_at));
    // progress re-derived downstream of the merge
    assert_eq!(schedules[0].progress_percentage, 50);
}

#[tokio::test]
async fn resubscribing_neither_duplicates_nor_loses_events() {
    let hub = Arc::new(FanoutHub::new());
    let poll = StubPollSource::new(snapshot(vec![schedule(
        1,
        7,
        ScheduleStatus::InProgress,
        vec![station(10, 0, StationStatus::Pending)],
    )]));
    let mut client = mounted(&hub, Scope::Driver(7), poll, MemorySelectionStore::new()).await;

    // event delivered before the redundant re-join must still apply once
    hub.publish(
        7,
        TrackingEvent::StationUpdated(StationUpdate {
            schedule_id: 1,
            station: StationPatch {
                id: 10,
                status: Some(StationStatus::Arrived),
                ..Default::default()
            },
        }),
    );
    client.subscribe().unwrap();
    client.process_pending_events();

    let schedules = client.schedules();
    assert_eq!(schedules[0].stations[0].status, StationStatus::Arrived);
    // nothing queued twice
    client.process_pending_events();
    assert_eq!(client.schedules(), schedules);
}

#[tokio::test]
async fn poll_response_fully_supersedes_cached_schedules() {
    let hub = Arc::new(FanoutHub::new());
    let poll = StubPollSource::new(snapshot(vec![schedule(
        1,
        7,
        ScheduleStatus::InProgress,
        vec![
            station(10, 0, StationStatus::Departed),
            station(11, 1, StationStatus::Collecting),
        ],
    )]));
    let mut client = mounted(&hub, Scope::Monitoring, poll.clone(), MemorySelectionStore::new()).await;

    // server reassigned the route: fewer stations, reset statuses
    poll.set(snapshot(vec![schedule(
        1,
        7,
        ScheduleStatus::Pending,
        vec![station(20, 0, StationStatus::Pending)],
    )]));
    client.refresh().await.unwrap();

    let schedules = client.schedules();
    assert_eq!(schedules[0].status, ScheduleStatus::Pending);
    assert_eq!(schedules[0].stations.len(), 1);
    assert_eq!(schedules[0].stations[0].id, 20);
}

#[tokio::test]
async fn stale_poll_response_is_discarded() {
    let hub = Arc::new(FanoutHub::new());
    let fresh = snapshot(vec![schedule(
        1,
        7,
        ScheduleStatus::InProgress,
        vec![station(10, 0, StationStatus::Collecting)],
    )]);
    let poll = StubPollSource::new(fresh.clone());
    let mut client = mounted(&hub, Scope::Monitoring, poll, MemorySelectionStore::new()).await;

    let stale = ScheduleSnapshot {
        schedules: vec![schedule(
            1,
            7,
            ScheduleStatus::Pending,
            vec![station(10, 0, StationStatus::Pending)],
        )],
        last_updated: fresh.last_updated - Duration::minutes(5),
    };
    client.apply_snapshot(stale);

    assert_eq!(client.schedules()[0].status, ScheduleStatus::InProgress);
}

#[tokio::test]
async fn selected_schedule_completion_forces_one_refresh() {
    let hub = Arc::new(FanoutHub::new());
    let poll = StubPollSource::new(snapshot(vec![schedule(
        1,
        7,
        ScheduleStatus::InProgress,
        vec![station(10, 0, StationStatus::Departed)],
    )]));
    let mut client = mounted(&hub, Scope::Monitoring, poll, MemorySelectionStore::new()).await;
    assert!(!client.take_refresh_request());

    // completion arrives via push with station detail still unsettled
    let mut completed = schedule(
        1,
        7,
        ScheduleStatus::Completed,
        vec![station(10, 0, StationStatus::Collecting)],
    );
    completed.completed_at = Some(Utc::now());
    client.handle_event(TrackingEvent::ScheduleUpdated(completed));

    assert!(client.take_refresh_request());
    // one-shot: reading clears it
    assert!(!client.take_refresh_request());

    // local copy already normalized while the re-poll is in flight
    let rendered = client.selected_schedule().unwrap();
    assert_eq!(rendered.status, ScheduleStatus::Completed);
    assert_eq!(rendered.progress_percentage, 100);
    assert!(rendered
        .stations
        .iter()
        .all(|s| s.status == StationStatus::Completed && s.completed_at.is_some()));
}

#[tokio::test]
async fn failed_action_call_discards_the_optimistic_overlay() {
    let hub = Arc::new(FanoutHub::new());
    let poll = StubPollSource::new(snapshot(vec![schedule(
        1,
        7,
        ScheduleStatus::InProgress,
        vec![station(10, 0, StationStatus::Pending)],
    )]));
    let mut client = mounted(&hub, Scope::Driver(7), poll, MemorySelectionStore::new()).await;

    client
        .apply_local_station_transition(1, 10, StationStatus::Arrived, Utc::now())
        .unwrap();
    assert_eq!(client.schedules()[0].stations[0].status, StationStatus::Arrived);

    // the start/update endpoint reported failure: roll the overlay back
    client.discard_local(1);
    assert_eq!(client.schedules()[0].stations[0].status, StationStatus::Pending);
}

#[tokio::test]
async fn illegal_local_transition_is_rejected_without_rendering() {
    let hub = Arc::new(FanoutHub::new());
    let poll = StubPollSource::new(snapshot(vec![schedule(
        1,
        7,
        ScheduleStatus::InProgress,
        vec![station(10, 0, StationStatus::Pending)],
    )]));
    let mut client = mounted(&hub, Scope::Driver(7), poll, MemorySelectionStore::new()).await;

    let result =
        client.apply_local_station_transition(1, 10, StationStatus::Completed, Utc::now());
    assert!(result.is_err());
    assert_eq!(client.schedules()[0].stations[0].status, StationStatus::Pending);
}

/// Full driver run over a three-station route, driven through the
/// reconciliation client's optimistic path
#[tokio::test]
async fn driver_completes_a_three_station_route() {
    let hub = Arc::new(FanoutHub::new());
    let poll = StubPollSource::new(snapshot(vec![schedule(
        1,
        7,
        ScheduleStatus::Pending,
        vec![
            station(10, 0, StationStatus::Pending),
            station(11, 1, StationStatus::Pending),
            station(12, 2, StationStatus::Pending),
        ],
    )]));
    let mut client = mounted(&hub, Scope::Driver(7), poll, MemorySelectionStore::new()).await;
    let now = Utc::now();

    client
        .apply_local_schedule_transition(1, ScheduleStatus::InProgress, now)
        .unwrap();
    assert_eq!(client.schedules()[0].status, ScheduleStatus::InProgress);

    // first two stations go through the full forward chain
    for station_id in [10, 11] {
        for target in [
            StationStatus::Arrived,
            StationStatus::Collecting,
            StationStatus::Completed,
            StationStatus::Departed,
        ] {
            client
                .apply_local_station_transition(1, station_id, target, now)
                .unwrap();
        }
        let rendered = client.schedules().remove(0);
        let active = crate::progress::select_active_station(&rendered.stations).unwrap();
        // after finishing a stop, the next pending one becomes active
        assert_eq!(active.id, station_id + 1);
    }

    // last station: after completed, the next action is Complete Route
    for target in [
        StationStatus::Arrived,
        StationStatus::Collecting,
        StationStatus::Completed,
    ] {
        client
            .apply_local_station_transition(1, 12, target, now)
            .unwrap();
    }
    let rendered = client.schedules().remove(0);
    let last = rendered.station(12).unwrap();
    let action = next_station_action(last, &rendered.stations).unwrap();
    assert_eq!(action, StationAction::CompleteRoute);
    assert_eq!(action.label(), "Complete Route");

    // which routes to the schedule-level completion
    client
        .apply_local_schedule_transition(1, ScheduleStatus::Completed, now)
        .unwrap();
    let done = client.schedules().remove(0);
    assert_eq!(done.status, ScheduleStatus::Completed);
    assert_eq!(done.progress_percentage, 100);
    assert_eq!(done.stations.len(), 3);
    assert!(done
        .stations
        .iter()
        .all(|s| s.status == StationStatus::Completed));
    // the final station never literally departed
    assert_eq!(done.station(12).unwrap().departed_at, None);
}
