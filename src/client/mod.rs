//! Per-viewer reconciliation of poll snapshots and push events.
//!
//! Each viewing session (driver tracker, admin monitoring, resident view)
//! owns one [`ReconciliationClient`] holding the last-confirmed schedule
//! list for its scope, an optimistic overlay of unconfirmed local
//! transitions, and a persisted selected-schedule pointer. Poll responses
//! fully supersede confirmed state per schedule; push events merge
//! field-wise. The client never assumes the network layer is reliable:
//! every merge is re-derivable from the next full poll.

pub mod channel;
pub mod error;
pub mod overlay;
pub mod poll;
pub mod selection;

pub use channel::{ChannelClient, LocalChannelClient};
pub use error::ClientError;
pub use poll::{HttpPollSource, PollSource};
pub use selection::{JsonFileSelectionStore, MemorySelectionStore, SelectionStore};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::engine::{self, TransitionError};
use crate::fanout::{Scope, TrackingEvent};
use crate::models::{Schedule, ScheduleSnapshot, ScheduleStatus, Station, StationStatus};
use crate::progress;

use overlay::Overlay;

/// Default interval between full snapshot polls
pub const DEFAULT_POLL_INTERVAL: std::time::Duration = std::time::Duration::from_secs(30);

pub struct ReconciliationClient<C, P, S>
where
    C: ChannelClient,
    P: PollSource,
    S: SelectionStore,
{
    scope: Scope,
    channel: C,
    poll_source: P,
    selection: S,
    poll_interval: std::time::Duration,
    /// Last-confirmed server state, normalized, sorted by id
    schedules: Vec<Schedule>,
    overlay: Overlay,
    selected: Option<i64>,
    events: Option<broadcast::Receiver<TrackingEvent>>,
    /// Timestamp of the last applied snapshot; older in-flight responses
    /// are discarded
    snapshot_at: Option<DateTime<Utc>>,
    selection_restored: bool,
    refresh_requested: bool,
}

impl<C, P, S> ReconciliationClient<C, P, S>
where
    C: ChannelClient,
    P: PollSource,
    S: SelectionStore,
{
    pub fn new(scope: Scope, channel: C, poll_source: P, selection: S) -> Self {
        Self {
            scope,
            channel,
            poll_source,
            selection,
            poll_interval: DEFAULT_POLL_INTERVAL,
            schedules: Vec::new(),
            overlay: Overlay::default(),
            selected: None,
            events: None,
            snapshot_at: None,
            selection_restored: false,
            refresh_requested: false,
        }
    }

    pub fn with_poll_interval(mut self, interval: std::time::Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Connect, join the scope and load the initial snapshot. A failed
    /// initial poll is logged and retried on the next timer tick; the
    /// session starts empty rather than failing.
    pub async fn mount(&mut self) -> Result<(), ClientError> {
        self.channel.connect()?;
        self.subscribe()?;
        if let Err(e) = self.refresh().await {
            tracing::warn!(scope = %self.scope, "Initial poll failed, starting empty: {e}");
        }
        Ok(())
    }

    /// Join the scope. A second call while already joined is a no-op, so a
    /// re-entered view never accumulates duplicate listeners.
    pub fn subscribe(&mut self) -> Result<(), ClientError> {
        if self.events.is_none() {
            self.events = Some(self.channel.subscribe(&self.scope)?);
        }
        Ok(())
    }

    /// Leave the scope and tear the channel down. Runs on every unmount
    /// path, including error paths; idempotent.
    pub fn unmount(&mut self) {
        self.events = None;
        self.channel.unsubscribe(&self.scope);
        self.channel.disconnect();
    }

    /// Fetch and apply a full snapshot
    pub async fn refresh(&mut self) -> Result<(), ClientError> {
        let snapshot = self.poll_source.fetch_snapshot().await?;
        self.apply_snapshot(snapshot);
        Ok(())
    }

    /// Apply a poll response: full overwrite per schedule, not a field merge
    pub fn apply_snapshot(&mut self, snapshot: ScheduleSnapshot) {
        if let Some(applied) = self.snapshot_at {
            if snapshot.last_updated < applied {
                tracing::debug!(scope = %self.scope, "Discarding stale poll response");
                return;
            }
        }
        let now = Utc::now();
        let selected_before = self.selected_status();

        let mut schedules: Vec<Schedule> = snapshot
            .schedules
            .iter()
            .map(|s| progress::normalize(s, now))
            .collect();
        schedules.sort_by_key(|s| s.id);
        self.schedules = schedules;
        self.snapshot_at = Some(snapshot.last_updated);

        self.overlay.reconcile(&self.schedules);
        self.restore_selection();
        self.note_selected_completion(selected_before);
    }

    /// Merge one push event. Events referencing a schedule or station not
    /// present locally are dropped; the next poll reconciles.
    pub fn handle_event(&mut self, event: TrackingEvent) {
        let now = Utc::now();
        let selected_before = self.selected_status();

        match event {
            TrackingEvent::ScheduleUpdated(payload) => {
                let Some(slot) = self.schedules.iter_mut().find(|s| s.id == payload.id) else {
                    tracing::debug!(schedule_id = payload.id, "Dropping update for unknown schedule");
                    return;
                };
                *slot = progress::normalize(&payload, now);
            }
            TrackingEvent::StationUpdated(update) => {
                let Some(schedule) = self
                    .schedules
                    .iter_mut()
                    .find(|s| s.id == update.schedule_id)
                else {
                    tracing::debug!(
                        schedule_id = update.schedule_id,
                        "Dropping station update for unknown schedule"
                    );
                    return;
                };
                let Some(station) = schedule.station(update.station.id) else {
                    tracing::debug!(
                        schedule_id = update.schedule_id,
                        station_id = update.station.id,
                        "Dropping update for unknown station"
                    );
                    return;
                };
                let merged = station.apply_patch(&update.station);
                *schedule = progress::normalize(&schedule.with_station(merged), now);
            }
        }

        self.overlay.reconcile(&self.schedules);
        self.note_selected_completion(selected_before);
    }

    /// Drain and merge push events already delivered, without blocking.
    /// Cooperative alternative to [`Self::run`] for callers driving their
    /// own UI loop.
    pub fn process_pending_events(&mut self) {
        loop {
            let next = match self.events.as_mut() {
                Some(rx) => rx.try_recv(),
                None => break,
            };
            match next {
                Ok(event) => self.handle_event(event),
                Err(broadcast::error::TryRecvError::Empty) => break,
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(scope = %self.scope, skipped, "Push channel lagged");
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    self.events = None;
                    break;
                }
            }
        }
    }

    /// Run the session loop: periodic polls interleaved with push events,
    /// until cancelled by dropping the future
    pub async fn run(&mut self) {
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // mount already loaded the first snapshot
        interval.tick().await;

        loop {
            enum Step {
                Poll,
                Event(TrackingEvent),
                Lagged,
                Closed,
            }

            let step = match self.events.as_mut() {
                Some(rx) => {
                    tokio::select! {
                        _ = interval.tick() => Step::Poll,
                        result = rx.recv() => match result {
                            Ok(event) => Step::Event(event),
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                tracing::warn!(scope = %self.scope, skipped, "Push channel lagged");
                                Step::Lagged
                            }
                            Err(broadcast::error::RecvError::Closed) => Step::Closed,
                        },
                    }
                }
                None => {
                    interval.tick().await;
                    Step::Poll
                }
            };

            match step {
                Step::Poll => {
                    if let Err(e) = self.refresh().await {
                        // transient; retried on the next tick
                        tracing::warn!(scope = %self.scope, "Poll failed: {e}");
                    }
                }
                Step::Event(event) => self.handle_event(event),
                // dropped events are covered by the next poll
                Step::Lagged => {}
                Step::Closed => {
                    tracing::warn!(scope = %self.scope, "Push channel closed, polling only");
                    self.events = None;
                }
            }

            if self.take_refresh_request() {
                if let Err(e) = self.refresh().await {
                    tracing::warn!(scope = %self.scope, "Forced refresh failed: {e}");
                }
            }
        }
    }

    /// Rendered schedule list: confirmed state with the optimistic overlay
    /// applied, every schedule terminally consistent
    pub fn schedules(&self) -> Vec<Schedule> {
        let now = Utc::now();
        self.overlay
            .apply(&self.schedules)
            .iter()
            .map(|s| progress::normalize(s, now))
            .collect()
    }

    pub fn selected_id(&self) -> Option<i64> {
        self.selected
    }

    pub fn selected_schedule(&self) -> Option<Schedule> {
        let id = self.selected?;
        self.schedules().into_iter().find(|s| s.id == id)
    }

    /// Change the selection pointer, persisting it for the next session
    pub fn select(&mut self, id: i64) -> bool {
        if !self.schedules.iter().any(|s| s.id == id) {
            return false;
        }
        if self.selected != Some(id) {
            self.selected = Some(id);
            self.selection.set(&self.scope.channel_name(), id);
        }
        true
    }

    /// Validate and queue a driver station transition so it renders
    /// immediately; the server confirmation later retires it. On action-call
    /// failure the caller discards the schedule's overlay.
    pub fn apply_local_station_transition(
        &mut self,
        schedule_id: i64,
        station_id: i64,
        target: StationStatus,
        now: DateTime<Utc>,
    ) -> Result<Station, TransitionError> {
        let rendered = self.schedules();
        let station = rendered
            .iter()
            .find(|s| s.id == schedule_id)
            .and_then(|s| s.station(station_id))
            .ok_or_else(|| {
                TransitionError::Precondition(format!(
                    "No station {station_id} in schedule {schedule_id}"
                ))
            })?;
        let next = engine::apply_station_transition(station, target, now)?;
        self.overlay.push_station(schedule_id, next.clone());
        Ok(next)
    }

    /// Validate and queue a driver schedule transition (start / complete /
    /// abort)
    pub fn apply_local_schedule_transition(
        &mut self,
        schedule_id: i64,
        target: ScheduleStatus,
        now: DateTime<Utc>,
    ) -> Result<Schedule, TransitionError> {
        let rendered = self.schedules();
        let schedule = rendered
            .iter()
            .find(|s| s.id == schedule_id)
            .ok_or_else(|| {
                TransitionError::Precondition(format!("No schedule {schedule_id}"))
            })?;
        let next = engine::apply_schedule_transition(schedule, target, now)?;
        self.overlay.push_schedule(next.clone());
        Ok(next)
    }

    /// Drop unconfirmed local transitions for one schedule (the action call
    /// they were contingent on did not take effect)
    pub fn discard_local(&mut self, schedule_id: i64) {
        self.overlay.clear_schedule(schedule_id);
    }

    /// Whether a one-shot out-of-band poll has been requested; reading
    /// clears the request
    pub fn take_refresh_request(&mut self) -> bool {
        std::mem::take(&mut self.refresh_requested)
    }

    fn selected_status(&self) -> Option<ScheduleStatus> {
        let id = self.selected?;
        self.schedules.iter().find(|s| s.id == id).map(|s| s.status)
    }

    /// The selected schedule flipping to completed forces one immediate
    /// re-poll; the local copy is already normalized so the UI never shows
    /// a lagging partial state in the meantime
    fn note_selected_completion(&mut self, before: Option<ScheduleStatus>) {
        let after = self.selected_status();
        if after == Some(ScheduleStatus::Completed) && before != Some(ScheduleStatus::Completed) {
            self.refresh_requested = true;
        }
    }

    fn restore_selection(&mut self) {
        fn exists(schedules: &[Schedule], id: i64) -> bool {
            schedules.iter().any(|s| s.id == id)
        }

        if !self.selection_restored {
            self.selection_restored = true;
            let persisted = self.selection.get(&self.scope.channel_name());
            self.selected = persisted.filter(|id| exists(&self.schedules, *id));
        }
        let still_valid = self.selected.is_some_and(|id| exists(&self.schedules, id));
        if !still_valid {
            self.selected = self.schedules.first().map(|s| s.id);
            if let Some(id) = self.selected {
                self.selection.set(&self.scope.channel_name(), id);
            }
        }
    }
}

impl<C, P, S> Drop for ReconciliationClient<C, P, S>
where
    C: ChannelClient,
    P: PollSource,
    S: SelectionStore,
{
    fn drop(&mut self) {
        self.unmount();
    }
}

#[cfg(test)]
mod tests;
