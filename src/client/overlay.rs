use crate::models::{Schedule, ScheduleStatus, Station, StationStatus};

fn schedule_rank(status: ScheduleStatus) -> u8 {
    match status {
        ScheduleStatus::Pending => 0,
        ScheduleStatus::InProgress => 1,
        ScheduleStatus::Completed => 2,
        ScheduleStatus::Failed => 3,
    }
}

#[derive(Debug, Clone)]
struct StationOverlay {
    schedule_id: i64,
    station: Station,
}

#[derive(Debug, Clone)]
struct ScheduleOverlay {
    schedule_id: i64,
    schedule: Schedule,
}

/// Queue of locally-applied-but-unconfirmed transitions, rendered over the
/// last-confirmed server state.
///
/// Rendering never regresses progress a queued transition already advanced
/// past; a confirmation at equal-or-later progress retires the entry, and a
/// `failed` confirmation clears the schedule's overlay entirely so the more
/// authoritative terminal state wins.
#[derive(Debug, Default)]
pub struct Overlay {
    stations: Vec<StationOverlay>,
    schedules: Vec<ScheduleOverlay>,
}

impl Overlay {
    pub fn is_empty(&self) -> bool {
        self.stations.is_empty() && self.schedules.is_empty()
    }

    /// Queue an optimistic station value; a later action on the same station
    /// supersedes the earlier entry
    pub fn push_station(&mut self, schedule_id: i64, station: Station) {
        self.stations
            .retain(|o| !(o.schedule_id == schedule_id && o.station.id == station.id));
        self.stations.push(StationOverlay {
            schedule_id,
            station,
        });
    }

    /// Queue an optimistic schedule value (start / complete / fail)
    pub fn push_schedule(&mut self, schedule: Schedule) {
        self.schedules.retain(|o| o.schedule_id != schedule.id);
        self.schedules.push(ScheduleOverlay {
            schedule_id: schedule.id,
            schedule,
        });
    }

    /// Drop every queued transition for one schedule, deferring entirely to
    /// server state (action-call failure or authoritative conflict)
    pub fn clear_schedule(&mut self, schedule_id: i64) {
        self.stations.retain(|o| o.schedule_id != schedule_id);
        self.schedules.retain(|o| o.schedule_id != schedule_id);
    }

    /// Retire entries the confirmed state has caught up with (or overruled)
    pub fn reconcile(&mut self, confirmed: &[Schedule]) {
        let failed_schedules: Vec<i64> = confirmed
            .iter()
            .filter(|s| s.status == ScheduleStatus::Failed)
            .map(|s| s.id)
            .collect();
        for id in failed_schedules {
            self.clear_schedule(id);
        }

        self.schedules.retain(|o| match find(confirmed, o.schedule_id) {
            Some(server) => schedule_rank(server.status) < schedule_rank(o.schedule.status),
            // schedule gone from the snapshot: nothing left to overlay
            None => false,
        });

        self.stations.retain(|o| {
            let Some(server) = find(confirmed, o.schedule_id) else {
                return false;
            };
            match server.station(o.station.id) {
                Some(station) => {
                    station.status != StationStatus::Failed
                        && station.status.rank() < o.station.status.rank()
                }
                None => false,
            }
        });
    }

    /// Render the overlay onto confirmed state, producing replacement values
    pub fn apply(&self, confirmed: &[Schedule]) -> Vec<Schedule> {
        confirmed
            .iter()
            .map(|server| {
                let mut rendered = server.clone();

                if server.status != ScheduleStatus::Failed {
                    if let Some(o) = self
                        .schedules
                        .iter()
                        .find(|o| o.schedule_id == server.id)
                    {
                        if schedule_rank(server.status) < schedule_rank(o.schedule.status) {
                            rendered = o.schedule.clone();
                        }
                    }
                }

                for o in self.stations.iter().filter(|o| o.schedule_id == server.id) {
                    let behind = rendered.station(o.station.id).is_some_and(|s| {
                        s.status != StationStatus::Failed
                            && s.status.rank() < o.station.status.rank()
                    });
                    if behind {
                        rendered = rendered.with_station(o.station.clone());
                    }
                }
                rendered
            })
            .collect()
    }
}

fn find(schedules: &[Schedule], id: i64) -> Option<&Schedule> {
    schedules.iter().find(|s| s.id == id)
}
