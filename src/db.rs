//! Sqlite persistence for schedules and their embedded station lists.
//!
//! Timestamps are stored as RFC 3339 TEXT and statuses as lowercase TEXT;
//! rows that fail to parse fall back to safe defaults with a warning rather
//! than poisoning a whole snapshot.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use std::collections::HashMap;

use crate::models::{Schedule, ScheduleStatus, Station, StationStatus};

#[derive(Debug, FromRow)]
struct ScheduleRow {
    id: i64,
    driver_id: i64,
    route_id: i64,
    status: String,
    started_at: Option<String>,
    completed_at: Option<String>,
    progress_percentage: i64,
    current_station: Option<String>,
    last_updated: String,
}

#[derive(Debug, FromRow)]
struct StationRow {
    id: i64,
    schedule_id: i64,
    name: String,
    latitude: f64,
    longitude: f64,
    sequence: i64,
    status: String,
    arrived_at: Option<String>,
    completed_at: Option<String>,
    departed_at: Option<String>,
}

fn parse_ts(value: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = value?;
    match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => Some(dt.with_timezone(&Utc)),
        Err(e) => {
            tracing::warn!(raw, "Ignoring unparseable timestamp: {e}");
            None
        }
    }
}

fn fmt_ts(value: Option<DateTime<Utc>>) -> Option<String> {
    value.map(|dt| dt.to_rfc3339())
}

impl StationRow {
    fn into_station(self) -> Station {
        let status = StationStatus::parse(&self.status).unwrap_or_else(|| {
            tracing::warn!(station_id = self.id, status = %self.status, "Unknown station status, treating as pending");
            StationStatus::Pending
        });
        Station {
            id: self.id,
            name: self.name,
            latitude: self.latitude,
            longitude: self.longitude,
            order: self.sequence,
            status,
            arrived_at: parse_ts(self.arrived_at.as_deref()),
            completed_at: parse_ts(self.completed_at.as_deref()),
            departed_at: parse_ts(self.departed_at.as_deref()),
        }
    }
}

impl ScheduleRow {
    fn into_schedule(self, stations: Vec<Station>) -> Schedule {
        let status = ScheduleStatus::parse(&self.status).unwrap_or_else(|| {
            tracing::warn!(schedule_id = self.id, status = %self.status, "Unknown schedule status, treating as pending");
            ScheduleStatus::Pending
        });
        Schedule {
            id: self.id,
            driver_id: self.driver_id,
            route_id: self.route_id,
            status,
            stations,
            started_at: parse_ts(self.started_at.as_deref()),
            completed_at: parse_ts(self.completed_at.as_deref()),
            progress_percentage: self.progress_percentage.clamp(0, 100) as u8,
            current_station: self.current_station,
            last_updated: parse_ts(Some(&self.last_updated)).unwrap_or_else(Utc::now),
        }
    }
}

/// Load all schedules with their ordered station lists embedded, optionally
/// scoped to one driver
pub async fn load_schedules(
    pool: &SqlitePool,
    driver_id: Option<i64>,
) -> Result<Vec<Schedule>, sqlx::Error> {
    let schedule_rows: Vec<ScheduleRow> = match driver_id {
        Some(driver_id) => {
            sqlx::query_as("SELECT * FROM schedules WHERE driver_id = ? ORDER BY id")
                .bind(driver_id)
                .fetch_all(pool)
                .await?
        }
        None => {
            sqlx::query_as("SELECT * FROM schedules ORDER BY id")
                .fetch_all(pool)
                .await?
        }
    };

    let station_rows: Vec<StationRow> =
        sqlx::query_as("SELECT * FROM stations ORDER BY schedule_id, sequence")
            .fetch_all(pool)
            .await?;

    let mut by_schedule: HashMap<i64, Vec<Station>> = HashMap::new();
    for row in station_rows {
        by_schedule
            .entry(row.schedule_id)
            .or_default()
            .push(row.into_station());
    }

    Ok(schedule_rows
        .into_iter()
        .map(|row| {
            let stations = by_schedule.remove(&row.id).unwrap_or_default();
            row.into_schedule(stations)
        })
        .collect())
}

pub async fn load_schedule(pool: &SqlitePool, id: i64) -> Result<Option<Schedule>, sqlx::Error> {
    let row: Option<ScheduleRow> = sqlx::query_as("SELECT * FROM schedules WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    let Some(row) = row else {
        return Ok(None);
    };

    let station_rows: Vec<StationRow> =
        sqlx::query_as("SELECT * FROM stations WHERE schedule_id = ? ORDER BY sequence")
            .bind(id)
            .fetch_all(pool)
            .await?;

    Ok(Some(row.into_schedule(
        station_rows.into_iter().map(StationRow::into_station).collect(),
    )))
}

/// Persist schedule-level fields (not the station rows)
pub async fn update_schedule(pool: &SqlitePool, schedule: &Schedule) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE schedules
        SET status = ?, started_at = ?, completed_at = ?,
            progress_percentage = ?, current_station = ?, last_updated = ?
        WHERE id = ?
        "#,
    )
    .bind(schedule.status.as_str())
    .bind(fmt_ts(schedule.started_at))
    .bind(fmt_ts(schedule.completed_at))
    .bind(schedule.progress_percentage as i64)
    .bind(&schedule.current_station)
    .bind(schedule.last_updated.to_rfc3339())
    .bind(schedule.id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Persist one station's lifecycle fields
pub async fn update_station(
    pool: &SqlitePool,
    schedule_id: i64,
    station: &Station,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE stations
        SET status = ?, arrived_at = ?, completed_at = ?, departed_at = ?
        WHERE id = ? AND schedule_id = ?
        "#,
    )
    .bind(station.status.as_str())
    .bind(fmt_ts(station.arrived_at))
    .bind(fmt_ts(station.completed_at))
    .bind(fmt_ts(station.departed_at))
    .bind(station.id)
    .bind(schedule_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Persist a schedule together with every station row, atomically. Used by
/// the completion path, where the normalizer touches all stations at once.
pub async fn update_schedule_with_stations(
    pool: &SqlitePool,
    schedule: &Schedule,
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    sqlx::query(
        r#"
        UPDATE schedules
        SET status = ?, started_at = ?, completed_at = ?,
            progress_percentage = ?, current_station = ?, last_updated = ?
        WHERE id = ?
        "#,
    )
    .bind(schedule.status.as_str())
    .bind(fmt_ts(schedule.started_at))
    .bind(fmt_ts(schedule.completed_at))
    .bind(schedule.progress_percentage as i64)
    .bind(&schedule.current_station)
    .bind(schedule.last_updated.to_rfc3339())
    .bind(schedule.id)
    .execute(&mut *tx)
    .await?;

    for station in &schedule.stations {
        sqlx::query(
            r#"
            UPDATE stations
            SET status = ?, arrived_at = ?, completed_at = ?, departed_at = ?
            WHERE id = ? AND schedule_id = ?
            "#,
        )
        .bind(station.status.as_str())
        .bind(fmt_ts(station.arrived_at))
        .bind(fmt_ts(station.completed_at))
        .bind(fmt_ts(station.departed_at))
        .bind(station.id)
        .bind(schedule.id)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await
}

/// Create a pending schedule with its ordered stations. Route assignment
/// itself is plain record CRUD; this exists for seeding and tests.
pub async fn insert_schedule(
    pool: &SqlitePool,
    driver_id: i64,
    route_id: i64,
    stations: &[(String, f64, f64)],
) -> Result<i64, sqlx::Error> {
    let mut tx = pool.begin().await?;
    let result = sqlx::query(
        "INSERT INTO schedules (driver_id, route_id, status, last_updated) VALUES (?, ?, 'pending', ?)",
    )
    .bind(driver_id)
    .bind(route_id)
    .bind(Utc::now().to_rfc3339())
    .execute(&mut *tx)
    .await?;
    let schedule_id = result.last_insert_rowid();

    for (sequence, (name, latitude, longitude)) in stations.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO stations (schedule_id, name, latitude, longitude, sequence, status)
            VALUES (?, ?, ?, ?, ?, 'pending')
            "#,
        )
        .bind(schedule_id)
        .bind(name)
        .bind(latitude)
        .bind(longitude)
        .bind(sequence as i64)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(schedule_id)
}
