//! Database repository for route monitoring persistence.
//!
//! All SQLite read/write logic lives here. [`RouteRepository`] implements
//! [`RouteStore`], so the checker and scheduler never see SQL.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings (microseconds,
//! `Z` suffix) so ordering by the text column is chronological.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::monitor::error::StoreError;
use crate::monitor::types::{
    NewNotification, NewRoute, NewRouteHistory, Notification, NotificationKind,
    NotificationPreference, Route, RouteHistory, RoutePatch, RouteStats, Settings, SettingsPatch,
};
use crate::store::{RouteStore, StoreResult};

const ROUTE_COLUMNS: &str = "id, name, source, destination, interval, is_active, is_saved,
     last_checked, current_minutes, min_minutes, max_minutes, avg_minutes, change";

/// Repository for reading and writing monitor data to SQLite.
#[derive(Clone)]
pub struct RouteRepository {
    pool: SqlitePool,
}

impl RouteRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(table: &'static str, raw: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|err| StoreError::corrupt(table, format!("bad timestamp '{}': {}", raw, err)))
}

fn route_from_row(row: &SqliteRow) -> StoreResult<Route> {
    let last_checked: Option<String> = row.try_get("last_checked")?;
    let last_checked = last_checked
        .as_deref()
        .map(|raw| parse_timestamp("routes", raw))
        .transpose()?;

    Ok(Route {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        source: row.try_get("source")?,
        destination: row.try_get("destination")?,
        interval: row.try_get("interval")?,
        is_active: row.try_get::<i64, _>("is_active")? != 0,
        is_saved: row.try_get::<i64, _>("is_saved")? != 0,
        last_checked,
        current_time: row.try_get("current_minutes")?,
        min_time: row.try_get("min_minutes")?,
        max_time: row.try_get("max_minutes")?,
        avg_time: row.try_get("avg_minutes")?,
        change: row.try_get("change")?,
    })
}

fn history_from_row(row: &SqliteRow) -> StoreResult<RouteHistory> {
    let timestamp: String = row.try_get("timestamp")?;
    Ok(RouteHistory {
        id: row.try_get("id")?,
        route_id: row.try_get("route_id")?,
        timestamp: parse_timestamp("route_histories", &timestamp)?,
        travel_time: row.try_get("travel_time")?,
        change: row.try_get("change")?,
    })
}

fn notification_from_row(row: &SqliteRow) -> StoreResult<Notification> {
    let timestamp: String = row.try_get("timestamp")?;
    let kind: String = row.try_get("kind")?;
    Ok(Notification {
        id: row.try_get("id")?,
        route_id: row.try_get("route_id")?,
        timestamp: parse_timestamp("notifications", &timestamp)?,
        kind: kind
            .parse::<NotificationKind>()
            .map_err(|err| StoreError::corrupt("notifications", err))?,
        message: row.try_get("message")?,
        is_read: row.try_get::<i64, _>("is_read")? != 0,
    })
}

fn settings_from_row(row: &SqliteRow) -> StoreResult<Settings> {
    let notification_type: String = row.try_get("notification_type")?;
    Ok(Settings {
        api_key: row.try_get("api_key")?,
        enable_notifications: row.try_get::<i64, _>("enable_notifications")? != 0,
        notification_type: notification_type
            .parse::<NotificationPreference>()
            .map_err(|err| StoreError::corrupt("settings", err))?,
        history_retention: row.try_get("history_retention")?,
    })
}

#[async_trait]
impl RouteStore for RouteRepository {
    // ---- Routes ----

    async fn create_route(&self, route: NewRoute) -> StoreResult<Route> {
        let result = sqlx::query(
            "INSERT INTO routes (name, source, destination, interval, is_active, is_saved)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&route.name)
        .bind(&route.source)
        .bind(&route.destination)
        .bind(route.interval)
        .bind(route.is_active as i64)
        .bind(route.is_saved as i64)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        self.get_route(id)
            .await?
            .ok_or_else(|| StoreError::corrupt("routes", format!("row {} vanished after insert", id)))
    }

    async fn get_route(&self, id: i64) -> StoreResult<Option<Route>> {
        let sql = format!("SELECT {} FROM routes WHERE id = ?", ROUTE_COLUMNS);
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(route_from_row).transpose()
    }

    async fn list_routes(&self) -> StoreResult<Vec<Route>> {
        let sql = format!("SELECT {} FROM routes ORDER BY id ASC", ROUTE_COLUMNS);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(route_from_row).collect()
    }

    async fn update_route(&self, id: i64, patch: RoutePatch) -> StoreResult<Option<Route>> {
        let Some(mut route) = self.get_route(id).await? else {
            return Ok(None);
        };
        patch.apply_to(&mut route);

        sqlx::query(
            "UPDATE routes
             SET name = ?, source = ?, destination = ?, interval = ?, is_active = ?, is_saved = ?
             WHERE id = ?",
        )
        .bind(&route.name)
        .bind(&route.source)
        .bind(&route.destination)
        .bind(route.interval)
        .bind(route.is_active as i64)
        .bind(route.is_saved as i64)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(Some(route))
    }

    async fn record_measurement(
        &self,
        id: i64,
        stats: RouteStats,
        checked_at: DateTime<Utc>,
    ) -> StoreResult<Option<Route>> {
        let result = sqlx::query(
            "UPDATE routes
             SET current_minutes = ?, min_minutes = ?, max_minutes = ?, avg_minutes = ?,
                 change = ?, last_checked = ?
             WHERE id = ?",
        )
        .bind(stats.current_time)
        .bind(stats.min_time)
        .bind(stats.max_time)
        .bind(stats.avg_time)
        .bind(stats.change)
        .bind(format_timestamp(checked_at))
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_route(id).await
    }

    async fn delete_route(&self, id: i64) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM route_histories WHERE route_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM routes WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    // ---- History ----

    async fn create_route_history(&self, entry: NewRouteHistory) -> StoreResult<RouteHistory> {
        let result = sqlx::query(
            "INSERT INTO route_histories (route_id, timestamp, travel_time, change)
             VALUES (?, ?, ?, ?)",
        )
        .bind(entry.route_id)
        .bind(format_timestamp(entry.timestamp))
        .bind(entry.travel_time)
        .bind(entry.change)
        .execute(&self.pool)
        .await?;

        Ok(RouteHistory {
            id: result.last_insert_rowid(),
            route_id: entry.route_id,
            timestamp: entry.timestamp,
            travel_time: entry.travel_time,
            change: entry.change,
        })
    }

    async fn get_route_histories(&self, route_id: i64) -> StoreResult<Vec<RouteHistory>> {
        let rows = sqlx::query(
            "SELECT id, route_id, timestamp, travel_time, change
             FROM route_histories
             WHERE route_id = ?
             ORDER BY timestamp ASC, id ASC",
        )
        .bind(route_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(history_from_row).collect()
    }

    // ---- Notifications ----

    async fn create_notification(&self, entry: NewNotification) -> StoreResult<Notification> {
        let result = sqlx::query(
            "INSERT INTO notifications (route_id, timestamp, kind, message)
             VALUES (?, ?, ?, ?)",
        )
        .bind(entry.route_id)
        .bind(format_timestamp(entry.timestamp))
        .bind(entry.kind.as_str())
        .bind(&entry.message)
        .execute(&self.pool)
        .await?;

        Ok(Notification {
            id: result.last_insert_rowid(),
            route_id: entry.route_id,
            timestamp: entry.timestamp,
            kind: entry.kind,
            message: entry.message,
            is_read: false,
        })
    }

    async fn list_notifications(&self) -> StoreResult<Vec<Notification>> {
        let rows = sqlx::query(
            "SELECT id, route_id, timestamp, kind, message, is_read
             FROM notifications
             ORDER BY timestamp DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(notification_from_row).collect()
    }

    async fn delete_notification(&self, id: i64) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn clear_notifications(&self) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM notifications")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    // ---- Settings ----

    async fn get_settings(&self) -> StoreResult<Settings> {
        let row = sqlx::query(
            "SELECT api_key, enable_notifications, notification_type, history_retention
             FROM settings WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => settings_from_row(&row),
            None => Ok(Settings::default()),
        }
    }

    async fn update_settings(&self, patch: SettingsPatch) -> StoreResult<Settings> {
        let mut settings = self.get_settings().await?;
        patch.apply_to(&mut settings);

        sqlx::query(
            "INSERT INTO settings (id, api_key, enable_notifications, notification_type, history_retention)
             VALUES (1, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                api_key = excluded.api_key,
                enable_notifications = excluded.enable_notifications,
                notification_type = excluded.notification_type,
                history_retention = excluded.history_retention",
        )
        .bind(&settings.api_key)
        .bind(settings.enable_notifications as i64)
        .bind(settings.notification_type.as_str())
        .bind(settings.history_retention)
        .execute(&self.pool)
        .await?;

        Ok(settings)
    }
}
