//! SQLite pool construction and schema setup.

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS routes (
        id           INTEGER PRIMARY KEY AUTOINCREMENT,
        name         TEXT    NOT NULL,
        source       TEXT    NOT NULL,
        destination  TEXT    NOT NULL,
        interval     INTEGER NOT NULL,
        is_active    INTEGER NOT NULL DEFAULT 1,
        is_saved     INTEGER NOT NULL DEFAULT 0,
        last_checked TEXT,
        current_minutes INTEGER,
        min_minutes     INTEGER,
        max_minutes     INTEGER,
        avg_minutes     INTEGER,
        change       INTEGER
    )",
    "CREATE TABLE IF NOT EXISTS route_histories (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        route_id    INTEGER NOT NULL REFERENCES routes(id) ON DELETE CASCADE,
        timestamp   TEXT    NOT NULL,
        travel_time INTEGER NOT NULL,
        change      INTEGER
    )",
    "CREATE INDEX IF NOT EXISTS idx_route_histories_route
        ON route_histories(route_id, timestamp)",
    "CREATE TABLE IF NOT EXISTS notifications (
        id        INTEGER PRIMARY KEY AUTOINCREMENT,
        route_id  INTEGER NOT NULL,
        timestamp TEXT    NOT NULL,
        kind      TEXT    NOT NULL,
        message   TEXT    NOT NULL,
        is_read   INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS settings (
        id                   INTEGER PRIMARY KEY CHECK (id = 1),
        api_key              TEXT,
        enable_notifications INTEGER NOT NULL DEFAULT 1,
        notification_type    TEXT    NOT NULL DEFAULT 'all',
        history_retention    INTEGER NOT NULL DEFAULT 30
    )",
    "INSERT OR IGNORE INTO settings (id) VALUES (1)",
];

/// Open (or create) the database at `database_url` and apply the schema.
///
/// `sqlite::memory:` databases live only as long as their connection, so
/// the pool is pinned to a single connection that never expires.
pub async fn create_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = if database_url.contains(":memory:") {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?
    } else {
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?
    };

    for statement in SCHEMA {
        sqlx::query(statement).execute(&pool).await?;
    }

    tracing::debug!("Database schema ready at {}", database_url);
    Ok(pool)
}
