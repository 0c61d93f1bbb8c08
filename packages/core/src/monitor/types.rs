//! Core data types for route monitoring

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Allowed range for a route's check interval, in minutes.
pub const MIN_INTERVAL_MINUTES: i64 = 1;
pub const MAX_INTERVAL_MINUTES: i64 = 60;

/// A monitored origin/destination pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub id: i64,
    pub name: String,
    pub source: String,
    pub destination: String,
    /// Check cadence in minutes (1–60).
    pub interval: i64,
    pub is_active: bool,
    pub is_saved: bool,
    pub last_checked: Option<DateTime<Utc>>,
    pub current_time: Option<i64>,
    pub min_time: Option<i64>,
    pub max_time: Option<i64>,
    pub avg_time: Option<i64>,
    /// Delta vs. the previous check; `None` until the first check.
    pub change: Option<i64>,
}

/// Fields accepted when creating a route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRoute {
    pub name: String,
    pub source: String,
    pub destination: String,
    pub interval: i64,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_saved: bool,
}

fn default_true() -> bool {
    true
}

/// Partial user-facing update of a route.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutePatch {
    pub name: Option<String>,
    pub source: Option<String>,
    pub destination: Option<String>,
    pub interval: Option<i64>,
    pub is_active: Option<bool>,
    pub is_saved: Option<bool>,
}

impl RoutePatch {
    /// Apply this patch on top of an existing route.
    pub fn apply_to(&self, route: &mut Route) {
        if let Some(name) = &self.name {
            route.name = name.clone();
        }
        if let Some(source) = &self.source {
            route.source = source.clone();
        }
        if let Some(destination) = &self.destination {
            route.destination = destination.clone();
        }
        if let Some(interval) = self.interval {
            route.interval = interval;
        }
        if let Some(is_active) = self.is_active {
            route.is_active = is_active;
        }
        if let Some(is_saved) = self.is_saved {
            route.is_saved = is_saved;
        }
    }
}

/// Running statistics produced by the aggregator for one measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteStats {
    pub current_time: i64,
    pub min_time: i64,
    pub max_time: i64,
    pub avg_time: i64,
    pub change: Option<i64>,
}

/// Append-only measurement log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteHistory {
    pub id: i64,
    pub route_id: i64,
    pub timestamp: DateTime<Utc>,
    pub travel_time: i64,
    pub change: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRouteHistory {
    pub route_id: i64,
    pub timestamp: DateTime<Utc>,
    pub travel_time: i64,
    pub change: Option<i64>,
}

/// Kind of a user-visible notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    New,
    Increase,
    Decrease,
    Unchanged,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::New => "new",
            NotificationKind::Increase => "increase",
            NotificationKind::Decrease => "decrease",
            NotificationKind::Unchanged => "unchanged",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(NotificationKind::New),
            "increase" => Ok(NotificationKind::Increase),
            "decrease" => Ok(NotificationKind::Decrease),
            "unchanged" => Ok(NotificationKind::Unchanged),
            other => Err(format!("Invalid notification kind: {}", other)),
        }
    }
}

/// User-visible event record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub route_id: i64,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub message: String,
    pub is_read: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub route_id: i64,
    pub timestamp: DateTime<Utc>,
    pub kind: NotificationKind,
    pub message: String,
}

/// Which changes the user wants to hear about.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationPreference {
    #[default]
    All,
    Significant,
    Increase,
}

impl NotificationPreference {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationPreference::All => "all",
            NotificationPreference::Significant => "significant",
            NotificationPreference::Increase => "increase",
        }
    }
}

impl FromStr for NotificationPreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(NotificationPreference::All),
            "significant" => Ok(NotificationPreference::Significant),
            "increase" => Ok(NotificationPreference::Increase),
            other => Err(format!("Invalid notification type: {}", other)),
        }
    }
}

/// Process-wide monitoring configuration (singleton).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub api_key: Option<String>,
    pub enable_notifications: bool,
    pub notification_type: NotificationPreference,
    /// Days of history to keep. Advisory only.
    pub history_retention: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: None,
            enable_notifications: true,
            notification_type: NotificationPreference::All,
            history_retention: 30,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsPatch {
    pub api_key: Option<String>,
    pub enable_notifications: Option<bool>,
    pub notification_type: Option<NotificationPreference>,
    pub history_retention: Option<i64>,
}

impl SettingsPatch {
    pub fn apply_to(&self, settings: &mut Settings) {
        if let Some(api_key) = &self.api_key {
            settings.api_key = Some(api_key.clone());
        }
        if let Some(enabled) = self.enable_notifications {
            settings.enable_notifications = enabled;
        }
        if let Some(kind) = self.notification_type {
            settings.notification_type = kind;
        }
        if let Some(days) = self.history_retention {
            settings.history_retention = days;
        }
    }
}

/// Outcome of a single policy evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationDecision {
    pub kind: NotificationKind,
    pub should_emit: bool,
}

/// A successful travel-time measurement from a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TravelTime {
    pub duration_minutes: i64,
    pub duration_text: String,
    pub distance_text: String,
}

/// Everything one check cycle produced.
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub route: Route,
    pub history: RouteHistory,
    pub notification: Option<Notification>,
}
