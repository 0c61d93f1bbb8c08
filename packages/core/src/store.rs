//! Persistence seam for the monitor.
//!
//! [`RouteStore`] is everything the checker, scheduler and lifecycle
//! operations need from storage. Production uses the SQLite
//! [`RouteRepository`](crate::repository::RouteRepository); [`MemoryStore`]
//! keeps everything in process and backs the unit tests and ephemeral runs.
//!
//! All operations return the stored entity, or `None`/`false` when the
//! referenced row does not exist.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::monitor::error::StoreError;
use crate::monitor::types::{
    NewNotification, NewRoute, NewRouteHistory, Notification, Route, RouteHistory, RoutePatch,
    RouteStats, Settings, SettingsPatch,
};

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait RouteStore: Send + Sync {
    async fn create_route(&self, route: NewRoute) -> StoreResult<Route>;
    async fn get_route(&self, id: i64) -> StoreResult<Option<Route>>;
    async fn list_routes(&self) -> StoreResult<Vec<Route>>;
    async fn update_route(&self, id: i64, patch: RoutePatch) -> StoreResult<Option<Route>>;

    /// Write the outcome of a check cycle onto the route.
    async fn record_measurement(
        &self,
        id: i64,
        stats: RouteStats,
        checked_at: DateTime<Utc>,
    ) -> StoreResult<Option<Route>>;

    /// Delete a route and all of its history entries.
    async fn delete_route(&self, id: i64) -> StoreResult<bool>;

    async fn create_route_history(&self, entry: NewRouteHistory) -> StoreResult<RouteHistory>;

    /// History entries for a route, oldest first.
    async fn get_route_histories(&self, route_id: i64) -> StoreResult<Vec<RouteHistory>>;

    async fn create_notification(&self, entry: NewNotification) -> StoreResult<Notification>;

    /// All notifications, newest first.
    async fn list_notifications(&self) -> StoreResult<Vec<Notification>>;
    async fn delete_notification(&self, id: i64) -> StoreResult<bool>;

    /// Returns the number of notifications removed.
    async fn clear_notifications(&self) -> StoreResult<u64>;

    async fn get_settings(&self) -> StoreResult<Settings>;
    async fn update_settings(&self, patch: SettingsPatch) -> StoreResult<Settings>;
}

#[derive(Debug, Default)]
struct MemoryState {
    next_id: i64,
    routes: BTreeMap<i64, Route>,
    histories: Vec<RouteHistory>,
    notifications: Vec<Notification>,
    settings: Settings,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-process [`RouteStore`]. Ids are shared across tables and start at 1.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from the given settings instead of the defaults.
    pub fn with_settings(settings: Settings) -> Self {
        let store = Self::new();
        store.lock().settings = settings;
        store
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl RouteStore for MemoryStore {
    async fn create_route(&self, route: NewRoute) -> StoreResult<Route> {
        let mut state = self.lock();
        let id = state.next_id();
        let route = Route {
            id,
            name: route.name,
            source: route.source,
            destination: route.destination,
            interval: route.interval,
            is_active: route.is_active,
            is_saved: route.is_saved,
            last_checked: None,
            current_time: None,
            min_time: None,
            max_time: None,
            avg_time: None,
            change: None,
        };
        state.routes.insert(id, route.clone());
        Ok(route)
    }

    async fn get_route(&self, id: i64) -> StoreResult<Option<Route>> {
        Ok(self.lock().routes.get(&id).cloned())
    }

    async fn list_routes(&self) -> StoreResult<Vec<Route>> {
        Ok(self.lock().routes.values().cloned().collect())
    }

    async fn update_route(&self, id: i64, patch: RoutePatch) -> StoreResult<Option<Route>> {
        let mut state = self.lock();
        Ok(state.routes.get_mut(&id).map(|route| {
            patch.apply_to(route);
            route.clone()
        }))
    }

    async fn record_measurement(
        &self,
        id: i64,
        stats: RouteStats,
        checked_at: DateTime<Utc>,
    ) -> StoreResult<Option<Route>> {
        let mut state = self.lock();
        Ok(state.routes.get_mut(&id).map(|route| {
            route.current_time = Some(stats.current_time);
            route.min_time = Some(stats.min_time);
            route.max_time = Some(stats.max_time);
            route.avg_time = Some(stats.avg_time);
            route.change = stats.change;
            route.last_checked = Some(checked_at);
            route.clone()
        }))
    }

    async fn delete_route(&self, id: i64) -> StoreResult<bool> {
        let mut state = self.lock();
        let removed = state.routes.remove(&id).is_some();
        state.histories.retain(|h| h.route_id != id);
        Ok(removed)
    }

    async fn create_route_history(&self, entry: NewRouteHistory) -> StoreResult<RouteHistory> {
        let mut state = self.lock();
        let history = RouteHistory {
            id: state.next_id(),
            route_id: entry.route_id,
            timestamp: entry.timestamp,
            travel_time: entry.travel_time,
            change: entry.change,
        };
        state.histories.push(history.clone());
        Ok(history)
    }

    async fn get_route_histories(&self, route_id: i64) -> StoreResult<Vec<RouteHistory>> {
        let state = self.lock();
        let mut histories: Vec<RouteHistory> = state
            .histories
            .iter()
            .filter(|h| h.route_id == route_id)
            .cloned()
            .collect();
        histories.sort_by_key(|h| (h.timestamp, h.id));
        Ok(histories)
    }

    async fn create_notification(&self, entry: NewNotification) -> StoreResult<Notification> {
        let mut state = self.lock();
        let notification = Notification {
            id: state.next_id(),
            route_id: entry.route_id,
            timestamp: entry.timestamp,
            kind: entry.kind,
            message: entry.message,
            is_read: false,
        };
        state.notifications.push(notification.clone());
        Ok(notification)
    }

    async fn list_notifications(&self) -> StoreResult<Vec<Notification>> {
        let state = self.lock();
        let mut notifications = state.notifications.clone();
        notifications.sort_by(|a, b| (b.timestamp, b.id).cmp(&(a.timestamp, a.id)));
        Ok(notifications)
    }

    async fn delete_notification(&self, id: i64) -> StoreResult<bool> {
        let mut state = self.lock();
        let before = state.notifications.len();
        state.notifications.retain(|n| n.id != id);
        Ok(state.notifications.len() != before)
    }

    async fn clear_notifications(&self) -> StoreResult<u64> {
        let mut state = self.lock();
        let removed = state.notifications.len() as u64;
        state.notifications.clear();
        Ok(removed)
    }

    async fn get_settings(&self) -> StoreResult<Settings> {
        Ok(self.lock().settings.clone())
    }

    async fn update_settings(&self, patch: SettingsPatch) -> StoreResult<Settings> {
        let mut state = self.lock();
        patch.apply_to(&mut state.settings);
        Ok(state.settings.clone())
    }
}
