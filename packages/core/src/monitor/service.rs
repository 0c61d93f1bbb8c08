//! Route Monitor - the outward lifecycle operations.
//!
//! Every mutation is applied to the store first and then mirrored into
//! the [`RouteScheduler`], so a route's timer always reflects its stored
//! `is_active` flag and `interval`.

use std::sync::Arc;

use crate::monitor::checker::RouteChecker;
use crate::monitor::error::MonitorError;
use crate::monitor::types::{
    CheckResult, NewRoute, Notification, Route, RouteHistory, RoutePatch, Settings,
    SettingsPatch, MAX_INTERVAL_MINUTES, MIN_INTERVAL_MINUTES,
};
use crate::scheduler::RouteScheduler;
use crate::store::RouteStore;

#[derive(Clone)]
pub struct RouteMonitor {
    store: Arc<dyn RouteStore>,
    checker: Arc<RouteChecker>,
    scheduler: Arc<RouteScheduler>,
}

impl RouteMonitor {
    pub fn new(
        store: Arc<dyn RouteStore>,
        checker: Arc<RouteChecker>,
        scheduler: Arc<RouteScheduler>,
    ) -> Self {
        Self {
            store,
            checker,
            scheduler,
        }
    }

    pub fn scheduler(&self) -> &Arc<RouteScheduler> {
        &self.scheduler
    }

    /// Create a route. Active routes are scheduled and measured once
    /// straight away; a failed first check is logged and does not undo
    /// the creation.
    pub async fn create_route(&self, new_route: NewRoute) -> Result<Route, MonitorError> {
        let new_route = NewRoute {
            name: required("name", &new_route.name)?,
            source: required("source", &new_route.source)?,
            destination: required("destination", &new_route.destination)?,
            ..new_route
        };
        validate_interval(new_route.interval)?;

        let route = self.store.create_route(new_route).await?;
        tracing::info!(route_id = route.id, name = %route.name, "Route created");

        if !route.is_active {
            return Ok(route);
        }

        self.scheduler.schedule(route.id).await?;
        if let Err(err) = self.checker.check_route(route.id).await {
            tracing::warn!(route_id = route.id, "Initial check failed: {}", err);
        }

        self.get_route(route.id).await
    }

    /// Apply a partial update and bring the route's timer in line with it.
    ///
    /// Any change to `is_active` or `interval` goes through a single
    /// [`RouteScheduler::schedule`] call, which re-reads the stored route
    /// under the timer lock. Racing updates therefore always leave the timer
    /// matching whatever was written last. Changing the interval restarts
    /// the timer but does not force a check.
    pub async fn update_route(&self, id: i64, patch: RoutePatch) -> Result<Route, MonitorError> {
        let patch = RoutePatch {
            name: patch.name.as_deref().map(|v| required("name", v)).transpose()?,
            source: patch.source.as_deref().map(|v| required("source", v)).transpose()?,
            destination: patch
                .destination
                .as_deref()
                .map(|v| required("destination", v))
                .transpose()?,
            ..patch
        };
        if let Some(interval) = patch.interval {
            validate_interval(interval)?;
        }

        let reschedule = patch.is_active.is_some() || patch.interval.is_some();
        let updated = self
            .store
            .update_route(id, patch)
            .await?
            .ok_or(MonitorError::NotFound(id))?;

        if reschedule {
            self.scheduler.schedule(id).await?;
        }

        tracing::info!(route_id = id, is_active = updated.is_active, interval = updated.interval, "Route updated");
        Ok(updated)
    }

    /// Stop monitoring and delete the route together with its history.
    pub async fn delete_route(&self, id: i64) -> Result<(), MonitorError> {
        self.scheduler.unschedule(id).await;

        if !self.store.delete_route(id).await? {
            return Err(MonitorError::NotFound(id));
        }
        self.checker.forget_route(id);
        tracing::info!(route_id = id, "Route deleted");
        Ok(())
    }

    /// Run a check cycle now, outside the route's schedule.
    pub async fn check_now(&self, id: i64) -> Result<CheckResult, MonitorError> {
        self.checker.check_route(id).await
    }

    pub async fn list_routes(&self) -> Result<Vec<Route>, MonitorError> {
        Ok(self.store.list_routes().await?)
    }

    pub async fn get_route(&self, id: i64) -> Result<Route, MonitorError> {
        self.store
            .get_route(id)
            .await?
            .ok_or(MonitorError::NotFound(id))
    }

    /// Measurement log for a route, oldest first.
    pub async fn route_histories(&self, id: i64) -> Result<Vec<RouteHistory>, MonitorError> {
        self.get_route(id).await?;
        Ok(self.store.get_route_histories(id).await?)
    }

    pub async fn list_notifications(&self) -> Result<Vec<Notification>, MonitorError> {
        Ok(self.store.list_notifications().await?)
    }

    /// Marking a notification read removes it. Returns whether it existed.
    pub async fn mark_notification_read(&self, id: i64) -> Result<bool, MonitorError> {
        Ok(self.store.delete_notification(id).await?)
    }

    pub async fn clear_notifications(&self) -> Result<u64, MonitorError> {
        let removed = self.store.clear_notifications().await?;
        tracing::info!(removed, "Notifications cleared");
        Ok(removed)
    }

    pub async fn settings(&self) -> Result<Settings, MonitorError> {
        Ok(self.store.get_settings().await?)
    }

    pub async fn update_settings(&self, patch: SettingsPatch) -> Result<Settings, MonitorError> {
        if let Some(days) = patch.history_retention {
            if days < 1 {
                return Err(MonitorError::InvalidSettings(format!(
                    "history_retention must be at least 1 day, got {}",
                    days
                )));
            }
        }
        let patch = SettingsPatch {
            api_key: patch.api_key.map(|key| key.trim().to_string()),
            ..patch
        };

        Ok(self.store.update_settings(patch).await?)
    }
}

fn required(field: &str, value: &str) -> Result<String, MonitorError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(MonitorError::invalid_route(format!("{} must not be empty", field)));
    }
    Ok(trimmed.to_string())
}

fn validate_interval(interval: i64) -> Result<(), MonitorError> {
    if !(MIN_INTERVAL_MINUTES..=MAX_INTERVAL_MINUTES).contains(&interval) {
        return Err(MonitorError::invalid_route(format!(
            "interval must be between {} and {} minutes, got {}",
            MIN_INTERVAL_MINUTES, MAX_INTERVAL_MINUTES, interval
        )));
    }
    Ok(())
}
