//! Route Checker - one fetch → aggregate → persist → notify cycle.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;

use crate::metrics::AppMetrics;
use crate::monitor::{
    aggregator,
    error::MonitorError,
    policy,
    provider::TravelTimeProvider,
    types::{CheckResult, NewNotification, NewRouteHistory, Settings, SettingsPatch},
};
use crate::store::RouteStore;

/// Runs check cycles for individual routes.
///
/// Timer fires and on-demand "check now" requests go through the same
/// [`RouteChecker::check_route`]. Calls for the same route are serialized:
/// a second call waits for the first to finish and then measures against
/// the state it wrote. Calls for different routes run concurrently.
pub struct RouteChecker {
    store: Arc<dyn RouteStore>,
    provider: Arc<dyn TravelTimeProvider + Send + Sync>,
    api_key_override: Option<String>,
    metrics: Option<Arc<AppMetrics>>,
    in_flight: Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
}

impl RouteChecker {
    pub fn new(
        store: Arc<dyn RouteStore>,
        provider: Arc<dyn TravelTimeProvider + Send + Sync>,
    ) -> Self {
        Self {
            store,
            provider,
            api_key_override: None,
            metrics: None,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Use an out-of-band API key that always wins over the stored one.
    pub fn with_api_key_override(mut self, api_key: Option<String>) -> Self {
        self.api_key_override = api_key.filter(|key| !key.trim().is_empty());
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<AppMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn store(&self) -> &Arc<dyn RouteStore> {
        &self.store
    }

    /// Run one check cycle for `route_id`.
    pub async fn check_route(&self, route_id: i64) -> Result<CheckResult, MonitorError> {
        let entry = self.enter(route_id);
        let _guard = entry.lock.lock().await;

        if let Some(metrics) = &self.metrics {
            metrics.checks_total.inc();
        }

        let result = self.run_cycle(route_id).await;

        match &result {
            Ok(outcome) => {
                tracing::info!(
                    route_id,
                    travel_time = outcome.history.travel_time,
                    change = ?outcome.history.change,
                    notified = outcome.notification.is_some(),
                    "Route checked"
                );
                if let Some(metrics) = &self.metrics {
                    metrics
                        .travel_time_minutes
                        .with_label_values(&[&route_id.to_string()])
                        .set(outcome.history.travel_time as f64);
                    if outcome.notification.is_some() {
                        metrics.notifications_total.inc();
                    }
                }
            }
            Err(err) => {
                tracing::warn!(
                    route_id,
                    reason = err.reason(),
                    provider = self.provider.provider_name(),
                    "Route check failed: {}",
                    err
                );
                if let Some(metrics) = &self.metrics {
                    metrics
                        .check_failures_total
                        .with_label_values(&[err.reason()])
                        .inc();
                }
            }
        }

        result
    }

    async fn run_cycle(&self, route_id: i64) -> Result<CheckResult, MonitorError> {
        // 1. Look up the route
        let route = self
            .store
            .get_route(route_id)
            .await?
            .ok_or(MonitorError::NotFound(route_id))?;

        // 2. Resolve API key (and the settings the policy needs)
        let (api_key, settings) = self.resolve_api_key().await?;

        // 3. Measure; any provider error aborts with no writes
        let travel = self
            .provider
            .fetch_travel_time(&route.source, &route.destination, &api_key)
            .await?;
        let travel_time = travel.duration_minutes;

        // 4. Aggregate against everything recorded so far
        let prior = self.store.get_route_histories(route_id).await?;
        let stats = aggregator::aggregate(&route, travel_time, &prior);

        // 5-7. Persist history, then route, then notification, in order
        let now = Utc::now();
        let history = self
            .store
            .create_route_history(NewRouteHistory {
                route_id,
                timestamp: now,
                travel_time,
                change: stats.change,
            })
            .await?;

        let updated = self
            .store
            .record_measurement(route_id, stats, now)
            .await?
            .ok_or(MonitorError::NotFound(route_id))?;

        let decision = policy::decide(stats.change, &settings);
        let notification = if decision.should_emit {
            let message = policy::message(&updated.name, travel_time, decision.kind, stats.change);
            Some(
                self.store
                    .create_notification(NewNotification {
                        route_id,
                        timestamp: now,
                        kind: decision.kind,
                        message,
                    })
                    .await?,
            )
        } else {
            tracing::debug!(route_id, kind = %decision.kind, "Notification suppressed by policy");
            None
        };

        Ok(CheckResult {
            route: updated,
            history,
            notification,
        })
    }

    /// The override key, if configured, wins and is written back to the
    /// store whenever the stored key differs.
    async fn resolve_api_key(&self) -> Result<(String, Settings), MonitorError> {
        let mut settings = self.store.get_settings().await?;

        if let Some(override_key) = &self.api_key_override {
            if settings.api_key.as_deref() != Some(override_key.as_str()) {
                tracing::info!("Persisting API key from environment into settings");
                settings = self
                    .store
                    .update_settings(SettingsPatch {
                        api_key: Some(override_key.clone()),
                        ..Default::default()
                    })
                    .await?;
            }
            return Ok((override_key.clone(), settings));
        }

        match settings.api_key.clone().filter(|key| !key.trim().is_empty()) {
            Some(key) => Ok((key, settings)),
            None => Err(MonitorError::Unconfigured),
        }
    }

    /// Drop per-route metric series once the route is gone.
    pub fn forget_route(&self, route_id: i64) {
        if let Some(metrics) = &self.metrics {
            // Absent when the route was never measured.
            let _ = metrics
                .travel_time_minutes
                .remove_label_values(&[&route_id.to_string()]);
        }
    }

    fn enter(&self, route_id: i64) -> InFlight<'_> {
        let mut locks = self.lock_in_flight();
        let lock = locks.entry(route_id).or_default().clone();
        InFlight {
            checker: self,
            route_id,
            lock,
        }
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, HashMap<i64, Arc<tokio::sync::Mutex<()>>>> {
        self.in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[cfg(test)]
    fn in_flight_routes(&self) -> usize {
        self.lock_in_flight().len()
    }
}

/// A caller's claim on a route's check lock. The map entry is removed when
/// the last claim is released, so the map only holds routes with a check
/// running or waiting.
struct InFlight<'a> {
    checker: &'a RouteChecker,
    route_id: i64,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut locks = self.checker.lock_in_flight();
        let ours = locks
            .get(&self.route_id)
            .is_some_and(|entry| Arc::ptr_eq(entry, &self.lock));
        // One reference in the map, one here: nobody else is waiting.
        if ours && Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.route_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::error::ProviderError;
    use crate::monitor::types::{NewRoute, NotificationKind, NotificationPreference};
    use crate::services::mock_provider::MockTravelTimeProvider;
    use crate::store::MemoryStore;

    fn settings_with_key(preference: NotificationPreference, enabled: bool) -> Settings {
        Settings {
            api_key: Some("stored-key".to_string()),
            enable_notifications: enabled,
            notification_type: preference,
            history_retention: 30,
        }
    }

    async fn setup(
        settings: Settings,
        provider: MockTravelTimeProvider,
    ) -> (RouteChecker, Arc<MemoryStore>, Arc<MockTravelTimeProvider>, i64) {
        let store = Arc::new(MemoryStore::with_settings(settings));
        let route = store
            .create_route(NewRoute {
                name: "Home to Office via the long scenic bridge".to_string(),
                source: "Home".to_string(),
                destination: "Office".to_string(),
                interval: 5,
                is_active: true,
                is_saved: false,
            })
            .await
            .unwrap();
        let provider = Arc::new(provider);
        let checker = RouteChecker::new(store.clone(), provider.clone());
        (checker, store, provider, route.id)
    }

    #[tokio::test]
    async fn scenario_twenty_twentyfive_twentytwo() {
        let (checker, store, _, id) = setup(
            settings_with_key(NotificationPreference::All, true),
            MockTravelTimeProvider::new().with_times([20, 25, 22]),
        )
        .await;

        let mut changes = Vec::new();
        let mut kinds = Vec::new();
        for _ in 0..3 {
            let result = checker.check_route(id).await.unwrap();
            changes.push(result.history.change);
            kinds.push(result.notification.unwrap().kind);
        }

        assert_eq!(changes, vec![None, Some(5), Some(-3)]);
        assert_eq!(
            kinds,
            vec![
                NotificationKind::New,
                NotificationKind::Increase,
                NotificationKind::Decrease
            ]
        );

        let route = store.get_route(id).await.unwrap().unwrap();
        assert_eq!(route.min_time, Some(20));
        assert_eq!(route.max_time, Some(25));
        assert_eq!(route.avg_time, Some(22));
        assert_eq!(route.current_time, Some(22));
        assert_eq!(route.change, Some(-3));
        assert!(route.last_checked.is_some());
        assert_eq!(store.get_route_histories(id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn first_check_notifies_even_when_disabled() {
        let (checker, store, _, id) = setup(
            settings_with_key(NotificationPreference::Increase, false),
            MockTravelTimeProvider::new().with_times([30, 45]),
        )
        .await;

        let first = checker.check_route(id).await.unwrap();
        let notification = first.notification.unwrap();
        assert_eq!(notification.kind, NotificationKind::New);
        assert!(notification.message.contains("Home to Office via the long scenic bridge"));

        let second = checker.check_route(id).await.unwrap();
        assert!(second.notification.is_none());
        assert_eq!(store.list_notifications().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn significant_gate_at_five_minutes() {
        let (checker, _, _, id) = setup(
            settings_with_key(NotificationPreference::Significant, true),
            MockTravelTimeProvider::new().with_times([20, 24, 29, 24]),
        )
        .await;

        assert!(checker.check_route(id).await.unwrap().notification.is_some());
        // +4
        assert!(checker.check_route(id).await.unwrap().notification.is_none());
        // +5
        assert!(checker.check_route(id).await.unwrap().notification.is_some());
        // -5
        assert!(checker.check_route(id).await.unwrap().notification.is_some());
    }

    #[tokio::test]
    async fn increase_only_suppresses_decreases() {
        let (checker, _, _, id) = setup(
            settings_with_key(NotificationPreference::Increase, true),
            MockTravelTimeProvider::new().with_times([40, 10, 12]),
        )
        .await;

        assert!(checker.check_route(id).await.unwrap().notification.is_some());
        assert!(checker.check_route(id).await.unwrap().notification.is_none());
        let up = checker.check_route(id).await.unwrap().notification.unwrap();
        assert_eq!(up.kind, NotificationKind::Increase);
        assert!(up.message.contains("+2 min"));
    }

    #[tokio::test]
    async fn missing_route_is_not_found() {
        let (checker, _, provider, _) = setup(
            settings_with_key(NotificationPreference::All, true),
            MockTravelTimeProvider::new().with_times([10]),
        )
        .await;

        let err = checker.check_route(9999).await.unwrap_err();
        assert!(matches!(err, MonitorError::NotFound(9999)));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn no_key_is_unconfigured_and_writes_nothing() {
        let (checker, store, provider, id) = setup(
            Settings::default(),
            MockTravelTimeProvider::new().with_times([10]),
        )
        .await;

        let err = checker.check_route(id).await.unwrap_err();
        assert!(matches!(err, MonitorError::Unconfigured));
        assert_eq!(provider.calls(), 0);
        assert!(store.get_route_histories(id).await.unwrap().is_empty());
        assert!(store.list_notifications().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn provider_failure_aborts_cleanly() {
        let (checker, store, _, id) = setup(
            settings_with_key(NotificationPreference::All, true),
            MockTravelTimeProvider::new().with_failure(),
        )
        .await;

        let err = checker.check_route(id).await.unwrap_err();
        assert!(matches!(
            err,
            MonitorError::ProviderFailure(ProviderError::ServiceUnavailable)
        ));

        let route = store.get_route(id).await.unwrap().unwrap();
        assert_eq!(route.current_time, None);
        assert_eq!(route.last_checked, None);
        assert!(store.get_route_histories(id).await.unwrap().is_empty());
        assert!(store.list_notifications().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_cycle_does_not_disturb_the_next_delta() {
        let (checker, _, _, id) = setup(
            settings_with_key(NotificationPreference::All, true),
            MockTravelTimeProvider::new()
                .with_times([20])
                .with_failure()
                .with_times([26]),
        )
        .await;

        checker.check_route(id).await.unwrap();
        assert!(checker.check_route(id).await.is_err());
        let third = checker.check_route(id).await.unwrap();
        assert_eq!(third.history.change, Some(6));
    }

    #[tokio::test]
    async fn override_key_wins_and_is_written_back() {
        let (checker, store, _, id) = setup(
            settings_with_key(NotificationPreference::All, true),
            MockTravelTimeProvider::new().with_times([15]),
        )
        .await;
        let checker = checker.with_api_key_override(Some("env-key".to_string()));

        checker.check_route(id).await.unwrap();
        let settings = store.get_settings().await.unwrap();
        assert_eq!(settings.api_key.as_deref(), Some("env-key"));
    }

    #[tokio::test]
    async fn override_key_works_without_stored_key() {
        let (checker, store, _, id) = setup(
            Settings::default(),
            MockTravelTimeProvider::new().with_times([15]),
        )
        .await;
        let checker = checker.with_api_key_override(Some("env-key".to_string()));

        assert!(checker.check_route(id).await.is_ok());
        assert_eq!(
            store.get_settings().await.unwrap().api_key.as_deref(),
            Some("env-key")
        );
    }

    #[tokio::test]
    async fn concurrent_checks_for_one_route_are_serialized() {
        let (checker, store, _, id) = setup(
            settings_with_key(NotificationPreference::All, true),
            MockTravelTimeProvider::new().with_times([20, 30]),
        )
        .await;
        let checker = Arc::new(checker);

        let a = tokio::spawn({
            let checker = checker.clone();
            async move { checker.check_route(id).await }
        });
        let b = tokio::spawn({
            let checker = checker.clone();
            async move { checker.check_route(id).await }
        });
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        let histories = store.get_route_histories(id).await.unwrap();
        let changes: Vec<Option<i64>> = histories.iter().map(|h| h.change).collect();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes.iter().filter(|c| c.is_none()).count(), 1);
    }

    #[tokio::test]
    async fn metrics_record_success_and_failure() {
        let metrics = Arc::new(AppMetrics::new().unwrap());
        let (checker, _, _, id) = setup(
            settings_with_key(NotificationPreference::All, true),
            MockTravelTimeProvider::new().with_times([20]),
        )
        .await;
        let checker = checker.with_metrics(metrics.clone());

        checker.check_route(id).await.unwrap();
        let _ = checker.check_route(4242).await;

        assert!((metrics.checks_total.get() - 2.0).abs() < f64::EPSILON);
        assert!((metrics.notifications_total.get() - 1.0).abs() < f64::EPSILON);
        let not_found = metrics
            .check_failures_total
            .with_label_values(&["not_found"])
            .get();
        assert!((not_found - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn in_flight_map_only_holds_running_checks() {
        let (checker, _, _, id) = setup(
            settings_with_key(NotificationPreference::All, true),
            MockTravelTimeProvider::new().with_times([20]),
        )
        .await;

        for missing in 10_000..11_000 {
            assert!(checker.check_route(missing).await.is_err());
        }
        checker.check_route(id).await.unwrap();

        assert_eq!(checker.in_flight_routes(), 0);
    }

    #[tokio::test]
    async fn queued_checks_release_the_entry_after_the_last_one() {
        let (checker, _, _, id) = setup(
            settings_with_key(NotificationPreference::All, true),
            MockTravelTimeProvider::new().with_times([20, 30, 40]),
        )
        .await;
        let checker = Arc::new(checker);

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let checker = checker.clone();
                tokio::spawn(async move { checker.check_route(id).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(checker.in_flight_routes(), 0);
    }

    #[tokio::test]
    async fn forget_route_drops_travel_time_series() {
        let metrics = Arc::new(AppMetrics::new().unwrap());
        let (checker, _, _, id) = setup(
            settings_with_key(NotificationPreference::All, true),
            MockTravelTimeProvider::new().with_times([20]),
        )
        .await;
        let checker = checker.with_metrics(metrics.clone());
        let label = format!("route_id=\"{}\"", id);

        checker.check_route(id).await.unwrap();
        assert!(metrics.render().unwrap().contains(&label));

        checker.forget_route(id);
        assert!(!metrics.render().unwrap().contains(&label));
        // Forgetting an unmeasured route is a no-op.
        checker.forget_route(id + 1000);
    }
}
