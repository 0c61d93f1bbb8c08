//! Per-route check scheduler.
//!
//! [`RouteScheduler`] keeps exactly one timer task per active route. Each
//! timer fires on wall-clock minute boundaries in cron `*/n` fashion: a
//! route with a 5 minute interval fires at :00, :05, :10 and so on, so the
//! first fire after scheduling lands anywhere up to `n` minutes later.
//!
//! Every fire spawns its own check task. A slow or hung provider call
//! therefore never delays the timer itself or any other route, and
//! cancelling a timer stops future fires without aborting a check that is
//! already running.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::metrics::AppMetrics;
use crate::monitor::checker::RouteChecker;
use crate::monitor::error::StoreError;
use crate::monitor::types::{MAX_INTERVAL_MINUTES, MIN_INTERVAL_MINUTES};
use crate::store::RouteStore;

/// Owns the route id → timer task map for the lifetime of the process.
pub struct RouteScheduler {
    store: Arc<dyn RouteStore>,
    checker: Arc<RouteChecker>,
    timers: Mutex<HashMap<i64, JoinHandle<()>>>,
    metrics: Option<Arc<AppMetrics>>,
}

impl RouteScheduler {
    pub fn new(store: Arc<dyn RouteStore>, checker: Arc<RouteChecker>) -> Self {
        Self {
            store,
            checker,
            timers: Mutex::new(HashMap::new()),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<AppMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Schedule every active route. Returns how many timers were started.
    ///
    /// Only failing to list routes is an error. A route that cannot be
    /// scheduled is logged and skipped.
    pub async fn start(&self) -> Result<usize, StoreError> {
        let routes = self.store.list_routes().await?;
        let mut started = 0;

        for route in routes.iter().filter(|r| r.is_active) {
            match self.schedule(route.id).await {
                Ok(true) => started += 1,
                Ok(false) => {}
                Err(err) => {
                    tracing::error!(route_id = route.id, "Failed to schedule route: {}", err);
                }
            }
        }

        tracing::info!("Route scheduler started ({} active routes)", started);
        Ok(started)
    }

    /// (Re)start the timer for `route_id`.
    ///
    /// Any existing timer is cancelled first. A new one is only started
    /// when the route exists and is active; returns whether it was.
    pub async fn schedule(&self, route_id: i64) -> Result<bool, StoreError> {
        let mut timers = self.timers.lock().await;

        if let Some(handle) = timers.remove(&route_id) {
            handle.abort();
        }

        let route = match self.store.get_route(route_id).await? {
            Some(route) if route.is_active => route,
            Some(_) => {
                tracing::debug!(route_id, "Route inactive, not scheduling");
                self.update_gauge(timers.len());
                return Ok(false);
            }
            None => {
                tracing::debug!(route_id, "Route not found, not scheduling");
                self.update_gauge(timers.len());
                return Ok(false);
            }
        };

        let interval = route.interval.clamp(MIN_INTERVAL_MINUTES, MAX_INTERVAL_MINUTES);
        let handle = tokio::spawn(run_timer(self.checker.clone(), route_id, interval));
        timers.insert(route_id, handle);
        self.update_gauge(timers.len());

        tracing::info!(route_id, interval, "Route scheduled");
        Ok(true)
    }

    /// Cancel the timer for `route_id`. Returns whether one was running.
    pub async fn unschedule(&self, route_id: i64) -> bool {
        let mut timers = self.timers.lock().await;
        let removed = match timers.remove(&route_id) {
            Some(handle) => {
                handle.abort();
                tracing::info!(route_id, "Route unscheduled");
                true
            }
            None => false,
        };
        self.update_gauge(timers.len());
        removed
    }

    pub async fn is_scheduled(&self, route_id: i64) -> bool {
        self.timers.lock().await.contains_key(&route_id)
    }

    /// Ids of all routes with a live timer, ascending.
    pub async fn scheduled_routes(&self) -> Vec<i64> {
        let timers = self.timers.lock().await;
        let mut ids: Vec<i64> = timers.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Cancel every timer. Safe to call more than once.
    pub async fn shutdown(&self) {
        let mut timers = self.timers.lock().await;
        let count = timers.len();
        for (_, handle) in timers.drain() {
            handle.abort();
        }
        self.update_gauge(0);
        tracing::info!("Route scheduler stopped ({} timers cancelled)", count);
    }

    fn update_gauge(&self, scheduled: usize) {
        if let Some(metrics) = &self.metrics {
            metrics.scheduled_routes.set(scheduled as f64);
        }
    }
}

impl Drop for RouteScheduler {
    fn drop(&mut self) {
        for (_, handle) in self.timers.get_mut().drain() {
            handle.abort();
        }
    }
}

/// Timer loop for one route. Runs until aborted.
async fn run_timer(checker: Arc<RouteChecker>, route_id: i64, interval_minutes: i64) {
    // Wall-clock time is sampled once and then advanced with the runtime's
    // monotonic clock, so boundaries stay aligned even if the system clock
    // jumps.
    let origin_wall = Utc::now();
    let origin = Instant::now();

    loop {
        let now = origin_wall + elapsed_since(origin);
        let next = next_fire_after(now, interval_minutes);
        let wait = (next - origin_wall).to_std().unwrap_or_default();

        time::sleep_until(origin + wait).await;

        tracing::debug!(route_id, "Timer fired");
        let checker = checker.clone();
        tokio::spawn(async move {
            // Failures are already logged and counted by the checker.
            let _ = checker.check_route(route_id).await;
        });
    }
}

fn elapsed_since(origin: Instant) -> ChronoDuration {
    ChronoDuration::from_std(origin.elapsed()).unwrap_or_else(|_| ChronoDuration::zero())
}

/// Next minute boundary strictly after `now` whose minute-of-hour is a
/// multiple of `interval_minutes` (cron `*/n` on the minute field).
pub fn next_fire_after(now: DateTime<Utc>, interval_minutes: i64) -> DateTime<Utc> {
    let interval = interval_minutes.clamp(MIN_INTERVAL_MINUTES, MAX_INTERVAL_MINUTES);
    let seconds = now.timestamp();
    let mut candidate = seconds - seconds.rem_euclid(60) + 60;

    // At most 60 steps: minute 0 of the next hour always matches.
    while (candidate / 60).rem_euclid(60) % interval != 0 {
        candidate += 60;
    }

    Utc.timestamp_opt(candidate, 0)
        .single()
        .unwrap_or(now + ChronoDuration::minutes(interval))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::monitor::types::{NewRoute, RoutePatch, Settings, SettingsPatch};
    use crate::services::mock_provider::MockTravelTimeProvider;
    use crate::store::testing::FaultyStore;
    use crate::store::MemoryStore;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, h, m, s).unwrap()
    }

    #[test]
    fn next_fire_rounds_up_to_interval_boundary() {
        assert_eq!(next_fire_after(at(8, 2, 30), 5), at(8, 5, 0));
        assert_eq!(next_fire_after(at(8, 4, 59), 5), at(8, 5, 0));
        assert_eq!(next_fire_after(at(8, 5, 0), 5), at(8, 10, 0));
        assert_eq!(next_fire_after(at(8, 5, 1), 1), at(8, 6, 0));
    }

    #[test]
    fn next_fire_wraps_to_top_of_hour() {
        assert_eq!(next_fire_after(at(8, 56, 10), 10), at(9, 0, 0));
        assert_eq!(next_fire_after(at(8, 0, 0), 60), at(9, 0, 0));
        // */7 fires at :56 then :00, like cron.
        assert_eq!(next_fire_after(at(8, 57, 0), 7), at(9, 0, 0));
    }

    #[test]
    fn next_fire_is_never_more_than_interval_away() {
        for interval in 1..=60 {
            if 60 % interval != 0 {
                continue;
            }
            let now = at(13, 17, 42);
            let next = next_fire_after(now, interval);
            assert!(next > now);
            assert!(next - now <= ChronoDuration::minutes(interval));
        }
    }

    struct Harness {
        store: Arc<MemoryStore>,
        provider: Arc<MockTravelTimeProvider>,
        scheduler: RouteScheduler,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::with_settings(Settings {
            api_key: Some("key".to_string()),
            ..Settings::default()
        }));
        let provider = Arc::new(MockTravelTimeProvider::new().with_times([30]));
        let checker = Arc::new(RouteChecker::new(store.clone(), provider.clone()));
        let scheduler = RouteScheduler::new(store.clone(), checker);
        Harness {
            store,
            provider,
            scheduler,
        }
    }

    async fn add_route(store: &MemoryStore, interval: i64, is_active: bool) -> i64 {
        store
            .create_route(NewRoute {
                name: format!("route every {}m", interval),
                source: "A".to_string(),
                destination: "B".to_string(),
                interval,
                is_active,
                is_saved: false,
            })
            .await
            .unwrap()
            .id
    }

    async fn minutes(n: u64) {
        time::sleep(Duration::from_secs(n * 60)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn schedule_fires_on_interval() {
        let h = harness();
        let id = add_route(&h.store, 5, true).await;

        assert!(h.scheduler.schedule(id).await.unwrap());
        minutes(30).await;

        // One fire per 5 minute boundary in a 30 minute window.
        let fires = h.provider.calls();
        assert!((5..=7).contains(&fires), "unexpected fire count {}", fires);
        assert!(h.store.get_route_histories(id).await.unwrap().len() >= 5);
    }

    #[tokio::test(start_paused = true)]
    async fn schedule_twice_keeps_one_timer() {
        let h = harness();
        let id = add_route(&h.store, 5, true).await;

        h.scheduler.schedule(id).await.unwrap();
        h.scheduler.schedule(id).await.unwrap();
        assert_eq!(h.scheduler.scheduled_routes().await, vec![id]);

        minutes(30).await;
        let fires = h.provider.calls();
        assert!((5..=7).contains(&fires), "duplicate timer? {} fires", fires);
    }

    #[tokio::test(start_paused = true)]
    async fn inactive_or_missing_routes_are_not_scheduled() {
        let h = harness();
        let inactive = add_route(&h.store, 5, false).await;

        assert!(!h.scheduler.schedule(inactive).await.unwrap());
        assert!(!h.scheduler.schedule(9999).await.unwrap());
        assert!(h.scheduler.scheduled_routes().await.is_empty());

        minutes(30).await;
        assert_eq!(h.provider.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unschedule_stops_future_fires() {
        let h = harness();
        let id = add_route(&h.store, 1, true).await;

        h.scheduler.schedule(id).await.unwrap();
        minutes(3).await;
        assert!(h.scheduler.unschedule(id).await);
        let before = h.provider.calls();
        assert!(before >= 2);

        minutes(30).await;
        assert_eq!(h.provider.calls(), before);
        assert!(!h.scheduler.unschedule(id).await);
    }

    #[tokio::test(start_paused = true)]
    async fn reactivation_resumes_fires() {
        let h = harness();
        let id = add_route(&h.store, 1, true).await;

        h.scheduler.schedule(id).await.unwrap();
        h.store
            .update_route(id, RoutePatch { is_active: Some(false), ..Default::default() })
            .await
            .unwrap();
        h.scheduler.unschedule(id).await;
        minutes(10).await;
        assert_eq!(h.provider.calls(), 0);

        h.store
            .update_route(id, RoutePatch { is_active: Some(true), ..Default::default() })
            .await
            .unwrap();
        h.scheduler.schedule(id).await.unwrap();
        minutes(10).await;
        assert!(h.provider.calls() >= 9);
    }

    #[tokio::test(start_paused = true)]
    async fn interval_change_restarts_at_new_cadence() {
        let h = harness();
        let id = add_route(&h.store, 5, true).await;
        h.scheduler.schedule(id).await.unwrap();

        h.store
            .update_route(id, RoutePatch { interval: Some(10), ..Default::default() })
            .await
            .unwrap();
        h.scheduler.unschedule(id).await;
        h.scheduler.schedule(id).await.unwrap();

        minutes(60).await;
        // A lingering 5 minute timer would add roughly 12 more fires.
        let fires = h.provider.calls();
        assert!((5..=7).contains(&fires), "unexpected fire count {}", fires);
    }

    #[tokio::test(start_paused = true)]
    async fn start_schedules_only_active_routes() {
        let h = harness();
        let a = add_route(&h.store, 5, true).await;
        let _inactive = add_route(&h.store, 5, false).await;
        let c = add_route(&h.store, 15, true).await;

        assert_eq!(h.scheduler.start().await.unwrap(), 2);
        assert_eq!(h.scheduler.scheduled_routes().await, vec![a, c]);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_everything_and_is_idempotent() {
        let h = harness();
        add_route(&h.store, 1, true).await;
        add_route(&h.store, 2, true).await;
        h.scheduler.start().await.unwrap();

        h.scheduler.shutdown().await;
        h.scheduler.shutdown().await;
        assert!(h.scheduler.scheduled_routes().await.is_empty());

        minutes(10).await;
        assert_eq!(h.provider.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_checks_do_not_stop_the_timer() {
        let store = Arc::new(MemoryStore::new());
        let provider = Arc::new(MockTravelTimeProvider::new().with_times([10]));
        let checker = Arc::new(RouteChecker::new(store.clone(), provider.clone()));
        let scheduler = RouteScheduler::new(store.clone(), checker);
        let id = add_route(&store, 1, true).await;

        // No API key: every fire fails with Unconfigured before measuring.
        scheduler.schedule(id).await.unwrap();
        minutes(5).await;
        assert_eq!(provider.calls(), 0);
        assert!(scheduler.is_scheduled(id).await);

        store
            .update_settings(SettingsPatch {
                api_key: Some("late-key".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        minutes(5).await;
        assert!(provider.calls() >= 4);
    }

    #[tokio::test(start_paused = true)]
    async fn start_skips_routes_that_fail_to_load() {
        let mut store = FaultyStore::default();
        let first = add_route(&store.inner, 5, true).await;
        let broken = add_route(&store.inner, 5, true).await;
        let last = add_route(&store.inner, 10, true).await;
        store.broken_route = Some(broken);
        let store = Arc::new(store);

        let provider = Arc::new(MockTravelTimeProvider::new().with_times([30]));
        let checker = Arc::new(RouteChecker::new(store.clone(), provider));
        let scheduler = RouteScheduler::new(store.clone(), checker);

        assert_eq!(scheduler.start().await.unwrap(), 2);
        assert_eq!(scheduler.scheduled_routes().await, vec![first, last]);
    }
}
