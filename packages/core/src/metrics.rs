//! Prometheus metrics registry for the travel time monitor.
//!
//! [`AppMetrics`] owns all registered metrics and the [`Registry`] they
//! belong to. Construct it once at startup, wrap in `Arc`, and pass it
//! to the checker, the scheduler and the HTTP middleware.
//!
//! Exposed at `GET /metrics` in Prometheus text exposition format
//! (`text/plain; version=0.0.4`).

use std::time::Instant;

use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};
use prometheus::{
    Counter, CounterVec, Gauge, GaugeVec, Histogram, HistogramOpts, Opts, Registry,
};

use crate::api::AppState;

/// All application-level Prometheus metrics.
pub struct AppMetrics {
    /// Total number of route check cycles started.
    pub checks_total: Counter,
    /// Failed check cycles, labelled by failure reason.
    pub check_failures_total: CounterVec,
    /// Notifications persisted by the checker.
    pub notifications_total: Counter,
    /// Number of routes with a live timer.
    pub scheduled_routes: Gauge,
    /// Latest measured travel time per route, in minutes.
    pub travel_time_minutes: GaugeVec,
    /// HTTP request count, labelled by method, path, and status code.
    pub http_requests_total: CounterVec,
    /// HTTP request latency histogram in seconds.
    pub http_request_duration: Histogram,
    /// The registry that owns all of the above metrics.
    pub registry: Registry,
}

impl AppMetrics {
    /// Create and register all metrics. Returns an error if any metric
    /// name is invalid or duplicated.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let checks_total = Counter::with_opts(Opts::new(
            "travel_monitor_checks_total",
            "Route check cycles started",
        ))?;

        let check_failures_total = CounterVec::new(
            Opts::new(
                "travel_monitor_check_failures_total",
                "Route check cycles that failed, by reason",
            ),
            &["reason"],
        )?;

        let notifications_total = Counter::with_opts(Opts::new(
            "travel_monitor_notifications_total",
            "Notifications emitted",
        ))?;

        let scheduled_routes = Gauge::with_opts(Opts::new(
            "travel_monitor_scheduled_routes",
            "Routes with a live timer",
        ))?;

        let travel_time_minutes = GaugeVec::new(
            Opts::new(
                "travel_monitor_travel_time_minutes",
                "Latest measured travel time per route",
            ),
            &["route_id"],
        )?;

        let http_requests_total = CounterVec::new(
            Opts::new(
                "travel_monitor_http_requests_total",
                "HTTP requests by method, path, and status",
            ),
            &["method", "path", "status"],
        )?;

        let http_request_duration = Histogram::with_opts(
            HistogramOpts::new(
                "travel_monitor_http_request_duration_seconds",
                "HTTP request latency in seconds",
            )
            .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        )?;

        registry.register(Box::new(checks_total.clone()))?;
        registry.register(Box::new(check_failures_total.clone()))?;
        registry.register(Box::new(notifications_total.clone()))?;
        registry.register(Box::new(scheduled_routes.clone()))?;
        registry.register(Box::new(travel_time_minutes.clone()))?;
        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_request_duration.clone()))?;

        Ok(Self {
            checks_total,
            check_failures_total,
            notifications_total,
            scheduled_routes,
            travel_time_minutes,
            http_requests_total,
            http_request_duration,
            registry,
        })
    }

    /// Render all metrics as Prometheus text format (for the `/metrics` endpoint).
    pub fn render(&self) -> Result<String, prometheus::Error> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buf = Vec::new();
        encoder.encode(&metric_families, &mut buf)?;
        Ok(String::from_utf8(buf).unwrap_or_default())
    }
}

/// Axum middleware recording request count and latency.
///
/// Uses the matched route template (`/routes/:id`) rather than the raw
/// path so label cardinality stays bounded.
pub async fn track_http(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(request).await;

    state
        .metrics
        .http_requests_total
        .with_label_values(&[&method, &path, response.status().as_str()])
        .inc();
    state
        .metrics
        .http_request_duration
        .observe(started.elapsed().as_secs_f64());

    response
}
