//! HTTP surface over the route monitor.
//!
//! Routes:
//! - `GET    /health`, `GET /metrics`
//! - `GET    /routes`, `POST /routes`
//! - `GET    /routes/:id`, `PATCH /routes/:id`, `DELETE /routes/:id`
//! - `POST   /routes/:id/check`, `GET /routes/:id/history`
//! - `GET    /notifications`, `DELETE /notifications`, `DELETE /notifications/:id`
//! - `GET    /settings`, `PATCH /settings`

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    middleware,
    response::Response,
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use crate::error::AppError;
use crate::metrics::{track_http, AppMetrics};
use crate::monitor::RouteMonitor;

pub mod health;
pub mod notifications;
pub mod routes;
pub mod settings;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub monitor: RouteMonitor,
    pub metrics: Arc<AppMetrics>,
}

impl AppState {
    pub fn new(monitor: RouteMonitor, metrics: Arc<AppMetrics>) -> Self {
        Self { monitor, metrics }
    }
}

/// Assemble the full router. Used by `main.rs` and the integration tests.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/metrics", get(render_metrics))
        .route("/routes", get(routes::list_routes).post(routes::create_route))
        .route(
            "/routes/:id",
            get(routes::get_route)
                .patch(routes::update_route)
                .delete(routes::delete_route),
        )
        .route("/routes/:id/check", post(routes::check_route))
        .route("/routes/:id/history", get(routes::route_history))
        .route(
            "/notifications",
            get(notifications::list_notifications).delete(notifications::clear_notifications),
        )
        .route("/notifications/:id", delete(notifications::mark_read))
        .route("/settings", get(settings::get_settings).patch(settings::update_settings))
        .layer(middleware::from_fn_with_state(state.clone(), track_http))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// `GET /metrics`: Prometheus text exposition.
async fn render_metrics(State(state): State<AppState>) -> Result<Response, AppError> {
    let body = state.metrics.render()?;
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; version=0.0.4")
        .body(Body::from(body))
        .map_err(|err| AppError::Config(format!("Failed to build metrics response: {}", err)))
}
