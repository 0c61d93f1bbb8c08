use axum::{
    extract::State,
    http::{header, HeaderValue},
    response::IntoResponse,
    Json,
};
use serde::Serialize;

use super::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub scheduled_routes: usize,
}

/// `GET /health`: liveness plus the number of live route timers.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let scheduled_routes = state.monitor.scheduler().scheduled_routes().await.len();

    (
        [(header::CACHE_CONTROL, HeaderValue::from_static("no-store"))],
        Json(HealthResponse {
            status: "ok",
            scheduled_routes,
        }),
    )
}
