//! Route CRUD and on-demand checks.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use super::AppState;
use crate::error::AppError;
use crate::monitor::types::{CheckResult, NewRoute, Route, RouteHistory, RoutePatch};

/// `GET /routes`
pub async fn list_routes(State(state): State<AppState>) -> Result<Json<Vec<Route>>, AppError> {
    Ok(Json(state.monitor.list_routes().await?))
}

/// `POST /routes`: create, schedule (if active) and check once.
pub async fn create_route(
    State(state): State<AppState>,
    Json(body): Json<NewRoute>,
) -> Result<(StatusCode, Json<Route>), AppError> {
    let route = state.monitor.create_route(body).await?;
    Ok((StatusCode::CREATED, Json(route)))
}

/// `GET /routes/:id`
pub async fn get_route(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Route>, AppError> {
    Ok(Json(state.monitor.get_route(id).await?))
}

/// `PATCH /routes/:id`: partial update; activation and interval changes
/// are mirrored into the scheduler.
pub async fn update_route(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<RoutePatch>,
) -> Result<Json<Route>, AppError> {
    Ok(Json(state.monitor.update_route(id, body).await?))
}

/// `DELETE /routes/:id`
pub async fn delete_route(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    state.monitor.delete_route(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /routes/:id/check`
pub async fn check_route(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<CheckResult>, AppError> {
    Ok(Json(state.monitor.check_now(id).await?))
}

/// `GET /routes/:id/history`: oldest first.
pub async fn route_history(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<RouteHistory>>, AppError> {
    Ok(Json(state.monitor.route_histories(id).await?))
}
