use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use super::AppState;
use crate::error::AppError;
use crate::monitor::types::Notification;

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub removed: u64,
}

/// `GET /notifications`: newest first.
pub async fn list_notifications(
    State(state): State<AppState>,
) -> Result<Json<Vec<Notification>>, AppError> {
    Ok(Json(state.monitor.list_notifications().await?))
}

/// `DELETE /notifications/:id`: mark one notification read.
pub async fn mark_read(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    if state.monitor.mark_notification_read(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("Notification {} not found", id)))
    }
}

/// `DELETE /notifications`: clear all.
pub async fn clear_notifications(
    State(state): State<AppState>,
) -> Result<Json<ClearResponse>, AppError> {
    let removed = state.monitor.clear_notifications().await?;
    Ok(Json(ClearResponse { removed }))
}
