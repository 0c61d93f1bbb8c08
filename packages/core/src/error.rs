use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::monitor::error::{MonitorError, StoreError};

/// Unified application error.
///
/// Startup failures (config, database, bind) and request failures both
/// end up here, so every layer fails in a predictable and debuggable way.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Monitor(#[from] MonitorError),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Monitor(MonitorError::PersistenceFailure(err))
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Monitor(err) => match err {
                MonitorError::NotFound(_) => StatusCode::NOT_FOUND,
                MonitorError::InvalidRoute(_) | MonitorError::InvalidSettings(_) => {
                    StatusCode::BAD_REQUEST
                }
                MonitorError::Unconfigured => StatusCode::PRECONDITION_FAILED,
                MonitorError::ProviderFailure(_) => StatusCode::BAD_GATEWAY,
                MonitorError::PersistenceFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Config(_) | AppError::Database(_) | AppError::Metrics(_) | AppError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
