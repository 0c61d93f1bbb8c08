use axum::{extract::State, Json};
use serde::Serialize;

use super::AppState;
use crate::error::AppError;
use crate::monitor::types::{NotificationPreference, Settings, SettingsPatch};

/// Settings as exposed over HTTP. The API key is never echoed back.
#[derive(Debug, Serialize)]
pub struct SettingsResponse {
    pub api_key: Option<String>,
    pub enable_notifications: bool,
    pub notification_type: NotificationPreference,
    pub history_retention: i64,
}

impl From<Settings> for SettingsResponse {
    fn from(settings: Settings) -> Self {
        Self {
            api_key: settings.api_key.as_deref().map(mask_key),
            enable_notifications: settings.enable_notifications,
            notification_type: settings.notification_type,
            history_retention: settings.history_retention,
        }
    }
}

/// Keep the last four characters so users can tell keys apart.
fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(chars.len() - 4), tail)
}

/// `GET /settings`
pub async fn get_settings(State(state): State<AppState>) -> Result<Json<SettingsResponse>, AppError> {
    Ok(Json(state.monitor.settings().await?.into()))
}

/// `PATCH /settings`
pub async fn update_settings(
    State(state): State<AppState>,
    Json(body): Json<SettingsPatch>,
) -> Result<Json<SettingsResponse>, AppError> {
    Ok(Json(state.monitor.update_settings(body).await?.into()))
}
