use std::collections::BTreeMap;

use axum::{extract::State, Extension, Json};
use serde_json::Value;
use wiki_shared::api::{MessageResponse, UpdateSettingsRequest};
use wiki_shared::{is_truthy, MaintenanceStatus, MAINTENANCE_MODE_KEY, MAINTENANCE_REASON_KEY};

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::routes::AppState;

async fn setting(state: &AppState, key: &str) -> Result<Option<String>, AppError> {
    let row: Option<(Option<String>,)> =
        sqlx::query_as("SELECT value FROM system_settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&state.db)
            .await?;

    Ok(row.and_then(|(value,)| value))
}

/// Settings are text; other JSON values keep their JSON spelling.
fn stored_value(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

/// GET /api/maintenance
pub async fn maintenance_status(
    State(state): State<AppState>,
) -> Result<Json<MaintenanceStatus>, AppError> {
    let maintenance = setting(&state, MAINTENANCE_MODE_KEY)
        .await?
        .is_some_and(|v| is_truthy(&v));
    let message = setting(&state, MAINTENANCE_REASON_KEY)
        .await?
        .unwrap_or_default();

    Ok(Json(MaintenanceStatus {
        maintenance,
        message,
    }))
}

/// GET /api/admin/settings
pub async fn get_settings(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<BTreeMap<String, Option<String>>>, AppError> {
    user.require_manager()?;

    let rows: Vec<(String, Option<String>)> =
        sqlx::query_as("SELECT key, value FROM system_settings")
            .fetch_all(&state.db)
            .await?;

    Ok(Json(rows.into_iter().collect()))
}

/// POST /api/admin/settings
pub async fn update_settings(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<UpdateSettingsRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    user.require_manager()?;

    let mut tx = state.db.begin().await?;

    for (key, value) in req.settings {
        sqlx::query(
            "INSERT INTO system_settings (key, value) VALUES (?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(&key)
        .bind(stored_value(value))
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    tracing::info!("User {} updated system settings", user.username);
    Ok(Json(MessageResponse::new("Settings updated successfully")))
}
