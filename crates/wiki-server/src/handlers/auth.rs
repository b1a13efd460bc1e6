use axum::{extract::State, Extension, Json};
use wiki_shared::api::{LoginRequest, LoginResponse, MessageResponse};
use wiki_shared::User;

use crate::auth::{create_access_token, verify_password, AuthUser};
use crate::db::rows::{row_to_user, UserRow, USER_COLUMNS};
use crate::error::AppError;
use crate::routes::AppState;

fn bad_credentials() -> AppError {
    AppError::validation("username", "The provided credentials are incorrect.")
}

/// POST /api/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let row: Option<(i64, String, String)> =
        sqlx::query_as("SELECT id, username, password_hash FROM users WHERE username = ?")
            .bind(req.username.trim())
            .fetch_optional(&state.db)
            .await?;

    let (user_id, username, password_hash) = row.ok_or_else(bad_credentials)?;

    if !verify_password(&req.password, &password_hash)? {
        tracing::info!("Failed login for {}", username);
        return Err(bad_credentials());
    }

    let token = create_access_token(
        user_id,
        &username,
        &state.config.jwt_secret,
        state.config.jwt_expires_in,
    )?;

    let user = find_user(&state, user_id).await?;
    tracing::info!("User {} logged in", user.username);

    Ok(Json(LoginResponse {
        user,
        token,
        message: "Login successful".to_string(),
    }))
}

/// POST /api/logout
///
/// Tokens are stateless; the client drops its copy.
pub async fn logout(Extension(user): Extension<AuthUser>) -> Json<MessageResponse> {
    tracing::info!("User {} logged out", user.username);
    Json(MessageResponse::new("Logged out successfully"))
}

/// GET /api/user
pub async fn me(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<User>, AppError> {
    Ok(Json(find_user(&state, user.id).await?))
}

pub(crate) async fn find_user(state: &AppState, id: i64) -> Result<User, AppError> {
    let row: UserRow = sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or(AppError::NotFound)?;

    Ok(row_to_user(row))
}
