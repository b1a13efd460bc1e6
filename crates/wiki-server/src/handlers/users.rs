use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use wiki_shared::api::{CreateUserRequest, MessageResponse, UpdateUserRequest, UserResponse};
use wiki_shared::User;

use super::auth::find_user;
use super::required;
use crate::auth::{hash_password, AuthUser};
use crate::db::rows::{row_to_user, UserRow, USER_COLUMNS};
use crate::error::AppError;
use crate::routes::AppState;

const MIN_PASSWORD_LEN: usize = 8;

fn check_password(password: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(
            "password",
            format!("The password field must be at least {MIN_PASSWORD_LEN} characters."),
        ));
    }
    Ok(())
}

async fn ensure_username_free(
    state: &AppState,
    username: &str,
    except: Option<i64>,
) -> Result<(), AppError> {
    let taken: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM users WHERE username = ? AND id IS NOT ?")
            .bind(username)
            .bind(except)
            .fetch_optional(&state.db)
            .await?;

    if taken.is_some() {
        return Err(AppError::validation(
            "username",
            "The username has already been taken.",
        ));
    }
    Ok(())
}

/// GET /api/users
pub async fn list_users(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<User>>, AppError> {
    user.require_admin()?;

    let rows: Vec<UserRow> =
        sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC, id DESC"))
            .fetch_all(&state.db)
            .await?;

    Ok(Json(rows.into_iter().map(row_to_user).collect()))
}

/// GET /api/users/:id
pub async fn get_user(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<Json<User>, AppError> {
    user.require_admin()?;
    Ok(Json(find_user(&state, id).await?))
}

/// POST /api/users
pub async fn create_user(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), AppError> {
    user.require_admin()?;

    let username = required("username", &req.username, 255)?;
    check_password(&req.password)?;
    ensure_username_free(&state, &username, None).await?;

    let password_hash = hash_password(&req.password)?;
    let now = Utc::now();

    let id = sqlx::query(
        "INSERT INTO users (username, password_hash, role, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&username)
    .bind(&password_hash)
    .bind(req.role)
    .bind(now)
    .bind(now)
    .execute(&state.db)
    .await?
    .last_insert_rowid();

    tracing::info!("User {} created {} as {}", user.username, username, req.role.as_str());

    Ok((
        StatusCode::CREATED,
        Json(UserResponse {
            user: find_user(&state, id).await?,
            message: "User created successfully".to_string(),
        }),
    ))
}

/// PUT /api/users/:id
pub async fn update_user(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<UserResponse>, AppError> {
    user.require_admin()?;

    let current = find_user(&state, id).await?;

    let username = match &req.username {
        Some(name) => {
            let name = required("username", name, 255)?;
            ensure_username_free(&state, &name, Some(id)).await?;
            name
        }
        None => current.username,
    };

    let password_hash = match req.password.as_deref().filter(|p| !p.is_empty()) {
        Some(password) => {
            check_password(password)?;
            Some(hash_password(password)?)
        }
        None => None,
    };

    sqlx::query(
        r#"
        UPDATE users
        SET username = ?,
            role = ?,
            password_hash = COALESCE(?, password_hash),
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&username)
    .bind(req.role.unwrap_or(current.role))
    .bind(password_hash)
    .bind(Utc::now())
    .bind(id)
    .execute(&state.db)
    .await?;

    Ok(Json(UserResponse {
        user: find_user(&state, id).await?,
        message: "User updated successfully".to_string(),
    }))
}

/// DELETE /api/users/:id
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, AppError> {
    user.require_admin()?;

    if id == user.id {
        return Err(AppError::validation(
            "user",
            "You cannot delete your own account.",
        ));
    }

    let result = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }

    tracing::info!("User {} deleted user {}", user.username, id);
    Ok(Json(MessageResponse::new("User deleted successfully")))
}
