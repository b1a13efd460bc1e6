use axum::{extract::State, Extension, Json};
use wiki_shared::{AdminStats, Role};

use crate::auth::AuthUser;
use crate::db::rows::{row_to_user, UserRow, USER_COLUMNS};
use crate::error::AppError;
use crate::routes::AppState;

async fn count(state: &AppState, sql: &str, role: Option<Role>) -> Result<i64, AppError> {
    let mut query = sqlx::query_as::<_, (i64,)>(sql);
    if let Some(role) = role {
        query = query.bind(role);
    }
    let (n,) = query.fetch_one(&state.db).await?;
    Ok(n)
}

/// GET /api/admin/stats
pub async fn stats(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<AdminStats>, AppError> {
    user.require_manager()?;

    const BY_ROLE: &str = "SELECT COUNT(*) FROM users WHERE role = ?";

    let latest: Vec<UserRow> = sqlx::query_as(&format!(
        "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC, id DESC LIMIT 5"
    ))
    .fetch_all(&state.db)
    .await?;

    Ok(Json(AdminStats {
        total_users: count(&state, "SELECT COUNT(*) FROM users", None).await?,
        admins_count: count(&state, BY_ROLE, Some(Role::Admin)).await?,
        documentalistes_count: count(&state, BY_ROLE, Some(Role::Documentaliste)).await?,
        users_count: count(&state, BY_ROLE, Some(Role::User)).await?,
        total_pages: count(&state, "SELECT COUNT(*) FROM pages", None).await?,
        latest_users: latest.into_iter().map(row_to_user).collect(),
    }))
}
