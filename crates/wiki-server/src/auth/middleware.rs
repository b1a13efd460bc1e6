use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use wiki_shared::Role;

use crate::{error::AppError, routes::AppState};

use super::jwt::verify_access_token;

/// The caller, as currently stored. Role changes apply to live tokens.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: i64,
    pub username: String,
    pub role: Role,
}

impl AuthUser {
    /// Admins and documentalistes.
    pub fn require_manager(&self) -> Result<(), AppError> {
        if self.role.can_manage() {
            Ok(())
        } else {
            Err(AppError::Forbidden)
        }
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.role.is_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden)
        }
    }

    /// Owners may always edit their own pages.
    pub fn require_owner_or_manager(&self, owner_id: i64) -> Result<(), AppError> {
        if self.id == owner_id {
            Ok(())
        } else {
            self.require_manager()
        }
    }
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let auth_header = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or(AppError::Unauthorized)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(AppError::Unauthorized)?;

    let claims = verify_access_token(token, &state.config.jwt_secret)?;

    // Deleted users lose access even while their token is valid.
    let row: Option<(i64, String, Role)> =
        sqlx::query_as("SELECT id, username, role FROM users WHERE id = ?")
            .bind(claims.sub)
            .fetch_optional(&state.db)
            .await?;
    let (id, username, role) = row.ok_or(AppError::Unauthorized)?;

    request.extensions_mut().insert(AuthUser { id, username, role });

    Ok(next.run(request).await)
}

/// Role gate for routes whose body only managers may submit. Runs before the
/// handler reads the body, so a plain user gets 403 even for a malformed one.
pub async fn manager_middleware(request: Request, next: Next) -> Result<Response, AppError> {
    request
        .extensions()
        .get::<AuthUser>()
        .ok_or(AppError::Unauthorized)?
        .require_manager()?;

    Ok(next.run(request).await)
}
