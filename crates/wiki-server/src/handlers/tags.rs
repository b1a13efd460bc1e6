use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use wiki_shared::api::{CreateTagRequest, MessageResponse, UpdateTagRequest};
use wiki_shared::{Tag, DEFAULT_TAG_COLOR};

use super::{max_length, required};
use crate::auth::AuthUser;
use crate::db::rows::{row_to_tag, TagRow};
use crate::error::AppError;
use crate::routes::AppState;

/// Tag names are stored upper-cased.
fn tag_name(name: &str) -> Result<String, AppError> {
    Ok(required("name", name, 50)?.to_uppercase())
}

async fn ensure_name_free(state: &AppState, name: &str, except: Option<i64>) -> Result<(), AppError> {
    let taken: Option<(i64,)> = sqlx::query_as("SELECT id FROM tags WHERE name = ? AND id IS NOT ?")
        .bind(name)
        .bind(except)
        .fetch_optional(&state.db)
        .await?;

    if taken.is_some() {
        return Err(AppError::validation("name", "The name has already been taken."));
    }
    Ok(())
}

async fn fetch_tag(state: &AppState, id: i64) -> Result<Tag, AppError> {
    let row: TagRow = sqlx::query_as("SELECT id, name, color FROM tags WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or(AppError::NotFound)?;

    Ok(row_to_tag(row))
}

/// GET /api/tags
pub async fn list_tags(
    State(state): State<AppState>,
    Extension(_user): Extension<AuthUser>,
) -> Result<Json<Vec<Tag>>, AppError> {
    let rows: Vec<TagRow> = sqlx::query_as("SELECT id, name, color FROM tags ORDER BY name")
        .fetch_all(&state.db)
        .await?;

    Ok(Json(rows.into_iter().map(row_to_tag).collect()))
}

/// POST /api/tags
pub async fn create_tag(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CreateTagRequest>,
) -> Result<(StatusCode, Json<Tag>), AppError> {
    user.require_manager()?;

    let name = tag_name(&req.name)?;
    max_length("color", req.color.as_deref(), 20)?;
    ensure_name_free(&state, &name, None).await?;

    let color = req
        .color
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_TAG_COLOR.to_string());

    let id = sqlx::query("INSERT INTO tags (name, color) VALUES (?, ?)")
        .bind(&name)
        .bind(&color)
        .execute(&state.db)
        .await?
        .last_insert_rowid();

    Ok((StatusCode::CREATED, Json(Tag { id, name, color })))
}

/// PUT /api/tags/:id
///
/// Pages keep the tag text and color they were saved with.
pub async fn update_tag(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateTagRequest>,
) -> Result<Json<Tag>, AppError> {
    user.require_manager()?;

    let mut tag = fetch_tag(&state, id).await?;

    if let Some(name) = &req.name {
        tag.name = tag_name(name)?;
        ensure_name_free(&state, &tag.name, Some(id)).await?;
    }
    if let Some(color) = req.color {
        max_length("color", Some(&color), 20)?;
        tag.color = color;
    }

    sqlx::query("UPDATE tags SET name = ?, color = ? WHERE id = ?")
        .bind(&tag.name)
        .bind(&tag.color)
        .bind(id)
        .execute(&state.db)
        .await?;

    Ok(Json(tag))
}

/// DELETE /api/tags/:id
pub async fn delete_tag(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, AppError> {
    user.require_manager()?;

    let result = sqlx::query("DELETE FROM tags WHERE id = ?")
        .bind(id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }

    Ok(Json(MessageResponse::new("Tag deleted successfully")))
}
