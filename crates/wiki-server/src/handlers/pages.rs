use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use serde_json::Value;
use wiki_shared::api::{CreatePageRequest, MessageResponse, ReorderPagesRequest, UpdatePageRequest};
use wiki_shared::{Category, Page, PageWithRelations, User};

use super::{max_length, required};
use crate::auth::AuthUser;
use crate::db::rows::{
    row_to_category, row_to_page, row_to_user, CategoryRow, PageRow, UserRow, CATEGORY_COLUMNS,
    PAGE_COLUMNS, USER_COLUMNS,
};
use crate::error::AppError;
use crate::hierarchy::creates_cycle;
use crate::routes::AppState;
use crate::slug::{is_valid_slug, random_page_slug, slugify};

/// Stored text of a content payload. Only arrays (or nothing) are accepted.
fn content_text(content: Option<&Value>) -> Result<Option<String>, AppError> {
    match content {
        None | Some(Value::Null) => Ok(None),
        Some(value @ Value::Array(_)) => Ok(Some(value.to_string())),
        Some(_) => Err(AppError::validation(
            "content",
            "The content field must be an array.",
        )),
    }
}

fn validate_tag(tag: Option<&str>, tag_color: Option<&str>) -> Result<(), AppError> {
    max_length("tag", tag, 50)?;
    max_length("tag_color", tag_color, 20)
}

async fn fetch_page(state: &AppState, id: i64) -> Result<Page, AppError> {
    let row: PageRow = sqlx::query_as(&format!("SELECT {PAGE_COLUMNS} FROM pages WHERE id = ?"))
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or(AppError::NotFound)?;

    Ok(row_to_page(row))
}

async fn ensure_category_exists(state: &AppState, id: i64) -> Result<(), AppError> {
    let found: Option<(i64,)> = sqlx::query_as("SELECT id FROM categories WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db)
        .await?;

    found
        .map(|_| ())
        .ok_or_else(|| AppError::validation("category_id", "The selected category id is invalid."))
}

async fn ensure_parent_exists(state: &AppState, id: i64) -> Result<(), AppError> {
    let found: Option<(i64,)> = sqlx::query_as("SELECT id FROM pages WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db)
        .await?;

    found
        .map(|_| ())
        .ok_or_else(|| AppError::validation("parent_id", "The selected parent id is invalid."))
}

async fn slug_taken(state: &AppState, slug: &str, except: Option<i64>) -> Result<bool, AppError> {
    let found: Option<(i64,)> = sqlx::query_as("SELECT id FROM pages WHERE slug = ? AND id IS NOT ?")
        .bind(slug)
        .bind(except)
        .fetch_optional(&state.db)
        .await?;

    Ok(found.is_some())
}

async fn page_parents(state: &AppState) -> Result<HashMap<i64, Option<i64>>, AppError> {
    let rows: Vec<(i64, Option<i64>)> = sqlx::query_as("SELECT id, parent_id FROM pages")
        .fetch_all(&state.db)
        .await?;

    Ok(rows.into_iter().collect())
}

/// Inline owner, direct children and category of each page.
async fn with_relations(
    state: &AppState,
    pages: Vec<Page>,
) -> Result<Vec<PageWithRelations>, AppError> {
    let users: Vec<UserRow> = sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users"))
        .fetch_all(&state.db)
        .await?;
    let users: HashMap<i64, User> = users
        .into_iter()
        .map(row_to_user)
        .map(|u| (u.id, u))
        .collect();

    let categories: Vec<CategoryRow> =
        sqlx::query_as(&format!("SELECT {CATEGORY_COLUMNS} FROM categories"))
            .fetch_all(&state.db)
            .await?;
    let categories: HashMap<i64, Category> = categories
        .into_iter()
        .map(row_to_category)
        .map(|c| (c.id, c))
        .collect();

    let children: Vec<PageRow> = sqlx::query_as(&format!(
        "SELECT {PAGE_COLUMNS} FROM pages WHERE parent_id IS NOT NULL ORDER BY sort_order, id"
    ))
    .fetch_all(&state.db)
    .await?;
    let mut children_by_parent: HashMap<i64, Vec<Page>> = HashMap::new();
    for child in children.into_iter().map(row_to_page) {
        if let Some(parent_id) = child.parent_id {
            children_by_parent.entry(parent_id).or_default().push(child);
        }
    }

    Ok(pages
        .into_iter()
        .map(|page| PageWithRelations {
            user: users.get(&page.user_id).cloned(),
            children: children_by_parent.remove(&page.id).unwrap_or_default(),
            category: page.category_id.and_then(|id| categories.get(&id).cloned()),
            page,
        })
        .collect())
}

/// GET /api/pages
pub async fn list_pages(
    State(state): State<AppState>,
    Extension(_user): Extension<AuthUser>,
) -> Result<Json<Vec<PageWithRelations>>, AppError> {
    let rows: Vec<PageRow> = sqlx::query_as(&format!(
        "SELECT {PAGE_COLUMNS} FROM pages ORDER BY updated_at DESC, id DESC"
    ))
    .fetch_all(&state.db)
    .await?;

    let pages = rows.into_iter().map(row_to_page).collect();
    Ok(Json(with_relations(&state, pages).await?))
}

/// GET /api/pages/:id
///
/// `:id` is either the numeric id or the slug.
pub async fn get_page(
    State(state): State<AppState>,
    Extension(_user): Extension<AuthUser>,
    Path(key): Path<String>,
) -> Result<Json<PageWithRelations>, AppError> {
    let row: PageRow = sqlx::query_as(&format!(
        "SELECT {PAGE_COLUMNS} FROM pages WHERE id = ? OR slug = ? ORDER BY id = ? DESC LIMIT 1"
    ))
    .bind(key.parse::<i64>().ok())
    .bind(&key)
    .bind(key.parse::<i64>().ok())
    .fetch_optional(&state.db)
    .await?
    .ok_or(AppError::NotFound)?;

    let mut pages = with_relations(&state, vec![row_to_page(row)]).await?;
    pages.pop().map(Json).ok_or(AppError::NotFound)
}

/// POST /api/pages
pub async fn create_page(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CreatePageRequest>,
) -> Result<(StatusCode, Json<Page>), AppError> {
    let title = required("title", &req.title, 255)?;
    let content = content_text(req.content.as_ref())?;
    validate_tag(req.tag.as_deref(), req.tag_color.as_deref())?;
    if let Some(parent_id) = req.parent_id {
        ensure_parent_exists(&state, parent_id).await?;
    }
    if let Some(category_id) = req.category_id {
        ensure_category_exists(&state, category_id).await?;
    }

    let mut slug = slugify(&title);
    if slug.is_empty() {
        slug = random_page_slug();
    }
    if slug_taken(&state, &slug, None).await? {
        return Err(AppError::validation(
            "title",
            "A page with this title already exists.",
        ));
    }

    let now = Utc::now();
    let id = sqlx::query(
        r#"
        INSERT INTO pages (title, slug, content, user_id, parent_id, category_id, sort_order,
                           icon, tag, tag_color, is_published, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&title)
    .bind(&slug)
    .bind(content)
    .bind(user.id)
    .bind(req.parent_id)
    .bind(req.category_id)
    .bind(&req.icon)
    .bind(&req.tag)
    .bind(&req.tag_color)
    .bind(req.is_published.unwrap_or(false))
    .bind(now)
    .bind(now)
    .execute(&state.db)
    .await?
    .last_insert_rowid();

    tracing::info!("User {} created page {} ({})", user.username, id, slug);

    Ok((StatusCode::CREATED, Json(fetch_page(&state, id).await?)))
}

/// PUT /api/pages/:id
pub async fn update_page(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(req): Json<UpdatePageRequest>,
) -> Result<Json<Page>, AppError> {
    let mut page = fetch_page(&state, id).await?;
    user.require_owner_or_manager(page.user_id)?;

    if let Some(title) = &req.title {
        page.title = required("title", title, 255)?;
    }

    if let Some(slug) = &req.slug {
        let slug = slug.trim();
        if !is_valid_slug(slug) {
            return Err(AppError::validation(
                "slug",
                "The slug field must only contain lower-case letters, numbers and dashes.",
            ));
        }
        if slug_taken(&state, slug, Some(id)).await? {
            return Err(AppError::validation("slug", "The slug has already been taken."));
        }
        page.slug = slug.to_string();
    }

    if let Some(content) = &req.content {
        content_text(content.as_ref())?;
        page.content = content.clone().filter(|v| !v.is_null());
    }

    if let Some(parent_id) = req.parent_id {
        if let Some(parent_id) = parent_id {
            ensure_parent_exists(&state, parent_id).await?;
            if creates_cycle(&page_parents(&state).await?, id, parent_id) {
                return Err(AppError::validation(
                    "parent_id",
                    "A page cannot be moved under itself or one of its sub-pages.",
                ));
            }
        }
        page.parent_id = parent_id;
    }

    if let Some(category_id) = req.category_id {
        if let Some(category_id) = category_id {
            ensure_category_exists(&state, category_id).await?;
        }
        page.category_id = category_id;
    }

    if let Some(icon) = req.icon {
        page.icon = icon;
    }
    if let Some(tag) = req.tag {
        page.tag = tag;
    }
    if let Some(tag_color) = req.tag_color {
        page.tag_color = tag_color;
    }
    validate_tag(page.tag.as_deref(), page.tag_color.as_deref())?;

    if let Some(is_published) = req.is_published {
        page.is_published = is_published;
    }
    if let Some(order) = req.order {
        page.order = order;
    }

    sqlx::query(
        r#"
        UPDATE pages
        SET title = ?, slug = ?, content = ?, parent_id = ?, category_id = ?, sort_order = ?,
            icon = ?, tag = ?, tag_color = ?, is_published = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&page.title)
    .bind(&page.slug)
    .bind(content_text(page.content.as_ref())?)
    .bind(page.parent_id)
    .bind(page.category_id)
    .bind(page.order)
    .bind(&page.icon)
    .bind(&page.tag)
    .bind(&page.tag_color)
    .bind(page.is_published)
    .bind(Utc::now())
    .bind(id)
    .execute(&state.db)
    .await?;

    Ok(Json(fetch_page(&state, id).await?))
}

/// DELETE /api/pages/:id
pub async fn delete_page(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, AppError> {
    let page = fetch_page(&state, id).await?;
    user.require_owner_or_manager(page.user_id)?;

    let mut tx = state.db.begin().await?;

    // Sub-pages move to the top level rather than disappearing.
    sqlx::query("UPDATE pages SET parent_id = NULL WHERE parent_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM pages WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!("User {} deleted page {}", user.username, id);
    Ok(Json(MessageResponse::new("Page deleted successfully")))
}

/// POST /api/pages/reorder
pub async fn reorder_pages(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<ReorderPagesRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    user.require_manager()?;

    let known = page_parents(&state).await?;
    if let Some((index, _)) = req
        .pages
        .iter()
        .enumerate()
        .find(|(_, entry)| !known.contains_key(&entry.id))
    {
        return Err(AppError::validation(
            format!("pages.{index}.id"),
            format!("The selected pages.{index}.id is invalid."),
        ));
    }

    let mut tx = state.db.begin().await?;

    for entry in &req.pages {
        sqlx::query("UPDATE pages SET sort_order = ? WHERE id = ?")
            .bind(entry.order)
            .bind(entry.id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    Ok(Json(MessageResponse::new("Pages reordered successfully")))
}
