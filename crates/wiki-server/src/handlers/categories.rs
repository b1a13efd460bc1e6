use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use wiki_shared::api::{
    CreateCategoryRequest, MessageResponse, ReorderCategoriesRequest, UpdateCategoryRequest,
};
use wiki_shared::{Category, CategoryTree, CategoryWithChildren, Page};

use super::required;
use crate::auth::AuthUser;
use crate::db::rows::{row_to_category, row_to_page, CategoryRow, PageRow, CATEGORY_COLUMNS, PAGE_COLUMNS};
use crate::error::AppError;
use crate::hierarchy::creates_cycle;
use crate::routes::AppState;
use crate::slug::slugify;

async fn fetch_category(state: &AppState, id: i64) -> Result<Category, AppError> {
    let row: CategoryRow =
        sqlx::query_as(&format!("SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = ?"))
            .bind(id)
            .fetch_optional(&state.db)
            .await?
            .ok_or(AppError::NotFound)?;

    Ok(row_to_category(row))
}

async fn category_parents(state: &AppState) -> Result<HashMap<i64, Option<i64>>, AppError> {
    let rows: Vec<(i64, Option<i64>)> = sqlx::query_as("SELECT id, parent_id FROM categories")
        .fetch_all(&state.db)
        .await?;

    Ok(rows.into_iter().collect())
}

/// First free slug among `base`, `base-1`, `base-2`, ...
async fn unique_slug(state: &AppState, name: &str, except: Option<i64>) -> Result<String, AppError> {
    let mut base = slugify(name);
    if base.is_empty() {
        base = "category".to_string();
    }

    let mut slug = base.clone();
    let mut counter = 1;
    loop {
        let taken: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM categories WHERE slug = ? AND id IS NOT ?")
                .bind(&slug)
                .bind(except)
                .fetch_optional(&state.db)
                .await?;
        if taken.is_none() {
            return Ok(slug);
        }
        slug = format!("{base}-{counter}");
        counter += 1;
    }
}

async fn ensure_parent_exists(state: &AppState, id: i64) -> Result<(), AppError> {
    let found: Option<(i64,)> = sqlx::query_as("SELECT id FROM categories WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db)
        .await?;

    found
        .map(|_| ())
        .ok_or_else(|| AppError::validation("parent_id", "The selected parent id is invalid."))
}

fn build_tree(
    parent_id: Option<i64>,
    by_parent: &mut HashMap<Option<i64>, Vec<Category>>,
    pages: &mut HashMap<i64, Vec<Page>>,
) -> Vec<CategoryTree> {
    by_parent
        .remove(&parent_id)
        .unwrap_or_default()
        .into_iter()
        .map(|category| CategoryTree {
            all_children: build_tree(Some(category.id), by_parent, pages),
            pages: pages.remove(&category.id).unwrap_or_default(),
            category,
        })
        .collect()
}

/// GET /api/categories
///
/// Root categories with their whole subtree and filed pages.
pub async fn list_categories(
    State(state): State<AppState>,
    Extension(_user): Extension<AuthUser>,
) -> Result<Json<Vec<CategoryTree>>, AppError> {
    let rows: Vec<CategoryRow> = sqlx::query_as(&format!(
        "SELECT {CATEGORY_COLUMNS} FROM categories ORDER BY sort_order, id"
    ))
    .fetch_all(&state.db)
    .await?;

    let mut by_parent: HashMap<Option<i64>, Vec<Category>> = HashMap::new();
    for category in rows.into_iter().map(row_to_category) {
        by_parent.entry(category.parent_id).or_default().push(category);
    }

    let page_rows: Vec<PageRow> = sqlx::query_as(&format!(
        "SELECT {PAGE_COLUMNS} FROM pages WHERE category_id IS NOT NULL ORDER BY sort_order, id"
    ))
    .fetch_all(&state.db)
    .await?;

    let mut pages: HashMap<i64, Vec<Page>> = HashMap::new();
    for page in page_rows.into_iter().map(row_to_page) {
        if let Some(category_id) = page.category_id {
            pages.entry(category_id).or_default().push(page);
        }
    }

    Ok(Json(build_tree(None, &mut by_parent, &mut pages)))
}

/// GET /api/categories/:id
pub async fn get_category(
    State(state): State<AppState>,
    Extension(_user): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<Json<CategoryWithChildren>, AppError> {
    let category = fetch_category(&state, id).await?;

    let rows: Vec<CategoryRow> = sqlx::query_as(&format!(
        "SELECT {CATEGORY_COLUMNS} FROM categories WHERE parent_id = ? ORDER BY sort_order, id"
    ))
    .bind(id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(CategoryWithChildren {
        category,
        children: rows.into_iter().map(row_to_category).collect(),
    }))
}

/// POST /api/categories
pub async fn create_category(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CreateCategoryRequest>,
) -> Result<(StatusCode, Json<Category>), AppError> {
    user.require_manager()?;

    let name = required("name", &req.name, 255)?;
    if let Some(parent_id) = req.parent_id {
        ensure_parent_exists(&state, parent_id).await?;
    }

    let slug = unique_slug(&state, &name, None).await?;

    // Missing or zero order appends after the last sibling.
    let order = match req.order {
        Some(order) if order != 0 => order,
        _ => {
            let (max,): (i64,) = sqlx::query_as(
                "SELECT COALESCE(MAX(sort_order), 0) FROM categories WHERE parent_id IS ?",
            )
            .bind(req.parent_id)
            .fetch_one(&state.db)
            .await?;
            max + 1
        }
    };

    let now = Utc::now();
    let id = sqlx::query(
        r#"
        INSERT INTO categories (name, slug, description, parent_id, icon, sort_order, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&name)
    .bind(&slug)
    .bind(&req.description)
    .bind(req.parent_id)
    .bind(&req.icon)
    .bind(order)
    .bind(now)
    .bind(now)
    .execute(&state.db)
    .await?
    .last_insert_rowid();

    tracing::info!("User {} created category {} ({})", user.username, id, slug);

    Ok((StatusCode::CREATED, Json(fetch_category(&state, id).await?)))
}

/// PUT /api/categories/:id
pub async fn update_category(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateCategoryRequest>,
) -> Result<Json<Category>, AppError> {
    user.require_manager()?;

    let mut category = fetch_category(&state, id).await?;

    if let Some(name) = &req.name {
        category.name = required("name", name, 255)?;
        category.slug = unique_slug(&state, &category.name, Some(id)).await?;
    }

    if let Some(parent_id) = req.parent_id {
        if let Some(parent_id) = parent_id {
            ensure_parent_exists(&state, parent_id).await?;
            if creates_cycle(&category_parents(&state).await?, id, parent_id) {
                return Err(AppError::validation(
                    "parent_id",
                    "A category cannot be moved under itself or one of its descendants.",
                ));
            }
        }
        category.parent_id = parent_id;
    }

    if let Some(description) = req.description {
        category.description = description;
    }
    if let Some(icon) = req.icon {
        category.icon = icon;
    }
    if let Some(order) = req.order {
        category.order = order;
    }

    sqlx::query(
        r#"
        UPDATE categories
        SET name = ?, slug = ?, description = ?, parent_id = ?, icon = ?, sort_order = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&category.name)
    .bind(&category.slug)
    .bind(&category.description)
    .bind(category.parent_id)
    .bind(&category.icon)
    .bind(category.order)
    .bind(Utc::now())
    .bind(id)
    .execute(&state.db)
    .await?;

    Ok(Json(fetch_category(&state, id).await?))
}

/// DELETE /api/categories/:id
pub async fn delete_category(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, AppError> {
    user.require_manager()?;
    fetch_category(&state, id).await?;

    let mut tx = state.db.begin().await?;

    sqlx::query("UPDATE categories SET parent_id = NULL WHERE parent_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("UPDATE pages SET category_id = NULL WHERE category_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM categories WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!("User {} deleted category {}", user.username, id);
    Ok(Json(MessageResponse::new("Category deleted successfully")))
}

/// POST /api/categories/reorder
pub async fn reorder_categories(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<ReorderCategoriesRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    user.require_manager()?;

    let known = category_parents(&state).await?;
    if let Some((index, _)) = req
        .categories
        .iter()
        .enumerate()
        .find(|(_, entry)| !known.contains_key(&entry.id))
    {
        return Err(AppError::validation(
            format!("categories.{index}.id"),
            format!("The selected categories.{index}.id is invalid."),
        ));
    }

    let mut tx = state.db.begin().await?;

    for entry in &req.categories {
        sqlx::query("UPDATE categories SET sort_order = ? WHERE id = ?")
            .bind(entry.order)
            .bind(entry.id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    Ok(Json(MessageResponse::new("Categories reordered successfully")))
}
