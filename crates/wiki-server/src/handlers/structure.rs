use axum::{extract::State, Extension, Json};
use wiki_shared::api::{MessageResponse, ReorderStructureRequest};
use wiki_shared::NodeKind;

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::routes::AppState;

/// POST /api/structure/reorder
///
/// Writes `order` for each `{id, type}` into the matching table. Unknown ids
/// are skipped.
pub async fn reorder_structure(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<ReorderStructureRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    user.require_manager()?;

    let mut tx = state.db.begin().await?;

    for item in &req.items {
        let query = match item.kind {
            NodeKind::Category => "UPDATE categories SET sort_order = ? WHERE id = ?",
            NodeKind::Page => "UPDATE pages SET sort_order = ? WHERE id = ?",
        };
        sqlx::query(query)
            .bind(item.order)
            .bind(item.id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    tracing::debug!("User {} reordered {} nodes", user.username, req.items.len());
    Ok(Json(MessageResponse::new("Structure updated successfully")))
}
