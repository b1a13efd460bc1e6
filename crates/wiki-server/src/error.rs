use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Unauthenticated")]
    Unauthorized,

    #[error("Unauthorized")]
    Forbidden,

    #[error("Resource not found")]
    NotFound,

    #[error("{message}")]
    Validation { field: String, message: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, json!({ "message": self.to_string() })),
            AppError::Forbidden => (StatusCode::FORBIDDEN, json!({ "message": self.to_string() })),
            AppError::NotFound | AppError::Database(sqlx::Error::RowNotFound) => (
                StatusCode::NOT_FOUND,
                json!({ "message": AppError::NotFound.to_string() }),
            ),
            AppError::Validation { field, message } => {
                let mut errors = serde_json::Map::new();
                errors.insert(field.clone(), json!([message]));
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    json!({ "message": message, "errors": errors }),
                )
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "message": "Database error" }),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "message": "Internal error" }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}
