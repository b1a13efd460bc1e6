use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::blocks::Block;

use super::{Category, User};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub id: i64,
    pub title: String,
    pub slug: String,
    /// Block sequence kept as an opaque JSON array; the server never inspects it.
    #[serde(default)]
    pub content: Option<serde_json::Value>,
    pub user_id: i64,
    pub parent_id: Option<i64>,
    pub category_id: Option<i64>,
    pub order: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    pub tag: Option<String>,
    pub tag_color: Option<String>,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Page {
    /// Decode the stored content into blocks. Missing content is an empty document.
    pub fn blocks(&self) -> Result<Vec<Block>, serde_json::Error> {
        match &self.content {
            Some(value) if !value.is_null() => serde_json::from_value(value.clone()),
            _ => Ok(Vec::new()),
        }
    }

    /// Pages with neither a category nor a parent page sit at the top level.
    pub fn is_root(&self) -> bool {
        self.category_id.is_none() && self.parent_id.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageWithRelations {
    #[serde(flatten)]
    pub page: Page,
    pub user: Option<User>,
    #[serde(default)]
    pub children: Vec<Page>,
    pub category: Option<Category>,
}
