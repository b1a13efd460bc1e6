use serde::{Deserialize, Serialize};

pub const DEFAULT_TAG_COLOR: &str = "#6366f1";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub color: String,
}
