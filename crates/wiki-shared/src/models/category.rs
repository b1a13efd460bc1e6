use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Page;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub parent_id: Option<i64>,
    pub icon: Option<String>,
    pub order: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A category with its whole subtree and the pages filed directly under it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryTree {
    #[serde(flatten)]
    pub category: Category,
    #[serde(default)]
    pub all_children: Vec<CategoryTree>,
    #[serde(default)]
    pub pages: Vec<Page>,
}

impl CategoryTree {
    /// Depth-first (id, name, depth) listing, used by category pickers.
    pub fn flatten(trees: &[CategoryTree]) -> Vec<(i64, String, usize)> {
        fn walk(trees: &[CategoryTree], depth: usize, out: &mut Vec<(i64, String, usize)>) {
            for tree in trees {
                out.push((tree.category.id, tree.category.name.clone(), depth));
                walk(&tree.all_children, depth + 1, out);
            }
        }

        let mut out = Vec::new();
        walk(trees, 0, &mut out);
        out
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryWithChildren {
    #[serde(flatten)]
    pub category: Category,
    #[serde(default)]
    pub children: Vec<Category>,
}
