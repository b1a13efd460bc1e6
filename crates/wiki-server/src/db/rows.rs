//! Column lists and tuple rows shared by the handlers.

use chrono::{DateTime, Utc};
use wiki_shared::{Category, Page, Role, Tag, User};

pub const USER_COLUMNS: &str = "id, username, role, created_at, updated_at";

pub type UserRow = (
    i64,           // id
    String,        // username
    Role,          // role
    DateTime<Utc>, // created_at
    DateTime<Utc>, // updated_at
);

pub fn row_to_user(row: UserRow) -> User {
    User {
        id: row.0,
        username: row.1,
        role: row.2,
        created_at: row.3,
        updated_at: row.4,
    }
}

pub const CATEGORY_COLUMNS: &str =
    "id, name, slug, description, parent_id, icon, sort_order, created_at, updated_at";

pub type CategoryRow = (
    i64,            // id
    String,         // name
    String,         // slug
    Option<String>, // description
    Option<i64>,    // parent_id
    Option<String>, // icon
    i64,            // sort_order
    DateTime<Utc>,  // created_at
    DateTime<Utc>,  // updated_at
);

pub fn row_to_category(row: CategoryRow) -> Category {
    Category {
        id: row.0,
        name: row.1,
        slug: row.2,
        description: row.3,
        parent_id: row.4,
        icon: row.5,
        order: row.6,
        created_at: row.7,
        updated_at: row.8,
    }
}

pub const PAGE_COLUMNS: &str = "id, title, slug, content, user_id, parent_id, category_id, \
     sort_order, icon, tag, tag_color, is_published, created_at, updated_at";

pub type PageRow = (
    i64,            // id
    String,         // title
    String,         // slug
    Option<String>, // content (JSON text)
    i64,            // user_id
    Option<i64>,    // parent_id
    Option<i64>,    // category_id
    i64,            // sort_order
    Option<String>, // icon
    Option<String>, // tag
    Option<String>, // tag_color
    bool,           // is_published
    DateTime<Utc>,  // created_at
    DateTime<Utc>,  // updated_at
);

/// Parse stored page content. Unreadable text is logged and shown as empty.
fn stored_content(page_id: i64, text: &str) -> Option<serde_json::Value> {
    match serde_json::from_str(text) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("Page {} has unreadable content: {}", page_id, e);
            None
        }
    }
}

pub fn row_to_page(row: PageRow) -> Page {
    Page {
        id: row.0,
        title: row.1,
        slug: row.2,
        content: row.3.and_then(|text| stored_content(row.0, &text)),
        user_id: row.4,
        parent_id: row.5,
        category_id: row.6,
        order: row.7,
        icon: row.8,
        tag: row.9,
        tag_color: row.10,
        is_published: row.11,
        created_at: row.12,
        updated_at: row.13,
    }
}

pub type TagRow = (i64, String, String);

pub fn row_to_tag(row: TagRow) -> Tag {
    Tag {
        id: row.0,
        name: row.1,
        color: row.2,
    }
}
