use serde::{Deserialize, Serialize};

use super::User;

pub const MAINTENANCE_MODE_KEY: &str = "maintenance_mode";
pub const MAINTENANCE_REASON_KEY: &str = "maintenance_reason";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceStatus {
    pub maintenance: bool,
    pub message: String,
}

impl MaintenanceStatus {
    /// Whether a user with this role is locked out of everything but login.
    pub fn blocks(&self, user: Option<&User>) -> bool {
        self.maintenance && !user.is_some_and(|u| u.role.is_admin())
    }
}

/// Settings are stored as strings; accepts the usual boolean spellings.
pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "on" | "yes"
    )
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminStats {
    pub total_users: i64,
    pub admins_count: i64,
    pub documentalistes_count: i64,
    pub users_count: i64,
    pub total_pages: i64,
    pub latest_users: Vec<User>,
}
