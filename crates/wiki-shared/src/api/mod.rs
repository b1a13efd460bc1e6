mod auth;
mod categories;
mod pages;
mod settings;
mod structure;
mod tags;
mod users;

pub use auth::*;
pub use categories::*;
pub use pages::*;
pub use settings::*;
pub use structure::*;
pub use tags::*;
pub use users::*;

use serde::{Deserialize, Deserializer, Serialize};

/// Body of endpoints that answer with a confirmation only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// `{id, order}` pair used by the single-table reorder endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderEntry {
    pub id: i64,
    pub order: i64,
}

/// Tells "field absent" (`None`) apart from "field set to null" (`Some(None)`).
pub(crate) fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
