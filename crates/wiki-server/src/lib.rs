pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod hierarchy;
pub mod routes;
pub mod slug;

pub use config::Config;
pub use db::DbPool;
pub use routes::{create_router, AppState};
