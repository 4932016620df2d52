pub mod auth;
pub mod config;
pub mod content;
pub mod error;
pub mod models;
pub mod openapi;
pub mod posts;
pub mod rate_limit;
pub mod related;
pub mod repo;
pub mod routes;
pub mod security;
pub mod sidebar;
pub mod tags;

// Re-export commonly used items for tests / the binary
pub use routes::{config, AppState};
pub use security::SecurityHeaders;
