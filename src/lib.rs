pub mod auth;
pub mod collab;
pub mod error;
pub mod models;
pub mod openapi;
pub mod query;
pub mod rate_limit;
pub mod repo;
pub mod routes;

// Re-export commonly used items for tests / external users
pub use routes::{config, AppState};
