//! HTTP handlers
//!
//! Axum request handlers for the API endpoints.

pub mod config;
pub mod login;

pub use config::get_config;
pub use login::login;
