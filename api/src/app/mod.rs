//! Application layer
//!
//! Services the HTTP handlers coordinate: the live feed and local logins.

pub mod feed_controller;
pub mod login_service;

pub use feed_controller::FeedController;
pub use login_service::LoginService;
