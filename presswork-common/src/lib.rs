//! # Presswork Common Library
//!
//! Shared code for the Presswork server and department terminals:
//! - Work order (activity) and reprint request models
//! - Error taxonomy shared by the workflow core and its clients
//! - Notification events, category mapping and the NotificationBus
//! - Configuration loading
//! - SQLite initialization and lock-retry helpers (feature `sqlx`)

pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;
pub mod events;
pub mod models;

pub use error::{Error, Result};
pub use models::Department;
