//! SQLite-backed network store.
//!
//! This module provides:
//! - Database initialization and migrations
//! - SQLite pragma configuration
//! - `Repository`, the `NetworkStore` implementation over sqlx

pub mod migrations;
pub mod repo;

pub use migrations::init_db;
pub use repo::Repository;
