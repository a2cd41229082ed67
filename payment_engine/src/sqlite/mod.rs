//! SQLite database module for the payment engine.
//!
//! Migrations live in `migrations/` next to this file and are embedded by `sqlx::migrate!`.
mod sqlite_impl;

pub mod db;
pub use sqlite_impl::SqliteDatabase;
