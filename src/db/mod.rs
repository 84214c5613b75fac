//! Local fallback storage: models and schema for the on-disk key/value cache.
//!
//! Layout:
//! - `models.rs`: Rust structs mirroring DB rows
//! - `schema.rs`: SQL DDL for initializing the database (SQLite-first)
//! - `sqlite.rs`: the `LocalStorage` handle

pub mod models;
pub mod schema;
pub mod sqlite;

pub use models::DbEntry;
pub use schema::SQLITE_INIT;
pub use sqlite::{LocalStorage, MOTIVATION_COUNT_KEY, SqlitePool};
