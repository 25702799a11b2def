//! Durable storage for watch items, tracked users and the last update time.
//!
//! The SQLite schema is versioned through `PRAGMA user_version` and migrated
//! once when the database is opened.

mod sqlite;
mod types;

pub use sqlite::SqliteTrackingPersistence;
pub use types::{PersistenceError, TrackingPersistence, SCHEMA_VERSION};
