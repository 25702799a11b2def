use thiserror::Error;

use crate::tracking::TrackingSnapshot;

/// Current on-disk schema version.
pub const SCHEMA_VERSION: i64 = 2;

/// Errors for persistence operations.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Unsupported schema version {found} (newest known is {SCHEMA_VERSION})")]
    UnsupportedVersion { found: i64 },

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Connection lock poisoned")]
    Poisoned,
}

impl From<rusqlite::Error> for PersistenceError {
    fn from(e: rusqlite::Error) -> Self {
        PersistenceError::Database(e.to_string())
    }
}

/// Durable storage for the tracking state.
pub trait TrackingPersistence: Send + Sync {
    /// Load the last saved snapshot. An empty store yields an empty snapshot.
    fn load(&self) -> Result<TrackingSnapshot, PersistenceError>;

    /// Replace the stored snapshot.
    fn save(&self, snapshot: &TrackingSnapshot) -> Result<(), PersistenceError>;
}
