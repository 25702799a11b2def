//! In-memory tracking state for watch-list items and users.

mod store;
mod types;

pub use store::TrackingStore;
pub use types::*;
