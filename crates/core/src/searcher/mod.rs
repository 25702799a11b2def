//! Release search abstraction.
//!
//! This module provides a `Searcher` trait that turns a query string into raw
//! release listings and recurring feed URLs, with a Nyaa RSS implementation.

mod nyaa;
mod types;

pub use nyaa::NyaaSearcher;
pub use types::*;
