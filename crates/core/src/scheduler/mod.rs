//! Sequential job scheduler.
//!
//! Work is grouped into named queues. Each queue runs its jobs one at a time
//! in FIFO order with a fixed delay between consecutive jobs, while distinct
//! queues run independently of each other. Jobs may enqueue further jobs,
//! including onto their own queue.

mod handle;
mod worker;

pub use handle::{Job, JobScheduler};
pub use worker::QueueWorker;

/// Queue for metadata provider calls.
pub const METADATA_QUEUE: &str = "metadata";

/// Queue for search provider and download client calls.
pub const SEARCH_QUEUE: &str = "search";
