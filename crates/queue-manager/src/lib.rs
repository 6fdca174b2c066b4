//! Customer-facing queue operations
//!
//! [`QueueManager`] is the entry point callers use: it validates incoming
//! withdrawal and deposit requests, hands them to the match engine, keeps
//! the audit trail, and exposes read-side queries over the queue.

pub mod manager;

pub use manager::{EnqueueOutcome, EnqueueRequest, QueueManager};
