//! Queue error types

use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur in the matching queue
#[derive(Error, Debug)]
pub enum QueueError {
    /// Request rejected before insertion (bad amount, empty fields)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Caller supplied an id that already exists
    #[error("Duplicate id: {0}")]
    DuplicateId(Uuid),

    /// An item involved in a commit was concurrently claimed.
    /// Transient and expected under concurrency; the match engine retries
    /// against the next candidate and never surfaces this to callers.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Attempted transition from a terminal or mismatched state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Item or match not found
    #[error("Not found: {0}")]
    NotFound(Uuid),

    /// Underlying persistence failure; fatal for the current operation
    #[error("Storage error: {0}")]
    Storage(String),
}

impl QueueError {
    /// True for errors the candidate loop may retry past
    pub fn is_conflict(&self) -> bool {
        matches!(self, QueueError::Conflict(_))
    }
}

/// Result type for queue operations
pub type QueueResult<T> = std::result::Result<T, QueueError>;
