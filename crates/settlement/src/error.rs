use queue_engine::QueueError;
use thiserror::Error;
use uuid::Uuid;

/// Settlement errors
#[derive(Error, Debug)]
pub enum SettlementError {
    #[error("Match not found: {0}")]
    MatchNotFound(Uuid),

    #[error("Invalid match state: {0}")]
    InvalidState(String),

    #[error("Transfer failed for match {match_id}: {reason}")]
    TransferFailed { match_id: Uuid, reason: String },

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}

pub type SettlementResult<T> = Result<T, SettlementError>;
