//! Store trait for the matching queue
//!
//! The store is the single source of truth for queue state. All cross-item
//! transitions (commit, cancel, settle, rollback) are store operations so
//! each backend can make them atomic in its own way: the in-memory store
//! holds one write lock across the check-then-set, the Postgres store uses
//! conditional updates inside a transaction.

use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::{ItemFilter, ItemKind, MatchFilter, MatchRecord, QueueItem, QueueStats};
use crate::error::QueueResult;

/// Durable, transactional storage for queue items and matches
#[async_trait]
pub trait QueueStore: Send + Sync {
    // ------------------------------------------------------------------------
    // Item operations
    // ------------------------------------------------------------------------

    /// Insert a new Pending item
    ///
    /// Fails with `DuplicateId` only when the caller supplies an id that
    /// already exists (ids are normally generator-assigned upstream).
    async fn insert(&self, item: QueueItem) -> QueueResult<QueueItem>;

    /// Fetch an item by id
    async fn get(&self, item_id: Uuid) -> QueueResult<Option<QueueItem>>;

    /// All Pending items of `kind` whose payment method matches exactly,
    /// ordered by created_at ascending (FIFO base order; the scorer
    /// re-ranks). `kind` is the counterpart kind being searched for.
    async fn find_pending_opposite(
        &self,
        kind: ItemKind,
        payment_method: &str,
    ) -> QueueResult<Vec<QueueItem>>;

    /// Atomically cancel a Pending item
    ///
    /// Fails with `InvalidState` when the item already left Pending; a
    /// cancel racing a concurrent match commit loses and the match stands.
    async fn cancel_item(&self, item_id: Uuid) -> QueueResult<QueueItem>;

    // ------------------------------------------------------------------------
    // Match operations
    // ------------------------------------------------------------------------

    /// Atomically commit a match between a withdrawal and a deposit
    ///
    /// In one all-or-nothing step: re-checks both items are still Pending,
    /// flips them to Matched with symmetric `matched_with`, and writes a
    /// Pending match row. Fails with `Conflict` when either item was
    /// concurrently claimed; the caller then retries the next candidate.
    async fn commit_match(
        &self,
        withdrawal_id: Uuid,
        deposit_id: Uuid,
        amount: Decimal,
        score: i64,
    ) -> QueueResult<MatchRecord>;

    /// Fetch a match by id
    async fn get_match(&self, match_id: Uuid) -> QueueResult<Option<MatchRecord>>;

    /// The most recent match involving an item, if any
    async fn match_for_item(&self, item_id: Uuid) -> QueueResult<Option<MatchRecord>>;

    /// Mark a Pending match Completed: funds moved; both items become
    /// Settled and `completed_at` is stamped.
    async fn complete_match(&self, match_id: Uuid) -> QueueResult<MatchRecord>;

    /// Mark a Pending match Failed: settlement rolled back; both items
    /// return to Pending with `matched_with` cleared so they can re-match.
    async fn fail_match(&self, match_id: Uuid, reason: &str) -> QueueResult<MatchRecord>;

    // ------------------------------------------------------------------------
    // Projections
    // ------------------------------------------------------------------------

    /// List items passing a filter, created_at ascending
    async fn list_items(&self, filter: &ItemFilter) -> QueueResult<Vec<QueueItem>>;

    /// List matches passing a filter, created_at ascending
    async fn list_matches(&self, filter: &MatchFilter) -> QueueResult<Vec<MatchRecord>>;

    /// Aggregate queue counters
    async fn stats(&self) -> QueueResult<QueueStats>;
}
