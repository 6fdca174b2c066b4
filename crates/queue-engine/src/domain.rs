//! Domain types for the matching queue
//!
//! These types are shared across all store implementations (in-memory,
//! Postgres) and mirror the persisted `queue_items` / `queue_matches` rows.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Item Kind
// ============================================================================

/// Kind of a queue item (withdrawal or deposit)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    /// Customer wants money out
    Withdrawal,
    /// Customer is putting money in
    Deposit,
}

impl ItemKind {
    /// Returns the counterpart kind a match must pair with
    pub fn opposite(&self) -> Self {
        match self {
            ItemKind::Withdrawal => ItemKind::Deposit,
            ItemKind::Deposit => ItemKind::Withdrawal,
        }
    }

    /// Returns true if this is a withdrawal
    pub fn is_withdrawal(&self) -> bool {
        matches!(self, ItemKind::Withdrawal)
    }

    /// Stable string form, as persisted
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Withdrawal => "withdrawal",
            ItemKind::Deposit => "deposit",
        }
    }

    /// Parse from the persisted string form
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "withdrawal" => Some(ItemKind::Withdrawal),
            "deposit" => Some(ItemKind::Deposit),
            _ => None,
        }
    }
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Item Status
// ============================================================================

/// Lifecycle state of a queue item
///
/// Transitions: `Pending -> {Matched, Cancelled}`,
/// `Matched -> {Settled, Pending}` (back to Pending on settlement
/// rollback). `Cancelled` and `Settled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Waiting for a compatible counterpart
    Pending,
    /// Paired into a match awaiting settlement
    Matched,
    /// Withdrawn by the customer before matching
    Cancelled,
    /// Funds moved; item fully resolved
    Settled,
}

impl ItemStatus {
    /// True once no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemStatus::Cancelled | ItemStatus::Settled)
    }

    /// Stable string form, as persisted
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Matched => "matched",
            ItemStatus::Cancelled => "cancelled",
            ItemStatus::Settled => "settled",
        }
    }

    /// Parse from the persisted string form
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ItemStatus::Pending),
            "matched" => Some(ItemStatus::Matched),
            "cancelled" => Some(ItemStatus::Cancelled),
            "settled" => Some(ItemStatus::Settled),
            _ => None,
        }
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Queue Item
// ============================================================================

/// One pending or resolved transfer request
///
/// `amount`, `payment_method`, and `payment_details` are immutable once
/// the item leaves `Pending`; the stores expose no way to rewrite them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    /// Unique identifier, generated at insertion
    pub id: Uuid,
    /// Withdrawal or deposit
    pub kind: ItemKind,
    /// Owner of the request
    pub customer_id: String,
    /// Requested amount; strictly positive, fixed-point
    pub amount: Decimal,
    /// Payment rail name (e.g. "venmo"); must match exactly for pairing
    pub payment_method: String,
    /// Opaque destination identifier (handle, account)
    pub payment_details: String,
    /// Tie-break preference; higher wins, default 1
    pub priority: u32,
    /// Lifecycle state
    pub status: ItemStatus,
    /// Insertion timestamp
    pub created_at: DateTime<Utc>,
    /// Id of the paired item once matched (symmetric)
    pub matched_with: Option<Uuid>,
    /// Optional free text
    pub notes: Option<String>,
}

impl QueueItem {
    /// Create a new pending item
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: Uuid,
        kind: ItemKind,
        customer_id: impl Into<String>,
        amount: Decimal,
        payment_method: impl Into<String>,
        payment_details: impl Into<String>,
        priority: u32,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            kind,
            customer_id: customer_id.into(),
            amount,
            payment_method: payment_method.into(),
            payment_details: payment_details.into(),
            priority,
            status: ItemStatus::Pending,
            created_at,
            matched_with: None,
            notes: None,
        }
    }

    /// Attach free-text notes
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// True while the item awaits a counterpart
    pub fn is_pending(&self) -> bool {
        self.status == ItemStatus::Pending
    }

    /// Cancellation is valid only from `Pending`
    pub fn can_cancel(&self) -> bool {
        self.is_pending()
    }
}

// ============================================================================
// Match
// ============================================================================

/// Lifecycle state of a committed match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    /// Committed, awaiting settlement
    Pending,
    /// Funds moved
    Completed,
    /// Settlement failed; items were returned to the queue
    Failed,
}

impl MatchStatus {
    /// Stable string form, as persisted
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Pending => "pending",
            MatchStatus::Completed => "completed",
            MatchStatus::Failed => "failed",
        }
    }

    /// Parse from the persisted string form
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(MatchStatus::Pending),
            "completed" => Some(MatchStatus::Completed),
            "failed" => Some(MatchStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A committed withdrawal/deposit pairing
///
/// The settled amount is the withdrawal amount; a deposit may over-cover
/// and the excess is consumed with it (no remainder splitting).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRecord {
    /// Unique identifier
    pub id: Uuid,
    /// The withdrawal item
    pub withdrawal_id: Uuid,
    /// The deposit item
    pub deposit_id: Uuid,
    /// Settled amount (= withdrawal amount)
    pub amount: Decimal,
    /// Compatibility score the pair was committed at
    pub match_score: i64,
    /// Milliseconds from commit to completion, stamped when the match completes
    pub processing_time_ms: i64,
    /// Lifecycle state
    pub status: MatchStatus,
    /// Commit timestamp
    pub created_at: DateTime<Utc>,
    /// When funds moved (Completed only)
    pub completed_at: Option<DateTime<Utc>>,
    /// Optional free text (failure reason on rollback)
    pub notes: Option<String>,
}

impl MatchRecord {
    /// True while the match awaits settlement
    pub fn is_pending(&self) -> bool {
        self.status == MatchStatus::Pending
    }
}

// ============================================================================
// Stats & Filters
// ============================================================================

/// Aggregate queue counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// All items ever inserted, any status
    pub total_items: u64,
    /// Withdrawals currently awaiting a counterpart
    pub pending_withdrawals: u64,
    /// Deposits currently awaiting a counterpart
    pub pending_deposits: u64,
    /// Committed matches that still stand (Failed ones were rolled back)
    pub matched_pairs: u64,
}

/// Filter for item listings; `None` fields match everything
#[derive(Debug, Clone, Default)]
pub struct ItemFilter {
    pub kind: Option<ItemKind>,
    pub status: Option<ItemStatus>,
    pub customer_id: Option<String>,
    pub payment_method: Option<String>,
}

impl ItemFilter {
    /// Does an item pass this filter?
    pub fn matches(&self, item: &QueueItem) -> bool {
        self.kind.map_or(true, |k| item.kind == k)
            && self.status.map_or(true, |s| item.status == s)
            && self
                .customer_id
                .as_ref()
                .map_or(true, |c| &item.customer_id == c)
            && self
                .payment_method
                .as_ref()
                .map_or(true, |m| &item.payment_method == m)
    }
}

/// Filter for match listings
#[derive(Debug, Clone, Default)]
pub struct MatchFilter {
    pub status: Option<MatchStatus>,
}

impl MatchFilter {
    /// Does a match pass this filter?
    pub fn matches(&self, record: &MatchRecord) -> bool {
        self.status.map_or(true, |s| record.status == s)
    }
}

// ============================================================================
// Tests
// ============================================================================
