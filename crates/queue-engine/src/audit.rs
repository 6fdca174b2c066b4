//! Audit trail for the matching queue
//!
//! Every state change that moves customer money is appended here, so a
//! settled transfer can be traced back through its match to the two
//! customer requests that produced it.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::domain::ItemKind;

/// An auditable queue event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueEvent {
    /// A request entered the queue
    ItemEnqueued {
        item_id: Uuid,
        kind: ItemKind,
        customer_id: String,
        amount: Decimal,
    },

    /// A withdrawal/deposit pair was committed
    MatchCommitted {
        match_id: Uuid,
        withdrawal_id: Uuid,
        deposit_id: Uuid,
        amount: Decimal,
        score: i64,
    },

    /// A pending item was cancelled by its owner
    ItemCancelled { item_id: Uuid },

    /// Settlement completed and funds moved on the ledger
    MatchSettled {
        match_id: Uuid,
        transfer_id: Uuid,
    },

    /// Settlement failed; both items returned to the queue
    MatchFailed { match_id: Uuid, reason: String },
}

/// A logged event with its position in the trail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub seq: u64,
    pub event: QueueEvent,
}

/// Append-only in-memory audit log
pub struct AuditLog {
    entries: Vec<AuditEntry>,
    seq: u64,
}

impl AuditLog {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            seq: 0,
        }
    }

    /// Append an event, assigning it the next sequence number
    pub fn append(&mut self, event: QueueEvent) -> u64 {
        self.seq += 1;
        debug!(seq = self.seq, "Audit event recorded");
        self.entries.push(AuditEntry {
            seq: self.seq,
            event,
        });
        self.seq
    }

    /// Entries from a sequence number onwards
    pub fn entries_from(&self, from_seq: u64) -> Vec<AuditEntry> {
        self.entries
            .iter()
            .filter(|e| e.seq >= from_seq)
            .cloned()
            .collect()
    }

    /// All entries touching a given match
    pub fn entries_for_match(&self, match_id: Uuid) -> Vec<AuditEntry> {
        self.entries
            .iter()
            .filter(|e| match &e.event {
                QueueEvent::MatchCommitted { match_id: id, .. }
                | QueueEvent::MatchSettled { match_id: id, .. }
                | QueueEvent::MatchFailed { match_id: id, .. } => *id == match_id,
                _ => false,
            })
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe audit log handle
pub type SharedAuditLog = Arc<RwLock<AuditLog>>;

/// Create a new shared audit log
pub fn create_audit_log() -> SharedAuditLog {
    Arc::new(RwLock::new(AuditLog::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_append_assigns_sequence() {
        let mut log = AuditLog::new();
        let s1 = log.append(QueueEvent::ItemCancelled {
            item_id: Uuid::from_u128(1),
        });
        let s2 = log.append(QueueEvent::ItemCancelled {
            item_id: Uuid::from_u128(2),
        });
        assert_eq!(s1, 1);
        assert_eq!(s2, 2);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_entries_for_match_traces_lifecycle() {
        let mut log = AuditLog::new();
        let match_id = Uuid::from_u128(42);

        log.append(QueueEvent::ItemEnqueued {
            item_id: Uuid::from_u128(1),
            kind: ItemKind::Withdrawal,
            customer_id: "a".to_string(),
            amount: dec!(50),
        });
        log.append(QueueEvent::MatchCommitted {
            match_id,
            withdrawal_id: Uuid::from_u128(1),
            deposit_id: Uuid::from_u128(2),
            amount: dec!(50),
            score: 75,
        });
        log.append(QueueEvent::MatchSettled {
            match_id,
            transfer_id: Uuid::from_u128(9),
        });

        let trail = log.entries_for_match(match_id);
        assert_eq!(trail.len(), 2);
        assert_eq!(trail[0].seq, 2);
        assert_eq!(trail[1].seq, 3);
    }
}
