//! In-memory queue store
//!
//! Fast, non-persistent backend for tests, the demo driver, and
//! development. A single `tokio::sync::RwLock` guards all state; every
//! multi-row transition runs under one write guard, which gives exactly
//! the two-row serializable semantics `commit_match` requires.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use common::{Clock, IdGenerator, SystemClock, UuidGenerator};

use crate::domain::{
    ItemFilter, ItemKind, ItemStatus, MatchFilter, MatchRecord, MatchStatus, QueueItem, QueueStats,
};
use crate::error::{QueueError, QueueResult};
use crate::store::traits::QueueStore;

#[derive(Default)]
struct State {
    items: HashMap<Uuid, QueueItem>,
    matches: HashMap<Uuid, MatchRecord>,
}

/// In-memory store for queue items and matches
pub struct MemoryQueueStore {
    state: RwLock<State>,
    clock: Arc<dyn Clock>,
    id_gen: Arc<dyn IdGenerator>,
}

impl MemoryQueueStore {
    /// Create a store with wall-clock time and random ids
    pub fn new() -> Self {
        Self::with_collaborators(Arc::new(SystemClock), Arc::new(UuidGenerator))
    }

    /// Create a store with injected clock and id generator
    pub fn with_collaborators(clock: Arc<dyn Clock>, id_gen: Arc<dyn IdGenerator>) -> Self {
        Self {
            state: RwLock::new(State::default()),
            clock,
            id_gen,
        }
    }
}

impl Default for MemoryQueueStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn insert(&self, item: QueueItem) -> QueueResult<QueueItem> {
        let mut state = self.state.write().await;
        if state.items.contains_key(&item.id) {
            return Err(QueueError::DuplicateId(item.id));
        }
        state.items.insert(item.id, item.clone());
        debug!(item_id = %item.id, kind = %item.kind, "Item inserted");
        Ok(item)
    }

    async fn get(&self, item_id: Uuid) -> QueueResult<Option<QueueItem>> {
        let state = self.state.read().await;
        Ok(state.items.get(&item_id).cloned())
    }

    async fn find_pending_opposite(
        &self,
        kind: ItemKind,
        payment_method: &str,
    ) -> QueueResult<Vec<QueueItem>> {
        let state = self.state.read().await;
        let mut found: Vec<QueueItem> = state
            .items
            .values()
            .filter(|i| {
                i.status == ItemStatus::Pending
                    && i.kind == kind
                    && i.payment_method == payment_method
            })
            .cloned()
            .collect();

        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(found)
    }

    async fn cancel_item(&self, item_id: Uuid) -> QueueResult<QueueItem> {
        let mut state = self.state.write().await;
        let item = state
            .items
            .get_mut(&item_id)
            .ok_or(QueueError::NotFound(item_id))?;

        if item.status != ItemStatus::Pending {
            return Err(QueueError::InvalidState(format!(
                "cannot cancel item {} in status {}",
                item_id, item.status
            )));
        }

        item.status = ItemStatus::Cancelled;
        debug!(item_id = %item_id, "Item cancelled");
        Ok(item.clone())
    }

    async fn commit_match(
        &self,
        withdrawal_id: Uuid,
        deposit_id: Uuid,
        amount: Decimal,
        score: i64,
    ) -> QueueResult<MatchRecord> {
        let mut state = self.state.write().await;

        // Re-read both rows under the write guard and confirm the claim is
        // still valid before mutating anything.
        let withdrawal = state
            .items
            .get(&withdrawal_id)
            .ok_or(QueueError::NotFound(withdrawal_id))?;
        let deposit = state
            .items
            .get(&deposit_id)
            .ok_or(QueueError::NotFound(deposit_id))?;

        if withdrawal.kind != ItemKind::Withdrawal || deposit.kind != ItemKind::Deposit {
            return Err(QueueError::Validation(format!(
                "match must pair a withdrawal with a deposit, got {} and {}",
                withdrawal.kind, deposit.kind
            )));
        }
        if withdrawal.payment_method != deposit.payment_method
            || withdrawal.amount > deposit.amount
        {
            return Err(QueueError::Validation(format!(
                "items {} and {} are not compatible",
                withdrawal_id, deposit_id
            )));
        }
        if withdrawal.status != ItemStatus::Pending {
            return Err(QueueError::Conflict(format!(
                "withdrawal {} already {}",
                withdrawal_id, withdrawal.status
            )));
        }
        if deposit.status != ItemStatus::Pending {
            return Err(QueueError::Conflict(format!(
                "deposit {} already {}",
                deposit_id, deposit.status
            )));
        }

        let record = MatchRecord {
            id: self.id_gen.next_id(),
            withdrawal_id,
            deposit_id,
            amount,
            match_score: score,
            processing_time_ms: 0,
            status: MatchStatus::Pending,
            created_at: self.clock.now(),
            completed_at: None,
            notes: None,
        };

        {
            let w = state.items.get_mut(&withdrawal_id).expect("checked above");
            w.status = ItemStatus::Matched;
            w.matched_with = Some(deposit_id);
        }
        {
            let d = state.items.get_mut(&deposit_id).expect("checked above");
            d.status = ItemStatus::Matched;
            d.matched_with = Some(withdrawal_id);
        }
        state.matches.insert(record.id, record.clone());

        debug!(
            match_id = %record.id,
            withdrawal_id = %withdrawal_id,
            deposit_id = %deposit_id,
            score,
            "Match committed"
        );
        Ok(record)
    }

    async fn get_match(&self, match_id: Uuid) -> QueueResult<Option<MatchRecord>> {
        let state = self.state.read().await;
        Ok(state.matches.get(&match_id).cloned())
    }

    async fn match_for_item(&self, item_id: Uuid) -> QueueResult<Option<MatchRecord>> {
        let state = self.state.read().await;
        let mut involved: Vec<&MatchRecord> = state
            .matches
            .values()
            .filter(|m| m.withdrawal_id == item_id || m.deposit_id == item_id)
            .collect();
        involved.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(involved.last().map(|m| (*m).clone()))
    }

    async fn complete_match(&self, match_id: Uuid) -> QueueResult<MatchRecord> {
        let mut state = self.state.write().await;
        let now = self.clock.now();

        let record = state
            .matches
            .get_mut(&match_id)
            .ok_or(QueueError::NotFound(match_id))?;
        if record.status != MatchStatus::Pending {
            return Err(QueueError::InvalidState(format!(
                "cannot complete match {} in status {}",
                match_id, record.status
            )));
        }

        record.status = MatchStatus::Completed;
        record.completed_at = Some(now);
        record.processing_time_ms = (now - record.created_at).num_milliseconds();
        let record = record.clone();

        for item_id in [record.withdrawal_id, record.deposit_id] {
            if let Some(item) = state.items.get_mut(&item_id) {
                item.status = ItemStatus::Settled;
            }
        }

        debug!(match_id = %match_id, "Match completed");
        Ok(record)
    }

    async fn fail_match(&self, match_id: Uuid, reason: &str) -> QueueResult<MatchRecord> {
        let mut state = self.state.write().await;

        let record = state
            .matches
            .get_mut(&match_id)
            .ok_or(QueueError::NotFound(match_id))?;
        if record.status != MatchStatus::Pending {
            return Err(QueueError::InvalidState(format!(
                "cannot fail match {} in status {}",
                match_id, record.status
            )));
        }

        record.status = MatchStatus::Failed;
        record.notes = Some(reason.to_string());
        let record = record.clone();

        // Items go back to the queue so the engine can pair them again.
        for item_id in [record.withdrawal_id, record.deposit_id] {
            if let Some(item) = state.items.get_mut(&item_id) {
                item.status = ItemStatus::Pending;
                item.matched_with = None;
            }
        }

        debug!(match_id = %match_id, reason, "Match failed, items requeued");
        Ok(record)
    }

    async fn list_items(&self, filter: &ItemFilter) -> QueueResult<Vec<QueueItem>> {
        let state = self.state.read().await;
        let mut found: Vec<QueueItem> = state
            .items
            .values()
            .filter(|i| filter.matches(i))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(found)
    }

    async fn list_matches(&self, filter: &MatchFilter) -> QueueResult<Vec<MatchRecord>> {
        let state = self.state.read().await;
        let mut found: Vec<MatchRecord> = state
            .matches
            .values()
            .filter(|m| filter.matches(m))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(found)
    }

    async fn stats(&self) -> QueueResult<QueueStats> {
        let state = self.state.read().await;
        let pending = |kind: ItemKind| {
            state
                .items
                .values()
                .filter(|i| i.kind == kind && i.status == ItemStatus::Pending)
                .count() as u64
        };
        // Failed matches were rolled back and their items re-queued, so
        // counting them would double-report the pair.
        let matched_pairs = state
            .matches
            .values()
            .filter(|m| m.status != MatchStatus::Failed)
            .count() as u64;
        Ok(QueueStats {
            total_items: state.items.len() as u64,
            pending_withdrawals: pending(ItemKind::Withdrawal),
            pending_deposits: pending(ItemKind::Deposit),
            matched_pairs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::Utc;
    use common::{FixedClock, SequenceIdGenerator};
    use rust_decimal_macros::dec;

    fn test_store() -> MemoryQueueStore {
        MemoryQueueStore::with_collaborators(
            Arc::new(FixedClock::epoch()),
            Arc::new(SequenceIdGenerator::new()),
        )
    }

    fn item(id: u128, kind: ItemKind, amount: Decimal, method: &str) -> QueueItem {
        QueueItem::new(
            Uuid::from_u128(id),
            kind,
            format!("cust-{}", id),
            amount,
            method,
            format!("@dest-{}", id),
            1,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = test_store();
        let inserted = store
            .insert(item(1, ItemKind::Withdrawal, dec!(50), "venmo"))
            .await
            .unwrap();

        let fetched = store.get(inserted.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, inserted.id);
        assert_eq!(fetched.status, ItemStatus::Pending);
    }

    #[tokio::test]
    async fn test_insert_duplicate_id_rejected() {
        let store = test_store();
        store
            .insert(item(1, ItemKind::Withdrawal, dec!(50), "venmo"))
            .await
            .unwrap();
        let result = store
            .insert(item(1, ItemKind::Deposit, dec!(60), "venmo"))
            .await;
        assert_matches!(result, Err(QueueError::DuplicateId(_)));
    }

    #[tokio::test]
    async fn test_find_pending_opposite_filters_and_orders() {
        let store = test_store();
        let mut late = item(1, ItemKind::Deposit, dec!(100), "venmo");
        let mut early = item(2, ItemKind::Deposit, dec!(100), "venmo");
        late.created_at = Utc::now();
        early.created_at = late.created_at - chrono::Duration::seconds(5);
        store.insert(late.clone()).await.unwrap();
        store.insert(early.clone()).await.unwrap();
        // Different method and different kind stay out of the result
        store
            .insert(item(3, ItemKind::Deposit, dec!(100), "paypal"))
            .await
            .unwrap();
        store
            .insert(item(4, ItemKind::Withdrawal, dec!(100), "venmo"))
            .await
            .unwrap();

        let found = store
            .find_pending_opposite(ItemKind::Deposit, "venmo")
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].id, early.id);
        assert_eq!(found[1].id, late.id);
    }

    #[tokio::test]
    async fn test_commit_match_flips_both_items() {
        let store = test_store();
        let w = store
            .insert(item(1, ItemKind::Withdrawal, dec!(200), "venmo"))
            .await
            .unwrap();
        let d = store
            .insert(item(2, ItemKind::Deposit, dec!(250), "venmo"))
            .await
            .unwrap();

        let record = store.commit_match(w.id, d.id, dec!(200), 65).await.unwrap();
        assert_eq!(record.status, MatchStatus::Pending);
        assert_eq!(record.amount, dec!(200));
        assert_eq!(record.match_score, 65);

        let w = store.get(w.id).await.unwrap().unwrap();
        let d = store.get(d.id).await.unwrap().unwrap();
        assert_eq!(w.status, ItemStatus::Matched);
        assert_eq!(d.status, ItemStatus::Matched);
        assert_eq!(w.matched_with, Some(d.id));
        assert_eq!(d.matched_with, Some(w.id));
    }

    #[tokio::test]
    async fn test_commit_match_conflict_on_claimed_item() {
        let store = test_store();
        let w1 = store
            .insert(item(1, ItemKind::Withdrawal, dec!(50), "zelle"))
            .await
            .unwrap();
        let w2 = store
            .insert(item(2, ItemKind::Withdrawal, dec!(60), "zelle"))
            .await
            .unwrap();
        let d = store
            .insert(item(3, ItemKind::Deposit, dec!(70), "zelle"))
            .await
            .unwrap();

        store.commit_match(w1.id, d.id, dec!(50), 65).await.unwrap();
        let second = store.commit_match(w2.id, d.id, dec!(60), 75).await;
        assert_matches!(second, Err(QueueError::Conflict(_)));

        // Losing withdrawal is untouched
        let w2 = store.get(w2.id).await.unwrap().unwrap();
        assert_eq!(w2.status, ItemStatus::Pending);
        assert!(w2.matched_with.is_none());
    }

    #[tokio::test]
    async fn test_commit_match_rejects_incompatible_pair() {
        let store = test_store();
        let w = store
            .insert(item(1, ItemKind::Withdrawal, dec!(100), "venmo"))
            .await
            .unwrap();
        let d = store
            .insert(item(2, ItemKind::Deposit, dec!(50), "venmo"))
            .await
            .unwrap();

        let result = store.commit_match(w.id, d.id, dec!(100), 0).await;
        assert_matches!(result, Err(QueueError::Validation(_)));
    }

    #[tokio::test]
    async fn test_cancel_pending_item() {
        let store = test_store();
        let w = store
            .insert(item(1, ItemKind::Withdrawal, dec!(50), "venmo"))
            .await
            .unwrap();

        let cancelled = store.cancel_item(w.id).await.unwrap();
        assert_eq!(cancelled.status, ItemStatus::Cancelled);

        // Cancelled items never come back as candidates
        let found = store
            .find_pending_opposite(ItemKind::Withdrawal, "venmo")
            .await
            .unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_matched_item_fails_and_match_stands() {
        let store = test_store();
        let w = store
            .insert(item(1, ItemKind::Withdrawal, dec!(50), "venmo"))
            .await
            .unwrap();
        let d = store
            .insert(item(2, ItemKind::Deposit, dec!(50), "venmo"))
            .await
            .unwrap();
        let record = store.commit_match(w.id, d.id, dec!(50), 75).await.unwrap();

        let result = store.cancel_item(w.id).await;
        assert_matches!(result, Err(QueueError::InvalidState(_)));

        let record = store.get_match(record.id).await.unwrap().unwrap();
        assert_eq!(record.status, MatchStatus::Pending);
    }

    #[tokio::test]
    async fn test_complete_match_settles_items() {
        let store = test_store();
        let w = store
            .insert(item(1, ItemKind::Withdrawal, dec!(50), "venmo"))
            .await
            .unwrap();
        let d = store
            .insert(item(2, ItemKind::Deposit, dec!(50), "venmo"))
            .await
            .unwrap();
        let record = store.commit_match(w.id, d.id, dec!(50), 75).await.unwrap();

        let completed = store.complete_match(record.id).await.unwrap();
        assert_eq!(completed.status, MatchStatus::Completed);
        assert!(completed.completed_at.is_some());

        assert_eq!(
            store.get(w.id).await.unwrap().unwrap().status,
            ItemStatus::Settled
        );
        assert_eq!(
            store.get(d.id).await.unwrap().unwrap().status,
            ItemStatus::Settled
        );

        // Completing twice is an invalid transition
        assert_matches!(
            store.complete_match(record.id).await,
            Err(QueueError::InvalidState(_))
        );
    }

    #[tokio::test]
    async fn test_fail_match_requeues_items() {
        let store = test_store();
        let w = store
            .insert(item(1, ItemKind::Withdrawal, dec!(50), "venmo"))
            .await
            .unwrap();
        let d = store
            .insert(item(2, ItemKind::Deposit, dec!(50), "venmo"))
            .await
            .unwrap();
        let record = store.commit_match(w.id, d.id, dec!(50), 75).await.unwrap();

        let failed = store.fail_match(record.id, "ledger unavailable").await.unwrap();
        assert_eq!(failed.status, MatchStatus::Failed);
        assert_eq!(failed.notes.as_deref(), Some("ledger unavailable"));

        let w = store.get(w.id).await.unwrap().unwrap();
        let d = store.get(d.id).await.unwrap().unwrap();
        assert_eq!(w.status, ItemStatus::Pending);
        assert_eq!(d.status, ItemStatus::Pending);
        assert!(w.matched_with.is_none());
        assert!(d.matched_with.is_none());
    }

    #[tokio::test]
    async fn test_stats() {
        let store = test_store();
        store
            .insert(item(1, ItemKind::Withdrawal, dec!(50), "venmo"))
            .await
            .unwrap();
        store
            .insert(item(2, ItemKind::Deposit, dec!(60), "venmo"))
            .await
            .unwrap();
        store
            .insert(item(3, ItemKind::Deposit, dec!(70), "paypal"))
            .await
            .unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_items, 3);
        assert_eq!(stats.pending_withdrawals, 1);
        assert_eq!(stats.pending_deposits, 2);
        assert_eq!(stats.matched_pairs, 0);
    }

    #[tokio::test]
    async fn test_stats_exclude_failed_matches() {
        let store = test_store();
        let w = store
            .insert(item(1, ItemKind::Withdrawal, dec!(50), "venmo"))
            .await
            .unwrap();
        let d = store
            .insert(item(2, ItemKind::Deposit, dec!(50), "venmo"))
            .await
            .unwrap();
        let record = store.commit_match(w.id, d.id, dec!(50), 75).await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.matched_pairs, 1);

        // Rollback returns the pair to the queue; it must not be reported
        // as both pending and matched.
        store.fail_match(record.id, "ledger unavailable").await.unwrap();
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.matched_pairs, 0);
        assert_eq!(stats.pending_withdrawals, 1);
        assert_eq!(stats.pending_deposits, 1);

        // A re-match counts the pair exactly once again
        store.commit_match(w.id, d.id, dec!(50), 75).await.unwrap();
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.matched_pairs, 1);
    }

    #[tokio::test]
    async fn test_match_for_item_returns_latest() {
        let store = test_store();
        let w = store
            .insert(item(1, ItemKind::Withdrawal, dec!(50), "venmo"))
            .await
            .unwrap();
        let d = store
            .insert(item(2, ItemKind::Deposit, dec!(50), "venmo"))
            .await
            .unwrap();

        let first = store.commit_match(w.id, d.id, dec!(50), 75).await.unwrap();
        store.fail_match(first.id, "boom").await.unwrap();
        let second = store.commit_match(w.id, d.id, dec!(50), 75).await.unwrap();

        let latest = store.match_for_item(w.id).await.unwrap().unwrap();
        assert_eq!(latest.id, second.id);
    }
}
