//! Core match engine
//!
//! On every insertion the engine scans the opposite side of the queue,
//! ranks compatible candidates, and tries to commit the best one. A
//! commit lost to a concurrent claim is not an error: the loop simply
//! moves to the next candidate. This "first success wins, retry on
//! conflict" shape guarantees at most one match per item without any
//! queue-wide lock; only the two rows in a commit attempt are contended.

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::domain::{ItemKind, MatchRecord, QueueItem};
use crate::error::{QueueError, QueueResult};
use crate::metrics::{MatchEngineMetrics, MetricsSnapshot};
use crate::scorer::rank_candidates;
use crate::store::QueueStore;

/// Finds and commits the best compatible counterpart for a new item
pub struct MatchEngine {
    store: Arc<dyn QueueStore>,
    metrics: Arc<MatchEngineMetrics>,
}

impl MatchEngine {
    /// Create an engine over a store
    pub fn new(store: Arc<dyn QueueStore>) -> Self {
        Self {
            store,
            metrics: Arc::new(MatchEngineMetrics::new()),
        }
    }

    /// Engine counter snapshot
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Try to match a newly inserted item
    ///
    /// Candidates are evaluated in deterministic order (score descending,
    /// then FIFO, then priority, then id). `Conflict` from a commit is
    /// absorbed and the next candidate is tried; any other store error
    /// propagates. Returns `None` when no candidate commits, leaving the
    /// item pending.
    pub async fn attempt_match(&self, new_item: &QueueItem) -> QueueResult<Option<MatchRecord>> {
        let start = Instant::now();
        self.metrics.attempts.increment();

        info!(
            item_id = %new_item.id,
            kind = %new_item.kind,
            payment_method = %new_item.payment_method,
            amount = %new_item.amount,
            "Attempting match"
        );

        let candidates = self
            .store
            .find_pending_opposite(new_item.kind.opposite(), &new_item.payment_method)
            .await?;

        let ranked = rank_candidates(new_item, candidates);
        debug!(
            item_id = %new_item.id,
            compatible = ranked.len(),
            "Candidates ranked"
        );

        for candidate in ranked {
            self.metrics.candidates_considered.increment();

            let (withdrawal, deposit) = match new_item.kind {
                ItemKind::Withdrawal => (new_item, &candidate.item),
                ItemKind::Deposit => (&candidate.item, new_item),
            };

            match self
                .store
                .commit_match(withdrawal.id, deposit.id, withdrawal.amount, candidate.score)
                .await
            {
                Ok(record) => {
                    self.metrics.matched.increment();
                    self.metrics.record_latency(start.elapsed());
                    info!(
                        match_id = %record.id,
                        withdrawal_id = %record.withdrawal_id,
                        deposit_id = %record.deposit_id,
                        amount = %record.amount,
                        score = record.match_score,
                        "Match committed"
                    );
                    return Ok(Some(record));
                }
                Err(QueueError::Conflict(reason)) => {
                    // Someone claimed this candidate between the scan and
                    // our commit. Fall through to the next one.
                    self.metrics.conflicts.increment();
                    debug!(
                        item_id = %new_item.id,
                        candidate_id = %candidate.item.id,
                        %reason,
                        "Candidate claimed concurrently, trying next"
                    );
                }
                Err(other) => return Err(other),
            }
        }

        self.metrics.unmatched.increment();
        self.metrics.record_latency(start.elapsed());
        debug!(item_id = %new_item.id, "No candidate committed, item stays pending");
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ItemStatus, MatchStatus};
    use crate::store::MemoryQueueStore;
    use common::{Clock, FixedClock, IdGenerator, SequenceIdGenerator};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    struct Harness {
        store: Arc<MemoryQueueStore>,
        engine: MatchEngine,
        clock: Arc<FixedClock>,
        id_gen: Arc<SequenceIdGenerator>,
    }

    fn harness() -> Harness {
        let clock = Arc::new(FixedClock::epoch());
        let id_gen = Arc::new(SequenceIdGenerator::new());
        let store = Arc::new(MemoryQueueStore::with_collaborators(
            clock.clone(),
            id_gen.clone(),
        ));
        let engine = MatchEngine::new(store.clone());
        Harness {
            store,
            engine,
            clock,
            id_gen,
        }
    }

    impl Harness {
        fn build_item(&self, kind: ItemKind, amount: Decimal, method: &str) -> QueueItem {
            QueueItem::new(
                self.id_gen.next_id(),
                kind,
                "cust",
                amount,
                method,
                "@dest",
                1,
                self.clock.now(),
            )
        }

        async fn enqueue(&self, kind: ItemKind, amount: Decimal, method: &str) -> QueueItem {
            let item = self.build_item(kind, amount, method);
            self.store.insert(item.clone()).await.unwrap()
        }
    }

    #[tokio::test]
    async fn test_no_candidates_leaves_item_pending() {
        let h = harness();
        let d = h.enqueue(ItemKind::Deposit, dec!(100), "venmo").await;

        let result = h.engine.attempt_match(&d).await.unwrap();
        assert!(result.is_none());

        let stats = h.store.stats().await.unwrap();
        assert_eq!(stats.pending_deposits, 1);
        assert_eq!(h.engine.metrics().unmatched, 1);
    }

    #[tokio::test]
    async fn test_matches_best_scoring_candidate() {
        let h = harness();
        // Two deposits: one close in amount, one far
        let far = h.enqueue(ItemKind::Deposit, dec!(500), "venmo").await;
        let close = h.enqueue(ItemKind::Deposit, dec!(210), "venmo").await;

        let w = h.enqueue(ItemKind::Withdrawal, dec!(200), "venmo").await;
        let record = h.engine.attempt_match(&w).await.unwrap().unwrap();

        assert_eq!(record.deposit_id, close.id);
        assert_eq!(record.amount, dec!(200));

        let far = h.store.get(far.id).await.unwrap().unwrap();
        assert_eq!(far.status, ItemStatus::Pending);
    }

    #[tokio::test]
    async fn test_settled_amount_is_withdrawal_amount_when_deposit_enqueued_last() {
        let h = harness();
        let w = h.enqueue(ItemKind::Withdrawal, dec!(150), "paypal").await;
        let d = h.enqueue(ItemKind::Deposit, dec!(180), "paypal").await;

        let record = h.engine.attempt_match(&d).await.unwrap().unwrap();
        assert_eq!(record.withdrawal_id, w.id);
        assert_eq!(record.deposit_id, d.id);
        assert_eq!(record.amount, dec!(150));
        assert_eq!(record.status, MatchStatus::Pending);
    }

    #[tokio::test]
    async fn test_payment_method_never_crosses() {
        let h = harness();
        h.enqueue(ItemKind::Deposit, dec!(200), "paypal").await;

        let w = h.enqueue(ItemKind::Withdrawal, dec!(200), "venmo").await;
        let result = h.engine.attempt_match(&w).await.unwrap();
        assert!(result.is_none());
    }

    /// Store wrapper that serves a stale candidate scan, reproducing the
    /// window where another task claims a candidate between scan and commit.
    struct StaleScanStore {
        inner: Arc<MemoryQueueStore>,
        stale: QueueItem,
    }

    #[async_trait::async_trait]
    impl QueueStore for StaleScanStore {
        async fn insert(&self, item: QueueItem) -> QueueResult<QueueItem> {
            self.inner.insert(item).await
        }

        async fn get(&self, id: Uuid) -> QueueResult<Option<QueueItem>> {
            self.inner.get(id).await
        }

        async fn find_pending_opposite(
            &self,
            kind: ItemKind,
            payment_method: &str,
        ) -> QueueResult<Vec<QueueItem>> {
            let mut items = self.inner.find_pending_opposite(kind, payment_method).await?;
            items.insert(0, self.stale.clone());
            Ok(items)
        }

        async fn commit_match(
            &self,
            withdrawal_id: Uuid,
            deposit_id: Uuid,
            amount: Decimal,
            score: i64,
        ) -> QueueResult<MatchRecord> {
            self.inner
                .commit_match(withdrawal_id, deposit_id, amount, score)
                .await
        }

        async fn cancel_item(&self, id: Uuid) -> QueueResult<QueueItem> {
            self.inner.cancel_item(id).await
        }

        async fn get_match(&self, id: Uuid) -> QueueResult<Option<MatchRecord>> {
            self.inner.get_match(id).await
        }

        async fn match_for_item(&self, item_id: Uuid) -> QueueResult<Option<MatchRecord>> {
            self.inner.match_for_item(item_id).await
        }

        async fn list_items(
            &self,
            filter: &crate::domain::ItemFilter,
        ) -> QueueResult<Vec<QueueItem>> {
            self.inner.list_items(filter).await
        }

        async fn list_matches(
            &self,
            filter: &crate::domain::MatchFilter,
        ) -> QueueResult<Vec<MatchRecord>> {
            self.inner.list_matches(filter).await
        }

        async fn complete_match(&self, match_id: Uuid) -> QueueResult<MatchRecord> {
            self.inner.complete_match(match_id).await
        }

        async fn fail_match(&self, match_id: Uuid, reason: &str) -> QueueResult<MatchRecord> {
            self.inner.fail_match(match_id, reason).await
        }

        async fn stats(&self) -> QueueResult<crate::domain::QueueStats> {
            self.inner.stats().await
        }
    }

    #[tokio::test]
    async fn test_conflict_retries_next_candidate() {
        let h = harness();
        // Best-looking deposit was already claimed by a rival withdrawal,
        // but the scan the engine sees still lists it.
        let claimed = h.enqueue(ItemKind::Deposit, dec!(205), "venmo").await;
        let second = h.enqueue(ItemKind::Deposit, dec!(250), "venmo").await;
        let rival = h.enqueue(ItemKind::Withdrawal, dec!(199), "venmo").await;
        h.store
            .commit_match(rival.id, claimed.id, dec!(199), 75)
            .await
            .unwrap();

        let stale_claimed = QueueItem {
            status: ItemStatus::Pending,
            matched_with: None,
            ..h.store.get(claimed.id).await.unwrap().unwrap()
        };
        let stale_store = Arc::new(StaleScanStore {
            inner: h.store.clone(),
            stale: stale_claimed,
        });
        let engine = MatchEngine::new(stale_store);

        let w = h.enqueue(ItemKind::Withdrawal, dec!(200), "venmo").await;
        let record = engine.attempt_match(&w).await.unwrap().unwrap();
        assert_eq!(record.deposit_id, second.id);
        assert_eq!(engine.metrics().conflicts, 1);
    }

    #[tokio::test]
    async fn test_deterministic_selection_over_fixed_snapshot() {
        // Same snapshot, same new item: the same deposit must win every run.
        let mut winners = Vec::new();
        for _ in 0..5 {
            let h = harness();
            h.enqueue(ItemKind::Deposit, dec!(220), "venmo").await;
            h.enqueue(ItemKind::Deposit, dec!(220), "venmo").await;
            h.enqueue(ItemKind::Deposit, dec!(260), "venmo").await;

            let w = h.enqueue(ItemKind::Withdrawal, dec!(200), "venmo").await;
            let record = h.engine.attempt_match(&w).await.unwrap().unwrap();
            winners.push(record.deposit_id);
        }
        assert!(winners.windows(2).all(|w| w[0] == w[1]));
    }

    #[tokio::test]
    async fn test_fifo_tie_break_prefers_earlier_deposit() {
        let h = harness();
        // Identical amounts => identical scores; FixedClock makes the
        // first-enqueued deposit strictly earlier.
        let early = h.enqueue(ItemKind::Deposit, dec!(250), "venmo").await;
        let _late = h.enqueue(ItemKind::Deposit, dec!(250), "venmo").await;

        let w = h.enqueue(ItemKind::Withdrawal, dec!(200), "venmo").await;
        let record = h.engine.attempt_match(&w).await.unwrap().unwrap();
        assert_eq!(record.deposit_id, early.id);
    }

    #[tokio::test]
    async fn test_concurrent_withdrawals_one_deposit() {
        // Scenario: two pending withdrawals, one deposit arrives. Exactly
        // one withdrawal matches regardless of interleaving.
        let h = harness();
        let w1 = h.enqueue(ItemKind::Withdrawal, dec!(50), "zelle").await;
        let w2 = h.enqueue(ItemKind::Withdrawal, dec!(60), "zelle").await;
        let d = h.enqueue(ItemKind::Deposit, dec!(70), "zelle").await;

        let record = h.engine.attempt_match(&d).await.unwrap().unwrap();
        let matched = record.withdrawal_id;
        assert!(matched == w1.id || matched == w2.id);

        let stats = h.store.stats().await.unwrap();
        assert_eq!(stats.pending_withdrawals, 1);
        assert_eq!(stats.matched_pairs, 1);
    }

    #[tokio::test]
    async fn test_concurrent_enqueues_at_most_one_match_per_item() {
        // Many tasks racing to match against one deposit; the engine's
        // conflict loop must let exactly one win.
        let clock = Arc::new(FixedClock::epoch());
        let id_gen = Arc::new(SequenceIdGenerator::new());
        let store = Arc::new(MemoryQueueStore::with_collaborators(
            clock.clone(),
            id_gen.clone(),
        ));
        let engine = Arc::new(MatchEngine::new(
            store.clone() as Arc<dyn QueueStore>
        ));

        let deposit = QueueItem::new(
            id_gen.next_id(),
            ItemKind::Deposit,
            "cust-d",
            dec!(500),
            "venmo",
            "@d",
            1,
            clock.now(),
        );
        store.insert(deposit.clone()).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..8u32 {
            let store = store.clone();
            let engine = engine.clone();
            let id = id_gen.next_id();
            let created_at = clock.now();
            handles.push(tokio::spawn(async move {
                let w = QueueItem::new(
                    id,
                    ItemKind::Withdrawal,
                    format!("cust-{}", i),
                    dec!(400),
                    "venmo",
                    "@w",
                    1,
                    created_at,
                );
                store.insert(w.clone()).await.unwrap();
                engine.attempt_match(&w).await.unwrap()
            }));
        }

        let mut matches = Vec::new();
        for handle in handles {
            if let Some(record) = handle.await.unwrap() {
                matches.push(record);
            }
        }

        // The single deposit can back exactly one match
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].deposit_id, deposit.id);

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.pending_withdrawals, 7);
        assert_eq!(stats.matched_pairs, 1);
    }
}
