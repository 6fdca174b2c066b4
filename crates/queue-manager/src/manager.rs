//! Queue manager
//!
//! Validates customer requests, inserts them, and immediately runs the
//! match engine over the new item. Every accepted request gets an audit
//! entry whether or not it matches on arrival.

use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use common::{Clock, IdGenerator};
use observability::QueueMetrics;
use queue_engine::audit::{QueueEvent, SharedAuditLog};
use queue_engine::{
    ItemFilter, ItemKind, MatchEngine, MatchFilter, MatchRecord, QueueError, QueueItem,
    QueueResult, QueueStats, QueueStore,
};
use rust_decimal::Decimal;

/// A customer request to enter the queue
#[derive(Debug, Clone)]
pub struct EnqueueRequest {
    pub customer_id: String,
    pub amount: Decimal,
    pub payment_method: String,
    pub payment_details: String,
    /// Defaults to 1 when unset; higher values win score ties
    pub priority: Option<u32>,
    pub notes: Option<String>,
}

impl EnqueueRequest {
    pub fn new(
        customer_id: impl Into<String>,
        amount: Decimal,
        payment_method: impl Into<String>,
        payment_details: impl Into<String>,
    ) -> Self {
        Self {
            customer_id: customer_id.into(),
            amount,
            payment_method: payment_method.into(),
            payment_details: payment_details.into(),
            priority: None,
            notes: None,
        }
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Result of an accepted enqueue: the stored item, plus the match the
/// engine committed on arrival if one was found
#[derive(Debug, Clone)]
pub struct EnqueueOutcome {
    pub item: QueueItem,
    pub matched: Option<MatchRecord>,
}

/// High-level queue operations over a store and engine
pub struct QueueManager {
    store: Arc<dyn QueueStore>,
    engine: MatchEngine,
    clock: Arc<dyn Clock>,
    id_gen: Arc<dyn IdGenerator>,
    audit: SharedAuditLog,
    metrics: Option<QueueMetrics>,
}

impl QueueManager {
    pub fn new(
        store: Arc<dyn QueueStore>,
        clock: Arc<dyn Clock>,
        id_gen: Arc<dyn IdGenerator>,
        audit: SharedAuditLog,
    ) -> Self {
        let engine = MatchEngine::new(store.clone());
        Self {
            store,
            engine,
            clock,
            id_gen,
            audit,
            metrics: None,
        }
    }

    /// Attach Prometheus metrics recording
    pub fn with_metrics(mut self, metrics: QueueMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Enqueue a withdrawal request
    #[instrument(skip(self, request), fields(customer_id = %request.customer_id))]
    pub async fn enqueue_withdrawal(&self, request: EnqueueRequest) -> QueueResult<EnqueueOutcome> {
        self.enqueue(ItemKind::Withdrawal, request).await
    }

    /// Enqueue a deposit request
    #[instrument(skip(self, request), fields(customer_id = %request.customer_id))]
    pub async fn enqueue_deposit(&self, request: EnqueueRequest) -> QueueResult<EnqueueOutcome> {
        self.enqueue(ItemKind::Deposit, request).await
    }

    async fn enqueue(&self, kind: ItemKind, request: EnqueueRequest) -> QueueResult<EnqueueOutcome> {
        validate_request(&request)?;

        let mut item = QueueItem::new(
            self.id_gen.next_id(),
            kind,
            request.customer_id,
            request.amount,
            request.payment_method,
            request.payment_details,
            request.priority.unwrap_or(1),
            self.clock.now(),
        );
        if let Some(notes) = request.notes {
            item = item.with_notes(notes);
        }

        let item = self.store.insert(item).await?;
        info!(item_id = %item.id, kind = %item.kind, amount = %item.amount, "Request enqueued");

        self.audit.write().await.append(QueueEvent::ItemEnqueued {
            item_id: item.id,
            kind: item.kind,
            customer_id: item.customer_id.clone(),
            amount: item.amount,
        });
        if let Some(metrics) = &self.metrics {
            match kind {
                ItemKind::Withdrawal => metrics.record_withdrawal_enqueued(),
                ItemKind::Deposit => metrics.record_deposit_enqueued(),
            }
        }

        let matched = self.engine.attempt_match(&item).await?;
        if let Some(record) = &matched {
            self.audit.write().await.append(QueueEvent::MatchCommitted {
                match_id: record.id,
                withdrawal_id: record.withdrawal_id,
                deposit_id: record.deposit_id,
                amount: record.amount,
                score: record.match_score,
            });
            if let Some(metrics) = &self.metrics {
                metrics.record_match_committed();
            }
        }
        self.refresh_pending_gauge().await;

        // The stored item's status may have flipped during the match
        let item = self
            .store
            .get(item.id)
            .await?
            .ok_or(QueueError::NotFound(item.id))?;
        Ok(EnqueueOutcome { item, matched })
    }

    /// Cancel a pending item
    ///
    /// Only the Pending state is cancellable; a matched or settled item
    /// returns `InvalidState`.
    #[instrument(skip(self))]
    pub async fn cancel(&self, item_id: Uuid) -> QueueResult<QueueItem> {
        let item = self.store.cancel_item(item_id).await?;
        warn!(item_id = %item.id, "Item cancelled");

        self.audit
            .write()
            .await
            .append(QueueEvent::ItemCancelled { item_id: item.id });
        if let Some(metrics) = &self.metrics {
            metrics.record_item_cancelled();
        }
        self.refresh_pending_gauge().await;
        Ok(item)
    }

    /// Fetch an item by id
    pub async fn get_item(&self, item_id: Uuid) -> QueueResult<Option<QueueItem>> {
        self.store.get(item_id).await
    }

    /// The most recent match involving an item, if any
    pub async fn match_for_item(&self, item_id: Uuid) -> QueueResult<Option<MatchRecord>> {
        self.store.match_for_item(item_id).await
    }

    /// Fetch a match by id
    pub async fn get_match(&self, match_id: Uuid) -> QueueResult<Option<MatchRecord>> {
        self.store.get_match(match_id).await
    }

    /// List items passing a filter
    pub async fn list_items(&self, filter: &ItemFilter) -> QueueResult<Vec<QueueItem>> {
        self.store.list_items(filter).await
    }

    /// List matches passing a filter
    pub async fn list_matches(&self, filter: &MatchFilter) -> QueueResult<Vec<MatchRecord>> {
        self.store.list_matches(filter).await
    }

    /// Aggregate queue counters
    pub async fn stats(&self) -> QueueResult<QueueStats> {
        self.store.stats().await
    }

    /// The shared audit trail
    pub fn audit(&self) -> SharedAuditLog {
        self.audit.clone()
    }

    async fn refresh_pending_gauge(&self) {
        if let Some(metrics) = &self.metrics {
            if let Ok(stats) = self.store.stats().await {
                metrics.set_pending_items(stats.pending_withdrawals + stats.pending_deposits);
            }
        }
    }
}

fn validate_request(request: &EnqueueRequest) -> QueueResult<()> {
    if request.customer_id.trim().is_empty() {
        return Err(QueueError::Validation(
            "customer_id must not be empty".to_string(),
        ));
    }
    if request.amount <= Decimal::ZERO {
        return Err(QueueError::Validation(format!(
            "amount must be positive, got {}",
            request.amount
        )));
    }
    if request.payment_method.trim().is_empty() {
        return Err(QueueError::Validation(
            "payment_method must not be empty".to_string(),
        ));
    }
    if request.payment_details.trim().is_empty() {
        return Err(QueueError::Validation(
            "payment_details must not be empty".to_string(),
        ));
    }
    if request.priority == Some(0) {
        return Err(QueueError::Validation(
            "priority must be at least 1".to_string(),
        ));
    }
    Ok(())
}
