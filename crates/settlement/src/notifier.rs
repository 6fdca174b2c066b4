//! Settlement notifier
//!
//! Drives a committed match to its terminal state. The transfer direction
//! is always depositor to withdrawer: the depositor's incoming funds pay
//! out the withdrawal, and the external rails are never touched.

use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;

use queue_engine::audit::{QueueEvent, SharedAuditLog};
use queue_engine::{MatchRecord, QueueError, QueueStore};

use crate::error::{SettlementError, SettlementResult};
use crate::ledger::BalanceLedger;

/// Settles pending matches against a balance ledger
pub struct SettlementNotifier {
    store: Arc<dyn QueueStore>,
    ledger: Arc<dyn BalanceLedger>,
    audit: SharedAuditLog,
}

impl SettlementNotifier {
    pub fn new(
        store: Arc<dyn QueueStore>,
        ledger: Arc<dyn BalanceLedger>,
        audit: SharedAuditLog,
    ) -> Self {
        Self {
            store,
            ledger,
            audit,
        }
    }

    /// Settle a pending match
    ///
    /// Posts the internal transfer and marks the match completed. If the
    /// ledger rejects the transfer the match is failed and both items are
    /// returned to the queue so they can match again.
    #[instrument(skip(self))]
    pub async fn settle(&self, match_id: Uuid) -> SettlementResult<MatchRecord> {
        let record = self
            .store
            .get_match(match_id)
            .await?
            .ok_or(SettlementError::MatchNotFound(match_id))?;
        if !record.is_pending() {
            return Err(SettlementError::InvalidState(format!(
                "match {} is {}, only pending matches settle",
                match_id, record.status
            )));
        }

        let withdrawal = self
            .store
            .get(record.withdrawal_id)
            .await?
            .ok_or(QueueError::NotFound(record.withdrawal_id))?;
        let deposit = self
            .store
            .get(record.deposit_id)
            .await?
            .ok_or(QueueError::NotFound(record.deposit_id))?;

        match self
            .ledger
            .post_transfer(
                &deposit.customer_id,
                &withdrawal.customer_id,
                record.amount,
                match_id,
            )
            .await
        {
            Ok(receipt) => {
                let completed = self.store.complete_match(match_id).await?;
                self.audit.write().await.append(QueueEvent::MatchSettled {
                    match_id,
                    transfer_id: receipt.transfer_id,
                });
                info!(
                    %match_id,
                    transfer_id = %receipt.transfer_id,
                    amount = %record.amount,
                    "Match settled"
                );
                Ok(completed)
            }
            Err(ledger_err) => {
                let reason = ledger_err.to_string();
                self.store.fail_match(match_id, &reason).await?;
                self.audit.write().await.append(QueueEvent::MatchFailed {
                    match_id,
                    reason: reason.clone(),
                });
                error!(%match_id, %reason, "Transfer failed, match rolled back");
                Err(SettlementError::TransferFailed { match_id, reason })
            }
        }
    }
}
