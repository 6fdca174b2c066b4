//! Balance ledger seam
//!
//! The queue never touches account balances directly; it posts transfers
//! through this trait. Production wires in the real ledger service,
//! tests use [`MockBalanceLedger`].

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use common::{IdGenerator, SequenceIdGenerator};

/// Proof that a transfer was posted
#[derive(Debug, Clone)]
pub struct TransferReceipt {
    pub transfer_id: Uuid,
    pub from_customer: String,
    pub to_customer: String,
    pub amount: Decimal,
}

/// Ledger-side failures
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Insufficient funds for customer {0}")]
    InsufficientFunds(String),

    #[error("Ledger unavailable: {0}")]
    Unavailable(String),
}

/// Posts internal transfers between customer balances
#[async_trait]
pub trait BalanceLedger: Send + Sync {
    /// Move `amount` from one customer's balance to another's
    ///
    /// `match_id` ties the posting back to the match for reconciliation.
    async fn post_transfer(
        &self,
        from_customer: &str,
        to_customer: &str,
        amount: Decimal,
        match_id: Uuid,
    ) -> Result<TransferReceipt, LedgerError>;
}

/// A recorded posting on the mock ledger
#[derive(Debug, Clone)]
pub struct RecordedTransfer {
    pub receipt: TransferReceipt,
    pub match_id: Uuid,
}

/// In-memory ledger for tests and the demo binary
///
/// Records every posting; can be armed to fail the next transfer to
/// exercise rollback paths.
pub struct MockBalanceLedger {
    id_gen: SequenceIdGenerator,
    transfers: Mutex<Vec<RecordedTransfer>>,
    fail_next: Mutex<Option<LedgerError>>,
}

impl MockBalanceLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id_gen: SequenceIdGenerator::new(),
            transfers: Mutex::new(Vec::new()),
            fail_next: Mutex::new(None),
        })
    }

    /// Make the next `post_transfer` call fail with `error`
    pub async fn fail_next_with(&self, error: LedgerError) {
        *self.fail_next.lock().await = Some(error);
    }

    /// All postings so far, in order
    pub async fn transfers(&self) -> Vec<RecordedTransfer> {
        self.transfers.lock().await.clone()
    }
}

#[async_trait]
impl BalanceLedger for MockBalanceLedger {
    async fn post_transfer(
        &self,
        from_customer: &str,
        to_customer: &str,
        amount: Decimal,
        match_id: Uuid,
    ) -> Result<TransferReceipt, LedgerError> {
        if let Some(error) = self.fail_next.lock().await.take() {
            return Err(error);
        }

        let receipt = TransferReceipt {
            transfer_id: self.id_gen.next_id(),
            from_customer: from_customer.to_string(),
            to_customer: to_customer.to_string(),
            amount,
        };
        self.transfers.lock().await.push(RecordedTransfer {
            receipt: receipt.clone(),
            match_id,
        });
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_mock_records_postings() {
        let ledger = MockBalanceLedger::new();
        let receipt = ledger
            .post_transfer("bob", "alice", dec!(200), Uuid::from_u128(7))
            .await
            .unwrap();
        assert_eq!(receipt.from_customer, "bob");
        assert_eq!(receipt.amount, dec!(200));

        let transfers = ledger.transfers().await;
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].match_id, Uuid::from_u128(7));
    }

    #[tokio::test]
    async fn test_armed_failure_fires_once() {
        let ledger = MockBalanceLedger::new();
        ledger
            .fail_next_with(LedgerError::InsufficientFunds("bob".to_string()))
            .await;

        let err = ledger
            .post_transfer("bob", "alice", dec!(10), Uuid::from_u128(1))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds(_)));

        // Next call succeeds again
        assert!(ledger
            .post_transfer("bob", "alice", dec!(10), Uuid::from_u128(2))
            .await
            .is_ok());
        assert_eq!(ledger.transfers().await.len(), 1);
    }
}
