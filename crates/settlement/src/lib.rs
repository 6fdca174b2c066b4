//! Settlement of matched queue pairs
//!
//! A committed match is only a reservation. This crate moves the money:
//! [`SettlementNotifier`] posts the internal transfer on a
//! [`BalanceLedger`] and then marks the match completed, or rolls both
//! items back into the queue when the transfer fails.

pub mod error;
pub mod ledger;
pub mod notifier;

pub use error::SettlementError;
pub use ledger::{BalanceLedger, LedgerError, MockBalanceLedger, TransferReceipt};
pub use notifier::SettlementNotifier;
