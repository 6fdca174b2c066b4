//! Withdrawal/deposit matching queue for PeerQueue
//!
//! This crate implements the core of the peer-to-peer transfer queue:
//! customers enqueue withdrawal and deposit requests, and the engine pairs
//! compatible ones so funds move as an internal transfer instead of
//! through an external payment rail.
//!
//! Structure:
//! - [`domain`] - queue items, matches, statuses, stats
//! - [`scorer`] - pure compatibility scoring and candidate ranking
//! - [`engine`] - the commit-or-retry matching loop
//! - [`store`] - the `QueueStore` trait plus in-memory and Postgres backends
//! - [`audit`] - append-only event trail for settled transfers

pub mod audit;
pub mod domain;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod scorer;
pub mod store;

pub use domain::{
    ItemFilter, ItemKind, ItemStatus, MatchFilter, MatchRecord, MatchStatus, QueueItem, QueueStats,
};
pub use engine::MatchEngine;
pub use error::{QueueError, QueueResult};
pub use scorer::{compatibility_score, rank_candidates, ScoredCandidate};
pub use store::{MemoryQueueStore, QueueStore};

#[cfg(feature = "postgres")]
pub use store::PostgresQueueStore;
