//! Injectable id generation
//!
//! Ids participate in the deterministic candidate tie-break, so tests need
//! predictable ids. Production code uses [`UuidGenerator`] (random v4);
//! tests use [`SequenceIdGenerator`], which hands out ascending ids.

use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Source of new unique identifiers
pub trait IdGenerator: Send + Sync {
    /// Generate a fresh id
    fn next_id(&self) -> Uuid;
}

/// Random UUID v4 ids
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&self) -> Uuid {
        Uuid::new_v4()
    }
}

/// Deterministic ascending ids for tests
///
/// Generated ids sort in generation order, so the "lowest id" tie-break
/// resolves to the earliest-generated item.
#[derive(Debug, Default)]
pub struct SequenceIdGenerator {
    counter: AtomicU64,
}

impl SequenceIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the sequence at a given value
    pub fn starting_at(start: u64) -> Self {
        Self {
            counter: AtomicU64::new(start),
        }
    }
}

impl IdGenerator for SequenceIdGenerator {
    fn next_id(&self) -> Uuid {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        Uuid::from_u128(n as u128 + 1)
    }
}
