//! Shared types and utilities for PeerQueue
//!
//! This crate provides injectable `Clock` and `IdGenerator` collaborators
//! for deterministic testing of time- and id-dependent logic.

pub mod clock;
pub mod idgen;

pub use clock::{Clock, FixedClock, SystemClock};
pub use idgen::{IdGenerator, SequenceIdGenerator, UuidGenerator};
