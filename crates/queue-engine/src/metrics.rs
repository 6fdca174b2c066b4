//! Engine activity counters
//!
//! Lightweight atomic counters the engine updates on its hot path. The
//! process-wide Prometheus exporter lives in the observability crate; this
//! snapshot exists so tests and the stats surface can read exact values.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Relaxed atomic counter
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn increment(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Counters for one match engine instance
#[derive(Debug, Default)]
pub struct MatchEngineMetrics {
    /// attempt_match invocations
    pub attempts: Counter,
    /// Attempts that committed a match
    pub matched: Counter,
    /// Attempts that left the item pending
    pub unmatched: Counter,
    /// Commit attempts lost to a concurrent claim
    pub conflicts: Counter,
    /// Total candidate scans across all attempts
    pub candidates_considered: Counter,
    latency_total_us: AtomicU64,
}

impl MatchEngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_latency(&self, elapsed: Duration) {
        self.latency_total_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        let attempts = self.attempts.get();
        let total_us = self.latency_total_us.load(Ordering::Relaxed);
        MetricsSnapshot {
            attempts,
            matched: self.matched.get(),
            unmatched: self.unmatched.get(),
            conflicts: self.conflicts.get(),
            candidates_considered: self.candidates_considered.get(),
            avg_latency_us: if attempts > 0 { total_us / attempts } else { 0 },
        }
    }
}

/// Point-in-time engine counter values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub attempts: u64,
    pub matched: u64,
    pub unmatched: u64,
    pub conflicts: u64,
    pub candidates_considered: u64,
    pub avg_latency_us: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_increments() {
        let counter = Counter::default();
        counter.increment();
        counter.increment();
        assert_eq!(counter.get(), 2);
    }

    #[test]
    fn test_snapshot_reflects_counts() {
        let metrics = MatchEngineMetrics::new();
        metrics.attempts.increment();
        metrics.matched.increment();
        metrics.record_latency(Duration::from_micros(40));

        let snap = metrics.snapshot();
        assert_eq!(snap.attempts, 1);
        assert_eq!(snap.matched, 1);
        assert_eq!(snap.conflicts, 0);
        assert_eq!(snap.avg_latency_us, 40);
    }
}
