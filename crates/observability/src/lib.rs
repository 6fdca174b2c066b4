//! Observability infrastructure for PeerQueue
//!
//! This crate provides:
//! - Structured logging via tracing
//! - Prometheus metrics
//!
//! # Quick Start
//!
//! ```ignore
//! use observability::{init_logging, LogFormat};
//!
//! init_logging("pqx", "info", LogFormat::Pretty)?;
//!
//! // Optional Prometheus endpoint at /metrics
//! observability::metrics::init_metrics(9090)?;
//! ```

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogFormat};
pub use metrics::{init_metrics, QueueMetrics};
