//! Monitoring Module
//!
//! Runtime counters for a reactor.
//!
//! # Components
//!
//! - [`ReactorMetrics`]: Atomic counters updated by worker loops
//! - [`MetricsSnapshot`]: Serializable point-in-time copy

pub mod metrics;

pub use metrics::{EventType, MetricsSnapshot, ReactorMetrics};
