//! Reactor Metrics
//!
//! Lock-free counters updated by the worker loops, and a serializable
//! snapshot for reports.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

/// Kind of event counted by [`ReactorMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// An executor was accepted by `submit`
    Submitted,
    /// A step ran (including recovered and skipped steps)
    StepExecuted,
    /// A step failed without recovery
    StepFailed,
    /// A detached unit was split off
    Detached,
    /// An executor resolved its promise with a value
    Completed,
}

/// Counters shared by all workers of one reactor.
#[derive(Debug)]
pub struct ReactorMetrics {
    submitted: AtomicU64,
    steps_executed: AtomicU64,
    steps_failed: AtomicU64,
    detached: AtomicU64,
    completed: AtomicU64,
    start_time: Instant,
}

impl ReactorMetrics {
    pub fn new() -> Self {
        Self {
            submitted: AtomicU64::new(0),
            steps_executed: AtomicU64::new(0),
            steps_failed: AtomicU64::new(0),
            detached: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Records one event.
    pub fn record(&self, event: EventType) {
        let counter = match event {
            EventType::Submitted => &self.submitted,
            EventType::StepExecuted => &self.steps_executed,
            EventType::StepFailed => &self.steps_failed,
            EventType::Detached => &self.detached,
            EventType::Completed => &self.completed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            steps_executed: self.steps_executed.load(Ordering::Relaxed),
            steps_failed: self.steps_failed.load(Ordering::Relaxed),
            detached: self.detached.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            uptime_ms: self.start_time.elapsed().as_millis() as u64,
        }
    }
}

impl Default for ReactorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializable copy of [`ReactorMetrics`].
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub submitted: u64,
    pub steps_executed: u64,
    pub steps_failed: u64,
    pub detached: u64,
    pub completed: u64,
    pub uptime_ms: u64,
}

impl fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Reactor metrics:")?;
        writeln!(f, "  submitted:      {}", self.submitted)?;
        writeln!(f, "  steps executed: {}", self.steps_executed)?;
        writeln!(f, "  steps failed:   {}", self.steps_failed)?;
        writeln!(f, "  detached units: {}", self.detached)?;
        writeln!(f, "  completed:      {}", self.completed)?;
        write!(f, "  uptime:         {} ms", self.uptime_ms)
    }
}
