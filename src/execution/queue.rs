//! Work Queue
//!
//! Unbounded FIFO shared by the workers of one pool. Pops wait for at
//! most a poll interval so workers get to check the shutdown flag.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use log::warn;

/// Multi-producer, multi-consumer blocking queue.
pub(crate) struct WorkQueue<T> {
    items: Mutex<VecDeque<T>>,
    available: Condvar,
}

impl<T> WorkQueue<T> {
    pub(crate) fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
        }
    }

    /// Appends an item and wakes one waiting worker.
    pub(crate) fn push(&self, item: T) {
        // A poisoned queue still holds valid items; keep using it.
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        items.push_back(item);
        drop(items);
        self.available.notify_one();
    }

    /// Waits up to `timeout` for one item.
    ///
    /// Returns `None` on timeout or when the wait is interrupted, which
    /// callers treat as "nothing this round".
    pub(crate) fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let items = match self.items.lock() {
            Ok(items) => items,
            Err(e) => {
                warn!("Work queue lock poisoned: {}", e);
                return None;
            }
        };

        match self
            .available
            .wait_timeout_while(items, timeout, |items| items.is_empty())
        {
            Ok((mut items, _)) => items.pop_front(),
            Err(e) => {
                warn!("Work queue wait interrupted: {}", e);
                None
            }
        }
    }

    /// Waits up to `timeout` for one item, then takes whatever else is
    /// already queued.
    pub(crate) fn pop_batch(&self, timeout: Duration) -> Vec<T> {
        let Some(first) = self.pop_timeout(timeout) else {
            return Vec::new();
        };

        let mut batch = vec![first];
        if let Ok(mut items) = self.items.lock() {
            batch.extend(items.drain(..));
        }
        batch
    }

    /// Removes every queued item.
    pub(crate) fn clear(&self) -> Vec<T> {
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        items.drain(..).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.items.lock().map(|items| items.len()).unwrap_or(0)
    }
}
