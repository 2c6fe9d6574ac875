//! Promise
//!
//! Single-assignment result slot shared between the thread producing a
//! value and any number of threads waiting for it. A racing promise
//! accepts the first of N writes and quietly drops the rest.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, error};

use crate::error::{FlowError, Result};

enum State<T> {
    Pending,
    Fulfilled(T),
    Failed(FlowError),
}

struct Slot<T> {
    state: State<T>,
    /// Terminal writes seen so far, accepted or not.
    attempts: usize,
}

struct Inner<T> {
    slot: Mutex<Slot<T>>,
    ready: Condvar,
    race: usize,
}

/// Single-assignment future.
///
/// Cloning a promise yields another handle to the same slot.
///
/// # Example
///
/// ```
/// use stepflow::Promise;
/// use std::thread;
///
/// let promise = Promise::new();
/// let producer = promise.clone();
/// thread::spawn(move || {
///     producer.fulfill(7).unwrap();
/// });
/// assert_eq!(promise.wait().unwrap(), 7);
/// ```
pub struct Promise<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Promise<T> {
    /// Creates a pending promise expecting a single write.
    pub fn new() -> Self {
        Self::racing(1)
    }

    /// Creates a pending promise raced by `participants` producers.
    ///
    /// The first `fulfill` or `fail` wins; the other participants' writes
    /// are discarded. A count of zero is treated as one.
    pub fn racing(participants: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                slot: Mutex::new(Slot {
                    state: State::Pending,
                    attempts: 0,
                }),
                ready: Condvar::new(),
                race: participants.max(1),
            }),
        }
    }

    /// Number of producers allowed to write.
    pub fn race_count(&self) -> usize {
        self.inner.race
    }

    /// Resolves the promise with a value.
    ///
    /// Returns `Ok(true)` when the write was accepted, `Ok(false)` when it
    /// lost a race, and `Err(AlreadyResolved)` when it is one write too
    /// many. The stored outcome is never overwritten.
    pub fn fulfill(&self, value: T) -> Result<bool> {
        self.resolve(State::Fulfilled(value))
    }

    /// Resolves the promise with a failure. Same rules as [`fulfill`](Self::fulfill).
    pub fn fail(&self, error: FlowError) -> Result<bool> {
        self.resolve(State::Failed(error))
    }

    fn resolve(&self, outcome: State<T>) -> Result<bool> {
        let mut slot = self.lock()?;
        slot.attempts += 1;

        if matches!(slot.state, State::Pending) {
            slot.state = outcome;
            drop(slot);
            self.inner.ready.notify_all();
            return Ok(true);
        }

        if slot.attempts <= self.inner.race {
            debug!(
                "Promise race lost ({} of {} writes)",
                slot.attempts, self.inner.race
            );
            return Ok(false);
        }

        error!(
            "Promise written {} times but only {} write(s) expected; keeping first outcome",
            slot.attempts, self.inner.race
        );
        Err(FlowError::AlreadyResolved)
    }

    /// Returns true once a terminal outcome is stored.
    pub fn is_resolved(&self) -> bool {
        self.lock()
            .map(|slot| !matches!(slot.state, State::Pending))
            .unwrap_or(false)
    }

    /// Returns true if both handles point at the same slot.
    pub fn same_as(&self, other: &Promise<T>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Slot<T>>> {
        self.inner
            .slot
            .lock()
            .map_err(|e| FlowError::Interrupted(format!("promise lock poisoned: {}", e)))
    }
}

impl<T: Clone> Promise<T> {
    /// Blocks until the promise resolves and returns its outcome.
    pub fn wait(&self) -> Result<T> {
        let mut slot = self.lock()?;
        loop {
            if let Some(outcome) = Self::outcome(&slot) {
                return outcome;
            }
            slot = self
                .inner
                .ready
                .wait(slot)
                .map_err(|e| FlowError::Interrupted(format!("promise lock poisoned: {}", e)))?;
        }
    }

    /// Blocks until the promise resolves; `None` on failure or interruption.
    pub fn wait_safe(&self) -> Option<T> {
        self.wait().ok()
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`.
    ///
    /// Returns `None` if the promise is still pending when time runs out.
    /// A timeout too large to express as a deadline waits without limit.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<T>> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return Some(self.wait());
        };
        let mut slot = match self.lock() {
            Ok(slot) => slot,
            Err(e) => return Some(Err(e)),
        };

        loop {
            if let Some(outcome) = Self::outcome(&slot) {
                return Some(outcome);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            slot = match self.inner.ready.wait_timeout(slot, remaining) {
                Ok((slot, _)) => slot,
                Err(e) => {
                    return Some(Err(FlowError::Interrupted(format!(
                        "promise lock poisoned: {}",
                        e
                    ))))
                }
            };
        }
    }

    /// Returns the outcome without blocking, if there is one.
    pub fn try_get(&self) -> Option<Result<T>> {
        match self.lock() {
            Ok(slot) => Self::outcome(&slot),
            Err(e) => Some(Err(e)),
        }
    }

    fn outcome(slot: &Slot<T>) -> Option<Result<T>> {
        match &slot.state {
            State::Pending => None,
            State::Fulfilled(value) => Some(Ok(value.clone())),
            State::Failed(error) => Some(Err(error.clone())),
        }
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.inner.slot.lock() {
            Ok(slot) => match slot.state {
                State::Pending => "pending",
                State::Fulfilled(_) => "fulfilled",
                State::Failed(_) => "failed",
            },
            Err(_) => "poisoned",
        };
        f.debug_struct("Promise")
            .field("state", &state)
            .field("race", &self.inner.race)
            .finish()
    }
}
