//! Worker Pools
//!
//! The minimal pool contract the reactor needs: start N threads that all
//! run the same work loop, and later wait for them to exit. Work loops
//! decide on their own when to return; the pool never kills threads.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, info, warn};

use crate::error::{FlowError, Result};

/// Work loop executed by every thread of a pool.
pub type WorkLoop = Arc<dyn Fn() + Send + Sync>;

/// Collection of worker threads running a supplied work loop.
pub trait ThreadPool: Send {
    /// Starts the pool; every thread runs `target` until it returns.
    fn start(&mut self, target: WorkLoop) -> Result<()>;

    /// Waits for the pool's threads to exit.
    ///
    /// Callers must first make the work loop return (the reactor does
    /// this with its shutdown flag).
    fn shutdown(&mut self);

    /// Number of threads the pool runs.
    fn size(&self) -> usize;
}

/// Fixed-size pool of named OS threads.
pub struct FixedThreadPool {
    name: String,
    size: usize,
    handles: Vec<JoinHandle<()>>,
}

impl FixedThreadPool {
    /// Creates a pool of `size` threads named `<name>-<index>`.
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        Self {
            name: name.into(),
            size: size.max(1),
            handles: Vec::new(),
        }
    }

    /// Pool for short, CPU-bound steps.
    pub fn computing(size: usize) -> Self {
        Self::new("stepflow-compute", size)
    }

    /// Pool for steps that may block for a long time.
    pub fn blocking(size: usize) -> Self {
        Self::new("stepflow-blocking", size)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of threads started and not yet joined.
    pub fn running(&self) -> usize {
        self.handles.len()
    }
}

impl ThreadPool for FixedThreadPool {
    fn start(&mut self, target: WorkLoop) -> Result<()> {
        for index in 0..self.size {
            let target = Arc::clone(&target);
            let handle = thread::Builder::new()
                .name(format!("{}-{}", self.name, index))
                .spawn(move || target())
                .map_err(|e| FlowError::Spawn(format!("{}-{}: {}", self.name, index, e)))?;
            self.handles.push(handle);
        }

        info!("Started pool '{}' with {} threads", self.name, self.size);
        Ok(())
    }

    fn shutdown(&mut self) {
        let current = thread::current().id();

        for handle in self.handles.drain(..) {
            // A worker shutting down its own pool cannot join itself.
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                warn!("A worker of pool '{}' panicked", self.name);
            }
        }

        debug!("Pool '{}' stopped", self.name);
    }

    fn size(&self) -> usize {
        self.size
    }
}
