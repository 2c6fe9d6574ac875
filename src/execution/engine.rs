//! Reactor
//!
//! The scheduler driving flow executors across two worker pools:
//! - Compute pool: drains batches from the compute queue, splits off
//!   detached steps and runs consecutive compute steps back to back
//! - Blocking pool: takes one executor at a time and runs exactly one
//!   blocking step before looking for more work
//!
//! Executors travel between the queues until their promise is resolved.
//! Only the two queues, the shutdown flag and the metrics are shared
//! between workers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, error, info, warn};

use super::executor::{FlowExecutor, StepOutcome};
use super::pool::{FixedThreadPool, ThreadPool};
use super::promise::Promise;
use super::queue::WorkQueue;
use crate::config::ReactorConfig;
use crate::error::{BoxError, FlowError, Result};
use crate::flow::{ExecutionPolicy, Flow, Record, Step};
use crate::monitoring::{EventType, MetricsSnapshot, ReactorMetrics};

/// State shared by every worker thread.
struct Shared {
    compute_queue: WorkQueue<FlowExecutor>,
    blocking_queue: WorkQueue<FlowExecutor>,
    shutdown: AtomicBool,
    poll_interval: Duration,
    metrics: ReactorMetrics,
}

impl Shared {
    /// Routes an executor to the queue its next step needs.
    ///
    /// Done executors are left alone and finished ones are resolved on
    /// the spot, so nothing without remaining work is ever queued.
    ///
    /// After shutdown nothing reads the queues any more: executors with
    /// work left are dropped, failing their promises with `Abandoned`.
    fn dispatch(&self, mut executor: FlowExecutor) -> Promise<Record> {
        let promise = executor.promise().clone();

        if executor.is_done() {
            return promise;
        }

        let Some(policy) = executor.current_policy() else {
            self.step(&mut executor);
            return promise;
        };

        if self.is_shutdown() {
            debug!("Abandoning executor {} after shutdown", executor.id());
            return promise;
        }

        match policy {
            ExecutionPolicy::InlineBlocking => self.blocking_queue.push(executor),
            ExecutionPolicy::InlineCompute | ExecutionPolicy::Detached => {
                self.compute_queue.push(executor)
            }
        }

        // Shutdown may have cleared the queues between the check and the push.
        if self.is_shutdown() {
            self.abandon_queued();
        }

        promise
    }

    /// Drops every queued executor and returns how many there were.
    fn abandon_queued(&self) -> usize {
        self.compute_queue.clear().len() + self.blocking_queue.clear().len()
    }

    fn step(&self, executor: &mut FlowExecutor) -> StepOutcome {
        let outcome = executor.step_once();
        match outcome {
            StepOutcome::Advanced => self.metrics.record(EventType::StepExecuted),
            StepOutcome::Completed => self.metrics.record(EventType::Completed),
            StepOutcome::Failed => {
                self.metrics.record(EventType::StepExecuted);
                self.metrics.record(EventType::StepFailed);
            }
            StepOutcome::Idle => {}
        }
        outcome
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    fn compute_loop(&self) {
        debug!("Compute worker started");

        while !self.is_shutdown() {
            for executor in self.compute_queue.pop_batch(self.poll_interval) {
                self.run_compute(executor);
            }
        }

        debug!("Compute worker stopped");
    }

    fn run_compute(&self, mut executor: FlowExecutor) {
        while let Some(unit) = executor.detach_current() {
            self.metrics.record(EventType::Detached);
            self.dispatch(unit);
        }

        while executor.current_policy() == Some(ExecutionPolicy::InlineCompute) {
            self.step(&mut executor);
        }

        self.dispatch(executor);
    }

    fn blocking_loop(&self) {
        debug!("Blocking worker started");

        while !self.is_shutdown() {
            let Some(mut executor) = self.blocking_queue.pop_timeout(self.poll_interval) else {
                continue;
            };

            self.step(&mut executor);
            self.dispatch(executor);
        }

        debug!("Blocking worker stopped");
    }
}

struct Pools {
    compute: Box<dyn ThreadPool>,
    blocking: Box<dyn ThreadPool>,
}

struct ReactorInner {
    shared: Arc<Shared>,
    pools: Mutex<Pools>,
    config: ReactorConfig,
}

impl ReactorInner {
    fn shutdown(&self) {
        if self.shared.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }

        info!("Shutting down reactor");

        match self.pools.lock() {
            Ok(mut pools) => {
                pools.compute.shutdown();
                pools.blocking.shutdown();
            }
            Err(e) => error!("Reactor pool lock poisoned, workers not joined: {}", e),
        }

        // Dropping queued executors fails their promises with `Abandoned`.
        let abandoned = self.shared.abandon_queued();
        if abandoned > 0 {
            warn!("Reactor shut down with {} queued executor(s) abandoned", abandoned);
        }
    }
}

impl Drop for ReactorInner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Scheduler owning the compute and blocking pools.
///
/// `Reactor` is a cheap handle: clones drive the same pools. The pools
/// stop when [`shutdown`](Self::shutdown) is called or the last handle
/// is dropped.
///
/// # Example
///
/// ```rust,no_run
/// use stepflow::{Flow, Reactor, ReactorConfig, Record, Step};
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let reactor = Reactor::new(ReactorConfig::default())?;
///
///     let flow = Flow::builder()
///         .then(Step::compute(|r: &Record| Ok(Record::of(r.first::<i64>().copied().unwrap_or(0) + 1))))
///         .then(Step::blocking(|r: &Record| Ok(Record::of(r.first::<i64>().copied().unwrap_or(0) * 2))))
///         .build();
///
///     let result = reactor.submit(flow.bind(Record::of(5_i64)))?.wait()?;
///     assert_eq!(result.first::<i64>(), Some(&12));
///
///     reactor.shutdown();
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Reactor {
    inner: Arc<ReactorInner>,
}

impl Reactor {
    /// Creates a reactor with [`FixedThreadPool`]s sized by `config`.
    pub fn new(config: ReactorConfig) -> Result<Self> {
        config.validate()?;

        let compute = FixedThreadPool::new(
            format!("{}-compute", config.thread_name_prefix),
            config.compute_threads,
        );
        let blocking = FixedThreadPool::new(
            format!("{}-blocking", config.thread_name_prefix),
            config.blocking_threads,
        );

        Self::with_pools(config, compute, blocking)
    }

    /// Creates a reactor with default configuration.
    pub fn with_default_config() -> Result<Self> {
        Self::new(ReactorConfig::default())
    }

    /// Creates a reactor on caller-supplied pools and starts them.
    ///
    /// Pool sizes in `config` are ignored; the poll interval is used.
    pub fn with_pools<C, B>(config: ReactorConfig, compute: C, blocking: B) -> Result<Self>
    where
        C: ThreadPool + 'static,
        B: ThreadPool + 'static,
    {
        let shared = Arc::new(Shared {
            compute_queue: WorkQueue::new(),
            blocking_queue: WorkQueue::new(),
            shutdown: AtomicBool::new(false),
            poll_interval: config.poll_interval(),
            metrics: ReactorMetrics::new(),
        });

        let mut compute: Box<dyn ThreadPool> = Box::new(compute);
        let mut blocking: Box<dyn ThreadPool> = Box::new(blocking);

        let compute_worker = Arc::clone(&shared);
        let blocking_worker = Arc::clone(&shared);
        let started = compute
            .start(Arc::new(move || compute_worker.compute_loop()))
            .and_then(|_| blocking.start(Arc::new(move || blocking_worker.blocking_loop())));

        if let Err(e) = started {
            error!("Failed to start reactor pools: {}", e);
            shared.shutdown.store(true, Ordering::Release);
            compute.shutdown();
            blocking.shutdown();
            return Err(e);
        }

        info!(
            "Reactor started ({} compute, {} blocking threads)",
            compute.size(),
            blocking.size()
        );

        Ok(Self {
            inner: Arc::new(ReactorInner {
                shared,
                pools: Mutex::new(Pools { compute, blocking }),
                config,
            }),
        })
    }

    /// Hands an executor to the reactor.
    ///
    /// Returns the executor's promise right away. A done executor is not
    /// queued; a finished one is resolved immediately.
    pub fn submit(&self, executor: FlowExecutor) -> Result<Promise<Record>> {
        if self.is_shutdown() {
            warn!("Rejected executor {} submitted after shutdown", executor.id());
            return Err(FlowError::Shutdown);
        }

        self.inner.shared.metrics.record(EventType::Submitted);
        Ok(self.inner.shared.dispatch(executor))
    }

    /// Submits an executor and blocks until it resolves.
    pub fn await_flow(&self, executor: FlowExecutor) -> Result<Record> {
        self.submit(executor)?.wait()
    }

    /// Binds `flow` to `input`, runs it and blocks for the result.
    pub fn run(&self, flow: &Flow, input: Record) -> Result<Record> {
        self.await_flow(flow.bind(input))
    }

    /// Runs `task` as a detached unit; its outcome is only logged.
    pub fn spawn<F>(&self, task: F) -> Result<()>
    where
        F: FnOnce() -> std::result::Result<(), BoxError> + Send + 'static,
    {
        self.submit(Flow::new(vec![task_step(task)]).bind(Record::empty()))?;
        Ok(())
    }

    /// Like [`spawn`](Self::spawn) but a failing task is passed to `handler`.
    pub fn spawn_or_else<F, H>(&self, task: F, handler: H) -> Result<()>
    where
        F: FnOnce() -> std::result::Result<(), BoxError> + Send + 'static,
        H: Fn(&FlowError) + Send + Sync + 'static,
    {
        let step = task_step(task).with_handler(move |e| {
            handler(e);
            Record::empty()
        });
        self.submit(Flow::new(vec![step]).bind(Record::empty()))?;
        Ok(())
    }

    /// Runs a blocking supplier on the reactor and waits for its value.
    pub fn await_with<T, F>(&self, supplier: F) -> Result<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> std::result::Result<T, BoxError> + Send + 'static,
    {
        let record = self.await_flow(supplier_flow(supplier).bind(Record::empty()))?;
        value_of(&record)
    }

    /// Like [`await_with`](Self::await_with) but a failing supplier is
    /// recovered by `handler`.
    ///
    /// Errors are still possible when the reactor is shut down.
    pub fn await_or_else<T, F, H>(&self, supplier: F, handler: H) -> Result<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> std::result::Result<T, BoxError> + Send + 'static,
        H: Fn(&FlowError) -> T + Send + Sync + 'static,
    {
        let step =
            Step::blocking(run_once(supplier)).with_handler(move |e| Record::of(handler(e)));
        let record = self.await_flow(Flow::new(vec![step]).bind(Record::empty()))?;
        value_of(&record)
    }

    /// Runs all suppliers concurrently and returns whichever finishes first.
    ///
    /// The first supplier to finish decides the outcome, failure
    /// included; later results are discarded but the losers are not
    /// interrupted. Returns `None` if the winner failed or there are no
    /// suppliers.
    pub fn await_any<T, I, F>(&self, suppliers: I) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
        I: IntoIterator<Item = F>,
        F: FnOnce() -> std::result::Result<T, BoxError> + Send + 'static,
    {
        let suppliers: Vec<F> = suppliers.into_iter().collect();
        if suppliers.is_empty() {
            return None;
        }

        let promise = Promise::racing(suppliers.len());
        for supplier in suppliers {
            let executor = supplier_flow(supplier).bind_with(Record::empty(), promise.clone());
            if let Err(e) = self.submit(executor) {
                warn!("await_any aborted: {}", e);
                return None;
            }
        }

        promise.wait_safe().and_then(|record| value_of(&record).ok())
    }

    /// Runs suppliers one after another and returns the first success.
    ///
    /// Suppliers after the first success are never called.
    pub fn await_first<T, I, F>(&self, suppliers: I) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
        I: IntoIterator<Item = F>,
        F: FnOnce() -> std::result::Result<T, BoxError> + Send + 'static,
    {
        for (index, supplier) in suppliers.into_iter().enumerate() {
            match self.await_with(supplier) {
                Ok(value) => return Some(value),
                Err(FlowError::Shutdown) => return None,
                Err(e) => debug!("await_first: supplier {} failed: {}", index, e),
            }
        }
        None
    }

    /// Stops both pools.
    ///
    /// Workers finish the step they are running and exit; executors still
    /// queued, or handed back by a worker after shutdown, are dropped and
    /// their promises fail with [`FlowError::Abandoned`]. Later
    /// submissions are rejected.
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.shared.is_shutdown()
    }

    /// Current counter values.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.shared.metrics.snapshot()
    }

    /// Executors waiting in either queue.
    pub fn queued(&self) -> usize {
        self.inner.shared.compute_queue.len() + self.inner.shared.blocking_queue.len()
    }

    pub fn config(&self) -> &ReactorConfig {
        &self.inner.config
    }

    /// Returns true if both handles drive the same pools.
    pub fn same_as(&self, other: &Reactor) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for Reactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reactor")
            .field("config", &self.inner.config)
            .field("shutdown", &self.is_shutdown())
            .field("queued", &self.queued())
            .finish()
    }
}

/// Adapts a supplier that runs at most once into a step transform.
///
/// Steps keep their transform behind a shared `Fn`, so the supplier is
/// parked in a slot and taken out on the single call.
fn run_once<T, F>(
    supplier: F,
) -> impl Fn(&Record) -> std::result::Result<Record, BoxError> + Send + Sync + 'static
where
    T: Send + Sync + 'static,
    F: FnOnce() -> std::result::Result<T, BoxError> + Send + 'static,
{
    let slot = Mutex::new(Some(supplier));
    move |_: &Record| -> std::result::Result<Record, BoxError> {
        let supplier = slot
            .lock()
            .map_err(|_| "supplier lock poisoned")?
            .take()
            .ok_or("supplier already ran")?;
        supplier().map(Record::of)
    }
}

/// Wraps a supplier as a single blocking step producing a one-value record.
fn supplier_flow<T, F>(supplier: F) -> Flow
where
    T: Send + Sync + 'static,
    F: FnOnce() -> std::result::Result<T, BoxError> + Send + 'static,
{
    Flow::single_blocking(run_once(supplier))
}

/// Wraps a fire-and-forget task as a detached step.
fn task_step<F>(task: F) -> Step
where
    F: FnOnce() -> std::result::Result<(), BoxError> + Send + 'static,
{
    let run = run_once(task);
    Step::detached(move |r: &Record| run(r).map(|_| Record::empty()))
}

fn value_of<T: Clone + 'static>(record: &Record) -> Result<T> {
    record
        .first::<T>()
        .cloned()
        .ok_or_else(|| FlowError::step("supplier record holds no value of the expected type"))
}
