//! Flow Executor
//!
//! The cursor that walks one bound flow instance. An executor owns its
//! current record and the promise it must resolve; it is moved between
//! reactor queues and worker threads but never shared, so it needs no
//! internal locking.
//!
//! State machine:
//!
//! ```text
//!   Running(i) --step ok--> Running(i + 1)
//!   Running(i) --step err--> Done(failed)        fail fast
//!   Running(n) --step_once--> Done(fulfilled)    cursor past last step
//! ```

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, warn};

use super::promise::Promise;
use crate::error::FlowError;
use crate::flow::{ExecutionPolicy, Record, Step};

static NEXT_EXECUTOR_ID: AtomicU64 = AtomicU64::new(1);

/// What a single call to [`FlowExecutor::step_once`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The step at the cursor ran (or recovered) and the cursor moved on.
    Advanced,
    /// The cursor was past the last step; the promise now holds the result.
    Completed,
    /// The step failed without recovery; the promise now holds the error.
    Failed,
    /// The executor was already done; nothing happened.
    Idle,
}

/// Stateful cursor executing one bound flow instance.
pub struct FlowExecutor {
    id: u64,
    steps: Arc<[Step]>,
    cursor: usize,
    current: Record,
    promise: Promise<Record>,
    done: bool,
}

impl FlowExecutor {
    pub(crate) fn new(steps: Arc<[Step]>, input: Record, promise: Promise<Record>) -> Self {
        Self {
            id: NEXT_EXECUTOR_ID.fetch_add(1, Ordering::Relaxed),
            steps,
            cursor: 0,
            current: input,
            promise,
            done: false,
        }
    }

    /// Process-unique identifier, used in log messages.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Policy of the step at the cursor, or `None` once every step has run
    /// (or the executor is done).
    pub fn current_policy(&self) -> Option<ExecutionPolicy> {
        if self.done {
            return None;
        }
        self.steps.get(self.cursor).map(Step::policy)
    }

    /// True once the promise has been resolved by this executor.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// True when the cursor is past the last step.
    pub fn is_finished(&self) -> bool {
        self.done || self.cursor >= self.steps.len()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Record the next step will receive.
    pub fn current(&self) -> &Record {
        &self.current
    }

    pub fn promise(&self) -> &Promise<Record> {
        &self.promise
    }

    /// Advances the executor by one step.
    ///
    /// Past the last step this resolves the promise with the current
    /// record. A step failure without recovery resolves the promise with
    /// that failure and no further steps ever run.
    pub fn step_once(&mut self) -> StepOutcome {
        if self.done {
            return StepOutcome::Idle;
        }

        let Some(step) = self.steps.get(self.cursor) else {
            self.finish(Ok(self.current.clone()));
            return StepOutcome::Completed;
        };

        let result = panic::catch_unwind(AssertUnwindSafe(|| step.execute(&self.current)))
            .unwrap_or_else(|payload| Err(FlowError::from_panic(payload)));

        match result {
            Ok(record) => {
                self.current = record;
                self.cursor += 1;
                StepOutcome::Advanced
            }
            Err(e) => {
                warn!(
                    "Flow executor {} failed at step {} ('{}'): {}",
                    self.id,
                    self.cursor,
                    step.label(),
                    e
                );
                self.finish(Err(e));
                StepOutcome::Failed
            }
        }
    }

    /// Splits off the detached step at the cursor as its own executor.
    ///
    /// The returned unit runs that single step on the blocking pool with
    /// a fresh promise nobody else holds. This executor moves past the
    /// step immediately and keeps its current record. Returns `None` when
    /// the step at the cursor is not detached.
    pub fn detach_current(&mut self) -> Option<FlowExecutor> {
        if self.current_policy() != Some(ExecutionPolicy::Detached) {
            return None;
        }

        let step = self.steps[self.cursor].with_policy(ExecutionPolicy::InlineBlocking);
        let unit = FlowExecutor::new(Arc::from(vec![step]), self.current.clone(), Promise::new());

        debug!(
            "Flow executor {} detached step {} as executor {}",
            self.id, self.cursor, unit.id
        );
        self.cursor += 1;
        Some(unit)
    }

    fn finish(&mut self, outcome: Result<Record, FlowError>) {
        self.done = true;
        // Misuse is already logged by the promise; the outcome stays intact.
        let _ = match outcome {
            Ok(record) => self.promise.fulfill(record),
            Err(e) => self.promise.fail(e),
        };
    }
}

impl Drop for FlowExecutor {
    fn drop(&mut self) {
        if !self.done {
            debug!(
                "Flow executor {} dropped at step {} of {}",
                self.id,
                self.cursor,
                self.steps.len()
            );
            self.finish(Err(FlowError::Abandoned));
        }
    }
}

impl std::fmt::Debug for FlowExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowExecutor")
            .field("id", &self.id)
            .field("cursor", &self.cursor)
            .field("steps", &self.steps.len())
            .field("done", &self.done)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use crate::flow::Flow;
    use std::sync::atomic::AtomicUsize;

    fn int(r: &Record) -> i64 {
        r.first::<i64>().copied().unwrap_or_default()
    }

    fn run_to_completion(executor: &mut FlowExecutor) {
        while !executor.is_done() {
            if executor.current_policy() == Some(ExecutionPolicy::Detached) {
                drop(executor.detach_current());
            } else {
                executor.step_once();
            }
        }
    }

    fn counting(
        counter: &Arc<AtomicUsize>,
    ) -> impl Fn(&Record) -> Result<Record, BoxError> + Send + Sync + 'static {
        let counter = Arc::clone(counter);
        move |r: &Record| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Record::of(int(r) + 1))
        }
    }

    #[test]
    fn test_steps_fold_in_order() {
        let flow = Flow::builder()
            .compute(|r: &Record| Ok(Record::of(int(r) + 1)))
            .blocking(|r: &Record| Ok(Record::of(int(r) * 2)))
            .compute(|r: &Record| Ok(Record::of(int(r) - 3)))
            .build();

        let mut executor = flow.bind(Record::of(5_i64));
        run_to_completion(&mut executor);

        assert_eq!(executor.promise().wait().unwrap().first::<i64>(), Some(&9));
    }

    #[test]
    fn test_policy_walk() {
        let flow = Flow::builder()
            .compute(|r: &Record| Ok(r.clone()))
            .blocking(|r: &Record| Ok(r.clone()))
            .build();
        let mut executor = flow.bind(Record::empty());

        assert_eq!(executor.current_policy(), Some(ExecutionPolicy::InlineCompute));
        assert_eq!(executor.step_once(), StepOutcome::Advanced);
        assert_eq!(executor.current_policy(), Some(ExecutionPolicy::InlineBlocking));
        assert_eq!(executor.step_once(), StepOutcome::Advanced);
        assert_eq!(executor.current_policy(), None);
        assert!(executor.is_finished());
        assert!(!executor.is_done());
        assert_eq!(executor.step_once(), StepOutcome::Completed);
        assert!(executor.is_done());
        assert_eq!(executor.step_once(), StepOutcome::Idle);
    }

    #[test]
    fn test_empty_flow_resolves_with_input() {
        let input = Record::of("unchanged");
        let mut executor = Flow::new(Vec::new()).bind(input.clone());

        assert_eq!(executor.step_once(), StepOutcome::Completed);
        assert!(executor.promise().wait().unwrap().ptr_eq(&input));
    }

    #[test]
    fn test_fail_fast_skips_remaining_steps() {
        let after = Arc::new(AtomicUsize::new(0));
        let flow = Flow::builder()
            .compute(|r: &Record| Ok(r.clone()))
            .compute(|_: &Record| Err("boom".into()))
            .compute(counting(&after))
            .blocking(counting(&after))
            .build();

        let mut executor = flow.bind(Record::of(1_i64));
        run_to_completion(&mut executor);

        assert_eq!(executor.cursor(), 1);
        assert_eq!(after.load(Ordering::SeqCst), 0);
        assert!(executor.promise().wait().is_err());
    }

    #[test]
    fn test_recovered_failure_continues() {
        let flow = Flow::builder()
            .then(Step::compute(|_: &Record| Err("boom".into())).with_handler(|_| Record::of(0_i64)))
            .compute(|r: &Record| Ok(Record::of(int(r) + 1)))
            .build();

        let mut executor = flow.bind(Record::of(5_i64));
        run_to_completion(&mut executor);

        assert_eq!(executor.promise().wait().unwrap().first::<i64>(), Some(&1));
    }

    #[test]
    fn test_guard_skip_passes_record_through() {
        let flow = Flow::builder()
            .then(Step::compute(|_: &Record| Err("unreachable".into())).with_guard(|_| false))
            .build();

        let input = Record::of(4_i64);
        let mut executor = flow.bind(input.clone());
        run_to_completion(&mut executor);

        assert!(executor.promise().wait().unwrap().ptr_eq(&input));
    }

    #[test]
    fn test_panicking_handler_fails_executor() {
        let flow = Flow::builder()
            .then(
                Step::compute(|_: &Record| Err("boom".into()))
                    .with_handler(|_| panic!("handler exploded")),
            )
            .build();

        let mut executor = flow.bind(Record::empty());
        assert_eq!(executor.step_once(), StepOutcome::Failed);
        assert!(matches!(
            executor.promise().wait(),
            Err(FlowError::Panicked(ref m)) if m == "handler exploded"
        ));
    }

    #[test]
    fn test_detach_passes_record_through() {
        let flow = Flow::builder()
            .detached(|_: &Record| Ok(Record::of(1000_i64)))
            .compute(|r: &Record| Ok(Record::of(int(r) + 1)))
            .build();

        let mut executor = flow.bind(Record::of(1_i64));
        let mut unit = executor.detach_current().unwrap();

        assert_eq!(executor.cursor(), 1);
        assert_eq!(executor.current().first::<i64>(), Some(&1));
        assert_eq!(unit.current_policy(), Some(ExecutionPolicy::InlineBlocking));
        assert!(!unit.promise().same_as(executor.promise()));

        run_to_completion(&mut unit);
        assert_eq!(unit.promise().wait().unwrap().first::<i64>(), Some(&1000));

        run_to_completion(&mut executor);
        assert_eq!(executor.promise().wait().unwrap().first::<i64>(), Some(&2));
    }

    #[test]
    fn test_detached_failure_does_not_reach_parent() {
        let flow = Flow::builder()
            .detached(|_: &Record| Err("side effect failed".into()))
            .build();

        let mut executor = flow.bind(Record::of(3_i64));
        let mut unit = executor.detach_current().unwrap();
        run_to_completion(&mut unit);
        run_to_completion(&mut executor);

        assert!(unit.promise().wait().is_err());
        assert_eq!(executor.promise().wait().unwrap().first::<i64>(), Some(&3));
    }

    #[test]
    fn test_detach_rejected_for_inline_step() {
        let mut executor = Flow::single(|r: &Record| Ok(r.clone())).bind(Record::empty());
        assert!(executor.detach_current().is_none());
        assert_eq!(executor.cursor(), 0);
    }

    #[test]
    fn test_drop_unfinished_abandons_promise() {
        let promise = {
            let executor = Flow::single(|r: &Record| Ok(r.clone())).bind(Record::empty());
            executor.promise().clone()
        };
        assert!(matches!(promise.wait(), Err(FlowError::Abandoned)));
    }

    #[test]
    fn test_ids_are_unique() {
        let flow = Flow::new(Vec::new());
        let a = flow.bind(Record::empty());
        let b = flow.bind(Record::empty());
        assert_ne!(a.id(), b.id());
    }
}
