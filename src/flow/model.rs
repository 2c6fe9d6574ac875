//! Flow Definition
//!
//! A flow is an immutable, ordered list of steps. It is a reusable
//! pipeline definition: binding it to an input produces a
//! [`FlowExecutor`] and leaves the flow itself untouched, so one flow
//! can back any number of concurrent executions.

use std::sync::Arc;

use crate::error::{BoxError, FlowError};
use crate::execution::{FlowExecutor, Promise};

use super::record::Record;
use super::step::{ExecutionPolicy, Step};

/// Immutable ordered sequence of [`Step`]s.
///
/// # Example
///
/// ```
/// use stepflow::{Flow, Record, Step};
///
/// let flow = Flow::builder()
///     .then(Step::compute(|r: &Record| Ok(Record::of(r.first::<i64>().copied().unwrap_or(0) + 1))))
///     .then(Step::blocking(|r: &Record| Ok(Record::of(r.first::<i64>().copied().unwrap_or(0) * 2))))
///     .build();
///
/// assert_eq!(flow.len(), 2);
/// let executor = flow.bind(Record::of(5_i64));
/// assert!(!executor.is_done());
/// ```
#[derive(Clone, Debug)]
pub struct Flow {
    steps: Arc<[Step]>,
}

impl Flow {
    /// Creates a flow from a list of steps.
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Arc::from(steps),
        }
    }

    /// Starts an incremental builder.
    pub fn builder() -> FlowBuilder {
        FlowBuilder::default()
    }

    /// Single compute step flow.
    pub fn single<F>(transform: F) -> Self
    where
        F: Fn(&Record) -> Result<Record, BoxError> + Send + Sync + 'static,
    {
        Self::new(vec![Step::compute(transform)])
    }

    /// Single blocking step flow.
    pub fn single_blocking<F>(transform: F) -> Self
    where
        F: Fn(&Record) -> Result<Record, BoxError> + Send + Sync + 'static,
    {
        Self::new(vec![Step::blocking(transform)])
    }

    /// Single detached step flow.
    pub fn single_detached<F>(transform: F) -> Self
    where
        F: Fn(&Record) -> Result<Record, BoxError> + Send + Sync + 'static,
    {
        Self::new(vec![Step::detached(transform)])
    }

    /// Single compute step flow whose failures are recovered by `handler`.
    pub fn single_or_else<F, H>(transform: F, handler: H) -> Self
    where
        F: Fn(&Record) -> Result<Record, BoxError> + Send + Sync + 'static,
        H: Fn(&FlowError) -> Record + Send + Sync + 'static,
    {
        Self::new(vec![Step::compute(transform).with_handler(handler)])
    }

    pub fn single_blocking_or_else<F, H>(transform: F, handler: H) -> Self
    where
        F: Fn(&Record) -> Result<Record, BoxError> + Send + Sync + 'static,
        H: Fn(&FlowError) -> Record + Send + Sync + 'static,
    {
        Self::new(vec![Step::blocking(transform).with_handler(handler)])
    }

    pub fn single_detached_or_else<F, H>(transform: F, handler: H) -> Self
    where
        F: Fn(&Record) -> Result<Record, BoxError> + Send + Sync + 'static,
        H: Fn(&FlowError) -> Record + Send + Sync + 'static,
    {
        Self::new(vec![Step::detached(transform).with_handler(handler)])
    }

    /// Binds the flow to an input with a fresh promise.
    ///
    /// Nothing runs until the executor is stepped, usually by submitting
    /// it to a [`Reactor`](crate::Reactor).
    pub fn bind(&self, input: Record) -> FlowExecutor {
        self.bind_with(input, Promise::new())
    }

    /// Binds the flow to an input and an existing promise.
    ///
    /// Several executors may share one racing promise; see
    /// [`Promise::racing`].
    pub fn bind_with(&self, input: Record, promise: Promise<Record>) -> FlowExecutor {
        FlowExecutor::new(Arc::clone(&self.steps), input, promise)
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Policies of all steps in order.
    pub fn policies(&self) -> Vec<ExecutionPolicy> {
        self.steps.iter().map(Step::policy).collect()
    }
}

/// Collects steps into a [`Flow`].
#[derive(Default)]
pub struct FlowBuilder {
    steps: Vec<Step>,
}

impl FlowBuilder {
    /// Appends a step.
    pub fn then(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Appends a compute step.
    pub fn compute<F>(self, transform: F) -> Self
    where
        F: Fn(&Record) -> Result<Record, BoxError> + Send + Sync + 'static,
    {
        self.then(Step::compute(transform))
    }

    /// Appends a blocking step.
    pub fn blocking<F>(self, transform: F) -> Self
    where
        F: Fn(&Record) -> Result<Record, BoxError> + Send + Sync + 'static,
    {
        self.then(Step::blocking(transform))
    }

    /// Appends a detached step.
    pub fn detached<F>(self, transform: F) -> Self
    where
        F: Fn(&Record) -> Result<Record, BoxError> + Send + Sync + 'static,
    {
        self.then(Step::detached(transform))
    }

    pub fn build(self) -> Flow {
        Flow::new(self.steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(r: &Record) -> Result<Record, BoxError> {
        Ok(r.clone())
    }

    #[test]
    fn test_builder_preserves_order() {
        let flow = Flow::builder()
            .compute(identity)
            .blocking(identity)
            .detached(identity)
            .build();

        assert_eq!(
            flow.policies(),
            vec![
                ExecutionPolicy::InlineCompute,
                ExecutionPolicy::InlineBlocking,
                ExecutionPolicy::Detached,
            ]
        );
    }

    #[test]
    fn test_single_factories() {
        assert_eq!(Flow::single(identity).policies(), vec![ExecutionPolicy::InlineCompute]);
        assert_eq!(
            Flow::single_blocking(identity).policies(),
            vec![ExecutionPolicy::InlineBlocking]
        );
        assert_eq!(
            Flow::single_detached(identity).policies(),
            vec![ExecutionPolicy::Detached]
        );
    }

    #[test]
    fn test_single_or_else_factories_recover() {
        let fail = |_: &Record| -> Result<Record, BoxError> { Err("down".into()) };
        let fallback = |_: &FlowError| Record::of("fallback");

        for flow in [
            Flow::single_or_else(fail, fallback),
            Flow::single_blocking_or_else(fail, fallback),
        ] {
            assert!(flow.steps()[0].has_handler());
            let mut executor = flow.bind(Record::empty());
            executor.step_once();
            executor.step_once();
            let record = executor.promise().try_get().unwrap().unwrap();
            assert_eq!(record.first::<&str>(), Some(&"fallback"));
        }

        let detached = Flow::single_detached_or_else(fail, fallback);
        assert_eq!(detached.policies(), vec![ExecutionPolicy::Detached]);
        assert!(detached.steps()[0].has_handler());
    }

    #[test]
    fn test_bind_does_not_execute() {
        let flow = Flow::single(|_: &Record| panic!("must not run on bind"));
        let executor = flow.bind(Record::of(1_i32));
        assert_eq!(executor.cursor(), 0);
        assert!(!executor.is_done());
        assert!(!executor.promise().is_resolved());
    }

    #[test]
    fn test_bind_with_shares_promise() {
        let flow = Flow::single(identity);
        let promise = Promise::new();
        let executor = flow.bind_with(Record::empty(), promise.clone());
        assert!(executor.promise().same_as(&promise));
    }

    #[test]
    fn test_flow_is_shared_between_executors() {
        let flow = Flow::builder().compute(identity).compute(identity).build();
        let mut first = flow.bind(Record::of(1_i32));
        let second = flow.bind(Record::of(2_i32));

        first.step_once();
        assert_eq!(first.cursor(), 1);
        assert_eq!(second.cursor(), 0);
        assert_eq!(flow.len(), 2);
    }

    #[test]
    fn test_empty_flow() {
        let flow = Flow::new(Vec::new());
        assert!(flow.is_empty());
        assert!(flow.bind(Record::empty()).current_policy().is_none());
    }
}
