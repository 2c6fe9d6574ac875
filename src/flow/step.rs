//! Step Definition
//!
//! A step is one unit of work inside a flow: a transform, the execution
//! policy deciding which pool runs it, and optional recovery and skip
//! hooks. Steps are plain values; the policy is a tag the reactor
//! dispatches on, never a subtype.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use log::debug;

use super::record::Record;
use crate::error::{BoxError, FlowError, Result};

/// Transform applied by a step. Must not mutate its input.
pub type Transform = Arc<dyn Fn(&Record) -> std::result::Result<Record, BoxError> + Send + Sync>;

/// Recovery hook: turns a failure into the step's output.
pub type ErrorHandler = Arc<dyn Fn(&FlowError) -> Record + Send + Sync>;

/// Skip predicate: the step only runs when it returns true.
pub type Guard = Arc<dyn Fn(&Record) -> bool + Send + Sync>;

/// Where and how a step is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionPolicy {
    /// Runs synchronously on the compute pool, chained with adjacent
    /// compute steps without re-queueing.
    InlineCompute,
    /// Runs synchronously on the blocking pool, one step per pop.
    InlineBlocking,
    /// Spawned as an independent unit; the owning flow continues
    /// immediately and never sees its result.
    Detached,
}

impl fmt::Display for ExecutionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InlineCompute => "inline-compute",
            Self::InlineBlocking => "inline-blocking",
            Self::Detached => "detached",
        };
        f.write_str(name)
    }
}

/// One unit of work in a [`Flow`](super::Flow).
///
/// # Example
///
/// ```
/// use stepflow::{Record, Step};
///
/// let step = Step::compute(|r: &Record| {
///     let x = r.first::<i64>().copied().unwrap_or_default();
///     Ok(Record::of(x + 1))
/// })
/// .named("increment");
///
/// let out = step.execute(&Record::of(1_i64)).unwrap();
/// assert_eq!(out.first::<i64>(), Some(&2));
/// ```
#[derive(Clone)]
pub struct Step {
    name: Option<String>,
    transform: Transform,
    policy: ExecutionPolicy,
    handler: Option<ErrorHandler>,
    guard: Option<Guard>,
}

impl Step {
    /// Creates a step with an explicit policy.
    pub fn new<F>(policy: ExecutionPolicy, transform: F) -> Self
    where
        F: Fn(&Record) -> std::result::Result<Record, BoxError> + Send + Sync + 'static,
    {
        Self {
            name: None,
            transform: Arc::new(transform),
            policy,
            handler: None,
            guard: None,
        }
    }

    /// Creates an [`ExecutionPolicy::InlineCompute`] step.
    pub fn compute<F>(transform: F) -> Self
    where
        F: Fn(&Record) -> std::result::Result<Record, BoxError> + Send + Sync + 'static,
    {
        Self::new(ExecutionPolicy::InlineCompute, transform)
    }

    /// Creates an [`ExecutionPolicy::InlineBlocking`] step.
    pub fn blocking<F>(transform: F) -> Self
    where
        F: Fn(&Record) -> std::result::Result<Record, BoxError> + Send + Sync + 'static,
    {
        Self::new(ExecutionPolicy::InlineBlocking, transform)
    }

    /// Creates an [`ExecutionPolicy::Detached`] step.
    pub fn detached<F>(transform: F) -> Self
    where
        F: Fn(&Record) -> std::result::Result<Record, BoxError> + Send + Sync + 'static,
    {
        Self::new(ExecutionPolicy::Detached, transform)
    }

    /// Attaches a recovery handler.
    pub fn with_handler<H>(mut self, handler: H) -> Self
    where
        H: Fn(&FlowError) -> Record + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Attaches a skip predicate.
    pub fn with_guard<G>(mut self, guard: G) -> Self
    where
        G: Fn(&Record) -> bool + Send + Sync + 'static,
    {
        self.guard = Some(Arc::new(guard));
        self
    }

    /// Sets a name used in log messages.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Returns a copy of this step carrying another policy.
    pub fn with_policy(&self, policy: ExecutionPolicy) -> Self {
        Self {
            policy,
            ..self.clone()
        }
    }

    pub fn policy(&self) -> ExecutionPolicy {
        self.policy
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }

    pub fn has_guard(&self) -> bool {
        self.guard.is_some()
    }

    /// Runs the step against `input`.
    ///
    /// - A guard returning false skips the step: the input is returned
    ///   as-is and the handler is not consulted.
    /// - A failing (or panicking) transform is handed to the handler if
    ///   one is registered; its record becomes the output.
    /// - Without a handler the failure is returned as `Err`.
    pub fn execute(&self, input: &Record) -> Result<Record> {
        if let Some(guard) = &self.guard {
            if !guard(input) {
                debug!("Step '{}' skipped by guard", self.label());
                return Ok(input.clone());
            }
        }

        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| (self.transform)(input))) {
            Ok(Ok(record)) => return Ok(record),
            Ok(Err(e)) => FlowError::from(e),
            Err(payload) => FlowError::from_panic(payload),
        };

        match &self.handler {
            Some(handler) => {
                debug!("Step '{}' recovered from: {}", self.label(), outcome);
                Ok(handler(&outcome))
            }
            None => Err(outcome),
        }
    }

    pub(crate) fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("<unnamed>")
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .field("handler", &self.handler.is_some())
            .field("guard", &self.guard.is_some())
            .finish()
    }
}
