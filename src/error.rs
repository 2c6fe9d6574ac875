//! Error Types
//!
//! A single error enum shared by steps, promises and the reactor.
//! It is `Clone` because a resolved promise hands the same failure to
//! every thread waiting on it.

use std::error::Error;
use std::sync::Arc;

use thiserror::Error;

/// Boxed error returned by user transforms and suppliers.
pub type BoxError = Box<dyn Error + Send + Sync>;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, FlowError>;

/// Failures surfaced by the engine.
#[derive(Debug, Clone, Error)]
pub enum FlowError {
    /// A step transform returned an error.
    #[error("step failed: {0}")]
    Step(#[source] Arc<dyn Error + Send + Sync>),

    /// A transform, guard or error handler panicked.
    #[error("step panicked: {0}")]
    Panicked(String),

    /// Work was submitted after the reactor was shut down.
    #[error("reactor is shut down")]
    Shutdown,

    /// The executor bound to a promise was dropped before resolving it.
    #[error("flow executor was dropped before completing")]
    Abandoned,

    /// A blocking wait was cut short before a result was available.
    #[error("wait interrupted: {0}")]
    Interrupted(String),

    /// A non-racing promise received a second terminal write.
    #[error("promise already resolved")]
    AlreadyResolved,

    /// A worker thread could not be started.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(String),

    /// Configuration could not be loaded or is invalid.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl FlowError {
    /// Wraps any error (or message) as a step failure.
    ///
    /// ```
    /// use stepflow::FlowError;
    ///
    /// let err = FlowError::step("boom");
    /// assert_eq!(err.to_string(), "step failed: boom");
    /// ```
    pub fn step<E: Into<BoxError>>(error: E) -> Self {
        Self::Step(Arc::from(error.into()))
    }

    /// Builds a `Panicked` error from a panic payload.
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        Self::Panicked(message)
    }
}

impl From<BoxError> for FlowError {
    fn from(error: BoxError) -> Self {
        Self::Step(Arc::from(error))
    }
}
