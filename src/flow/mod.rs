//! Flow Definition Module
//!
//! Data structures describing a pipeline before it runs.
//!
//! # Structure
//!
//! - [`record`]: Opaque value container passed between steps
//! - [`step`]: Single unit of work and its execution policy
//! - [`model`]: Immutable ordered list of steps and its builder

pub mod model;
pub mod record;
pub mod step;

pub use model::{Flow, FlowBuilder};
pub use record::{Record, Value};
pub use step::{ErrorHandler, ExecutionPolicy, Guard, Step, Transform};
