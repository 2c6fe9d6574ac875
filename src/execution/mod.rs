//! Flow Execution Module
//!
//! Runs bound flows on worker threads and hands results back through
//! promises.
//!
//! # Architecture
//!
//! - [`executor`]: Cursor stepping one bound flow instance
//! - [`promise`]: Single-assignment result slot with race support
//! - [`engine`]: The reactor and its two worker loops
//! - [`pool`]: Worker-pool contract and fixed-size implementation
//! - [`lazy`]: Reactor handle that starts its pools on first use

pub mod engine;
pub mod executor;
pub mod lazy;
pub mod pool;
pub mod promise;
mod queue;

pub use engine::Reactor;
pub use executor::{FlowExecutor, StepOutcome};
pub use lazy::LazyReactor;
pub use pool::{FixedThreadPool, ThreadPool, WorkLoop};
pub use promise::Promise;
