//! StepFlow - Staged Pipeline Execution Engine
//!
//! Compose typed transformation steps into a flow, tag each step with an
//! execution policy, and let a reactor drive bound instances of the flow
//! across a compute pool and a blocking pool. Results come back through
//! single-assignment promises.
//!
//! # Architecture
//!
//! The library is organized into four main modules:
//!
//! - [`flow`]: Records, steps and immutable flow definitions
//! - [`execution`]: Flow executors, promises and the reactor
//! - [`monitoring`]: Reactor counters
//! - [`config`]: Pool sizing and YAML loading
//!
//! # Example
//!
//! ```rust,no_run
//! use stepflow::{Flow, Reactor, ReactorConfig, Record};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let reactor = Reactor::new(ReactorConfig::default())?;
//!
//!     let flow = Flow::builder()
//!         .compute(|r: &Record| Ok(Record::of(r.first::<i64>().copied().unwrap_or(0) + 1)))
//!         .blocking(|r: &Record| Ok(Record::of(r.first::<i64>().copied().unwrap_or(0) * 2)))
//!         .build();
//!
//!     let result = reactor.run(&flow, Record::of(5_i64))?;
//!     assert_eq!(result.first::<i64>(), Some(&12));
//!
//!     reactor.shutdown();
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod execution;
pub mod flow;
pub mod monitoring;

// Re-export commonly used types
pub use config::{load_config, ReactorConfig};
pub use error::{BoxError, FlowError, Result};
pub use execution::{FlowExecutor, LazyReactor, Promise, Reactor, StepOutcome};
pub use flow::{ExecutionPolicy, Flow, Record, Step};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "StepFlow";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_version() {
        assert!(!VERSION.is_empty());
        assert!(VERSION.contains('.'));
    }

    #[test]
    fn test_app_name() {
        assert_eq!(APP_NAME, "StepFlow");
    }

    #[test]
    fn test_module_exports_step() {
        let step = Step::blocking(|r: &Record| Ok(r.clone()));
        assert_eq!(step.policy(), ExecutionPolicy::InlineBlocking);
    }

    #[test]
    fn test_module_exports_flow() {
        let flow = Flow::new(Vec::new());
        assert!(flow.is_empty());
    }

    #[test]
    fn test_version_format() {
        let parts: Vec<&str> = VERSION.split('.').collect();
        assert!(parts.len() >= 2, "Version should have at least major.minor");
        for part in parts {
            assert!(part.parse::<u32>().is_ok(), "Version components should be numeric");
        }
    }
}
