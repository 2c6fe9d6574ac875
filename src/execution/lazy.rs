//! Lazily Started Reactor
//!
//! A handle for code that wants a ready-to-use reactor without paying
//! for its threads until the first submission. The handle is created and
//! passed around explicitly; there is no process-wide instance.

use log::info;
use once_cell::sync::OnceCell;

use super::engine::Reactor;
use crate::config::ReactorConfig;
use crate::error::Result;

/// Reactor whose pools start on first use.
///
/// # Example
///
/// ```rust,no_run
/// use stepflow::{LazyReactor, ReactorConfig};
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let lazy = LazyReactor::new(ReactorConfig::default());
///     assert!(!lazy.is_started());
///
///     let answer = lazy.get()?.await_with(|| Ok(42))?;
///     assert_eq!(answer, 42);
///     assert!(lazy.is_started());
///     Ok(())
/// }
/// ```
pub struct LazyReactor {
    config: ReactorConfig,
    reactor: OnceCell<Reactor>,
}

impl LazyReactor {
    /// Creates the handle; no threads are started yet.
    pub fn new(config: ReactorConfig) -> Self {
        Self {
            config,
            reactor: OnceCell::new(),
        }
    }

    /// Returns the reactor, starting it on the first call.
    ///
    /// If starting fails the error is returned and the next call tries
    /// again.
    pub fn get(&self) -> Result<&Reactor> {
        self.reactor.get_or_try_init(|| {
            info!("Starting reactor on first use");
            Reactor::new(self.config.clone())
        })
    }

    pub fn is_started(&self) -> bool {
        self.reactor.get().is_some()
    }

    /// Shuts the reactor down if it was ever started.
    pub fn shutdown(&self) {
        if let Some(reactor) = self.reactor.get() {
            reactor.shutdown();
        }
    }

    pub fn config(&self) -> &ReactorConfig {
        &self.config
    }
}

impl Default for LazyReactor {
    fn default() -> Self {
        Self::new(ReactorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn small_config() -> ReactorConfig {
        ReactorConfig::default()
            .with_threads(1, 2)
            .with_poll_interval(Duration::from_millis(10))
    }

    #[test]
    fn test_not_started_until_used() {
        let lazy = LazyReactor::new(small_config());
        assert!(!lazy.is_started());
        lazy.shutdown();
        assert!(!lazy.is_started());
    }

    #[test]
    fn test_get_returns_same_reactor() {
        let lazy = LazyReactor::new(small_config());
        let first = lazy.get().unwrap().clone();
        let second = lazy.get().unwrap();
        assert!(first.same_as(second));
        assert_eq!(second.await_with(|| Ok(5_u8)).unwrap(), 5);
    }

    #[test]
    fn test_invalid_config_can_be_retried() {
        let lazy = LazyReactor::new(small_config().with_threads(0, 1));
        assert!(lazy.get().is_err());
        assert!(!lazy.is_started());
    }

    #[test]
    fn test_shutdown_started_reactor() {
        let lazy = LazyReactor::new(small_config());
        let reactor = lazy.get().unwrap().clone();
        lazy.shutdown();
        assert!(reactor.is_shutdown());
    }
}
