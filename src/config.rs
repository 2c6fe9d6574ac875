//! Reactor Configuration
//!
//! Pool sizes and polling behaviour, loadable from YAML.
//!
//! # Example YAML Format
//!
//! ```yaml
//! compute_threads: 4
//! blocking_threads: 32
//! poll_interval_ms: 100
//! thread_name_prefix: ingest
//! ```

use std::fs;
use std::time::Duration;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{FlowError, Result};

/// Default bounded wait of a worker on an empty queue.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Settings for a [`Reactor`](crate::Reactor).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ReactorConfig {
    /// Threads running `InlineCompute` steps
    pub compute_threads: usize,

    /// Threads running `InlineBlocking` and detached steps
    pub blocking_threads: usize,

    /// How long an idle worker waits before re-checking for shutdown
    pub poll_interval_ms: u64,

    /// Worker threads are named `<prefix>-compute-<i>` / `<prefix>-blocking-<i>`
    pub thread_name_prefix: String,
}

impl Default for ReactorConfig {
    fn default() -> Self {
        let cpus = num_cpus::get();
        Self {
            compute_threads: cpus,
            blocking_threads: (cpus * 4).max(16),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            thread_name_prefix: "stepflow".to_string(),
        }
    }
}

impl ReactorConfig {
    /// Sets both pool sizes.
    pub fn with_threads(mut self, compute: usize, blocking: usize) -> Self {
        self.compute_threads = compute;
        self.blocking_threads = blocking;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Checks that pools are non-empty and the poll interval is positive.
    pub fn validate(&self) -> Result<()> {
        if self.compute_threads == 0 {
            return Err(FlowError::Config("compute_threads must be at least 1".into()));
        }
        if self.blocking_threads == 0 {
            return Err(FlowError::Config("blocking_threads must be at least 1".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(FlowError::Config("poll_interval_ms must be at least 1".into()));
        }
        if self.thread_name_prefix.trim().is_empty() {
            return Err(FlowError::Config("thread_name_prefix must not be empty".into()));
        }
        Ok(())
    }
}

/// Loads and validates a configuration file.
///
/// Missing keys fall back to [`ReactorConfig::default`].
///
/// ```rust,no_run
/// use stepflow::config::load_config;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = load_config("reactor.yaml")?;
///     println!("{} compute threads", config.compute_threads);
///     Ok(())
/// }
/// ```
pub fn load_config(path: &str) -> Result<ReactorConfig> {
    info!("Loading reactor configuration from: {}", path);

    let content = fs::read_to_string(path).map_err(|e| {
        FlowError::Config(format!("failed to read '{}': {}", path, e))
    })?;

    debug!("Configuration loaded ({} bytes)", content.len());

    let config = parse_config(&content)?;
    config.validate()?;
    Ok(config)
}

/// Parses configuration from a YAML string without validating it.
pub fn parse_config(yaml: &str) -> Result<ReactorConfig> {
    if yaml.trim().is_empty() {
        return Ok(ReactorConfig::default());
    }
    serde_yaml::from_str(yaml)
        .map_err(|e| FlowError::Config(format!("failed to parse YAML: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_default_is_valid() {
        let config = ReactorConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.compute_threads >= 1);
        assert!(config.blocking_threads >= 16);
        assert_eq!(config.poll_interval(), Duration::from_millis(100));
    }

    #[test]
    fn test_parse_partial_yaml_uses_defaults() {
        let config = parse_config("compute_threads: 2\n").unwrap();
        assert_eq!(config.compute_threads, 2);
        assert_eq!(config.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
        assert_eq!(config.thread_name_prefix, "stepflow");
    }

    #[test]
    fn test_parse_empty_yaml() {
        assert_eq!(parse_config("").unwrap(), ReactorConfig::default());
    }

    #[test]
    fn test_parse_invalid_yaml() {
        let err = parse_config("compute_threads: [oops").unwrap_err();
        assert!(matches!(err, FlowError::Config(_)));
    }

    #[test]
    fn test_validate_rejects_zero_pools() {
        let config = ReactorConfig::default().with_threads(0, 4);
        assert!(config.validate().is_err());

        let config = ReactorConfig::default().with_threads(4, 0);
        assert!(config.validate().is_err());

        let mut config = ReactorConfig::default();
        config.poll_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reactor.yaml");
        fs::write(
            &path,
            "compute_threads: 3\nblocking_threads: 5\npoll_interval_ms: 25\nthread_name_prefix: test\n",
        )
        .unwrap();

        let config = load_config(path.to_str().unwrap()).unwrap();
        assert_eq!(config.compute_threads, 3);
        assert_eq!(config.blocking_threads, 5);
        assert_eq!(config.poll_interval(), Duration::from_millis(25));
        assert_eq!(config.thread_name_prefix, "test");
    }

    #[test]
    fn test_load_config_rejects_invalid_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        fs::write(&path, "blocking_threads: 0\n").unwrap();

        assert!(load_config(path.to_str().unwrap()).is_err());
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config("/nonexistent/reactor.yaml").unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }
}
