//! Executor configuration
//!
//! Defaults suit the CPU device. [`ExecutorConfig::from_env`] overlays the
//! `KILN_*` environment variables; values that fail to parse are ignored
//! with a warning.

use std::env;
use std::time::Duration;

/// Default number of lanes per block
pub const DEFAULT_BLOCK_SIZE: u32 = 256;

/// Configuration used when creating an [`Executor`](crate::Executor)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Backend name; only `"cpu"` ships with kiln
    pub backend: String,
    /// Lanes per block of a dispatch
    pub block_size: u32,
    /// Dispatch size used when no array resource is bound
    pub default_dispatch_size: u32,
    /// Cooperative deadline for each dispatch
    pub dispatch_timeout: Option<Duration>,
    /// Run blocks in parallel on the CPU device
    pub parallel: bool,
    /// Dedicated CPU worker threads (`None` shares rayon's global pool)
    pub worker_threads: Option<usize>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            backend: "cpu".to_string(),
            block_size: DEFAULT_BLOCK_SIZE,
            default_dispatch_size: 1,
            dispatch_timeout: None,
            parallel: true,
            worker_threads: None,
        }
    }
}

impl ExecutorConfig {
    /// Defaults overlaid with the `KILN_*` environment variables
    ///
    /// - `KILN_BACKEND`: backend name
    /// - `KILN_BLOCK_SIZE`: lanes per block (non-zero)
    /// - `KILN_DEFAULT_DISPATCH`: dispatch size without bound arrays (non-zero)
    /// - `KILN_DISPATCH_TIMEOUT_MS`: dispatch deadline in milliseconds
    /// - `KILN_PARALLEL`: `true`/`false`
    /// - `KILN_WORKER_THREADS`: dedicated worker threads (non-zero)
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(backend) = env::var("KILN_BACKEND") {
            if !backend.trim().is_empty() {
                config.backend = backend.trim().to_ascii_lowercase();
            }
        }

        if let Some(block_size) = parse_non_zero("KILN_BLOCK_SIZE") {
            config.block_size = block_size;
        }

        if let Some(dispatch) = parse_non_zero("KILN_DEFAULT_DISPATCH") {
            config.default_dispatch_size = dispatch;
        }

        if let Some(timeout_ms) = parse_var::<u64>("KILN_DISPATCH_TIMEOUT_MS") {
            config.dispatch_timeout = Some(Duration::from_millis(timeout_ms));
        }

        if let Ok(parallel) = env::var("KILN_PARALLEL") {
            match parse_flag(&parallel) {
                Some(flag) => config.parallel = flag,
                None => tracing::warn!(value = %parallel, "ignoring invalid KILN_PARALLEL"),
            }
        }

        if let Some(threads) = parse_non_zero::<usize>("KILN_WORKER_THREADS") {
            config.worker_threads = Some(threads);
        }

        config
    }

    /// Set the dispatch deadline
    pub fn with_dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.dispatch_timeout = Some(timeout);
        self
    }

    /// Set the number of lanes per block
    pub fn with_block_size(mut self, block_size: u32) -> Self {
        self.block_size = block_size;
        self
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    let value = env::var(name).ok()?;
    match value.trim().parse::<T>() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!(variable = name, value = %value, "ignoring invalid configuration value");
            None
        }
    }
}

fn parse_non_zero<T>(name: &str) -> Option<T>
where
    T: std::str::FromStr + PartialEq + Default,
{
    let parsed = parse_var::<T>(name)?;
    if parsed == T::default() {
        tracing::warn!(variable = name, "ignoring zero configuration value");
        return None;
    }
    Some(parsed)
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "KILN_BACKEND",
        "KILN_BLOCK_SIZE",
        "KILN_DEFAULT_DISPATCH",
        "KILN_DISPATCH_TIMEOUT_MS",
        "KILN_PARALLEL",
        "KILN_WORKER_THREADS",
    ];

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_default_config() {
        let config = ExecutorConfig::default();
        assert_eq!(config.backend, "cpu");
        assert_eq!(config.block_size, DEFAULT_BLOCK_SIZE);
        assert_eq!(config.default_dispatch_size, 1);
        assert!(config.dispatch_timeout.is_none());
        assert!(config.parallel);
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        clear_env();
        env::set_var("KILN_BACKEND", " CPU ");
        env::set_var("KILN_BLOCK_SIZE", "64");
        env::set_var("KILN_DEFAULT_DISPATCH", "8");
        env::set_var("KILN_DISPATCH_TIMEOUT_MS", "1500");
        env::set_var("KILN_PARALLEL", "off");
        env::set_var("KILN_WORKER_THREADS", "3");

        let config = ExecutorConfig::from_env();
        clear_env();

        assert_eq!(config.backend, "cpu");
        assert_eq!(config.block_size, 64);
        assert_eq!(config.default_dispatch_size, 8);
        assert_eq!(config.dispatch_timeout, Some(Duration::from_millis(1500)));
        assert!(!config.parallel);
        assert_eq!(config.worker_threads, Some(3));
    }

    #[test]
    #[serial]
    fn test_from_env_ignores_invalid_values() {
        clear_env();
        env::set_var("KILN_BLOCK_SIZE", "0");
        env::set_var("KILN_DEFAULT_DISPATCH", "many");
        env::set_var("KILN_PARALLEL", "sometimes");
        env::set_var("KILN_WORKER_THREADS", "-2");

        let config = ExecutorConfig::from_env();
        clear_env();

        assert_eq!(config, ExecutorConfig::default());
    }

    #[test]
    fn test_builder_methods() {
        let config = ExecutorConfig::default()
            .with_block_size(32)
            .with_dispatch_timeout(Duration::from_secs(2));
        assert_eq!(config.block_size, 32);
        assert_eq!(config.dispatch_timeout, Some(Duration::from_secs(2)));
    }
}
