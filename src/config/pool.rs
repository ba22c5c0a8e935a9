//! Task pool configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Smallest accepted worker thread stack size.
const MIN_STACK_SIZE: usize = 64 * 1024;

/// Environment variable overriding [`TaskPoolConfig::worker_count`].
pub const ENV_WORKER_COUNT: &str = "TASK_POOL_WORKER_COUNT";
/// Environment variable overriding [`TaskPoolConfig::idle_interval_ms`].
pub const ENV_IDLE_INTERVAL_MS: &str = "TASK_POOL_IDLE_INTERVAL_MS";
/// Environment variable overriding [`TaskPoolConfig::thread_stack_size`].
pub const ENV_THREAD_STACK_SIZE: &str = "TASK_POOL_THREAD_STACK_SIZE";
/// Environment variable overriding [`TaskPoolConfig::thread_name_prefix`].
pub const ENV_THREAD_NAME_PREFIX: &str = "TASK_POOL_THREAD_NAME_PREFIX";

/// Worker count used when none is configured: one less than the available
/// parallelism, and never less than one.
#[must_use]
pub fn default_worker_count() -> usize {
    num_cpus::get().saturating_sub(1).max(1)
}

/// Task pool configuration.
///
/// The worker count is fixed for the pool's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskPoolConfig {
    /// Number of worker threads.
    pub worker_count: usize,
    /// Pause between scheduling attempts, in milliseconds.
    pub idle_interval_ms: u64,
    /// Stack size of each worker thread, in bytes.
    pub thread_stack_size: usize,
    /// Worker threads are named `{prefix}-{id}`.
    pub thread_name_prefix: String,
}

impl Default for TaskPoolConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            idle_interval_ms: 1000,
            thread_stack_size: 2 * 1024 * 1024,
            thread_name_prefix: "task-pool".to_string(),
        }
    }
}

impl TaskPoolConfig {
    /// Default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of worker threads.
    #[must_use]
    pub const fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    /// Set the pause between scheduling attempts.
    #[must_use]
    pub fn with_idle_interval(mut self, interval: Duration) -> Self {
        self.idle_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the worker thread stack size.
    #[must_use]
    pub const fn with_thread_stack_size(mut self, bytes: usize) -> Self {
        self.thread_stack_size = bytes;
        self
    }

    /// Set the worker thread name prefix.
    #[must_use]
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Pause between scheduling attempts.
    #[must_use]
    pub const fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.worker_count == 0 {
            return Err("worker_count must be greater than 0".into());
        }
        if self.idle_interval_ms == 0 {
            return Err("idle_interval_ms must be greater than 0".into());
        }
        if self.thread_stack_size < MIN_STACK_SIZE {
            return Err(format!("thread_stack_size must be at least {MIN_STACK_SIZE} bytes"));
        }
        if self.thread_name_prefix.is_empty() {
            return Err("thread_name_prefix must not be empty".into());
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate. Missing fields
    /// take their default values.
    ///
    /// # Errors
    ///
    /// Returns a description of the parse or validation failure.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build configuration from `TASK_POOL_*` environment variables, loading
    /// a `.env` file first if one exists. Unset variables keep their
    /// default values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first unparsable variable or
    /// validation failure.
    pub fn from_env() -> Result<Self, String> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(v) = lookup(ENV_WORKER_COUNT) {
            cfg.worker_count = parse_var(ENV_WORKER_COUNT, &v)?;
        }
        if let Some(v) = lookup(ENV_IDLE_INTERVAL_MS) {
            cfg.idle_interval_ms = parse_var(ENV_IDLE_INTERVAL_MS, &v)?;
        }
        if let Some(v) = lookup(ENV_THREAD_STACK_SIZE) {
            cfg.thread_stack_size = parse_var(ENV_THREAD_STACK_SIZE, &v)?;
        }
        if let Some(v) = lookup(ENV_THREAD_NAME_PREFIX) {
            cfg.thread_name_prefix = v;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

fn parse_var<T>(key: &str, value: &str) -> Result<T, String>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| format!("{key}: invalid value `{value}`: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_worker_count_reserves_a_core() {
        let cores = num_cpus::get();
        let expected = if cores > 1 { cores - 1 } else { 1 };
        assert_eq!(default_worker_count(), expected);
        assert!(TaskPoolConfig::default().validate().is_ok());
    }

    #[test]
    fn test_lookup_overrides_defaults() {
        let cfg = TaskPoolConfig::from_lookup(lookup_from(&[
            (ENV_WORKER_COUNT, "3"),
            (ENV_IDLE_INTERVAL_MS, " 250 "),
            (ENV_THREAD_NAME_PREFIX, "ingest"),
        ]))
        .unwrap();
        assert_eq!(cfg.worker_count, 3);
        assert_eq!(cfg.idle_interval(), Duration::from_millis(250));
        assert_eq!(cfg.thread_name_prefix, "ingest");
        assert_eq!(cfg.thread_stack_size, TaskPoolConfig::default().thread_stack_size);
    }

    #[test]
    fn test_lookup_rejects_garbage() {
        let err = TaskPoolConfig::from_lookup(lookup_from(&[(ENV_WORKER_COUNT, "many")]))
            .unwrap_err();
        assert!(err.starts_with(ENV_WORKER_COUNT));
    }

    #[test]
    fn test_lookup_validates() {
        let err = TaskPoolConfig::from_lookup(lookup_from(&[(ENV_WORKER_COUNT, "0")]))
            .unwrap_err();
        assert_eq!(err, "worker_count must be greater than 0");
    }
}
