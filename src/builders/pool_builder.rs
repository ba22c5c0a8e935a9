//! Builder for [`TaskPool`].

use std::sync::Arc;
use std::time::Duration;

use crate::config::TaskPoolConfig;
use crate::core::task_pool::FnErrorHandler;
use crate::core::{NoopErrorHandler, PoolError, Task, TaskErrorHandler, TaskPool};

/// Configures and starts a [`TaskPool`].
///
/// ```rust,no_run
/// use std::time::Duration;
/// use prometheus_task_pool::core::TaskPool;
///
/// let pool = TaskPool::builder()
///     .worker_count(2)
///     .idle_interval(Duration::from_millis(100))
///     .on_task_error(|task| eprintln!("{} failed: {:?}", task.name(), task.error_message()))
///     .build()?;
/// # Ok::<(), prometheus_task_pool::core::PoolError>(())
/// ```
pub struct TaskPoolBuilder {
    config: TaskPoolConfig,
    error_handler: Arc<dyn TaskErrorHandler>,
}

impl Default for TaskPoolBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskPoolBuilder {
    /// Builder with the default configuration and a no-op error handler.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: TaskPoolConfig::default(),
            error_handler: Arc::new(NoopErrorHandler),
        }
    }

    /// Replace the whole configuration.
    #[must_use]
    pub fn config(mut self, config: TaskPoolConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the number of worker threads.
    #[must_use]
    pub fn worker_count(mut self, worker_count: usize) -> Self {
        self.config = self.config.with_worker_count(worker_count);
        self
    }

    /// Set the pause between scheduling attempts.
    #[must_use]
    pub fn idle_interval(mut self, interval: Duration) -> Self {
        self.config = self.config.with_idle_interval(interval);
        self
    }

    /// Install the handler called when a task fails.
    #[must_use]
    pub fn error_handler(mut self, handler: impl TaskErrorHandler) -> Self {
        self.error_handler = Arc::new(handler);
        self
    }

    /// Install a closure called when a task fails.
    #[must_use]
    pub fn on_task_error<F>(self, handler: F) -> Self
    where
        F: Fn(&Task) + Send + Sync + 'static,
    {
        self.error_handler(FnErrorHandler(handler))
    }

    /// Validate the configuration and start the workers.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::InvalidConfig` for an invalid configuration, or
    /// another `PoolError` if a worker cannot be started.
    pub fn build(self) -> Result<TaskPool, PoolError> {
        TaskPool::start(self.config, self.error_handler)
    }
}
