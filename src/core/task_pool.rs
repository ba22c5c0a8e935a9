//! Round-robin task pool with dedicated worker threads.
//!
//! Each worker repeatedly books one ready task, runs it outside the
//! registry lock, reconciles the outcome and then idles for the configured
//! interval. Blocking tasks run directly on the worker thread; suspending
//! tasks are driven by the worker's own single-threaded tokio runtime.
//!
//! # Design
//!
//! - **One lock**: the registry (slot list, booked/stop flags, cursor) sits
//!   behind a single `parking_lot::Mutex`. It is never held while a task runs.
//! - **Safe removal**: an idle task is removed at once; a running task is
//!   marked and removed by its worker after the execution finishes.
//! - **Cooperative stop**: workers check the running flag before every
//!   booking attempt and are woken from their idle wait by [`TaskPool::stop`].

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use tokio::runtime::Runtime;
use tracing::{debug, error, info, warn};

use crate::builders::TaskPoolBuilder;
use crate::config::TaskPoolConfig;

use super::error::PoolError;
use super::slot::{Reconciliation, Registry, Removal};
use super::task::{run_blocking, run_suspending, Task};

/// Extra time granted to each worker during [`TaskPool::shutdown`] on top of
/// one idle interval.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Extension point invoked when a task records a failure and is dropped.
pub trait TaskErrorHandler: Send + Sync + 'static {
    /// Called on the worker thread after the failed task left the registry.
    fn on_task_error(&self, _task: &Task) {}
}

/// Handler that ignores task failures.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopErrorHandler;

impl TaskErrorHandler for NoopErrorHandler {}

/// Handler that logs task failures at `warn`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogErrorHandler;

impl TaskErrorHandler for LogErrorHandler {
    fn on_task_error(&self, task: &Task) {
        let message = task.error_message();
        warn!(
            task = task.name(),
            error = message.as_deref().unwrap_or("unknown"),
            "Task failed and was removed from the pool"
        );
    }
}

/// Adapts a closure to [`TaskErrorHandler`].
pub(crate) struct FnErrorHandler<F>(pub F);

impl<F> TaskErrorHandler for FnErrorHandler<F>
where
    F: Fn(&Task) + Send + Sync + 'static,
{
    fn on_task_error(&self, task: &Task) {
        (self.0)(task);
    }
}

/// Snapshot of pool activity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Number of worker threads.
    pub worker_count: usize,
    /// Tasks currently registered.
    pub registered_tasks: usize,
    /// Tasks currently booked by a worker.
    pub booked_tasks: usize,
    /// Executions finished, successful or not.
    pub completed_runs: u64,
    /// Tasks dropped because they recorded a failure.
    pub failed_tasks: u64,
    /// Tasks dropped through `remove_task`.
    pub stopped_tasks: u64,
}

#[derive(Debug, Default)]
struct PoolCounters {
    completed_runs: AtomicU64,
    failed_tasks: AtomicU64,
    stopped_tasks: AtomicU64,
}

impl PoolCounters {
    fn snapshot(
        &self,
        worker_count: usize,
        registered_tasks: usize,
        booked_tasks: usize,
    ) -> PoolStats {
        PoolStats {
            worker_count,
            registered_tasks,
            booked_tasks,
            completed_runs: self.completed_runs.load(Ordering::Relaxed),
            failed_tasks: self.failed_tasks.load(Ordering::Relaxed),
            stopped_tasks: self.stopped_tasks.load(Ordering::Relaxed),
        }
    }
}

/// State shared between the pool handle and its workers.
struct PoolShared {
    registry: Mutex<Registry>,
    running: AtomicBool,
    idle_lock: Mutex<()>,
    idle_signal: Condvar,
    idle_interval: Duration,
    counters: PoolCounters,
    error_handler: Arc<dyn TaskErrorHandler>,
}

impl PoolShared {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Book, execute and reconcile at most one task. Returns whether a task ran.
    fn try_execute_any(&self, worker_id: usize, rt: &Runtime) -> bool {
        let booking = self.registry.lock().book();
        let Some(booking) = booking else {
            return false;
        };

        debug!(
            worker_id = worker_id,
            slot_id = %booking.slot_id,
            task = booking.task.name(),
            kind = ?booking.task.kind(),
            "Worker executing task"
        );

        match &booking.task {
            Task::Blocking(task) => run_blocking(task.as_ref()),
            Task::Suspending(task) => rt.block_on(run_suspending(task.as_ref())),
        }
        self.counters.completed_runs.fetch_add(1, Ordering::Relaxed);

        let outcome = self.registry.lock().reconcile(booking.slot_id);
        match outcome {
            Reconciliation::Failed(task) => {
                self.counters.failed_tasks.fetch_add(1, Ordering::Relaxed);
                debug!(
                    worker_id = worker_id,
                    slot_id = %booking.slot_id,
                    task = task.name(),
                    "Task failed, dropped from registry"
                );
                self.error_handler.on_task_error(&task);
            }
            Reconciliation::Stopped(task) => {
                self.counters.stopped_tasks.fetch_add(1, Ordering::Relaxed);
                debug!(
                    worker_id = worker_id,
                    slot_id = %booking.slot_id,
                    task = task.name(),
                    "Deferred removal completed"
                );
                task.on_stopped();
            }
            Reconciliation::Released => {}
            Reconciliation::Missing => {
                error!(
                    worker_id = worker_id,
                    slot_id = %booking.slot_id,
                    task = booking.task.name(),
                    "Booked slot disappeared from the registry"
                );
            }
        }
        true
    }

    /// Sleep for one idle interval, or until `stop` wakes us.
    fn idle(&self) {
        let mut guard = self.idle_lock.lock();
        if self.is_running() {
            let _ = self.idle_signal.wait_for(&mut guard, self.idle_interval);
        }
    }

    fn signal_stop(&self) -> bool {
        let was_running = self.running.swap(false, Ordering::AcqRel);
        let _guard = self.idle_lock.lock();
        self.idle_signal.notify_all();
        was_running
    }
}

/// Fixed-size pool of worker threads that execute registered tasks.
///
/// # Example
///
/// ```rust,no_run
/// use prometheus_task_pool::core::{TaskFn, TaskPool};
///
/// let pool = TaskPool::new()?;
/// let task = TaskFn::new(|| true, || Ok(())).into_task();
/// pool.add(task.clone());
/// // ...
/// pool.remove_task(&task);
/// pool.shutdown();
/// # Ok::<(), prometheus_task_pool::core::PoolError>(())
/// ```
pub struct TaskPool {
    shared: Arc<PoolShared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    worker_count: usize,
}

impl TaskPool {
    /// Start a pool with the default configuration: `max(1, cores - 1)`
    /// workers and a one second idle interval.
    ///
    /// # Errors
    ///
    /// Returns `PoolError` if a worker thread or its runtime cannot be created.
    pub fn new() -> Result<Self, PoolError> {
        Self::with_config(TaskPoolConfig::default())
    }

    /// Start a pool with the given configuration and no error handler.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::InvalidConfig` if the configuration is invalid,
    /// or another `PoolError` if a worker cannot be started.
    pub fn with_config(config: TaskPoolConfig) -> Result<Self, PoolError> {
        Self::start(config, Arc::new(NoopErrorHandler))
    }

    /// Builder for a pool with a custom error handler.
    #[must_use]
    pub fn builder() -> TaskPoolBuilder {
        TaskPoolBuilder::new()
    }

    pub(crate) fn start(
        config: TaskPoolConfig,
        error_handler: Arc<dyn TaskErrorHandler>,
    ) -> Result<Self, PoolError> {
        config.validate().map_err(PoolError::InvalidConfig)?;

        let shared = Arc::new(PoolShared {
            registry: Mutex::new(Registry::new()),
            running: AtomicBool::new(true),
            idle_lock: Mutex::new(()),
            idle_signal: Condvar::new(),
            idle_interval: config.idle_interval(),
            counters: PoolCounters::default(),
            error_handler,
        });

        let mut workers = Vec::with_capacity(config.worker_count);
        for worker_id in 0..config.worker_count {
            match spawn_worker(worker_id, Arc::clone(&shared), &config) {
                Ok(worker) => workers.push(worker),
                Err(e) => {
                    // Let the workers already running wind down.
                    shared.signal_stop();
                    error!(worker_id = worker_id, error = %e, "Failed to start worker");
                    return Err(e);
                }
            }
        }

        info!(
            worker_count = config.worker_count,
            idle_interval_ms = config.idle_interval_ms,
            "TaskPool started"
        );

        Ok(Self {
            shared,
            workers: Mutex::new(workers),
            worker_count: config.worker_count,
        })
    }

    /// Register a task. It becomes eligible on the next booking pass for
    /// which its readiness predicate holds.
    ///
    /// Adding to a stopped pool is accepted but the task never runs. Adding
    /// a task that is already registered is ignored, so a task never holds
    /// more than one slot.
    pub fn add(&self, task: Task) {
        if !self.is_running() {
            debug!(task = task.name(), "Task added to a stopped pool");
        }
        let inserted = self.shared.registry.lock().insert(task.clone());
        let Some(slot_id) = inserted else {
            warn!(task = task.name(), "Task already registered, ignoring duplicate add");
            return;
        };
        debug!(
            slot_id = %slot_id,
            task = task.name(),
            kind = ?task.kind(),
            "Task added"
        );
    }

    /// Remove a task.
    ///
    /// An idle task is removed and its `on_stopped` hook runs on the calling
    /// thread before this returns. A task that is executing is marked, and
    /// its worker removes it and runs `on_stopped` once the execution ends;
    /// listen to `on_stopped` to know when removal took effect. Unknown
    /// tasks are ignored.
    pub fn remove_task(&self, task: &Task) {
        let removal = self.shared.registry.lock().remove_task(task);
        match removal {
            Removal::NotFound => {
                debug!(task = task.name(), "Remove requested for unknown task");
            }
            Removal::Removed(task) => {
                self.shared.counters.stopped_tasks.fetch_add(1, Ordering::Relaxed);
                debug!(task = task.name(), "Task removed");
                task.on_stopped();
            }
            Removal::Deferred => {
                debug!(task = task.name(), "Task is executing, removal deferred");
            }
        }
    }

    /// Ask the workers to exit. In-flight executions run to completion; no
    /// worker starts a new booking attempt after observing the flag.
    pub fn stop(&self) {
        if self.shared.signal_stop() {
            info!("Stopping TaskPool");
        }
    }

    /// Whether `stop` has not been called yet.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// Number of registered tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.registry.lock().len()
    }

    /// Whether no task is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shared.registry.lock().is_empty()
    }

    /// Whether `task` is registered, including a task pending removal.
    #[must_use]
    pub fn contains(&self, task: &Task) -> bool {
        self.shared.registry.lock().contains(task)
    }

    /// Number of worker threads.
    #[must_use]
    pub const fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Current pool statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let (registered, booked) = {
            let registry = self.shared.registry.lock();
            (registry.len(), registry.booked_count())
        };
        self.shared
            .counters
            .snapshot(self.worker_count, registered, booked)
    }

    /// Stop the pool and join its workers.
    ///
    /// Each worker gets one idle interval plus a grace period to finish its
    /// current execution; workers that take longer are detached.
    pub fn shutdown(&self) {
        self.stop();

        let timeout = self.shared.idle_interval + SHUTDOWN_GRACE;
        let mut workers = self.workers.lock();
        let worker_count = workers.len();

        for (idx, worker) in workers.drain(..).enumerate() {
            let (tx, rx) = crossbeam_channel::bounded(1);
            thread::spawn(move || {
                let _ = tx.send(worker.join().is_ok());
            });

            match rx.recv_timeout(timeout) {
                Ok(true) => debug!(worker_id = idx, "Worker joined"),
                Ok(false) => warn!(worker_id = idx, "Worker panicked"),
                Err(_) => {
                    warn!(worker_id = idx, "Worker did not exit within timeout, detaching");
                }
            }
        }

        info!(worker_count = worker_count, "TaskPool shut down");
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        // Signal only; joining here could block on a long task.
        if self.shared.signal_stop() {
            debug!("TaskPool dropped without explicit shutdown, workers detached");
        }
    }
}

fn spawn_worker(
    worker_id: usize,
    shared: Arc<PoolShared>,
    config: &TaskPoolConfig,
) -> Result<JoinHandle<()>, PoolError> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(PoolError::Runtime)?;

    thread::Builder::new()
        .name(format!("{}-{worker_id}", config.thread_name_prefix))
        .stack_size(config.thread_stack_size)
        .spawn(move || worker_loop(worker_id, &shared, &rt))
        .map_err(PoolError::WorkerSpawn)
}

fn worker_loop(worker_id: usize, shared: &PoolShared, rt: &Runtime) {
    debug!(worker_id = worker_id, "Worker thread started");

    while shared.is_running() {
        // Task bodies are already guarded; this catches panics from
        // readiness predicates and hooks so the worker survives them.
        let attempt = AssertUnwindSafe(|| shared.try_execute_any(worker_id, rt));
        if let Err(payload) = panic::catch_unwind(attempt) {
            let msg = super::error::TaskError::from_panic(payload.as_ref());
            error!(worker_id = worker_id, error = %msg, "Scheduling attempt panicked");
        }
        shared.idle();
    }

    debug!(worker_id = worker_id, "Worker thread exiting");
}
