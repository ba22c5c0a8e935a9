//! Task abstraction: readiness gating, one-shot failure recording, and the
//! two execution variants the pool knows how to drive.
//!
//! A task is created by the caller and handed to a
//! [`TaskPool`](crate::core::TaskPool) wrapped in the [`Task`] enum. The
//! caller may keep its own `Arc` to the task and inspect
//! [`TaskState::exception`] after the pool has dropped it.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use prometheus_task_pool::core::{BlockingTask, Task, TaskBase, TaskResult, TaskState};
//!
//! struct Heartbeat {
//!     state: TaskState,
//! }
//!
//! impl TaskBase for Heartbeat {
//!     fn state(&self) -> &TaskState {
//!         &self.state
//!     }
//!
//!     fn can_be_executed(&self) -> bool {
//!         true
//!     }
//! }
//!
//! impl BlockingTask for Heartbeat {
//!     fn main(&self) -> TaskResult {
//!         Ok(())
//!     }
//! }
//!
//! let task = Task::blocking(Arc::new(Heartbeat { state: TaskState::new() }));
//! assert!(task.exception().is_none());
//! ```

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use tracing::debug;

use super::error::{TaskError, TaskResult};

/// Observable fields of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskField {
    /// The recorded failure.
    Exception,
    /// The message derived from the recorded failure.
    ErrorMessage,
}

impl TaskField {
    /// Field name as published to observers.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Exception => "exception",
            Self::ErrorMessage => "error_message",
        }
    }
}

impl fmt::Display for TaskField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle returned by [`TaskState::on_change`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type ChangeCallback = Arc<dyn Fn(TaskField) + Send + Sync>;

struct Subscriber {
    id: SubscriptionId,
    field: TaskField,
    callback: ChangeCallback,
}

/// Per-task failure slot with change notification.
///
/// The exception is set at most once and never cleared.
#[derive(Default)]
pub struct TaskState {
    exception: Mutex<Option<Arc<TaskError>>>,
    subscribers: Mutex<Vec<Subscriber>>,
    next_subscription: AtomicU64,
}

impl TaskState {
    /// Create an empty state with no failure recorded.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The recorded failure, if any.
    #[must_use]
    pub fn exception(&self) -> Option<Arc<TaskError>> {
        self.exception.lock().clone()
    }

    /// Message of the recorded failure; `None` iff no failure was recorded.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        self.exception.lock().as_ref().map(ToString::to_string)
    }

    /// Whether a failure has been recorded.
    #[must_use]
    pub fn has_failed(&self) -> bool {
        self.exception.lock().is_some()
    }

    /// Record a failure if none has been recorded yet.
    ///
    /// Publishes [`TaskField::Exception`] then [`TaskField::ErrorMessage`]
    /// when the failure is stored. Returns `false` and leaves the first
    /// failure in place otherwise.
    pub fn record_failure(&self, error: TaskError) -> bool {
        {
            let mut slot = self.exception.lock();
            if slot.is_some() {
                debug!(error = %error, "Task already failed, ignoring later failure");
                return false;
            }
            *slot = Some(Arc::new(error));
        }
        self.publish(TaskField::Exception);
        self.publish(TaskField::ErrorMessage);
        true
    }

    /// Register `callback` to run whenever `field` changes.
    pub fn on_change<F>(&self, field: TaskField, callback: F) -> SubscriptionId
    where
        F: Fn(TaskField) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.subscribers.lock().push(Subscriber {
            id,
            field,
            callback: Arc::new(callback),
        });
        id
    }

    /// Remove a subscription. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        subscribers.len() != before
    }

    fn publish(&self, field: TaskField) {
        // Callbacks may read the state or subscribe again; run them unlocked.
        let callbacks: Vec<ChangeCallback> = self
            .subscribers
            .lock()
            .iter()
            .filter(|s| s.field == field)
            .map(|s| Arc::clone(&s.callback))
            .collect();
        for callback in callbacks {
            callback(field);
        }
    }
}

impl fmt::Debug for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskState")
            .field("exception", &self.exception.lock())
            .field("subscribers", &self.subscribers.lock().len())
            .finish()
    }
}

/// Capabilities shared by both task variants.
pub trait TaskBase: Send + Sync + 'static {
    /// The task's failure slot.
    fn state(&self) -> &TaskState;

    /// Readiness predicate, evaluated by the pool on every booking attempt
    /// while it holds its registry lock. Keep it cheap and side-effect free.
    fn can_be_executed(&self) -> bool;

    /// Called exactly once after the pool has removed the task through
    /// [`TaskPool::remove_task`](crate::core::TaskPool::remove_task).
    fn on_stopped(&self) {}

    /// Human-readable name used in logs.
    fn name(&self) -> &str {
        "task"
    }
}

/// Task whose body runs to completion on the worker thread.
pub trait BlockingTask: TaskBase {
    /// Task body.
    ///
    /// # Errors
    ///
    /// Any error is recorded on the task's state and the task is dropped
    /// from the pool.
    fn main(&self) -> TaskResult;
}

/// Task whose body may suspend at `.await` points.
///
/// The worker drives the future on its own single-threaded runtime, so
/// tokio timers and I/O are available inside `main`.
#[async_trait]
pub trait SuspendingTask: TaskBase {
    /// Task body.
    ///
    /// # Errors
    ///
    /// Any error is recorded on the task's state and the task is dropped
    /// from the pool.
    async fn main(&self) -> TaskResult;
}

/// Execution variant of a [`Task`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// Runs synchronously on the worker.
    Blocking,
    /// Awaited on the worker's runtime.
    Suspending,
}

/// A task handed to the pool, tagged with its execution variant.
///
/// Cloning is cheap and yields a handle to the same task.
#[derive(Clone)]
pub enum Task {
    /// Blocking variant.
    Blocking(Arc<dyn BlockingTask>),
    /// Suspending variant.
    Suspending(Arc<dyn SuspendingTask>),
}

impl Task {
    /// Wrap a blocking task.
    pub fn blocking<T: BlockingTask>(task: Arc<T>) -> Self {
        Self::Blocking(task)
    }

    /// Wrap a suspending task.
    pub fn suspending<T: SuspendingTask>(task: Arc<T>) -> Self {
        Self::Suspending(task)
    }

    /// The execution variant.
    #[must_use]
    pub const fn kind(&self) -> TaskKind {
        match self {
            Self::Blocking(_) => TaskKind::Blocking,
            Self::Suspending(_) => TaskKind::Suspending,
        }
    }

    /// The task's failure slot.
    #[must_use]
    pub fn state(&self) -> &TaskState {
        match self {
            Self::Blocking(t) => t.state(),
            Self::Suspending(t) => t.state(),
        }
    }

    /// See [`TaskBase::can_be_executed`].
    #[must_use]
    pub fn can_be_executed(&self) -> bool {
        match self {
            Self::Blocking(t) => t.can_be_executed(),
            Self::Suspending(t) => t.can_be_executed(),
        }
    }

    /// See [`TaskBase::on_stopped`].
    pub fn on_stopped(&self) {
        match self {
            Self::Blocking(t) => t.on_stopped(),
            Self::Suspending(t) => t.on_stopped(),
        }
    }

    /// See [`TaskBase::name`].
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Blocking(t) => t.name(),
            Self::Suspending(t) => t.name(),
        }
    }

    /// The recorded failure, if any.
    #[must_use]
    pub fn exception(&self) -> Option<Arc<TaskError>> {
        self.state().exception()
    }

    /// Message of the recorded failure, if any.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        self.state().error_message()
    }

    /// Whether both handles point at the same task object.
    #[must_use]
    pub fn same_task(&self, other: &Self) -> bool {
        std::ptr::eq(self.data_ptr(), other.data_ptr())
    }

    fn data_ptr(&self) -> *const () {
        match self {
            Self::Blocking(t) => Arc::as_ptr(t).cast::<()>(),
            Self::Suspending(t) => Arc::as_ptr(t).cast::<()>(),
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name())
            .field("kind", &self.kind())
            .field("failed", &self.state().has_failed())
            .finish()
    }
}

/// Run a blocking task, converting errors and panics into recorded failures.
pub fn run_blocking(task: &dyn BlockingTask) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| task.main()));
    record_outcome(task.state(), outcome);
}

/// Run a suspending task, converting errors and panics into recorded failures.
pub async fn run_suspending(task: &dyn SuspendingTask) {
    let outcome = AssertUnwindSafe(task.main()).catch_unwind().await;
    record_outcome(task.state(), outcome);
}

fn record_outcome(state: &TaskState, outcome: std::thread::Result<TaskResult>) {
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            state.record_failure(TaskError::Failed(e));
        }
        Err(payload) => {
            state.record_failure(TaskError::from_panic(payload.as_ref()));
        }
    }
}
