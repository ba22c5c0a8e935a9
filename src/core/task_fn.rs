//! Closure-backed tasks.
//!
//! [`TaskFn`] and [`AsyncTaskFn`] let callers build a task from a readiness
//! closure and a body closure without declaring a type.
//!
//! ```rust
//! use std::sync::atomic::{AtomicBool, Ordering};
//! use std::sync::Arc;
//! use prometheus_task_pool::core::TaskFn;
//!
//! let ready = Arc::new(AtomicBool::new(false));
//! let gate = Arc::clone(&ready);
//! let task = TaskFn::new(move || gate.load(Ordering::Acquire), || Ok(()))
//!     .with_name("sync-inbox")
//!     .into_task();
//!
//! assert!(!task.can_be_executed());
//! ready.store(true, Ordering::Release);
//! assert!(task.can_be_executed());
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use super::error::TaskResult;
use super::task::{BlockingTask, SuspendingTask, Task, TaskBase, TaskState};

type ReadyFn = Box<dyn Fn() -> bool + Send + Sync>;
type StoppedFn = Box<dyn Fn() + Send + Sync>;
type BodyFuture = Pin<Box<dyn Future<Output = TaskResult> + Send>>;

/// Blocking task built from closures.
pub struct TaskFn {
    name: String,
    state: TaskState,
    ready: ReadyFn,
    body: Box<dyn Fn() -> TaskResult + Send + Sync>,
    stopped: Option<StoppedFn>,
}

impl TaskFn {
    /// Create a task from a readiness predicate and a body.
    pub fn new<R, B>(ready: R, body: B) -> Self
    where
        R: Fn() -> bool + Send + Sync + 'static,
        B: Fn() -> TaskResult + Send + Sync + 'static,
    {
        Self {
            name: "task-fn".to_string(),
            state: TaskState::new(),
            ready: Box::new(ready),
            body: Box::new(body),
            stopped: None,
        }
    }

    /// Set the name used in logs.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Run `hook` when the pool removes this task.
    #[must_use]
    pub fn with_stop_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.stopped = Some(Box::new(hook));
        self
    }

    /// Wrap into a shareable [`Task`].
    #[must_use]
    pub fn into_task(self) -> Task {
        Task::blocking(Arc::new(self))
    }
}

impl TaskBase for TaskFn {
    fn state(&self) -> &TaskState {
        &self.state
    }

    fn can_be_executed(&self) -> bool {
        (self.ready)()
    }

    fn on_stopped(&self) {
        if let Some(hook) = &self.stopped {
            hook();
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl BlockingTask for TaskFn {
    fn main(&self) -> TaskResult {
        (self.body)()
    }
}

/// Suspending task built from closures. The body returns a fresh future on
/// every execution.
pub struct AsyncTaskFn {
    name: String,
    state: TaskState,
    ready: ReadyFn,
    body: Box<dyn Fn() -> BodyFuture + Send + Sync>,
    stopped: Option<StoppedFn>,
}

impl AsyncTaskFn {
    /// Create a task from a readiness predicate and a future factory.
    pub fn new<R, B, Fut>(ready: R, body: B) -> Self
    where
        R: Fn() -> bool + Send + Sync + 'static,
        B: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TaskResult> + Send + 'static,
    {
        Self {
            name: "async-task-fn".to_string(),
            state: TaskState::new(),
            ready: Box::new(ready),
            body: Box::new(move || Box::pin(body()) as BodyFuture),
            stopped: None,
        }
    }

    /// Set the name used in logs.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Run `hook` when the pool removes this task.
    #[must_use]
    pub fn with_stop_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.stopped = Some(Box::new(hook));
        self
    }

    /// Wrap into a shareable [`Task`].
    #[must_use]
    pub fn into_task(self) -> Task {
        Task::suspending(Arc::new(self))
    }
}

impl TaskBase for AsyncTaskFn {
    fn state(&self) -> &TaskState {
        &self.state
    }

    fn can_be_executed(&self) -> bool {
        (self.ready)()
    }

    fn on_stopped(&self) {
        if let Some(hook) = &self.stopped {
            hook();
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl SuspendingTask for AsyncTaskFn {
    async fn main(&self) -> TaskResult {
        (self.body)().await
    }
}
