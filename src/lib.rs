//! # Prometheus Task Pool
//!
//! A lightweight in-process task scheduler: a fixed set of worker threads
//! repeatedly picks ready tasks from a shared registry and runs them, one
//! execution per task at a time.
//!
//! ## Key Features
//!
//! - **Round-robin booking**: workers share one cursor over the registry, so
//!   every ready task gets its turn before any task runs twice
//! - **Readiness gating**: a task runs only while its `can_be_executed`
//!   predicate holds; no re-adding needed when it flips
//! - **Two execution variants**: blocking bodies run on the worker thread,
//!   suspending bodies are awaited on the worker's own tokio runtime
//! - **Safe removal**: `remove_task` works even while the task is executing;
//!   `on_stopped` fires once removal has actually happened
//! - **Failure as state**: errors and panics in task bodies are recorded on
//!   the task, which is dropped and reported to a `TaskErrorHandler`
//! - **Cooperative stop**: `stop` never interrupts a running task
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use prometheus_task_pool::core::{TaskFn, TaskPool};
//!
//! let pool = TaskPool::builder()
//!     .worker_count(2)
//!     .idle_interval(Duration::from_millis(250))
//!     .build()?;
//!
//! let task = TaskFn::new(|| true, || {
//!     println!("tick");
//!     Ok(())
//! })
//! .with_stop_hook(|| println!("removed"))
//! .into_task();
//!
//! pool.add(task.clone());
//! std::thread::sleep(Duration::from_secs(1));
//! pool.remove_task(&task);
//! pool.shutdown();
//! # Ok::<(), prometheus_task_pool::core::PoolError>(())
//! ```
//!
//! For complete scenarios, see `tests/task_pool_test.rs`.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Tasks, slots and the scheduling pool.
pub mod core;
/// Configuration models for the pool.
pub mod config;
/// Builders to construct pools from configuration.
pub mod builders;
/// Shared utilities.
pub mod util;

pub use crate::config::TaskPoolConfig;
pub use crate::core::{
    AsyncTaskFn, BlockingTask, PoolError, SuspendingTask, Task, TaskBase, TaskError, TaskFn,
    TaskPool, TaskResult, TaskState,
};
