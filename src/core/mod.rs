//! Tasks, slots and the scheduling pool.

pub mod error;
pub mod task;
pub mod task_fn;
pub(crate) mod slot;
pub mod task_pool;

pub use error::{PoolError, TaskError, TaskResult};
pub use task::{
    run_blocking, run_suspending, BlockingTask, SubscriptionId, SuspendingTask, Task, TaskBase,
    TaskField, TaskKind, TaskState,
};
pub use task_fn::{AsyncTaskFn, TaskFn};
pub use task_pool::{LogErrorHandler, NoopErrorHandler, PoolStats, TaskErrorHandler, TaskPool};
