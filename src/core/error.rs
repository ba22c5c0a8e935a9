//! Error types for task and pool operations.

use thiserror::Error;

/// Failure recorded on a task when its body returns an error or panics.
///
/// A `TaskError` never propagates out of a worker; it is stored on the
/// task's [`TaskState`](crate::core::TaskState) and the task is dropped
/// from the pool.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The task body returned an error.
    #[error("{0}")]
    Failed(anyhow::Error),
    /// The task body panicked; holds the panic message when it was a string.
    #[error("task panicked: {0}")]
    Panicked(String),
}

impl TaskError {
    /// Build a `Panicked` error from a `catch_unwind` payload.
    pub(crate) fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let msg = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self::Panicked(msg)
    }
}

/// Errors produced while constructing or running a pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A worker thread could not be spawned.
    #[error("failed to spawn worker thread: {0}")]
    WorkerSpawn(#[source] std::io::Error),
    /// A worker's runtime for suspending tasks could not be built.
    #[error("failed to build worker runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

/// Result type returned by task bodies.
pub type TaskResult = Result<(), anyhow::Error>;
