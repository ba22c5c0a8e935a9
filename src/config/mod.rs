//! Configuration models for the task pool.

pub mod pool;

pub use pool::{default_worker_count, TaskPoolConfig};
