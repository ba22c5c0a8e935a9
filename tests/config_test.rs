//! Tests for configuration parsing and validation

use prometheus_task_pool::config::TaskPoolConfig;
use prometheus_task_pool::core::{PoolError, TaskPool};
use std::time::Duration;

#[test]
fn test_default_config_is_valid() {
    let cfg = TaskPoolConfig::new();
    assert!(cfg.validate().is_ok());
    assert!(cfg.worker_count >= 1);
    assert_eq!(cfg.idle_interval(), Duration::from_secs(1));
}

#[test]
fn test_fluent_setters() {
    let cfg = TaskPoolConfig::new()
        .with_worker_count(3)
        .with_idle_interval(Duration::from_millis(50))
        .with_thread_stack_size(512 * 1024)
        .with_thread_name_prefix("indexer");
    assert_eq!(cfg.worker_count, 3);
    assert_eq!(cfg.idle_interval_ms, 50);
    assert_eq!(cfg.thread_stack_size, 512 * 1024);
    assert_eq!(cfg.thread_name_prefix, "indexer");
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_invalid_values() {
    assert!(TaskPoolConfig::new().with_worker_count(0).validate().is_err());
    assert!(TaskPoolConfig::new()
        .with_idle_interval(Duration::ZERO)
        .validate()
        .is_err());
    assert!(TaskPoolConfig::new()
        .with_thread_stack_size(1024)
        .validate()
        .is_err());
    assert!(TaskPoolConfig::new()
        .with_thread_name_prefix("")
        .validate()
        .is_err());
}

#[test]
fn test_from_json_fills_defaults() {
    let cfg = TaskPoolConfig::from_json_str(r#"{ "worker_count": 2, "idle_interval_ms": 20 }"#)
        .expect("valid config");
    assert_eq!(cfg.worker_count, 2);
    assert_eq!(cfg.idle_interval(), Duration::from_millis(20));
    assert_eq!(cfg.thread_name_prefix, "task-pool");
}

#[test]
fn test_from_json_rejects_invalid() {
    let err = TaskPoolConfig::from_json_str(r#"{ "worker_count": 0 }"#).unwrap_err();
    assert_eq!(err, "worker_count must be greater than 0");

    let err = TaskPoolConfig::from_json_str("not json").unwrap_err();
    assert!(err.starts_with("parse error"));
}

#[test]
fn test_pool_from_config() {
    let cfg = TaskPoolConfig::new()
        .with_worker_count(2)
        .with_idle_interval(Duration::from_millis(10))
        .with_thread_name_prefix("cfg-test");
    let pool = TaskPool::with_config(cfg).expect("pool starts");
    assert_eq!(pool.worker_count(), 2);
    assert!(pool.is_empty());
    pool.shutdown();
}

#[test]
fn test_pool_rejects_invalid_config() {
    let cfg = TaskPoolConfig::new().with_thread_name_prefix("");
    assert!(matches!(
        TaskPool::with_config(cfg),
        Err(PoolError::InvalidConfig(_))
    ));
}
