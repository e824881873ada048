//! Tests for configuration validation

use prometheus_group_runner::config::{RunnerConfig, ENV_PREFIX};
use std::time::Duration;

#[test]
fn test_runner_config_validation() {
    let valid = RunnerConfig {
        max_concurrency: 8,
        fail_fast: true,
        join_timeout_ms: Some(30_000),
        thread_stack_size: Some(2 * 1024 * 1024),
        thread_name_prefix: "suite".to_string(),
        max_records: 500,
    };
    assert!(valid.validate().is_ok());
}

#[test]
fn test_runner_config_invalid_max_concurrency() {
    let invalid = RunnerConfig::new().with_max_concurrency(0);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_runner_config_invalid_join_timeout() {
    let invalid = RunnerConfig::new().with_join_timeout(Duration::ZERO);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_runner_config_invalid_stack_size() {
    let invalid = RunnerConfig::new().with_thread_stack_size(1024);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_runner_config_invalid_prefix_and_records() {
    assert!(RunnerConfig::new().with_thread_name_prefix("  ").validate().is_err());
    assert!(RunnerConfig::new().with_max_records(0).validate().is_err());
}

#[test]
fn test_runner_config_from_json() {
    let cfg = RunnerConfig::from_json_str(
        r#"{ "max_concurrency": 4, "fail_fast": true, "join_timeout_ms": 1500 }"#,
    )
    .unwrap();
    assert_eq!(cfg.max_concurrency, 4);
    assert!(cfg.fail_fast);
    assert_eq!(cfg.join_timeout(), Some(Duration::from_millis(1500)));
    assert_eq!(cfg.thread_name_prefix, "group-worker");
}

#[test]
fn test_runner_config_json_rejects_negative_and_unknown() {
    assert!(RunnerConfig::from_json_str(r#"{ "max_concurrency": -1 }"#).is_err());
    assert!(RunnerConfig::from_json_str(r#"{ "max_concurrency": 0 }"#).is_err());
    assert!(RunnerConfig::from_json_str(r#"{ "workers": 2 }"#).is_err());
}

#[test]
fn test_runner_config_from_lookup() {
    let cfg = RunnerConfig::from_lookup(|key: &str| match key.strip_prefix(ENV_PREFIX) {
        Some("MAX_CONCURRENCY") => Some("6".to_string()),
        Some("FAIL_FAST") => Some("yes".to_string()),
        _ => None,
    })
    .unwrap();
    assert_eq!(cfg.max_concurrency, 6);
    assert!(cfg.fail_fast);
}

#[test]
fn test_runner_config_lookup_rejects_garbage() {
    let err = RunnerConfig::from_lookup(|key: &str| {
        (key == format!("{ENV_PREFIX}MAX_CONCURRENCY")).then(|| "lots".to_string())
    })
    .unwrap_err();
    assert!(err.contains("MAX_CONCURRENCY"));
}

#[test]
fn test_available_parallelism_is_positive() {
    let cfg = RunnerConfig::new().with_available_parallelism();
    assert!(cfg.max_concurrency >= 1);
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_runner_config_rejects_nul_in_thread_prefix() {
    let invalid = RunnerConfig::new()
        .with_max_concurrency(2)
        .with_thread_name_prefix("worker\0pool");
    assert!(invalid.validate().unwrap_err().contains("NUL"));

    let err = prometheus_group_runner::core::GroupScheduler::new(invalid).err();
    assert!(matches!(
        err,
        Some(prometheus_group_runner::core::SchedulerError::InvalidConfig(_))
    ));
}
