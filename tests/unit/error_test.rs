//! Tests for error types

use prometheus_group_runner::core::{SchedulerError, WorkerState};

#[test]
fn test_invalid_config_error() {
    let err = SchedulerError::InvalidConfig("max_concurrency must be greater than 0".to_string());
    assert_eq!(
        format!("{err}"),
        "invalid configuration: max_concurrency must be greater than 0"
    );
}

#[test]
fn test_capacity_violation_error() {
    let err = SchedulerError::CapacityInvariantViolation { active: 0, max: 4 };
    assert_eq!(format!("{err}"), "capacity invariant violated: active=0, max=4");
}

#[test]
fn test_join_timeout_error() {
    let err = SchedulerError::JoinTimeout { pending: 3 };
    assert_eq!(format!("{err}"), "join timed out with 3 worker(s) still running");
}

#[test]
fn test_worker_spawn_error() {
    let err = SchedulerError::WorkerSpawn("resource temporarily unavailable".to_string());
    assert_eq!(
        format!("{err}"),
        "failed to spawn worker thread: resource temporarily unavailable"
    );
}

#[test]
fn test_invalid_transition_error() {
    let err = SchedulerError::InvalidWorkerTransition {
        worker: 7,
        from: WorkerState::Completed,
        to: WorkerState::Running,
    };
    assert_eq!(format!("{err}"), "worker 7 cannot move from Completed to Running");
}

#[test]
fn test_error_converts_into_anyhow() {
    let err: anyhow::Error = SchedulerError::Internal("join task failed".to_string()).into();
    assert!(err.downcast_ref::<SchedulerError>().is_some());
    assert_eq!(err.to_string(), "internal error: join task failed");
}
