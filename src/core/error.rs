//! Error types for scheduler operations.

use thiserror::Error;

use super::registry::{WorkerId, WorkerState};

/// Errors produced by scheduler components.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Configuration failed validation; nothing was dispatched.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Capacity accounting was observed in an impossible state.
    #[error("capacity invariant violated: active={active}, max={max}")]
    CapacityInvariantViolation {
        /// Active slot count observed at the checkpoint.
        active: usize,
        /// Configured maximum concurrency.
        max: usize,
    },
    /// The join barrier gave up before every worker finished.
    #[error("join timed out with {pending} worker(s) still running")]
    JoinTimeout {
        /// Workers still in the live set when the wait expired.
        pending: usize,
    },
    /// The operating system refused to start a worker thread.
    #[error("failed to spawn worker thread: {0}")]
    WorkerSpawn(String),
    /// A worker attempted a state change its lifecycle does not allow.
    #[error("worker {worker} cannot move from {from:?} to {to:?}")]
    InvalidWorkerTransition {
        /// Worker whose transition was rejected.
        worker: WorkerId,
        /// State the worker was in.
        from: WorkerState,
        /// Requested state.
        to: WorkerState,
    },
    /// Failure in an adapter around the scheduler (runtime join error, etc.).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
