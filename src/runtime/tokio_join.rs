//! Await the join barrier from a tokio task.

use crate::core::{GroupScheduler, SchedulerError};

/// Wait for every worker of `scheduler` without blocking the async runtime.
///
/// The condvar wait is moved onto tokio's blocking pool with
/// `spawn_blocking`, so the calling task yields while workers drain.
///
/// # Errors
///
/// Returns `SchedulerError::JoinTimeout` under the same conditions as
/// [`GroupScheduler::wait_for_completion`], or `SchedulerError::Internal` if
/// the blocking task itself failed.
pub async fn join_async(scheduler: &GroupScheduler) -> Result<(), SchedulerError> {
    let joiner = scheduler.joiner();
    tokio::task::spawn_blocking(move || joiner.wait())
        .await
        .map_err(|e| SchedulerError::Internal(format!("join task failed: {e}")))?
}
