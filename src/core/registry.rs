//! Live-worker registry and per-worker lifecycle.
//!
//! Every spawned worker is entered into the live set before its thread starts
//! and removes itself when it finishes. The join barrier waits on a condvar
//! until the live set is empty, then joins the stored handles exactly once.
//! Because emptiness is checked under the same lock that deregistration takes,
//! a worker finishing before anyone waits cannot cause a lost wakeup.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::SchedulerError;

/// Identifier assigned to each spawned worker, unique per scheduler.
pub type WorkerId = u64;

/// Lifecycle of a worker thread.
///
/// `Spawned → Running → (Completed | Faulted) → Deregistered`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Registered and handed to the OS, not yet executing.
    Spawned,
    /// Executing its group tree.
    Running,
    /// Group tree finished without a fault.
    Completed,
    /// A fault was caught while executing.
    Faulted,
    /// Removed from the live set. Terminal.
    Deregistered,
}

impl WorkerState {
    /// Whether moving from `self` to `next` is a legal lifecycle step.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Spawned, Self::Running)
                | (Self::Running, Self::Completed | Self::Faulted)
                | (Self::Completed | Self::Faulted, Self::Deregistered)
        )
    }

    /// `Completed` or `Faulted`.
    #[must_use]
    pub const fn is_finished(self) -> bool {
        matches!(self, Self::Completed | Self::Faulted)
    }
}

/// Live worker set plus the join handles awaiting the barrier.
#[derive(Debug, Default)]
pub(crate) struct WorkerRegistry {
    live: Mutex<HashMap<WorkerId, WorkerState>>,
    drained: Condvar,
    handles: Mutex<Vec<(WorkerId, JoinHandle<()>)>>,
    next_id: AtomicU64,
}

impl WorkerRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Enter a new worker into the live set in the `Spawned` state.
    pub(crate) fn register(&self) -> WorkerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.live.lock().insert(id, WorkerState::Spawned);
        id
    }

    /// Store the thread handle so the barrier can join it.
    pub(crate) fn attach(&self, id: WorkerId, handle: JoinHandle<()>) {
        self.handles.lock().push((id, handle));
    }

    /// Move a live worker to `to`, rejecting illegal steps.
    pub(crate) fn transition(&self, id: WorkerId, to: WorkerState) -> Result<(), SchedulerError> {
        let mut live = self.live.lock();
        let from = live.get(&id).copied().unwrap_or(WorkerState::Deregistered);
        if to == WorkerState::Deregistered || !from.can_transition_to(to) {
            return Err(SchedulerError::InvalidWorkerTransition {
                worker: id,
                from,
                to,
            });
        }
        live.insert(id, to);
        Ok(())
    }

    /// Remove a finished worker from the live set and wake the barrier if the
    /// set became empty.
    pub(crate) fn deregister(&self, id: WorkerId) -> Result<(), SchedulerError> {
        let mut live = self.live.lock();
        let from = live.get(&id).copied().unwrap_or(WorkerState::Deregistered);
        if !from.can_transition_to(WorkerState::Deregistered) {
            return Err(SchedulerError::InvalidWorkerTransition {
                worker: id,
                from,
                to: WorkerState::Deregistered,
            });
        }
        live.remove(&id);
        let remaining = live.len();
        drop(live);
        debug!(worker_id = id, remaining, "worker deregistered");
        if remaining == 0 {
            self.drained.notify_all();
        }
        Ok(())
    }

    /// Drop a worker whose thread never started.
    pub(crate) fn discard(&self, id: WorkerId) {
        let mut live = self.live.lock();
        live.remove(&id);
        if live.is_empty() {
            self.drained.notify_all();
        }
    }

    pub(crate) fn state(&self, id: WorkerId) -> Option<WorkerState> {
        self.live.lock().get(&id).copied()
    }

    pub(crate) fn live_count(&self) -> usize {
        self.live.lock().len()
    }

    /// Block until the live set is empty. On timeout returns the number of
    /// workers still live.
    pub(crate) fn wait_until_drained(&self, timeout: Option<Duration>) -> Result<(), usize> {
        let mut live = self.live.lock();
        match timeout {
            None => {
                self.drained.wait_while(&mut live, |l| !l.is_empty());
                Ok(())
            }
            Some(timeout) => {
                let deadline = Instant::now() + timeout;
                while !live.is_empty() {
                    if self.drained.wait_until(&mut live, deadline).timed_out() {
                        return if live.is_empty() { Ok(()) } else { Err(live.len()) };
                    }
                }
                Ok(())
            }
        }
    }

    /// Hand every stored join handle to the caller, leaving none behind.
    pub(crate) fn take_handles(&self) -> Vec<(WorkerId, JoinHandle<()>)> {
        std::mem::take(&mut *self.handles.lock())
    }
}
