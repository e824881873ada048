//! Worker thread body and recursive execution of a group tree.
//!
//! A worker owns one capacity slot for its whole lifetime. Child groups try
//! for an additional slot without blocking: with a free slot the child runs on
//! a scoped thread holding its own permit, otherwise it runs inline on the
//! parent's thread under the parent's slot. Nothing on a worker thread ever
//! waits for a slot, so a worker cannot deadlock on capacity it holds itself.
//!
//! A group's own outcome counts toward fail-fast as soon as its logic
//! returns, before its children run. The reporter still receives the parent
//! after its children.

use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use tracing::{debug, error, warn};

use super::RunCounters;
use crate::core::capacity::{CapacityPermit, CapacityState};
use crate::core::group::{GroupContext, GroupInfo, Outcome, RunnableGroup};
use crate::core::registry::{WorkerId, WorkerRegistry, WorkerState};
use crate::core::reporter::Reporter;

/// Everything a worker needs, shared by reference with nested children.
#[derive(Clone)]
pub(crate) struct ExecutionEnv {
    pub capacity: Arc<CapacityState>,
    pub reporter: Arc<dyn Reporter>,
    pub counters: Arc<RunCounters>,
    pub thread_name_prefix: Arc<str>,
    pub stack_size: Option<usize>,
    pub fail_fast: bool,
}

impl ExecutionEnv {
    pub(crate) fn thread_builder(&self, name: String) -> thread::Builder {
        let builder = thread::Builder::new().name(name);
        match self.stack_size {
            Some(size) => builder.stack_size(size),
            None => builder,
        }
    }

    /// Reporter abort, or any failure so far when `fail_fast` is configured.
    pub(crate) fn abort_requested(&self) -> bool {
        self.reporter.abort_requested() || (self.fail_fast && self.counters.has_failures())
    }
}

/// Run a thread-spawning closure. A panic raised while spawning (an unusable
/// thread name, for one) comes back as an error instead of unwinding.
pub(crate) fn spawn_guarded<T>(
    spawn: impl FnOnce() -> io::Result<T>,
) -> io::Result<T> {
    panic::catch_unwind(AssertUnwindSafe(spawn))
        .unwrap_or_else(|payload| Err(io::Error::other(panic_message(payload.as_ref()))))
}

/// Releases the slot and deregisters the worker however the body exits.
struct WorkerGuard {
    id: WorkerId,
    registry: Arc<WorkerRegistry>,
    permit: Option<CapacityPermit>,
    finished: bool,
}

impl WorkerGuard {
    fn finish(&mut self, state: WorkerState) {
        if let Err(e) = self.registry.transition(self.id, state) {
            error!(worker_id = self.id, error = %e, "worker state update rejected");
        }
        self.finished = true;
    }
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        if !self.finished {
            error!(worker_id = self.id, "worker unwound outside the group boundary");
            if let Err(e) = self.registry.transition(self.id, WorkerState::Faulted) {
                error!(worker_id = self.id, error = %e, "worker state update rejected");
            }
        }
        // Slot goes back before the live set can be observed empty.
        drop(self.permit.take());
        if let Err(e) = self.registry.deregister(self.id) {
            error!(worker_id = self.id, error = %e, "worker deregistration failed");
        }
    }
}

/// Body of a top-level worker thread.
pub(crate) fn run_worker(
    id: WorkerId,
    permit: CapacityPermit,
    registry: Arc<WorkerRegistry>,
    env: &ExecutionEnv,
    group: &dyn RunnableGroup,
) {
    let mut guard = WorkerGuard {
        id,
        registry,
        permit: Some(permit),
        finished: false,
    };
    if let Err(e) = guard.registry.transition(id, WorkerState::Running) {
        error!(worker_id = id, error = %e, "worker state update rejected");
    }
    debug!(worker_id = id, group_id = group.id(), "worker started");

    let faults = execute_tree(env, group, None, 0);

    let state = if faults == 0 {
        WorkerState::Completed
    } else {
        WorkerState::Faulted
    };
    debug!(worker_id = id, faults, state = ?state, "worker finished");
    guard.finish(state);
}

/// Run `group` and then its children. Returns the number of faults caught in
/// the tree.
pub(crate) fn execute_tree(
    env: &ExecutionEnv,
    group: &dyn RunnableGroup,
    parent: Option<&str>,
    depth: usize,
) -> usize {
    let info = GroupInfo {
        id: group.id().to_owned(),
        parent: parent.map(str::to_owned),
        depth,
        worker: thread::current().name().map(str::to_owned),
    };
    env.reporter.group_started(&info);

    let ctx = GroupContext::new(&info, env.reporter.as_ref(), &env.capacity);
    let outcome = match panic::catch_unwind(AssertUnwindSafe(|| group.run(&ctx))) {
        Ok(outcome) => outcome,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!(group_id = %info.id, %message, "group faulted");
            Outcome::Errored { message }
        }
    };
    let own_fault = usize::from(outcome.is_fault());
    env.counters.record(&outcome);

    let child_faults = run_children(env, group.children(), &info.id, depth + 1);

    env.reporter.group_finished(&info, &outcome);
    own_fault + child_faults
}

fn run_children(
    env: &ExecutionEnv,
    children: &[Arc<dyn RunnableGroup>],
    parent: &str,
    depth: usize,
) -> usize {
    if children.is_empty() {
        return 0;
    }

    thread::scope(|scope| {
        let mut faults = 0;
        let mut handles = Vec::new();

        for (index, child) in children.iter().enumerate() {
            if env.abort_requested() {
                env.counters.note_skipped();
                debug!(group_id = child.id(), "abort requested, child skipped");
                continue;
            }

            let Some(permit) = env.capacity.try_permit() else {
                faults += execute_tree(env, child.as_ref(), Some(parent), depth);
                continue;
            };

            // Group ids are caller strings; keep them out of thread names.
            let name = format!("{}-d{depth}-{index}", env.thread_name_prefix);
            let spawned = spawn_guarded(|| {
                env.thread_builder(name).spawn_scoped(scope, move || {
                    let _permit = permit;
                    execute_tree(env, child.as_ref(), Some(parent), depth)
                })
            });
            match spawned {
                Ok(handle) => {
                    env.counters.note_nested_spawn();
                    handles.push(handle);
                }
                Err(e) => {
                    warn!(group_id = child.id(), error = %e, "nested spawn failed, running inline");
                    faults += execute_tree(env, child.as_ref(), Some(parent), depth);
                }
            }
        }

        for handle in handles {
            match handle.join() {
                Ok(child_faults) => faults += child_faults,
                Err(_) => {
                    error!(parent_id = parent, "nested worker panicked outside the group boundary");
                    faults += 1;
                }
            }
        }
        faults
    })
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
