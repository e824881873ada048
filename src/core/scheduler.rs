//! Bounded parallel dispatch of groups with a blocking join barrier.
//!
//! # Contract
//!
//! `dispatch` is called from a single coordinating thread, and every
//! `dispatch` call has returned before `wait_for_completion` is called.
//! The barrier then waits for every worker registered so far.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use prometheus_group_runner::config::RunnerConfig;
//! use prometheus_group_runner::core::{
//!     FnGroup, GroupScheduler, InMemoryReporter, Outcome, Reporter, RunnableGroup,
//! };
//!
//! let scheduler = GroupScheduler::new(RunnerConfig::new().with_max_concurrency(2)).unwrap();
//! let reporter = Arc::new(InMemoryReporter::new(100));
//!
//! for i in 0..4 {
//!     let group: Arc<dyn RunnableGroup> =
//!         Arc::new(FnGroup::new(format!("group-{i}"), |_| Outcome::Passed));
//!     scheduler.dispatch(group, Arc::clone(&reporter) as Arc<dyn Reporter>).unwrap();
//! }
//! scheduler.wait_for_completion().unwrap();
//!
//! assert_eq!(reporter.summary().passed, 4);
//! assert_eq!(scheduler.stats().capacity.active, 0);
//! ```

mod worker;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::capacity::{CapacitySnapshot, CapacityState};
use super::group::{Outcome, RunnableGroup};
use super::registry::{WorkerId, WorkerRegistry, WorkerState};
use super::reporter::Reporter;
use super::SchedulerError;
use crate::config::RunnerConfig;

use worker::ExecutionEnv;

/// What `dispatch` did with a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStatus {
    /// A worker thread was started for the group.
    Spawned(WorkerId),
    /// The group ran to completion on the calling thread.
    RanInline,
    /// The reporter requested an abort; the group was not run.
    Skipped,
}

/// Statistics about scheduler activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStats {
    /// Top-level `dispatch` calls.
    pub dispatched: u64,
    /// Top-level worker threads started.
    pub spawned_workers: u64,
    /// Nested child threads started.
    pub nested_workers: u64,
    /// Top-level groups run on the calling thread.
    pub inline_runs: u64,
    /// Groups (top-level or nested) skipped after an abort.
    pub skipped: u64,
    /// Groups whose own logic returned normally.
    pub groups_completed: u64,
    /// Groups whose own logic faulted.
    pub groups_faulted: u64,
    /// Groups whose own outcome was `Failed` or `Errored`.
    pub groups_failed: u64,
    /// Worker threads that panicked outside the group boundary.
    pub join_panics: u64,
    /// Workers still in the live set.
    pub live_workers: usize,
    /// Capacity usage.
    pub capacity: CapacitySnapshot,
}

/// Internal counters for scheduler statistics (thread-safe).
#[derive(Debug, Default)]
pub(crate) struct RunCounters {
    dispatched: AtomicU64,
    spawned_workers: AtomicU64,
    nested_workers: AtomicU64,
    inline_runs: AtomicU64,
    skipped: AtomicU64,
    groups_completed: AtomicU64,
    groups_faulted: AtomicU64,
    groups_failed: AtomicU64,
    join_panics: AtomicU64,
}

impl RunCounters {
    pub(crate) fn record(&self, outcome: &Outcome) {
        if outcome.is_fault() {
            self.groups_faulted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.groups_completed.fetch_add(1, Ordering::Relaxed);
        }
        if outcome.is_failure() {
            self.groups_failed.fetch_add(1, Ordering::Release);
        }
    }

    pub(crate) fn has_failures(&self) -> bool {
        self.groups_failed.load(Ordering::Acquire) > 0
    }

    pub(crate) fn note_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn note_nested_spawn(&self) {
        self.nested_workers.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self, live_workers: usize, capacity: CapacitySnapshot) -> SchedulerStats {
        SchedulerStats {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            spawned_workers: self.spawned_workers.load(Ordering::Relaxed),
            nested_workers: self.nested_workers.load(Ordering::Relaxed),
            inline_runs: self.inline_runs.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            groups_completed: self.groups_completed.load(Ordering::Relaxed),
            groups_faulted: self.groups_faulted.load(Ordering::Relaxed),
            groups_failed: self.groups_failed.load(Ordering::Relaxed),
            join_panics: self.join_panics.load(Ordering::Relaxed),
            live_workers,
            capacity,
        }
    }
}

/// Dispatches groups onto OS threads, at most `max_concurrency` at a time.
///
/// With `max_concurrency == 1` no threads are started: each group runs on the
/// dispatching thread, which makes execution strictly sequential.
pub struct GroupScheduler {
    config: RunnerConfig,
    capacity: Arc<CapacityState>,
    registry: Arc<WorkerRegistry>,
    counters: Arc<RunCounters>,
    thread_name_prefix: Arc<str>,
}

impl GroupScheduler {
    /// Create a scheduler from a configuration.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::InvalidConfig` if the configuration is invalid.
    pub fn new(config: RunnerConfig) -> Result<Self, SchedulerError> {
        config.validate().map_err(SchedulerError::InvalidConfig)?;
        let capacity = Arc::new(CapacityState::new(config.max_concurrency)?);
        let thread_name_prefix = Arc::from(config.thread_name_prefix.as_str());

        info!(
            max_concurrency = config.max_concurrency,
            fail_fast = config.fail_fast,
            join_timeout_ms = ?config.join_timeout_ms,
            "GroupScheduler initialized"
        );

        Ok(Self {
            config,
            capacity,
            registry: Arc::new(WorkerRegistry::new()),
            counters: Arc::new(RunCounters::default()),
            thread_name_prefix,
        })
    }

    /// Configuration in effect.
    #[must_use]
    pub const fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// The capacity pool shared with every worker.
    #[must_use]
    pub fn capacity(&self) -> Arc<CapacityState> {
        Arc::clone(&self.capacity)
    }

    /// Run `group` under the capacity limit.
    ///
    /// Blocks while every slot is taken. Returns once the group is running on
    /// a worker thread, or once it has finished when running inline.
    ///
    /// The group is skipped when `reporter` requests an abort, or when
    /// `fail_fast` is configured and any group has already failed.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::WorkerSpawn` if the worker thread could not be
    /// started. The slot is released and nothing stays registered.
    pub fn dispatch(
        &self,
        group: Arc<dyn RunnableGroup>,
        reporter: Arc<dyn Reporter>,
    ) -> Result<DispatchStatus, SchedulerError> {
        self.counters.dispatched.fetch_add(1, Ordering::Relaxed);

        let env = ExecutionEnv {
            capacity: Arc::clone(&self.capacity),
            reporter,
            counters: Arc::clone(&self.counters),
            thread_name_prefix: Arc::clone(&self.thread_name_prefix),
            stack_size: self.config.thread_stack_size,
            fail_fast: self.config.fail_fast,
        };

        if env.abort_requested() {
            self.counters.note_skipped();
            warn!(group_id = group.id(), "abort requested, group not dispatched");
            return Ok(DispatchStatus::Skipped);
        }

        if self.capacity.max_concurrency() == 1 {
            let _permit = self.capacity.permit();
            let faults = worker::execute_tree(&env, group.as_ref(), None, 0);
            self.counters.inline_runs.fetch_add(1, Ordering::Relaxed);
            debug!(group_id = group.id(), faults, "group ran inline");
            return Ok(DispatchStatus::RanInline);
        }

        let permit = self.capacity.permit();
        let id = self.registry.register();
        let registry = Arc::clone(&self.registry);
        let name = format!("{}-{id}", self.thread_name_prefix);

        let spawned = worker::spawn_guarded(move || {
            let builder = env.thread_builder(name);
            builder.spawn(move || {
                worker::run_worker(id, permit, registry, &env, group.as_ref());
            })
        });

        match spawned {
            Ok(handle) => {
                self.registry.attach(id, handle);
                self.counters.spawned_workers.fetch_add(1, Ordering::Relaxed);
                debug!(worker_id = id, "worker spawned");
                Ok(DispatchStatus::Spawned(id))
            }
            Err(e) => {
                self.registry.discard(id);
                error!(worker_id = id, error = %e, "failed to spawn worker thread");
                Err(SchedulerError::WorkerSpawn(e.to_string()))
            }
        }
    }

    /// Block until every dispatched worker has terminated, then join them.
    ///
    /// Honors `join_timeout_ms` from the configuration.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::JoinTimeout` if the configured timeout expires
    /// first. Workers keep running and the wait may be repeated.
    pub fn wait_for_completion(&self) -> Result<(), SchedulerError> {
        self.joiner().wait()
    }

    /// Like [`wait_for_completion`](Self::wait_for_completion) with an
    /// explicit timeout.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::JoinTimeout` if `timeout` expires first.
    pub fn wait_for_completion_timeout(&self, timeout: Duration) -> Result<(), SchedulerError> {
        join_workers(&self.registry, &self.counters, &self.capacity, Some(timeout))
    }

    /// Owned handle on the join barrier, usable from another thread or task.
    #[must_use]
    pub fn joiner(&self) -> Joiner {
        Joiner {
            registry: Arc::clone(&self.registry),
            counters: Arc::clone(&self.counters),
            capacity: Arc::clone(&self.capacity),
            timeout: self.config.join_timeout(),
        }
    }

    /// Number of workers in the live set.
    #[must_use]
    pub fn live_workers(&self) -> usize {
        self.registry.live_count()
    }

    /// Lifecycle state of a live worker; `None` once it has deregistered.
    #[must_use]
    pub fn worker_state(&self, id: WorkerId) -> Option<WorkerState> {
        self.registry.state(id)
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        self.counters
            .snapshot(self.registry.live_count(), self.capacity.snapshot())
    }
}

impl Drop for GroupScheduler {
    fn drop(&mut self) {
        // Live workers are detached, not joined. Call wait_for_completion first.
        let live = self.registry.live_count();
        if live > 0 {
            warn!(live, "GroupScheduler dropped with live workers - detaching");
        }
    }
}

/// Join barrier detached from the scheduler's lifetime.
#[derive(Clone)]
pub struct Joiner {
    registry: Arc<WorkerRegistry>,
    counters: Arc<RunCounters>,
    capacity: Arc<CapacityState>,
    timeout: Option<Duration>,
}

impl Joiner {
    /// Block until all workers have terminated.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::JoinTimeout` if the scheduler's configured
    /// timeout expires first.
    pub fn wait(&self) -> Result<(), SchedulerError> {
        join_workers(&self.registry, &self.counters, &self.capacity, self.timeout)
    }
}

fn join_workers(
    registry: &WorkerRegistry,
    counters: &RunCounters,
    capacity: &CapacityState,
    timeout: Option<Duration>,
) -> Result<(), SchedulerError> {
    registry.wait_until_drained(timeout).map_err(|pending| {
        warn!(pending, "join barrier timed out");
        SchedulerError::JoinTimeout { pending }
    })?;

    let handles = registry.take_handles();
    let joined = handles.len();
    for (id, handle) in handles {
        if handle.join().is_err() {
            counters.join_panics.fetch_add(1, Ordering::Relaxed);
            warn!(worker_id = id, "Worker panicked");
        } else {
            debug!(worker_id = id, "Worker joined successfully");
        }
    }

    let snapshot = capacity.snapshot();
    info!(
        joined,
        active = snapshot.active,
        peak = snapshot.peak,
        "all workers joined"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::group::FnGroup;
    use crate::core::reporter::InMemoryReporter;

    fn group(id: &str) -> Arc<dyn RunnableGroup> {
        Arc::new(FnGroup::new(id, |_| Outcome::Passed))
    }

    #[test]
    fn test_invalid_config_rejected_before_dispatch() {
        let err = GroupScheduler::new(RunnerConfig::new().with_max_concurrency(0)).err();
        assert!(matches!(err, Some(SchedulerError::InvalidConfig(_))));
    }

    #[test]
    fn test_sequential_runs_inline() {
        let scheduler = GroupScheduler::new(RunnerConfig::new()).unwrap();
        let reporter: Arc<dyn Reporter> = Arc::new(InMemoryReporter::new(10));

        let status = scheduler.dispatch(group("a"), reporter).unwrap();
        assert_eq!(status, DispatchStatus::RanInline);

        let stats = scheduler.stats();
        assert_eq!(stats.inline_runs, 1);
        assert_eq!(stats.spawned_workers, 0);
        assert_eq!(stats.groups_completed, 1);
    }

    #[test]
    fn test_parallel_spawns_and_deregisters() {
        let scheduler = GroupScheduler::new(RunnerConfig::new().with_max_concurrency(2)).unwrap();
        let reporter: Arc<dyn Reporter> = Arc::new(InMemoryReporter::new(10));

        let status = scheduler.dispatch(group("a"), Arc::clone(&reporter)).unwrap();
        let DispatchStatus::Spawned(id) = status else {
            panic!("expected a spawned worker, got {status:?}");
        };

        scheduler.wait_for_completion().unwrap();
        assert_eq!(scheduler.worker_state(id), None);
        assert_eq!(scheduler.live_workers(), 0);
        assert_eq!(scheduler.stats().spawned_workers, 1);
    }

    #[test]
    fn test_abort_skips_dispatch() {
        let scheduler = GroupScheduler::new(RunnerConfig::new().with_max_concurrency(2)).unwrap();
        let reporter = Arc::new(InMemoryReporter::new(10));
        reporter.request_abort();

        let status = scheduler.dispatch(group("a"), reporter.clone()).unwrap();
        assert_eq!(status, DispatchStatus::Skipped);
        assert_eq!(reporter.summary().total, 0);
        assert_eq!(scheduler.stats().skipped, 1);
    }

    #[test]
    fn test_wait_without_dispatch_returns() {
        let scheduler = GroupScheduler::new(RunnerConfig::new().with_max_concurrency(4)).unwrap();
        scheduler.wait_for_completion().unwrap();
        scheduler.wait_for_completion().unwrap();
    }
}
