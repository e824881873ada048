//! Outcome sinks shared by every worker in a run.
//!
//! Workers call the reporter concurrently with no coordination from the
//! scheduler, so a [`Reporter`] takes `&self` and must synchronize itself.
//! Sinks written against `&mut self` ([`ReportSink`]) are wrapped in
//! [`Synchronized`], which serializes every call behind one mutex.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use super::group::{GroupInfo, Outcome};
use crate::util::clock::now_ms;

/// Concurrency-safe receiver of group lifecycle notifications.
pub trait Reporter: Send + Sync {
    /// A group is about to run its own logic.
    fn group_started(&self, _group: &GroupInfo) {}

    /// A group and all of its children have finished.
    fn group_finished(&self, group: &GroupInfo, outcome: &Outcome);

    /// Whether dispatch of further groups should stop (fail-fast).
    ///
    /// Checked before every dispatch and every child. A parent reaches
    /// [`group_finished`](Self::group_finished) only after its children, so an
    /// abort raised there cannot stop a failing parent's own children; the
    /// scheduler's `fail_fast` setting does.
    fn abort_requested(&self) -> bool {
        false
    }
}

/// Single-threaded sink, made shareable by [`Synchronized`].
pub trait ReportSink: Send {
    /// Record the start of a group.
    fn started(&mut self, _group: &GroupInfo) {}

    /// Record a finished group.
    fn record(&mut self, group: &GroupInfo, outcome: &Outcome);
}

/// Serializes access to a [`ReportSink`] behind a mutex.
///
/// With `fail_fast` set, the first failing outcome raises the abort flag.
#[derive(Debug)]
pub struct Synchronized<S> {
    sink: Mutex<S>,
    fail_fast: bool,
    aborted: AtomicBool,
}

impl<S: ReportSink> Synchronized<S> {
    /// Wrap `sink`.
    pub fn new(sink: S) -> Self {
        Self {
            sink: Mutex::new(sink),
            fail_fast: false,
            aborted: AtomicBool::new(false),
        }
    }

    /// Raise the abort flag on the first failure.
    #[must_use]
    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Run `f` with exclusive access to the sink.
    pub fn with_sink<T>(&self, f: impl FnOnce(&mut S) -> T) -> T {
        f(&mut self.sink.lock())
    }

    /// Unwrap the sink.
    pub fn into_inner(self) -> S {
        self.sink.into_inner()
    }
}

impl<S: ReportSink> Reporter for Synchronized<S> {
    fn group_started(&self, group: &GroupInfo) {
        self.sink.lock().started(group);
    }

    fn group_finished(&self, group: &GroupInfo, outcome: &Outcome) {
        self.sink.lock().record(group, outcome);
        if self.fail_fast && outcome.is_failure() {
            self.aborted.store(true, Ordering::Release);
        }
    }

    fn abort_requested(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }
}

/// One finished group as stored by [`InMemoryReporter`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRecord {
    /// Group identity.
    pub group_id: String,
    /// Enclosing group, if nested.
    pub parent: Option<String>,
    /// Nesting depth.
    pub depth: usize,
    /// Thread that executed the group.
    pub worker: Option<String>,
    /// Outcome of the group's own logic.
    pub outcome: Outcome,
    /// Start time, milliseconds since epoch.
    pub started_at_ms: Option<u128>,
    /// Finish time, milliseconds since epoch.
    pub finished_at_ms: u128,
}

/// Aggregate counts for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Identifier of the run.
    pub run_id: Uuid,
    /// Groups that finished.
    pub total: usize,
    /// Groups that passed.
    pub passed: usize,
    /// Groups that reported failure.
    pub failed: usize,
    /// Groups that were pending.
    pub pending: usize,
    /// Groups that faulted.
    pub errored: usize,
    /// Whether fail-fast stopped the run.
    pub aborted: bool,
}

impl RunSummary {
    /// No failures and no faults.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.failed == 0 && self.errored == 0
    }
}

#[derive(Debug, Default)]
struct Collected {
    started: HashMap<String, u128>,
    records: VecDeque<GroupRecord>,
    summary: RunSummary,
}

/// Internally synchronized reporter keeping a bounded buffer of records.
///
/// Counts in [`summary`](Self::summary) cover every group even after old
/// records have been evicted from the buffer.
#[derive(Debug)]
pub struct InMemoryReporter {
    collected: Mutex<Collected>,
    max_records: usize,
    fail_fast: bool,
    aborted: AtomicBool,
}

impl InMemoryReporter {
    /// Create a reporter holding at most `max_records` records.
    #[must_use]
    pub fn new(max_records: usize) -> Self {
        let summary = RunSummary {
            run_id: Uuid::new_v4(),
            ..RunSummary::default()
        };
        Self {
            collected: Mutex::new(Collected {
                started: HashMap::new(),
                records: VecDeque::with_capacity(max_records.min(1024)),
                summary,
            }),
            max_records,
            fail_fast: false,
            aborted: AtomicBool::new(false),
        }
    }

    /// Raise the abort flag on the first failing outcome.
    #[must_use]
    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Identifier of this run.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.collected.lock().summary.run_id
    }

    /// Snapshot of stored records, oldest first.
    #[must_use]
    pub fn records(&self) -> Vec<GroupRecord> {
        self.collected.lock().records.iter().cloned().collect()
    }

    /// Aggregate counts so far.
    #[must_use]
    pub fn summary(&self) -> RunSummary {
        let mut summary = self.collected.lock().summary.clone();
        summary.aborted = self.abort_requested();
        summary
    }

    /// Raise the abort flag by hand.
    pub fn request_abort(&self) {
        if !self.aborted.swap(true, Ordering::AcqRel) {
            warn!("abort requested; no further groups will be dispatched");
        }
    }
}

impl Reporter for InMemoryReporter {
    fn group_started(&self, group: &GroupInfo) {
        self.collected
            .lock()
            .started
            .insert(group.id.clone(), now_ms());
    }

    fn group_finished(&self, group: &GroupInfo, outcome: &Outcome) {
        let finished_at_ms = now_ms();
        {
            let mut collected = self.collected.lock();
            let started_at_ms = collected.started.remove(&group.id);

            let summary = &mut collected.summary;
            summary.total += 1;
            match outcome {
                Outcome::Passed => summary.passed += 1,
                Outcome::Failed { .. } => summary.failed += 1,
                Outcome::Pending { .. } => summary.pending += 1,
                Outcome::Errored { .. } => summary.errored += 1,
            }

            if collected.records.len() >= self.max_records {
                collected.records.pop_front();
            }
            collected.records.push_back(GroupRecord {
                group_id: group.id.clone(),
                parent: group.parent.clone(),
                depth: group.depth,
                worker: group.worker.clone(),
                outcome: outcome.clone(),
                started_at_ms,
                finished_at_ms,
            });
        }
        debug!(group_id = %group.id, outcome = %outcome, "group recorded");

        if self.fail_fast && outcome.is_failure() {
            self.request_abort();
        }
    }

    fn abort_requested(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }
}
