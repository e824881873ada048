//! The unit-of-work contract executed by the scheduler.
//!
//! A group runs its own logic through [`RunnableGroup::run`] and exposes an
//! ordered list of children. The scheduler executes the children after the
//! parent's own logic, dispatching them through the same capacity pool.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::capacity::CapacityState;
use super::reporter::Reporter;

/// Result of running one group's own logic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// The group's checks all held.
    Passed,
    /// The group ran and reported a failure.
    Failed {
        /// Failure description supplied by the group.
        message: String,
    },
    /// The group was deliberately not executed.
    Pending {
        /// Why the group is pending.
        reason: String,
    },
    /// The group faulted; the fault was caught at the worker boundary.
    Errored {
        /// Panic payload or error text.
        message: String,
    },
}

impl Outcome {
    /// Shorthand for [`Outcome::Failed`].
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    /// Shorthand for [`Outcome::Pending`].
    pub fn pending(reason: impl Into<String>) -> Self {
        Self::Pending {
            reason: reason.into(),
        }
    }

    /// `Failed` or `Errored`.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::Errored { .. })
    }

    /// Only `Errored`.
    #[must_use]
    pub const fn is_fault(&self) -> bool {
        matches!(self, Self::Errored { .. })
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => write!(f, "passed"),
            Self::Failed { message } => write!(f, "failed: {message}"),
            Self::Pending { reason } => write!(f, "pending: {reason}"),
            Self::Errored { message } => write!(f, "errored: {message}"),
        }
    }
}

/// Where a group sits in the run, handed to the reporter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInfo {
    /// Group identity.
    pub id: String,
    /// Identity of the enclosing group, if nested.
    pub parent: Option<String>,
    /// Nesting depth; top-level groups are 0.
    pub depth: usize,
    /// Name of the thread that executed the group.
    pub worker: Option<String>,
}

/// One independent unit of work.
///
/// Implementations must be shareable across threads: the scheduler hands
/// `Arc<dyn RunnableGroup>` to worker threads and child groups may run on
/// threads other than their parent's.
pub trait RunnableGroup: Send + Sync + 'static {
    /// Unique identity of this group.
    fn id(&self) -> &str;

    /// Child groups, executed in order after [`run`](Self::run) returns.
    fn children(&self) -> &[Arc<dyn RunnableGroup>] {
        &[]
    }

    /// Execute this group's own logic.
    ///
    /// A panic here is caught by the scheduler and reported as
    /// [`Outcome::Errored`].
    fn run(&self, ctx: &GroupContext<'_>) -> Outcome;
}

/// Execution context visible to a running group.
pub struct GroupContext<'a> {
    info: &'a GroupInfo,
    reporter: &'a dyn Reporter,
    capacity: &'a CapacityState,
}

impl<'a> GroupContext<'a> {
    pub(crate) fn new(
        info: &'a GroupInfo,
        reporter: &'a dyn Reporter,
        capacity: &'a CapacityState,
    ) -> Self {
        Self {
            info,
            reporter,
            capacity,
        }
    }

    /// Placement of the running group.
    #[must_use]
    pub const fn info(&self) -> &GroupInfo {
        self.info
    }

    /// The run's reporter.
    #[must_use]
    pub fn reporter(&self) -> &dyn Reporter {
        self.reporter
    }

    /// The capacity pool shared by every worker in the run.
    #[must_use]
    pub const fn capacity(&self) -> &CapacityState {
        self.capacity
    }

    /// Whether the reporter has asked the run to stop.
    #[must_use]
    pub fn abort_requested(&self) -> bool {
        self.reporter.abort_requested()
    }
}

type RunFn = dyn Fn(&GroupContext<'_>) -> Outcome + Send + Sync;

/// A group built from a closure, for callers that do not need a dedicated type.
///
/// ```
/// use std::sync::Arc;
/// use prometheus_group_runner::core::{FnGroup, Outcome, RunnableGroup};
///
/// let child: Arc<dyn RunnableGroup> = Arc::new(FnGroup::new("child", |_| Outcome::Passed));
/// let parent = FnGroup::new("parent", |_| Outcome::Passed).with_children(vec![child]);
/// assert_eq!(parent.children().len(), 1);
/// ```
pub struct FnGroup {
    id: String,
    children: Vec<Arc<dyn RunnableGroup>>,
    run: Box<RunFn>,
}

impl FnGroup {
    /// Create a group with identity `id` running `run`.
    pub fn new<F>(id: impl Into<String>, run: F) -> Self
    where
        F: Fn(&GroupContext<'_>) -> Outcome + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            children: Vec::new(),
            run: Box::new(run),
        }
    }

    /// Attach child groups.
    #[must_use]
    pub fn with_children(mut self, children: Vec<Arc<dyn RunnableGroup>>) -> Self {
        self.children = children;
        self
    }
}

impl fmt::Debug for FnGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnGroup")
            .field("id", &self.id)
            .field("children", &self.children.len())
            .finish_non_exhaustive()
    }
}

impl RunnableGroup for FnGroup {
    fn id(&self) -> &str {
        &self.id
    }

    fn children(&self) -> &[Arc<dyn RunnableGroup>] {
        &self.children
    }

    fn run(&self, ctx: &GroupContext<'_>) -> Outcome {
        (self.run)(ctx)
    }
}
