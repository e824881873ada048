//! Core scheduling abstractions and capacity accounting.

pub mod capacity;
pub mod error;
pub mod group;
pub mod registry;
pub mod reporter;
pub mod scheduler;

pub use capacity::{CapacityPermit, CapacitySnapshot, CapacityState};
pub use error::{AppResult, SchedulerError};
pub use group::{FnGroup, GroupContext, GroupInfo, Outcome, RunnableGroup};
pub use registry::{WorkerId, WorkerState};
pub use reporter::{GroupRecord, InMemoryReporter, ReportSink, Reporter, RunSummary, Synchronized};
pub use scheduler::{DispatchStatus, GroupScheduler, Joiner, SchedulerStats};
