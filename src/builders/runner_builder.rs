//! Scheduler plus in-memory reporter, built from one configuration.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use crate::config::RunnerConfig;
use crate::core::{
    AppResult, GroupScheduler, InMemoryReporter, Reporter, RunSummary, RunnableGroup,
    SchedulerError,
};

/// A ready-to-run scheduler with its reporter.
pub struct Runner {
    scheduler: GroupScheduler,
    reporter: Arc<InMemoryReporter>,
}

impl Runner {
    /// Validate `config` and build the scheduler and reporter.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::InvalidConfig` if validation fails.
    pub fn from_config(config: RunnerConfig) -> Result<Self, SchedulerError> {
        let reporter = Arc::new(
            InMemoryReporter::new(config.max_records.max(1)).with_fail_fast(config.fail_fast),
        );
        let scheduler = GroupScheduler::new(config)?;
        Ok(Self {
            scheduler,
            reporter,
        })
    }

    /// Build from `GROUP_RUNNER_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::InvalidConfig` for unparsable or invalid values.
    pub fn from_env() -> Result<Self, SchedulerError> {
        let config = RunnerConfig::from_env().map_err(SchedulerError::InvalidConfig)?;
        Self::from_config(config)
    }

    /// The underlying scheduler.
    #[must_use]
    pub const fn scheduler(&self) -> &GroupScheduler {
        &self.scheduler
    }

    /// The run's reporter.
    #[must_use]
    pub const fn reporter(&self) -> &Arc<InMemoryReporter> {
        &self.reporter
    }

    /// Dispatch `groups` in order, wait for all of them, and summarize.
    ///
    /// If a dispatch fails, workers already started are still joined before
    /// the error is returned.
    ///
    /// # Errors
    ///
    /// Returns the first dispatch error, or a join error.
    pub fn run_all<I>(&self, groups: I) -> AppResult<RunSummary>
    where
        I: IntoIterator<Item = Arc<dyn RunnableGroup>>,
    {
        let reporter: Arc<dyn Reporter> = Arc::clone(&self.reporter) as Arc<dyn Reporter>;

        let mut dispatch_error = None;
        for group in groups {
            let id = group.id().to_owned();
            if let Err(e) = self.scheduler.dispatch(group, Arc::clone(&reporter)) {
                dispatch_error = Some(anyhow::Error::new(e).context(format!("dispatching group `{id}`")));
                break;
            }
        }

        self.scheduler
            .wait_for_completion()
            .context("waiting for workers to finish")?;

        if let Some(e) = dispatch_error {
            return Err(e);
        }

        let summary = self.reporter.summary();
        info!(
            run_id = %summary.run_id,
            total = summary.total,
            passed = summary.passed,
            failed = summary.failed,
            pending = summary.pending,
            errored = summary.errored,
            aborted = summary.aborted,
            "run finished"
        );
        Ok(summary)
    }
}
