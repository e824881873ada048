//! Tests for the runner builder

use prometheus_group_runner::builders::Runner;
use prometheus_group_runner::config::RunnerConfig;
use prometheus_group_runner::core::{FnGroup, Outcome, RunnableGroup};
use std::sync::Arc;

fn groups(fail_at: usize, count: usize) -> Vec<Arc<dyn RunnableGroup>> {
    (0..count)
        .map(|i| {
            Arc::new(FnGroup::new(format!("g{i}"), move |_| {
                if i == fail_at {
                    Outcome::failed("expected true, got false")
                } else {
                    Outcome::Passed
                }
            })) as Arc<dyn RunnableGroup>
        })
        .collect()
}

#[test]
fn test_runner_fail_fast_aborts_run() {
    let config = RunnerConfig::new().with_max_concurrency(1).with_fail_fast(true);
    let runner = Runner::from_config(config).unwrap();

    let summary = runner.run_all(groups(1, 5)).unwrap();
    assert!(summary.aborted);
    assert_eq!(summary.total, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(runner.scheduler().stats().skipped, 3);
}

#[test]
fn test_runner_without_fail_fast_runs_everything() {
    let runner = Runner::from_config(RunnerConfig::new().with_max_concurrency(2)).unwrap();

    let summary = runner.run_all(groups(1, 5)).unwrap();
    assert!(!summary.aborted);
    assert_eq!(summary.total, 5);
    assert_eq!(summary.passed, 4);
    assert_eq!(runner.reporter().records().len(), 5);
}
