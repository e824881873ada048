//! Tests for reporters

use prometheus_group_runner::core::{
    GroupInfo, InMemoryReporter, Outcome, ReportSink, Reporter, RunSummary, Synchronized,
};
use std::sync::Arc;
use std::thread;

fn info(id: &str, parent: Option<&str>) -> GroupInfo {
    GroupInfo {
        id: id.to_string(),
        parent: parent.map(str::to_string),
        depth: usize::from(parent.is_some()),
        worker: None,
    }
}

#[derive(Default)]
struct CountingSink {
    started: usize,
    finished: Vec<String>,
}

impl ReportSink for CountingSink {
    fn started(&mut self, _group: &GroupInfo) {
        self.started += 1;
    }

    fn record(&mut self, group: &GroupInfo, _outcome: &Outcome) {
        self.finished.push(group.id.clone());
    }
}

#[test]
fn test_synchronized_sink_under_contention() {
    let reporter = Arc::new(Synchronized::new(CountingSink::default()));

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let reporter = Arc::clone(&reporter);
            thread::spawn(move || {
                for i in 0..50 {
                    let group = info(&format!("t{t}-g{i}"), None);
                    reporter.group_started(&group);
                    reporter.group_finished(&group, &Outcome::Passed);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let reporter = Arc::try_unwrap(reporter).ok().expect("sole owner");
    let sink = reporter.into_inner();
    assert_eq!(sink.started, 400);
    assert_eq!(sink.finished.len(), 400);
}

#[test]
fn test_synchronized_fail_fast() {
    let reporter = Synchronized::new(CountingSink::default()).with_fail_fast(true);
    reporter.group_finished(&info("ok", None), &Outcome::Passed);
    assert!(!reporter.abort_requested());
    reporter.group_finished(&info("bad", None), &Outcome::failed("boom"));
    assert!(reporter.abort_requested());
    assert_eq!(reporter.with_sink(|s| s.finished.len()), 2);
}

#[test]
fn test_in_memory_reporter_records_nesting() {
    let reporter = InMemoryReporter::new(10);
    reporter.group_started(&info("parent", None));
    reporter.group_started(&info("child", Some("parent")));
    reporter.group_finished(&info("child", Some("parent")), &Outcome::Passed);
    reporter.group_finished(&info("parent", None), &Outcome::Passed);

    let records = reporter.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].group_id, "child");
    assert_eq!(records[0].parent.as_deref(), Some("parent"));
    assert_eq!(records[0].depth, 1);
    assert!(records.iter().all(|r| r.started_at_ms.is_some()));
    assert!(records.iter().all(|r| r.started_at_ms.unwrap_or(0) <= r.finished_at_ms));
}

#[test]
fn test_in_memory_reporter_errored_counts_as_failure() {
    let reporter = InMemoryReporter::new(10).with_fail_fast(true);
    reporter.group_finished(
        &info("panicky", None),
        &Outcome::Errored {
            message: "index out of bounds".into(),
        },
    );
    let summary = reporter.summary();
    assert_eq!(summary.errored, 1);
    assert!(summary.aborted);
    assert!(!summary.is_success());
}

#[test]
fn test_request_abort_by_hand() {
    let reporter = InMemoryReporter::new(10);
    assert!(!reporter.abort_requested());
    reporter.request_abort();
    assert!(reporter.abort_requested());
    assert!(reporter.summary().aborted);
}

#[test]
fn test_run_summary_serializes() {
    let reporter = InMemoryReporter::new(10);
    reporter.group_finished(&info("a", None), &Outcome::pending("not yet"));
    let summary = reporter.summary();
    assert_eq!(summary.run_id, reporter.run_id());

    let json = serde_json::to_string(&summary).unwrap();
    let back: RunSummary = serde_json::from_str(&json).unwrap();
    assert_eq!(back.pending, 1);
    assert_eq!(back.run_id, summary.run_id);
    assert!(back.is_success());
}

#[test]
fn test_outcome_wire_format() {
    let json = serde_json::to_value(Outcome::failed("expected 2")).unwrap();
    assert_eq!(json["status"], "failed");
    assert_eq!(json["message"], "expected 2");
}
