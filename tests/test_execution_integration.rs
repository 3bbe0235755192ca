//! Integration tests for running collected items.

use serde_json::json;
use std::cell::Cell;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use trellis::collection::{
    Collector, Item, Node, NodeArgs, NodeBase, TestFunction, TestRegistry, TestSuite,
};
use trellis::mark::{Kwargs, MarkFactory};
use trellis::outcomes::{Exit, Interrupted};
use trellis::runner::{runtestprotocol, Outcome, Reraise, When};

mod common;
use common::{create_test_file, session_for};

fn collect_single(registry: TestRegistry) -> (tempfile::TempDir, Vec<Rc<dyn Item>>) {
    let (temp_dir, project_path) = create_test_file("test_run.rs", "");
    let session = session_for(&project_path, registry);
    let (items, notfound) = session.perform_collect(None).expect("collection failed");
    assert!(notfound.is_empty(), "{notfound:#?}");
    (temp_dir, items)
}

/// An item that counts its teardowns.
#[derive(Debug)]
struct TrackedItem {
    base: NodeBase,
    call: fn() -> anyhow::Result<()>,
    teardown_signal: bool,
    teardowns: Cell<usize>,
}

impl TrackedItem {
    fn new(
        call: fn() -> anyhow::Result<()>,
        teardown_signal: bool,
    ) -> (tempfile::TempDir, Self) {
        let (temp_dir, project_path) = create_test_file("test_run.rs", "");
        let session: Rc<dyn Collector> = session_for(&project_path, TestRegistry::new());
        let base = NodeBase::from_parent(session, "tracked", NodeArgs::default())
            .expect("tracked item");
        let item = Self {
            base,
            call,
            teardown_signal,
            teardowns: Cell::new(0),
        };
        (temp_dir, item)
    }
}

impl Node for TrackedItem {
    fn base(&self) -> &NodeBase {
        &self.base
    }
}

impl Item for TrackedItem {
    fn runtest(&self) -> anyhow::Result<()> {
        (self.call)()
    }

    fn teardown(&self) -> anyhow::Result<()> {
        self.teardowns.set(self.teardowns.get() + 1);
        if self.teardown_signal {
            return Err(Interrupted.into());
        }
        Ok(())
    }
}

fn outcomes(reports: &[trellis::runner::TestReport]) -> Vec<(When, Outcome)> {
    reports.iter().map(|r| (r.when, r.outcome)).collect()
}

/// Test basic execution of a single passing test
#[test]
fn test_execute_single_passing_test() {
    let mut registry = TestRegistry::new();
    registry.add("test_run.rs", TestFunction::new("test_passing", || Ok(())));
    let (_temp_dir, items) = collect_single(registry);

    let reports = runtestprotocol(items[0].as_ref(), &[]).unwrap();

    assert_eq!(
        outcomes(&reports),
        vec![
            (When::Setup, Outcome::Passed),
            (When::Call, Outcome::Passed),
            (When::Teardown, Outcome::Passed),
        ]
    );
    assert!(reports.iter().all(|r| r.nodeid == "test_run.rs::test_passing"));
    assert_eq!(items[0].session().tests_failed(), 0);
}

#[test]
fn test_execute_failing_test() {
    let mut registry = TestRegistry::new();
    registry.add(
        "test_run.rs",
        TestFunction::new("test_failing", || {
            let sum = [1, 1].iter().sum::<i32>();
            anyhow::ensure!(sum == 3, "math is broken: {sum}");
            Ok(())
        }),
    );
    let (_temp_dir, items) = collect_single(registry);

    let reports = runtestprotocol(items[0].as_ref(), &[]).unwrap();

    assert_eq!(reports[1].when, When::Call);
    assert_eq!(reports[1].outcome, Outcome::Failed);
    let longrepr = reports[1].longrepr.as_deref().unwrap_or_default();
    assert!(longrepr.contains("math is broken"), "{longrepr}");
    assert_eq!(reports[2].outcome, Outcome::Passed);
    assert_eq!(items[0].session().tests_failed(), 1);
}

#[test]
fn test_execute_panicking_test() {
    let mut registry = TestRegistry::new();
    registry.add(
        "test_run.rs",
        TestFunction::new("test_panics", || {
            let values: Vec<i32> = Vec::new();
            assert_eq!(values.len(), 1, "expected one value");
            Ok(())
        }),
    );
    let (_temp_dir, items) = collect_single(registry);

    let reports = runtestprotocol(items[0].as_ref(), &[]).unwrap();

    assert_eq!(reports[1].outcome, Outcome::Failed);
    let longrepr = reports[1].longrepr.as_deref().unwrap_or_default();
    assert!(longrepr.contains("expected one value"), "{longrepr}");
}

#[test]
fn test_skip_marker_skips_call() {
    let factory = MarkFactory::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let skip = factory
        .skip()
        .with_args(vec![], Kwargs::from([("reason".to_string(), json!("not today"))]));
    let mut registry = TestRegistry::new();
    registry.add(
        "test_run.rs",
        skip.apply(TestFunction::new("test_skipped", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }))
        .unwrap(),
    );
    let (_temp_dir, items) = collect_single(registry);

    let reports = runtestprotocol(items[0].as_ref(), &[]).unwrap();

    assert_eq!(
        outcomes(&reports),
        vec![
            (When::Setup, Outcome::Skipped),
            (When::Teardown, Outcome::Passed),
        ]
    );
    assert_eq!(reports[0].longrepr.as_deref(), Some("not today"));
    assert_eq!(calls.load(Ordering::SeqCst), 0, "test body must not run");
    assert_eq!(items[0].session().tests_failed(), 0);
}

#[test]
fn test_skip_marker_on_suite_applies_to_tests() {
    let factory = MarkFactory::new();
    let suite = factory
        .skip()
        .apply(TestSuite::new("Slow").with_test(TestFunction::new("test_a", || Ok(()))))
        .unwrap();
    let mut registry = TestRegistry::new();
    registry.add("test_run.rs", suite);
    let (_temp_dir, items) = collect_single(registry);

    let reports = runtestprotocol(items[0].as_ref(), &[]).unwrap();

    assert_eq!(reports[0].outcome, Outcome::Skipped);
    assert_eq!(reports[0].longrepr.as_deref(), Some("unconditional skip"));
    assert_eq!(reports[0].keywords, vec!["skip"]);
}

#[test]
fn test_control_signal_passes_through_after_teardown() {
    let mut registry = TestRegistry::new();
    registry.add(
        "test_run.rs",
        TestFunction::new("test_exits", || Err(Exit::new("stop the run").into())),
    );
    let (_temp_dir, items) = collect_single(registry);

    let err = runtestprotocol(items[0].as_ref(), &Reraise::control_signals()).unwrap_err();

    assert_eq!(
        err.downcast_ref::<Exit>().map(|e| e.reason.as_str()),
        Some("stop the run")
    );
    // the reraised call phase is not logged as a failure
    assert_eq!(items[0].session().tests_failed(), 0);
}

#[test]
fn test_control_signal_is_a_failure_unless_reraised() {
    let mut registry = TestRegistry::new();
    registry.add(
        "test_run.rs",
        TestFunction::new("test_interrupted", || Err(Interrupted.into())),
    );
    let (_temp_dir, items) = collect_single(registry);

    let reports = runtestprotocol(items[0].as_ref(), &[]).unwrap();

    assert_eq!(reports[1].outcome, Outcome::Failed);
    assert_eq!(reports[1].longrepr.as_deref().map(|s| s.starts_with("interrupted")), Some(true));
}

#[test]
fn test_reports_carry_location_and_timing() {
    let mut registry = TestRegistry::new();
    registry.add(
        "test_run.rs",
        TestSuite::new("Group").with_test(TestFunction::new("test_inner", || Ok(())).at_line(42)),
    );
    let (_temp_dir, items) = collect_single(registry);

    let reports = runtestprotocol(items[0].as_ref(), &[]).unwrap();

    for report in &reports {
        assert_eq!(report.nodeid, "test_run.rs::Group::test_inner");
        assert_eq!(report.location.name, "Group.test_inner");
        assert_eq!(report.location.line, Some(42));
        assert!(report.stop >= report.start);
        assert!(report.duration >= 0.0);
    }
}

#[test]
fn test_teardown_runs_once_when_call_signal_is_reraised() {
    let (_temp_dir, item) = TrackedItem::new(|| Err(Exit::new("stop").into()), false);

    let err = runtestprotocol(&item, &Reraise::control_signals()).unwrap_err();

    assert!(err.downcast_ref::<Exit>().is_some(), "{err:#}");
    assert_eq!(item.teardowns.get(), 1);
}

#[test]
fn test_teardown_runs_once_after_call_failure() {
    let (_temp_dir, item) = TrackedItem::new(|| Err(anyhow::anyhow!("call failed")), false);

    let reports = runtestprotocol(&item, &Reraise::control_signals()).unwrap();

    assert_eq!(
        outcomes(&reports),
        vec![
            (When::Setup, Outcome::Passed),
            (When::Call, Outcome::Failed),
            (When::Teardown, Outcome::Passed),
        ]
    );
    assert_eq!(item.teardowns.get(), 1);
}

#[test]
fn test_first_control_signal_wins_over_teardown_signal() {
    let (_temp_dir, item) = TrackedItem::new(|| Err(Exit::new("from call").into()), true);

    let err = runtestprotocol(&item, &Reraise::control_signals()).unwrap_err();

    assert_eq!(
        err.downcast_ref::<Exit>().map(|e| e.reason.as_str()),
        Some("from call")
    );
    assert!(err.downcast_ref::<Interrupted>().is_none());
    assert_eq!(item.teardowns.get(), 1);
}
