//! Running one phase of a test and capturing what happened.
//!
//! [`CallInfo::from_call`] is phase-agnostic: callers invoke it once per
//! phase. Ordinary failures, returned errors and panics alike, are captured
//! in the [`CallInfo`]; error types listed in `reraise` pass through.

use crate::collection::report::Report;
use crate::collection::types::Location;
use crate::collection::Item;
use crate::outcomes::{Exit, Interrupted, Skipped};
use crate::timing::{MonotonicClock, Timing};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

/// Phase a call belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum When {
    Collect,
    Setup,
    Call,
    Teardown,
}

impl fmt::Display for When {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            When::Collect => "collect",
            When::Setup => "setup",
            When::Call => "call",
            When::Teardown => "teardown",
        };
        f.write_str(s)
    }
}

/// The captured failure value.
#[derive(Debug)]
pub enum ExcValue {
    Error(anyhow::Error),
    Panic(Box<dyn Any + Send>),
}

/// Type, value and trace of a captured failure.
#[derive(Debug)]
pub struct ExcInfo {
    value: ExcValue,
    traceback: Option<String>,
}

impl ExcInfo {
    fn from_error(error: anyhow::Error) -> Self {
        let traceback = Some(format!("{error:?}"));
        Self {
            value: ExcValue::Error(error),
            traceback,
        }
    }

    fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        Self {
            value: ExcValue::Panic(payload),
            traceback: None,
        }
    }

    pub fn value(&self) -> &ExcValue {
        &self.value
    }

    pub fn is_panic(&self) -> bool {
        matches!(self.value, ExcValue::Panic(_))
    }

    /// Whether the failure value is an `E`, either as the returned error or
    /// as the panic payload.
    pub fn errisinstance<E>(&self) -> bool
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.downcast_ref::<E>().is_some()
    }

    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        match &self.value {
            ExcValue::Error(error) => error.downcast_ref::<E>(),
            ExcValue::Panic(payload) => payload.downcast_ref::<E>(),
        }
    }

    /// One-line description of the failure.
    pub fn exconly(&self) -> String {
        match &self.value {
            ExcValue::Error(error) => format!("{error:#}"),
            ExcValue::Panic(payload) => format!("panicked: {}", panic_message(&**payload)),
        }
    }

    /// Error chain and backtrace of a returned error. Panics report their
    /// location through the panic hook instead.
    pub fn traceback(&self) -> Option<&str> {
        self.traceback.as_deref()
    }

    pub fn into_error(self) -> anyhow::Error {
        match self.value {
            ExcValue::Error(error) => error,
            ExcValue::Panic(payload) => {
                anyhow::anyhow!("panicked: {}", panic_message(&*payload))
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Box<dyn Any>".to_string()
    }
}

/// An error type that passes through [`CallInfo::from_call`] uncaptured.
#[derive(Clone, Copy)]
pub struct Reraise {
    name: &'static str,
    error: fn(&anyhow::Error) -> bool,
    panic: fn(&(dyn Any + Send)) -> bool,
}

impl Reraise {
    pub fn of<E>() -> Self
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        Self {
            name: std::any::type_name::<E>(),
            error: |error| error.is::<E>(),
            panic: |payload| payload.is::<E>(),
        }
    }

    /// Signals that end the run: [`Exit`] and [`Interrupted`].
    pub fn control_signals() -> [Reraise; 2] {
        [Reraise::of::<Exit>(), Reraise::of::<Interrupted>()]
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn matches_error(&self, error: &anyhow::Error) -> bool {
        (self.error)(error)
    }

    fn matches_panic(&self, payload: &(dyn Any + Send)) -> bool {
        (self.panic)(payload)
    }
}

impl fmt::Debug for Reraise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Reraise").field(&self.name).finish()
    }
}

/// How a phase ended.
#[derive(Debug)]
pub enum PhaseOutcome<T> {
    Completed(T),
    Raised(ExcInfo),
}

/// Result or failure information of one phase call.
#[derive(Debug)]
pub struct CallInfo<T> {
    outcome: PhaseOutcome<T>,
    start: f64,
    stop: f64,
    duration: f64,
    when: When,
}

impl<T> CallInfo<T> {
    /// Call `func`, capturing its result or failure and timing it on the
    /// process-wide monotonic clock.
    ///
    /// Returns `Err` only for a returned error matched by `reraise`; a
    /// matched panic keeps unwinding.
    pub fn from_call<F>(func: F, when: When, reraise: &[Reraise]) -> anyhow::Result<Self>
    where
        F: FnOnce() -> anyhow::Result<T>,
    {
        Self::from_call_with_timing(func, when, reraise, MonotonicClock::global())
    }

    pub fn from_call_with_timing<F>(
        func: F,
        when: When,
        reraise: &[Reraise],
        timing: &dyn Timing,
    ) -> anyhow::Result<Self>
    where
        F: FnOnce() -> anyhow::Result<T>,
    {
        let start = timing.time();

        let outcome = match panic::catch_unwind(AssertUnwindSafe(func)) {
            Ok(Ok(value)) => PhaseOutcome::Completed(value),
            Ok(Err(error)) => {
                if let Some(signal) = reraise.iter().find(|r| r.matches_error(&error)) {
                    log::debug!("{when}: passing {} through", signal.name());
                    return Err(error);
                }
                PhaseOutcome::Raised(ExcInfo::from_error(error))
            }
            Err(payload) => {
                if let Some(signal) = reraise.iter().find(|r| r.matches_panic(&*payload)) {
                    log::debug!("{when}: resuming {} panic", signal.name());
                    panic::resume_unwind(payload);
                }
                PhaseOutcome::Raised(ExcInfo::from_panic(payload))
            }
        };

        let stop = timing.time();
        let duration = (stop - start).max(0.0);
        log::trace!("{when}: finished in {duration:.6}s");

        Ok(Self {
            outcome,
            start,
            stop,
            duration,
            when,
        })
    }

    /// The returned value; `None` when the phase raised.
    pub fn result(&self) -> Option<&T> {
        match &self.outcome {
            PhaseOutcome::Completed(value) => Some(value),
            PhaseOutcome::Raised(_) => None,
        }
    }

    /// The captured failure; present exactly when the phase did not complete.
    pub fn excinfo(&self) -> Option<&ExcInfo> {
        match &self.outcome {
            PhaseOutcome::Completed(_) => None,
            PhaseOutcome::Raised(excinfo) => Some(excinfo),
        }
    }

    pub fn completed(&self) -> bool {
        matches!(self.outcome, PhaseOutcome::Completed(_))
    }

    pub fn outcome(&self) -> &PhaseOutcome<T> {
        &self.outcome
    }

    pub fn into_outcome(self) -> PhaseOutcome<T> {
        self.outcome
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn stop(&self) -> f64 {
        self.stop
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn when(&self) -> When {
        self.when
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Passed,
    Failed,
    Skipped,
}

/// Outcome of one phase of one item.
#[derive(Debug, Clone)]
pub struct TestReport {
    pub nodeid: String,
    pub location: Location,
    /// Names of every marker on the item, closest first.
    pub keywords: Vec<String>,
    pub outcome: Outcome,
    pub longrepr: Option<String>,
    pub when: When,
    pub start: f64,
    pub stop: f64,
    pub duration: f64,
}

impl TestReport {
    pub fn from_item_and_call<T>(item: &dyn Item, call: &CallInfo<T>) -> Self {
        let (outcome, longrepr) = match call.excinfo() {
            None => (Outcome::Passed, None),
            Some(excinfo) => match excinfo.downcast_ref::<Skipped>() {
                Some(skipped) => (Outcome::Skipped, Some(skipped.reason.clone())),
                None => (
                    Outcome::Failed,
                    Some(
                        excinfo
                            .traceback()
                            .map(str::to_string)
                            .unwrap_or_else(|| excinfo.exconly()),
                    ),
                ),
            },
        };

        Self {
            nodeid: item.nodeid().to_string(),
            location: item.location(),
            keywords: item
                .iter_markers(None)
                .iter()
                .map(|mark| mark.name().to_string())
                .collect(),
            outcome,
            longrepr,
            when: call.when(),
            start: call.start(),
            stop: call.stop(),
            duration: call.duration(),
        }
    }

    pub fn passed(&self) -> bool {
        self.outcome == Outcome::Passed
    }

    pub fn skipped(&self) -> bool {
        self.outcome == Outcome::Skipped
    }
}

impl Report for TestReport {
    fn nodeid(&self) -> &str {
        &self.nodeid
    }

    fn failed(&self) -> bool {
        self.outcome == Outcome::Failed
    }
}

/// Run one phase of `item` and log the report to the item's session.
pub fn call_and_report(
    item: &dyn Item,
    when: When,
    phase: fn(&dyn Item) -> anyhow::Result<()>,
    reraise: &[Reraise],
) -> anyhow::Result<TestReport> {
    let call = CallInfo::from_call(|| phase(item), when, reraise)?;
    let report = TestReport::from_item_and_call(item, &call);
    item.session().runtest_logreport(&report);
    Ok(report)
}

/// Setup, call and teardown for a single item.
///
/// The call phase runs only after a passing setup; teardown always runs,
/// also when the call phase let a control signal through.
pub fn runtestprotocol(item: &dyn Item, reraise: &[Reraise]) -> anyhow::Result<Vec<TestReport>> {
    let mut reports = Vec::with_capacity(3);

    let setup = call_and_report(item, When::Setup, |i| i.setup(), reraise)?;
    let setup_passed = setup.passed();
    reports.push(setup);

    if setup_passed {
        match call_and_report(item, When::Call, |i| i.runtest(), reraise) {
            Ok(report) => reports.push(report),
            Err(signal) => {
                let teardown = call_and_report(item, When::Teardown, |i| i.teardown(), reraise);
                if let Err(second) = teardown {
                    log::debug!(
                        "{}: teardown signal {second:#} follows {signal:#}",
                        item.nodeid()
                    );
                }
                return Err(signal);
            }
        }
    }

    reports.push(call_and_report(item, When::Teardown, |i| i.teardown(), reraise)?);
    Ok(reports)
}
