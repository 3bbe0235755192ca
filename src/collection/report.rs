//! Collection reporting functionality.

use super::error::{CollectionError, CollectionOutcome, CollectionResult};
use super::nodes::Collector;
use super::types::Child;
use crate::outcomes::Skipped;
use crate::runner::{CallInfo, PhaseOutcome, When};
use std::rc::Rc;

/// Anything the session counts: collection and test reports.
pub trait Report {
    fn nodeid(&self) -> &str;

    fn failed(&self) -> bool;
}

/// Collection report
#[derive(Debug)]
pub struct CollectReport {
    pub nodeid: String,
    pub outcome: CollectionOutcome,
    pub longrepr: Option<String>,
    pub error_type: Option<CollectionError>,
    pub result: Vec<Child>,
}

impl CollectReport {
    pub fn new(
        nodeid: String,
        outcome: CollectionOutcome,
        longrepr: Option<String>,
        error_type: Option<CollectionError>,
        result: Vec<Child>,
    ) -> Self {
        Self {
            nodeid,
            outcome,
            longrepr,
            error_type,
            result,
        }
    }

    pub fn passed(&self) -> bool {
        self.outcome == CollectionOutcome::Passed
    }
}

impl Report for CollectReport {
    fn nodeid(&self) -> &str {
        &self.nodeid
    }

    fn failed(&self) -> bool {
        self.outcome == CollectionOutcome::Failed
    }
}

/// Collect a single node and return a report
///
/// Failures, including panics inside `collect()`, end up in the report.
/// Construction errors are not collection failures and are returned as `Err`.
pub fn collect_one_node(node: &Rc<dyn Collector>) -> CollectionResult<CollectReport> {
    let nodeid = node.nodeid().to_string();
    let collector = node.clone();

    let call = match CallInfo::from_call(
        || collector.collect().map_err(anyhow::Error::from),
        When::Collect,
        &[],
    ) {
        Ok(call) => call,
        Err(e) => {
            return Ok(CollectReport::new(
                nodeid,
                CollectionOutcome::Failed,
                Some(e.to_string()),
                None,
                vec![],
            ))
        }
    };

    match call.into_outcome() {
        PhaseOutcome::Completed(result) => Ok(CollectReport::new(
            nodeid,
            CollectionOutcome::Passed,
            None,
            None,
            result,
        )),
        PhaseOutcome::Raised(excinfo) => {
            if let Some(skipped) = excinfo.downcast_ref::<Skipped>() {
                let reason = skipped.reason.clone();
                return Ok(CollectReport::new(
                    nodeid,
                    CollectionOutcome::Skipped,
                    Some(reason),
                    None,
                    vec![],
                ));
            }

            let longrepr = excinfo.exconly();
            let error_type = match excinfo.into_error().downcast::<CollectionError>() {
                Ok(CollectionError::Construction(e)) => return Err(e.into()),
                Ok(other) => Some(other),
                Err(_) => None,
            };
            Ok(CollectReport::new(
                nodeid,
                CollectionOutcome::Failed,
                Some(longrepr),
                error_type,
                vec![],
            ))
        }
    }
}
