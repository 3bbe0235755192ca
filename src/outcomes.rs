//! Error types with a special meaning to the runner.

use thiserror::Error;

/// Request to end the whole run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("exit: {reason}")]
pub struct Exit {
    pub reason: String,
    pub returncode: Option<i32>,
}

impl Exit {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            returncode: None,
        }
    }
}

/// The run was interrupted from outside, e.g. by Ctrl-C.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("interrupted")]
pub struct Interrupted;

/// The test was skipped rather than failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("skipped: {reason}")]
pub struct Skipped {
    pub reason: String,
}

impl Skipped {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}
