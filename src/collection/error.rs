//! Error and outcome types for collection.

use crate::error::{ConstructionError, MarkError};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CollectionError {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Construction(#[from] ConstructionError),

    #[error(transparent)]
    Mark(#[from] MarkError),

    #[error("{0}")]
    NotCollectable(String),
}

pub type CollectionResult<T> = Result<T, CollectionError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionOutcome {
    Passed,
    Failed,
    Skipped,
}

impl fmt::Display for CollectionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CollectionOutcome::Passed => "passed",
            CollectionOutcome::Failed => "failed",
            CollectionOutcome::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

impl From<walkdir::Error> for CollectionError {
    fn from(err: walkdir::Error) -> Self {
        CollectionError::Io(err.into())
    }
}
