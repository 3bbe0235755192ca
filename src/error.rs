//! Errors raised while building marks, nodes and configuration.

use std::path::PathBuf;
use thiserror::Error;

/// Malformed construction of a node or mark list.
///
/// These are framework-usage errors; they are raised at the point of
/// violation and never captured as test failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConstructionError {
    #[error("nodeid or parent must be provided")]
    MissingParentOrNodeid,

    #[error("{0} is not a valid argument for from_parent")]
    InheritedArgument(&'static str),

    #[error("{0} must be provided when there is no parent to inherit it from")]
    MissingInherited(&'static str),

    #[error("got {0} instead of Mark")]
    InvalidMark(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarkError {
    #[error("marker name must not be empty")]
    EmptyName,

    #[error("marker name must not start with an underscore: {0:?}")]
    ReservedName(String),

    #[error("{0:?} not found in `markers` configuration option")]
    UnknownMarker(String),

    #[error("cannot combine mark {left:?} with mark {right:?}")]
    NameMismatch { left: String, right: String },

    #[error("invalid mark expression {expr:?}: {message}")]
    Expression { expr: String, message: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to determine current directory: {0}")]
    CurrentDir(#[source] std::io::Error),

    #[error(transparent)]
    Mark(#[from] MarkError),
}
