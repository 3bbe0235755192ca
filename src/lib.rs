//! Trellis: a test collection and execution core.
//!
//! Tests are registered per file in a [`collection::TestRegistry`], marked
//! through a [`mark::MarkFactory`] and collected into a tree of nodes by a
//! [`collection::Session`]. [`runner::runtestprotocol`] runs one item's
//! setup, call and teardown phases.

pub mod cli;
pub mod collection;
pub mod config;
pub mod error;
pub mod mark;
pub mod outcomes;
pub mod runner;
pub mod timing;
pub mod utils;
