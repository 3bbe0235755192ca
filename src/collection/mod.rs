//! Collection implementation.
//!
//! This module provides the node tree, the concrete collectors for
//! directories, test files and suites, and the session that drives them.

mod collectors;
pub mod error;
mod nodes;
pub mod registry;
pub mod report;
pub mod session;
pub mod types;

pub use collectors::{Class, Directory, Function, Instance, Module};
pub use error::{CollectionError, CollectionOutcome, CollectionResult};
pub use nodes::{Collector, Item, Node, NodeArgs, NodeBase, INSTANCE_NAME};
pub use registry::{TestDef, TestFunction, TestRegistry, TestSuite};
pub use report::{collect_one_node, CollectReport, Report};
pub use session::{NotFound, Session, SessionState};
pub use types::{Child, Location};
