//! Collection types.

use super::nodes::{Collector, Item, NodeBase};
use std::path::PathBuf;
use std::rc::Rc;

/// Location information for a test item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub path: PathBuf,
    pub line: Option<usize>,
    pub name: String,
}

/// One node returned by [`Collector::collect`].
#[derive(Debug, Clone)]
pub enum Child {
    Collector(Rc<dyn Collector>),
    Item(Rc<dyn Item>),
}

impl Child {
    pub fn base(&self) -> &NodeBase {
        match self {
            Child::Collector(c) => c.base(),
            Child::Item(i) => i.base(),
        }
    }

    pub fn name(&self) -> &str {
        self.base().name()
    }

    pub fn nodeid(&self) -> &str {
        self.base().nodeid()
    }

    pub fn is_item(&self) -> bool {
        matches!(self, Child::Item(_))
    }
}
