//! Registered test code: functions and suites, keyed by the file that
//! defines them.

use crate::mark::{MarkAttr, Markable};
use crate::utils::normalize_separators;
use std::collections::BTreeMap;
use std::fmt;
use std::path::MAIN_SEPARATOR;
use std::sync::Arc;

type TestFn = Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

/// A named test body.
#[derive(Clone)]
pub struct TestFunction {
    name: String,
    func: TestFn,
    line: Option<usize>,
    marks: Option<MarkAttr>,
}

impl TestFunction {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
            line: None,
            marks: None,
        }
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    /// Replace the attached-mark attribute, e.g. with one read from
    /// external metadata.
    pub fn with_mark_attr(mut self, attr: MarkAttr) -> Self {
        self.marks = Some(attr);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn line(&self) -> Option<usize> {
        self.line
    }

    pub fn call(&self) -> anyhow::Result<()> {
        (self.func)()
    }
}

impl fmt::Debug for TestFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestFunction")
            .field("name", &self.name)
            .field("line", &self.line)
            .field("marks", &self.marks)
            .finish_non_exhaustive()
    }
}

impl Markable for TestFunction {
    fn target_name(&self) -> &str {
        &self.name
    }

    fn mark_attr(&self) -> Option<&MarkAttr> {
        self.marks.as_ref()
    }

    fn set_mark_attr(&mut self, attr: MarkAttr) {
        self.marks = Some(attr);
    }
}

/// A named group of tests sharing markers.
#[derive(Debug, Clone)]
pub struct TestSuite {
    name: String,
    tests: Vec<TestFunction>,
    marks: Option<MarkAttr>,
}

impl TestSuite {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tests: Vec::new(),
            marks: None,
        }
    }

    /// A suite that inherits this one's tests and markers.
    ///
    /// The marker sequence is shared until either suite is marked again.
    pub fn derive(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tests: self.tests.clone(),
            marks: self.marks.clone(),
        }
    }

    pub fn with_test(mut self, test: TestFunction) -> Self {
        self.tests.push(test);
        self
    }

    pub fn with_mark_attr(mut self, attr: MarkAttr) -> Self {
        self.marks = Some(attr);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tests(&self) -> &[TestFunction] {
        &self.tests
    }
}

impl Markable for TestSuite {
    fn target_name(&self) -> &str {
        &self.name
    }

    fn mark_attr(&self) -> Option<&MarkAttr> {
        self.marks.as_ref()
    }

    fn set_mark_attr(&mut self, attr: MarkAttr) {
        self.marks = Some(attr);
    }
}

#[derive(Debug, Clone)]
pub enum TestDef {
    Function(TestFunction),
    Suite(TestSuite),
}

impl From<TestFunction> for TestDef {
    fn from(test: TestFunction) -> Self {
        TestDef::Function(test)
    }
}

impl From<TestSuite> for TestDef {
    fn from(suite: TestSuite) -> Self {
        TestDef::Suite(suite)
    }
}

/// Test definitions per file, in definition order.
///
/// Files are keyed by their path relative to the rootdir, with `/`
/// separators.
#[derive(Debug, Clone, Default)]
pub struct TestRegistry {
    files: BTreeMap<String, Vec<TestDef>>,
}

impl TestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, file: &str, def: impl Into<TestDef>) -> &mut Self {
        self.files.entry(file_key(file)).or_default().push(def.into());
        self
    }

    /// Definitions registered for `file`; empty when there are none.
    pub fn defs(&self, file: &str) -> &[TestDef] {
        self.files
            .get(&file_key(file))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }
}

fn file_key(file: &str) -> String {
    let key = normalize_separators(file, MAIN_SEPARATOR);
    key.trim_start_matches("./").to_string()
}
