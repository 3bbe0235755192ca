//! Concrete nodes: directories, test files, suites and test functions.

use super::error::{CollectionError, CollectionResult};
use super::nodes::{Collector, Item, Node, NodeArgs, NodeBase, INSTANCE_NAME};
use super::registry::{TestDef, TestFunction, TestSuite};
use super::types::{Child, Location};
use crate::mark::get_unpacked_marks;
use crate::outcomes::Skipped;
use crate::utils::{glob_match, relative_id};
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use walkdir::WalkDir;

/// A directory; collects sub-directories and matching test files.
#[derive(Debug)]
pub struct Directory {
    base: NodeBase,
    path: PathBuf,
}

impl Directory {
    pub fn from_parent(
        parent: Rc<dyn Collector>,
        path: &Path,
        args: NodeArgs,
    ) -> CollectionResult<Rc<Self>> {
        let base = NodeBase::file_from_parent(parent, path, args)?;
        Ok(Rc::new(Self {
            base,
            path: path.to_path_buf(),
        }))
    }
}

impl Node for Directory {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn path(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

impl Collector for Directory {
    fn collect(self: Rc<Self>) -> CollectionResult<Vec<Child>> {
        let config = self.config().clone();
        let parent: Rc<dyn Collector> = self.clone();
        let mut children = Vec::new();

        let entries = WalkDir::new(&self.path)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name();

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) if err.io_error().map(|e| e.kind()) == Some(ErrorKind::PermissionDenied) => {
                    log::debug!("skipping unreadable entry: {err}");
                    continue;
                }
                Err(err) => return Err(err.into()),
            };

            let path = entry.path();
            let name = entry.file_name().to_string_lossy();

            if path.is_dir() {
                if config.norecursedirs.iter().any(|p| glob_match(p, &name)) {
                    log::trace!("not recursing into {}", path.display());
                    continue;
                }
                let dir = Directory::from_parent(parent.clone(), path, NodeArgs::default())?;
                children.push(Child::Collector(dir));
            } else if path.is_file() && config.test_files.iter().any(|p| glob_match(p, &name)) {
                let module = Module::from_parent(parent.clone(), path, NodeArgs::default())?;
                children.push(Child::Collector(module));
            }
        }

        Ok(children)
    }
}

/// A test file; collects the functions and suites registered for it.
#[derive(Debug)]
pub struct Module {
    base: NodeBase,
    path: PathBuf,
}

impl Module {
    pub fn from_parent(
        parent: Rc<dyn Collector>,
        path: &Path,
        args: NodeArgs,
    ) -> CollectionResult<Rc<Self>> {
        let base = NodeBase::file_from_parent(parent, path, args)?;
        Ok(Rc::new(Self {
            base,
            path: path.to_path_buf(),
        }))
    }
}

impl Node for Module {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn path(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

impl Collector for Module {
    fn collect(self: Rc<Self>) -> CollectionResult<Vec<Child>> {
        if !self.path.is_file() {
            return Err(CollectionError::Io(std::io::Error::new(
                ErrorKind::NotFound,
                format!("{} is not a file", self.path.display()),
            )));
        }

        let session = self.session().clone();
        let key = relative_id(&self.path, &self.config().rootdir);
        let parent: Rc<dyn Collector> = self.clone();

        session
            .registry()
            .defs(&key)
            .iter()
            .map(|def| match def {
                TestDef::Function(test) => {
                    Function::from_parent(parent.clone(), test.clone(), NodeArgs::default())
                        .map(|f| Child::Item(f))
                }
                TestDef::Suite(suite) => {
                    Class::from_parent(parent.clone(), suite.clone(), NodeArgs::default())
                        .map(|c| Child::Collector(c))
                }
            })
            .collect()
    }
}

/// A test suite; its only child is the [`Instance`] holding its tests.
#[derive(Debug)]
pub struct Class {
    base: NodeBase,
    suite: TestSuite,
}

impl Class {
    pub fn from_parent(
        parent: Rc<dyn Collector>,
        suite: TestSuite,
        args: NodeArgs,
    ) -> CollectionResult<Rc<Self>> {
        let mut markers = args.markers.clone();
        markers.extend(get_unpacked_marks(&suite)?);
        let base = NodeBase::from_parent(parent, suite.name(), args.markers(markers))?;
        Ok(Rc::new(Self { base, suite }))
    }
}

impl Node for Class {
    fn base(&self) -> &NodeBase {
        &self.base
    }
}

impl Collector for Class {
    fn collect(self: Rc<Self>) -> CollectionResult<Vec<Child>> {
        let suite = self.suite.clone();
        let instance = Instance::from_parent(self, suite)?;
        Ok(vec![Child::Collector(instance)])
    }
}

/// The `"()"` node between a suite and its tests. It does not add a
/// segment to the nodeid.
#[derive(Debug)]
pub struct Instance {
    base: NodeBase,
    suite: TestSuite,
}

impl Instance {
    fn from_parent(parent: Rc<dyn Collector>, suite: TestSuite) -> CollectionResult<Rc<Self>> {
        let base = NodeBase::from_parent(parent, INSTANCE_NAME, NodeArgs::default())?;
        Ok(Rc::new(Self { base, suite }))
    }
}

impl Node for Instance {
    fn base(&self) -> &NodeBase {
        &self.base
    }
}

impl Collector for Instance {
    fn collect(self: Rc<Self>) -> CollectionResult<Vec<Child>> {
        let parent: Rc<dyn Collector> = self.clone();
        self.suite
            .tests()
            .iter()
            .map(|test| {
                Function::from_parent(parent.clone(), test.clone(), NodeArgs::default())
                    .map(|f| Child::Item(f))
            })
            .collect()
    }
}

/// A registered test function.
#[derive(Debug)]
pub struct Function {
    base: NodeBase,
    test: TestFunction,
}

impl Function {
    pub fn from_parent(
        parent: Rc<dyn Collector>,
        test: TestFunction,
        args: NodeArgs,
    ) -> CollectionResult<Rc<Self>> {
        let mut markers = args.markers.clone();
        markers.extend(get_unpacked_marks(&test)?);
        let base = NodeBase::from_parent(parent, test.name(), args.markers(markers))?;
        Ok(Rc::new(Self { base, test }))
    }

    fn skip_reason(&self) -> Option<String> {
        let mark = self.get_closest_marker("skip")?;
        let reason = mark
            .kwargs()
            .get("reason")
            .or_else(|| mark.args().first())
            .map(|value| match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_else(|| "unconditional skip".to_string());
        Some(reason)
    }
}

impl Node for Function {
    fn base(&self) -> &NodeBase {
        &self.base
    }
}

impl Item for Function {
    fn setup(&self) -> anyhow::Result<()> {
        match self.skip_reason() {
            Some(reason) => Err(Skipped::new(reason).into()),
            None => Ok(()),
        }
    }

    fn runtest(&self) -> anyhow::Result<()> {
        self.test.call()
    }

    fn location(&self) -> Location {
        // "Suite.test_name" inside a suite, the bare name otherwise
        let name = self
            .base
            .ancestors()
            .skip(1)
            .find(|b| b.name() == INSTANCE_NAME)
            .and_then(|instance| instance.parent())
            .map(|class| format!("{}.{}", class.name(), self.name()))
            .unwrap_or_else(|| self.name().to_string());

        Location {
            path: self.path().map(Path::to_path_buf).unwrap_or_default(),
            line: self.test.line(),
            name,
        }
    }
}
