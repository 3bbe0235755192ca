//! Session: the root of the collection tree.
//!
//! This module implements the collection entry point, including:
//! - Parallel argument resolution
//! - Depth-first expansion of collectors into items
//! - Marker-based deselection

use super::collectors::{Directory, Module};
use super::error::{CollectionError, CollectionResult};
use super::nodes::{Collector, Item, Node, NodeArgs, NodeBase, INSTANCE_NAME};
use super::registry::TestRegistry;
use super::report::{collect_one_node, CollectReport, Report};
use super::types::Child;
use crate::config::Config;
use crate::mark::MarkExpression;
use rayon::prelude::*;
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Run-wide state every node can reach through [`Node::session`].
///
/// Counters are updated from the single driving thread only.
pub struct SessionState {
    config: Rc<Config>,
    registry: TestRegistry,
    markexpr: Option<MarkExpression>,
    startdir: PathBuf,
    tests_collected: Cell<usize>,
    tests_failed: Cell<usize>,
    should_stop: Cell<bool>,
    should_fail: Cell<bool>,
    deselected: RefCell<Vec<String>>,
    collect_errors: RefCell<Vec<CollectReport>>,
}

impl SessionState {
    pub fn new(config: Rc<Config>, registry: TestRegistry, markexpr: Option<MarkExpression>) -> Self {
        let startdir = config.invocation_dir.clone();
        Self {
            config,
            registry,
            markexpr,
            startdir,
            tests_collected: Cell::new(0),
            tests_failed: Cell::new(0),
            should_stop: Cell::new(false),
            should_fail: Cell::new(false),
            deselected: RefCell::new(Vec::new()),
            collect_errors: RefCell::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &Rc<Config> {
        &self.config
    }

    pub fn registry(&self) -> &TestRegistry {
        &self.registry
    }

    pub fn startdir(&self) -> &Path {
        &self.startdir
    }

    pub fn tests_collected(&self) -> usize {
        self.tests_collected.get()
    }

    pub fn tests_failed(&self) -> usize {
        self.tests_failed.get()
    }

    pub fn should_stop(&self) -> bool {
        self.should_stop.get()
    }

    pub fn set_should_stop(&self, value: bool) {
        self.should_stop.set(value);
    }

    pub fn should_fail(&self) -> bool {
        self.should_fail.get()
    }

    pub fn set_should_fail(&self, value: bool) {
        self.should_fail.set(value);
    }

    /// Node ids removed by the mark expression during the last collection.
    pub fn deselected(&self) -> Vec<String> {
        self.deselected.borrow().clone()
    }

    /// Node ids and messages of collectors that failed to collect.
    pub fn collect_errors(&self) -> Vec<(String, String)> {
        self.collect_errors
            .borrow()
            .iter()
            .map(|r| (r.nodeid.clone(), r.longrepr.clone().unwrap_or_default()))
            .collect()
    }

    /// Count a failed report. Collection and test reports count alike.
    pub fn runtest_logreport(&self, report: &dyn Report) {
        if report.failed() {
            self.tests_failed.set(self.tests_failed.get() + 1);
        }
    }

    pub fn collectreport(&self, report: &dyn Report) {
        self.runtest_logreport(report);
    }
}

impl fmt::Debug for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionState")
            .field("rootdir", &self.config.rootdir)
            .field("startdir", &self.startdir)
            .field("tests_collected", &self.tests_collected.get())
            .field("tests_failed", &self.tests_failed.get())
            .field("should_stop", &self.should_stop.get())
            .field("should_fail", &self.should_fail.get())
            .finish_non_exhaustive()
    }
}

/// A collection argument that matched nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotFound {
    pub arg: String,
    pub reason: String,
}

/// A collection argument split into its path and in-file names.
#[derive(Debug, Clone)]
struct CollectionArg {
    arg: String,
    path: PathBuf,
    names: Vec<String>,
}

fn resolve_arg(invocation_dir: &Path, arg: &str) -> Result<CollectionArg, NotFound> {
    let mut parts = arg.split("::");
    let path_part = parts.next().unwrap_or_default();
    let names: Vec<String> = parts.map(str::to_string).collect();

    let path = invocation_dir.join(path_part);
    if !path.exists() {
        return Err(NotFound {
            arg: arg.to_string(),
            reason: format!("file or directory not found: {path_part}"),
        });
    }

    let path = path.canonicalize().map_err(|e| NotFound {
        arg: arg.to_string(),
        reason: format!("cannot resolve {path_part}: {e}"),
    })?;

    Ok(CollectionArg {
        arg: arg.to_string(),
        path,
        names,
    })
}

/// Root of the collection tree
#[derive(Debug)]
pub struct Session {
    base: NodeBase,
    path: PathBuf,
}

impl Session {
    pub fn from_config(config: Config, registry: TestRegistry) -> CollectionResult<Rc<Self>> {
        let markexpr = config
            .markexpr
            .as_deref()
            .map(MarkExpression::parse)
            .transpose()?;

        let path = config.rootdir.canonicalize().unwrap_or_else(|_| config.rootdir.clone());
        let config = Rc::new(Config {
            rootdir: path.clone(),
            ..config
        });
        let state = Rc::new(SessionState::new(config.clone(), registry, markexpr));

        let base = NodeBase::create_file(
            &path,
            None,
            Some(config),
            Some(state),
            Some(String::new()),
            vec![],
        )?;

        Ok(Rc::new(Self { base, path }))
    }

    pub fn state(&self) -> &Rc<SessionState> {
        self.session()
    }

    pub fn tests_collected(&self) -> usize {
        self.state().tests_collected()
    }

    pub fn tests_failed(&self) -> usize {
        self.state().tests_failed()
    }

    pub fn should_stop(&self) -> bool {
        self.state().should_stop()
    }

    pub fn should_fail(&self) -> bool {
        self.state().should_fail()
    }

    pub fn startdir(&self) -> &Path {
        self.state().startdir()
    }

    pub fn runtest_logreport(&self, report: &dyn Report) {
        self.state().runtest_logreport(report);
    }

    pub fn collectreport(&self, report: &dyn Report) {
        self.state().collectreport(report);
    }

    /// Resolve `args` (the configured arguments when `None`) and expand
    /// them into items, depth first and in argument order.
    ///
    /// Arguments that resolve to nothing are returned separately; they do
    /// not stop collection of the others. A node that cannot be constructed,
    /// e.g. because of an invalid mark, aborts collection.
    pub fn perform_collect(
        self: &Rc<Self>,
        args: Option<&[String]>,
    ) -> CollectionResult<(Vec<Rc<dyn Item>>, Vec<NotFound>)> {
        let args = match args {
            Some(args) => args.to_vec(),
            None => self.default_args(),
        };

        let (initial, notfound) = self.collect_initial(&args)?;

        let mut items = Vec::new();
        for node in initial {
            self.genitems(node, &mut items)?;
        }

        let items = self.deselect(items);
        self.state().tests_collected.set(items.len());

        for nf in &notfound {
            log::warn!("{}: {}", nf.arg, nf.reason);
        }
        log::debug!(
            "collected {} items, {} deselected, {} not found",
            items.len(),
            self.state().deselected.borrow().len(),
            notfound.len()
        );

        Ok((items, notfound))
    }

    fn default_args(&self) -> Vec<String> {
        let config = self.config();
        if !config.args.is_empty() {
            config.args.clone()
        } else if !config.testpaths.is_empty() {
            config
                .testpaths
                .iter()
                .map(|p| config.rootdir.join(p).to_string_lossy().into_owned())
                .collect()
        } else {
            vec![config.rootdir.to_string_lossy().into_owned()]
        }
    }

    /// Starting nodes for `args`, plus the arguments that matched nothing.
    fn collect_initial(
        self: &Rc<Self>,
        args: &[String],
    ) -> CollectionResult<(Vec<Child>, Vec<NotFound>)> {
        let invocation_dir = self.config().invocation_dir.clone();

        let resolved: Vec<Result<CollectionArg, NotFound>> = args
            .par_iter()
            .map(|arg| resolve_arg(&invocation_dir, arg))
            .collect();

        let mut seen = HashSet::new();
        let mut initial = Vec::new();
        let mut notfound = Vec::new();

        for result in resolved {
            let arg = match result {
                Ok(arg) => arg,
                Err(nf) => {
                    notfound.push(nf);
                    continue;
                }
            };

            if !seen.insert((arg.path.clone(), arg.names.clone())) {
                log::debug!("skipping duplicate argument {}", arg.arg);
                continue;
            }

            let start = match self.start_node(&arg.path) {
                Ok(start) => start,
                Err(e @ CollectionError::Construction(_)) => return Err(e),
                Err(e) => {
                    notfound.push(NotFound {
                        arg: arg.arg,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            if arg.names.is_empty() {
                initial.push(start);
                continue;
            }

            let matched = self.matchnodes(vec![start], &arg.names)?;
            if matched.is_empty() {
                notfound.push(NotFound {
                    reason: format!("no match for {:?} in {}", arg.names.join("::"), arg.path.display()),
                    arg: arg.arg,
                });
            } else {
                initial.extend(matched);
            }
        }

        Ok((initial, notfound))
    }

    fn start_node(self: &Rc<Self>, path: &Path) -> CollectionResult<Child> {
        let parent: Rc<dyn Collector> = self.clone();
        if path == self.path {
            // the rootdir itself shares the session's empty nodeid
            let args = NodeArgs::default().nodeid("");
            Ok(Child::Collector(Directory::from_parent(parent, path, args)?))
        } else if path.is_dir() {
            Ok(Child::Collector(Directory::from_parent(parent, path, NodeArgs::default())?))
        } else if path.is_file() {
            // explicitly named files are collected whatever their name
            Ok(Child::Collector(Module::from_parent(parent, path, NodeArgs::default())?))
        } else {
            Err(CollectionError::NotCollectable(format!(
                "{} is neither a file nor a directory",
                path.display()
            )))
        }
    }

    /// Narrow `nodes` down one name at a time. `"()"` nodes are looked
    /// through.
    fn matchnodes(&self, nodes: Vec<Child>, names: &[String]) -> CollectionResult<Vec<Child>> {
        let mut current = nodes;
        for name in names {
            let mut next = Vec::new();
            for node in &current {
                for child in self.expand(node)? {
                    if child.name() == name {
                        next.push(child);
                    }
                }
            }
            current = next;
            if current.is_empty() {
                break;
            }
        }
        Ok(current)
    }

    fn expand(&self, node: &Child) -> CollectionResult<Vec<Child>> {
        let Child::Collector(collector) = node else {
            return Ok(Vec::new());
        };

        let mut children = Vec::new();
        for child in self.collect_checked(collector)? {
            if child.name() == INSTANCE_NAME {
                children.extend(self.expand(&child)?);
            } else {
                children.push(child);
            }
        }
        Ok(children)
    }

    /// Children of `collector`; a failed collection is recorded and yields none.
    fn collect_checked(&self, collector: &Rc<dyn Collector>) -> CollectionResult<Vec<Child>> {
        let report = collect_one_node(collector)?;
        if report.passed() {
            return Ok(report.result);
        }
        if report.failed() {
            log::debug!("collection failed for {}", report.nodeid);
            self.collectreport(&report);
            self.state().collect_errors.borrow_mut().push(report);
        }
        Ok(Vec::new())
    }

    fn genitems(&self, node: Child, items: &mut Vec<Rc<dyn Item>>) -> CollectionResult<()> {
        match node {
            Child::Item(item) => items.push(item),
            Child::Collector(collector) => {
                for child in self.collect_checked(&collector)? {
                    self.genitems(child, items)?;
                }
            }
        }
        Ok(())
    }

    fn deselect(&self, items: Vec<Rc<dyn Item>>) -> Vec<Rc<dyn Item>> {
        let state = self.state();
        let Some(expr) = &state.markexpr else {
            return items;
        };

        let mut deselected = state.deselected.borrow_mut();
        deselected.clear();

        items
            .into_iter()
            .filter(|item| {
                let names: Vec<&str> = item.iter_markers(None).iter().map(|m| m.name()).collect();
                let keep = expr.matches(&names);
                if !keep {
                    log::debug!("deselected {} by -m {:?}", item.nodeid(), expr.source());
                    deselected.push(item.nodeid().to_string());
                }
                keep
            })
            .collect()
    }
}

impl Node for Session {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn path(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

impl Collector for Session {
    /// The starting nodes for the configured arguments.
    fn collect(self: Rc<Self>) -> CollectionResult<Vec<Child>> {
        let args = self.default_args();
        let (initial, _) = self.collect_initial(&args)?;
        Ok(initial)
    }
}
