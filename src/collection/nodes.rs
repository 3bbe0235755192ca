//! Node tree: the common node state and the `Collector`/`Item` roles.
//!
//! Every node keeps an `Rc` to its parent collector; parents never own their
//! children, which are produced fresh by each `collect()` call. A node's
//! `nodeid` is fixed at construction:
//!
//! - an explicit nodeid wins;
//! - otherwise it is `parent.nodeid + "::" + name`;
//! - a node named `"()"` shares its parent's nodeid.
//!
//! File-based nodes use `/`-separated paths relative to the rootdir instead.

use super::error::CollectionResult;
use super::session::SessionState;
use super::types::{Child, Location};
use crate::config::Config;
use crate::error::ConstructionError;
use crate::mark::Mark;
use crate::utils::{basename, relative_id};
use std::fmt;
use std::path::Path;
use std::rc::Rc;

/// Name of the transparent node that does not extend its parent's nodeid.
pub const INSTANCE_NAME: &str = "()";

/// Optional construction arguments for the `from_parent` factories.
///
/// `config` and `session` exist only so that passing them can be rejected:
/// nodes built from a parent always inherit both.
#[derive(Debug, Default, Clone)]
pub struct NodeArgs {
    pub nodeid: Option<String>,
    pub config: Option<Rc<Config>>,
    pub session: Option<Rc<SessionState>>,
    pub markers: Vec<Mark>,
}

impl NodeArgs {
    pub fn nodeid(mut self, nodeid: impl Into<String>) -> Self {
        self.nodeid = Some(nodeid.into());
        self
    }

    pub fn markers(mut self, markers: Vec<Mark>) -> Self {
        self.markers = markers;
        self
    }

    fn reject_inherited(&self) -> Result<(), ConstructionError> {
        if self.config.is_some() {
            return Err(ConstructionError::InheritedArgument("config"));
        }
        if self.session.is_some() {
            return Err(ConstructionError::InheritedArgument("session"));
        }
        Ok(())
    }
}

/// State shared by every node in the tree.
pub struct NodeBase {
    name: String,
    parent: Option<Rc<dyn Collector>>,
    nodeid: String,
    own_markers: Vec<Mark>,
    config: Rc<Config>,
    session: Rc<SessionState>,
}

impl NodeBase {
    /// Public constructor: everything not named here is inherited from `parent`.
    pub fn from_parent(
        parent: Rc<dyn Collector>,
        name: impl Into<String>,
        args: NodeArgs,
    ) -> Result<Self, ConstructionError> {
        args.reject_inherited()?;
        Self::create(name.into(), Some(parent), None, None, args.nodeid, args.markers)
    }

    /// Public constructor for nodes backed by a filesystem path.
    pub fn file_from_parent(
        parent: Rc<dyn Collector>,
        path: &Path,
        args: NodeArgs,
    ) -> Result<Self, ConstructionError> {
        args.reject_inherited()?;
        Self::create_file(path, Some(parent), None, None, args.nodeid, args.markers)
    }

    pub(crate) fn create(
        name: String,
        parent: Option<Rc<dyn Collector>>,
        config: Option<Rc<Config>>,
        session: Option<Rc<SessionState>>,
        nodeid: Option<String>,
        own_markers: Vec<Mark>,
    ) -> Result<Self, ConstructionError> {
        let nodeid = match (nodeid, &parent) {
            (Some(nodeid), _) => nodeid,
            (None, Some(parent)) if name == INSTANCE_NAME => parent.nodeid().to_string(),
            (None, Some(parent)) => format!("{}::{}", parent.nodeid(), name),
            (None, None) => return Err(ConstructionError::MissingParentOrNodeid),
        };

        let config = match (config, &parent) {
            (Some(config), _) => config,
            (None, Some(parent)) => parent.config().clone(),
            (None, None) => return Err(ConstructionError::MissingInherited("config")),
        };
        let session = match (session, &parent) {
            (Some(session), _) => session,
            (None, Some(parent)) => parent.session().clone(),
            (None, None) => return Err(ConstructionError::MissingInherited("session")),
        };

        Ok(Self {
            name,
            parent,
            nodeid,
            own_markers,
            config,
            session,
        })
    }

    /// Path identity: the name is the path relative to the parent's path
    /// (or the base name without one), the default nodeid the path relative
    /// to the rootdir. Both use `/` separators.
    pub(crate) fn create_file(
        path: &Path,
        parent: Option<Rc<dyn Collector>>,
        config: Option<Rc<Config>>,
        session: Option<Rc<SessionState>>,
        nodeid: Option<String>,
        own_markers: Vec<Mark>,
    ) -> Result<Self, ConstructionError> {
        let name = match parent.as_ref().and_then(|p| p.path()) {
            Some(parent_path) => relative_id(path, parent_path),
            None => basename(path),
        };

        let nodeid = match nodeid {
            Some(nodeid) => nodeid,
            None => {
                let session = session
                    .as_ref()
                    .or_else(|| parent.as_ref().map(|p| p.session()))
                    .ok_or(ConstructionError::MissingInherited("session"))?;
                relative_id(path, &session.config().rootdir)
            }
        };

        Self::create(name, parent, config, session, Some(nodeid), own_markers)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn nodeid(&self) -> &str {
        &self.nodeid
    }

    pub fn parent(&self) -> Option<&Rc<dyn Collector>> {
        self.parent.as_ref()
    }

    pub fn own_markers(&self) -> &[Mark] {
        &self.own_markers
    }

    pub fn config(&self) -> &Rc<Config> {
        &self.config
    }

    pub fn session(&self) -> &Rc<SessionState> {
        &self.session
    }

    /// This node and its ancestors, closest first.
    pub fn ancestors<'a>(&'a self) -> impl Iterator<Item = &'a NodeBase> + 'a {
        std::iter::successors(Some(self), |base: &&'a NodeBase| {
            let base: &'a NodeBase = *base;
            base.parent.as_deref().map(|p| p.base())
        })
    }
}

impl fmt::Debug for NodeBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeBase")
            .field("name", &self.name)
            .field("nodeid", &self.nodeid)
            .field("own_markers", &self.own_markers)
            .finish_non_exhaustive()
    }
}

/// A unit of the collection tree.
pub trait Node: fmt::Debug {
    fn base(&self) -> &NodeBase;

    fn name(&self) -> &str {
        self.base().name()
    }

    fn nodeid(&self) -> &str {
        self.base().nodeid()
    }

    fn parent(&self) -> Option<&Rc<dyn Collector>> {
        self.base().parent()
    }

    fn config(&self) -> &Rc<Config> {
        self.base().config()
    }

    fn session(&self) -> &Rc<SessionState> {
        self.base().session()
    }

    fn own_markers(&self) -> &[Mark] {
        self.base().own_markers()
    }

    /// Filesystem path of this node, inherited from the closest file node.
    fn path(&self) -> Option<&Path> {
        self.parent().and_then(|p| p.path())
    }

    /// Markers of this node and its ancestors, closest first, optionally
    /// filtered by name.
    fn iter_markers(&self, name: Option<&str>) -> Vec<&Mark> {
        self.base()
            .ancestors()
            .flat_map(|base| base.own_markers().iter())
            .filter(|mark| name.map_or(true, |n| mark.name() == n))
            .collect()
    }

    fn get_closest_marker(&self, name: &str) -> Option<&Mark> {
        self.iter_markers(Some(name)).into_iter().next()
    }

    /// Root-first chain of nodes ending in this one.
    fn listchain(&self) -> Vec<&NodeBase> {
        let mut chain: Vec<&NodeBase> = self.base().ancestors().collect();
        chain.reverse();
        chain
    }
}

/// A node that produces child nodes.
pub trait Collector: Node {
    /// The immediate children of this node. Expanding them further is up to
    /// the caller.
    fn collect(self: Rc<Self>) -> CollectionResult<Vec<Child>>;
}

/// A leaf node: one executable test.
pub trait Item: Node {
    fn setup(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn runtest(&self) -> anyhow::Result<()>;

    fn teardown(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn location(&self) -> Location {
        Location {
            path: self.path().map(Path::to_path_buf).unwrap_or_default(),
            line: None,
            name: self.name().to_string(),
        }
    }
}
