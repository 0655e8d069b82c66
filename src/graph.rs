//! Repository node graph
//!
//! A [`Graph`] is the registry for one resolution run. It owns every
//! [`RepoNode`] and hands out [`NodeId`] handles; dependency edges and
//! parent links are stored as handles, so shared (diamond) dependencies are
//! one node with several incoming edges and no node owns another.
//!
//! The registry maps a canonical repository name to its node. Asking for a
//! name twice returns the same node, which is what collapses the import
//! graph into a DAG.
//!
//! # Examples
//!
//! ```
//! use vgo::graph::{Graph, Workspace};
//!
//! let graph = Graph::new("github.com/me/app", Workspace::vendored("/src/app", "/go"));
//! let root = graph.root();
//!
//! let (errors, created) = graph.insert_or_get("github.com/pkg/errors", root);
//! assert!(created);
//! graph.add_dependency(root, errors);
//!
//! let (again, created) = graph.insert_or_get("github.com/pkg/errors", root);
//! assert!(!created);
//! assert_eq!(errors, again);
//! ```

use crate::vcs::{ResolvedBackend, VcsKind};
use crate::Version;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Handle to a node inside a [`Graph`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Where a node is in the install pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    /// Not yet claimed by the installer in this run
    Pending,
    Cloning,
    /// Working copy present, not yet switched to a reference
    Unversioned,
    CheckingOut,
    Pinned,
    /// Children came from the node's own manifest
    ResolvedManifest,
    /// Children are being discovered from its imports
    Rediscovering,
    InstallingDeps,
    Done,
    Failed,
    /// Not processed (dirty working copy or cancelled run)
    Skipped,
}

/// Mutable state of a node, guarded by the node's lock
#[derive(Debug, Clone)]
pub struct NodeState {
    /// Version requested by the user or a parent manifest
    pub requested_version: Version,

    /// Revision actually checked out; empty until first installed
    pub reference: String,

    /// Remote URL override
    pub url: Option<String>,

    /// Version control override
    pub vcs: Option<VcsKind>,

    pub dependencies: Vec<NodeId>,

    /// Back-reference used to climb towards the root; not an ownership edge
    pub parent: Option<NodeId>,

    /// Set once the node's own manifest was loaded successfully
    pub has_manifest: bool,

    pub installed: bool,

    pub status: NodeStatus,

    /// Backend selected for this node, memoized after first resolution
    pub backend: Option<ResolvedBackend>,
}

impl NodeState {
    fn new(parent: Option<NodeId>) -> Self {
        Self {
            requested_version: Version::none(),
            reference: String::new(),
            url: None,
            vcs: None,
            dependencies: Vec::new(),
            parent,
            has_manifest: false,
            installed: false,
            status: NodeStatus::Pending,
            backend: None,
        }
    }

    /// The version a checkout should target: the pinned reference if any,
    /// otherwise the requested version
    pub fn target_version(&self) -> Version {
        if self.reference.is_empty() {
            self.requested_version.clone()
        } else {
            Version::new(self.reference.clone())
        }
    }
}

/// One repository in the graph
#[derive(Debug)]
pub struct RepoNode {
    id: NodeId,
    name: String,
    state: RwLock<NodeState>,
}

impl RepoNode {
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Canonical repository name, the dedup key
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn read(&self) -> RwLockReadGuard<'_, NodeState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, NodeState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Display for RepoNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            f.write_str(".")
        } else {
            f.write_str(&self.name)
        }
    }
}

/// Filesystem context of a resolution run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    /// Project root; the root node lives here
    pub project_dir: PathBuf,
    /// Shared package root (`$GOPATH`)
    pub gopath: PathBuf,
    /// Install into `<project>/vendor` instead of `$GOPATH/src`
    pub vendor: bool,
}

impl Workspace {
    pub fn vendored<P: Into<PathBuf>, Q: Into<PathBuf>>(project_dir: P, gopath: Q) -> Self {
        Self {
            project_dir: project_dir.into(),
            gopath: gopath.into(),
            vendor: true,
        }
    }

    pub fn shared<P: Into<PathBuf>, Q: Into<PathBuf>>(project_dir: P, gopath: Q) -> Self {
        Self {
            project_dir: project_dir.into(),
            gopath: gopath.into(),
            vendor: false,
        }
    }
}

/// Registry of all nodes for one resolution run
#[derive(Debug)]
pub struct Graph {
    workspace: Workspace,
    nodes: RwLock<Vec<Arc<RepoNode>>>,
    by_name: RwLock<HashMap<String, NodeId>>,
}

impl Graph {
    /// Create a graph containing only the project root
    pub fn new<S: Into<String>>(root_name: S, workspace: Workspace) -> Self {
        let root_name = normalize_root_name(root_name.into());
        let root = Arc::new(RepoNode {
            id: NodeId(0),
            name: root_name.clone(),
            state: RwLock::new(NodeState::new(None)),
        });

        let mut by_name = HashMap::new();
        by_name.insert(root_name, NodeId(0));

        Self {
            workspace,
            nodes: RwLock::new(vec![root]),
            by_name: RwLock::new(by_name),
        }
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn is_root(&self, id: NodeId) -> bool {
        id == self.root()
    }

    pub fn node(&self, id: NodeId) -> Arc<RepoNode> {
        let nodes = self.nodes.read().unwrap_or_else(PoisonError::into_inner);
        nodes[id.0].clone()
    }

    pub fn name(&self, id: NodeId) -> String {
        self.node(id).name().to_string()
    }

    pub fn lookup(&self, name: &str) -> Option<NodeId> {
        let by_name = self.by_name.read().unwrap_or_else(PoisonError::into_inner);
        by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ids(&self) -> Vec<NodeId> {
        (0..self.len()).map(NodeId).collect()
    }

    /// Return the node registered under `name`, creating it with `parent`
    /// as its back-reference if it does not exist yet.
    ///
    /// The boolean is true when the node was created by this call.
    pub fn insert_or_get(&self, name: &str, parent: NodeId) -> (NodeId, bool) {
        let mut by_name = self.by_name.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(id) = by_name.get(name) {
            return (*id, false);
        }

        let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
        let id = NodeId(nodes.len());
        nodes.push(Arc::new(RepoNode {
            id,
            name: name.to_string(),
            state: RwLock::new(NodeState::new(Some(parent))),
        }));
        by_name.insert(name.to_string(), id);
        (id, true)
    }

    /// Add an edge from `parent` to `child`. No-op if the edge exists.
    ///
    /// Returns true when a new edge was added.
    pub fn add_dependency(&self, parent: NodeId, child: NodeId) -> bool {
        if parent == child {
            return false;
        }
        let node = self.node(parent);
        let mut state = node.write();
        if state.dependencies.contains(&child) {
            return false;
        }
        state.dependencies.push(child);
        true
    }

    /// Drop the edge from `parent` to the dependency called `name`
    pub fn remove_dependency(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        let child = self.lookup(name)?;
        let node = self.node(parent);
        let mut state = node.write();
        let before = state.dependencies.len();
        state.dependencies.retain(|d| *d != child);
        (state.dependencies.len() != before).then_some(child)
    }

    pub fn dependencies(&self, id: NodeId) -> Vec<NodeId> {
        self.node(id).read().dependencies.clone()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).read().parent
    }

    /// Link `id` under `parent` unless it already has a back-reference.
    /// The root never gets a parent.
    pub fn set_parent_if_unset(&self, id: NodeId, parent: NodeId) {
        if self.is_root(id) || id == parent {
            return;
        }
        let node = self.node(id);
        let mut state = node.write();
        if state.parent.is_none() {
            state.parent = Some(parent);
        }
    }

    /// Ancestors of `id`, nearest first, ending with the root
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut seen = HashSet::from([id]);
        let mut current = self.parent(id);
        while let Some(parent) = current {
            if !seen.insert(parent) {
                break;
            }
            out.push(parent);
            current = self.parent(parent);
        }
        out
    }

    /// Distance from the root
    pub fn depth(&self, id: NodeId) -> usize {
        self.ancestors(id).len()
    }

    /// Look for `name` among the dependencies of `id`, then among the
    /// dependencies of each ancestor. Lets a dependency reuse a version
    /// already resolved higher up in the tree.
    pub fn find(&self, id: NodeId, name: &str) -> Option<NodeId> {
        std::iter::once(id)
            .chain(self.ancestors(id))
            .find_map(|scope| {
                self.dependencies(scope)
                    .into_iter()
                    .find(|dep| self.node(*dep).name() == name)
            })
    }

    /// The import path the toolchain uses for the node.
    ///
    /// Vendored dependencies are namespaced under the root's vendor
    /// directory; this only affects placement, not the registry key.
    pub fn fully_qualified_name(&self, id: NodeId) -> String {
        let root = self.node(self.root());
        let root_fqn = if root.name().is_empty() {
            ".".to_string()
        } else {
            root.name().to_string()
        };

        if self.is_root(id) {
            return root_fqn;
        }

        let name = self.name(id);
        if self.workspace.vendor {
            format!("{}/vendor/{}", root_fqn, name)
        } else {
            name
        }
    }

    /// Where the node's working copy lives
    pub fn local_path(&self, id: NodeId) -> PathBuf {
        if self.is_root(id) {
            return self.workspace.project_dir.clone();
        }
        let name = self.name(id);
        if self.workspace.vendor {
            join_import_path(&self.workspace.project_dir.join("vendor"), &name)
        } else {
            join_import_path(&self.workspace.gopath.join("src"), &name)
        }
    }

    /// Other places an existing working copy of the node may be found:
    /// nested vendor directories of the node and its ancestors, then the
    /// shared package root.
    pub fn search_paths(&self, id: NodeId) -> Vec<PathBuf> {
        let name = self.name(id);
        let own = self.local_path(id);

        let mut paths = vec![join_import_path(&own.join("vendor"), &name)];
        for ancestor in self.ancestors(id) {
            let vendor = self.local_path(ancestor).join("vendor");
            paths.push(join_import_path(&vendor, &name));
        }
        paths.push(join_import_path(&self.workspace.gopath.join("src"), &name));

        let mut seen = HashSet::from([own]);
        paths.retain(|p| seen.insert(p.clone()));
        paths
    }

    /// Print the dependency tree, one node per line indented by depth.
    /// Nodes already printed elsewhere are marked and not expanded again.
    pub fn write_tree<W: Write>(&self, indent: &str, w: &mut W) -> io::Result<()> {
        let mut printed = HashSet::new();
        self.write_subtree(self.root(), indent, 0, &mut printed, w)
    }

    fn write_subtree<W: Write>(
        &self,
        id: NodeId,
        indent: &str,
        depth: usize,
        printed: &mut HashSet<NodeId>,
        w: &mut W,
    ) -> io::Result<()> {
        let node = self.node(id);
        let (reference, deps) = {
            let state = node.read();
            (state.reference.clone(), state.dependencies.clone())
        };

        let first = printed.insert(id);
        let mut line = format!("{}{}", indent.repeat(depth), node);
        if !reference.is_empty() {
            line.push_str(&format!(" @ {}", short_reference(&reference)));
        }
        if !first && !deps.is_empty() {
            line.push_str(" (*)");
        }
        writeln!(w, "{}", line)?;

        if first {
            for dep in deps {
                self.write_subtree(dep, indent, depth + 1, printed, w)?;
            }
        }
        Ok(())
    }
}

fn normalize_root_name(name: String) -> String {
    if name == "." {
        String::new()
    } else {
        name
    }
}

fn join_import_path(base: &Path, import_path: &str) -> PathBuf {
    import_path
        .split('/')
        .filter(|s| !s.is_empty())
        .fold(base.to_path_buf(), |path, segment| path.join(segment))
}

fn short_reference(reference: &str) -> &str {
    if reference.len() == 40 && reference.chars().all(|c| c.is_ascii_hexdigit()) {
        &reference[..12]
    } else {
        reference
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> Graph {
        Graph::new(
            "github.com/me/app",
            Workspace::vendored("/work/app", "/home/me/go"),
        )
    }

    #[test]
    fn test_root_is_registered() {
        let graph = graph();
        assert_eq!(graph.lookup("github.com/me/app"), Some(graph.root()));
        assert!(graph.parent(graph.root()).is_none());
        assert_eq!(graph.depth(graph.root()), 0);
    }

    #[test]
    fn test_dot_root_name_is_normalized() {
        let graph = Graph::new(".", Workspace::vendored("/work/app", "/go"));
        assert_eq!(graph.name(graph.root()), "");
        assert_eq!(graph.fully_qualified_name(graph.root()), ".");
        assert_eq!(graph.node(graph.root()).to_string(), ".");
    }

    #[test]
    fn test_diamond_shares_one_node() {
        let graph = graph();
        let root = graph.root();
        let (a, _) = graph.insert_or_get("github.com/x/a", root);
        let (b, _) = graph.insert_or_get("github.com/x/b", root);
        graph.add_dependency(root, a);
        graph.add_dependency(root, b);

        let (shared_from_a, created_a) = graph.insert_or_get("github.com/x/shared", a);
        let (shared_from_b, created_b) = graph.insert_or_get("github.com/x/shared", b);
        graph.add_dependency(a, shared_from_a);
        graph.add_dependency(b, shared_from_b);

        assert!(created_a);
        assert!(!created_b);
        assert_eq!(shared_from_a, shared_from_b);
        assert_eq!(graph.len(), 4);
        assert_eq!(graph.dependencies(a), vec![shared_from_a]);
        assert_eq!(graph.dependencies(b), vec![shared_from_a]);
        // first discoverer stays the parent
        assert_eq!(graph.parent(shared_from_a), Some(a));
    }

    #[test]
    fn test_add_dependency_is_idempotent() {
        let graph = graph();
        let root = graph.root();
        let (a, _) = graph.insert_or_get("github.com/x/a", root);

        assert!(graph.add_dependency(root, a));
        assert!(!graph.add_dependency(root, a));
        assert!(!graph.add_dependency(a, a));
        assert_eq!(graph.dependencies(root), vec![a]);
    }

    #[test]
    fn test_find_climbs_ancestors() {
        let graph = graph();
        let root = graph.root();
        let (a, _) = graph.insert_or_get("github.com/x/a", root);
        let (b, _) = graph.insert_or_get("github.com/x/b", root);
        graph.add_dependency(root, a);
        graph.add_dependency(root, b);
        let (c, _) = graph.insert_or_get("github.com/x/c", a);
        graph.add_dependency(a, c);

        assert_eq!(graph.find(c, "github.com/x/b"), Some(b));
        assert_eq!(graph.find(a, "github.com/x/c"), Some(c));
        assert_eq!(graph.find(b, "github.com/x/c"), None);
        assert_eq!(graph.find(c, "github.com/x/missing"), None);
    }

    #[test]
    fn test_remove_dependency() {
        let graph = graph();
        let root = graph.root();
        let (a, _) = graph.insert_or_get("github.com/x/a", root);
        graph.add_dependency(root, a);

        assert_eq!(graph.remove_dependency(root, "github.com/x/a"), Some(a));
        assert_eq!(graph.remove_dependency(root, "github.com/x/a"), None);
        assert!(graph.dependencies(root).is_empty());
    }

    #[test]
    fn test_vendored_paths() {
        let graph = graph();
        let root = graph.root();
        let (a, _) = graph.insert_or_get("github.com/x/a", root);

        assert_eq!(graph.local_path(root), PathBuf::from("/work/app"));
        assert_eq!(
            graph.local_path(a),
            PathBuf::from("/work/app/vendor/github.com/x/a")
        );
        assert_eq!(
            graph.fully_qualified_name(a),
            "github.com/me/app/vendor/github.com/x/a"
        );
        assert_eq!(
            graph.search_paths(a),
            vec![
                PathBuf::from("/work/app/vendor/github.com/x/a/vendor/github.com/x/a"),
                PathBuf::from("/home/me/go/src/github.com/x/a"),
            ]
        );
    }

    #[test]
    fn test_shared_paths() {
        let graph = Graph::new(
            "github.com/me/app",
            Workspace::shared("/work/app", "/home/me/go"),
        );
        let (a, _) = graph.insert_or_get("github.com/x/a", graph.root());

        assert_eq!(
            graph.local_path(a),
            PathBuf::from("/home/me/go/src/github.com/x/a")
        );
        assert_eq!(graph.fully_qualified_name(a), "github.com/x/a");
    }

    #[test]
    fn test_target_version_prefers_reference() {
        let mut state = NodeState::new(None);
        state.requested_version = Version::new("master");
        assert_eq!(state.target_version(), Version::new("master"));

        state.reference = "abc1234".to_string();
        assert_eq!(state.target_version(), Version::new("abc1234"));
    }

    #[test]
    fn test_write_tree_marks_shared_nodes() {
        let graph = graph();
        let root = graph.root();
        let (a, _) = graph.insert_or_get("github.com/x/a", root);
        let (b, _) = graph.insert_or_get("github.com/x/b", root);
        let (c, _) = graph.insert_or_get("github.com/x/c", a);
        graph.add_dependency(root, a);
        graph.add_dependency(root, b);
        graph.add_dependency(a, c);
        graph.add_dependency(b, a);

        let mut out = Vec::new();
        graph.write_tree("  ", &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert_eq!(
            text,
            "github.com/me/app\n  github.com/x/a\n    github.com/x/c\n  github.com/x/b\n    github.com/x/a (*)\n"
        );
    }
}
