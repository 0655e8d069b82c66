//! Import discovery
//!
//! Starting from a package, the resolver asks the toolchain for its direct
//! imports, drops standard packages, walks into the package's own
//! sub-packages and collapses every other import to its repository root.
//! The result is the set of external repositories the package depends on.
//!
//! # Examples
//!
//! ```no_run
//! use vgo::graph::{Graph, Workspace};
//! use vgo::{GoList, ImportResolver, NativePackages};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let graph = Graph::new(".", Workspace::vendored(".", "/home/me/go"));
//! let native = NativePackages::scan("/usr/local/go")?;
//! let golist = GoList::default();
//!
//! let resolver = ImportResolver::new(&graph, &golist, &native);
//! for name in resolver.resolve_imports(graph.root())? {
//!     println!("{}", name);
//! }
//! # Ok(())
//! # }
//! ```

use crate::graph::{Graph, NodeId};
use crate::introspect::PackageIntrospector;
use crate::native::NativePackages;
use crate::Result;
use std::collections::{BTreeSet, HashSet, VecDeque};

/// Default number of import path segments in a repository root
pub const DEFAULT_REPO_ROOT_DEPTH: usize = 3;

/// Collapse an import path to the repository that provides it.
///
/// Anything up to the last `/vendor/` segment is dropped first, so a
/// vendored copy of a package maps to the same repository as the original.
/// The remainder is truncated to `depth` path segments.
///
/// ```
/// use vgo::resolver::repo_name;
///
/// assert_eq!(repo_name("github.com/a/b/pkg/sub", 3), "github.com/a/b");
/// assert_eq!(repo_name("github.com/a/b/vendor/golang.org/x/net/html", 3), "golang.org/x/net");
/// ```
pub fn repo_name(import_path: &str, depth: usize) -> String {
    let unvendored = import_path
        .rsplit("/vendor/")
        .next()
        .unwrap_or(import_path);
    let unvendored = unvendored.strip_prefix("vendor/").unwrap_or(unvendored);

    unvendored
        .split('/')
        .filter(|s| !s.is_empty())
        .take(depth.max(1))
        .collect::<Vec<_>>()
        .join("/")
}

/// Discovers the external repositories a node depends on
pub struct ImportResolver<'a> {
    graph: &'a Graph,
    introspector: &'a dyn PackageIntrospector,
    native: &'a NativePackages,
    repo_root_depth: usize,
    include_test_imports: bool,
}

impl<'a> ImportResolver<'a> {
    pub fn new(
        graph: &'a Graph,
        introspector: &'a dyn PackageIntrospector,
        native: &'a NativePackages,
    ) -> Self {
        Self {
            graph,
            introspector,
            native,
            repo_root_depth: DEFAULT_REPO_ROOT_DEPTH,
            include_test_imports: false,
        }
    }

    pub fn with_repo_root_depth(mut self, depth: usize) -> Self {
        self.repo_root_depth = depth.max(1);
        self
    }

    /// Follow test-only imports of the project root
    pub fn with_test_imports(mut self, include: bool) -> Self {
        self.include_test_imports = include;
        self
    }

    pub fn graph(&self) -> &'a Graph {
        self.graph
    }

    /// Collapse an import path with this resolver's depth
    pub fn repo_name(&self, import_path: &str) -> String {
        repo_name(import_path, self.repo_root_depth)
    }

    /// The external repositories the node's packages import.
    ///
    /// Fails only if the node's own package cannot be listed. Sub-packages
    /// that cannot be listed (typically not fetched yet) are skipped.
    pub fn resolve_imports(&self, id: NodeId) -> Result<BTreeSet<String>> {
        let dir = self.graph.workspace().project_dir.clone();
        let query = self.graph.fully_qualified_name(id);
        let info = self.introspector.list(&query, &dir)?;

        // The toolchain may rewrite the path (vendoring, relative paths)
        let own = self.repo_name(&info.import_path);

        let mut pending: Vec<String> = info.imports.clone();
        if self.include_test_imports && self.graph.is_root(id) {
            pending.extend(info.all_test_imports().cloned());
        }

        let mut visited = HashSet::from([info.import_path.clone()]);
        let mut found = BTreeSet::new();

        while let Some(import) = pending.pop() {
            if import.starts_with('.') || self.native.is_native(&import) {
                continue;
            }
            if !visited.insert(import.clone()) {
                continue;
            }

            let name = self.repo_name(&import);
            if name.is_empty() {
                continue;
            }

            if name == own {
                match self.introspector.list(&import, &dir) {
                    Ok(sub) => pending.extend(sub.imports),
                    Err(e) => {
                        tracing::debug!(import = %import, error = %e, "skipping sub-package");
                    }
                }
                continue;
            }

            found.insert(name);
        }

        Ok(found)
    }

    /// Resolve the node's imports and link each repository as a dependency.
    ///
    /// A repository already known to the node or one of its ancestors is
    /// reused; otherwise the registry returns (or creates) the shared node.
    /// Returns the node's discovered dependencies.
    pub fn discover(&self, id: NodeId) -> Result<Vec<NodeId>> {
        let names = self.resolve_imports(id)?;
        let own_name = self.graph.name(id);
        let mut children = Vec::with_capacity(names.len());

        for name in names {
            if name == own_name {
                continue;
            }
            let child = match self.graph.find(id, &name) {
                Some(existing) => existing,
                None => self.graph.insert_or_get(&name, id).0,
            };
            if self.graph.is_root(child) {
                continue;
            }
            self.graph.add_dependency(id, child);
            children.push(child);
        }

        tracing::debug!(
            name = %self.graph.node(id),
            count = children.len(),
            "discovered dependencies"
        );

        Ok(children)
    }

    /// Discover the whole graph reachable from `id` without installing
    /// anything.
    ///
    /// Only packages already on disk can be listed; others end up as leaf
    /// nodes. Nodes that own a manifest keep the dependencies it declared.
    /// Returns the number of nodes visited.
    pub fn discover_tree(&self, id: NodeId) -> Result<usize> {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([id]);

        while let Some(current) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }

            let trusted = current != id && self.graph.node(current).read().has_manifest;
            if trusted {
                queue.extend(self.graph.dependencies(current));
                continue;
            }

            match self.discover(current) {
                Ok(children) => queue.extend(children),
                Err(e) if current == id => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        name = %self.graph.node(current),
                        error = %e,
                        "could not list dependency, skipping its imports"
                    );
                }
            }
        }

        Ok(visited.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repo_root_truncation() {
        assert_eq!(repo_name("github.com/a/b/pkg/subpkg", 3), "github.com/a/b");
        assert_eq!(repo_name("github.com/a/b", 3), "github.com/a/b");
        assert_eq!(repo_name("gopkg.in/yaml.v2", 3), "gopkg.in/yaml.v2");
    }

    #[test]
    fn test_vendor_prefix_stripping() {
        assert_eq!(
            repo_name("host/org/repo/vendor/host2/org2/repo2/sub", 3),
            "host2/org2/repo2"
        );
        assert_eq!(
            repo_name("a/b/c/vendor/d/e/f/vendor/g/h/i/j", 3),
            "g/h/i"
        );
        assert_eq!(repo_name("vendor/golang.org/x/net/dns", 3), "golang.org/x/net");
    }

    #[test]
    fn test_configurable_depth() {
        assert_eq!(repo_name("example.com/a/b/c", 2), "example.com/a");
        assert_eq!(repo_name("example.com/a/b/c", 0), "example.com");
    }

    #[test]
    fn test_empty_segments_are_ignored() {
        assert_eq!(repo_name("github.com//a/b/c", 3), "github.com/a/b");
        assert_eq!(repo_name("", 3), "");
    }
}
