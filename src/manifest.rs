//! Manifest handling for vgo.yaml
//!
//! The manifest is the persisted form of a node and its dependency tree. It
//! stores what was requested (`ver`) and what was resolved (`ref`) for every
//! dependency so the next run checks out exactly the same revisions.
//!
//! A manifest is a tree view of the graph. Parent links are not written;
//! they are re-established on load. A nested dependency that owns its own
//! vgo.yaml is written without its dependency list, since its own file is
//! authoritative for that subtree.
//!
//! ```yaml
//! name: github.com/me/app
//! deps:
//! - name: github.com/pkg/errors
//!   ver: v0.9.1
//!   ref: 645ef00459ed84a119197bfb8d8205042c6df63d
//! - name: gopkg.in/yaml.v2
//!   ver: v2
//!   ref: 7649d4548cb53a614db133b2a8ac1f31859dda8c
//! ```
//!
//! # Examples
//!
//! ```no_run
//! use vgo::graph::{Graph, Workspace};
//! use vgo::manifest;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let graph = Graph::new(".", Workspace::vendored(".", "/home/me/go"));
//! manifest::load(&graph, graph.root(), "vgo.yaml")?;
//! manifest::save(&graph, graph.root(), "vgo.yaml")?;
//! # Ok(())
//! # }
//! ```

use crate::graph::{Graph, NodeId};
use crate::vcs::VcsKind;
use crate::{Error, Result, Version};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// The manifest filename
pub const MANIFEST_FILE: &str = "vgo.yaml";

/// One node of a persisted manifest
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Canonical repository name (empty for an unnamed project root)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    /// Requested version
    #[serde(default, rename = "ver", skip_serializing_if = "Version::is_empty")]
    pub version: Version,

    /// Resolved revision
    #[serde(default, rename = "ref", skip_serializing_if = "String::is_empty")]
    pub reference: String,

    /// Remote URL override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Version control override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vcs: Option<VcsKind>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deps: Vec<ManifestEntry>,
}

impl ManifestEntry {
    /// Read and parse a manifest file
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(Error::ManifestNotFound(path.to_path_buf()));
        }

        let contents = fs::read_to_string(path)?;
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_yaml::from_str(&contents).map_err(|e| {
            Error::InvalidManifest(format!("Failed to parse {}: {}", path.display(), e))
        })
    }

    /// Serialize and write to a file
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        fs::write(path.as_ref(), yaml)?;
        Ok(())
    }

    /// Project the graph below `id` into a manifest tree
    pub fn from_graph(graph: &Graph, id: NodeId) -> Self {
        let mut on_path = HashSet::new();
        project(graph, id, true, &mut on_path)
    }

    /// Merge this manifest into the graph as node `id`'s own manifest.
    ///
    /// Values already set on a node (by the user or earlier in this run)
    /// are kept; the manifest fills in what is missing.
    pub fn apply(&self, graph: &Graph, id: NodeId) {
        {
            let node = graph.node(id);
            let mut state = node.write();
            if state.requested_version.is_empty() {
                state.requested_version = self.version.clone();
            }
            if state.url.is_none() {
                state.url = self.url.clone();
            }
            if state.vcs.is_none() {
                state.vcs = self.vcs;
            }
        }

        for dep in &self.deps {
            link_entry(graph, id, dep);
        }

        graph.node(id).write().has_manifest = true;
    }

    /// Number of dependency entries in the whole tree
    pub fn count(&self) -> usize {
        self.deps.iter().map(|d| 1 + d.count()).sum()
    }
}

fn link_entry(graph: &Graph, parent: NodeId, entry: &ManifestEntry) {
    if entry.name.is_empty() {
        tracing::warn!(parent = %graph.node(parent), "ignoring manifest entry without a name");
        return;
    }

    let child = graph
        .find(parent, &entry.name)
        .unwrap_or_else(|| graph.insert_or_get(&entry.name, parent).0);
    if graph.is_root(child) {
        return;
    }

    graph.set_parent_if_unset(child, parent);
    {
        let node = graph.node(child);
        let mut state = node.write();
        if state.requested_version.is_empty() {
            state.requested_version = entry.version.clone();
        }
        if state.reference.is_empty() {
            state.reference = entry.reference.clone();
        }
        if state.url.is_none() {
            state.url = entry.url.clone();
        }
        if state.vcs.is_none() {
            state.vcs = entry.vcs;
        }
    }
    graph.add_dependency(parent, child);

    for dep in &entry.deps {
        link_entry(graph, child, dep);
    }
}

fn project(graph: &Graph, id: NodeId, top: bool, on_path: &mut HashSet<NodeId>) -> ManifestEntry {
    let node = graph.node(id);
    let (version, reference, url, vcs, deps, has_manifest) = {
        let state = node.read();
        (
            state.requested_version.clone(),
            state.reference.clone(),
            state.url.clone(),
            state.vcs,
            state.dependencies.clone(),
            state.has_manifest,
        )
    };

    let mut entry = ManifestEntry {
        name: node.name().to_string(),
        version,
        reference,
        url,
        vcs,
        deps: Vec::new(),
    };

    // Nested nodes with their own vgo.yaml are described by that file
    let embed = top || !has_manifest;
    if embed && on_path.insert(id) {
        entry.deps = deps
            .into_iter()
            .filter(|dep| !graph.is_root(*dep))
            .map(|dep| project(graph, dep, false, on_path))
            .collect();
        on_path.remove(&id);
    }

    entry
}

/// Path of the manifest belonging to node `id`
pub fn manifest_path(graph: &Graph, id: NodeId) -> PathBuf {
    graph.local_path(id).join(MANIFEST_FILE)
}

/// Load a manifest file into node `id`, registering every dependency it
/// names and re-linking parent references.
///
/// `has_manifest` is only set when the file was read and parsed.
pub fn load<P: AsRef<Path>>(graph: &Graph, id: NodeId, path: P) -> Result<()> {
    let entry = ManifestEntry::read(path)?;
    entry.apply(graph, id);
    Ok(())
}

/// Save node `id` and its dependency tree to a manifest file
pub fn save<P: AsRef<Path>>(graph: &Graph, id: NodeId, path: P) -> Result<()> {
    ManifestEntry::from_graph(graph, id).write(path)
}

/// Render the manifest that [`save`] would write
pub fn to_yaml(graph: &Graph, id: NodeId) -> Result<String> {
    Ok(serde_yaml::to_string(&ManifestEntry::from_graph(graph, id))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Workspace;
    use tempfile::TempDir;

    fn graph(dir: &Path) -> Graph {
        Graph::new("github.com/me/app", Workspace::vendored(dir, dir.join("gopath")))
    }

    #[test]
    fn test_missing_manifest() {
        let temp_dir = TempDir::new().unwrap();
        let graph = graph(temp_dir.path());

        let err = load(&graph, graph.root(), temp_dir.path().join(MANIFEST_FILE)).unwrap_err();
        assert!(matches!(err, Error::ManifestNotFound(_)));
        assert!(!graph.node(graph.root()).read().has_manifest);
    }

    #[test]
    fn test_corrupt_manifest_leaves_graph_untouched() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(MANIFEST_FILE);
        fs::write(&path, "deps: [ {name: github.com/a/b\n").unwrap();
        let graph = graph(temp_dir.path());

        let err = load(&graph, graph.root(), &path).unwrap_err();
        assert!(matches!(err, Error::InvalidManifest(_)));
        assert_eq!(graph.len(), 1);
        assert!(!graph.node(graph.root()).read().has_manifest);
    }

    #[test]
    fn test_empty_manifest_is_valid() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(MANIFEST_FILE);
        fs::write(&path, "\n").unwrap();
        let graph = graph(temp_dir.path());

        load(&graph, graph.root(), &path).unwrap();
        assert!(graph.node(graph.root()).read().has_manifest);
        assert!(graph.dependencies(graph.root()).is_empty());
    }

    #[test]
    fn test_load_links_parents_and_registry() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(MANIFEST_FILE);
        fs::write(
            &path,
            r#"name: github.com/me/app
deps:
- name: github.com/x/a
  ver: v1.0.0
  ref: aaaaaaa
  deps:
  - name: github.com/x/shared
    ref: ccccccc
- name: github.com/x/b
  url: https://example.com/b.git
  vcs: hg
  deps:
  - name: github.com/x/shared
"#,
        )
        .unwrap();
        let graph = graph(temp_dir.path());
        let root = graph.root();

        load(&graph, root, &path).unwrap();

        let a = graph.lookup("github.com/x/a").unwrap();
        let b = graph.lookup("github.com/x/b").unwrap();
        let shared = graph.lookup("github.com/x/shared").unwrap();

        assert_eq!(graph.len(), 4, "shared dependency is one node");
        assert_eq!(graph.dependencies(root), vec![a, b]);
        assert_eq!(graph.dependencies(a), vec![shared]);
        assert_eq!(graph.dependencies(b), vec![shared]);
        assert_eq!(graph.parent(a), Some(root));
        assert_eq!(graph.parent(shared), Some(a));

        let a_state = graph.node(a).read().clone();
        assert_eq!(a_state.requested_version, Version::new("v1.0.0"));
        assert_eq!(a_state.reference, "aaaaaaa");
        assert!(!a_state.has_manifest);

        let b_state = graph.node(b).read().clone();
        assert_eq!(b_state.url.as_deref(), Some("https://example.com/b.git"));
        assert_eq!(b_state.vcs, Some(VcsKind::Mercurial));

        assert_eq!(graph.node(shared).read().reference, "ccccccc");
        assert!(graph.node(root).read().has_manifest);
    }

    #[test]
    fn test_save_key_order_and_omitted_fields() {
        let temp_dir = TempDir::new().unwrap();
        let graph = graph(temp_dir.path());
        let root = graph.root();
        let (a, _) = graph.insert_or_get("github.com/x/a", root);
        graph.add_dependency(root, a);
        {
            let node = graph.node(a);
            let mut state = node.write();
            state.requested_version = Version::new("master");
            state.reference = "abc1234".to_string();
        }

        let yaml = to_yaml(&graph, root).unwrap();
        assert_eq!(
            yaml,
            "name: github.com/me/app\ndeps:\n- name: github.com/x/a\n  ver: master\n  ref: abc1234\n"
        );
    }

    #[test]
    fn test_nested_manifest_deps_are_not_embedded() {
        let temp_dir = TempDir::new().unwrap();
        let graph = graph(temp_dir.path());
        let root = graph.root();
        let (a, _) = graph.insert_or_get("github.com/x/a", root);
        let (c, _) = graph.insert_or_get("github.com/x/c", a);
        graph.add_dependency(root, a);
        graph.add_dependency(a, c);
        graph.node(a).write().has_manifest = true;

        let entry = ManifestEntry::from_graph(&graph, root);
        assert_eq!(entry.deps.len(), 1);
        assert_eq!(entry.deps[0].name, "github.com/x/a");
        assert!(entry.deps[0].deps.is_empty());

        // The node's own manifest still lists its dependencies
        let own = ManifestEntry::from_graph(&graph, a);
        assert_eq!(own.deps.len(), 1);
        assert_eq!(own.deps[0].name, "github.com/x/c");
    }

    #[test]
    fn test_cycles_terminate() {
        let temp_dir = TempDir::new().unwrap();
        let graph = graph(temp_dir.path());
        let root = graph.root();
        let (a, _) = graph.insert_or_get("github.com/x/a", root);
        let (b, _) = graph.insert_or_get("github.com/x/b", a);
        graph.add_dependency(root, a);
        graph.add_dependency(a, b);
        graph.add_dependency(b, a);

        let entry = ManifestEntry::from_graph(&graph, root);
        assert_eq!(entry.count(), 3);
        assert!(entry.deps[0].deps[0].deps[0].deps.is_empty());
    }

    #[test]
    fn test_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(MANIFEST_FILE);
        let original = graph(temp_dir.path());
        let root = original.root();
        let (a, _) = original.insert_or_get("github.com/x/a", root);
        let (b, _) = original.insert_or_get("github.com/x/b", root);
        let (shared, _) = original.insert_or_get("github.com/x/shared", a);
        original.add_dependency(root, a);
        original.add_dependency(root, b);
        original.add_dependency(a, shared);
        original.add_dependency(b, shared);
        original.node(shared).write().reference = "0123456".to_string();
        original.node(b).write().url = Some("https://example.com/b.git".to_string());

        save(&original, root, &path).unwrap();

        let reloaded = graph(temp_dir.path());
        load(&reloaded, reloaded.root(), &path).unwrap();

        assert_eq!(reloaded.len(), original.len());
        assert_eq!(
            ManifestEntry::from_graph(&reloaded, reloaded.root()),
            ManifestEntry::from_graph(&original, root)
        );
        let shared = reloaded.lookup("github.com/x/shared").unwrap();
        assert_eq!(reloaded.node(shared).read().reference, "0123456");
    }
}
