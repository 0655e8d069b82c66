//! Dependency installation and checkout
//!
//! The installer realizes a [`Graph`] on disk. For every dependency it
//! makes sure a working copy exists (cloning it if needed), switches it to
//! the pinned or requested revision, then reads the dependency's own
//! vgo.yaml (or discovers its imports) and descends into its children.
//!
//! Children of a node are installed concurrently on a bounded worker pool;
//! every fan-out joins before the parent returns. A node reached through
//! several edges is processed once. Failures are per node: they are
//! collected into an [`InstallReport`] and never abort siblings.
//!
//! # Examples
//!
//! ```no_run
//! use vgo::graph::{Graph, Workspace};
//! use vgo::vcs::SystemVcs;
//! use vgo::{GoList, ImportResolver, InstallOptions, Installer, NativePackages};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let graph = Graph::new(".", Workspace::vendored(".", "/home/me/go"));
//! let native = NativePackages::scan("/usr/local/go")?;
//! let golist = GoList::default();
//! let resolver = ImportResolver::new(&graph, &golist, &native);
//! resolver.discover(graph.root())?;
//!
//! let installer = Installer::new(&resolver, &SystemVcs, InstallOptions::default())?;
//! let report = installer.run();
//! println!("{} installed, {} failed", report.installed.len(), report.failures.len());
//! # Ok(())
//! # }
//! ```

use crate::graph::{Graph, NodeId, NodeStatus};
use crate::manifest;
use crate::resolver::ImportResolver;
use crate::vcs::{resolve_backend, BackendCandidates, Repository, ResolvedBackend, VcsProvider};
use crate::{Error, Result};
use rayon::prelude::*;
use std::collections::HashSet;
use std::fmt;
use tokio_util::sync::CancellationToken;

/// Which dependencies should move to the newest revision of their
/// requested version instead of staying on their pinned reference
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum UpdateScope {
    #[default]
    None,
    All,
    Only(HashSet<String>),
}

impl UpdateScope {
    pub fn includes(&self, name: &str) -> bool {
        match self {
            UpdateScope::None => false,
            UpdateScope::All => true,
            UpdateScope::Only(names) => names.contains(name),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InstallOptions {
    /// Maximum number of concurrent workers
    pub jobs: usize,
    pub update: UpdateScope,
    /// Generate ssh remotes from the host table
    pub prefer_ssh: bool,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            jobs: 4,
            update: UpdateScope::None,
            prefer_ssh: false,
        }
    }
}

/// Pipeline step a failure happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Install,
    Checkout,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Install => f.write_str("install"),
            Stage::Checkout => f.write_str("checkout"),
        }
    }
}

#[derive(Debug)]
pub struct NodeFailure {
    pub name: String,
    pub stage: Stage,
    pub error: Error,
}

impl fmt::Display for NodeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} failed): {}", self.name, self.stage, self.error)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeWarning {
    pub name: String,
    pub message: String,
}

/// Outcome of installing a subtree
#[derive(Debug, Default)]
pub struct InstallReport {
    /// Dependencies that completed the pipeline
    pub installed: Vec<String>,
    pub failures: Vec<NodeFailure>,
    pub warnings: Vec<NodeWarning>,
    /// Dependencies not processed because the run was cancelled
    pub skipped: Vec<String>,
    pub cancelled: bool,
}

impl InstallReport {
    pub fn merge(&mut self, other: InstallReport) {
        self.installed.extend(other.installed);
        self.failures.extend(other.failures);
        self.warnings.extend(other.warnings);
        self.skipped.extend(other.skipped);
        self.cancelled |= other.cancelled;
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }

    fn warn(&mut self, name: &str, message: String) {
        self.warnings.push(NodeWarning {
            name: name.to_string(),
            message,
        });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    /// The project itself; never installed
    Root,
    AlreadyPresent,
    Cloned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutOutcome {
    /// The project itself; never checked out
    Root,
    /// Local changes present; left as is
    Dirty,
    /// Already on the wanted revision
    Unchanged,
    Updated,
}

/// Realizes a dependency graph on disk
pub struct Installer<'a> {
    graph: &'a Graph,
    resolver: &'a ImportResolver<'a>,
    vcs: &'a dyn VcsProvider,
    pool: rayon::ThreadPool,
    cancel: CancellationToken,
    options: InstallOptions,
}

impl<'a> Installer<'a> {
    pub fn new(
        resolver: &'a ImportResolver<'a>,
        vcs: &'a dyn VcsProvider,
        options: InstallOptions,
    ) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.jobs.max(1))
            .thread_name(|i| format!("vgo-worker-{}", i))
            .build()
            .map_err(|e| Error::Other(format!("Failed to start worker pool: {}", e)))?;

        Ok(Self {
            graph: resolver.graph(),
            resolver,
            vcs,
            pool,
            cancel: CancellationToken::new(),
            options,
        })
    }

    /// Stop issuing new clones and checkouts once `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Install every dependency of the project root
    pub fn run(&self) -> InstallReport {
        self.install_deps(self.graph.root())
    }

    /// Install the children of `id` concurrently and wait for all of them
    pub fn install_deps(&self, id: NodeId) -> InstallReport {
        self.pool.install(|| self.fan_out(id))
    }

    fn fan_out(&self, id: NodeId) -> InstallReport {
        let children: Vec<NodeId> = self
            .graph
            .dependencies(id)
            .into_iter()
            .filter(|child| !self.graph.is_root(*child))
            .collect();

        children
            .par_iter()
            .map(|child| self.process(*child))
            .reduce(InstallReport::default, |mut acc, report| {
                acc.merge(report);
                acc
            })
    }

    /// Run one node through the whole pipeline, then its children
    fn process(&self, id: NodeId) -> InstallReport {
        let mut report = InstallReport::default();
        if !self.claim(id) {
            return report;
        }

        let name = self.graph.name(id);
        let depth = self.graph.depth(id);

        if let Err(e) = self.install(id) {
            self.record_error(&mut report, id, Stage::Install, e);
            return report;
        }

        let dirty = match self.checkout(id) {
            Ok(outcome) => outcome == CheckoutOutcome::Dirty,
            Err(e) => {
                self.record_error(&mut report, id, Stage::Checkout, e);
                return report;
            }
        };
        if dirty {
            report.warn(&name, "local changes present, checkout skipped".to_string());
        }

        self.resolve_children(id, &mut report);

        self.set_status(id, NodeStatus::InstallingDeps);
        report.merge(self.fan_out(id));

        self.set_status(
            id,
            if dirty {
                NodeStatus::Skipped
            } else {
                NodeStatus::Done
            },
        );
        tracing::debug!(name = %name, depth, "done");
        report.installed.push(name);
        report
    }

    /// Take ownership of a pending node for this run
    fn claim(&self, id: NodeId) -> bool {
        let node = self.graph.node(id);
        let mut state = node.write();
        if state.status != NodeStatus::Pending {
            return false;
        }
        state.status = NodeStatus::Cloning;
        true
    }

    fn set_status(&self, id: NodeId, status: NodeStatus) {
        self.graph.node(id).write().status = status;
    }

    fn record_error(&self, report: &mut InstallReport, id: NodeId, stage: Stage, error: Error) {
        let name = self.graph.name(id);
        if matches!(error, Error::Cancelled) {
            self.set_status(id, NodeStatus::Skipped);
            report.skipped.push(name);
            report.cancelled = true;
            return;
        }

        tracing::error!(name = %name, depth = self.graph.depth(id), %stage, error = %error, "FAIL");
        self.set_status(id, NodeStatus::Failed);
        report.failures.push(NodeFailure { name, stage, error });
    }

    /// Load the node's own manifest, or discover its imports if it has none
    fn resolve_children(&self, id: NodeId, report: &mut InstallReport) {
        let name = self.graph.name(id);
        let path = manifest::manifest_path(self.graph, id);

        match manifest::load(self.graph, id, &path) {
            Ok(()) => {
                self.set_status(id, NodeStatus::ResolvedManifest);
                tracing::debug!(name = %name, "using dependency manifest");
                return;
            }
            Err(Error::ManifestNotFound(_)) => {}
            Err(e) => {
                tracing::warn!(name = %name, error = %e, "ignoring unreadable manifest");
                report.warn(&name, format!("ignoring unreadable manifest: {}", e));
            }
        }

        self.set_status(id, NodeStatus::Rediscovering);
        if let Err(e) = self.resolver.discover(id) {
            tracing::warn!(name = %name, error = %e, "could not discover imports");
            report.warn(&name, format!("could not discover imports: {}", e));
        }
    }

    /// The backend for a node, selected once and memoized on the node
    pub fn repository(&self, id: NodeId) -> Result<ResolvedBackend> {
        let node = self.graph.node(id);
        if let Some(backend) = node.read().backend.clone() {
            return Ok(backend);
        }

        let (explicit_kind, explicit_url) = {
            let state = node.read();
            (state.vcs, state.url.clone())
        };
        let local_path = self.graph.local_path(id);
        let search_paths = self.graph.search_paths(id);

        let backend = resolve_backend(
            self.vcs,
            &BackendCandidates {
                name: node.name(),
                explicit_kind,
                explicit_url: explicit_url.as_deref(),
                local_path: &local_path,
                search_paths: &search_paths,
                prefer_ssh: self.options.prefer_ssh,
            },
        )?;

        let mut state = node.write();
        if state.requested_version.is_empty() {
            if let Some(version) = &backend.implied_version {
                state.requested_version = version.clone();
            }
        }
        let backend = state.backend.get_or_insert(backend).clone();
        Ok(backend)
    }

    /// Make sure a working copy of the node exists, cloning it if absent
    pub fn install(&self, id: NodeId) -> Result<InstallOutcome> {
        let node = self.graph.node(id);
        let depth = self.graph.depth(id);
        if self.graph.is_root(id) {
            tracing::debug!(name = %node, "NOOP skipping project root");
            return Ok(InstallOutcome::Root);
        }

        let backend = self.repository(id)?;
        let repo = &backend.repository;

        if repo.check_local() {
            let mut state = node.write();
            state.installed = true;
            state.status = NodeStatus::Unversioned;
            return Ok(InstallOutcome::AlreadyPresent);
        }

        let url = backend
            .remote_url
            .clone()
            .ok_or_else(|| Error::UnresolvedRepository(node.name().to_string()))?;

        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        node.write().status = NodeStatus::Cloning;
        tracing::info!(name = %node, depth, url = %url, "installing");
        repo.clone_remote(&url)?;

        let mut state = node.write();
        state.installed = true;
        state.status = NodeStatus::Unversioned;
        Ok(InstallOutcome::Cloned)
    }

    /// Switch the node's working copy to its pinned reference, or to its
    /// requested version if nothing is pinned yet.
    ///
    /// A working copy with local changes is never touched. A working copy
    /// already on the wanted revision is left alone.
    pub fn checkout(&self, id: NodeId) -> Result<CheckoutOutcome> {
        let node = self.graph.node(id);
        let depth = self.graph.depth(id);
        if self.graph.is_root(id) {
            tracing::debug!(name = %node, "NOOP skipping project root");
            return Ok(CheckoutOutcome::Root);
        }

        let backend = self.repository(id)?;
        let repo = &backend.repository;

        if repo.is_dirty() {
            tracing::warn!(name = %node, depth, "NOOP skipping checkout, dependency is dirty");
            return Ok(CheckoutOutcome::Dirty);
        }

        if !repo.check_local() {
            node.write().installed = false;
            tracing::warn!(name = %node, depth, "dependency not installed");
            return Err(Error::NotInstalled(node.name().to_string()));
        }

        let update = self.options.update.includes(node.name());
        if update {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            repo.fetch()?;

            // Nothing requested: follow whatever the working copy tracks
            if node.read().requested_version.is_empty() {
                return self.pull(id, &**repo);
            }
        }

        let (target, installed) = {
            let state = node.read();
            let target = if update {
                state.requested_version.clone()
            } else {
                state.target_version()
            };
            (target, state.installed)
        };

        let current = repo.current_reference()?;
        if installed && target.is_satisfied_by(&current) {
            let mut state = node.write();
            state.reference = current;
            state.status = NodeStatus::Pinned;
            tracing::info!(name = %node, depth, reference = %state.reference, "OK");
            return Ok(CheckoutOutcome::Unchanged);
        }

        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        if !repo.is_reference_valid(target.as_str()) {
            tracing::warn!(name = %node, depth, reference = %target, "reference not found");
            return Err(Error::ReferenceNotFound {
                name: node.name().to_string(),
                reference: target.to_string(),
            });
        }

        node.write().status = NodeStatus::CheckingOut;
        repo.update_to_reference(target.as_str())?;
        let reference = repo.current_reference()?;

        let mut state = node.write();
        state.reference = reference;
        state.installed = true;
        state.status = NodeStatus::Pinned;
        tracing::info!(name = %node, depth, reference = %state.reference, "OK");
        Ok(CheckoutOutcome::Updated)
    }

    fn pull(&self, id: NodeId, repo: &dyn Repository) -> Result<CheckoutOutcome> {
        let node = self.graph.node(id);
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let before = repo.current_reference()?;
        node.write().status = NodeStatus::CheckingOut;
        repo.pull()?;
        let reference = repo.current_reference()?;

        let mut state = node.write();
        let moved = reference != before;
        state.reference = reference;
        state.installed = true;
        state.status = NodeStatus::Pinned;
        tracing::info!(name = %node, depth = self.graph.depth(id), reference = %state.reference, "OK");
        Ok(if moved {
            CheckoutOutcome::Updated
        } else {
            CheckoutOutcome::Unchanged
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_scope() {
        assert!(!UpdateScope::None.includes("a"));
        assert!(UpdateScope::All.includes("a"));

        let only = UpdateScope::Only(HashSet::from(["a".to_string()]));
        assert!(only.includes("a"));
        assert!(!only.includes("b"));
    }

    #[test]
    fn test_report_merge() {
        let mut report = InstallReport::default();
        report.installed.push("a".to_string());

        let mut other = InstallReport::default();
        other.installed.push("b".to_string());
        other.failures.push(NodeFailure {
            name: "c".to_string(),
            stage: Stage::Install,
            error: Error::Other("boom".to_string()),
        });
        other.cancelled = true;

        report.merge(other);
        assert_eq!(report.installed, vec!["a", "b"]);
        assert_eq!(report.failures.len(), 1);
        assert!(report.cancelled);
        assert!(!report.is_success());
    }

    #[test]
    fn test_failure_display() {
        let failure = NodeFailure {
            name: "github.com/x/a".to_string(),
            stage: Stage::Checkout,
            error: Error::NotInstalled("github.com/x/a".to_string()),
        };
        assert_eq!(
            failure.to_string(),
            "github.com/x/a (checkout failed): Dependency github.com/x/a is not installed"
        );
    }
}
