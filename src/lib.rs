//! vgo - A reproducible, registry-free dependency manager for Go projects
//!
//! vgo discovers the external repositories a Go project imports, clones
//! each one, pins it to a concrete revision and records the result in a
//! `vgo.yaml` manifest so the next run checks out exactly the same tree.
//! There is no package index: repositories come straight from their
//! version control hosts.
//!
//! - Import discovery through `go list`, collapsing packages to repository roots
//! - Shared (diamond) dependencies resolved to a single node
//! - Git, Mercurial, Subversion and Bazaar working copies
//! - Concurrent clone and checkout with per-dependency failure reporting
//! - Project-local `vendor/` or shared `$GOPATH/src` installs
//!
//! # Examples
//!
//! ```no_run
//! use vgo::graph::{Graph, Workspace};
//! use vgo::vcs::SystemVcs;
//! use vgo::{manifest, Config, GoList, ImportResolver, InstallOptions, Installer, NativePackages};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load()?;
//! let graph = Graph::new(".", Workspace::vendored(".", config.gopath()?));
//!
//! // Load the project manifest, or discover imports for a new project
//! let native = NativePackages::scan(config.goroot()?)?;
//! let golist = GoList::default();
//! let resolver = ImportResolver::new(&graph, &golist, &native);
//! if manifest::load(&graph, graph.root(), manifest::MANIFEST_FILE).is_err() {
//!     resolver.discover(graph.root())?;
//! }
//!
//! let installer = Installer::new(&resolver, &SystemVcs, InstallOptions::default())?;
//! let report = installer.run();
//! manifest::save(&graph, graph.root(), manifest::MANIFEST_FILE)?;
//!
//! println!("Installed {} dependencies", report.installed.len());
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`graph`] - Deduplicated repository graph and workspace layout
//! - [`resolver`] - Import discovery and repository root collapsing
//! - [`installer`] - Clone, checkout and recursive install pipeline
//! - [`manifest`] - Read and write vgo.yaml
//! - [`vcs`] - Version control backends and remote inference
//! - [`introspect`] - Package listing through the Go toolchain
//! - [`native`] - Standard library package classification
//! - [`version`] - Requested version matching
//! - [`config`] - User configuration
//! - [`error`] - Error types and result handling

pub mod config;
pub mod error;
pub mod graph;
pub mod installer;
pub mod introspect;
pub mod manifest;
pub mod native;
pub mod resolver;
pub mod vcs;
pub mod version;

pub use config::Config;
pub use error::{Error, Result};
pub use graph::{Graph, NodeId, NodeStatus, Workspace};
pub use installer::{
    CheckoutOutcome, InstallOptions, InstallOutcome, InstallReport, Installer, NodeFailure,
    UpdateScope,
};
pub use introspect::{GoList, PackageInfo, PackageIntrospector};
pub use manifest::{ManifestEntry, MANIFEST_FILE};
pub use native::NativePackages;
pub use resolver::{repo_name, ImportResolver};
pub use vcs::{Repository, SystemVcs, VcsKind, VcsProvider};
pub use version::{Version, VersionKind};
