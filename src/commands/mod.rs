pub mod get;
pub mod go;
pub mod init;
pub mod install;
pub mod remove;
pub mod tree;
pub mod update;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use vgo::graph::{Graph, Workspace};
use vgo::{
    manifest, Config, GoList, ImportResolver, InstallOptions, InstallReport, Installer,
    ManifestEntry, NativePackages, SystemVcs, UpdateScope,
};

/// Everything a command needs to work on the project in the current directory
pub struct Session {
    pub config: Config,
    pub manifest_path: PathBuf,
    pub graph: Graph,
    /// Whether vgo.yaml existed when the session was opened
    pub has_manifest: bool,
}

/// Go toolchain collaborators, only created by commands that list packages
pub struct Toolchain {
    pub native: NativePackages,
    pub golist: GoList,
}

impl Session {
    /// Load the configuration and the project manifest, if any
    pub fn open() -> Result<Self> {
        let project_dir = env::current_dir()?;
        let config = Config::load()?;
        let manifest_path = project_dir.join(manifest::MANIFEST_FILE);

        let entry = match ManifestEntry::read(&manifest_path) {
            Ok(entry) => Some(entry),
            Err(vgo::Error::ManifestNotFound(_)) => None,
            Err(e) => {
                println!("⚠ Ignoring unreadable {}: {}", manifest::MANIFEST_FILE, e);
                None
            }
        };

        let gopath = config.gopath()?;
        let workspace = if config.install.vendor {
            Workspace::vendored(&project_dir, gopath)
        } else {
            Workspace::shared(&project_dir, gopath)
        };

        let root_name = entry
            .as_ref()
            .map(|e| e.name.clone())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| ".".to_string());
        let graph = Graph::new(root_name, workspace);

        let has_manifest = entry.is_some();
        if let Some(entry) = entry {
            entry.apply(&graph, graph.root());
        }

        Ok(Self {
            config,
            manifest_path,
            graph,
            has_manifest,
        })
    }

    /// Locate the Go toolchain and scan its standard packages
    pub fn toolchain(&self) -> Result<Toolchain> {
        let goroot = self.config.goroot()?;
        let native = NativePackages::scan(&goroot)
            .with_context(|| format!("Failed to scan standard packages in {}", goroot.display()))?;
        let golist = GoList::new(self.config.toolchain.go.clone())
            .with_gopath(self.graph.workspace().gopath.clone());

        Ok(Toolchain { native, golist })
    }

    pub fn resolver<'a>(&'a self, toolchain: &'a Toolchain) -> ImportResolver<'a> {
        ImportResolver::new(&self.graph, &toolchain.golist, &toolchain.native)
            .with_repo_root_depth(self.config.resolve.repo_root_depth)
            .with_test_imports(self.config.resolve.include_test_imports)
    }

    /// Normalize a user-supplied dependency name to its repository root
    pub fn repo_name(&self, name: &str) -> String {
        vgo::repo_name(name.trim().trim_end_matches('/'), self.config.resolve.repo_root_depth)
    }

    pub fn save(&self) -> Result<()> {
        manifest::save(&self.graph, self.graph.root(), &self.manifest_path)
            .with_context(|| format!("Failed to write {}", self.manifest_path.display()))?;
        Ok(())
    }

    /// Install the graph, stopping new clones and checkouts on Ctrl-C
    pub fn install(&self, resolver: &ImportResolver<'_>, update: UpdateScope) -> Result<InstallReport> {
        let options = InstallOptions {
            jobs: self.config.install.jobs,
            update,
            prefer_ssh: self.config.vcs.prefer_ssh,
        };

        let token = CancellationToken::new();
        let installer = Installer::new(resolver, &SystemVcs, options)?.with_cancellation(token.clone());

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()?;
        let watcher = runtime.spawn(watch_interrupt(token));

        let spinner = create_spinner("Installing dependencies...");
        let report = installer.run();
        spinner.finish_and_clear();

        watcher.abort();
        runtime.shutdown_background();
        Ok(report)
    }
}

async fn watch_interrupt(token: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        eprintln!("Interrupted, waiting for running operations to finish...");
        token.cancel();
    }
}

fn create_spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg}")
        .map(|s| s.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"))
    {
        spinner.set_style(style);
    }
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

/// Print the outcome of an install run, save the manifest, and fail if any
/// dependency failed
pub fn finish_install(session: &Session, report: &InstallReport) -> Result<()> {
    for warning in &report.warnings {
        println!("⚠ {}: {}", warning.name, warning.message);
    }
    for failure in &report.failures {
        println!("✗ {}", failure);
    }

    session.save()?;

    println!();
    println!("✓ {} dependencies installed", report.installed.len());
    println!("✓ Wrote {}", manifest::MANIFEST_FILE);

    if report.cancelled {
        println!("⚠ Interrupted: {} dependencies skipped", report.skipped.len());
    }

    if !report.failures.is_empty() {
        anyhow::bail!("{} dependencies failed to install", report.failures.len());
    }
    if report.cancelled {
        anyhow::bail!("Installation interrupted");
    }
    Ok(())
}
