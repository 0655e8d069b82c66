//! Version control adapter
//!
//! Every dependency is a working copy of some repository. This module gives
//! the installer one capability set ([`Repository`]) over Git, Mercurial,
//! Subversion and Bazaar, backed by the system binaries. The backend for a
//! dependency is chosen once by [`resolve_backend`] and then memoized on the
//! node.
//!
//! # Examples
//!
//! ```no_run
//! use vgo::vcs::{Repository, SystemVcs, VcsKind, VcsProvider};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let repo = SystemVcs.open(VcsKind::Git, std::path::Path::new("vendor/github.com/pkg/errors"))?;
//! if repo.check_local() && !repo.is_dirty() {
//!     repo.update_to_reference("v0.9.1")?;
//! }
//! println!("Now at {}", repo.current_reference()?);
//! # Ok(())
//! # }
//! ```

use crate::{Error, Result, Version};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

/// Supported version control systems
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VcsKind {
    #[serde(rename = "git")]
    Git,
    #[serde(rename = "hg")]
    Mercurial,
    #[serde(rename = "svn")]
    Subversion,
    #[serde(rename = "bzr")]
    Bazaar,
    #[serde(rename = "none")]
    None,
}

impl VcsKind {
    const DETECTABLE: [VcsKind; 4] = [
        VcsKind::Git,
        VcsKind::Mercurial,
        VcsKind::Subversion,
        VcsKind::Bazaar,
    ];

    /// Command line client for this backend
    pub fn binary(&self) -> Option<&'static str> {
        match self {
            VcsKind::Git => Some("git"),
            VcsKind::Mercurial => Some("hg"),
            VcsKind::Subversion => Some("svn"),
            VcsKind::Bazaar => Some("bzr"),
            VcsKind::None => None,
        }
    }

    /// Metadata entry that marks a working copy root
    pub fn marker(&self) -> Option<&'static str> {
        match self {
            VcsKind::Git => Some(".git"),
            VcsKind::Mercurial => Some(".hg"),
            VcsKind::Subversion => Some(".svn"),
            VcsKind::Bazaar => Some(".bzr"),
            VcsKind::None => None,
        }
    }

    /// Detect the backend of an existing working copy
    pub fn detect_from_path(path: &Path) -> Option<VcsKind> {
        Self::DETECTABLE.into_iter().find(|kind| {
            kind.marker()
                .map(|marker| path.join(marker).exists())
                .unwrap_or(false)
        })
    }

    /// Guess the backend from the shape of a remote URL
    pub fn from_url(url: &str) -> Option<VcsKind> {
        let url = url.trim();
        if url.starts_with("git@") || url.starts_with("git://") || url.ends_with(".git") {
            Some(VcsKind::Git)
        } else if url.starts_with("svn://") || url.starts_with("svn+ssh://") {
            Some(VcsKind::Subversion)
        } else if url.starts_with("bzr://") || url.starts_with("bzr+ssh://") || url.starts_with("lp:")
        {
            Some(VcsKind::Bazaar)
        } else if url.contains("://hg.") {
            Some(VcsKind::Mercurial)
        } else {
            None
        }
    }
}

impl fmt::Display for VcsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VcsKind::Git => "git",
            VcsKind::Mercurial => "hg",
            VcsKind::Subversion => "svn",
            VcsKind::Bazaar => "bzr",
            VcsKind::None => "none",
        };
        f.write_str(name)
    }
}

/// Remote location inferred from an import path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSpec {
    pub kind: VcsKind,
    pub url: String,
    /// Version implied by the import path itself (gopkg.in `.vN` suffixes)
    pub version: Option<Version>,
}

/// Infer the backend and remote URL from well known hosts
pub fn remote_from_import_path(name: &str, prefer_ssh: bool) -> Option<RemoteSpec> {
    let parts: Vec<&str> = name.split('/').filter(|p| !p.is_empty()).collect();
    let host = *parts.first()?;

    let git = |host: &str, path: &str| RemoteSpec {
        kind: VcsKind::Git,
        url: if prefer_ssh {
            format!("git@{}:{}.git", host, path)
        } else {
            format!("https://{}/{}.git", host, path)
        },
        version: None,
    };

    match host {
        "github.com" | "gitlab.com" | "bitbucket.org" if parts.len() >= 3 => {
            Some(git(host, &parts[1..3].join("/")))
        }
        "golang.org" if parts.len() >= 3 && parts[1] == "x" => Some(RemoteSpec {
            kind: VcsKind::Git,
            url: format!("https://go.googlesource.com/{}", parts[2]),
            version: None,
        }),
        "gopkg.in" => {
            let (owner, package) = match parts.len() {
                2 => (None, parts[1]),
                n if n >= 3 => (Some(parts[1]), parts[2]),
                _ => return None,
            };
            let (package, version) = package.rsplit_once(".v")?;
            if version.is_empty() || !version.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            let path = match owner {
                Some(owner) => format!("{}/{}", owner, package),
                None => format!("go-{}/{}", package, package),
            };
            let mut spec = git("github.com", &path);
            spec.version = Some(Version::new(format!("v{}", version)));
            Some(spec)
        }
        "launchpad.net" if parts.len() >= 2 => Some(RemoteSpec {
            kind: VcsKind::Bazaar,
            url: format!("lp:{}", parts[1..].join("/")),
            version: None,
        }),
        _ if host.starts_with("hg.") && parts.len() >= 2 => Some(RemoteSpec {
            kind: VcsKind::Mercurial,
            url: format!("https://{}", parts.join("/")),
            version: None,
        }),
        _ => None,
    }
}

/// Uniform operations over a working copy at a fixed local path
pub trait Repository: Send + Sync {
    fn kind(&self) -> VcsKind;

    fn local_path(&self) -> &Path;

    /// Whether a working copy already exists at the local path
    fn check_local(&self) -> bool;

    /// Create the working copy from a remote
    fn clone_remote(&self, remote_url: &str) -> Result<()>;

    /// Pull new history from the remote without touching the working tree
    fn fetch(&self) -> Result<()>;

    /// The revision currently checked out
    fn current_reference(&self) -> Result<String>;

    fn is_reference_valid(&self, reference: &str) -> bool;

    fn update_to_reference(&self, reference: &str) -> Result<()>;

    /// Advance the working copy to the newest fetched revision of what it
    /// tracks: the upstream of the current branch, or the remote's default
    /// branch when nothing is checked out by name
    fn pull(&self) -> Result<()>;

    /// Whether the working copy has uncommitted changes
    fn is_dirty(&self) -> bool;

    fn remote_url(&self) -> Option<String>;
}

/// Factory for [`Repository`] handles, swapped out in tests
pub trait VcsProvider: Send + Sync {
    fn detect(&self, path: &Path) -> Option<VcsKind> {
        VcsKind::detect_from_path(path)
    }

    fn open(&self, kind: VcsKind, path: &Path) -> Result<Arc<dyn Repository>>;
}

/// Provider backed by the system `git`, `hg`, `svn` and `bzr` binaries
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemVcs;

impl VcsProvider for SystemVcs {
    fn open(&self, kind: VcsKind, path: &Path) -> Result<Arc<dyn Repository>> {
        match kind {
            VcsKind::None => Err(Error::Vcs {
                name: path.display().to_string(),
                message: "no version control system".to_string(),
            }),
            kind => Ok(Arc::new(CommandRepository::new(kind, path))),
        }
    }
}

/// A working copy driven through its backend's command line client
#[derive(Debug, Clone)]
pub struct CommandRepository {
    kind: VcsKind,
    path: PathBuf,
}

impl CommandRepository {
    pub fn new<P: Into<PathBuf>>(kind: VcsKind, path: P) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }

    fn run(&self, args: &[&str], in_working_copy: bool) -> Result<String> {
        let binary = self.kind.binary().ok_or_else(|| Error::Vcs {
            name: self.path.display().to_string(),
            message: "no version control system".to_string(),
        })?;

        let mut cmd = Command::new(binary);
        cmd.args(args);
        if in_working_copy {
            cmd.current_dir(&self.path);
        }

        tracing::debug!(vcs = %self.kind, path = %self.path.display(), ?args, "running");

        let output = cmd.output().map_err(|e| Error::Vcs {
            name: self.path.display().to_string(),
            message: format!("failed to run {}: {}", binary, e),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Vcs {
                name: self.path.display().to_string(),
                message: format!("{} {} failed: {}", binary, args.join(" "), stderr.trim()),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl Repository for CommandRepository {
    fn kind(&self) -> VcsKind {
        self.kind
    }

    fn local_path(&self) -> &Path {
        &self.path
    }

    fn check_local(&self) -> bool {
        self.kind
            .marker()
            .map(|marker| self.path.join(marker).exists())
            .unwrap_or(false)
    }

    fn clone_remote(&self, remote_url: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let dest = self.path.to_string_lossy();
        let args = match self.kind {
            VcsKind::Subversion => vec!["checkout", remote_url, dest.as_ref()],
            VcsKind::Bazaar => vec!["branch", remote_url, dest.as_ref()],
            _ => vec!["clone", remote_url, dest.as_ref()],
        };
        self.run(&args, false).map(|_| ())
    }

    fn fetch(&self) -> Result<()> {
        match self.kind {
            VcsKind::Git => self.run(&["fetch", "--all", "--tags"], true).map(|_| ()),
            VcsKind::Mercurial | VcsKind::Bazaar => self.run(&["pull"], true).map(|_| ()),
            // Subversion resolves revisions against the server on update
            VcsKind::Subversion | VcsKind::None => Ok(()),
        }
    }

    fn current_reference(&self) -> Result<String> {
        match self.kind {
            VcsKind::Git => self.run(&["rev-parse", "HEAD"], true),
            VcsKind::Mercurial => self.run(&["log", "-r", ".", "--template", "{node}"], true),
            VcsKind::Subversion => self.run(&["info", "--show-item", "revision"], true),
            VcsKind::Bazaar => self.run(&["revno", "--tree"], true),
            VcsKind::None => self.run(&[], true),
        }
    }

    fn is_reference_valid(&self, reference: &str) -> bool {
        let result = match self.kind {
            VcsKind::Git => {
                let spec = format!("{}^{{commit}}", reference);
                self.run(&["rev-parse", "--verify", "--quiet", &spec], true)
            }
            VcsKind::Mercurial => self.run(&["log", "-r", reference, "--template", "{node}"], true),
            VcsKind::Subversion => self.run(&["info", "-r", reference], true),
            VcsKind::Bazaar => self.run(&["revno", "-r", reference], true),
            VcsKind::None => return false,
        };
        result.is_ok()
    }

    fn update_to_reference(&self, reference: &str) -> Result<()> {
        if self.kind != VcsKind::Git {
            return self.run(&["update", "-r", reference], true).map(|_| ());
        }

        self.run(&["checkout", "--quiet", reference], true)?;

        // A branch stays at its local tip after a fetch until fast-forwarded
        let upstream = format!("refs/remotes/origin/{}", reference);
        if self.run(&["rev-parse", "--verify", "--quiet", &upstream], true).is_ok() {
            self.run(&["merge", "--ff-only", "--quiet", &upstream], true)?;
        }
        Ok(())
    }

    fn pull(&self) -> Result<()> {
        match self.kind {
            VcsKind::Git => {
                if self.run(&["rev-parse", "--abbrev-ref", "@{u}"], true).is_ok() {
                    self.run(&["merge", "--ff-only", "--quiet", "@{u}"], true)?;
                } else {
                    self.run(&["checkout", "--quiet", "--detach", "origin/HEAD"], true)?;
                }
                Ok(())
            }
            VcsKind::Mercurial | VcsKind::Subversion | VcsKind::Bazaar => {
                self.run(&["update"], true).map(|_| ())
            }
            VcsKind::None => Ok(()),
        }
    }

    fn is_dirty(&self) -> bool {
        let status = match self.kind {
            VcsKind::Git => self.run(&["status", "--porcelain"], true),
            VcsKind::Mercurial => self.run(&["status", "-m", "-a", "-r", "-d"], true),
            VcsKind::Subversion => self.run(&["status", "-q"], true),
            VcsKind::Bazaar => self.run(&["status", "--short"], true),
            VcsKind::None => return false,
        };
        match status {
            Ok(out) => !out.is_empty(),
            Err(e) => {
                tracing::debug!(path = %self.path.display(), error = %e, "status check failed");
                false
            }
        }
    }

    fn remote_url(&self) -> Option<String> {
        let url = match self.kind {
            VcsKind::Git => self.run(&["config", "--get", "remote.origin.url"], true),
            VcsKind::Mercurial => self.run(&["paths", "default"], true),
            VcsKind::Subversion => self.run(&["info", "--show-item", "url"], true),
            VcsKind::Bazaar => self.run(&["config", "parent_location"], true),
            VcsKind::None => return None,
        };
        url.ok().filter(|u| !u.is_empty())
    }
}

/// Everything known about where a dependency's repository may come from
#[derive(Debug, Clone)]
pub struct BackendCandidates<'a> {
    /// Canonical repository name, e.g. `github.com/pkg/errors`
    pub name: &'a str,
    pub explicit_kind: Option<VcsKind>,
    pub explicit_url: Option<&'a str>,
    /// Where the working copy lives (or will live) for this run
    pub local_path: &'a Path,
    /// Other places an existing working copy may be found
    pub search_paths: &'a [PathBuf],
    pub prefer_ssh: bool,
}

/// A backend selected for one dependency
#[derive(Clone)]
pub struct ResolvedBackend {
    pub repository: Arc<dyn Repository>,
    pub remote_url: Option<String>,
    pub implied_version: Option<Version>,
}

impl fmt::Debug for ResolvedBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedBackend")
            .field("kind", &self.repository.kind())
            .field("local_path", &self.repository.local_path())
            .field("remote_url", &self.remote_url)
            .field("implied_version", &self.implied_version)
            .finish()
    }
}

/// Select the backend for a dependency.
///
/// Precedence: explicit override on the node, an existing working copy at
/// the install path, a working copy in one of the search paths, and finally
/// the host convention table. The first candidate that yields a backend wins.
pub fn resolve_backend(
    provider: &dyn VcsProvider,
    candidates: &BackendCandidates<'_>,
) -> Result<ResolvedBackend> {
    let inferred = remote_from_import_path(candidates.name, candidates.prefer_ssh);
    let implied_version = inferred.as_ref().and_then(|spec| spec.version.clone());
    let local_path = candidates.local_path;

    // (a) explicit override
    if candidates.explicit_kind.is_some() || candidates.explicit_url.is_some() {
        let kind = candidates
            .explicit_kind
            .or_else(|| provider.detect(local_path))
            .or_else(|| candidates.explicit_url.and_then(VcsKind::from_url))
            .or_else(|| inferred.as_ref().map(|spec| spec.kind));

        if let Some(kind) = kind.filter(|k| *k != VcsKind::None) {
            let remote_url = candidates
                .explicit_url
                .map(str::to_string)
                .or_else(|| inferred.as_ref().map(|spec| spec.url.clone()));
            return Ok(ResolvedBackend {
                repository: provider.open(kind, local_path)?,
                remote_url,
                implied_version,
            });
        }
    }

    // (b) existing working copy at the install path
    if let Some(kind) = provider.detect(local_path) {
        let repository = provider.open(kind, local_path)?;
        let remote_url = repository
            .remote_url()
            .or_else(|| inferred.as_ref().map(|spec| spec.url.clone()));
        return Ok(ResolvedBackend {
            repository,
            remote_url,
            implied_version,
        });
    }

    // (c) working copies in parent vendor directories or the shared root
    for path in candidates.search_paths {
        let Some(kind) = provider.detect(path) else {
            continue;
        };
        let Ok(found) = provider.open(kind, path) else {
            continue;
        };
        let remote_url = found
            .remote_url()
            .or_else(|| inferred.as_ref().map(|spec| spec.url.clone()));
        return Ok(ResolvedBackend {
            repository: provider.open(kind, local_path)?,
            remote_url,
            implied_version,
        });
    }

    // (d) host convention
    if let Some(spec) = inferred {
        return Ok(ResolvedBackend {
            repository: provider.open(spec.kind, local_path)?,
            remote_url: Some(spec.url),
            implied_version,
        });
    }

    Err(Error::UnresolvedRepository(candidates.name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_detect_from_path() {
        let temp_dir = TempDir::new().unwrap();
        assert_eq!(VcsKind::detect_from_path(temp_dir.path()), None);

        fs::create_dir_all(temp_dir.path().join(".hg")).unwrap();
        assert_eq!(
            VcsKind::detect_from_path(temp_dir.path()),
            Some(VcsKind::Mercurial)
        );
    }

    #[test]
    fn test_git_worktree_file_is_detected() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join(".git"), "gitdir: ../main/.git").unwrap();
        assert_eq!(VcsKind::detect_from_path(temp_dir.path()), Some(VcsKind::Git));
    }

    #[test]
    fn test_kind_from_url() {
        assert_eq!(VcsKind::from_url("git@github.com:a/b.git"), Some(VcsKind::Git));
        assert_eq!(VcsKind::from_url("https://example.com/a/b.git"), Some(VcsKind::Git));
        assert_eq!(VcsKind::from_url("svn://example.com/repo"), Some(VcsKind::Subversion));
        assert_eq!(VcsKind::from_url("lp:juju"), Some(VcsKind::Bazaar));
        assert_eq!(VcsKind::from_url("https://hg.example.org/x"), Some(VcsKind::Mercurial));
        assert_eq!(VcsKind::from_url("https://example.com/x"), None);
    }

    #[test]
    fn test_kind_serde_names() {
        assert_eq!(serde_yaml::to_string(&VcsKind::Mercurial).unwrap().trim(), "hg");
        let kind: VcsKind = serde_yaml::from_str("bzr").unwrap();
        assert_eq!(kind, VcsKind::Bazaar);
    }

    #[test]
    fn test_github_remote() {
        let spec = remote_from_import_path("github.com/pkg/errors", false).unwrap();
        assert_eq!(spec.kind, VcsKind::Git);
        assert_eq!(spec.url, "https://github.com/pkg/errors.git");
        assert_eq!(spec.version, None);

        let spec = remote_from_import_path("github.com/pkg/errors", true).unwrap();
        assert_eq!(spec.url, "git@github.com:pkg/errors.git");

        assert!(remote_from_import_path("github.com/pkg", false).is_none());
    }

    #[test]
    fn test_golang_x_remote() {
        let spec = remote_from_import_path("golang.org/x/net", false).unwrap();
        assert_eq!(spec.url, "https://go.googlesource.com/net");
    }

    #[test]
    fn test_gopkg_in_remote() {
        let spec = remote_from_import_path("gopkg.in/yaml.v2", false).unwrap();
        assert_eq!(spec.url, "https://github.com/go-yaml/yaml.git");
        assert_eq!(spec.version, Some(Version::new("v2")));

        let spec = remote_from_import_path("gopkg.in/src-d/go-git.v4", false).unwrap();
        assert_eq!(spec.url, "https://github.com/src-d/go-git.git");
        assert_eq!(spec.version, Some(Version::new("v4")));

        assert!(remote_from_import_path("gopkg.in/yaml", false).is_none());
    }

    #[test]
    fn test_other_hosts() {
        let spec = remote_from_import_path("launchpad.net/gocheck", false).unwrap();
        assert_eq!(spec.kind, VcsKind::Bazaar);
        assert_eq!(spec.url, "lp:gocheck");

        let spec = remote_from_import_path("hg.example.org/proj", false).unwrap();
        assert_eq!(spec.kind, VcsKind::Mercurial);

        assert!(remote_from_import_path("example.com/a/b", false).is_none());
    }

    #[test]
    fn test_system_vcs_refuses_none() {
        let temp_dir = TempDir::new().unwrap();
        assert!(SystemVcs.open(VcsKind::None, temp_dir.path()).is_err());
    }

    #[test]
    fn test_resolve_backend_precedence() {
        let temp_dir = TempDir::new().unwrap();
        let local = temp_dir.path().join("vendor/example.com/a/b");
        let elsewhere = temp_dir.path().join("gopath/src/example.com/a/b");
        fs::create_dir_all(elsewhere.join(".hg")).unwrap();
        let search = vec![elsewhere.clone()];

        // Unknown host, found in a search path
        let candidates = BackendCandidates {
            name: "example.com/a/b",
            explicit_kind: None,
            explicit_url: None,
            local_path: &local,
            search_paths: &search,
            prefer_ssh: false,
        };
        let backend = resolve_backend(&SystemVcs, &candidates).unwrap();
        assert_eq!(backend.repository.kind(), VcsKind::Mercurial);
        assert_eq!(backend.repository.local_path(), local.as_path());

        // Explicit override beats the search path
        let candidates = BackendCandidates {
            explicit_kind: Some(VcsKind::Git),
            explicit_url: Some("https://example.com/a/b.git"),
            ..candidates
        };
        let backend = resolve_backend(&SystemVcs, &candidates).unwrap();
        assert_eq!(backend.repository.kind(), VcsKind::Git);
        assert_eq!(backend.remote_url.as_deref(), Some("https://example.com/a/b.git"));
    }

    #[test]
    fn test_resolve_backend_unresolved() {
        let temp_dir = TempDir::new().unwrap();
        let candidates = BackendCandidates {
            name: "example.com/a/b",
            explicit_kind: None,
            explicit_url: None,
            local_path: temp_dir.path(),
            search_paths: &[],
            prefer_ssh: false,
        };
        let err = resolve_backend(&SystemVcs, &candidates).unwrap_err();
        assert!(err
            .to_string()
            .contains("Could not resolve repository for dependency example.com/a/b"));
    }
}
