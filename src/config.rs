//! User configuration management
//!
//! Configuration is stored in TOML format at `~/.vgo/config.toml`. Every
//! field has a default, so a missing file or a partial file is fine.
//!
//! # Examples
//!
//! ```no_run
//! use vgo::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load()?;
//! println!("Vendoring: {}", config.install.vendor);
//! println!("Workers: {}", config.install.jobs);
//! println!("GOPATH: {}", config.gopath()?.display());
//! # Ok(())
//! # }
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// User configuration file (`~/.vgo/config.toml`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Installation settings
    #[serde(default)]
    pub install: InstallConfig,

    /// Import resolution settings
    #[serde(default)]
    pub resolve: ResolveConfig,

    /// Version control settings
    #[serde(default)]
    pub vcs: VcsConfig,

    /// Go toolchain location
    #[serde(default)]
    pub toolchain: ToolchainConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallConfig {
    /// Install dependencies into `<project>/vendor` instead of `$GOPATH/src`
    #[serde(default = "default_vendor")]
    pub vendor: bool,

    /// Maximum number of concurrent clone/checkout workers
    #[serde(default = "default_jobs")]
    pub jobs: usize,
}

fn default_vendor() -> bool {
    true
}

fn default_jobs() -> usize {
    4
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            vendor: default_vendor(),
            jobs: default_jobs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveConfig {
    /// Number of import path segments that make up a repository root
    /// (`github.com/org/repo` is 3)
    #[serde(default = "default_repo_root_depth")]
    pub repo_root_depth: usize,

    /// Also follow test-only imports of the project
    #[serde(default)]
    pub include_test_imports: bool,
}

fn default_repo_root_depth() -> usize {
    3
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            repo_root_depth: default_repo_root_depth(),
            include_test_imports: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VcsConfig {
    /// Generate `git@host:org/repo.git` remotes instead of https ones
    #[serde(default)]
    pub prefer_ssh: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolchainConfig {
    /// Go binary used for `go list` and pass-through commands
    #[serde(default = "default_go_binary")]
    pub go: String,

    /// Go installation root (defaults to `go env GOROOT`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goroot: Option<PathBuf>,

    /// Shared package root (defaults to `~/go`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gopath: Option<PathBuf>,
}

fn default_go_binary() -> String {
    "go".to_string()
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            go: default_go_binary(),
            goroot: None,
            gopath: None,
        }
    }
}

impl Config {
    /// Get the default config file path
    ///
    /// Uses VGO_CONFIG_DIR if set, otherwise ~/.vgo/config.toml
    pub fn default_path() -> Result<PathBuf> {
        // Check for custom config directory (useful for testing)
        if let Ok(config_dir) = std::env::var("VGO_CONFIG_DIR") {
            return Ok(PathBuf::from(config_dir).join("config.toml"));
        }

        let home = dirs::home_dir()
            .ok_or_else(|| Error::Other("Could not find home directory".to_string()))?;

        Ok(home.join(".vgo").join("config.toml"))
    }

    /// Load config from the default location, falling back to defaults
    ///
    /// Environment variable overrides:
    /// - `GOPATH`: shared package root (first entry of the list)
    /// - `GOROOT`: Go installation root
    /// - `VGO_VENDOR`: `0`, `false` or `no` installs into `$GOPATH/src`
    /// - `VGO_JOBS`: number of concurrent workers
    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;
        let mut config = Self::load_from(&path)?;
        config.apply_env();
        Ok(config)
    }

    /// Load config from a specific file without environment overrides
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;
        config.install.jobs = config.install.jobs.max(1);
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Some(gopath) = std::env::var_os("GOPATH") {
            if let Some(first) = std::env::split_paths(&gopath).next() {
                if !first.as_os_str().is_empty() {
                    self.toolchain.gopath = Some(first);
                }
            }
        }

        if let Some(goroot) = std::env::var_os("GOROOT") {
            if !goroot.is_empty() {
                self.toolchain.goroot = Some(PathBuf::from(goroot));
            }
        }

        if let Ok(vendor) = std::env::var("VGO_VENDOR") {
            self.install.vendor = parse_flag(&vendor).unwrap_or(self.install.vendor);
        }

        if let Ok(jobs) = std::env::var("VGO_JOBS") {
            if let Ok(jobs) = jobs.trim().parse::<usize>() {
                self.install.jobs = jobs.max(1);
            }
        }
    }

    /// The shared package root, `$GOPATH` or `~/go`
    pub fn gopath(&self) -> Result<PathBuf> {
        if let Some(gopath) = &self.toolchain.gopath {
            return Ok(gopath.clone());
        }
        dirs::home_dir()
            .map(|home| home.join("go"))
            .ok_or_else(|| Error::Other("Could not determine GOPATH".to_string()))
    }

    /// The Go installation root, asking the toolchain when not configured
    pub fn goroot(&self) -> Result<PathBuf> {
        if let Some(goroot) = &self.toolchain.goroot {
            return Ok(goroot.clone());
        }

        let output = Command::new(&self.toolchain.go)
            .args(["env", "GOROOT"])
            .output()
            .map_err(|e| Error::Toolchain(format!("failed to run {}: {}", self.toolchain.go, e)))?;

        let goroot = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !output.status.success() || goroot.is_empty() {
            return Err(Error::Toolchain(
                "`go env GOROOT` returned no installation root".to_string(),
            ));
        }

        Ok(PathBuf::from(goroot))
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
