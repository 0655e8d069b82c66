//! Package introspection through the Go toolchain
//!
//! vgo never parses Go sources itself. It asks `go list -json` for a
//! package's resolved import path and direct imports.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Direct import information for one package
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PackageInfo {
    /// The import path as resolved by the toolchain (vendor prefixes included)
    pub import_path: String,

    #[serde(default)]
    pub imports: Vec<String>,

    #[serde(default)]
    pub test_imports: Vec<String>,

    #[serde(default)]
    pub x_test_imports: Vec<String>,
}

impl PackageInfo {
    /// Test-only imports, in-package and external test packages combined
    pub fn all_test_imports(&self) -> impl Iterator<Item = &String> {
        self.test_imports.iter().chain(self.x_test_imports.iter())
    }
}

/// Answers "what does this package import?"
pub trait PackageIntrospector: Send + Sync {
    /// List the package `import_path` as seen from `dir`.
    ///
    /// Fails when the package is not (yet) present on disk.
    fn list(&self, import_path: &str, dir: &Path) -> Result<PackageInfo>;
}

/// Introspector that runs `go list -json`
#[derive(Debug, Clone)]
pub struct GoList {
    go: String,
    gopath: Option<PathBuf>,
}

impl GoList {
    pub fn new<S: Into<String>>(go: S) -> Self {
        Self {
            go: go.into(),
            gopath: None,
        }
    }

    /// Run the toolchain with an explicit GOPATH
    pub fn with_gopath<P: Into<PathBuf>>(mut self, gopath: P) -> Self {
        self.gopath = Some(gopath.into());
        self
    }
}

impl Default for GoList {
    fn default() -> Self {
        Self::new("go")
    }
}

impl PackageIntrospector for GoList {
    fn list(&self, import_path: &str, dir: &Path) -> Result<PackageInfo> {
        let mut cmd = Command::new(&self.go);
        cmd.args(["list", "-json", import_path])
            .current_dir(dir);
        if let Some(gopath) = &self.gopath {
            cmd.env("GOPATH", gopath);
        }

        tracing::debug!(import_path, dir = %dir.display(), "go list");

        let output = cmd
            .output()
            .map_err(|e| Error::Toolchain(format!("failed to run {}: {}", self.go, e)))?;

        if !output.status.success() {
            return Err(Error::Introspection {
                import_path: import_path.to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let info: PackageInfo = serde_json::from_slice(&output.stdout)?;
        Ok(info)
    }
}
