//! Standard library package classification
//!
//! The set of standard packages is taken from the directory tree under
//! `$GOROOT/src`, scanned once and cached for the rest of the run.

use crate::Result;
use std::collections::HashSet;
use std::path::Path;
use walkdir::WalkDir;

/// Pseudo-packages the toolchain accepts without a directory in GOROOT
const PSEUDO_PACKAGES: &[&str] = &["C"];

/// Cached set of import paths belonging to the Go distribution
#[derive(Debug, Clone, Default)]
pub struct NativePackages {
    packages: HashSet<String>,
}

impl NativePackages {
    /// Scan `<goroot>/src` for package directories
    pub fn scan<P: AsRef<Path>>(goroot: P) -> Result<Self> {
        let src = goroot.as_ref().join("src");
        let mut packages: HashSet<String> =
            PSEUDO_PACKAGES.iter().map(|p| p.to_string()).collect();

        for entry in WalkDir::new(&src).min_depth(1) {
            let entry = entry.map_err(|e| std::io::Error::other(e.to_string()))?;
            if !entry.file_type().is_dir() {
                continue;
            }
            if let Ok(rel) = entry.path().strip_prefix(&src) {
                let name = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                packages.insert(name);
            }
        }

        tracing::debug!(
            goroot = %goroot.as_ref().display(),
            count = packages.len(),
            "scanned standard packages"
        );

        Ok(Self { packages })
    }

    /// Build a classifier from a known list of package names
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut packages: HashSet<String> = names.into_iter().map(Into::into).collect();
        packages.extend(PSEUDO_PACKAGES.iter().map(|p| p.to_string()));
        Self { packages }
    }

    /// Whether the import path belongs to the standard distribution
    pub fn is_native(&self, import_path: &str) -> bool {
        self.packages.contains(import_path)
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}
