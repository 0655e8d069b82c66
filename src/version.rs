//! Requested versions and reference matching
//!
//! A requested version is whatever the user (or a parent manifest) wrote in
//! the `ver` field: a commit id, a branch, a tag or a semantic version. vgo
//! only matches references exactly. Range expressions such as `~1.2` are
//! kept verbatim and classified as [`VersionKind::Named`]; matching them
//! against tags is not implemented.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// The shape of a requested version string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionKind {
    /// No version requested; whatever is checked out is accepted
    None,
    /// A (possibly abbreviated) commit id
    Reference,
    /// A semantic version tag, with or without a leading `v`
    SemVer,
    /// A branch, tag or any other symbolic name
    Named,
}

/// Version compatibility string e.g. "v1.2.0", "master" or a commit id
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(String);

impl Version {
    pub fn new<S: Into<String>>(version: S) -> Self {
        Self(version.into().trim().to_string())
    }

    pub fn none() -> Self {
        Self(String::new())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Classify the version string
    pub fn kind(&self) -> VersionKind {
        if self.0.is_empty() {
            return VersionKind::None;
        }

        if is_commit_id(&self.0) {
            return VersionKind::Reference;
        }

        let stripped = self.0.strip_prefix('v').unwrap_or(&self.0);
        if semver::Version::parse(stripped).is_ok() {
            return VersionKind::SemVer;
        }

        VersionKind::Named
    }

    /// Whether a checked out reference satisfies this version.
    ///
    /// Matching is exact. An abbreviated commit id also matches the full id
    /// it is a prefix of, since VCS backends report full ids.
    pub fn is_satisfied_by(&self, reference: &str) -> bool {
        let reference = reference.trim();
        match self.kind() {
            VersionKind::None => true,
            VersionKind::Reference => reference.starts_with(self.0.as_str()),
            VersionKind::SemVer | VersionKind::Named => reference == self.0,
        }
    }
}

fn is_commit_id(value: &str) -> bool {
    static COMMIT_ID: OnceLock<Option<Regex>> = OnceLock::new();
    COMMIT_ID
        .get_or_init(|| Regex::new(r"^[0-9a-f]{7,40}$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(value))
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Version {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Version {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}
