use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("Manifest not found: {}", .0.display())]
    ManifestNotFound(PathBuf),

    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("Could not resolve repository for dependency {0}\n\n\
             Hint: vgo infers the version control system and remote URL from the\n\
             import path host (github.com, golang.org, gopkg.in, ...) or from an\n\
             existing working copy.\n\n\
             Solutions:\n\
             1. Add a `url` (and optionally `vcs`) entry for the dependency in vgo.yaml\n\
             2. Clone the repository into the vendor directory or $GOPATH/src yourself")]
    UnresolvedRepository(String),

    #[error("{name}: {message}")]
    Vcs { name: String, message: String },

    #[error("Reference '{reference}' not found for dependency {name}")]
    ReferenceNotFound { name: String, reference: String },

    #[error("Dependency {0} is not installed")]
    NotInstalled(String),

    #[error("Failed to list package {import_path}: {message}")]
    Introspection { import_path: String, message: String },

    #[error("Go toolchain error: {0}\n\n\
             Hint: Make sure `go` is on your PATH, or set GOROOT / `toolchain.go`\n\
             in ~/.vgo/config.toml.")]
    Toolchain(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}
