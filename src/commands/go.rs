use anyhow::{Context, Result};
use std::ffi::OsString;
use std::process::Command;
use vgo::Config;

/// Run the go toolchain with `args`, exiting with its status
pub fn run(args: Vec<OsString>) -> Result<()> {
    let config = Config::load()?;
    let go = &config.toolchain.go;

    tracing::debug!(?args, "passing through to {}", go);

    let status = Command::new(go)
        .args(&args)
        .status()
        .with_context(|| format!("Failed to run {}", go))?;

    if !status.success() {
        std::process::exit(status.code().unwrap_or(1));
    }
    Ok(())
}
