use super::Session;
use anyhow::Result;
use std::io::{self, Write};
use vgo::manifest;

pub fn run() -> Result<()> {
    let session = Session::open()?;

    if !session.has_manifest {
        println!("✗ No {} found in current directory", manifest::MANIFEST_FILE);
        println!();
        println!("Run 'vgo init' first to initialize the project.");
        return Ok(());
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    session.graph.write_tree("  ", &mut out)?;

    if session.graph.dependencies(session.graph.root()).is_empty() {
        writeln!(out)?;
        writeln!(out, "No dependencies.")?;
    }
    Ok(())
}
