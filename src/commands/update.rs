use super::Session;
use anyhow::Result;
use std::collections::HashSet;
use vgo::{manifest, UpdateScope};

pub fn run(name: Option<String>) -> Result<()> {
    let session = Session::open()?;

    if !session.has_manifest {
        println!("✗ No {} found in current directory", manifest::MANIFEST_FILE);
        println!();
        println!("Run 'vgo init' first to initialize the project.");
        return Ok(());
    }

    let scope = match name {
        Some(name) => {
            let name = session.repo_name(&name);
            if session.graph.lookup(&name).is_none() {
                anyhow::bail!("{} is not a dependency of this project", name);
            }
            println!("Updating {}...", name);
            UpdateScope::Only(HashSet::from([name]))
        }
        None => {
            println!("Updating all dependencies...");
            UpdateScope::All
        }
    };

    let toolchain = session.toolchain()?;
    let resolver = session.resolver(&toolchain);
    let report = session.install(&resolver, scope)?;
    super::finish_install(&session, &report)
}
