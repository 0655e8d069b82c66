use super::Session;
use anyhow::Result;
use std::fs;
use vgo::manifest;

pub fn run(name: String) -> Result<()> {
    let session = Session::open()?;

    if !session.has_manifest {
        println!("✗ No {} found in current directory", manifest::MANIFEST_FILE);
        println!();
        println!("Run 'vgo init' first to initialize the project.");
        return Ok(());
    }

    let name = session.repo_name(&name);
    let graph = &session.graph;
    let root = graph.root();

    println!("Removing {}", name);
    println!();

    let Some(id) = graph.remove_dependency(root, &name) else {
        println!("⚠ {} is not a direct dependency", name);
        println!();
        println!("Direct dependencies:");
        for dep in graph.dependencies(root) {
            println!("  - {}", graph.node(dep));
        }
        return Ok(());
    };

    let still_used = graph
        .ids()
        .into_iter()
        .any(|other| graph.dependencies(other).contains(&id));

    if graph.workspace().vendor {
        let path = graph.local_path(id);
        if still_used {
            println!("  ⚠ Keeping {}, other dependencies still need it", path.display());
        } else if path.exists() {
            fs::remove_dir_all(&path)?;
            println!("  ✓ Removed {}", path.display());
        }
    }

    session.save()?;
    println!("  ✓ Removed from {}", manifest::MANIFEST_FILE);
    println!();
    println!("✓ Successfully removed {}", name);
    Ok(())
}
