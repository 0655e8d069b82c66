use super::Session;
use anyhow::Result;
use vgo::{manifest, UpdateScope};

pub fn run(dry_run: bool) -> Result<()> {
    let session = Session::open()?;

    if session.has_manifest {
        println!("✓ {} already exists in this directory", manifest::MANIFEST_FILE);
        println!();
        println!("Run 'vgo install' to install its dependencies.");
        return Ok(());
    }

    println!("Discovering imports...");
    let toolchain = session.toolchain()?;
    let resolver = session.resolver(&toolchain);
    let root = session.graph.root();

    if dry_run {
        resolver.discover_tree(root)?;
        println!();
        print!("{}", manifest::to_yaml(&session.graph, root)?);
        return Ok(());
    }

    let direct = resolver.discover(root)?;
    println!("✓ Found {} direct dependencies", direct.len());
    println!();

    let report = session.install(&resolver, UpdateScope::None)?;
    super::finish_install(&session, &report)?;

    println!();
    println!("Next steps:");
    println!("  • Commit {} to pin these revisions", manifest::MANIFEST_FILE);
    println!("  • Add dependencies: vgo get <name> [version]");
    println!("  • View the tree: vgo tree");
    Ok(())
}
