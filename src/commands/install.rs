use super::Session;
use anyhow::Result;
use vgo::{manifest, UpdateScope};

pub fn run(dry_run: bool) -> Result<()> {
    let session = Session::open()?;
    let toolchain = session.toolchain()?;
    let resolver = session.resolver(&toolchain);
    let root = session.graph.root();

    if !session.has_manifest {
        println!(
            "⚠ No {} found, discovering imports of the current project",
            manifest::MANIFEST_FILE
        );
        if dry_run {
            resolver.discover_tree(root)?;
        } else {
            resolver.discover(root)?;
        }
    }

    if dry_run {
        println!("[DRY RUN] Would write {}:", manifest::MANIFEST_FILE);
        println!();
        print!("{}", manifest::to_yaml(&session.graph, root)?);
        return Ok(());
    }

    let direct = session.graph.dependencies(root).len();
    if direct == 0 {
        println!("No dependencies to install.");
        session.save()?;
        return Ok(());
    }

    println!("Installing {} direct dependencies...", direct);
    let report = session.install(&resolver, UpdateScope::None)?;
    super::finish_install(&session, &report)
}
