use super::Session;
use anyhow::Result;
use std::collections::HashSet;
use vgo::{UpdateScope, Version};

pub fn run(name: String, version: Option<String>) -> Result<()> {
    let session = Session::open()?;
    let name = session.repo_name(&name);
    if name.is_empty() {
        anyhow::bail!("Invalid dependency name");
    }

    let graph = &session.graph;
    let root = graph.root();
    let (id, created) = graph.insert_or_get(&name, root);
    if graph.is_root(id) {
        anyhow::bail!("{} is the project itself", name);
    }
    graph.add_dependency(root, id);

    if let Some(version) = &version {
        let node = graph.node(id);
        let mut state = node.write();
        state.requested_version = Version::new(version.as_str());
        state.reference.clear();
    }

    match (&version, created) {
        (Some(v), _) => println!("Getting {} @ {}...", name, v),
        (None, true) => println!("Getting {}...", name),
        (None, false) => println!("Refreshing {}...", name),
    }

    let toolchain = session.toolchain()?;
    let resolver = session.resolver(&toolchain);
    let report = session.install(&resolver, UpdateScope::Only(HashSet::from([name])))?;
    super::finish_install(&session, &report)
}
