use anyhow::{Context, Result};
use flowfold_core::Topology;
use std::fs;
use std::path::Path;

pub fn read_topology(path: &Path) -> Result<Topology> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read topology {}", path.display()))?;
    let topology = Topology::from_json(&text)
        .with_context(|| format!("failed to parse topology {}", path.display()))?;
    tracing::debug!(
        path = %path.display(),
        nodes = topology.nodes.len(),
        links = topology.links.len(),
        "topology file read"
    );
    Ok(topology)
}
