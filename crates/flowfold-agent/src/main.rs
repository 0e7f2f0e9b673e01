mod config;
mod controller;
mod server;
mod topology;

use anyhow::{Context, Result};
use flowfold_core::Session;

fn init_tracing() {
    let _ = tracing_subscriber::fmt::try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let config = config::load()?;

    let Some(path) = config.topology.as_deref() else {
        anyhow::bail!("no topology configured (pass --topology or set `topology` in agent.toml)");
    };
    let topology = topology::read_topology(path)?;

    let mut session = Session::new();
    session
        .load(topology)
        .with_context(|| format!("topology {} rejected", path.display()))?;
    tracing::info!(
        socket = %config.socket,
        settle_ms = config.settle_ms,
        "session ready"
    );

    let controller = controller::spawn(session, config.settle_after());
    server::run(&config.socket, controller).await
}
