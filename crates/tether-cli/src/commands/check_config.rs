use anyhow::Context;
use tether_core::TetherConfig;

/// Print the effective configuration as pretty JSON on stdout
pub fn run(config: &TetherConfig) -> anyhow::Result<()> {
    let rendered = render(config)?;
    println!("{}", rendered);
    tracing::info!(
        processes = config.processes.len(),
        enabled = config.enabled_processes().count(),
        "Configuration is valid"
    );
    Ok(())
}

fn render(config: &TetherConfig) -> anyhow::Result<String> {
    serde_json::to_string_pretty(config).context("serializing configuration")
}
