use crate::signal_handler::SignalHandler;
use anyhow::Context;
use std::sync::Arc;
use tether_core::gateway::ToolBackend;
use tether_core::{ProcessSupervisor, RendererBridge, TetherConfig, TetherResult, ToolGateway};
use tether_tools::RendererToolBackend;

/// Serve JSON-RPC on stdin/stdout until EOF or a signal.
///
/// The renderer is launched on the first request that needs a tool, not at startup.
pub async fn run(config: TetherConfig) -> anyhow::Result<()> {
    let signals = SignalHandler::start().context("installing signal handlers")?;
    let supervisor = ProcessSupervisor::new(config.supervisor.clone());
    let bridge = RendererBridge::new(supervisor.clone(), config.bridge.clone())
        .context("registering the renderer")?;

    let gateway = Arc::new(ToolGateway::new(config.gateway.clone(), move || {
        let bridge = bridge.clone();
        async move { connect(bridge).await }
    }));

    tokio::select! {
        served = gateway.serve(tokio::io::stdin(), tokio::io::stdout()) => {
            served.context("serving gateway")?;
            tracing::info!("Input closed");
        }
        _ = signals.wait() => {}
    }

    if let Err(e) = gateway.shutdown().await {
        tracing::warn!(error = %e, "Renderer did not shut down cleanly");
    }
    supervisor.shutdown().await;
    Ok(())
}

/// Start the renderer and load the configured scene
async fn connect(bridge: RendererBridge) -> TetherResult<Arc<dyn ToolBackend>> {
    if !bridge.is_running() {
        bridge.start().await?;
        let scene = bridge.config().scene.clone();
        bridge.initialize_scene(scene).await?;
    }
    Ok(Arc::new(RendererToolBackend::new(bridge)))
}
