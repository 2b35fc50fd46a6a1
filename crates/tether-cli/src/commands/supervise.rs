use crate::signal_handler::SignalHandler;
use anyhow::Context;
use tether_core::supervisor::SupervisorEvent;
use tether_core::{ProcessSupervisor, TetherConfig};
use tokio::sync::broadcast::error::RecvError;

/// Register every enabled process, start them all and run until a signal arrives
pub async fn run(config: TetherConfig) -> anyhow::Result<()> {
    let signals = SignalHandler::start().context("installing signal handlers")?;
    let supervisor = build(&config);

    let reporter = tokio::spawn(report(supervisor.subscribe()));

    let total = supervisor.names().len();
    let started = supervisor.start_all().await;
    tracing::info!(started, total, "Supervisor running");
    if started < total {
        tracing::warn!(failed = total - started, "Some processes failed to start");
    }

    signals.wait().await;

    supervisor.shutdown().await;
    reporter.abort();
    tracing::info!("Supervisor stopped");
    Ok(())
}

fn build(config: &TetherConfig) -> ProcessSupervisor {
    let supervisor = ProcessSupervisor::new(config.supervisor.clone());
    for (name, spec) in config.enabled_processes() {
        supervisor.register(name.clone(), spec.clone());
    }
    supervisor
}

// Surface the events an operator acts on
async fn report(mut events: tokio::sync::broadcast::Receiver<SupervisorEvent>) {
    loop {
        match events.recv().await {
            Ok(SupervisorEvent::RestartsExhausted { name, attempts }) => {
                tracing::error!(process = %name, attempts, "Giving up on process");
            }
            Ok(SupervisorEvent::Unhealthy { name, .. }) => {
                tracing::warn!(process = %name, "Process unhealthy");
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "Event reporter lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_core::ProcessSpec;

    #[test]
    fn test_only_enabled_processes_are_registered() {
        let mut config = TetherConfig::default();
        config.processes.insert("fs".to_string(), ProcessSpec::new("fs-server"));
        let mut git = ProcessSpec::new("git-server");
        git.enabled = false;
        config.processes.insert("git".to_string(), git);

        let supervisor = build(&config);
        assert_eq!(supervisor.names(), vec!["fs".to_string()]);
    }
}
