//! Liveness checks

use super::record::{ManagedProcess, ProcessHandle};
use super::types::{HealthStatus, ProcessState};
use super::{ProcessSupervisor, SupervisorEvent};
use crate::error::TetherResult;
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

impl ProcessSupervisor {
    /// Probe one process.
    ///
    /// A `running` record is healthy while its OS process has not exited. A dead
    /// one moves to `unreachable` and publishes [`SupervisorEvent::Unhealthy`];
    /// the exit monitor then takes it to `error`. Non-running records report
    /// `stopped`, `unhealthy` (error) or `unknown` (starting).
    pub async fn check_health(&self, name: &str) -> TetherResult<HealthStatus> {
        let process = self.get(name)?;
        Ok(self.probe(&process))
    }

    /// Probe every registered process concurrently
    pub async fn check_all_health(&self) -> Vec<(String, HealthStatus)> {
        let processes = self.snapshot();
        join_all(
            processes
                .iter()
                .map(|process| async move { (process.name.clone(), self.probe(process)) }),
        )
        .await
    }

    fn probe(&self, process: &ManagedProcess) -> HealthStatus {
        let mut record = process.record.lock();
        let status = match record.state {
            ProcessState::Running => {
                let alive = record.handle.as_ref().is_some_and(ProcessHandle::is_alive);
                if alive {
                    HealthStatus::Healthy
                } else {
                    let reason = "process is no longer alive".to_string();
                    self.transition(process, &mut record, ProcessState::Unreachable);
                    tracing::warn!(process = %process.name, "Health check failed: {}", reason);
                    self.emit(SupervisorEvent::Unhealthy {
                        name: process.name.clone(),
                        reason,
                    });
                    HealthStatus::Unhealthy
                }
            }
            ProcessState::Unreachable | ProcessState::Error => HealthStatus::Unhealthy,
            ProcessState::Starting => HealthStatus::Unknown,
            ProcessState::Stopped | ProcessState::Stopping => HealthStatus::Stopped,
        };
        record.health_status = status;
        record.last_health_check_at = Some(Utc::now());
        status
    }

    /// Run [`check_all_health`](Self::check_all_health) every
    /// `health_check_interval`. No-op if already running.
    pub fn start_health_checks(&self) {
        let mut slot = self.inner.health_task.lock();
        if slot.is_some() {
            return;
        }
        let token = CancellationToken::new();
        *slot = Some(token.clone());

        let period = self.inner.config.health_check_interval;
        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let supervisor = ProcessSupervisor { inner };
                let results = supervisor.check_all_health().await;
                let unhealthy = results
                    .iter()
                    .filter(|(_, status)| *status == HealthStatus::Unhealthy)
                    .count();
                tracing::debug!(checked = results.len(), unhealthy, "Health check sweep");
            }
        });
        tracing::debug!(interval_ms = period.as_millis() as u64, "Health checks started");
    }

    pub fn stop_health_checks(&self) {
        if let Some(token) = self.inner.health_task.lock().take() {
            token.cancel();
            tracing::debug!("Health checks stopped");
        }
    }

    pub fn health_checks_running(&self) -> bool {
        self.inner.health_task.lock().is_some()
    }
}
