//! Process supervision
//!
//! [`ProcessSupervisor`] owns a registry of named process specs and drives each one
//! through the lifecycle state machine:
//!
//! ```text
//! stopped -> starting -> running -> stopping -> stopped
//!               |           |  \
//!               v           v   -> unreachable -> error | stopping
//!             error <-------+
//!               |
//!               +-> starting   (manual start or automatic restart)
//! ```
//!
//! Unexpected exits from `running` go to `error` and are retried with a linear
//! backoff (`restart_delay * attempt`) up to `max_restart_attempts`, after which a
//! [`SupervisorEvent::RestartsExhausted`] is published and the record stays in
//! `error` until someone intervenes. Every state change is published as
//! [`SupervisorEvent::StateChanged`].
//!
//! Health checks only verify OS-level liveness; a hung process that is still
//! alive reads as healthy.

mod events;
mod health;
mod lifecycle;
mod record;
mod types;

#[cfg(all(test, unix))]
mod tests;

pub use events::{SupervisorEvent, SupervisorEventKind};
pub use types::{
    ExitInfo, HealthStatus, OutputStream, ProcessState, ProcessStatus, StopOptions,
    SupervisorStats,
};

use crate::config::{ProcessSpec, SupervisorConfig};
use crate::error::{TetherError, TetherResult};
use crate::events::{FilteredSubscriber, KeyedEventBus};
use crate::ipc::{FramedMessage, MessageSink, ProcessChannel};
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use record::{ManagedProcess, ProcessRecord};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

pub(crate) struct Inner {
    config: SupervisorConfig,
    working_dir: Option<PathBuf>,
    processes: RwLock<HashMap<String, Arc<ManagedProcess>>>,
    events: KeyedEventBus<SupervisorEvent>,
    health_task: Mutex<Option<CancellationToken>>,
}

/// Supervisor of named child processes. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ProcessSupervisor {
    inner: Arc<Inner>,
}

impl ProcessSupervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        Self::build(config, None)
    }

    /// Launch processes without their own `cwd` in `dir`
    pub fn with_working_dir(config: SupervisorConfig, dir: impl Into<PathBuf>) -> Self {
        Self::build(config, Some(dir.into()))
    }

    fn build(config: SupervisorConfig, working_dir: Option<PathBuf>) -> Self {
        let events = KeyedEventBus::new(config.event_capacity);
        Self {
            inner: Arc::new(Inner {
                config,
                working_dir,
                processes: RwLock::new(HashMap::new()),
                events,
                health_task: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.inner.config
    }

    /// Add a process in state `stopped`. Returns false if the name is taken.
    pub fn register(&self, name: impl Into<String>, spec: ProcessSpec) -> bool {
        let name = name.into();
        {
            let mut processes = self.inner.processes.write();
            if processes.contains_key(&name) {
                tracing::warn!(process = %name, "Process already registered");
                return false;
            }
            let process = ManagedProcess::new(name.clone(), spec, self.inner.config.event_capacity);
            processes.insert(name.clone(), Arc::new(process));
        }
        tracing::info!(process = %name, "Registered process");
        self.emit(SupervisorEvent::Registered { name });
        true
    }

    /// Stop the process if it is running, then remove it. Returns false if unknown.
    pub async fn unregister(&self, name: &str) -> bool {
        let Some(process) = self.lookup(name) else {
            return false;
        };

        let live = {
            let record = process.record.lock();
            record.restart_token.cancel();
            record.state.is_live()
        };
        if live {
            if let Err(e) = self.stop(name).await {
                tracing::warn!(process = %name, error = %e, "Stop during unregister failed");
            }
        }

        self.inner.processes.write().remove(name);
        process.channel.detach("process unregistered");
        tracing::info!(process = %name, "Unregistered process");
        self.emit(SupervisorEvent::Unregistered {
            name: name.to_string(),
        });
        true
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.inner.processes.read().contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.inner.processes.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn status(&self, name: &str) -> Option<ProcessStatus> {
        self.lookup(name).map(|p| p.status())
    }

    /// Status of every record, sorted by name
    pub fn all_status(&self) -> Vec<ProcessStatus> {
        self.snapshot().iter().map(|p| p.status()).collect()
    }

    pub fn stats(&self) -> SupervisorStats {
        let mut stats = SupervisorStats::default();
        for status in self.all_status() {
            stats.total += 1;
            match status.state {
                ProcessState::Running => stats.running += 1,
                ProcessState::Stopped => stats.stopped += 1,
                ProcessState::Error => stats.error += 1,
                _ => {}
            }
            match status.health_status {
                HealthStatus::Healthy => stats.healthy += 1,
                HealthStatus::Unhealthy => stats.unhealthy += 1,
                _ => {}
            }
        }
        stats
    }

    /// Message channel of a registered process
    pub fn channel(&self, name: &str) -> Option<Arc<ProcessChannel>> {
        self.lookup(name).map(|p| Arc::clone(&p.channel))
    }

    /// Fire-and-forget message to a process
    pub async fn send(&self, name: &str, message: FramedMessage) -> TetherResult<()> {
        let process = self.get(name)?;
        process.channel.send(message).await
    }

    /// Correlated call to a process
    pub async fn call(
        &self,
        name: &str,
        kind: &str,
        payload: Value,
        timeout: Duration,
    ) -> TetherResult<Value> {
        let process = self.get(name)?;
        process.channel.call(kind, payload, timeout).await
    }

    /// Correlated call whose message is built from the call id
    pub async fn call_with<F>(
        &self,
        name: &str,
        kind: &str,
        timeout: Duration,
        build: F,
    ) -> TetherResult<Value>
    where
        F: FnOnce(&str) -> FramedMessage + Send,
    {
        let process = self.get(name)?;
        process.channel.call_with(kind, timeout, build).await
    }

    /// Every supervisor event
    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.inner.events.subscribe_all()
    }

    /// One kind of supervisor event
    pub fn subscribe_kind(&self, kind: SupervisorEventKind) -> broadcast::Receiver<SupervisorEvent> {
        self.inner.events.subscribe(kind)
    }

    /// Events concerning one process
    pub fn subscribe_process(&self, name: impl Into<String>) -> FilteredSubscriber<SupervisorEvent> {
        let name = name.into();
        FilteredSubscriber::new(self.inner.events.subscribe_all(), move |event| {
            event.process_name() == Some(name.as_str())
        })
    }

    /// Start every registered process concurrently; returns how many started
    pub async fn start_all(&self) -> usize {
        let names = self.names();
        let total = names.len();
        let results = join_all(names.iter().map(|name| async move {
            match self.start(name).await {
                Ok(started) => started,
                Err(e) => {
                    tracing::error!(process = %name, error = %e, "Failed to start process");
                    false
                }
            }
        }))
        .await;

        let started = results.into_iter().filter(|ok| *ok).count();
        self.start_health_checks();
        tracing::info!(started, total, "Started all processes");
        self.emit(SupervisorEvent::BulkStarted { started, total });
        started
    }

    /// Stop every running process concurrently; returns how many stopped
    pub async fn stop_all(&self) -> usize {
        let names = self.names();
        let total = names.len();
        let results = join_all(names.iter().map(|name| async move {
            match self.stop(name).await {
                Ok(stopped) => stopped,
                Err(e) => {
                    tracing::error!(process = %name, error = %e, "Failed to stop process");
                    false
                }
            }
        }))
        .await;

        let stopped = results.into_iter().filter(|ok| *ok).count();
        self.stop_health_checks();
        tracing::info!(stopped, total, "Stopped all processes");
        self.emit(SupervisorEvent::BulkStopped { stopped, total });
        stopped
    }

    /// Cancel pending restarts and health checks, then stop everything
    pub async fn shutdown(&self) {
        tracing::info!("Supervisor shutting down");
        self.stop_health_checks();
        for process in self.snapshot() {
            process.record.lock().restart_token.cancel();
        }
        self.stop_all().await;
    }

    fn lookup(&self, name: &str) -> Option<Arc<ManagedProcess>> {
        self.inner.processes.read().get(name).cloned()
    }

    fn get(&self, name: &str) -> TetherResult<Arc<ManagedProcess>> {
        self.lookup(name)
            .ok_or_else(|| TetherError::not_registered(name))
    }

    fn snapshot(&self) -> Vec<Arc<ManagedProcess>> {
        let mut processes: Vec<_> = self.inner.processes.read().values().cloned().collect();
        processes.sort_by(|a, b| a.name.cmp(&b.name));
        processes
    }

    fn emit(&self, event: SupervisorEvent) {
        tracing::trace!(event = event.event_type(), "Supervisor event");
        self.inner.events.publish(event);
    }

    /// Move a record along a legal edge and publish the change
    fn transition(&self, process: &ManagedProcess, record: &mut ProcessRecord, to: ProcessState) {
        let from = record.state;
        if !from.can_transition_to(to) {
            tracing::error!(process = %process.name, %from, %to, "Refusing illegal state transition");
            return;
        }
        record.state = to;
        tracing::debug!(process = %process.name, %from, %to, "State changed");
        self.emit(SupervisorEvent::StateChanged {
            name: process.name.clone(),
            from,
            to,
        });
    }
}
