//! Per-process bookkeeping owned by the supervisor

use super::types::{ExitInfo, HealthStatus, ProcessState, ProcessStatus};
use crate::config::ProcessSpec;
use crate::ipc::ProcessChannel;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Access to the live OS process.
///
/// The `Child` itself belongs to the monitor task; the handle observes its exit
/// and can ask the monitor to kill it.
#[derive(Debug, Clone)]
pub(crate) struct ProcessHandle {
    pub pid: Option<u32>,
    pub exit_rx: watch::Receiver<Option<ExitInfo>>,
    pub kill: CancellationToken,
}

impl ProcessHandle {
    /// The monitor has not observed an exit and the OS still knows the pid
    pub fn is_alive(&self) -> bool {
        self.exit_rx.borrow().is_none() && self.pid.is_none_or(pid_alive)
    }
}

#[cfg(unix)]
fn pid_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;
    kill(Pid::from_raw(pid as i32), None).is_ok()
}

#[cfg(not(unix))]
fn pid_alive(_pid: u32) -> bool {
    true
}

/// Mutable lifecycle data of one process. Only supervisor transition methods write it.
#[derive(Debug)]
pub(crate) struct ProcessRecord {
    pub state: ProcessState,
    pub handle: Option<ProcessHandle>,
    pub restart_attempts: u32,
    pub last_error: Option<String>,
    pub health_status: HealthStatus,
    pub last_health_check_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub started_instant: Option<Instant>,
    /// Bumped on every launch so stale exit notifications are ignored
    pub generation: u64,
    /// Cancels a scheduled automatic restart
    pub restart_token: CancellationToken,
}

impl Default for ProcessRecord {
    fn default() -> Self {
        Self {
            state: ProcessState::Stopped,
            handle: None,
            restart_attempts: 0,
            last_error: None,
            health_status: HealthStatus::Unknown,
            last_health_check_at: None,
            started_at: None,
            started_instant: None,
            generation: 0,
            restart_token: CancellationToken::new(),
        }
    }
}

/// A registered process: immutable spec, mutable record, message channel
pub(crate) struct ManagedProcess {
    pub name: String,
    pub spec: ProcessSpec,
    pub record: Mutex<ProcessRecord>,
    pub channel: Arc<ProcessChannel>,
}

impl ManagedProcess {
    pub fn new(name: String, spec: ProcessSpec, event_capacity: usize) -> Self {
        let channel = Arc::new(ProcessChannel::new(name.clone(), event_capacity));
        Self {
            name,
            spec,
            record: Mutex::new(ProcessRecord::default()),
            channel,
        }
    }

    pub fn status(&self) -> ProcessStatus {
        let record = self.record.lock();
        let live = record.state.is_live();
        ProcessStatus {
            name: self.name.clone(),
            state: record.state,
            pid: record.handle.as_ref().and_then(|h| h.pid),
            restart_attempts: record.restart_attempts,
            last_error: record.last_error.clone(),
            health_status: record.health_status,
            last_health_check_at: record.last_health_check_at,
            started_at: record.started_at,
            uptime: record
                .started_instant
                .filter(|_| live)
                .map(|started| started.elapsed()),
            kind: self.spec.kind.clone(),
        }
    }
}
