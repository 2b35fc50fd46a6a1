//! Types for process supervision

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Lifecycle state of a supervised process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Error,
    /// Running, but a health check found the OS process gone
    Unreachable,
}

impl ProcessState {
    /// Legal edges of the lifecycle state machine.
    ///
    /// There is no `stopped -> running` or `running -> stopped` shortcut:
    /// `starting` and `stopping` are always observed in between.
    pub fn can_transition_to(self, next: ProcessState) -> bool {
        use ProcessState::*;
        matches!(
            (self, next),
            (Stopped, Starting)
                | (Error, Starting)
                | (Starting, Running)
                | (Starting, Error)
                | (Running, Stopping)
                | (Running, Error)
                | (Running, Unreachable)
                | (Unreachable, Error)
                | (Unreachable, Stopping)
                | (Stopping, Stopped)
                | (Stopping, Error)
        )
    }

    /// Whether an OS process is expected to exist
    pub fn is_live(self) -> bool {
        matches!(self, ProcessState::Running | ProcessState::Unreachable)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProcessState::Stopped => "stopped",
            ProcessState::Starting => "starting",
            ProcessState::Running => "running",
            ProcessState::Stopping => "stopping",
            ProcessState::Error => "error",
            ProcessState::Unreachable => "unreachable",
        }
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of the most recent liveness check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    #[default]
    Unknown,
    Healthy,
    Unhealthy,
    Stopped,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealthStatus::Unknown => "unknown",
            HealthStatus::Healthy => "healthy",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Which child stream a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// How a process ended
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExitInfo {
    pub code: Option<i32>,
    pub signal: Option<i32>,
    /// Set when waiting on the process itself failed
    pub error: Option<String>,
}

impl ExitInfo {
    pub fn from_status(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
            error: None,
        }
    }

    pub fn from_error(error: &std::io::Error) -> Self {
        Self {
            code: None,
            signal: None,
            error: Some(error.to_string()),
        }
    }

    /// Exit code 0: a graceful, expected exit
    pub fn is_clean(&self) -> bool {
        self.code == Some(0)
    }

    pub fn describe(&self) -> String {
        match (&self.error, self.code, self.signal) {
            (Some(err), _, _) => format!("wait failed: {}", err),
            (None, Some(code), _) => format!("exited with code {}", code),
            (None, None, Some(signal)) => format!("terminated by signal {}", signal),
            (None, None, None) => "exited".to_string(),
        }
    }
}

/// Timing of a stop's escalation.
///
/// After `signal_delay` the process gets SIGTERM; if it is still alive at
/// `kill_after` (measured from the start of the stop) it gets SIGKILL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopOptions {
    pub signal_delay: Duration,
    pub kill_after: Duration,
}

impl StopOptions {
    /// SIGTERM immediately, SIGKILL after `grace`
    pub fn graceful(grace: Duration) -> Self {
        Self {
            signal_delay: Duration::ZERO,
            kill_after: grace,
        }
    }
}

/// Point-in-time view of one process record
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessStatus {
    pub name: String,
    pub state: ProcessState,
    pub pid: Option<u32>,
    pub restart_attempts: u32,
    pub last_error: Option<String>,
    pub health_status: HealthStatus,
    pub last_health_check_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    #[serde(with = "humantime_serde")]
    pub uptime: Option<Duration>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// Aggregate counts across all records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SupervisorStats {
    pub total: usize,
    pub running: usize,
    pub stopped: usize,
    pub error: usize,
    pub healthy: usize,
    pub unhealthy: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ProcessState; 6] = [
        ProcessState::Stopped,
        ProcessState::Starting,
        ProcessState::Running,
        ProcessState::Stopping,
        ProcessState::Error,
        ProcessState::Unreachable,
    ];

    #[test]
    fn test_no_shortcut_edges() {
        assert!(!ProcessState::Stopped.can_transition_to(ProcessState::Running));
        assert!(!ProcessState::Running.can_transition_to(ProcessState::Stopped));
        assert!(!ProcessState::Error.can_transition_to(ProcessState::Running));
    }

    #[test]
    fn test_no_self_loops() {
        for state in ALL {
            assert!(!state.can_transition_to(state), "{} -> {}", state, state);
        }
    }

    #[test]
    fn test_every_state_is_reachable_and_leavable() {
        for state in ALL {
            assert!(ALL.iter().any(|s| s.can_transition_to(state)), "{} unreachable", state);
            assert!(ALL.iter().any(|s| state.can_transition_to(*s)), "{} is a dead end", state);
        }
    }

    #[test]
    fn test_exit_info_describe() {
        let clean = ExitInfo {
            code: Some(0),
            ..Default::default()
        };
        assert!(clean.is_clean());

        let killed = ExitInfo {
            signal: Some(9),
            ..Default::default()
        };
        assert!(!killed.is_clean());
        assert_eq!(killed.describe(), "terminated by signal 9");
    }

    #[test]
    fn test_state_serializes_lowercase() {
        assert_eq!(serde_json::to_value(ProcessState::Unreachable).unwrap(), "unreachable");
        assert_eq!(HealthStatus::Unhealthy.to_string(), "unhealthy");
    }
}
