//! Events published by the supervisor

use super::types::{OutputStream, ProcessState};
use crate::events::TypedEvent;
use std::time::Duration;

/// Something observable happened to a supervised process
#[derive(Debug, Clone, PartialEq)]
pub enum SupervisorEvent {
    Registered {
        name: String,
    },
    Unregistered {
        name: String,
    },
    StateChanged {
        name: String,
        from: ProcessState,
        to: ProcessState,
    },
    Started {
        name: String,
        pid: Option<u32>,
    },
    Stopped {
        name: String,
    },
    Exited {
        name: String,
        code: Option<i32>,
        signal: Option<i32>,
    },
    /// Launch failure, unexpected exit or failed stop
    Failed {
        name: String,
        error: String,
    },
    Unhealthy {
        name: String,
        reason: String,
    },
    RestartScheduled {
        name: String,
        attempt: u32,
        delay: Duration,
    },
    /// Automatic recovery gave up; the record stays in `error`
    RestartsExhausted {
        name: String,
        attempts: u32,
    },
    /// A non-protocol line from the child
    Output {
        name: String,
        stream: OutputStream,
        line: String,
    },
    /// A malformed or oversized protocol line was dropped
    ProtocolViolation {
        name: String,
        line: String,
        reason: String,
    },
    BulkStarted {
        started: usize,
        total: usize,
    },
    BulkStopped {
        stopped: usize,
        total: usize,
    },
}

/// Routing key of a [`SupervisorEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SupervisorEventKind {
    Registered,
    Unregistered,
    StateChanged,
    Started,
    Stopped,
    Exited,
    Failed,
    Unhealthy,
    RestartScheduled,
    RestartsExhausted,
    Output,
    ProtocolViolation,
    BulkStarted,
    BulkStopped,
}

impl SupervisorEvent {
    /// Process the event concerns, if any
    pub fn process_name(&self) -> Option<&str> {
        match self {
            Self::Registered { name }
            | Self::Unregistered { name }
            | Self::StateChanged { name, .. }
            | Self::Started { name, .. }
            | Self::Stopped { name }
            | Self::Exited { name, .. }
            | Self::Failed { name, .. }
            | Self::Unhealthy { name, .. }
            | Self::RestartScheduled { name, .. }
            | Self::RestartsExhausted { name, .. }
            | Self::Output { name, .. }
            | Self::ProtocolViolation { name, .. } => Some(name),
            Self::BulkStarted { .. } | Self::BulkStopped { .. } => None,
        }
    }

    /// Dotted event name, e.g. `process.restart_scheduled`
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Registered { .. } => "process.registered",
            Self::Unregistered { .. } => "process.unregistered",
            Self::StateChanged { .. } => "process.state_changed",
            Self::Started { .. } => "process.started",
            Self::Stopped { .. } => "process.stopped",
            Self::Exited { .. } => "process.exited",
            Self::Failed { .. } => "process.failed",
            Self::Unhealthy { .. } => "process.unhealthy",
            Self::RestartScheduled { .. } => "process.restart_scheduled",
            Self::RestartsExhausted { .. } => "process.restarts_exhausted",
            Self::Output { .. } => "process.output",
            Self::ProtocolViolation { .. } => "process.protocol_violation",
            Self::BulkStarted { .. } => "supervisor.started_all",
            Self::BulkStopped { .. } => "supervisor.stopped_all",
        }
    }
}

impl TypedEvent for SupervisorEvent {
    type Kind = SupervisorEventKind;

    fn kind(&self) -> SupervisorEventKind {
        match self {
            Self::Registered { .. } => SupervisorEventKind::Registered,
            Self::Unregistered { .. } => SupervisorEventKind::Unregistered,
            Self::StateChanged { .. } => SupervisorEventKind::StateChanged,
            Self::Started { .. } => SupervisorEventKind::Started,
            Self::Stopped { .. } => SupervisorEventKind::Stopped,
            Self::Exited { .. } => SupervisorEventKind::Exited,
            Self::Failed { .. } => SupervisorEventKind::Failed,
            Self::Unhealthy { .. } => SupervisorEventKind::Unhealthy,
            Self::RestartScheduled { .. } => SupervisorEventKind::RestartScheduled,
            Self::RestartsExhausted { .. } => SupervisorEventKind::RestartsExhausted,
            Self::Output { .. } => SupervisorEventKind::Output,
            Self::ProtocolViolation { .. } => SupervisorEventKind::ProtocolViolation,
            Self::BulkStarted { .. } => SupervisorEventKind::BulkStarted,
            Self::BulkStopped { .. } => SupervisorEventKind::BulkStopped,
        }
    }
}
