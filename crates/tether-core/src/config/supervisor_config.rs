//! Supervisor lifecycle and restart policy configuration

use super::defaults::supervisor as defaults;
use crate::error::{TetherError, TetherResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_health_check_interval() -> Duration {
    defaults::HEALTH_CHECK_INTERVAL
}

fn default_true() -> bool {
    true
}

fn default_max_restart_attempts() -> u32 {
    defaults::MAX_RESTART_ATTEMPTS
}

fn default_restart_delay() -> Duration {
    defaults::RESTART_DELAY
}

fn default_stop_grace_period() -> Duration {
    defaults::STOP_GRACE_PERIOD
}

fn default_kill_timeout() -> Duration {
    defaults::KILL_TIMEOUT
}

fn default_stable_run_threshold() -> Duration {
    defaults::STABLE_RUN_THRESHOLD
}

fn default_event_capacity() -> usize {
    defaults::EVENT_CAPACITY
}

/// Supervisor settings. Durations accept humantime strings such as `"30s"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Period of the background liveness sweep
    #[serde(with = "humantime_serde", default = "default_health_check_interval")]
    pub health_check_interval: Duration,
    /// Restart processes that exit unexpectedly
    #[serde(default = "default_true")]
    pub auto_restart: bool,
    /// Automatic restarts allowed before settling in `error`
    #[serde(default = "default_max_restart_attempts")]
    pub max_restart_attempts: u32,
    /// Base restart delay, multiplied by the attempt number
    #[serde(with = "humantime_serde", default = "default_restart_delay")]
    pub restart_delay: Duration,
    /// Time between SIGTERM and SIGKILL on stop
    #[serde(with = "humantime_serde", default = "default_stop_grace_period")]
    pub stop_grace_period: Duration,
    /// Time to wait for the OS to reap a killed process
    #[serde(with = "humantime_serde", default = "default_kill_timeout")]
    pub kill_timeout: Duration,
    /// A run at least this long resets the restart counter
    #[serde(with = "humantime_serde", default = "default_stable_run_threshold")]
    pub stable_run_threshold: Duration,
    /// Capacity of the broadcast event channels
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            health_check_interval: default_health_check_interval(),
            auto_restart: true,
            max_restart_attempts: default_max_restart_attempts(),
            restart_delay: default_restart_delay(),
            stop_grace_period: default_stop_grace_period(),
            kill_timeout: default_kill_timeout(),
            stable_run_threshold: default_stable_run_threshold(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl SupervisorConfig {
    /// Delay before the given (1-based) automatic restart attempt
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.restart_delay.saturating_mul(attempt.max(1))
    }

    pub fn validate(&self) -> TetherResult<()> {
        if self.health_check_interval.is_zero() {
            return Err(TetherError::config(
                "supervisor.health_check_interval must be greater than zero",
            ));
        }
        if self.max_restart_attempts > defaults::MAX_RESTART_ATTEMPTS_LIMIT {
            return Err(TetherError::config(format!(
                "supervisor.max_restart_attempts must be at most {}",
                defaults::MAX_RESTART_ATTEMPTS_LIMIT
            )));
        }
        if self.event_capacity == 0 {
            return Err(TetherError::config(
                "supervisor.event_capacity must be greater than zero",
            ));
        }
        Ok(())
    }
}
