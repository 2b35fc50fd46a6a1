//! Default values shared by the configuration sections

use std::time::Duration;

/// Supervisor defaults
pub mod supervisor {
    use super::Duration;

    pub const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(30);
    pub const MAX_RESTART_ATTEMPTS: u32 = 3;
    pub const RESTART_DELAY: Duration = Duration::from_secs(5);
    pub const STOP_GRACE_PERIOD: Duration = Duration::from_secs(5);
    pub const KILL_TIMEOUT: Duration = Duration::from_secs(5);
    pub const STABLE_RUN_THRESHOLD: Duration = Duration::from_secs(60);
    pub const EVENT_CAPACITY: usize = 256;
    /// Upper bound accepted by validation
    pub const MAX_RESTART_ATTEMPTS_LIMIT: u32 = 100;
}

/// Renderer bridge defaults
pub mod bridge {
    use super::Duration;

    pub const PROCESS_NAME: &str = "renderer";
    pub const COMMAND: &str = "renderer";
    pub const CALL_TIMEOUT: Duration = Duration::from_secs(30);
    pub const SHUTDOWN_SIGNAL_DELAY: Duration = Duration::from_secs(2);
    pub const SHUTDOWN_KILL_AFTER: Duration = Duration::from_secs(10);
}

/// Gateway defaults
pub mod gateway {
    pub const SERVER_NAME: &str = "tether-gateway";
    pub const PROTOCOL_VERSION: &str = "2024-11-05";
}

/// Framing defaults
pub mod framing {
    /// Longest line accepted from a child before it is discarded
    pub const MAX_LINE_BYTES: usize = 8 * 1024 * 1024;
}
