//! Renderer bridge configuration

use super::defaults::bridge as defaults;
use super::process_spec::ProcessSpec;
use crate::error::{TetherError, TetherResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::time::Duration;

fn default_process_name() -> String {
    defaults::PROCESS_NAME.to_string()
}

fn default_renderer() -> ProcessSpec {
    ProcessSpec::new(defaults::COMMAND).with_kind("renderer")
}

fn default_call_timeout() -> Duration {
    defaults::CALL_TIMEOUT
}

fn default_shutdown_signal_delay() -> Duration {
    defaults::SHUTDOWN_SIGNAL_DELAY
}

fn default_shutdown_kill_after() -> Duration {
    defaults::SHUTDOWN_KILL_AFTER
}

fn default_scene() -> Map<String, Value> {
    match json!({
        "style": "neon-cyber-goth",
        "lighting": "electro-nuclear",
        "pinkIntensity": 0.8
    }) {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Settings for the single supervised renderer process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Name the renderer is registered under in the supervisor
    #[serde(default = "default_process_name")]
    pub process_name: String,
    /// Renderer launch configuration
    #[serde(default = "default_renderer")]
    pub renderer: ProcessSpec,
    /// Deadline for correlated tool calls
    #[serde(with = "humantime_serde", default = "default_call_timeout")]
    pub call_timeout: Duration,
    /// Wait after the shutdown message before SIGTERM
    #[serde(with = "humantime_serde", default = "default_shutdown_signal_delay")]
    pub shutdown_signal_delay: Duration,
    /// Wait after the shutdown message before SIGKILL
    #[serde(with = "humantime_serde", default = "default_shutdown_kill_after")]
    pub shutdown_kill_after: Duration,
    /// Initial scene configuration
    #[serde(default = "default_scene")]
    pub scene: Map<String, Value>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            process_name: default_process_name(),
            renderer: default_renderer(),
            call_timeout: default_call_timeout(),
            shutdown_signal_delay: default_shutdown_signal_delay(),
            shutdown_kill_after: default_shutdown_kill_after(),
            scene: default_scene(),
        }
    }
}

impl BridgeConfig {
    pub fn validate(&self) -> TetherResult<()> {
        if self.process_name.trim().is_empty() {
            return Err(TetherError::config("bridge.process_name must not be empty"));
        }
        if self.shutdown_kill_after < self.shutdown_signal_delay {
            return Err(TetherError::config(
                "bridge.shutdown_kill_after must not be shorter than bridge.shutdown_signal_delay",
            ));
        }
        self.renderer
            .validate()
            .map_err(|e| e.with_context("Validating bridge.renderer"))
    }
}
