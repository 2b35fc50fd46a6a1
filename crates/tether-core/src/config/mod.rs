//! Configuration for the supervisor, the renderer bridge and the tool gateway
//!
//! A single document (TOML, YAML or JSON) describes every supervised process plus
//! the tuning knobs of each component. [`ConfigLoader`] layers defaults, files and
//! `TETHER_*` environment overrides, then validates the result.

pub mod bridge_config;
pub mod defaults;
pub mod gateway_config;
pub mod loader;
pub mod logging_config;
pub mod process_spec;
pub mod supervisor_config;

pub use bridge_config::BridgeConfig;
pub use gateway_config::GatewayConfig;
pub use loader::{ConfigLoader, ConfigSource};
pub use logging_config::{LogFormat, LoggingConfig};
pub use process_spec::ProcessSpec;
pub use supervisor_config::SupervisorConfig;

use crate::error::{TetherError, TetherResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Root configuration document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TetherConfig {
    /// Lifecycle and restart policy
    pub supervisor: SupervisorConfig,
    /// Supervised tool servers keyed by name
    pub processes: BTreeMap<String, ProcessSpec>,
    /// Renderer bridge settings
    pub bridge: BridgeConfig,
    /// JSON-RPC gateway settings
    pub gateway: GatewayConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

impl TetherConfig {
    /// Merge another config on top of this one.
    ///
    /// Processes merge by name; every other section is replaced wholesale.
    pub fn merge(&mut self, other: TetherConfig) {
        self.supervisor = other.supervisor;
        self.bridge = other.bridge;
        self.gateway = other.gateway;
        self.logging.merge(other.logging);
        for (name, spec) in other.processes {
            self.processes.insert(name, spec);
        }
    }

    /// Processes with `enabled = true`
    pub fn enabled_processes(&self) -> impl Iterator<Item = (&String, &ProcessSpec)> {
        self.processes.iter().filter(|(_, spec)| spec.enabled)
    }

    /// Validate every section
    pub fn validate(&self) -> TetherResult<()> {
        self.supervisor.validate()?;
        self.bridge.validate()?;
        self.logging.validate()?;
        for (name, spec) in &self.processes {
            if name.trim().is_empty() {
                return Err(TetherError::config("Process names must not be empty"));
            }
            spec.validate()
                .map_err(|e| e.with_context(format!("Validating process '{}'", name)))?;
        }
        if self.processes.contains_key(&self.bridge.process_name) {
            return Err(TetherError::config(format!(
                "Process name '{}' is reserved for the renderer bridge",
                self.bridge.process_name
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = TetherConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.processes.is_empty());
    }

    #[test]
    fn test_merge_processes_by_name() {
        let mut base = TetherConfig::default();
        base.processes
            .insert("fs".to_string(), ProcessSpec::new("fs-server"));
        base.processes
            .insert("git".to_string(), ProcessSpec::new("git-server"));

        let mut overlay = TetherConfig::default();
        overlay
            .processes
            .insert("fs".to_string(), ProcessSpec::new("fs-server-v2"));

        base.merge(overlay);
        assert_eq!(base.processes.len(), 2);
        assert_eq!(base.processes["fs"].command, "fs-server-v2");
    }

    #[test]
    fn test_enabled_processes_filters_disabled() {
        let mut config = TetherConfig::default();
        config
            .processes
            .insert("on".to_string(), ProcessSpec::new("a"));
        let mut off = ProcessSpec::new("b");
        off.enabled = false;
        config.processes.insert("off".to_string(), off);

        let names: Vec<_> = config.enabled_processes().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["on"]);
    }

    #[test]
    fn test_renderer_name_is_reserved() {
        let mut config = TetherConfig::default();
        config
            .processes
            .insert(config.bridge.process_name.clone(), ProcessSpec::new("x"));
        assert!(config.validate().is_err());
    }
}
