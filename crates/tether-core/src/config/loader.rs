//! Configuration loading from files and environment variables

use super::TetherConfig;
use super::logging_config::LogFormat;
use crate::error::{TetherError, TetherResult};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "TETHER_";

/// Source of configuration data
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// Configuration from a file; format chosen by extension
    File(PathBuf),
    /// `TETHER_*` overrides from the given variables
    Environment(HashMap<String, String>),
    /// Default configuration
    Default,
}

/// Layered configuration loader. Later sources override earlier ones.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    sources: Vec<ConfigSource>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a configuration source
    pub fn add_source(mut self, source: ConfigSource) -> Self {
        self.sources.push(source);
        self
    }

    /// Add a file source
    pub fn with_file<P: AsRef<Path>>(self, path: P) -> Self {
        self.add_source(ConfigSource::File(path.as_ref().to_path_buf()))
    }

    /// Add the process environment
    pub fn with_env(self) -> Self {
        self.with_env_vars(std::env::vars())
    }

    /// Add an explicit set of environment variables
    pub fn with_env_vars<I, K, V>(self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .filter(|(k, _)| k.starts_with(ENV_PREFIX))
            .collect();
        self.add_source(ConfigSource::Environment(vars))
    }

    /// Add default configuration source
    pub fn with_defaults(self) -> Self {
        self.add_source(ConfigSource::Default)
    }

    /// Load configuration from all sources and validate it
    pub fn load(self) -> TetherResult<TetherConfig> {
        let mut config = TetherConfig::default();

        for source in &self.sources {
            match source {
                ConfigSource::File(path) => {
                    tracing::debug!(path = %path.display(), "Loading config file");
                    config.merge(load_from_file(path)?);
                }
                ConfigSource::Environment(vars) => {
                    tracing::debug!(count = vars.len(), "Applying environment overrides");
                    apply_env(&mut config, vars)?;
                }
                ConfigSource::Default => {
                    config = TetherConfig::default();
                }
            }
        }

        config.validate()?;
        Ok(config)
    }
}

/// Parse a configuration file
pub fn load_from_file(path: &Path) -> TetherResult<TetherConfig> {
    let content = fs::read_to_string(path).map_err(|e| {
        TetherError::io_with_path(format!("Failed to read config file: {}", e), path.display().to_string())
    })?;

    let context = format!("Parsing configuration from '{}'", path.display());
    let config = match path.extension().and_then(|s| s.to_str()) {
        Some("toml") => toml::from_str(&content).map_err(|e| TetherError::from(e).with_context(context))?,
        Some("yaml") | Some("yml") => {
            serde_yaml::from_str(&content).map_err(|e| TetherError::from(e).with_context(context))?
        }
        _ => serde_json::from_str(&content).map_err(|e| {
            TetherError::config(format!("Invalid JSON: {}", e)).with_context(context)
        })?,
    };
    Ok(config)
}

fn apply_env(config: &mut TetherConfig, vars: &HashMap<String, String>) -> TetherResult<()> {
    let get = |key: &str| vars.get(&format!("{}{}", ENV_PREFIX, key));

    if let Some(level) = get("LOG_LEVEL") {
        config.logging.level = level.clone();
    }
    if let Some(format) = get("LOG_FORMAT") {
        config.logging.format = format.parse::<LogFormat>()?;
    }
    if let Some(value) = get("AUTO_RESTART") {
        config.supervisor.auto_restart = parse_bool("TETHER_AUTO_RESTART", value)?;
    }
    if let Some(value) = get("MAX_RESTART_ATTEMPTS") {
        config.supervisor.max_restart_attempts = value.parse().map_err(|_| {
            TetherError::config(format!("Invalid TETHER_MAX_RESTART_ATTEMPTS value '{}'", value))
        })?;
    }
    if let Some(value) = get("RESTART_DELAY") {
        config.supervisor.restart_delay = parse_duration("TETHER_RESTART_DELAY", value)?;
    }
    if let Some(value) = get("HEALTH_CHECK_INTERVAL") {
        config.supervisor.health_check_interval =
            parse_duration("TETHER_HEALTH_CHECK_INTERVAL", value)?;
    }
    if let Some(command) = get("RENDERER_COMMAND") {
        config.bridge.renderer.command = command.clone();
    }
    Ok(())
}

fn parse_bool(key: &str, value: &str) -> TetherResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(TetherError::config(format!("Invalid {} value '{}'", key, value))),
    }
}

fn parse_duration(key: &str, value: &str) -> TetherResult<Duration> {
    humantime_serde::re::humantime::parse_duration(value)
        .map_err(|e| TetherError::config(format!("Invalid {} value '{}': {}", key, value, e)))
}
