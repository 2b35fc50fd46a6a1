//! Launch configuration for a supervised process

use crate::error::{TetherError, TetherResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

fn default_true() -> bool {
    true
}

/// How to launch one process: executable, arguments, working directory and
/// environment overlay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessSpec {
    /// Executable name or path
    pub command: String,
    /// Command arguments
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory; inherits the supervisor's when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
    /// Variables added on top of the inherited environment
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
    /// Free-form classification, e.g. "tool-server" or "renderer"
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Whether bulk start picks this process up
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl ProcessSpec {
    /// Create a spec for the given executable
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            cwd: None,
            env: HashMap::new(),
            kind: None,
            enabled: true,
        }
    }

    /// Replace the argument list
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set the working directory
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Add an environment variable
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set the process type
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    /// Command after `~` and `$VAR` expansion
    pub fn resolved_command(&self) -> TetherResult<String> {
        shellexpand::full(&self.command)
            .map(|s| s.into_owned())
            .map_err(|e| {
                TetherError::config(format!("Cannot expand command '{}': {}", self.command, e))
            })
    }

    /// Working directory after `~` and `$VAR` expansion
    pub fn resolved_cwd(&self) -> TetherResult<Option<PathBuf>> {
        let Some(cwd) = &self.cwd else {
            return Ok(None);
        };
        let raw = cwd.to_string_lossy();
        let expanded = shellexpand::full(&raw).map_err(|e| {
            TetherError::config(format!("Cannot expand cwd '{}': {}", raw, e))
        })?;
        Ok(Some(PathBuf::from(expanded.into_owned())))
    }

    /// Check that the spec can be launched
    pub fn validate(&self) -> TetherResult<()> {
        if self.command.trim().is_empty() {
            return Err(TetherError::config("Process command must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let spec = ProcessSpec::new("toolserver")
            .with_args(["--root", "/data"])
            .with_env("LOG", "1")
            .with_kind("tool-server");

        assert_eq!(spec.args, vec!["--root", "/data"]);
        assert_eq!(spec.env.get("LOG").map(String::as_str), Some("1"));
        assert_eq!(spec.kind.as_deref(), Some("tool-server"));
        assert!(spec.enabled);
    }

    #[test]
    fn test_deserialize_type_field() {
        let spec: ProcessSpec = serde_json::from_str(
            r#"{"command": "node", "args": ["server.js"], "type": "tool-server"}"#,
        )
        .unwrap();
        assert_eq!(spec.command, "node");
        assert_eq!(spec.kind.as_deref(), Some("tool-server"));
        assert!(spec.enabled);
        assert!(spec.cwd.is_none());
    }

    #[test]
    fn test_resolved_command_expands_home() {
        let spec = ProcessSpec::new("~/bin/server");
        let resolved = spec.resolved_command().unwrap();
        assert!(!resolved.starts_with('~'));
    }

    #[test]
    fn test_empty_command_rejected() {
        assert!(ProcessSpec::new("  ").validate().is_err());
        assert!(ProcessSpec::new("sh").validate().is_ok());
    }
}
