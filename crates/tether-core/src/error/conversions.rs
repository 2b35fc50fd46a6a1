//! From trait implementations for TetherError conversions

use super::types::TetherError;

impl From<std::io::Error> for TetherError {
    fn from(error: std::io::Error) -> Self {
        Self::io(error.to_string())
    }
}

impl From<serde_json::Error> for TetherError {
    fn from(error: serde_json::Error) -> Self {
        Self::json(error.to_string())
    }
}

impl From<serde_yaml::Error> for TetherError {
    fn from(error: serde_yaml::Error) -> Self {
        Self::config(format!("Invalid YAML: {}", error))
    }
}

impl From<toml::de::Error> for TetherError {
    fn from(error: toml::de::Error) -> Self {
        Self::config(format!("Invalid TOML: {}", error))
    }
}

impl From<tokio::task::JoinError> for TetherError {
    fn from(error: tokio::task::JoinError) -> Self {
        if error.is_cancelled() {
            Self::Cancelled
        } else {
            Self::other(format!("Task panicked: {}", error))
        }
    }
}
