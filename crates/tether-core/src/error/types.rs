//! Core error types and traits for Tether

use std::time::Duration;

use thiserror::Error;

/// Result type alias for Tether operations
pub type TetherResult<T> = Result<T, TetherError>;

/// Unified error trait implemented by every Tether error.
///
/// - error_code(): stable code for programmatic identification
/// - message(): human-readable message
/// - context(): optional additional context
pub trait UnifiedError: std::error::Error + Send + Sync {
    /// Get the error code for programmatic handling
    fn error_code(&self) -> &str;

    /// Get the human-readable error message
    fn message(&self) -> &str;

    /// Get optional context about the error
    fn context(&self) -> Option<&str> {
        None
    }

    /// Check if this error is retryable
    fn is_retryable(&self) -> bool {
        false
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context<C: std::fmt::Display>(self, context: C) -> TetherResult<T>;

    /// Add context lazily (only evaluated on error)
    fn with_context<C: std::fmt::Display, F: FnOnce() -> C>(self, f: F) -> TetherResult<T>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for Result<T, E> {
    fn context<C: std::fmt::Display>(self, context: C) -> TetherResult<T> {
        self.map_err(|e| TetherError::other(format!("{}: {}", context, e)))
    }

    fn with_context<C: std::fmt::Display, F: FnOnce() -> C>(self, f: F) -> TetherResult<T> {
        self.map_err(|e| TetherError::other(format!("{}: {}", f(), e)))
    }
}

/// Extension trait for adding context to Option types
pub trait OptionExt<T> {
    /// Convert Option to Result with context message
    fn context<C: std::fmt::Display>(self, context: C) -> TetherResult<T>;

    /// Convert Option to Result with lazy context message
    fn with_context<C: std::fmt::Display, F: FnOnce() -> C>(self, f: F) -> TetherResult<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn context<C: std::fmt::Display>(self, context: C) -> TetherResult<T> {
        self.ok_or_else(|| TetherError::other(context.to_string()))
    }

    fn with_context<C: std::fmt::Display, F: FnOnce() -> C>(self, f: F) -> TetherResult<T> {
        self.ok_or_else(|| TetherError::other(f().to_string()))
    }
}

/// Main error type for Tether
#[derive(Error, Debug, Clone)]
pub enum TetherError {
    /// Configuration could not be loaded or failed validation
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        context: Option<String>,
    },

    /// IO errors
    #[error("IO error: {message}")]
    Io {
        message: String,
        path: Option<String>,
        context: Option<String>,
    },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        context: Option<String>,
    },

    /// The OS refused to spawn a process
    #[error("Failed to launch '{process}': {message}")]
    Launch {
        process: String,
        message: String,
        context: Option<String>,
    },

    /// No process is registered under this name
    #[error("Process not registered: {name}")]
    NotRegistered {
        name: String,
        context: Option<String>,
    },

    /// Operation is not valid in the current lifecycle state
    #[error("Invalid state: {message}")]
    InvalidState {
        message: String,
        context: Option<String>,
    },

    /// An operation did not finish before its deadline
    #[error("Timed out after {timeout:?}: {operation}")]
    Timeout {
        operation: String,
        timeout: Duration,
        context: Option<String>,
    },

    /// Writing to or reading from a child stream failed
    #[error("Transport error: {message}")]
    Transport {
        message: String,
        context: Option<String>,
    },

    /// A peer violated the wire protocol
    #[error("Protocol error: {message}")]
    Protocol {
        message: String,
        context: Option<String>,
    },

    /// The peer answered a correlated call with a failure
    #[error("Call failed: {message}")]
    CallFailed {
        message: String,
        code: Option<String>,
        context: Option<String>,
    },

    /// Unknown tool name
    #[error("Tool not found: {name}")]
    ToolNotFound {
        name: String,
        context: Option<String>,
    },

    /// Invalid input errors
    #[error("Invalid input: {message}")]
    InvalidInput {
        message: String,
        field: Option<String>,
        context: Option<String>,
    },

    /// The operation was cancelled
    #[error("Operation was cancelled")]
    Cancelled,

    /// Generic error with context
    #[error("Error: {message}")]
    Other {
        message: String,
        context: Option<String>,
    },
}
