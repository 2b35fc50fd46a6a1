//! UnifiedError trait implementation for TetherError

use super::types::{TetherError, UnifiedError};

impl UnifiedError for TetherError {
    fn error_code(&self) -> &str {
        match self {
            Self::Config { .. } => "TETHER_CONFIG",
            Self::Io { .. } => "TETHER_IO",
            Self::Json { .. } => "TETHER_JSON",
            Self::Launch { .. } => "TETHER_LAUNCH",
            Self::NotRegistered { .. } => "TETHER_NOT_REGISTERED",
            Self::InvalidState { .. } => "TETHER_INVALID_STATE",
            Self::Timeout { .. } => "TETHER_TIMEOUT",
            Self::Transport { .. } => "TETHER_TRANSPORT",
            Self::Protocol { .. } => "TETHER_PROTOCOL",
            Self::CallFailed { .. } => "TETHER_CALL_FAILED",
            Self::ToolNotFound { .. } => "TETHER_TOOL_NOT_FOUND",
            Self::InvalidInput { .. } => "TETHER_INVALID_INPUT",
            Self::Cancelled => "TETHER_CANCELLED",
            Self::Other { .. } => "TETHER_OTHER",
        }
    }

    fn message(&self) -> &str {
        match self {
            Self::Config { message, .. } => message,
            Self::Io { message, .. } => message,
            Self::Json { message, .. } => message,
            Self::Launch { message, .. } => message,
            Self::NotRegistered { name, .. } => name,
            Self::InvalidState { message, .. } => message,
            Self::Timeout { operation, .. } => operation,
            Self::Transport { message, .. } => message,
            Self::Protocol { message, .. } => message,
            Self::CallFailed { message, .. } => message,
            Self::ToolNotFound { name, .. } => name,
            Self::InvalidInput { message, .. } => message,
            Self::Cancelled => "Operation was cancelled",
            Self::Other { message, .. } => message,
        }
    }

    fn context(&self) -> Option<&str> {
        match self {
            Self::Config { context, .. } => context.as_deref(),
            Self::Io { context, .. } => context.as_deref(),
            Self::Json { context, .. } => context.as_deref(),
            Self::Launch { context, .. } => context.as_deref(),
            Self::NotRegistered { context, .. } => context.as_deref(),
            Self::InvalidState { context, .. } => context.as_deref(),
            Self::Timeout { context, .. } => context.as_deref(),
            Self::Transport { context, .. } => context.as_deref(),
            Self::Protocol { context, .. } => context.as_deref(),
            Self::CallFailed { context, .. } => context.as_deref(),
            Self::ToolNotFound { context, .. } => context.as_deref(),
            Self::InvalidInput { context, .. } => context.as_deref(),
            Self::Cancelled => None,
            Self::Other { context, .. } => context.as_deref(),
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Transport { .. } | Self::Launch { .. } | Self::Io { .. }
        )
    }
}
