//! Error types for Tether
//!
//! Every failure the supervisor, the IPC layer and the gateway can produce is a
//! [`TetherError`]. All variants implement [`UnifiedError`], which exposes a stable
//! error code for programmatic handling plus the message and optional context.

mod constructors;
mod conversions;
mod types;
mod unified_error;

pub use types::{OptionExt, ResultExt, TetherError, TetherResult, UnifiedError};
