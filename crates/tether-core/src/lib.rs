//! Tether Core Library
//!
//! Supervision of long-running child processes that speak line-delimited JSON
//! over stdin/stdout, a bridge for one external renderer process, and a
//! JSON-RPC 2.0 gateway that exposes renderer tools to remote callers.

pub mod bridge;
pub mod config;
pub mod error;
pub mod events;
pub mod gateway;
pub mod ipc;
pub mod supervisor;

// Re-export commonly used types
pub use bridge::{BridgeEvent, BridgeEventKind, RendererBridge, RendererCommand, RendererFault};
pub use config::{ConfigLoader, ProcessSpec, SupervisorConfig, TetherConfig};
pub use error::{TetherError, TetherResult, UnifiedError};
pub use events::{EventBus, KeyedEventBus, TypedEvent};
pub use gateway::{ToolBackend, ToolDescriptor, ToolGateway};
pub use ipc::{CallCorrelator, FramedMessage, LineFramer, MessageRouter};
pub use supervisor::{
    HealthStatus, ProcessState, ProcessStatus, ProcessSupervisor, SupervisorEvent,
};
