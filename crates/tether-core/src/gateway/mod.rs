//! JSON-RPC tool gateway
//!
//! [`ToolGateway`] speaks JSON-RPC 2.0 over the line transport: `initialize`,
//! `ping`, `tools/list` and `tools/call`, with tool execution delegated to a
//! [`ToolBackend`]. A failing tool is reported inside a successful response as
//! an `isError` result; only protocol-level problems become RPC errors.
//!
//! Responses go to the writer handed to [`ToolGateway::serve`]. Logging must be
//! routed elsewhere (the CLI logs to stderr).

mod backend;
mod protocol;
mod server;
mod types;


pub use backend::{BackendFactory, ToolBackend};
#[cfg(test)]
pub use backend::MockToolBackend;
pub use protocol::{
    JSONRPC_VERSION, RequestId, RpcError, RpcMethod, RpcNotification, RpcResponse, methods,
};
pub use server::ToolGateway;
pub use types::{
    CallToolResult, InitializeResult, ServerCapabilities, ServerInfo, TOOL_EXECUTION_ERROR,
    ToolContent, ToolDescriptor, ToolsCapability,
};
