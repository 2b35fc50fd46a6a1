//! Line-oriented JSON-RPC server

use super::backend::{BackendFactory, ToolBackend};
use super::protocol::{RequestId, RpcError, RpcMethod, RpcNotification, RpcResponse, JSONRPC_VERSION};
use super::types::{
    CallToolResult, InitializeResult, ServerCapabilities, ServerInfo, ToolsCapability,
};
use crate::config::GatewayConfig;
use crate::error::{TetherError, TetherResult};
use crate::ipc::{FramedWriter, LineEvent, pump_lines};
use futures::FutureExt;
use parking_lot::RwLock;
use serde_json::{Map, Value, json};
use std::future::Future;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::OnceCell;
use tokio::task::JoinSet;

type BoxedWriter = FramedWriter<Box<dyn AsyncWrite + Send + Unpin>>;

/// JSON-RPC 2.0 front door over a line transport.
///
/// The backend is built lazily by the factory on the first request that needs
/// it. Concurrent requests share one in-flight initialization; a failed
/// initialization is reported to its callers and retried by the next one.
pub struct ToolGateway {
    config: GatewayConfig,
    factory: BackendFactory,
    backend: OnceCell<Arc<dyn ToolBackend>>,
    output: RwLock<Option<Arc<BoxedWriter>>>,
}

impl ToolGateway {
    pub fn new<F, Fut>(config: GatewayConfig, factory: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TetherResult<Arc<dyn ToolBackend>>> + Send + 'static,
    {
        Self {
            config,
            factory: Box::new(move || factory().boxed()),
            backend: OnceCell::new(),
            output: RwLock::new(None),
        }
    }

    /// Gateway over an already constructed backend
    pub fn with_backend(config: GatewayConfig, backend: Arc<dyn ToolBackend>) -> Self {
        Self {
            config,
            factory: Box::new(|| {
                async { Err(TetherError::invalid_state("backend already provided")) }.boxed()
            }),
            backend: OnceCell::new_with(Some(backend)),
            output: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// The backend, initializing it if needed
    pub async fn backend(&self) -> TetherResult<Arc<dyn ToolBackend>> {
        self.backend
            .get_or_try_init(|| {
                tracing::info!("Initializing tool backend");
                (self.factory)()
            })
            .await
            .cloned()
    }

    pub fn is_initialized(&self) -> bool {
        self.backend.initialized()
    }

    /// Handle one request line. `None` means nothing is written back.
    pub async fn handle_line(&self, line: &str) -> Option<RpcResponse> {
        let request: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "Unparseable request");
                return Some(RpcResponse::failure(None, RpcError::parse_error()));
            }
        };
        self.handle_value(request).await
    }

    /// Handle one decoded request
    pub async fn handle_value(&self, request: Value) -> Option<RpcResponse> {
        let Value::Object(request) = request else {
            return Some(RpcResponse::failure(
                None,
                RpcError::invalid_request("Invalid Request - expected an object"),
            ));
        };
        let id = request.get("id").and_then(RequestId::from_value);

        if request.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
            tracing::warn!(id = ?id, "Rejecting request with wrong jsonrpc version");
            return id.map(|id| {
                RpcResponse::failure(
                    Some(id),
                    RpcError::invalid_request("Invalid Request - must use JSON-RPC 2.0"),
                )
            });
        }

        let Some(method) = request.get("method").and_then(Value::as_str) else {
            return id.map(|id| {
                RpcResponse::failure(Some(id), RpcError::invalid_request("Invalid Request - missing method"))
            });
        };
        let method = RpcMethod::parse(method);
        let params = request.get("params").cloned().unwrap_or(Value::Null);

        let Some(id) = id else {
            self.handle_notification(&method, params).await;
            return None;
        };

        tracing::debug!(id = %id, method = %method.as_str(), "Handling request");
        match self.dispatch(&method, params).await {
            Ok(result) => Some(RpcResponse::success(id, result)),
            Err(error) => {
                tracing::error!(id = %id, method = %method.as_str(), code = error.code, error = %error.message, "Request failed");
                Some(RpcResponse::failure(Some(id), error))
            }
        }
    }

    async fn handle_notification(&self, method: &RpcMethod, params: Value) {
        match method {
            RpcMethod::Initialized => tracing::info!("Client initialized"),
            RpcMethod::Unknown(name) => {
                tracing::debug!(method = %name, "Ignoring unknown notification");
            }
            other => {
                if let Err(e) = self.dispatch(other, params).await {
                    tracing::warn!(method = %other.as_str(), error = %e, "Notification failed");
                }
            }
        }
    }

    async fn dispatch(&self, method: &RpcMethod, params: Value) -> Result<Value, RpcError> {
        match method {
            RpcMethod::Initialize => {
                tracing::info!(client = ?params.get("clientInfo"), "Initialize request");
                to_result(&self.initialize_result())
            }
            RpcMethod::Initialized | RpcMethod::Ping => Ok(json!({})),
            RpcMethod::ToolsList => {
                let tools = self.ready_backend().await?.descriptors();
                tracing::info!(count = tools.len(), "Listing tools");
                Ok(json!({ "tools": tools }))
            }
            RpcMethod::ToolsCall => {
                let (name, arguments) = tool_call_params(params)?;
                let backend = self.ready_backend().await?;
                tracing::info!(tool = %name, "Executing tool");
                let result = match backend.call_tool(&name, arguments).await {
                    Ok(value) => CallToolResult::success(&value),
                    Err(e) => {
                        tracing::error!(tool = %name, error = %e, "Tool execution failed");
                        CallToolResult::failure(&e)
                    }
                };
                to_result(&result)
            }
            RpcMethod::Unknown(name) => Err(RpcError::method_not_found(name)),
        }
    }

    async fn ready_backend(&self) -> Result<Arc<dyn ToolBackend>, RpcError> {
        self.backend()
            .await
            .map_err(|e| RpcError::internal_error(e.to_string()))
    }

    fn initialize_result(&self) -> InitializeResult {
        InitializeResult {
            protocol_version: self.config.protocol_version.clone(),
            capabilities: ServerCapabilities {
                tools: ToolsCapability { list_changed: true },
            },
            server_info: ServerInfo {
                name: self.config.server_name.clone(),
                version: self.config.server_version.clone(),
            },
        }
    }

    /// Serve requests from `reader` until EOF, writing responses to `writer`.
    ///
    /// Requests run concurrently; each response is one line. In-flight requests
    /// are drained before returning.
    pub async fn serve<R, W>(self: &Arc<Self>, reader: R, writer: W) -> TetherResult<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let boxed: Box<dyn AsyncWrite + Send + Unpin> = Box::new(writer);
        let writer = Arc::new(FramedWriter::new(boxed));
        *self.output.write() = Some(Arc::clone(&writer));
        tracing::info!(server = %self.config.server_name, "Gateway serving");

        let mut tasks = JoinSet::new();
        let pumped = pump_lines(reader, |event| {
            let gateway = Arc::clone(self);
            let writer = Arc::clone(&writer);
            tasks.spawn(async move {
                let response = match event {
                    LineEvent::Line(line) => gateway.handle_line(&line).await,
                    LineEvent::Overflow(bytes) => {
                        tracing::warn!(bytes, "Request line too long");
                        Some(RpcResponse::failure(None, RpcError::parse_error()))
                    }
                };
                if let Some(response) = response {
                    if let Err(e) = writer.write_line(&response).await {
                        tracing::error!(error = %e, "Failed to write response");
                    }
                }
            });
        })
        .await;

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Request task failed");
            }
        }
        self.output.write().take();
        tracing::info!("Gateway input closed");
        pumped
    }

    /// Write a notification to the connection being served
    pub async fn send_notification(&self, method: &str, params: Option<Value>) -> TetherResult<()> {
        let writer = self
            .output
            .read()
            .clone()
            .ok_or_else(|| TetherError::transport("gateway is not serving"))?;
        let mut notification = RpcNotification::new(method);
        if let Some(params) = params {
            notification = notification.with_params(params);
        }
        tracing::debug!(method = %method, "Sending notification");
        writer.write_line(&notification).await
    }

    /// Shut the backend down if it was ever built
    pub async fn shutdown(&self) -> TetherResult<()> {
        match self.backend.get() {
            Some(backend) => backend.shutdown().await,
            None => Ok(()),
        }
    }
}

fn to_result<T: serde::Serialize>(value: &T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError::internal_error(e.to_string()))
}

fn tool_call_params(params: Value) -> Result<(String, Value), RpcError> {
    let Value::Object(mut params) = params else {
        return Err(RpcError::invalid_params("tools/call requires params"));
    };
    let name = match params.remove("name") {
        Some(Value::String(name)) if !name.is_empty() => name,
        _ => return Err(RpcError::invalid_params("tools/call requires a tool name")),
    };
    let arguments = match params.remove("arguments") {
        None | Some(Value::Null) => Value::Object(Map::new()),
        Some(args @ Value::Object(_)) => args,
        Some(_) => return Err(RpcError::invalid_params("tools/call arguments must be an object")),
    };
    Ok((name, arguments))
}
