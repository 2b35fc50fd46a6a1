//! Gateway backend that runs catalog tools on the renderer

use crate::catalog::ToolCatalog;
use crate::validation::validate_arguments;
use async_trait::async_trait;
use serde_json::{Map, Value};
use tether_core::gateway::{ToolBackend, ToolDescriptor};
use tether_core::{RendererBridge, TetherError, TetherResult};

/// Validates calls against the catalog and forwards them through the bridge
pub struct RendererToolBackend {
    bridge: RendererBridge,
    catalog: ToolCatalog,
    stop_on_shutdown: bool,
}

impl RendererToolBackend {
    pub fn new(bridge: RendererBridge) -> Self {
        Self::with_catalog(bridge, ToolCatalog::renderer())
    }

    pub fn with_catalog(bridge: RendererBridge, catalog: ToolCatalog) -> Self {
        Self {
            bridge,
            catalog,
            stop_on_shutdown: true,
        }
    }

    /// Leave the renderer running when the gateway shuts down
    pub fn keep_renderer_alive(mut self) -> Self {
        self.stop_on_shutdown = false;
        self
    }

    pub fn bridge(&self) -> &RendererBridge {
        &self.bridge
    }

    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }
}

#[async_trait]
impl ToolBackend for RendererToolBackend {
    fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.catalog.descriptors()
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> TetherResult<Value> {
        let tool = self
            .catalog
            .get(name)
            .ok_or_else(|| TetherError::tool_not_found(name))?;

        if !self.bridge.is_running() {
            return Err(TetherError::transport("renderer bridge not running")
                .with_context(format!("tool '{}'", name)));
        }

        let arguments = validate_arguments(&tool.schema, arguments)?;
        tracing::info!(tool = %name, renderer_tool = %tool.renderer_name, "Executing renderer tool");

        let result = self
            .bridge
            .call_tool(&tool.renderer_name, Value::Object(arguments))
            .await
            .map_err(|e| {
                tracing::error!(tool = %name, error = %e, "Renderer tool failed");
                e
            })?;

        Ok(match result {
            Value::Null => Value::Object(Map::new()),
            Value::String(s) if s.trim().is_empty() => Value::Object(Map::new()),
            other => other,
        })
    }

    async fn shutdown(&self) -> TetherResult<()> {
        if self.stop_on_shutdown {
            self.bridge.shutdown().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tether_core::config::{BridgeConfig, SupervisorConfig};
    use tether_core::ProcessSupervisor;

    fn backend() -> RendererToolBackend {
        let bridge = RendererBridge::new(
            ProcessSupervisor::new(SupervisorConfig::default()),
            BridgeConfig::default(),
        )
        .unwrap();
        RendererToolBackend::new(bridge)
    }

    #[tokio::test]
    async fn test_lists_catalog() {
        let names: Vec<_> = backend().descriptors().into_iter().map(|d| d.name).collect();
        assert_eq!(names.len(), 6);
        assert!(names.contains(&"spawn_object".to_string()));
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let err = backend().call_tool("teleport", json!({})).await.unwrap_err();
        assert!(matches!(err, TetherError::ToolNotFound { name, .. } if name == "teleport"));
    }

    #[tokio::test]
    async fn test_stopped_renderer_is_unavailable() {
        let err = backend()
            .call_tool("clear_objects", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, TetherError::Transport { .. }));
        assert!(err.to_string().contains("renderer bridge not running"));
    }

    #[tokio::test]
    async fn test_shutdown_without_renderer_is_ok() {
        assert!(backend().shutdown().await.is_ok());
    }
}
