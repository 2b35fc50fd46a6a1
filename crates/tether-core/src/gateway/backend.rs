//! The service behind the gateway

use super::types::ToolDescriptor;
use crate::error::TetherResult;
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use std::sync::Arc;

/// Executes the tools a gateway exposes
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ToolBackend: Send + Sync {
    /// Tools offered by `tools/list`
    fn descriptors(&self) -> Vec<ToolDescriptor>;

    /// Run one tool
    async fn call_tool(&self, name: &str, arguments: Value) -> TetherResult<Value>;

    /// Release resources when the gateway stops
    async fn shutdown(&self) -> TetherResult<()> {
        Ok(())
    }
}

/// Builds the backend on first use
pub type BackendFactory =
    Box<dyn Fn() -> BoxFuture<'static, TetherResult<Arc<dyn ToolBackend>>> + Send + Sync>;
