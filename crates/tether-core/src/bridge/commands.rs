//! Outbound renderer commands

use crate::ipc::FramedMessage;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Message type of correlated tool calls
pub const TOOL_CALL_KIND: &str = "mcpToolCall";

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Camera placement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraPose {
    pub position: Vec3,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<Vec3>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_of_view: Option<f64>,
}

impl CameraPose {
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            rotation: None,
            field_of_view: None,
        }
    }

    pub fn with_rotation(mut self, rotation: Vec3) -> Self {
        self.rotation = Some(rotation);
        self
    }

    pub fn with_field_of_view(mut self, fov: f64) -> Self {
        self.field_of_view = Some(fov);
        self
    }
}

/// Render-to-file request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderRequest {
    pub output_path: String,
    pub width: u32,
    pub height: u32,
    pub format: String,
}

impl RenderRequest {
    /// 1920x1080 PNG
    pub fn new(output_path: impl Into<String>) -> Self {
        Self {
            output_path: output_path.into(),
            width: 1920,
            height: 1080,
            format: "PNG".to_string(),
        }
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }
}

/// Every command the bridge knows how to send
#[derive(Debug, Clone, PartialEq)]
pub enum RendererCommand {
    Initialize(Map<String, Value>),
    UpdateStyle(Map<String, Value>),
    Camera(CameraPose),
    Render(RenderRequest),
    PostProcessing(Map<String, Value>),
    SetPaused(bool),
    TriggerEffect { effect_type: String, params: Value },
    Shutdown { graceful: bool },
    /// Any other `{type, data}` pair
    Custom { kind: String, data: Value },
}

impl RendererCommand {
    /// Wire `type` of the command
    pub fn kind(&self) -> &str {
        match self {
            Self::Initialize(_) => "initialize",
            Self::UpdateStyle(_) => "updateStyle",
            Self::Camera(_) => "camera",
            Self::Render(_) => "render",
            Self::PostProcessing(_) => "postprocessing",
            Self::SetPaused(_) => "setPaused",
            Self::TriggerEffect { .. } => "triggerEffect",
            Self::Shutdown { .. } => "shutdown",
            Self::Custom { kind, .. } => kind,
        }
    }

    /// Wire `data` of the command
    pub fn data(&self) -> Value {
        match self {
            Self::Initialize(scene) | Self::UpdateStyle(scene) | Self::PostProcessing(scene) => {
                Value::Object(scene.clone())
            }
            Self::Camera(pose) => serde_json::to_value(pose).unwrap_or(Value::Null),
            Self::Render(request) => serde_json::to_value(request).unwrap_or(Value::Null),
            Self::SetPaused(paused) => json!({ "paused": paused }),
            Self::TriggerEffect {
                effect_type,
                params,
            } => json!({ "effectType": effect_type, "params": params }),
            Self::Shutdown { graceful } => json!({ "graceful": graceful }),
            Self::Custom { data, .. } => data.clone(),
        }
    }

    /// `{type, timestamp, data}`
    pub fn to_message(&self) -> FramedMessage {
        FramedMessage::command(self.kind(), self.data())
    }
}

/// Tool call message for `call_id`.
///
/// The renderer reads `data` as a string holding `{tool, parameters, callId}`,
/// with `parameters` itself a JSON string.
pub fn tool_call_message(call_id: &str, tool: &str, arguments: &Value) -> FramedMessage {
    let envelope = json!({
        "tool": tool,
        "parameters": arguments.to_string(),
        "callId": call_id,
    });
    FramedMessage::command(TOOL_CALL_KIND, Value::String(envelope.to_string()))
        .with_field("callId", Value::String(call_id.to_string()))
}
