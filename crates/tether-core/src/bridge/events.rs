//! Typed renderer events

use crate::events::TypedEvent;
use crate::ipc::FramedMessage;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Routing key of a [`BridgeEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BridgeEventKind {
    SceneLoaded,
    RenderComplete,
    UpdateAck,
    Error,
    Heartbeat,
    ShutdownComplete,
    Other,
}

/// Periodic liveness report from the renderer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Heartbeat {
    #[serde(default)]
    pub fps: Option<f64>,
    #[serde(default, rename = "memoryUsageMB")]
    pub memory_usage_mb: Option<f64>,
    #[serde(default)]
    pub active_objects: Option<u64>,
    #[serde(default)]
    pub uptime: Option<f64>,
    #[serde(default)]
    pub state: Option<String>,
}

/// Error reported by the renderer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RendererFault {
    pub error_code: String,
    pub message: String,
    pub stack: Option<String>,
}

impl RendererFault {
    fn from_payload(payload: &Value) -> Self {
        let text = |keys: &[&str]| {
            keys.iter()
                .find_map(|key| payload.get(*key).and_then(Value::as_str))
                .map(str::to_string)
        };
        Self {
            error_code: text(&["errorCode", "code"]).unwrap_or_else(|| "UNKNOWN".to_string()),
            message: text(&["message"]).unwrap_or_else(|| payload.to_string()),
            stack: text(&["stack", "stackTrace"]),
        }
    }
}

impl fmt::Display for RendererFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error_code, self.message)
    }
}

/// Inbound renderer message, decoded by type
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    SceneLoaded(Value),
    RenderComplete(Value),
    UpdateAck(Value),
    Error(RendererFault),
    Heartbeat(Heartbeat),
    ShutdownComplete(Value),
    /// Any type this bridge has no dedicated variant for
    Other { kind: String, data: Value },
}

impl BridgeEvent {
    /// Decode an inbound message. Unknown types become [`BridgeEvent::Other`].
    pub fn from_message(message: &FramedMessage) -> Self {
        let payload = decode_payload(message);
        match message.kind() {
            "scene-loaded" | "sceneLoaded" => Self::SceneLoaded(payload),
            "render-complete" | "renderComplete" => Self::RenderComplete(payload),
            "update-ack" | "updateAck" => Self::UpdateAck(payload),
            "error" => Self::Error(RendererFault::from_payload(&payload)),
            "heartbeat" => Self::Heartbeat(serde_json::from_value(payload).unwrap_or_default()),
            "shutdownComplete" | "shutdown-complete" => Self::ShutdownComplete(payload),
            other => Self::Other {
                kind: other.to_string(),
                data: payload,
            },
        }
    }

    /// Wire name of the event
    pub fn event_type(&self) -> &str {
        match self {
            Self::SceneLoaded(_) => "scene-loaded",
            Self::RenderComplete(_) => "render-complete",
            Self::UpdateAck(_) => "update-ack",
            Self::Error(_) => "error",
            Self::Heartbeat(_) => "heartbeat",
            Self::ShutdownComplete(_) => "shutdownComplete",
            Self::Other { kind, .. } => kind,
        }
    }
}

impl TypedEvent for BridgeEvent {
    type Kind = BridgeEventKind;

    fn kind(&self) -> BridgeEventKind {
        match self {
            Self::SceneLoaded(_) => BridgeEventKind::SceneLoaded,
            Self::RenderComplete(_) => BridgeEventKind::RenderComplete,
            Self::UpdateAck(_) => BridgeEventKind::UpdateAck,
            Self::Error(_) => BridgeEventKind::Error,
            Self::Heartbeat(_) => BridgeEventKind::Heartbeat,
            Self::ShutdownComplete(_) => BridgeEventKind::ShutdownComplete,
            Self::Other { .. } => BridgeEventKind::Other,
        }
    }
}

/// Payload of a message: `data` (JSON-in-a-string is unwrapped), else the body
pub(crate) fn decode_payload(message: &FramedMessage) -> Value {
    match message.data() {
        Some(data) => decode_embedded(data.clone()),
        None => Value::Object(message.body().clone()),
    }
}

/// Some renderers send nested JSON as a string
pub(crate) fn decode_embedded(value: Value) -> Value {
    match value {
        Value::String(text) => match serde_json::from_str::<Value>(&text) {
            Ok(parsed @ (Value::Object(_) | Value::Array(_))) => parsed,
            _ => Value::String(text),
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(line: &str) -> BridgeEvent {
        BridgeEvent::from_message(&line.parse::<FramedMessage>().unwrap())
    }

    #[test]
    fn test_scene_loaded() {
        let event = parse(
            r#"{"type":"scene-loaded","timestamp":"2024-01-15T12:35:04.123Z","data":{"sceneName":"MainScene","objectCount":156,"renderTime":234.5}}"#,
        );
        assert_eq!(event.kind(), BridgeEventKind::SceneLoaded);
        match event {
            BridgeEvent::SceneLoaded(data) => {
                assert_eq!(data["sceneName"], "MainScene");
                assert_eq!(data["objectCount"], 156);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_heartbeat_fields() {
        let event = parse(
            r#"{"type":"heartbeat","data":{"fps":60,"memoryUsageMB":512,"activeObjects":156}}"#,
        );
        let BridgeEvent::Heartbeat(beat) = event else {
            panic!("expected heartbeat");
        };
        assert_eq!(beat.fps, Some(60.0));
        assert_eq!(beat.memory_usage_mb, Some(512.0));
        assert_eq!(beat.active_objects, Some(156));
        assert_eq!(beat.state, None);
    }

    #[test]
    fn test_heartbeat_as_embedded_json_string() {
        let event = parse(r#"{"type":"heartbeat","data":"{\"uptime\":12.5,\"fps\":30,\"state\":\"running\"}"}"#);
        let BridgeEvent::Heartbeat(beat) = event else {
            panic!("expected heartbeat");
        };
        assert_eq!(beat.uptime, Some(12.5));
        assert_eq!(beat.state.as_deref(), Some("running"));
    }

    #[test]
    fn test_error_event_carries_code() {
        let event = parse(
            r#"{"type":"error","data":{"errorCode":"RENDER_FAILED","message":"GPU lost","stack":"at Render()"}}"#,
        );
        let BridgeEvent::Error(fault) = event else {
            panic!("expected error");
        };
        assert_eq!(fault.error_code, "RENDER_FAILED");
        assert_eq!(fault.message, "GPU lost");
        assert_eq!(fault.stack.as_deref(), Some("at Render()"));
        assert_eq!(fault.to_string(), "RENDER_FAILED: GPU lost");
    }

    #[test]
    fn test_error_accepts_stack_trace_key() {
        let fault = RendererFault::from_payload(&json!({
            "errorCode": "SCENE_LOAD_FAILED",
            "message": "missing asset",
            "stackTrace": "trace"
        }));
        assert_eq!(fault.stack.as_deref(), Some("trace"));
    }

    #[test]
    fn test_unknown_type_is_other() {
        let event = parse(r#"{"type":"lightning-strike","data":{"intensity":3}}"#);
        assert_eq!(event.kind(), BridgeEventKind::Other);
        assert_eq!(event.event_type(), "lightning-strike");
    }

    #[test]
    fn test_payload_without_data_is_body() {
        let event = parse(r#"{"type":"shutdownComplete","totalFrames":5000}"#);
        let BridgeEvent::ShutdownComplete(data) = event else {
            panic!("expected shutdownComplete");
        };
        assert_eq!(data["totalFrames"], 5000);
    }

    #[test]
    fn test_plain_string_payload_is_kept() {
        assert_eq!(decode_embedded(json!("not json")), json!("not json"));
        assert_eq!(decode_embedded(json!("42")), json!("42"));
    }
}
