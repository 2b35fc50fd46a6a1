//! Renderer bridge
//!
//! [`RendererBridge`] drives exactly one supervised renderer process. High-level
//! intents become one `{type, timestamp, data}` command each, sent
//! fire-and-forget. Everything the renderer emits is decoded into a
//! [`BridgeEvent`] and republished on a bus keyed by [`BridgeEventKind`];
//! renderer `error` events are additionally published on a separate failure
//! channel.
//!
//! Tool calls are the one correlated exchange: [`RendererBridge::call_tool`]
//! waits for the renderer's `{callId, success, result | error}` reply.

mod commands;
mod events;

pub use commands::{
    CameraPose, RenderRequest, RendererCommand, TOOL_CALL_KIND, Vec3, tool_call_message,
};
pub use events::{BridgeEvent, BridgeEventKind, Heartbeat, RendererFault};

use crate::config::BridgeConfig;
use crate::error::{TetherError, TetherResult};
use crate::events::{EventBus, KeyedEventBus};
use crate::ipc::FramedMessage;
use crate::supervisor::{ProcessStatus, ProcessSupervisor, StopOptions};
use events::decode_embedded;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;

/// Environment variable carrying the configured scene style to the renderer
pub const STYLE_ENV: &str = "RENDERER_STYLE";

struct BridgeInner {
    supervisor: ProcessSupervisor,
    config: BridgeConfig,
    scene: Mutex<Map<String, Value>>,
    events: KeyedEventBus<BridgeEvent>,
    failures: EventBus<RendererFault>,
    translator: CancellationToken,
}

impl Drop for BridgeInner {
    fn drop(&mut self) {
        self.translator.cancel();
    }
}

/// Supervised renderer endpoint. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct RendererBridge {
    inner: Arc<BridgeInner>,
}

impl RendererBridge {
    /// Register the renderer with `supervisor` and start decoding its messages.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(supervisor: ProcessSupervisor, config: BridgeConfig) -> TetherResult<Self> {
        config.validate()?;

        let name = config.process_name.clone();
        let mut spec = config.renderer.clone();
        if let Some(style) = config.scene.get("style").and_then(Value::as_str) {
            spec.env
                .entry(STYLE_ENV.to_string())
                .or_insert_with(|| style.to_string());
        }
        if !supervisor.register(name.clone(), spec) {
            return Err(TetherError::invalid_state(format!(
                "process '{}' is already registered",
                name
            )));
        }
        let channel = supervisor
            .channel(&name)
            .ok_or_else(|| TetherError::not_registered(&name))?;

        let capacity = supervisor.config().event_capacity;
        let inner = BridgeInner {
            scene: Mutex::new(config.scene.clone()),
            events: KeyedEventBus::new(capacity),
            failures: EventBus::new(capacity),
            translator: CancellationToken::new(),
            supervisor,
            config,
        };

        tokio::spawn(translate(
            name,
            channel.router().subscribe_all(),
            inner.events.clone(),
            inner.failures.clone(),
            inner.translator.clone(),
        ));

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub fn process_name(&self) -> &str {
        &self.inner.config.process_name
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    pub fn supervisor(&self) -> &ProcessSupervisor {
        &self.inner.supervisor
    }

    /// Current scene configuration
    pub fn scene(&self) -> Map<String, Value> {
        self.inner.scene.lock().clone()
    }

    pub fn status(&self) -> Option<ProcessStatus> {
        self.inner.supervisor.status(self.process_name())
    }

    pub fn is_running(&self) -> bool {
        self.status().is_some_and(|s| s.state.is_live())
    }

    /// Events of one kind
    pub fn subscribe(&self, kind: BridgeEventKind) -> broadcast::Receiver<BridgeEvent> {
        self.inner.events.subscribe(kind)
    }

    pub fn subscribe_all(&self) -> broadcast::Receiver<BridgeEvent> {
        self.inner.events.subscribe_all()
    }

    /// Renderer-reported errors
    pub fn failures(&self) -> broadcast::Receiver<RendererFault> {
        self.inner.failures.subscribe()
    }

    /// Launch the renderer. `Ok(false)` if it is already running.
    pub async fn start(&self) -> TetherResult<bool> {
        self.inner.supervisor.start(self.process_name()).await
    }

    /// Send one command
    pub async fn send(&self, command: RendererCommand) -> TetherResult<()> {
        tracing::debug!(process = %self.process_name(), command = %command.kind(), "Sending renderer command");
        self.inner
            .supervisor
            .send(self.process_name(), command.to_message())
            .await
    }

    /// Send an arbitrary `{type, data}` command
    pub async fn send_message(&self, kind: impl Into<String>, data: Value) -> TetherResult<()> {
        self.send(RendererCommand::Custom {
            kind: kind.into(),
            data,
        })
        .await
    }

    /// Merge `scene` into the stored scene and send the full result
    pub async fn initialize_scene(&self, scene: Map<String, Value>) -> TetherResult<()> {
        let merged = {
            let mut stored = self.inner.scene.lock();
            stored.extend(scene);
            stored.clone()
        };
        self.send(RendererCommand::Initialize(merged)).await
    }

    /// Merge `partial` into the stored scene and send only `partial`.
    ///
    /// The stored scene is updated even if the renderer is not running.
    pub async fn update_style(&self, partial: Map<String, Value>) -> TetherResult<()> {
        self.inner.scene.lock().extend(partial.clone());
        self.send(RendererCommand::UpdateStyle(partial)).await
    }

    pub async fn set_camera(&self, pose: CameraPose) -> TetherResult<()> {
        self.send(RendererCommand::Camera(pose)).await
    }

    pub async fn render_to_file(&self, request: RenderRequest) -> TetherResult<()> {
        self.send(RendererCommand::Render(request)).await
    }

    pub async fn update_post_processing(&self, settings: Map<String, Value>) -> TetherResult<()> {
        self.send(RendererCommand::PostProcessing(settings)).await
    }

    pub async fn set_paused(&self, paused: bool) -> TetherResult<()> {
        self.send(RendererCommand::SetPaused(paused)).await
    }

    pub async fn trigger_effect(&self, effect_type: impl Into<String>, params: Value) -> TetherResult<()> {
        self.send(RendererCommand::TriggerEffect {
            effect_type: effect_type.into(),
            params,
        })
        .await
    }

    /// Run a renderer-side tool and wait for its result.
    ///
    /// A result sent as a JSON string is decoded. Failures of the form
    /// `"CODE: message"` become [`TetherError::CallFailed`] with `code` set.
    pub async fn call_tool(&self, tool: &str, arguments: Value) -> TetherResult<Value> {
        tracing::debug!(process = %self.process_name(), tool = %tool, "Calling renderer tool");
        self.inner
            .supervisor
            .call_with(
                self.process_name(),
                TOOL_CALL_KIND,
                self.inner.config.call_timeout,
                |id| tool_call_message(id, tool, &arguments),
            )
            .await
            .map(decode_embedded)
            .map_err(split_fault_code)
    }

    /// Two-phase shutdown: ask politely, then SIGTERM after the signal delay,
    /// then SIGKILL after the kill timeout. Resolves once the process is gone.
    ///
    /// Returns `Ok(false)` if the renderer was not running.
    pub async fn shutdown(&self) -> TetherResult<bool> {
        let name = self.process_name();
        if !self.is_running() {
            return Ok(false);
        }

        tracing::info!(process = %name, "Shutting down renderer");
        let farewell = FramedMessage::from(RendererCommand::Shutdown { graceful: true });
        let options = StopOptions {
            signal_delay: self.inner.config.shutdown_signal_delay,
            kill_after: self.inner.config.shutdown_kill_after,
        };
        let stopped = self
            .inner
            .supervisor
            .stop_with_farewell(name, farewell, options)
            .await?;
        // A renderer that exits on its own after the farewell is stopped too
        Ok(stopped || !self.is_running())
    }
}

impl From<RendererCommand> for FramedMessage {
    fn from(command: RendererCommand) -> Self {
        command.to_message()
    }
}

/// Decode renderer messages until the channel closes or the bridge goes away
async fn translate(
    process: String,
    mut messages: broadcast::Receiver<FramedMessage>,
    events: KeyedEventBus<BridgeEvent>,
    failures: EventBus<RendererFault>,
    token: CancellationToken,
) {
    loop {
        let message = tokio::select! {
            _ = token.cancelled() => break,
            received = messages.recv() => match received {
                Ok(message) => message,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(process = %process, skipped, "Renderer event listener lagged");
                    continue;
                }
                Err(RecvError::Closed) => break,
            },
        };

        let event = BridgeEvent::from_message(&message);
        match &event {
            BridgeEvent::Heartbeat(beat) => {
                tracing::trace!(process = %process, fps = ?beat.fps, memory_mb = ?beat.memory_usage_mb, objects = ?beat.active_objects, "Renderer heartbeat");
            }
            BridgeEvent::Error(fault) => {
                tracing::error!(process = %process, code = %fault.error_code, message = %fault.message, "Renderer error");
                failures.publish(fault.clone());
            }
            BridgeEvent::Other { kind, .. } => {
                tracing::debug!(process = %process, kind = %kind, "Unrecognized renderer message");
            }
            other => {
                tracing::debug!(process = %process, event = %other.event_type(), "Renderer event");
            }
        }
        events.publish(event);
    }
    tracing::debug!(process = %process, "Renderer event translation stopped");
}

fn split_fault_code(error: TetherError) -> TetherError {
    match error {
        TetherError::CallFailed {
            message,
            code: None,
            context,
        } => {
            let (code, message) = match message.split_once(": ") {
                Some((code, rest)) if is_fault_code(code) => (Some(code.to_string()), rest.to_string()),
                _ => (None, message),
            };
            TetherError::CallFailed {
                message,
                code,
                context,
            }
        }
        other => other,
    }
}

fn is_fault_code(code: &str) -> bool {
    !code.is_empty()
        && code
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProcessSpec, SupervisorConfig};
    use serde_json::json;

    fn bridge() -> RendererBridge {
        let supervisor = ProcessSupervisor::new(SupervisorConfig::default());
        let config = BridgeConfig {
            renderer: ProcessSpec::new("renderer-that-does-not-exist").with_kind("renderer"),
            ..BridgeConfig::default()
        };
        RendererBridge::new(supervisor, config).unwrap()
    }

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[tokio::test]
    async fn test_registers_renderer_once() {
        let bridge = bridge();
        assert!(bridge.supervisor().is_registered("renderer"));
        assert!(!bridge.is_running());

        let again = RendererBridge::new(bridge.supervisor().clone(), bridge.config().clone());
        assert!(matches!(again, Err(TetherError::InvalidState { .. })));
    }

    #[tokio::test]
    async fn test_status_reports_renderer_kind() {
        let bridge = bridge();
        let status = bridge.status().unwrap();
        assert_eq!(status.kind.as_deref(), Some("renderer"));
    }

    #[tokio::test]
    async fn test_update_style_merges_even_when_stopped() {
        let bridge = bridge();
        let result = bridge
            .update_style(object(json!({"pinkIntensity": 0.99, "neonFlickerSpeed": 1.5})))
            .await;
        assert!(matches!(result, Err(TetherError::Transport { .. })));

        let scene = bridge.scene();
        assert_eq!(scene["pinkIntensity"], json!(0.99));
        assert_eq!(scene["neonFlickerSpeed"], json!(1.5));
        assert_eq!(scene["style"], json!("neon-cyber-goth"));
    }

    #[tokio::test]
    async fn test_shutdown_when_stopped_is_noop() {
        assert!(!bridge().shutdown().await.unwrap());
    }

    #[tokio::test]
    async fn test_inbound_messages_become_events() {
        let bridge = bridge();
        let mut loaded = bridge.subscribe(BridgeEventKind::SceneLoaded);
        let mut failures = bridge.failures();
        let channel = bridge.supervisor().channel("renderer").unwrap();

        channel.router().route(
            r#"{"type":"error","data":{"errorCode":"RENDER_FAILED","message":"GPU lost"}}"#
                .parse()
                .unwrap(),
        );
        channel.router().route(
            r#"{"type":"scene-loaded","data":{"sceneName":"MainScene","objectCount":200}}"#
                .parse()
                .unwrap(),
        );

        let fault = failures.recv().await.unwrap();
        assert_eq!(fault.error_code, "RENDER_FAILED");

        let BridgeEvent::SceneLoaded(data) = loaded.recv().await.unwrap() else {
            panic!("expected scene-loaded");
        };
        assert_eq!(data["objectCount"], 200);
    }

    #[test]
    fn test_split_fault_code() {
        let split = split_fault_code(TetherError::call_failed("SPAWN_FAILED: no prefab", None));
        assert!(matches!(
            split,
            TetherError::CallFailed { ref message, code: Some(ref code), .. }
                if message == "no prefab" && code == "SPAWN_FAILED"
        ));

        let plain = split_fault_code(TetherError::call_failed("Failed: lowercase prefix", None));
        assert!(matches!(plain, TetherError::CallFailed { code: None, .. }));
    }
}
