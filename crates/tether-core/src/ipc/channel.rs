//! Per-process message channel and stream pumps

use super::correlator::CallCorrelator;
use super::framer::{Frame, FramedWriter, LineBuffer, LineEvent, LineFramer};
use super::message::FramedMessage;
use super::router::MessageRouter;
use crate::error::{TetherError, TetherResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};

const READ_CHUNK: usize = 8 * 1024;

/// Destination for outbound framed messages
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send(&self, message: FramedMessage) -> TetherResult<()>;
}

type BoxedWriter = FramedWriter<Box<dyn AsyncWrite + Send + Unpin>>;

/// Messaging endpoint of one supervised process.
///
/// Lives as long as the registration, across restarts: each launch attaches the
/// new stdin, each exit detaches it and aborts calls still in flight.
pub struct ProcessChannel {
    name: String,
    writer: RwLock<Option<Arc<BoxedWriter>>>,
    router: MessageRouter,
}

impl ProcessChannel {
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            writer: RwLock::new(None),
            router: MessageRouter::new(Arc::new(CallCorrelator::new()), capacity),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn router(&self) -> &MessageRouter {
        &self.router
    }

    pub fn correlator(&self) -> &Arc<CallCorrelator> {
        self.router.correlator()
    }

    /// Use `writer` as the process input stream
    pub fn attach<W>(&self, writer: W)
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let boxed: Box<dyn AsyncWrite + Send + Unpin> = Box::new(writer);
        *self.writer.write() = Some(Arc::new(FramedWriter::new(boxed)));
    }

    /// Drop the input stream and abort pending calls
    pub fn detach(&self, reason: &str) {
        self.writer.write().take();
        let aborted = self.correlator().fail_all(reason);
        if aborted > 0 {
            tracing::warn!(process = %self.name, aborted, reason = %reason, "Aborted pending calls");
        }
    }

    pub fn is_attached(&self) -> bool {
        self.writer.read().is_some()
    }

    /// Correlated request/response over this channel
    pub async fn call(&self, kind: &str, payload: Value, timeout: Duration) -> TetherResult<Value> {
        let correlator = Arc::clone(self.correlator());
        correlator.call(self, kind, payload, timeout).await
    }

    /// Correlated call whose message is built from the call id
    pub async fn call_with<F>(&self, kind: &str, timeout: Duration, build: F) -> TetherResult<Value>
    where
        F: FnOnce(&str) -> FramedMessage + Send,
    {
        let correlator = Arc::clone(self.correlator());
        correlator.call_with(self, kind, timeout, build).await
    }
}

#[async_trait]
impl MessageSink for ProcessChannel {
    async fn send(&self, message: FramedMessage) -> TetherResult<()> {
        let writer = self.writer.read().clone().ok_or_else(|| {
            TetherError::transport(format!("process '{}' is not running", self.name))
        })?;
        writer.write_line(&message).await.map_err(|e| {
            e.with_context(format!("Sending '{}' to '{}'", message.kind(), self.name))
        })?;
        tracing::trace!(process = %self.name, kind = %message.kind(), "Sent message");
        Ok(())
    }
}

/// Read `reader` to EOF, handing every frame to `on_frame`
pub async fn pump_frames<R, F>(mut reader: R, mut framer: LineFramer, mut on_frame: F) -> TetherResult<()>
where
    R: AsyncRead + Unpin,
    F: FnMut(Frame),
{
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        for frame in framer.push(&chunk[..n]) {
            on_frame(frame);
        }
    }
    if let Some(frame) = framer.finish() {
        on_frame(frame);
    }
    Ok(())
}

/// Read `reader` to EOF, handing every line to `on_line` without classification
pub async fn pump_lines<R, F>(mut reader: R, mut on_line: F) -> TetherResult<()>
where
    R: AsyncRead + Unpin,
    F: FnMut(LineEvent),
{
    let mut lines = LineBuffer::new();
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        for event in lines.push(&chunk[..n]) {
            on_line(event);
        }
    }
    if let Some(line) = lines.finish() {
        on_line(LineEvent::Line(line));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    #[tokio::test]
    async fn test_send_without_process_fails() {
        let channel = ProcessChannel::new("renderer", 16);
        let err = channel.send(FramedMessage::new("ping")).await.unwrap_err();
        assert!(matches!(err, TetherError::Transport { .. }));
    }

    #[tokio::test]
    async fn test_send_writes_one_line_per_message() {
        let channel = ProcessChannel::new("renderer", 16);
        let (client, server) = tokio::io::duplex(4096);
        channel.attach(client);

        channel
            .send(FramedMessage::command("setPaused", json!({"paused": true})))
            .await
            .unwrap();
        channel
            .send(FramedMessage::command("camera", json!({"position": {"x": 1}})))
            .await
            .unwrap();

        let mut lines = BufReader::new(server).lines();
        let first: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        let second: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(first["type"], "setPaused");
        assert_eq!(second["type"], "camera");
    }

    #[tokio::test]
    async fn test_call_round_trip_through_pump() {
        let channel = Arc::new(ProcessChannel::new("renderer", 16));
        let (to_child, child_stdin) = tokio::io::duplex(4096);
        let (mut child_stdout, from_child) = tokio::io::duplex(4096);
        channel.attach(to_child);

        // Fake child: echo every request back as a successful response
        tokio::spawn(async move {
            let mut lines = BufReader::new(child_stdin).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let request: Value = serde_json::from_str(&line).unwrap();
                let reply = json!({
                    "type": "response",
                    "id": request["id"],
                    "success": true,
                    "result": request["data"],
                });
                child_stdout.write_all(b"booting...\n").await.unwrap();
                child_stdout
                    .write_all(format!("{}\n", reply).as_bytes())
                    .await
                    .unwrap();
            }
        });

        let pump_channel = channel.clone();
        tokio::spawn(async move {
            pump_frames(from_child, LineFramer::new(), |frame| {
                if let Frame::Message(message) = frame {
                    pump_channel.router().route(message);
                }
            })
            .await
        });

        let result = channel
            .call("toolCall", json!({"tool": "clear_objects"}), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(result, json!({"tool": "clear_objects"}));
    }

    #[tokio::test]
    async fn test_detach_aborts_pending_calls() {
        let channel = Arc::new(ProcessChannel::new("renderer", 16));
        let (client, _server) = tokio::io::duplex(4096);
        channel.attach(client);

        let caller = {
            let channel = channel.clone();
            tokio::spawn(async move { channel.call("render", json!({}), Duration::from_secs(30)).await })
        };

        while channel.correlator().pending_count() == 0 {
            tokio::task::yield_now().await;
        }
        channel.detach("process exited");

        assert!(caller.await.unwrap().is_err());
        assert!(!channel.is_attached());
    }

    #[tokio::test]
    async fn test_pump_lines_flushes_partial_line() {
        let input: &[u8] = b"warning: low memory\npartial";
        let mut seen = Vec::new();
        pump_lines(input, |event| seen.push(event)).await.unwrap();
        assert_eq!(
            seen,
            vec![
                LineEvent::Line("warning: low memory".to_string()),
                LineEvent::Line("partial".to_string())
            ]
        );
    }
}
