//! Request/response correlation
//!
//! Each outbound call gets a fresh id and a pending entry holding a one-shot
//! sender. The entry is removed under the table lock by whichever side gets
//! there first: the router delivering the response, or the caller's timer.
//! Removal decides the winner, so a call resolves exactly once and a late
//! response finds nothing to resolve.

use super::channel::MessageSink;
use super::message::FramedMessage;
use crate::error::{TetherError, TetherResult};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// How a pending call ended
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    /// The peer answered successfully
    Success(Value),
    /// The peer answered with a failure
    Failure {
        message: String,
        code: Option<String>,
    },
    /// The call was abandoned because the connection went away
    Aborted(String),
}

impl CallOutcome {
    /// Interpret a response message.
    ///
    /// `success: false` means failure. Without a `success` flag, a non-empty
    /// `error` means failure. Otherwise the payload is `result`, falling back
    /// to `data`.
    pub fn from_response(message: &FramedMessage) -> Self {
        let failed = match message.field("success").and_then(Value::as_bool) {
            Some(success) => !success,
            None => message.field("error").is_some_and(has_error),
        };

        if failed {
            let error = message.field("error");
            let text = match error {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Object(obj)) => obj
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("call failed")
                    .to_string(),
                Some(other) if !other.is_null() => other.to_string(),
                _ => "call failed".to_string(),
            };
            let code = message
                .field("code")
                .or_else(|| error.and_then(|e| e.get("code")))
                .and_then(code_to_string);
            return CallOutcome::Failure {
                message: text,
                code,
            };
        }

        let payload = message
            .field("result")
            .or_else(|| message.data())
            .cloned()
            .unwrap_or(Value::Null);
        CallOutcome::Success(payload)
    }

    fn into_result(self) -> TetherResult<Value> {
        match self {
            CallOutcome::Success(value) => Ok(value),
            CallOutcome::Failure { message, code } => Err(TetherError::call_failed(message, code)),
            CallOutcome::Aborted(reason) => Err(TetherError::transport(reason)),
        }
    }
}

fn has_error(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

fn code_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

struct PendingCall {
    kind: String,
    deadline: Instant,
    tx: oneshot::Sender<CallOutcome>,
}

/// Snapshot of an in-flight call
#[derive(Debug, Clone)]
pub struct PendingCallInfo {
    pub id: String,
    pub kind: String,
    pub deadline: Instant,
}

/// Issues call ids and tracks pending calls
#[derive(Default)]
pub struct CallCorrelator {
    next_id: AtomicU64,
    pending: Mutex<HashMap<String, PendingCall>>,
}

/// Removes the pending entry if the caller's future is dropped mid-call
struct PendingGuard<'a> {
    pending: &'a Mutex<HashMap<String, PendingCall>>,
    id: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.lock().remove(self.id);
    }
}

impl CallCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh call id
    pub fn next_id(&self) -> String {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        format!("call-{}", n)
    }

    /// Send `{type, id, data}` through `sink` and wait for the matching response
    pub async fn call(
        &self,
        sink: &dyn MessageSink,
        kind: &str,
        payload: Value,
        timeout: Duration,
    ) -> TetherResult<Value> {
        self.call_with(sink, kind, timeout, move |id| {
            FramedMessage::request(kind, id, payload)
        })
        .await
    }

    /// Like [`call`](Self::call), with the outbound message built from the fresh id.
    ///
    /// The built message must carry the id (as `id` or `callId`) somewhere the
    /// peer echoes back.
    pub async fn call_with<F>(
        &self,
        sink: &dyn MessageSink,
        kind: &str,
        timeout: Duration,
        build: F,
    ) -> TetherResult<Value>
    where
        F: FnOnce(&str) -> FramedMessage + Send,
    {
        let id = self.next_id();
        let (tx, mut rx) = oneshot::channel();
        let deadline = Instant::now() + timeout;

        self.pending.lock().insert(
            id.clone(),
            PendingCall {
                kind: kind.to_string(),
                deadline,
                tx,
            },
        );
        let _guard = PendingGuard {
            pending: &self.pending,
            id: &id,
        };

        tracing::debug!(call_id = %id, kind = %kind, timeout_ms = timeout.as_millis() as u64, "Sending correlated call");
        // The deadline covers the write too: a peer that stops reading must not hold the call open
        let exchange = async {
            sink.send(build(&id)).await?;
            Ok::<_, TetherError>(
                (&mut rx)
                    .await
                    .unwrap_or_else(|_| CallOutcome::Aborted("call abandoned".to_string())),
            )
        };

        let outcome = match tokio::time::timeout_at(deadline, exchange).await {
            Ok(outcome) => outcome?,
            Err(_) => {
                let expired = self.pending.lock().remove(&id).is_some();
                if expired {
                    tracing::warn!(call_id = %id, kind = %kind, "Call timed out");
                    return Err(TetherError::timeout(format!("call '{}' ({})", kind, id), timeout));
                }
                // The response won the race after the deadline fired
                rx.await
                    .unwrap_or_else(|_| CallOutcome::Aborted("call abandoned".to_string()))
            }
        };

        outcome.into_result()
    }

    /// Resolve a pending call. Returns false if the id is not pending.
    pub fn resolve(&self, id: &str, outcome: CallOutcome) -> bool {
        let Some(call) = self.pending.lock().remove(id) else {
            return false;
        };
        if call.tx.send(outcome).is_err() {
            tracing::debug!(call_id = %id, kind = %call.kind, "Caller went away before resolution");
        }
        true
    }

    /// Whether a call with this id is waiting
    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.lock().contains_key(id)
    }

    /// Abort every pending call, returning how many were aborted
    pub fn fail_all(&self, reason: &str) -> usize {
        let drained: Vec<_> = self.pending.lock().drain().collect();
        let count = drained.len();
        for (id, call) in drained {
            tracing::debug!(call_id = %id, kind = %call.kind, reason = %reason, "Aborting pending call");
            let _ = call.tx.send(CallOutcome::Aborted(reason.to_string()));
        }
        count
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// In-flight calls ordered by deadline
    pub fn pending_calls(&self) -> Vec<PendingCallInfo> {
        let mut calls: Vec<_> = self
            .pending
            .lock()
            .iter()
            .map(|(id, call)| PendingCallInfo {
                id: id.clone(),
                kind: call.kind.clone(),
                deadline: call.deadline,
            })
            .collect();
        calls.sort_by_key(|c| c.deadline);
        calls
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    /// Sink that hands every sent message to the test
    struct CaptureSink {
        tx: mpsc::UnboundedSender<FramedMessage>,
    }

    #[async_trait]
    impl MessageSink for CaptureSink {
        async fn send(&self, message: FramedMessage) -> TetherResult<()> {
            self.tx
                .send(message)
                .map_err(|_| TetherError::transport("closed"))
        }
    }

    struct BrokenSink;

    #[async_trait]
    impl MessageSink for BrokenSink {
        async fn send(&self, _message: FramedMessage) -> TetherResult<()> {
            Err(TetherError::transport("not running"))
        }
    }

    fn capture() -> (CaptureSink, mpsc::UnboundedReceiver<FramedMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (CaptureSink { tx }, rx)
    }

    /// Reply to the first captured request after `delay`
    fn respond_after(
        correlator: Arc<CallCorrelator>,
        mut rx: mpsc::UnboundedReceiver<FramedMessage>,
        delay: Duration,
        outcome: CallOutcome,
    ) -> tokio::task::JoinHandle<bool> {
        tokio::spawn(async move {
            let request = rx.recv().await.unwrap();
            tokio::time::sleep(delay).await;
            correlator.resolve(request.id().unwrap(), outcome)
        })
    }

    #[test]
    fn test_ids_are_unique() {
        let correlator = CallCorrelator::new();
        let a = correlator.next_id();
        let b = correlator.next_id();
        assert_ne!(a, b);
        assert_eq!(a, "call-1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_with_builds_message_from_id() {
        let correlator = Arc::new(CallCorrelator::new());
        let (sink, mut rx) = capture();
        let responder = {
            let correlator = correlator.clone();
            tokio::spawn(async move {
                let request = rx.recv().await.unwrap();
                assert_eq!(request.id(), None);
                let call_id = request.data().unwrap()["callId"].as_str().unwrap().to_string();
                correlator.resolve(&call_id, CallOutcome::Success(json!("done")))
            })
        };

        let result = correlator
            .call_with(&sink, "mcpToolCall", Duration::from_secs(1), |id| {
                FramedMessage::command("mcpToolCall", json!({ "callId": id }))
            })
            .await
            .unwrap();
        assert_eq!(result, json!("done"));
        assert!(responder.await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_response_before_deadline_resolves_once() {
        for delay_ms in [0u64, 10, 25, 49] {
            let correlator = Arc::new(CallCorrelator::new());
            let (sink, rx) = capture();
            let responder = respond_after(
                correlator.clone(),
                rx,
                Duration::from_millis(delay_ms),
                CallOutcome::Success(json!({"ok": delay_ms})),
            );

            let result = correlator
                .call(&sink, "render", json!({}), Duration::from_millis(50))
                .await
                .unwrap();

            assert_eq!(result, json!({"ok": delay_ms}));
            assert!(responder.await.unwrap());
            assert_eq!(correlator.pending_count(), 0);
            assert!(!correlator.resolve("call-1", CallOutcome::Success(json!(null))));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_then_late_response_is_discarded() {
        let correlator = Arc::new(CallCorrelator::new());
        let (sink, rx) = capture();
        let responder = respond_after(
            correlator.clone(),
            rx,
            Duration::from_millis(80),
            CallOutcome::Success(json!("late")),
        );

        let started = Instant::now();
        let err = correlator
            .call(&sink, "render", json!({}), Duration::from_millis(50))
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert_eq!(correlator.pending_count(), 0);
        // The late response finds nothing to resolve
        assert!(!responder.await.unwrap());
    }

    #[tokio::test]
    async fn test_failure_response_becomes_call_failed() {
        let correlator = Arc::new(CallCorrelator::new());
        let (sink, rx) = capture();
        respond_after(
            correlator.clone(),
            rx,
            Duration::ZERO,
            CallOutcome::Failure {
                message: "no such object".to_string(),
                code: Some("E_NOT_FOUND".to_string()),
            },
        );

        let err = correlator
            .call(&sink, "toolCall", json!({}), Duration::from_secs(5))
            .await
            .unwrap_err();
        match err {
            TetherError::CallFailed { message, code, .. } => {
                assert_eq!(message, "no such object");
                assert_eq!(code.as_deref(), Some("E_NOT_FOUND"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_deadline_covers_a_blocked_write() {
        use crate::ipc::FramedWriter;

        /// Sink over a pipe nobody reads
        struct StalledSink(FramedWriter<tokio::io::DuplexStream>);

        #[async_trait]
        impl MessageSink for StalledSink {
            async fn send(&self, message: FramedMessage) -> TetherResult<()> {
                self.0.write_line(&message).await
            }
        }

        let (writer, _unread) = tokio::io::duplex(64);
        let sink = StalledSink(FramedWriter::new(writer));
        let correlator = CallCorrelator::new();
        let blob = "x".repeat(256 * 1024);

        let result = tokio::time::timeout(
            Duration::from_secs(3),
            correlator.call(&sink, "render", json!({ "blob": blob }), Duration::from_millis(50)),
        )
        .await
        .expect("call outlived its deadline");

        assert!(result.unwrap_err().is_timeout());
        assert_eq!(correlator.pending_count(), 0);

        // The writer lock was released with the abandoned write
        let second = tokio::time::timeout(
            Duration::from_secs(3),
            correlator.call(&sink, "render", json!({}), Duration::from_millis(50)),
        )
        .await
        .expect("second call waited behind the first");
        assert!(second.unwrap_err().is_timeout());
    }

    #[tokio::test]
    async fn test_send_failure_leaves_no_pending_entry() {
        let correlator = CallCorrelator::new();
        let result = correlator
            .call(&BrokenSink, "render", json!({}), Duration::from_secs(1))
            .await;
        assert!(result.is_err());
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_fail_all_aborts_waiters() {
        let correlator = Arc::new(CallCorrelator::new());
        let (sink, mut rx) = capture();

        let caller = {
            let correlator = correlator.clone();
            tokio::spawn(async move {
                correlator
                    .call(&sink, "render", json!({}), Duration::from_secs(30))
                    .await
            })
        };

        rx.recv().await.unwrap();
        assert_eq!(correlator.fail_all("process exited"), 1);
        let err = caller.await.unwrap().unwrap_err();
        assert!(matches!(err, TetherError::Transport { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_caller_removes_entry() {
        let correlator = Arc::new(CallCorrelator::new());
        let (sink, _rx) = capture();

        let call = correlator.call(&sink, "render", json!({}), Duration::from_secs(30));
        let _ = tokio::time::timeout(Duration::from_millis(10), call).await;
        assert_eq!(correlator.pending_count(), 0);
    }

    #[test]
    fn test_outcome_from_response() {
        let ok: FramedMessage = r#"{"type":"response","id":"call-1","success":true,"result":{"spawned":3}}"#
            .parse()
            .unwrap();
        assert_eq!(CallOutcome::from_response(&ok), CallOutcome::Success(json!({"spawned": 3})));

        let data_only: FramedMessage = r#"{"type":"render-complete","id":"call-2","data":{"path":"a.png"}}"#
            .parse()
            .unwrap();
        assert_eq!(
            CallOutcome::from_response(&data_only),
            CallOutcome::Success(json!({"path": "a.png"}))
        );

        let failed: FramedMessage =
            r#"{"type":"response","id":"call-3","success":false,"error":"boom"}"#.parse().unwrap();
        assert_eq!(
            CallOutcome::from_response(&failed),
            CallOutcome::Failure {
                message: "boom".to_string(),
                code: None
            }
        );

        let structured: FramedMessage =
            r#"{"type":"response","id":"call-4","error":{"message":"bad","code":7}}"#.parse().unwrap();
        assert_eq!(
            CallOutcome::from_response(&structured),
            CallOutcome::Failure {
                message: "bad".to_string(),
                code: Some("7".to_string())
            }
        );

        let empty_error: FramedMessage =
            r#"{"callId":"call-5","success":true,"result":"{}","error":""}"#.parse().unwrap();
        assert_eq!(CallOutcome::from_response(&empty_error), CallOutcome::Success(json!("{}")));
    }
}
