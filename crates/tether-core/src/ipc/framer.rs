//! Line framing over byte streams
//!
//! [`LineBuffer`] turns arbitrary byte chunks into complete lines, holding any
//! trailing partial line until the next chunk. [`LineFramer`] classifies each line
//! as a protocol message, unstructured text or a malformed message. Output is the
//! same however the input bytes are chunked.

use super::message::FramedMessage;
use crate::config::defaults::framing::MAX_LINE_BYTES;
use crate::error::{TetherError, TetherResult};
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

/// Output of [`LineBuffer::push`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    /// A complete, non-empty line without its terminator
    Line(String),
    /// A line longer than the limit was dropped; carries its length in bytes
    Overflow(usize),
}

/// Accumulates bytes and yields complete lines
#[derive(Debug)]
pub struct LineBuffer {
    buf: Vec<u8>,
    max_line: usize,
    discarding: bool,
    discarded: usize,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::with_max_line(MAX_LINE_BYTES)
    }

    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_line: max_line.max(1),
            discarding: false,
            discarded: 0,
        }
    }

    /// Append a chunk and return every line it completes
    pub fn push(&mut self, chunk: &[u8]) -> Vec<LineEvent> {
        let mut out = Vec::new();
        let mut rest = chunk;

        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            let head = &rest[..pos];
            rest = &rest[pos + 1..];

            if self.discarding {
                out.push(LineEvent::Overflow(self.discarded + head.len()));
                self.discarding = false;
                self.discarded = 0;
                continue;
            }

            self.buf.extend_from_slice(head);
            if self.buf.len() > self.max_line {
                out.push(LineEvent::Overflow(self.buf.len()));
                self.buf.clear();
                continue;
            }

            let line = std::mem::take(&mut self.buf);
            if let Some(line) = decode_line(&line) {
                out.push(LineEvent::Line(line));
            }
        }

        if self.discarding {
            self.discarded += rest.len();
        } else {
            self.buf.extend_from_slice(rest);
            if self.buf.len() > self.max_line {
                self.discarding = true;
                self.discarded = self.buf.len();
                self.buf = Vec::new();
            }
        }

        out
    }

    /// Flush the trailing partial line at end of stream
    pub fn finish(&mut self) -> Option<String> {
        if self.discarding {
            self.discarding = false;
            self.discarded = 0;
            return None;
        }
        let line = std::mem::take(&mut self.buf);
        decode_line(&line)
    }

    /// Bytes buffered for the current partial line
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

fn decode_line(bytes: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(bytes);
    let text = text.strip_suffix('\r').unwrap_or(&text);
    if text.trim().is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// A classified line from a child's protocol stream
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// A well-formed protocol message
    Message(FramedMessage),
    /// A line that is not JSON: the child's own log output
    Text(String),
    /// JSON without a usable `type` discriminator
    Malformed { line: String, reason: String },
    /// An oversized line was dropped
    Overflow(usize),
}

impl Frame {
    /// Classify a single complete line
    pub fn classify(line: String) -> Self {
        let value: Value = match serde_json::from_str(&line) {
            Ok(value) => value,
            Err(_) => return Frame::Text(line),
        };
        match FramedMessage::try_from(value) {
            Ok(message) => Frame::Message(message),
            Err(e) => Frame::Malformed {
                line,
                reason: e.to_string(),
            },
        }
    }
}

/// Splits a byte stream into [`Frame`]s
#[derive(Debug, Default)]
pub struct LineFramer {
    lines: LineBuffer,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            lines: LineBuffer::with_max_line(max_line),
        }
    }

    /// Feed a chunk and return the frames it completes
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.lines
            .push(chunk)
            .into_iter()
            .map(|event| match event {
                LineEvent::Line(line) => Frame::classify(line),
                LineEvent::Overflow(len) => Frame::Overflow(len),
            })
            .collect()
    }

    /// End of stream. An unterminated trailing line is never a message.
    pub fn finish(&mut self) -> Option<Frame> {
        self.lines.finish().map(Frame::Text)
    }

    pub fn pending(&self) -> usize {
        self.lines.pending()
    }
}

/// Serialize a message as one JSON line
pub fn encode_line<T: Serialize + ?Sized>(message: &T) -> TetherResult<Vec<u8>> {
    let mut bytes = serde_json::to_vec(message)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Writes whole lines with a single write each; concurrent writers never interleave
#[derive(Debug)]
pub struct FramedWriter<W> {
    inner: Mutex<W>,
}

impl<W: AsyncWrite + Unpin + Send> FramedWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            inner: Mutex::new(writer),
        }
    }

    /// Serialize, write and flush one message
    pub async fn write_line<T: Serialize + ?Sized>(&self, message: &T) -> TetherResult<()> {
        let bytes = encode_line(message)?;
        let mut writer = self.inner.lock().await;
        writer
            .write_all(&bytes)
            .await
            .map_err(|e| TetherError::transport(format!("write failed: {}", e)))?;
        writer
            .flush()
            .await
            .map_err(|e| TetherError::transport(format!("flush failed: {}", e)))?;
        Ok(())
    }

    /// Shut down the underlying writer
    pub async fn close(&self) -> TetherResult<()> {
        let mut writer = self.inner.lock().await;
        writer
            .shutdown()
            .await
            .map_err(|e| TetherError::transport(format!("close failed: {}", e)))
    }
}
