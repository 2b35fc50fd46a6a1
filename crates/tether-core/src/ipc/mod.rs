//! Line-delimited JSON IPC with child processes
//!
//! Every message is one JSON object terminated by a single `\n`, exchanged over a
//! child's stdin/stdout. The pieces, leaves first:
//!
//! - [`message`]: the immutable [`FramedMessage`] unit
//! - [`framer`]: byte chunks in, complete lines and messages out
//! - [`correlator`]: id allocation and exactly-once resolution of pending calls
//! - [`router`]: inbound messages to pending calls or type listeners
//! - [`channel`]: the per-process write side plus the read pump

pub mod channel;
pub mod correlator;
pub mod framer;
pub mod message;
pub mod router;

pub use channel::{MessageSink, ProcessChannel, pump_frames, pump_lines};
pub use correlator::{CallCorrelator, CallOutcome, PendingCallInfo};
pub use framer::{Frame, FramedWriter, LineBuffer, LineEvent, LineFramer, encode_line};
pub use message::{FramedMessage, RESPONSE_KIND, timestamp_now};
pub use router::{MessageRouter, RouteOutcome};
