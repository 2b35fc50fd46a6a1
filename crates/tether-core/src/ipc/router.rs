//! Inbound message routing

use super::correlator::{CallCorrelator, CallOutcome};
use super::message::FramedMessage;
use crate::events::KeyedEventBus;
use std::sync::Arc;
use tokio::sync::broadcast;

/// What the router did with a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Resolved the pending call with the message's id
    Resolved,
    /// Carried an id that no call is waiting for (late or duplicate); dropped
    Discarded,
    /// Delivered to this many type listeners
    Dispatched(usize),
    /// No listener for this type
    Unhandled,
}

/// Sends messages carrying an id to the correlator and everything else to
/// listeners subscribed to its `type`.
#[derive(Clone)]
pub struct MessageRouter {
    correlator: Arc<CallCorrelator>,
    listeners: KeyedEventBus<FramedMessage>,
}

impl MessageRouter {
    pub fn new(correlator: Arc<CallCorrelator>, capacity: usize) -> Self {
        Self {
            correlator,
            listeners: KeyedEventBus::new(capacity),
        }
    }

    pub fn correlator(&self) -> &Arc<CallCorrelator> {
        &self.correlator
    }

    /// Listen for one message type
    pub fn subscribe(&self, kind: impl Into<String>) -> broadcast::Receiver<FramedMessage> {
        self.listeners.subscribe(kind.into())
    }

    /// Listen for every uncorrelated message
    pub fn subscribe_all(&self) -> broadcast::Receiver<FramedMessage> {
        self.listeners.subscribe_all()
    }

    pub fn route(&self, message: FramedMessage) -> RouteOutcome {
        if let Some(id) = message.id() {
            let outcome = CallOutcome::from_response(&message);
            if self.correlator.resolve(id, outcome) {
                tracing::debug!(call_id = %id, kind = %message.kind(), "Resolved pending call");
                return RouteOutcome::Resolved;
            }
            tracing::debug!(
                call_id = %id,
                kind = %message.kind(),
                "Discarding response with no pending call"
            );
            return RouteOutcome::Discarded;
        }

        match self.listeners.publish(message) {
            0 => RouteOutcome::Unhandled,
            n => RouteOutcome::Dispatched(n),
        }
    }
}
