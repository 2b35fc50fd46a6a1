//! Broadcast event buses
//!
//! Components publish closed, typed events. [`EventBus`] fans every event out to
//! every subscriber. [`KeyedEventBus`] additionally keeps one channel per event
//! kind, created lazily on first subscription, so a publish only reaches the
//! listeners interested in that kind.

use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Default buffer size of a bus
pub const DEFAULT_CAPACITY: usize = 256;

/// An event that can be routed by kind
pub trait TypedEvent: Clone + Send + 'static {
    type Kind: Clone + Eq + Hash + Send + Sync + 'static;

    /// Routing key of this event
    fn kind(&self) -> Self::Kind;
}

/// Broadcast bus distributing every event to every subscriber.
///
/// Slow subscribers lag and lose the oldest events once `capacity` is exceeded.
#[derive(Debug)]
pub struct EventBus<E> {
    sender: broadcast::Sender<E>,
    capacity: usize,
}

impl<E: Clone> EventBus<E> {
    /// Create a new event bus with the specified capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender, capacity }
    }

    /// Publish an event, returning how many receivers will see it
    pub fn publish(&self, event: E) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Get the channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<E: Clone> Default for EventBus<E> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            capacity: self.capacity,
        }
    }
}

/// Bus with an "all events" channel plus one channel per kind
pub struct KeyedEventBus<E: TypedEvent> {
    all: EventBus<E>,
    by_kind: Arc<DashMap<E::Kind, broadcast::Sender<E>>>,
    capacity: usize,
}

impl<E: TypedEvent> KeyedEventBus<E> {
    pub fn new(capacity: usize) -> Self {
        Self {
            all: EventBus::new(capacity),
            by_kind: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Publish to the kind channel (if anyone ever subscribed) and the all channel.
    ///
    /// Returns the total number of receivers reached.
    pub fn publish(&self, event: E) -> usize {
        let kind_receivers = match self.by_kind.get(&event.kind()) {
            Some(sender) if sender.receiver_count() > 0 => {
                sender.send(event.clone()).unwrap_or(0)
            }
            _ => 0,
        };
        kind_receivers + self.all.publish(event)
    }

    /// Subscribe to a single kind
    pub fn subscribe(&self, kind: E::Kind) -> broadcast::Receiver<E> {
        self.by_kind
            .entry(kind)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Subscribe to every kind
    pub fn subscribe_all(&self) -> broadcast::Receiver<E> {
        self.all.subscribe()
    }

    /// Subscribers listening to one kind
    pub fn subscriber_count(&self, kind: &E::Kind) -> usize {
        self.by_kind
            .get(kind)
            .map(|s| s.receiver_count())
            .unwrap_or(0)
    }

    /// Subscribers of the all channel
    pub fn all_subscriber_count(&self) -> usize {
        self.all.subscriber_count()
    }
}

impl<E: TypedEvent> Clone for KeyedEventBus<E> {
    fn clone(&self) -> Self {
        Self {
            all: self.all.clone(),
            by_kind: Arc::clone(&self.by_kind),
            capacity: self.capacity,
        }
    }
}

impl<E: TypedEvent> Default for KeyedEventBus<E> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

type Predicate<E> = Box<dyn Fn(&E) -> bool + Send + Sync>;

/// Receiver that skips events not matching a predicate
pub struct FilteredSubscriber<E> {
    receiver: broadcast::Receiver<E>,
    filter: Predicate<E>,
}

impl<E: Clone> FilteredSubscriber<E> {
    pub fn new(
        receiver: broadcast::Receiver<E>,
        filter: impl Fn(&E) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            receiver,
            filter: Box::new(filter),
        }
    }

    /// Receive the next matching event
    pub async fn recv(&mut self) -> Result<E, broadcast::error::RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if (self.filter)(&event) {
                return Ok(event);
            }
        }
    }
}
