//! # void_event - Observer Signals and Event Channels
//!
//! Small event primitives shared by engine subsystems:
//! - [`Signal`]: an explicit subscriber list, fanned out once per emit
//! - [`EventChannel`]: a FIFO queue for events that are drained later
//!
//! Handlers only ever receive `&E`, so a handler cannot reach back into the
//! object that owns the signal while it is emitting.

use crossbeam_channel::{unbounded, Receiver, Sender};

/// Trait for events
pub trait Event: Send + Sync + 'static {}

// Blanket implementation
impl<T: Send + Sync + 'static> Event for T {}

/// Event handler function type
pub type EventHandler<E> = Box<dyn Fn(&E) + Send + Sync>;

/// Subscriber ID
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriberId(pub u64);

/// Multicast signal with an explicit subscriber list
///
/// Every subscriber is called exactly once per [`Signal::emit`], in
/// subscription order.
pub struct Signal<E: Event> {
    handlers: Vec<(SubscriberId, EventHandler<E>)>,
    next_subscriber_id: u64,
    emitted: u64,
}

impl<E: Event> Signal<E> {
    /// Create a signal with no subscribers
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
            next_subscriber_id: 1,
            emitted: 0,
        }
    }

    /// Subscribe a handler
    pub fn subscribe<F>(&mut self, handler: F) -> SubscriberId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = SubscriberId(self.next_subscriber_id);
        self.next_subscriber_id += 1;
        self.handlers.push((id, Box::new(handler)));
        id
    }

    /// Remove a subscriber. Returns false if it was not subscribed.
    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(sub_id, _)| *sub_id != id);
        self.handlers.len() != before
    }

    /// Deliver an event to every subscriber
    pub fn emit(&mut self, event: &E) {
        self.emitted += 1;
        for (_, handler) in &self.handlers {
            handler(event);
        }
    }

    /// Number of subscribers
    pub fn subscriber_count(&self) -> usize {
        self.handlers.len()
    }

    /// Total number of events emitted through this signal
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Drop all subscribers
    pub fn clear(&mut self) {
        self.handlers.clear();
    }
}

impl<E: Event> Default for Signal<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Event> core::fmt::Debug for Signal<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Signal")
            .field("subscribers", &self.handlers.len())
            .field("emitted", &self.emitted)
            .finish()
    }
}

/// Channel for single-type events
///
/// Producers push with [`EventChannel::send`]; the owner drains once per
/// frame.
pub struct EventChannel<E: Event> {
    sender: Sender<E>,
    receiver: Receiver<E>,
}

impl<E: Event> EventChannel<E> {
    /// Create a new channel
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    /// Send an event
    pub fn send(&self, event: E) {
        // The receiver lives as long as the channel, so this cannot fail.
        let _ = self.sender.send(event);
    }

    /// Drain all events
    pub fn drain(&self) -> Vec<E> {
        self.receiver.try_iter().collect()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Get pending count
    pub fn len(&self) -> usize {
        self.receiver.len()
    }
}

impl<E: Event> Default for EventChannel<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Event> core::fmt::Debug for EventChannel<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventChannel")
            .field("pending", &self.receiver.len())
            .finish()
    }
}

/// Prelude
pub mod prelude {
    pub use crate::{Event, EventChannel, EventHandler, Signal, SubscriberId};
}
