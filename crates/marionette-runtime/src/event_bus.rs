//! Typed event bus for broadcasting component events

use std::fmt;

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe later
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler<E> = Box<dyn FnMut(&E)>;

/// An event bus with two delivery modes.
///
/// Subscribers registered with `subscribe` are invoked synchronously from
/// `publish`, in registration order. Every published event is also queued so
/// a frame loop can `drain` it afterwards.
pub struct EventBus<E> {
    events: Vec<E>,
    handlers: Vec<(SubscriptionId, Handler<E>)>,
    next_id: u64,
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("pending", &self.events.len())
            .field("subscribers", &self.handlers.len())
            .finish()
    }
}

impl<E> EventBus<E> {
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            handlers: Vec::new(),
            next_id: 0,
        }
    }

    /// Register a handler invoked for every published event
    pub fn subscribe(&mut self, handler: impl FnMut(&E) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.handlers.push((id, Box::new(handler)));
        id
    }

    /// Remove a handler. Returns false if the id was unknown or already removed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(sid, _)| *sid != id);
        self.handlers.len() != before
    }

    /// Notify subscribers, then queue the event for draining
    pub fn publish(&mut self, event: E) {
        for (_, handler) in self.handlers.iter_mut() {
            handler(&event);
        }
        self.events.push(event);
    }

    /// Queue an event without notifying subscribers
    pub fn push(&mut self, event: E) {
        self.events.push(event);
    }

    /// Drain all events from the bus, returning them
    pub fn drain(&mut self) -> Vec<E> {
        std::mem::take(&mut self.events)
    }

    /// Drop all subscribers and pending events
    pub fn clear(&mut self) {
        self.events.clear();
        self.handlers.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.handlers.len()
    }
}
