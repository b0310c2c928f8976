//! Deferred publish/subscribe event bus.
//!
//! Producers call [`World::publish`](crate::world::World::publish), which only
//! appends to a pending queue. Nothing is dispatched until
//! [`World::process_events`](crate::world::World::process_events) drains the
//! queue. The drain is FIFO across all event types: every subscriber sees
//! event A before any subscriber sees a later event B, whatever their types.
//!
//! Events published by a handler while a drain is running land in the queue
//! for the *next* drain, never the current one. Calling `process_events` from
//! inside a handler is rejected with [`EcsError::ReentrantDrain`](crate::EcsError::ReentrantDrain).

use std::any::{Any, TypeId};
use std::collections::{HashMap, VecDeque};
use std::fmt;

use crate::world::World;

/// Marker for event payload types.
pub trait Event: 'static {}

impl<T: 'static> Event for T {}

type Handler = Box<dyn FnMut(&mut World, &dyn Any)>;

struct QueuedEvent {
    type_id: TypeId,
    type_name: &'static str,
    payload: Box<dyn Any>,
}

/// The pending queue plus the subscriber table.
///
/// One bus belongs to one [`World`]; there is no process-wide instance.
#[derive(Default)]
pub struct EventBus {
    queue: VecDeque<QueuedEvent>,
    handlers: HashMap<TypeId, Vec<Handler>>,
    pub(crate) draining: bool,
    published: u64,
    dispatched: u64,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("pending", &self.queue.len())
            .field("event_types", &self.handlers.len())
            .field("draining", &self.draining)
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event to the pending queue. No handler runs here.
    pub fn publish<E: Event>(&mut self, event: E) {
        self.published += 1;
        self.queue.push_back(QueuedEvent {
            type_id: TypeId::of::<E>(),
            type_name: std::any::type_name::<E>(),
            payload: Box::new(event),
        });
    }

    /// Register a handler for every future event of type `E`.
    ///
    /// Handlers run in subscription order and live as long as the bus.
    pub fn subscribe<E, F>(&mut self, mut handler: F)
    where
        E: Event,
        F: FnMut(&mut World, &E) + 'static,
    {
        let erased: Handler = Box::new(move |world: &mut World, payload: &dyn Any| {
            if let Some(event) = payload.downcast_ref::<E>() {
                handler(world, event);
            }
        });
        self.handlers
            .entry(TypeId::of::<E>())
            .or_default()
            .push(erased);
    }

    /// Number of events waiting for the next drain.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Number of pending events of type `E`.
    pub fn pending_of<E: Event>(&self) -> usize {
        let id = TypeId::of::<E>();
        self.queue.iter().filter(|e| e.type_id == id).count()
    }

    /// Lifetime totals: `(published, dispatched)`.
    pub fn totals(&self) -> (u64, u64) {
        (self.published, self.dispatched)
    }

    /// Run every handler for every event currently queued, then return the
    /// number of events dispatched. The bus must already be detached from
    /// `world` (see `World::process_events`).
    pub(crate) fn dispatch_pending(&mut self, world: &mut World) -> usize {
        let batch = std::mem::take(&mut self.queue);
        let count = batch.len();
        for event in batch {
            tracing::trace!(event = event.type_name, "dispatching event");
            if let Some(handlers) = self.handlers.get_mut(&event.type_id) {
                for handler in handlers.iter_mut() {
                    (*handler)(world, &*event.payload);
                }
            }
        }
        self.dispatched += count as u64;
        count
    }

    /// Fold in whatever was published or subscribed on the stand-in bus while
    /// this one was detached for a drain.
    pub(crate) fn absorb(&mut self, other: EventBus) {
        self.published += other.published;
        self.queue.extend(other.queue);
        for (type_id, mut handlers) in other.handlers {
            self.handlers.entry(type_id).or_default().append(&mut handlers);
        }
    }
}
