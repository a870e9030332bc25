//! Model-level change events.

use tokio::sync::broadcast;
use tracing::trace;

use crate::instance::Instance;

/// Default capacity of the model event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Kind of change an event reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// The instance was created on the server.
    Created,
    /// The instance was updated on the server.
    Updated,
    /// The instance was destroyed on the server.
    Destroyed,
}

impl EventKind {
    /// Lower-case event name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Destroyed => "destroyed",
        }
    }
}

/// A change to one instance.
#[derive(Clone, Debug)]
pub struct ModelEvent {
    /// What happened.
    pub kind: EventKind,
    /// The instance it happened to.
    pub instance: Instance,
}

/// Broadcast channel for [`ModelEvent`]s.
///
/// Slow subscribers lag rather than block publishers.
#[derive(Debug)]
pub struct ModelEvents(broadcast::Sender<ModelEvent>);

impl ModelEvents {
    /// Create a channel holding up to `capacity` undelivered events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self(tx)
    }

    /// Receive every event published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ModelEvent> { self.0.subscribe() }

    /// Publish `kind` for `instance`. Events with no subscribers are dropped.
    pub fn publish(&self, kind: EventKind, instance: &Instance) {
        let delivered = self
            .0
            .send(ModelEvent {
                kind,
                instance: instance.clone(),
            })
            .unwrap_or(0);
        trace!(event = kind.as_str(), cid = %instance.cid(), delivered, "model event");
    }
}

impl Default for ModelEvents {
    fn default() -> Self { Self::new(DEFAULT_EVENT_CAPACITY) }
}
