//! Outbound event publishing.
//!
//! The engine announces gig and fee changes to the excluded
//! UI/notification layer through this seam. Publishing is fire-and-forget
//! from the engine's perspective; consumers must tolerate at-least-once
//! delivery and their own lag.

use crate::events::DomainEvent;
use tokio::sync::broadcast;

/// The outbound event seam.
pub trait EventPublisher: Send + Sync {
    /// Announce one domain event.
    fn publish(&self, event: DomainEvent);
}

/// Publisher backed by a tokio broadcast channel.
///
/// Slow or absent subscribers never block the engine; a lagging receiver
/// observes `RecvError::Lagged` and continues from the oldest retained
/// event.
#[derive(Debug, Clone)]
pub struct BroadcastPublisher {
    tx: broadcast::Sender<DomainEvent>,
}

impl BroadcastPublisher {
    /// Create a publisher retaining up to `capacity` undelivered events
    /// per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to future events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new(64)
    }
}

impl EventPublisher for BroadcastPublisher {
    fn publish(&self, event: DomainEvent) {
        tracing::debug!(event_type = event.event_type(), gig_id = %event.gig_id(), "publishing event");
        // Send only fails when nobody is subscribed, which is fine.
        let _ = self.tx.send(event);
    }
}
