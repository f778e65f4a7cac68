//! Mock provider implementations for testing.
//!
//! Simple, deterministic in-memory implementations of the provider traits,
//! with scriptable failure injection for exercising retry and
//! partial-failure paths.

pub mod events;
pub mod payments;
pub mod store;

pub use events::RecordingPublisher;
pub use payments::MockPaymentGateway;
pub use store::InMemoryStore;
