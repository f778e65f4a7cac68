//! Engine environment.
//!
//! All external dependencies the lifecycle controller needs, injected as
//! provider implementations. Production wires the `PostgreSQL` store and
//! the real processor; tests wire the in-memory mocks and a fixed clock.

use crate::config::EngineConfig;
use crate::providers::{EventPublisher, MarketplaceStore, PaymentGateway};
use callboard_core::environment::Clock;
use std::sync::Arc;

/// Dependencies injected into the lifecycle controller.
///
/// # Type Parameters
///
/// - `S`: marketplace store
/// - `P`: payment gateway
/// - `E`: event publisher
pub struct EngineEnvironment<S, P, E>
where
    S: MarketplaceStore,
    P: PaymentGateway,
    E: EventPublisher,
{
    /// Document store.
    pub store: Arc<S>,

    /// Payment processor capability.
    pub payments: Arc<P>,

    /// Outbound event seam.
    pub publisher: Arc<E>,

    /// Time source.
    pub clock: Arc<dyn Clock>,

    /// Engine configuration.
    pub config: EngineConfig,
}

impl<S, P, E> Clone for EngineEnvironment<S, P, E>
where
    S: MarketplaceStore,
    P: PaymentGateway,
    E: EventPublisher,
{
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            payments: Arc::clone(&self.payments),
            publisher: Arc::clone(&self.publisher),
            clock: Arc::clone(&self.clock),
            config: self.config.clone(),
        }
    }
}

impl<S, P, E> EngineEnvironment<S, P, E>
where
    S: MarketplaceStore,
    P: PaymentGateway,
    E: EventPublisher,
{
    /// Create an environment.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        payments: Arc<P>,
        publisher: Arc<E>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            payments,
            publisher,
            clock,
            config,
        }
    }
}
