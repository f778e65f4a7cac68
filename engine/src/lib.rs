//! # Callboard Engine
//!
//! The gig scheduling and booking-settlement engine of a two-sided
//! performer/venue marketplace: venues post performance opportunities,
//! performers are booked, and fees are escrowed and released on a
//! time-gated window with a dispute check.
//!
//! ## Components
//!
//! - [`recurrence`] — pure expansion of a repeat rule into calendar dates
//! - [`factory`] — submit-or-update: one draft becomes N persisted gigs
//! - [`references`] — venue ↔ gig/template id-set consistency
//! - [`controller`] — the booking/fee lifecycle state machine
//! - [`Engine`] — the operation surface wiring it all together
//!
//! ## Architecture
//!
//! The lifecycle controller is a pure reducer run by the
//! `callboard-runtime` store; all I/O happens in effects against the
//! [`providers`] traits. Timers (the performed trigger, the 48-hour
//! clearing deadline) are delayed cancellable effects keyed by gig id,
//! and their durable counterparts live in storage so recovery can re-arm
//! them after a restart.

pub mod calendar;
pub mod config;
pub mod controller;
pub mod environment;
pub mod error;
pub mod events;
pub mod factory;
pub mod mocks;
pub mod providers;
pub mod recurrence;
pub mod references;
pub mod state;
pub mod types;

pub use config::EngineConfig;
pub use controller::{
    Booking, BookingReducer, BookingSeed, CancellationReason, LifecycleAction, SettlementState,
};
pub use environment::EngineEnvironment;
pub use error::{EngineError, ErrorKind, Result, UserOperation, user_message};
pub use events::DomainEvent;
pub use factory::{GigFactory, SubmitOutcome};
pub use references::CrossReferences;
pub use state::{
    FeeRecord, FeeStatus, Gig, GigDraft, GigStatus, PerformerProfile, Template, VenueProfile,
};

use crate::providers::{EventPublisher, MarketplaceStore, PaymentGateway};
use crate::types::{ChargeId, GigId, Money, PerformerId, VenueId};
use callboard_core::environment::Clock;
use callboard_runtime::{Store, StoreError};
use chrono::{DateTime, Utc};
use state::EscrowCharge;
use std::sync::Arc;

type LifecycleStore<S, P, E> = Store<
    SettlementState,
    LifecycleAction,
    EngineEnvironment<S, P, E>,
    BookingReducer<S, P, E>,
>;

/// The engine's inbound operation surface.
///
/// Owns the factory and the lifecycle store. Commands that need an
/// outcome (confirm, dispute, delete, …) wait for the controller's
/// acknowledgement or rejection over the action feedback loop; a
/// rejection surfaces as a conflict error, a persistence failure as a
/// transient one.
pub struct Engine<S, P, E>
where
    S: MarketplaceStore + 'static,
    P: PaymentGateway + 'static,
    E: EventPublisher + 'static,
{
    store: Arc<S>,
    factory: GigFactory<S, E>,
    lifecycle: LifecycleStore<S, P, E>,
    config: EngineConfig,
}

fn map_store_error(error: StoreError) -> EngineError {
    match error {
        StoreError::Timeout => EngineError::Timeout("lifecycle acknowledgement".to_string()),
        StoreError::ShutdownInProgress => EngineError::Storage("engine is shutting down".to_string()),
        StoreError::ShutdownTimeout(pending) => {
            EngineError::Storage(format!("shutdown timed out with {pending} effects running"))
        },
        StoreError::ChannelClosed => EngineError::Storage("engine stopped".to_string()),
    }
}

impl<S, P, E> Engine<S, P, E>
where
    S: MarketplaceStore + 'static,
    P: PaymentGateway + 'static,
    E: EventPublisher + 'static,
{
    /// Wire an engine from its providers.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        payments: Arc<P>,
        publisher: Arc<E>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        let factory = GigFactory::new(
            Arc::clone(&store),
            Arc::clone(&publisher),
            Arc::clone(&clock),
            config.retry.clone(),
        );

        let environment = EngineEnvironment::new(
            Arc::clone(&store),
            payments,
            publisher,
            clock,
            config.clone(),
        );

        let lifecycle = Store::new(
            SettlementState::new(),
            BookingReducer::new(),
            environment,
        );

        Self {
            store,
            factory,
            lifecycle,
            config,
        }
    }

    /// Read-only access to the lifecycle state, for assertions and
    /// observability.
    pub async fn settlement<T>(&self, f: impl FnOnce(&SettlementState) -> T) -> T {
        self.lifecycle.state(f).await
    }

    /// Submit a gig draft: update the gig it names, or create instances.
    ///
    /// Newly created instances (and re-submitted drafts) are registered
    /// with the lifecycle controller.
    ///
    /// # Errors
    ///
    /// Propagates factory validation, referential, and transient errors.
    pub async fn submit_draft(&self, draft: GigDraft) -> Result<SubmitOutcome> {
        let outcome = self.factory.create_or_update(draft).await?;

        match &outcome {
            SubmitOutcome::Created(gigs) => {
                for gig in gigs {
                    self.register(BookingSeed::from_gig(gig)).await?;
                }
            },
            SubmitOutcome::Updated(gig) => {
                self.register(BookingSeed::from_gig(gig)).await?;
            },
        }

        Ok(outcome)
    }

    /// Persist a reusable template for its venue.
    ///
    /// # Errors
    ///
    /// Propagates factory referential and transient errors.
    pub async fn save_template(&self, template: Template) -> Result<()> {
        self.factory.save_template(template).await
    }

    /// Accept an applicant: the gig moves to `confirmed` and the
    /// performed trigger is scheduled.
    ///
    /// # Errors
    ///
    /// Conflict if the gig is not open; transient if persistence fails.
    pub async fn confirm_booking(
        &self,
        gig_id: GigId,
        performer_id: PerformerId,
        charge: Option<(ChargeId, Money)>,
    ) -> Result<()> {
        let charge = charge.map(|(charge_id, amount)| EscrowCharge { charge_id, amount });
        let ack = self
            .command(
                LifecycleAction::ConfirmBooking {
                    gig_id,
                    performer_id,
                    charge,
                },
                move |action| {
                    matches!(
                        action,
                        LifecycleAction::BookingConfirmed { gig_id: id }
                        | LifecycleAction::TransitionRejected { gig_id: id, .. }
                        | LifecycleAction::TransitionFailed { gig_id: id, .. }
                        if *id == gig_id
                    )
                },
            )
            .await?;
        Self::expect_ack(ack)
    }

    /// Mark a gig performed (explicit trigger; the scheduled timer drives
    /// the same transition).
    ///
    /// # Errors
    ///
    /// Conflict if the gig is not confirmed or the window has not
    /// elapsed; transient if persistence fails.
    pub async fn mark_performed(&self, gig_id: GigId) -> Result<()> {
        let ack = self
            .command(LifecycleAction::MarkPerformed { gig_id }, move |action| {
                matches!(
                    action,
                    LifecycleAction::GigPerformed { gig_id: id, .. }
                    | LifecycleAction::TransitionRejected { gig_id: id, .. }
                    | LifecycleAction::TransitionFailed { gig_id: id, .. }
                    if *id == gig_id
                )
            })
            .await?;
        Self::expect_ack(ack)
    }

    /// Report a dispute, blocking automatic clearing.
    ///
    /// # Errors
    ///
    /// Conflict if the fee is not pending (or already mid-release);
    /// transient if persistence fails.
    pub async fn report_dispute(&self, gig_id: GigId) -> Result<()> {
        let ack = self
            .command(LifecycleAction::ReportDispute { gig_id }, move |action| {
                matches!(
                    action,
                    LifecycleAction::DisputeLogged { gig_id: id }
                    | LifecycleAction::TransitionRejected { gig_id: id, .. }
                    | LifecycleAction::TransitionFailed { gig_id: id, .. }
                    if *id == gig_id
                )
            })
            .await?;
        Self::expect_ack(ack)
    }

    /// Run the clearing check for one gig now (explicit trigger; the
    /// scheduled deadline timer drives the same check).
    ///
    /// # Errors
    ///
    /// Conflict if the fee cannot clear (disputed, deadline not reached);
    /// transient if the transfer or ledger move fails.
    pub async fn run_clearing(&self, gig_id: GigId) -> Result<()> {
        let ack = self
            .command(LifecycleAction::RunClearing { gig_id }, move |action| {
                matches!(
                    action,
                    LifecycleAction::FeeSettled { gig_id: id, .. }
                    | LifecycleAction::ClearingFailed { gig_id: id, .. }
                    | LifecycleAction::TransitionRejected { gig_id: id, .. }
                    if *id == gig_id
                )
            })
            .await?;
        Self::expect_ack(ack)
    }

    /// Cancel a booking; refunds the escrow charge when one exists,
    /// closes the gig otherwise.
    ///
    /// # Errors
    ///
    /// Conflict if the gig already settled; transient if the refund or
    /// persistence fails.
    pub async fn cancel_booking(&self, gig_id: GigId, reason: CancellationReason) -> Result<()> {
        let ack = self
            .command(
                LifecycleAction::RequestCancellation { gig_id, reason },
                move |action| {
                    matches!(
                        action,
                        LifecycleAction::CancellationCompleted { gig_id: id, .. }
                        | LifecycleAction::TransitionRejected { gig_id: id, .. }
                        | LifecycleAction::TransitionFailed { gig_id: id, .. }
                        if *id == gig_id
                    )
                },
            )
            .await?;
        Self::expect_ack(ack)
    }

    /// Delete a gig: pulls the venue reference and removes the document.
    ///
    /// # Errors
    ///
    /// Conflict while the gig's fee is held or contested; transient if
    /// persistence fails.
    pub async fn delete_gig(&self, gig_id: GigId) -> Result<()> {
        let ack = self
            .command(LifecycleAction::DeleteGig { gig_id }, move |action| {
                matches!(
                    action,
                    LifecycleAction::DeleteCompleted { gig_id: id }
                    | LifecycleAction::DeleteRejected { gig_id: id, .. }
                    | LifecycleAction::TransitionFailed { gig_id: id, .. }
                    if *id == gig_id
                )
            })
            .await?;
        Self::expect_ack(ack)
    }

    /// Cancel every active booking touched by a removed account — the
    /// venue's gigs, or the gigs a performer is booked on.
    ///
    /// Returns how many cancellations were dispatched; each proceeds
    /// independently.
    ///
    /// # Errors
    ///
    /// Transient if the gig scan fails.
    pub async fn handle_venue_removal(&self, venue_id: VenueId) -> Result<usize> {
        let gigs = self.store.gigs_for_venue(venue_id).await?;
        let mut dispatched = 0;
        for gig in gigs {
            if gig.status.is_terminal() {
                continue;
            }
            self.send(LifecycleAction::RequestCancellation {
                gig_id: gig.id,
                reason: CancellationReason::AccountRemoved,
            })
            .await?;
            dispatched += 1;
        }
        Ok(dispatched)
    }

    /// Cancel every active booking a removed performer is booked on.
    ///
    /// # Errors
    ///
    /// Transient if the gig scan fails.
    pub async fn handle_performer_removal(&self, performer_id: PerformerId) -> Result<usize> {
        let gigs = self.store.active_gigs().await?;
        let mut dispatched = 0;
        for gig in gigs {
            if gig.status.performer() != Some(performer_id) {
                continue;
            }
            self.send(LifecycleAction::RequestCancellation {
                gig_id: gig.id,
                reason: CancellationReason::AccountRemoved,
            })
            .await?;
            dispatched += 1;
        }
        Ok(dispatched)
    }

    /// Re-register every active gig from storage, re-arming performed and
    /// clearing timers from their durable records. Run once at startup.
    ///
    /// # Errors
    ///
    /// Transient if the storage scan fails.
    pub async fn recover(&self) -> Result<usize> {
        let gigs = self.store.active_gigs().await?;
        let mut registered = 0;

        for gig in &gigs {
            let mut seed = BookingSeed::from_gig(gig);
            if let Some(record) = self.store.fee_record(gig.id).await? {
                seed = seed.with_fee_record(&record);
            }
            self.register(seed).await?;
            registered += 1;
        }

        tracing::info!(registered, "recovered active gigs");
        Ok(registered)
    }

    /// Dispatch clearing checks for every pending fee whose deadline has
    /// passed at `now`. For an external poll trigger.
    ///
    /// # Errors
    ///
    /// Transient if the ledger scan fails.
    pub async fn run_pending_clearings(&self, now: DateTime<Utc>) -> Result<usize> {
        let due = self.store.pending_fees_due(now).await?;
        let count = due.len();
        for record in due {
            self.send(LifecycleAction::RunClearing {
                gig_id: record.gig_id,
            })
            .await?;
        }
        Ok(count)
    }

    /// Gracefully shut down the lifecycle store. Scheduled timers are
    /// preempted; their durable records re-arm them on the next
    /// [`Engine::recover`].
    ///
    /// # Errors
    ///
    /// Transient if in-flight effects do not drain within `timeout`.
    pub async fn shutdown(&self, timeout: std::time::Duration) -> Result<()> {
        self.lifecycle.shutdown(timeout).await.map_err(map_store_error)
    }

    async fn register(&self, seed: BookingSeed) -> Result<()> {
        self.send(LifecycleAction::Register { seed }).await
    }

    async fn send(&self, action: LifecycleAction) -> Result<()> {
        self.lifecycle
            .send(action)
            .await
            .map(|_| ())
            .map_err(map_store_error)
    }

    async fn command<F>(&self, action: LifecycleAction, predicate: F) -> Result<LifecycleAction>
    where
        F: Fn(&LifecycleAction) -> bool,
    {
        self.lifecycle
            .send_and_wait_for(action, predicate, self.config.ack_timeout)
            .await
            .map_err(map_store_error)
    }

    /// Collapse a terminal acknowledgement into the operation's result.
    fn expect_ack(ack: LifecycleAction) -> Result<()> {
        match ack {
            LifecycleAction::TransitionRejected { reason, .. }
            | LifecycleAction::DeleteRejected { reason, .. } => {
                Err(EngineError::Rejected { reason })
            },
            LifecycleAction::ClearingFailed {
                reason, conflict, ..
            } => {
                if conflict {
                    Err(EngineError::Rejected { reason })
                } else {
                    Err(EngineError::Storage(reason))
                }
            },
            LifecycleAction::TransitionFailed { stage, reason, .. } => {
                Err(EngineError::Storage(format!("{stage}: {reason}")))
            },
            _ => Ok(()),
        }
    }
}
