//! Booking and fee lifecycle controller.
//!
//! One reducer drives every gig instance from posting through performance
//! to fee clearance, dispute, refund, or deletion. The reducer is pure:
//! transitions and their at-most-once guards run synchronously under the
//! store runtime's write lock, and all I/O — persistence, payouts,
//! refunds, event publishing — happens in effects that feed confirmation
//! or failure actions back in.
//!
//! The 48-hour escrow release is a delayed, cancellable effect keyed by
//! the gig id. A dispute report, a refund, or a deletion preempts it with
//! a cancel under the same key, and the clearing check re-verifies the
//! booking's current status when it fires, closing the race between "the
//! deadline fires" and "a dispute arrived a moment earlier".

use crate::calendar;
use crate::environment::EngineEnvironment;
use crate::error::{EngineError, Result};
use crate::events::DomainEvent;
use crate::providers::{EventPublisher, MarketplaceStore, PaymentGateway};
use crate::state::{EscrowCharge, FeeRecord, FeeStatus, Gig, GigStatus};
use crate::types::{
    Currency, GigId, GigSchedule, IdempotencyKey, Money, PerformerId, RefundId, TransferId, VenueId,
};
use callboard_core::effect::{Effect, EffectId, Effects};
use callboard_core::reducer::Reducer;
use callboard_core::smallvec;
use callboard_runtime::RetryPolicy;
use callboard_runtime::retry::retry_with_predicate;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;

// ============================================================================
// Settlement State
// ============================================================================

/// The controller's view of one gig instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    /// The gig.
    pub gig_id: GigId,

    /// Owning venue.
    pub venue_id: VenueId,

    /// When the performance takes place.
    pub schedule: GigSchedule,

    /// Performance fee.
    pub fee: Money,

    /// Settlement currency.
    pub currency: Currency,

    /// Lifecycle state.
    pub status: GigStatus,

    /// The venue's escrow charge, once one exists.
    pub charge: Option<EscrowCharge>,

    /// Scheduled automatic clearing instant.
    pub clears_at: Option<DateTime<Utc>>,

    /// Issued payout transfer, once one exists. Recorded even when the
    /// surrounding clearing attempt failed, so a retry never transfers
    /// twice.
    pub transfer_id: Option<TransferId>,

    /// A clearing attempt is mid-flight; makes release at-most-once under
    /// concurrent deadline checks.
    pub clearing_in_flight: bool,

    /// Failed clearing attempts so far.
    pub clearing_attempts: u32,
}

/// Snapshot used to (re-)register a gig with the controller — from the
/// factory on creation, or from recovery re-reading storage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BookingSeed {
    /// The gig.
    pub gig_id: GigId,
    /// Owning venue.
    pub venue_id: VenueId,
    /// When the performance takes place.
    pub schedule: GigSchedule,
    /// Performance fee.
    pub fee: Money,
    /// Settlement currency.
    pub currency: Currency,
    /// Lifecycle state at registration.
    pub status: GigStatus,
    /// Escrow charge, if one exists.
    pub charge: Option<EscrowCharge>,
    /// Scheduled clearing instant, if a fee is pending.
    pub clears_at: Option<DateTime<Utc>>,
    /// Issued transfer, if one was recorded.
    pub transfer_id: Option<TransferId>,
}

impl BookingSeed {
    /// Seed from a stored gig document.
    #[must_use]
    pub fn from_gig(gig: &Gig) -> Self {
        Self {
            gig_id: gig.id,
            venue_id: gig.venue_id,
            schedule: gig.schedule,
            fee: gig.fee,
            currency: gig.currency,
            status: gig.status,
            charge: None,
            clears_at: None,
            transfer_id: None,
        }
    }

    /// Merge in the gig's fee record, when one exists.
    #[must_use]
    pub fn with_fee_record(mut self, record: &FeeRecord) -> Self {
        if record.status == FeeStatus::Pending {
            self.clears_at = record.clears_at;
        }
        self.transfer_id = record.transfer_id.clone();
        self
    }
}

/// Root settlement state: every tracked booking, keyed by gig id.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SettlementState {
    /// Tracked bookings.
    pub bookings: HashMap<GigId, Booking>,

    /// Most recent rejection or failure reason, for observability.
    pub last_error: Option<String>,
}

impl SettlementState {
    /// Empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up one booking.
    #[must_use]
    pub fn booking(&self, gig_id: &GigId) -> Option<&Booking> {
        self.bookings.get(gig_id)
    }

    /// Number of tracked bookings.
    #[must_use]
    pub fn count(&self) -> usize {
        self.bookings.len()
    }
}

// ============================================================================
// Actions (Commands + Events)
// ============================================================================

/// Why a booking is being cancelled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancellationReason {
    /// The venue withdrew the gig.
    VenueCancelled,
    /// A party's account or profile was removed.
    AccountRemoved,
}

/// Actions for the lifecycle controller.
///
/// Commands arrive from the operation surface and from timers; events are
/// fed back by effects once their I/O is confirmed. A transition is never
/// considered applied until its confirming event arrives.
#[derive(Clone, Debug, PartialEq)]
pub enum LifecycleAction {
    // Commands
    /// Track a gig (from the factory, or from recovery).
    Register {
        /// Snapshot to register.
        seed: BookingSeed,
    },

    /// The venue accepted an applicant.
    ConfirmBooking {
        /// The gig.
        gig_id: GigId,
        /// The accepted performer.
        performer_id: PerformerId,
        /// Escrow charge backing the booking, if the fee is non-zero.
        charge: Option<EscrowCharge>,
    },

    /// The performance window has elapsed (timer-driven or explicit).
    MarkPerformed {
        /// The gig.
        gig_id: GigId,
    },

    /// A party blocked automatic clearing.
    ReportDispute {
        /// The gig.
        gig_id: GigId,
    },

    /// The clearing deadline check (timer-driven or explicit).
    RunClearing {
        /// The gig.
        gig_id: GigId,
    },

    /// Cancel the booking and refund the charge if one exists.
    RequestCancellation {
        /// The gig.
        gig_id: GigId,
        /// Why.
        reason: CancellationReason,
    },

    /// Delete the gig entirely.
    DeleteGig {
        /// The gig.
        gig_id: GigId,
    },

    // Events
    /// Confirmation was persisted.
    BookingConfirmed {
        /// The gig.
        gig_id: GigId,
    },

    /// The performed transition was persisted (and the fee record created,
    /// when the fee is non-zero).
    GigPerformed {
        /// The gig.
        gig_id: GigId,
        /// Whether a pending fee record now exists.
        fee_recorded: bool,
    },

    /// The fee cleared and the ledger move was persisted.
    FeeSettled {
        /// The gig.
        gig_id: GigId,
        /// The payout transfer, when a destination was connected.
        transfer_id: Option<TransferId>,
    },

    /// A clearing attempt failed.
    ClearingFailed {
        /// The gig.
        gig_id: GigId,
        /// Transfer issued before the failure, if any; recorded so the
        /// retry skips the transfer step.
        transfer_id: Option<TransferId>,
        /// What went wrong.
        reason: String,
        /// Conflict (do not retry) vs. transient (retry with backoff).
        conflict: bool,
    },

    /// The dispute was persisted.
    DisputeLogged {
        /// The gig.
        gig_id: GigId,
    },

    /// Cancellation finished, including any refund.
    CancellationCompleted {
        /// The gig.
        gig_id: GigId,
        /// Issued refund, when a charge existed.
        refund_id: Option<RefundId>,
    },

    /// Deletion finished: document gone, venue reference pulled.
    DeleteCompleted {
        /// The gig.
        gig_id: GigId,
    },

    /// Deletion refused.
    DeleteRejected {
        /// The gig.
        gig_id: GigId,
        /// Why.
        reason: String,
    },

    /// A command was refused for lifecycle reasons.
    TransitionRejected {
        /// The gig.
        gig_id: GigId,
        /// Why.
        reason: String,
    },

    /// A persistence step failed after retries; the transition is not
    /// considered applied.
    TransitionFailed {
        /// The gig.
        gig_id: GigId,
        /// Which step.
        stage: &'static str,
        /// What went wrong.
        reason: String,
    },
}

/// Registration key for a gig's performed-trigger timer.
#[must_use]
pub fn perform_timer_id(gig_id: GigId) -> EffectId {
    EffectId::new(format!("perform:{gig_id}"))
}

/// Registration key for a gig's clearing timer.
#[must_use]
pub fn clearing_timer_id(gig_id: GigId) -> EffectId {
    EffectId::new(format!("clearing:{gig_id}"))
}

fn until(now: DateTime<Utc>, target: DateTime<Utc>) -> std::time::Duration {
    (target - now).to_std().unwrap_or_default()
}

async fn retry_io<T, F, Fut>(policy: RetryPolicy, operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_with_predicate(policy, operation, EngineError::is_transient).await
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer for the booking and fee lifecycle.
pub struct BookingReducer<S, P, E> {
    _providers: PhantomData<fn() -> (S, P, E)>,
}

impl<S, P, E> BookingReducer<S, P, E> {
    /// Creates a new `BookingReducer`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _providers: PhantomData,
        }
    }
}

impl<S, P, E> Default for BookingReducer<S, P, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, P, E> Clone for BookingReducer<S, P, E> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<S, P, E> std::fmt::Debug for BookingReducer<S, P, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BookingReducer")
    }
}

fn reject(gig_id: GigId, reason: String) -> Effect<LifecycleAction> {
    Effect::Future(Box::pin(async move {
        Some(LifecycleAction::TransitionRejected { gig_id, reason })
    }))
}

impl<S, P, E> BookingReducer<S, P, E>
where
    S: MarketplaceStore + 'static,
    P: PaymentGateway + 'static,
    E: EventPublisher + 'static,
{
    /// Timer re-arm effects for a freshly registered booking.
    fn rearm_effects(
        booking: &Booking,
        env: &EngineEnvironment<S, P, E>,
    ) -> Effects<LifecycleAction> {
        let now = env.clock.now();
        let gig_id = booking.gig_id;

        match booking.status {
            GigStatus::Confirmed { .. } => {
                let fires_at = calendar::performance_end(&booking.schedule, env.config.timezone);
                smallvec![
                    Effect::Delay {
                        duration: until(now, fires_at),
                        action: Box::new(LifecycleAction::MarkPerformed { gig_id }),
                    }
                    .cancellable(perform_timer_id(gig_id))
                ]
            },
            GigStatus::FeePending { .. } => match booking.clears_at {
                Some(clears_at) => smallvec![
                    Effect::Delay {
                        duration: until(now, clears_at),
                        action: Box::new(LifecycleAction::RunClearing { gig_id }),
                    }
                    .cancellable(clearing_timer_id(gig_id))
                ],
                None => Effects::new(),
            },
            _ => Effects::new(),
        }
    }

    /// The clearing effect: transfer (skippable once an id is recorded),
    /// then the atomic ledger move, then the outbound event.
    fn clearing_effect(
        booking: &Booking,
        performer: PerformerId,
        env: &EngineEnvironment<S, P, E>,
    ) -> Effect<LifecycleAction> {
        let gig_id = booking.gig_id;
        let venue_id = booking.venue_id;
        let fee = booking.fee;
        let currency = booking.currency;
        let already_issued = booking.transfer_id.clone();
        let key = IdempotencyKey::for_transition(gig_id, "clearing");

        let store = std::sync::Arc::clone(&env.store);
        let payments = std::sync::Arc::clone(&env.payments);
        let publisher = std::sync::Arc::clone(&env.publisher);
        let retry = env.config.retry.clone();

        Effect::Future(Box::pin(async move {
            let failed = |transfer_id: Option<TransferId>, error: &EngineError| {
                Some(LifecycleAction::ClearingFailed {
                    gig_id,
                    transfer_id,
                    reason: error.to_string(),
                    conflict: error.is_conflict(),
                })
            };

            // Step 1: issue the payout, unless one is already recorded or
            // no destination is connected. The idempotency key makes a
            // lost-acknowledgement retry safe on the processor side too.
            let mut issued = already_issued;
            if issued.is_none() {
                let profile = match retry_io(retry.clone(), || store.performer(performer)).await {
                    Ok(Some(profile)) => profile,
                    Ok(None) => {
                        let error = EngineError::PerformerNotFound(performer);
                        return failed(None, &error);
                    },
                    Err(error) => return failed(None, &error),
                };

                if let Some(destination) = profile.payout_destination {
                    match retry_io(retry.clone(), || {
                        payments.transfer(&destination, fee, currency, &key)
                    })
                    .await
                    {
                        Ok(transfer) => issued = Some(transfer),
                        Err(error) => return failed(None, &error),
                    }
                }
            }

            // Steps 2-4: one atomic ledger move — record to cleared,
            // balances credited, gig status stamped.
            if let Err(error) = retry_io(retry, || store.settle_fee(gig_id, issued.clone())).await {
                return failed(issued.clone(), &error);
            }

            publisher.publish(DomainEvent::FeeCleared {
                gig_id,
                venue_id,
                performer_id: performer,
                amount: fee,
                status: GigStatus::Cleared { performer }.label().to_string(),
            });

            Some(LifecycleAction::FeeSettled {
                gig_id,
                transfer_id: issued,
            })
        }))
    }
}

impl<S, P, E> Reducer for BookingReducer<S, P, E>
where
    S: MarketplaceStore + 'static,
    P: PaymentGateway + 'static,
    E: EventPublisher + 'static,
{
    type State = SettlementState;
    type Action = LifecycleAction;
    type Environment = EngineEnvironment<S, P, E>;

    #[allow(clippy::too_many_lines)] // One arm per lifecycle transition
    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Effects<Self::Action> {
        match action {
            // ========== Registration / recovery ==========
            LifecycleAction::Register { seed } => {
                if let Some(existing) = state.bookings.get(&seed.gig_id) {
                    // A draft updated through the factory re-registers with
                    // its new fields; once a booking is confirmed, the
                    // controller's view is authoritative and re-registration
                    // is a no-op.
                    if !matches!(existing.status, GigStatus::Draft | GigStatus::Open) {
                        return Effects::new();
                    }
                }

                let booking = Booking {
                    gig_id: seed.gig_id,
                    venue_id: seed.venue_id,
                    schedule: seed.schedule,
                    fee: seed.fee,
                    currency: seed.currency,
                    status: seed.status,
                    charge: seed.charge,
                    clears_at: seed.clears_at,
                    transfer_id: seed.transfer_id,
                    clearing_in_flight: false,
                    clearing_attempts: 0,
                };

                let effects = Self::rearm_effects(&booking, env);
                state.bookings.insert(booking.gig_id, booking);
                effects
            },

            // ========== Open → Confirmed ==========
            LifecycleAction::ConfirmBooking {
                gig_id,
                performer_id,
                charge,
            } => {
                let Some(booking) = state.bookings.get_mut(&gig_id) else {
                    return smallvec![reject(gig_id, format!("unknown gig {gig_id}"))];
                };

                let next = match booking.status.transition(GigStatus::Confirmed {
                    performer: performer_id,
                }) {
                    Ok(next) => next,
                    Err(error) => return smallvec![reject(gig_id, error.to_string())],
                };

                booking.status = next;
                booking.charge = charge;

                let fires_at = calendar::performance_end(&booking.schedule, env.config.timezone);
                let now = env.clock.now();
                let store = std::sync::Arc::clone(&env.store);
                let retry = env.config.retry.clone();

                smallvec![
                    Effect::Future(Box::pin(async move {
                        match retry_io(retry, || store.set_gig_status(gig_id, next)).await {
                            Ok(()) => Some(LifecycleAction::BookingConfirmed { gig_id }),
                            Err(error) => Some(LifecycleAction::TransitionFailed {
                                gig_id,
                                stage: "confirm",
                                reason: error.to_string(),
                            }),
                        }
                    })),
                    Effect::Delay {
                        duration: until(now, fires_at),
                        action: Box::new(LifecycleAction::MarkPerformed { gig_id }),
                    }
                    .cancellable(perform_timer_id(gig_id)),
                ]
            },

            // ========== Confirmed → Performed (time-triggered) ==========
            LifecycleAction::MarkPerformed { gig_id } => {
                let Some(booking) = state.bookings.get_mut(&gig_id) else {
                    return smallvec![reject(gig_id, format!("unknown gig {gig_id}"))];
                };

                let GigStatus::Confirmed { performer } = booking.status else {
                    return smallvec![reject(
                        gig_id,
                        format!("cannot mark a {} gig performed", booking.status.label()),
                    )];
                };

                let now = env.clock.now();
                let performance_end =
                    calendar::performance_end(&booking.schedule, env.config.timezone);
                if now < performance_end {
                    return smallvec![reject(
                        gig_id,
                        "performance window has not elapsed".to_string(),
                    )];
                }

                let store = std::sync::Arc::clone(&env.store);
                let retry = env.config.retry.clone();

                if booking.fee.is_zero() {
                    // Nothing to escrow: performed and cleared in one step,
                    // no ledger entry, no transfer.
                    let next = match booking
                        .status
                        .transition(GigStatus::Performed { performer })
                        .and_then(|s| s.transition(GigStatus::Cleared { performer }))
                    {
                        Ok(next) => next,
                        Err(error) => return smallvec![reject(gig_id, error.to_string())],
                    };
                    booking.status = next;

                    return smallvec![
                        Effect::Cancel {
                            id: perform_timer_id(gig_id),
                        },
                        Effect::Future(Box::pin(async move {
                            match retry_io(retry, || store.set_gig_status(gig_id, next)).await {
                                Ok(()) => Some(LifecycleAction::GigPerformed {
                                    gig_id,
                                    fee_recorded: false,
                                }),
                                Err(error) => Some(LifecycleAction::TransitionFailed {
                                    gig_id,
                                    stage: "performed",
                                    reason: error.to_string(),
                                }),
                            }
                        })),
                    ];
                }

                let clears_at = performance_end + env.config.clearing_window;
                let next = match booking
                    .status
                    .transition(GigStatus::Performed { performer })
                    .and_then(|s| s.transition(GigStatus::FeePending { performer }))
                {
                    Ok(next) => next,
                    Err(error) => return smallvec![reject(gig_id, error.to_string())],
                };
                booking.status = next;
                booking.clears_at = Some(clears_at);

                let record = FeeRecord {
                    gig_id,
                    performer_id: performer,
                    amount: booking.fee,
                    currency: booking.currency,
                    gig_date: booking.schedule.date,
                    status: FeeStatus::Pending,
                    clears_at: Some(clears_at),
                    transfer_id: None,
                };

                smallvec![
                    Effect::Cancel {
                        id: perform_timer_id(gig_id),
                    },
                    Effect::Future(Box::pin(async move {
                        let persisted = async {
                            retry_io(retry.clone(), || store.insert_fee_record(&record)).await?;
                            retry_io(retry.clone(), || store.set_gig_status(gig_id, next)).await
                        }
                        .await;

                        match persisted {
                            Ok(()) => Some(LifecycleAction::GigPerformed {
                                gig_id,
                                fee_recorded: true,
                            }),
                            Err(error) => Some(LifecycleAction::TransitionFailed {
                                gig_id,
                                stage: "performed",
                                reason: error.to_string(),
                            }),
                        }
                    })),
                ]
            },

            // ========== Fee record persisted: arm the clearing timer ==========
            LifecycleAction::GigPerformed {
                gig_id,
                fee_recorded,
            } => {
                state.last_error = None;
                if !fee_recorded {
                    return Effects::new();
                }

                let Some(booking) = state.bookings.get(&gig_id) else {
                    return Effects::new();
                };
                let Some(clears_at) = booking.clears_at else {
                    return Effects::new();
                };

                let now = env.clock.now();
                smallvec![
                    Effect::Delay {
                        duration: until(now, clears_at),
                        action: Box::new(LifecycleAction::RunClearing { gig_id }),
                    }
                    .cancellable(clearing_timer_id(gig_id))
                ]
            },

            // ========== FeePending → Cleared (deadline check) ==========
            LifecycleAction::RunClearing { gig_id } => {
                let Some(booking) = state.bookings.get_mut(&gig_id) else {
                    return smallvec![reject(gig_id, format!("unknown gig {gig_id}"))];
                };

                // Re-verify under the write lock, not just at scheduling
                // time: the dispute may have landed a moment before the
                // deadline fired.
                let GigStatus::FeePending { performer } = booking.status else {
                    return smallvec![reject(
                        gig_id,
                        format!("cannot clear a {} gig", booking.status.label()),
                    )];
                };

                if booking.clearing_in_flight {
                    // A concurrent check already owns this release.
                    return Effects::new();
                }

                let now = env.clock.now();
                match booking.clears_at {
                    Some(clears_at) if now >= clears_at => {},
                    Some(_) => {
                        return smallvec![reject(
                            gig_id,
                            "clearing deadline has not passed".to_string(),
                        )];
                    },
                    None => {
                        return smallvec![reject(gig_id, "no clearing deadline".to_string())];
                    },
                }

                booking.clearing_in_flight = true;
                smallvec![Self::clearing_effect(booking, performer, env)]
            },

            // ========== Clearing confirmed ==========
            LifecycleAction::FeeSettled {
                gig_id,
                transfer_id,
            } => {
                state.last_error = None;
                if let Some(booking) = state.bookings.get_mut(&gig_id) {
                    if let Some(performer) = booking.status.performer() {
                        booking.status = GigStatus::Cleared { performer };
                    }
                    booking.clearing_in_flight = false;
                    booking.clears_at = None;
                    booking.transfer_id = transfer_id;
                }
                // The release happened; a still-scheduled deadline check
                // would only fire to be refused.
                smallvec![Effect::Cancel {
                    id: clearing_timer_id(gig_id),
                }]
            },

            // ========== Clearing failed: retry or park ==========
            LifecycleAction::ClearingFailed {
                gig_id,
                transfer_id,
                reason,
                conflict,
            } => {
                state.last_error = Some(reason.clone());
                let max_retries = env.config.max_clearing_retries;
                let backoff = env.config.retry.clone();

                let Some(booking) = state.bookings.get_mut(&gig_id) else {
                    return Effects::new();
                };

                booking.clearing_in_flight = false;
                if let Some(transfer_id) = transfer_id {
                    // The payout went through even though the ledger move
                    // did not; remember it so the retry skips the transfer.
                    booking.transfer_id = Some(transfer_id);
                }

                if conflict {
                    tracing::warn!(%gig_id, %reason, "clearing refused");
                    return Effects::new();
                }

                booking.clearing_attempts += 1;
                if booking.clearing_attempts > max_retries {
                    tracing::error!(
                        %gig_id,
                        attempts = booking.clearing_attempts,
                        %reason,
                        "clearing parked until recovery after repeated failures"
                    );
                    return Effects::new();
                }

                tracing::warn!(
                    %gig_id,
                    attempt = booking.clearing_attempts,
                    %reason,
                    "rescheduling clearing after transient failure"
                );

                smallvec![
                    Effect::Delay {
                        duration: backoff.delay_for_attempt(booking.clearing_attempts as usize),
                        action: Box::new(LifecycleAction::RunClearing { gig_id }),
                    }
                    .cancellable(clearing_timer_id(gig_id))
                ]
            },

            // ========== FeePending → InDispute ==========
            LifecycleAction::ReportDispute { gig_id } => {
                let Some(booking) = state.bookings.get_mut(&gig_id) else {
                    return smallvec![reject(gig_id, format!("unknown gig {gig_id}"))];
                };

                if booking.clearing_in_flight {
                    return smallvec![reject(
                        gig_id,
                        "clearing is already in progress".to_string(),
                    )];
                }

                let Some(performer_id) = booking.status.performer() else {
                    return smallvec![reject(
                        gig_id,
                        EngineError::IllegalTransition {
                            from: booking.status.label(),
                            to: "in_dispute",
                        }
                        .to_string(),
                    )];
                };
                let next = match booking.status.transition(GigStatus::InDispute {
                    performer: performer_id,
                }) {
                    Ok(next) => next,
                    Err(error) => return smallvec![reject(gig_id, error.to_string())],
                };

                booking.status = next;
                booking.clears_at = None;

                let venue_id = booking.venue_id;
                let store = std::sync::Arc::clone(&env.store);
                let publisher = std::sync::Arc::clone(&env.publisher);
                let retry = env.config.retry.clone();
                let status_label = next.label().to_string();

                smallvec![
                    // Preempt the scheduled release before anything else.
                    Effect::Cancel {
                        id: clearing_timer_id(gig_id),
                    },
                    Effect::Future(Box::pin(async move {
                        match retry_io(retry, || store.mark_fee_disputed(gig_id)).await {
                            Ok(()) => {
                                publisher.publish(DomainEvent::FeeDisputed {
                                    gig_id,
                                    venue_id,
                                    performer_id,
                                    status: status_label,
                                });
                                Some(LifecycleAction::DisputeLogged { gig_id })
                            },
                            Err(error) => Some(LifecycleAction::TransitionFailed {
                                gig_id,
                                stage: "dispute",
                                reason: error.to_string(),
                            }),
                        }
                    })),
                ]
            },

            // ========== * → Refunded | Closed ==========
            LifecycleAction::RequestCancellation { gig_id, reason } => {
                let Some(booking) = state.bookings.get_mut(&gig_id) else {
                    return smallvec![reject(gig_id, format!("unknown gig {gig_id}"))];
                };

                let had_fee_record = matches!(
                    booking.status,
                    GigStatus::FeePending { .. } | GigStatus::InDispute { .. }
                );
                let charge = booking.charge.clone();

                // A charge means money moved: the processor must give it
                // back. Without one there is nothing to refund.
                let target = if charge.is_some() {
                    GigStatus::Refunded
                } else {
                    GigStatus::Closed
                };

                let next = match booking.status.transition(target) {
                    Ok(next) => next,
                    Err(error) => return smallvec![reject(gig_id, error.to_string())],
                };

                let performer_id = booking.status.performer();
                booking.status = next;
                booking.clears_at = None;
                booking.clearing_in_flight = false;

                let venue_id = booking.venue_id;
                let store = std::sync::Arc::clone(&env.store);
                let payments = std::sync::Arc::clone(&env.payments);
                let publisher = std::sync::Arc::clone(&env.publisher);
                let retry = env.config.retry.clone();
                let refund_key = IdempotencyKey::for_transition(gig_id, "refund");

                tracing::info!(%gig_id, ?reason, outcome = next.label(), "cancelling booking");

                smallvec![
                    Effect::Cancel {
                        id: perform_timer_id(gig_id),
                    },
                    Effect::Cancel {
                        id: clearing_timer_id(gig_id),
                    },
                    Effect::Future(Box::pin(async move {
                        let mut refund_id = None;
                        if let Some(charge) = charge {
                            match retry_io(retry.clone(), || {
                                payments.refund(&charge.charge_id, &refund_key)
                            })
                            .await
                            {
                                Ok(id) => refund_id = Some(id),
                                Err(error) => {
                                    return Some(LifecycleAction::TransitionFailed {
                                        gig_id,
                                        stage: "refund",
                                        reason: error.to_string(),
                                    });
                                },
                            }
                        }

                        let persisted = async {
                            if had_fee_record {
                                retry_io(retry.clone(), || store.mark_fee_refunded(gig_id)).await?;
                            }
                            retry_io(retry.clone(), || store.set_gig_status(gig_id, next)).await
                        }
                        .await;

                        if let Err(error) = persisted {
                            return Some(LifecycleAction::TransitionFailed {
                                gig_id,
                                stage: "cancel",
                                reason: error.to_string(),
                            });
                        }

                        if matches!(next, GigStatus::Refunded) {
                            publisher.publish(DomainEvent::GigRefunded {
                                gig_id,
                                venue_id,
                                performer_id,
                                status: next.label().to_string(),
                            });
                        }

                        Some(LifecycleAction::CancellationCompleted { gig_id, refund_id })
                    })),
                ]
            },

            // ========== Deletion ==========
            LifecycleAction::DeleteGig { gig_id } => {
                let Some(booking) = state.bookings.get(&gig_id) else {
                    return smallvec![Effect::Future(Box::pin(async move {
                        Some(LifecycleAction::DeleteRejected {
                            gig_id,
                            reason: format!("unknown gig {gig_id}"),
                        })
                    }))];
                };

                // A held or contested fee pins the gig: refuse and require
                // a refund/clear transition first.
                if let GigStatus::FeePending { .. } | GigStatus::InDispute { .. } = booking.status {
                    let error = EngineError::DeletionBlocked {
                        gig_id,
                        fee_state: booking.status.label(),
                    };
                    return smallvec![Effect::Future(Box::pin(async move {
                        Some(LifecycleAction::DeleteRejected {
                            gig_id,
                            reason: error.to_string(),
                        })
                    }))];
                }

                let venue_id = booking.venue_id;
                state.bookings.remove(&gig_id);

                let store = std::sync::Arc::clone(&env.store);
                let retry = env.config.retry.clone();

                smallvec![
                    Effect::Cancel {
                        id: perform_timer_id(gig_id),
                    },
                    Effect::Cancel {
                        id: clearing_timer_id(gig_id),
                    },
                    Effect::Future(Box::pin(async move {
                        // Pull the venue reference first; a gig document
                        // without a reference is the established safe
                        // intermediate state, the reverse is not.
                        let result = async {
                            retry_io(retry.clone(), || store.remove_gig_ref(venue_id, gig_id))
                                .await?;
                            retry_io(retry.clone(), || store.delete_gig(gig_id)).await
                        }
                        .await;

                        match result {
                            Ok(()) => Some(LifecycleAction::DeleteCompleted { gig_id }),
                            Err(error) if error.is_conflict() => {
                                Some(LifecycleAction::DeleteRejected {
                                    gig_id,
                                    reason: error.to_string(),
                                })
                            },
                            Err(error) => Some(LifecycleAction::TransitionFailed {
                                gig_id,
                                stage: "delete",
                                reason: error.to_string(),
                            }),
                        }
                    })),
                ]
            },

            // ========== Feedback bookkeeping ==========
            LifecycleAction::BookingConfirmed { .. }
            | LifecycleAction::DisputeLogged { .. }
            | LifecycleAction::CancellationCompleted { .. }
            | LifecycleAction::DeleteCompleted { .. } => {
                state.last_error = None;
                Effects::new()
            },

            LifecycleAction::DeleteRejected { gig_id, reason }
            | LifecycleAction::TransitionRejected { gig_id, reason } => {
                tracing::warn!(%gig_id, %reason, "lifecycle command rejected");
                state.last_error = Some(reason);
                Effects::new()
            },

            LifecycleAction::TransitionFailed {
                gig_id,
                stage,
                reason,
            } => {
                tracing::error!(%gig_id, stage, %reason, "lifecycle persistence failed");
                state.last_error = Some(format!("{stage}: {reason}"));
                Effects::new()
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::mocks::{InMemoryStore, MockPaymentGateway, RecordingPublisher};
    use callboard_core::environment::FixedClock;
    use callboard_testing::{ReducerTest, assertions};
    use chrono::{NaiveDate, NaiveTime, TimeZone};
    use std::sync::Arc;

    type TestEnv = EngineEnvironment<InMemoryStore, MockPaymentGateway, RecordingPublisher>;
    type TestReducer = BookingReducer<InMemoryStore, MockPaymentGateway, RecordingPublisher>;

    // 21 June 2025, 19:00–20:30 London (BST) = ends 18:30 UTC.
    fn schedule() -> GigSchedule {
        GigSchedule::new(
            NaiveDate::from_ymd_opt(2025, 6, 21).unwrap(),
            NaiveTime::from_hms_opt(19, 0, 0).unwrap(),
            90,
        )
    }

    fn performance_end_utc() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 21, 18, 30, 0).single().unwrap()
    }

    fn env_at(now: DateTime<Utc>) -> TestEnv {
        EngineEnvironment::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(MockPaymentGateway::new()),
            Arc::new(RecordingPublisher::new()),
            Arc::new(FixedClock::new(now)),
            EngineConfig::default(),
        )
    }

    fn booking(gig_id: GigId, status: GigStatus) -> Booking {
        Booking {
            gig_id,
            venue_id: VenueId::new(),
            schedule: schedule(),
            fee: Money::from_pounds(50),
            currency: Currency::Gbp,
            status,
            charge: None,
            clears_at: None,
            transfer_id: None,
            clearing_in_flight: false,
            clearing_attempts: 0,
        }
    }

    fn state_with(booking: Booking) -> SettlementState {
        let mut state = SettlementState::new();
        state.bookings.insert(booking.gig_id, booking);
        state
    }

    #[test]
    fn register_tracks_open_gig_without_timers() {
        let gig_id = GigId::new();
        let seed = BookingSeed {
            gig_id,
            venue_id: VenueId::new(),
            schedule: schedule(),
            fee: Money::from_pounds(50),
            currency: Currency::Gbp,
            status: GigStatus::Open,
            charge: None,
            clears_at: None,
            transfer_id: None,
        };

        ReducerTest::new(TestReducer::new())
            .with_env(env_at(Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).single().unwrap()))
            .given_state(SettlementState::new())
            .when_action(LifecycleAction::Register { seed })
            .then_state(move |state| {
                assert_eq!(state.count(), 1);
                assert_eq!(state.booking(&gig_id).unwrap().status, GigStatus::Open);
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn register_rearms_clearing_timer_for_pending_fee() {
        let gig_id = GigId::new();
        let performer = PerformerId::new();
        let clears_at = performance_end_utc() + chrono::Duration::hours(48);
        let seed = BookingSeed {
            gig_id,
            venue_id: VenueId::new(),
            schedule: schedule(),
            fee: Money::from_pounds(50),
            currency: Currency::Gbp,
            status: GigStatus::FeePending { performer },
            charge: None,
            clears_at: Some(clears_at),
            transfer_id: None,
        };

        ReducerTest::new(TestReducer::new())
            .with_env(env_at(performance_end_utc() + chrono::Duration::hours(1)))
            .given_state(SettlementState::new())
            .when_action(LifecycleAction::Register { seed })
            .then_effects(move |effects| {
                assertions::assert_schedules(effects, &clearing_timer_id(gig_id));
            })
            .run();
    }

    #[test]
    fn confirm_schedules_perform_timer() {
        let gig_id = GigId::new();
        let performer = PerformerId::new();

        ReducerTest::new(TestReducer::new())
            .with_env(env_at(Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).single().unwrap()))
            .given_state(state_with(booking(gig_id, GigStatus::Open)))
            .when_action(LifecycleAction::ConfirmBooking {
                gig_id,
                performer_id: performer,
                charge: Some(EscrowCharge {
                    charge_id: crate::types::ChargeId::new("ch_1"),
                    amount: Money::from_pounds(50),
                }),
            })
            .then_state(move |state| {
                let booking = state.booking(&gig_id).unwrap();
                assert_eq!(booking.status, GigStatus::Confirmed { performer });
                assert!(booking.charge.is_some());
            })
            .then_effects(move |effects| {
                assertions::assert_effects_count(effects, 2);
                assertions::assert_schedules(effects, &perform_timer_id(gig_id));
            })
            .run();
    }

    #[test]
    fn confirm_of_draft_is_rejected() {
        let gig_id = GigId::new();

        ReducerTest::new(TestReducer::new())
            .with_env(env_at(Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).single().unwrap()))
            .given_state(state_with(booking(gig_id, GigStatus::Draft)))
            .when_action(LifecycleAction::ConfirmBooking {
                gig_id,
                performer_id: PerformerId::new(),
                charge: None,
            })
            .then_state(move |state| {
                assert_eq!(state.booking(&gig_id).unwrap().status, GigStatus::Draft);
            })
            .then_effects(assertions::assert_has_future_effect)
            .run();
    }

    #[test]
    fn mark_performed_before_window_elapses_is_rejected() {
        let gig_id = GigId::new();
        let performer = PerformerId::new();

        ReducerTest::new(TestReducer::new())
            .with_env(env_at(performance_end_utc() - chrono::Duration::minutes(10)))
            .given_state(state_with(booking(gig_id, GigStatus::Confirmed { performer })))
            .when_action(LifecycleAction::MarkPerformed { gig_id })
            .then_state(move |state| {
                let booking = state.booking(&gig_id).unwrap();
                assert_eq!(booking.status, GigStatus::Confirmed { performer });
                assert!(booking.clears_at.is_none());
            })
            .run();
    }

    #[test]
    fn mark_performed_stamps_deadline_48h_after_end() {
        let gig_id = GigId::new();
        let performer = PerformerId::new();

        ReducerTest::new(TestReducer::new())
            .with_env(env_at(performance_end_utc() + chrono::Duration::minutes(5)))
            .given_state(state_with(booking(gig_id, GigStatus::Confirmed { performer })))
            .when_action(LifecycleAction::MarkPerformed { gig_id })
            .then_state(move |state| {
                let booking = state.booking(&gig_id).unwrap();
                assert_eq!(booking.status, GigStatus::FeePending { performer });
                assert_eq!(
                    booking.clears_at,
                    Some(performance_end_utc() + chrono::Duration::hours(48))
                );
            })
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 2);
                assertions::assert_has_future_effect(effects);
            })
            .run();
    }

    #[test]
    fn zero_fee_gig_clears_without_ledger_entry() {
        let gig_id = GigId::new();
        let performer = PerformerId::new();
        let mut b = booking(gig_id, GigStatus::Confirmed { performer });
        b.fee = Money::ZERO;

        ReducerTest::new(TestReducer::new())
            .with_env(env_at(performance_end_utc() + chrono::Duration::minutes(5)))
            .given_state(state_with(b))
            .when_action(LifecycleAction::MarkPerformed { gig_id })
            .then_state(move |state| {
                let booking = state.booking(&gig_id).unwrap();
                assert_eq!(booking.status, GigStatus::Cleared { performer });
                assert!(booking.clears_at.is_none());
            })
            .run();
    }

    #[test]
    fn fee_record_confirmation_arms_clearing_timer() {
        let gig_id = GigId::new();
        let performer = PerformerId::new();
        let mut b = booking(gig_id, GigStatus::FeePending { performer });
        b.clears_at = Some(performance_end_utc() + chrono::Duration::hours(48));

        ReducerTest::new(TestReducer::new())
            .with_env(env_at(performance_end_utc() + chrono::Duration::minutes(5)))
            .given_state(state_with(b))
            .when_action(LifecycleAction::GigPerformed {
                gig_id,
                fee_recorded: true,
            })
            .then_effects(move |effects| {
                assertions::assert_schedules(effects, &clearing_timer_id(gig_id));
            })
            .run();
    }

    #[test]
    fn clearing_before_deadline_is_rejected() {
        let gig_id = GigId::new();
        let performer = PerformerId::new();
        let mut b = booking(gig_id, GigStatus::FeePending { performer });
        b.clears_at = Some(performance_end_utc() + chrono::Duration::hours(48));

        ReducerTest::new(TestReducer::new())
            .with_env(env_at(performance_end_utc() + chrono::Duration::hours(47)))
            .given_state(state_with(b))
            .when_action(LifecycleAction::RunClearing { gig_id })
            .then_state(move |state| {
                assert!(!state.booking(&gig_id).unwrap().clearing_in_flight);
            })
            .then_effects(assertions::assert_has_future_effect)
            .run();
    }

    #[test]
    fn concurrent_clearing_check_is_at_most_once() {
        let gig_id = GigId::new();
        let performer = PerformerId::new();
        let mut b = booking(gig_id, GigStatus::FeePending { performer });
        b.clears_at = Some(performance_end_utc() + chrono::Duration::hours(48));

        // First check claims the release; the second sees it in flight and
        // does nothing.
        ReducerTest::new(TestReducer::new())
            .with_env(env_at(performance_end_utc() + chrono::Duration::hours(49)))
            .given_state(state_with(b))
            .when_action(LifecycleAction::RunClearing { gig_id })
            .when_action(LifecycleAction::RunClearing { gig_id })
            .then_state(move |state| {
                assert!(state.booking(&gig_id).unwrap().clearing_in_flight);
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn dispute_cancels_scheduled_clearing() {
        let gig_id = GigId::new();
        let performer = PerformerId::new();
        let mut b = booking(gig_id, GigStatus::FeePending { performer });
        b.clears_at = Some(performance_end_utc() + chrono::Duration::hours(48));

        // T+47h: dispute lands before the deadline.
        ReducerTest::new(TestReducer::new())
            .with_env(env_at(performance_end_utc() + chrono::Duration::hours(47)))
            .given_state(state_with(b))
            .when_action(LifecycleAction::ReportDispute { gig_id })
            .then_state(move |state| {
                let booking = state.booking(&gig_id).unwrap();
                assert_eq!(booking.status, GigStatus::InDispute { performer });
                assert!(booking.clears_at.is_none());
            })
            .then_effects(move |effects| {
                assertions::assert_cancels(effects, &clearing_timer_id(gig_id));
            })
            .run();
    }

    #[test]
    fn clearing_check_after_dispute_does_not_clear() {
        let gig_id = GigId::new();
        let performer = PerformerId::new();
        let mut b = booking(gig_id, GigStatus::InDispute { performer });
        b.clears_at = None;

        // T+48h: the deadline check fires anyway; the re-verification sees
        // the dispute and refuses.
        ReducerTest::new(TestReducer::new())
            .with_env(env_at(performance_end_utc() + chrono::Duration::hours(48)))
            .given_state(state_with(b))
            .when_action(LifecycleAction::RunClearing { gig_id })
            .then_state(move |state| {
                let booking = state.booking(&gig_id).unwrap();
                assert_eq!(booking.status, GigStatus::InDispute { performer });
                assert!(!booking.clearing_in_flight);
            })
            .then_effects(assertions::assert_has_future_effect)
            .run();
    }

    #[test]
    fn dispute_during_clearing_flight_is_rejected() {
        let gig_id = GigId::new();
        let performer = PerformerId::new();
        let mut b = booking(gig_id, GigStatus::FeePending { performer });
        b.clears_at = Some(performance_end_utc() + chrono::Duration::hours(48));
        b.clearing_in_flight = true;

        ReducerTest::new(TestReducer::new())
            .with_env(env_at(performance_end_utc() + chrono::Duration::hours(49)))
            .given_state(state_with(b))
            .when_action(LifecycleAction::ReportDispute { gig_id })
            .then_state(move |state| {
                assert_eq!(
                    state.booking(&gig_id).unwrap().status,
                    GigStatus::FeePending { performer }
                );
            })
            .run();
    }

    #[test]
    fn transient_clearing_failure_schedules_retry() {
        let gig_id = GigId::new();
        let performer = PerformerId::new();
        let mut b = booking(gig_id, GigStatus::FeePending { performer });
        b.clears_at = Some(performance_end_utc() + chrono::Duration::hours(48));
        b.clearing_in_flight = true;

        ReducerTest::new(TestReducer::new())
            .with_env(env_at(performance_end_utc() + chrono::Duration::hours(49)))
            .given_state(state_with(b))
            .when_action(LifecycleAction::ClearingFailed {
                gig_id,
                transfer_id: Some(TransferId::new("tr_000001")),
                reason: "storage blip".to_string(),
                conflict: false,
            })
            .then_state(move |state| {
                let booking = state.booking(&gig_id).unwrap();
                assert!(!booking.clearing_in_flight);
                assert_eq!(booking.clearing_attempts, 1);
                // The issued transfer is remembered so the retry skips it.
                assert_eq!(booking.transfer_id, Some(TransferId::new("tr_000001")));
            })
            .then_effects(move |effects| {
                assertions::assert_schedules(effects, &clearing_timer_id(gig_id));
            })
            .run();
    }

    #[test]
    fn conflict_clearing_failure_does_not_retry() {
        let gig_id = GigId::new();
        let performer = PerformerId::new();
        let mut b = booking(gig_id, GigStatus::FeePending { performer });
        b.clearing_in_flight = true;

        ReducerTest::new(TestReducer::new())
            .with_env(env_at(performance_end_utc() + chrono::Duration::hours(49)))
            .given_state(state_with(b))
            .when_action(LifecycleAction::ClearingFailed {
                gig_id,
                transfer_id: None,
                reason: "fee is disputed".to_string(),
                conflict: true,
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn cancellation_with_charge_refunds() {
        let gig_id = GigId::new();
        let performer = PerformerId::new();
        let mut b = booking(gig_id, GigStatus::Confirmed { performer });
        b.charge = Some(EscrowCharge {
            charge_id: crate::types::ChargeId::new("ch_1"),
            amount: Money::from_pounds(50),
        });

        ReducerTest::new(TestReducer::new())
            .with_env(env_at(Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).single().unwrap()))
            .given_state(state_with(b))
            .when_action(LifecycleAction::RequestCancellation {
                gig_id,
                reason: CancellationReason::VenueCancelled,
            })
            .then_state(move |state| {
                assert_eq!(state.booking(&gig_id).unwrap().status, GigStatus::Refunded);
            })
            .then_effects(move |effects| {
                assertions::assert_effects_count(effects, 3);
                assertions::assert_cancels(effects, &clearing_timer_id(gig_id));
            })
            .run();
    }

    #[test]
    fn cancellation_without_charge_closes() {
        let gig_id = GigId::new();

        ReducerTest::new(TestReducer::new())
            .with_env(env_at(Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).single().unwrap()))
            .given_state(state_with(booking(gig_id, GigStatus::Open)))
            .when_action(LifecycleAction::RequestCancellation {
                gig_id,
                reason: CancellationReason::VenueCancelled,
            })
            .then_state(move |state| {
                assert_eq!(state.booking(&gig_id).unwrap().status, GigStatus::Closed);
            })
            .run();
    }

    #[test]
    fn cancellation_of_settled_gig_is_rejected() {
        let gig_id = GigId::new();
        let performer = PerformerId::new();

        ReducerTest::new(TestReducer::new())
            .with_env(env_at(Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).single().unwrap()))
            .given_state(state_with(booking(gig_id, GigStatus::Cleared { performer })))
            .when_action(LifecycleAction::RequestCancellation {
                gig_id,
                reason: CancellationReason::AccountRemoved,
            })
            .then_state(move |state| {
                assert_eq!(
                    state.booking(&gig_id).unwrap().status,
                    GigStatus::Cleared { performer }
                );
            })
            .run();
    }

    #[test]
    fn deletion_with_pending_fee_is_refused() {
        let gig_id = GigId::new();
        let performer = PerformerId::new();

        ReducerTest::new(TestReducer::new())
            .with_env(env_at(Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).single().unwrap()))
            .given_state(state_with(booking(gig_id, GigStatus::FeePending { performer })))
            .when_action(LifecycleAction::DeleteGig { gig_id })
            .then_state(move |state| {
                // Still tracked; the deletion did not go through.
                assert!(state.booking(&gig_id).is_some());
            })
            .then_effects(assertions::assert_has_future_effect)
            .run();
    }

    #[test]
    fn deletion_of_open_gig_is_dispatched() {
        let gig_id = GigId::new();

        ReducerTest::new(TestReducer::new())
            .with_env(env_at(Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).single().unwrap()))
            .given_state(state_with(booking(gig_id, GigStatus::Open)))
            .when_action(LifecycleAction::DeleteGig { gig_id })
            .then_state(move |state| {
                assert!(state.booking(&gig_id).is_none());
            })
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 3);
                assertions::assert_has_future_effect(effects);
            })
            .run();
    }
}
