//! Domain records and the booking lifecycle state machine.
//!
//! The lifecycle is an explicit tagged enum with a transition function;
//! an illegal transition is a [`EngineError::IllegalTransition`] conflict,
//! rejected before any mutation, never a scattered string comparison at a
//! call site.

use crate::error::{EngineError, Result};
use crate::recurrence::Recurrence;
use crate::types::{
    Application, ApplicationStatus, ChargeId, Currency, GigId, GigSchedule, Money, PayoutAccount,
    PerformerId, TemplateId, TransferId, VenueId,
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ═══════════════════════════════════════════════════════════════════════
// Lifecycle State Machine
// ═══════════════════════════════════════════════════════════════════════

/// Lifecycle state of one gig instance.
///
/// ```text
/// draft → open → confirmed → performed → fee_pending → cleared
///                                             │            ▲
///                                             ▼            │
///                                        in_dispute ───────┘
///
/// open/confirmed/…  → refunded   (charge existed; processor refunded)
/// draft/open/confirmed → closed  (withdrawn before any charge)
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GigStatus {
    /// Incomplete draft, not yet posted.
    Draft,
    /// Posted and accepting applicants.
    Open,
    /// An applicant was accepted.
    Confirmed {
        /// The booked performer.
        performer: PerformerId,
    },
    /// The performance window has elapsed.
    Performed {
        /// The booked performer.
        performer: PerformerId,
    },
    /// Fee held in escrow pending the clearing deadline.
    FeePending {
        /// The booked performer.
        performer: PerformerId,
    },
    /// Fee released to the performer.
    Cleared {
        /// The booked performer.
        performer: PerformerId,
    },
    /// A dispute blocks automatic clearing; manual resolution required.
    InDispute {
        /// The booked performer.
        performer: PerformerId,
    },
    /// Withdrawn or removed; the original charge was refunded.
    Refunded,
    /// Withdrawn before any charge existed; nothing to refund.
    Closed,
}

impl GigStatus {
    /// Stable label, used in serialized documents and error messages.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Open => "open",
            Self::Confirmed { .. } => "confirmed",
            Self::Performed { .. } => "performed",
            Self::FeePending { .. } => "fee_pending",
            Self::Cleared { .. } => "cleared",
            Self::InDispute { .. } => "in_dispute",
            Self::Refunded => "refunded",
            Self::Closed => "closed",
        }
    }

    /// The booked performer, once one exists.
    #[must_use]
    pub const fn performer(&self) -> Option<PerformerId> {
        match self {
            Self::Confirmed { performer }
            | Self::Performed { performer }
            | Self::FeePending { performer }
            | Self::Cleared { performer }
            | Self::InDispute { performer } => Some(*performer),
            Self::Draft | Self::Open | Self::Refunded | Self::Closed => None,
        }
    }

    /// Whether no further transitions are possible.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Cleared { .. } | Self::Refunded | Self::Closed)
    }

    /// Whether `to` is a legal next state.
    #[must_use]
    pub const fn allows(&self, to: &Self) -> bool {
        matches!(
            (self, to),
            (Self::Draft, Self::Open)
                | (Self::Draft | Self::Open | Self::Confirmed { .. }, Self::Closed)
                | (Self::Open, Self::Confirmed { .. })
                | (Self::Confirmed { .. }, Self::Performed { .. })
                | (Self::Performed { .. }, Self::FeePending { .. } | Self::Cleared { .. })
                | (Self::FeePending { .. }, Self::Cleared { .. } | Self::InDispute { .. })
                | (Self::InDispute { .. }, Self::Cleared { .. })
                | (
                    Self::Open
                        | Self::Confirmed { .. }
                        | Self::Performed { .. }
                        | Self::FeePending { .. }
                        | Self::InDispute { .. },
                    Self::Refunded,
                )
        )
    }

    /// Apply a transition, rejecting anything outside the table.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::IllegalTransition`] when `to` is not a legal
    /// next state.
    pub fn transition(&self, to: Self) -> Result<Self> {
        if self.allows(&to) {
            Ok(to)
        } else {
            Err(EngineError::IllegalTransition {
                from: self.label(),
                to: to.label(),
            })
        }
    }
}

/// Status of one fee-ledger entry.
///
/// Moves in lock-step with the owning gig's status: a record is `Cleared`
/// exactly when the gig is, never observed in disagreement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeeStatus {
    /// Held in escrow pending the clearing deadline.
    Pending,
    /// Released to the performer.
    Cleared,
    /// Blocked by an open dispute.
    InDispute,
    /// Returned to the venue.
    Refunded,
}

impl FeeStatus {
    /// Stable label, used in serialized documents and error messages.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Cleared => "cleared",
            Self::InDispute => "in_dispute",
            Self::Refunded => "refunded",
        }
    }

    /// Whether `to` is a legal next state.
    #[must_use]
    pub const fn allows(&self, to: &Self) -> bool {
        matches!(
            (self, to),
            (Self::Pending, Self::Cleared | Self::InDispute | Self::Refunded)
                | (Self::InDispute, Self::Cleared | Self::Refunded)
        )
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Records
// ═══════════════════════════════════════════════════════════════════════

/// One performance slot with its own identity and lifecycle state.
///
/// Once finalized (`complete = true`), the schedule and fee are immutable;
/// only status transitions, applicant mutation, and fee cross-references
/// may change without creating a new instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Gig {
    /// Unique id.
    pub id: GigId,

    /// Owning venue.
    pub venue_id: VenueId,

    /// When the performance takes place (local calendar values).
    pub schedule: GigSchedule,

    /// Hidden from public listings.
    pub private: bool,

    /// Performance fee.
    pub fee: Money,

    /// Settlement currency.
    pub currency: Currency,

    /// Finalized (posted) vs. still a draft.
    pub complete: bool,

    /// Lifecycle state.
    pub status: GigStatus,

    /// Recurrence metadata. Present only while this record is a draft;
    /// never on generated instances.
    pub recurrence: Option<Recurrence>,

    /// Performers who applied.
    pub applicants: Vec<Application>,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Gig {
    /// Record an application; re-applying is a no-op.
    pub fn add_applicant(&mut self, performer_id: PerformerId, now: DateTime<Utc>) {
        if self
            .applicants
            .iter()
            .any(|a| a.performer_id == performer_id)
        {
            return;
        }
        self.applicants.push(Application {
            performer_id,
            status: ApplicationStatus::Applied,
            applied_at: now,
        });
    }

    /// Update one applicant's status; unknown applicants are ignored.
    pub fn set_application_status(&mut self, performer_id: PerformerId, status: ApplicationStatus) {
        if let Some(application) = self
            .applicants
            .iter_mut()
            .find(|a| a.performer_id == performer_id)
        {
            application.status = status;
        }
    }
}

/// A submitted gig draft: the inbound shape of submit-or-update.
///
/// The id is caller-supplied; an id that already exists makes the
/// submission an update, anything else a creation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GigDraft {
    /// Caller-supplied id.
    pub id: GigId,

    /// Owning venue.
    pub venue_id: VenueId,

    /// Anchor date. Absent on malformed submissions; validated before
    /// anything is persisted.
    pub date: Option<NaiveDate>,

    /// Local start time.
    pub start_time: NaiveTime,

    /// Duration in minutes.
    pub duration_minutes: u32,

    /// Hidden from public listings.
    pub private: bool,

    /// Recurrence metadata, if the draft repeats.
    pub recurrence: Option<Recurrence>,

    /// Performance fee.
    pub fee: Money,

    /// Settlement currency.
    pub currency: Currency,

    /// Whether the venue finalized the draft.
    pub complete: bool,
}

impl GigDraft {
    /// Validate scheduling fields and produce the schedule.
    ///
    /// # Errors
    ///
    /// - [`EngineError::MissingAnchorDate`] if no date was supplied
    /// - [`EngineError::InvalidDuration`] for a zero-minute duration
    pub fn schedule(&self) -> Result<GigSchedule> {
        let date = self.date.ok_or(EngineError::MissingAnchorDate)?;
        if self.duration_minutes == 0 {
            return Err(EngineError::InvalidDuration {
                minutes: self.duration_minutes,
            });
        }
        Ok(GigSchedule::new(date, self.start_time, self.duration_minutes))
    }
}

/// A reusable gig draft owned by one venue.
///
/// Templates are a factory source, never a lifecycle target: they carry no
/// status and no applicants.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Template {
    /// Unique id.
    pub id: TemplateId,

    /// Owning venue.
    pub venue_id: VenueId,

    /// Display name.
    pub title: String,

    /// Default start time.
    pub start_time: NaiveTime,

    /// Default duration in minutes.
    pub duration_minutes: u32,

    /// Default visibility.
    pub private: bool,

    /// Default recurrence.
    pub recurrence: Option<Recurrence>,

    /// Default fee.
    pub fee: Money,

    /// Settlement currency.
    pub currency: Currency,
}

impl Template {
    /// Instantiate a draft from this template, anchored at `date`.
    #[must_use]
    pub fn to_draft(&self, id: GigId, date: NaiveDate) -> GigDraft {
        GigDraft {
            id,
            venue_id: self.venue_id,
            date: Some(date),
            start_time: self.start_time,
            duration_minutes: self.duration_minutes,
            private: self.private,
            recurrence: self.recurrence,
            fee: self.fee,
            currency: self.currency,
            complete: true,
        }
    }
}

/// A venue profile: owns gigs and templates by id, never by embedding.
///
/// Referential symmetry invariant: every id in `gig_ids` names a gig whose
/// `venue_id` points back here. The cross-reference maintainer upholds
/// this under insert, update, and delete.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VenueProfile {
    /// Unique id.
    pub id: VenueId,

    /// Display name.
    pub name: String,

    /// Ids of owned gigs.
    pub gig_ids: BTreeSet<GigId>,

    /// Ids of owned templates.
    pub template_ids: BTreeSet<TemplateId>,
}

impl VenueProfile {
    /// A venue with no gigs or templates yet.
    #[must_use]
    pub fn new(id: VenueId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            gig_ids: BTreeSet::new(),
            template_ids: BTreeSet::new(),
        }
    }
}

/// A performer profile, as far as settlement cares: the payout destination
/// and the running balances.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PerformerProfile {
    /// Unique id.
    pub id: PerformerId,

    /// Display name.
    pub name: String,

    /// Connected payout destination, if any. A missing destination never
    /// blocks clearing; the fee stays withdrawable instead.
    pub payout_destination: Option<PayoutAccount>,

    /// Lifetime earnings.
    pub total_earned: Money,

    /// Cleared but not yet withdrawn.
    pub withdrawable: Money,
}

impl PerformerProfile {
    /// A performer with zeroed balances.
    #[must_use]
    pub fn new(id: PerformerId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            payout_destination: None,
            total_earned: Money::ZERO,
            withdrawable: Money::ZERO,
        }
    }

    /// The same profile with a connected payout destination.
    #[must_use]
    pub fn with_payout_destination(mut self, destination: PayoutAccount) -> Self {
        self.payout_destination = Some(destination);
        self
    }
}

/// One entry in a performer's fee ledger.
///
/// A given gig id appears in at most one performer's ledger at a time, and
/// the entry moves between pending and cleared atomically with the gig's
/// own status.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeeRecord {
    /// The gig this fee settles.
    pub gig_id: GigId,

    /// The earning performer.
    pub performer_id: PerformerId,

    /// Fee amount.
    pub amount: Money,

    /// Settlement currency.
    pub currency: Currency,

    /// Calendar date of the performance.
    pub gig_date: NaiveDate,

    /// Ledger status.
    pub status: FeeStatus,

    /// When the fee clears automatically. Cleared when a dispute is
    /// logged; a disputed fee only moves by manual resolution.
    pub clears_at: Option<DateTime<Utc>>,

    /// Processor transfer identifier, once a payout was issued.
    pub transfer_id: Option<TransferId>,
}

/// The venue's escrow charge backing a booking, if one exists.
///
/// Kept alongside the booking so a refund trigger knows whether there is
/// anything to refund.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EscrowCharge {
    /// Processor charge identifier.
    pub charge_id: ChargeId,

    /// Charged amount.
    pub amount: Money,
}
