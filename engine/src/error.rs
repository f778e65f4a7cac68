//! Error types for gig scheduling and settlement operations.

use crate::types::{GigId, PerformerId, TemplateId, VenueId};
use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Broad error category, used to pick a propagation strategy.
///
/// Validation and referential failures abandon the operation; transient
/// failures are retried with backoff; conflicts are surfaced to the caller
/// unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input; nothing was mutated.
    Validation,
    /// The input references a record that does not exist.
    Referential,
    /// A storage or payment-processor call failed or timed out.
    Transient,
    /// The operation is not legal in the current lifecycle state.
    Conflict,
}

/// Comprehensive error taxonomy for the scheduling and settlement engine.
///
/// Organized by category: validation, referential, conflict, transient.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    // ═══════════════════════════════════════════════════════════
    // Validation Errors
    // ═══════════════════════════════════════════════════════════

    /// Draft has no anchor date.
    #[error("Missing anchor date")]
    MissingAnchorDate,

    /// Duration must be at least one minute.
    #[error("Invalid duration: {minutes} minutes")]
    InvalidDuration {
        /// The rejected duration
        minutes: u32,
    },

    /// A recurrence rule was supplied with neither an instance count nor an
    /// end date.
    #[error("Recurrence needs an instance count or an end date")]
    UnboundedRecurrence,

    /// `end_after` must be at least 1.
    #[error("Recurrence instance count must be at least 1")]
    ZeroInstanceCount,

    /// Calendar arithmetic left the representable date range.
    #[error("Date arithmetic overflow")]
    DateOverflow,

    // ═══════════════════════════════════════════════════════════
    // Referential Errors
    // ═══════════════════════════════════════════════════════════

    /// Draft references a venue that does not exist.
    #[error("Venue {0} not found")]
    VenueNotFound(VenueId),

    /// Operation references a gig that does not exist.
    #[error("Gig {0} not found")]
    GigNotFound(GigId),

    /// Operation references a performer that does not exist.
    #[error("Performer {0} not found")]
    PerformerNotFound(PerformerId),

    /// Operation references a template that does not exist.
    #[error("Template {0} not found")]
    TemplateNotFound(TemplateId),

    // ═══════════════════════════════════════════════════════════
    // Conflict Errors
    // ═══════════════════════════════════════════════════════════

    /// The requested lifecycle transition is not in the transition table.
    #[error("Illegal transition from {from} to {to}")]
    IllegalTransition {
        /// Current state label
        from: &'static str,
        /// Requested state label
        to: &'static str,
    },

    /// A finalized gig's date, time, and fee are immutable.
    #[error("Gig {0} is finalized; its schedule and fee cannot change")]
    FinalizedGigImmutable(GigId),

    /// Deleting a gig whose fee is still held or contested.
    #[error("Gig {gig_id} cannot be deleted while its fee is {fee_state}")]
    DeletionBlocked {
        /// The gig being deleted
        gig_id: GigId,
        /// Label of the blocking fee state
        fee_state: &'static str,
    },

    /// A disputed fee never clears automatically.
    #[error("Fee for gig {0} is disputed and cannot clear automatically")]
    FeeDisputed(GigId),

    /// Another clearing attempt for this fee is already running.
    #[error("Fee transition for gig {0} is already in flight")]
    TransitionInFlight(GigId),

    /// The lifecycle controller rejected the operation.
    ///
    /// Carries the controller's reason verbatim; produced when a command is
    /// answered by a rejection event rather than an acknowledgement.
    #[error("Rejected: {reason}")]
    Rejected {
        /// Why the controller refused
        reason: String,
    },

    // ═══════════════════════════════════════════════════════════
    // Transient Errors
    // ═══════════════════════════════════════════════════════════

    /// A storage call failed or timed out.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A payment-processor call failed or timed out.
    #[error("Payment processor error: {0}")]
    Payment(String),

    /// Timed out waiting for a lifecycle acknowledgement.
    #[error("Timed out waiting for {0}")]
    Timeout(String),
}

impl EngineError {
    /// The broad category this error belongs to.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingAnchorDate
            | Self::InvalidDuration { .. }
            | Self::UnboundedRecurrence
            | Self::ZeroInstanceCount
            | Self::DateOverflow => ErrorKind::Validation,

            Self::VenueNotFound(_)
            | Self::GigNotFound(_)
            | Self::PerformerNotFound(_)
            | Self::TemplateNotFound(_) => ErrorKind::Referential,

            Self::IllegalTransition { .. }
            | Self::FinalizedGigImmutable(_)
            | Self::DeletionBlocked { .. }
            | Self::FeeDisputed(_)
            | Self::TransitionInFlight(_)
            | Self::Rejected { .. } => ErrorKind::Conflict,

            Self::Storage(_) | Self::Payment(_) | Self::Timeout(_) => ErrorKind::Transient,
        }
    }

    /// Returns `true` if retrying the operation may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transient)
    }

    /// Returns `true` if the operation was rejected for lifecycle reasons.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self.kind(), ErrorKind::Conflict)
    }
}

/// The engine operation a failure is being reported against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserOperation {
    /// Submitting a draft that creates gig instances.
    CreateGigs,
    /// Submitting a draft that updates an existing gig.
    UpdateGig,
    /// Any fee lifecycle transition (clearing, dispute, refund).
    FeeTransition,
}

/// Render an error for the excluded UI layer.
///
/// Validation, referential, and conflict failures keep their detail so the
/// caller can correct the request; transient failures collapse to a retry
/// hint without leaking storage or processor internals.
#[must_use]
pub fn user_message(operation: UserOperation, error: &EngineError) -> String {
    let label = match operation {
        UserOperation::CreateGigs => "could not create gig(s)",
        UserOperation::UpdateGig => "could not update gig",
        UserOperation::FeeTransition => "could not process fee transition",
    };

    match error.kind() {
        ErrorKind::Transient => format!("{label}: temporarily unavailable, please retry"),
        _ => format!("{label}: {error}"),
    }
}
