//! Outbound domain events.
//!
//! Produced for the excluded UI/notification layer whenever the engine
//! changes something it cares about. Events are facts; consumers must
//! tolerate at-least-once delivery.

use crate::types::{GigId, Money, PerformerId, VenueId};
use serde::{Deserialize, Serialize};

/// One outbound notification, carrying the ids involved and the gig's new
/// status label.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A gig instance was created (singly or as part of a recurring batch).
    GigCreated {
        /// The new gig.
        gig_id: GigId,
        /// Owning venue.
        venue_id: VenueId,
        /// New status label.
        status: String,
    },

    /// An existing gig was updated in place.
    GigUpdated {
        /// The updated gig.
        gig_id: GigId,
        /// Owning venue.
        venue_id: VenueId,
        /// New status label.
        status: String,
    },

    /// A fee cleared and left escrow.
    FeeCleared {
        /// The settled gig.
        gig_id: GigId,
        /// Owning venue.
        venue_id: VenueId,
        /// The earning performer.
        performer_id: PerformerId,
        /// Cleared amount.
        amount: Money,
        /// New status label.
        status: String,
    },

    /// A dispute blocked automatic clearing.
    FeeDisputed {
        /// The disputed gig.
        gig_id: GigId,
        /// Owning venue.
        venue_id: VenueId,
        /// The booked performer.
        performer_id: PerformerId,
        /// New status label.
        status: String,
    },

    /// A booking was refunded to the venue.
    GigRefunded {
        /// The refunded gig.
        gig_id: GigId,
        /// Owning venue.
        venue_id: VenueId,
        /// The booked performer, when one existed.
        performer_id: Option<PerformerId>,
        /// New status label.
        status: String,
    },
}

impl DomainEvent {
    /// The gig this event concerns.
    #[must_use]
    pub const fn gig_id(&self) -> GigId {
        match self {
            Self::GigCreated { gig_id, .. }
            | Self::GigUpdated { gig_id, .. }
            | Self::FeeCleared { gig_id, .. }
            | Self::FeeDisputed { gig_id, .. }
            | Self::GigRefunded { gig_id, .. } => *gig_id,
        }
    }

    /// Stable event-type label.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::GigCreated { .. } => "gig_created",
            Self::GigUpdated { .. } => "gig_updated",
            Self::FeeCleared { .. } => "fee_cleared",
            Self::FeeDisputed { .. } => "fee_disputed",
            Self::GigRefunded { .. } => "gig_refunded",
        }
    }
}
