//! Storage provider trait.
//!
//! Abstracts the document store holding gigs, venue profiles, templates,
//! performer profiles, and fee ledgers. The contract mirrors the
//! primitives the engine's invariants lean on:
//!
//! - **atomic id-set union/remove** on venue documents, so concurrent
//!   cross-reference writes converge instead of overwriting each other;
//! - **batch insert** of gig instances, all-or-nothing;
//! - an **atomic keyed ledger move** (`settle_fee`) that moves a fee from
//!   pending to cleared, updates the performer's balances, and stamps the
//!   gig's status in one step, so the ledger and the gig can never
//!   disagree about whether a fee cleared.

use crate::error::Result;
use crate::state::{FeeRecord, FeeStatus, Gig, GigStatus, PerformerProfile, Template, VenueProfile};
use crate::types::{GigId, PerformerId, TemplateId, TransferId, VenueId};
use chrono::{DateTime, Utc};
use std::future::Future;

/// The document-store collaborator.
///
/// All operations are asynchronous I/O and may fail transiently; callers
/// retry with backoff where a transition depends on it. Implementations must
/// make the set-union, set-remove, and ledger-move operations atomic and
/// idempotent — calling them twice leaves the same state as calling them
/// once.
pub trait MarketplaceStore: Send + Sync {
    /// Fetch a gig by id.
    ///
    /// # Errors
    ///
    /// Returns a transient storage error if the call fails.
    fn gig(&self, id: GigId) -> impl Future<Output = Result<Option<Gig>>> + Send;

    /// Persist a batch of new gig instances, all-or-nothing.
    ///
    /// # Errors
    ///
    /// Returns a transient storage error if the batch fails; no instance
    /// is visible afterwards.
    fn insert_gigs(&self, gigs: &[Gig]) -> impl Future<Output = Result<()>> + Send;

    /// Replace the mutable fields of an existing gig.
    ///
    /// # Errors
    ///
    /// Returns a transient storage error if the call fails, or
    /// [`crate::error::EngineError::GigNotFound`] for an unknown id.
    fn update_gig(&self, gig: &Gig) -> impl Future<Output = Result<()>> + Send;

    /// Set only the lifecycle status of a gig.
    ///
    /// # Errors
    ///
    /// Returns a transient storage error if the call fails, or
    /// [`crate::error::EngineError::GigNotFound`] for an unknown id.
    fn set_gig_status(
        &self,
        id: GigId,
        status: GigStatus,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Delete a gig document.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::EngineError::DeletionBlocked`] while a fee
    /// record in `pending`/`in_dispute` status references the gig, or a
    /// transient storage error if the call fails. Settled fee records are
    /// archived with the gig.
    fn delete_gig(&self, id: GigId) -> impl Future<Output = Result<()>> + Send;

    /// All gigs whose `venue_id` field names `venue` (query by field
    /// membership).
    ///
    /// # Errors
    ///
    /// Returns a transient storage error if the call fails.
    fn gigs_for_venue(&self, venue: VenueId) -> impl Future<Output = Result<Vec<Gig>>> + Send;

    /// All gigs in a non-terminal lifecycle state; used by recovery to
    /// re-arm timers.
    ///
    /// # Errors
    ///
    /// Returns a transient storage error if the call fails.
    fn active_gigs(&self) -> impl Future<Output = Result<Vec<Gig>>> + Send;

    /// Fetch a venue profile by id.
    ///
    /// # Errors
    ///
    /// Returns a transient storage error if the call fails.
    fn venue(&self, id: VenueId) -> impl Future<Output = Result<Option<VenueProfile>>> + Send;

    /// Create a venue profile.
    ///
    /// # Errors
    ///
    /// Returns a transient storage error if the call fails.
    fn insert_venue(&self, venue: &VenueProfile) -> impl Future<Output = Result<()>> + Send;

    /// Atomically union `gigs` into the venue's gig-id set.
    ///
    /// Ids already present are no-ops; a missing set initializes to
    /// exactly the given ids. Safe to call concurrently for one venue.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::EngineError::VenueNotFound`] for an unknown
    /// venue, or a transient storage error if the call fails.
    fn add_gig_refs(
        &self,
        venue: VenueId,
        gigs: &[GigId],
    ) -> impl Future<Output = Result<()>> + Send;

    /// Atomically pull one id from the venue's gig-id set.
    ///
    /// Removing a non-member is a no-op, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::EngineError::VenueNotFound`] for an unknown
    /// venue, or a transient storage error if the call fails.
    fn remove_gig_ref(&self, venue: VenueId, gig: GigId)
    -> impl Future<Output = Result<()>> + Send;

    /// Atomically union one template id into the venue's template-id set.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::EngineError::VenueNotFound`] for an unknown
    /// venue, or a transient storage error if the call fails.
    fn add_template_ref(
        &self,
        venue: VenueId,
        template: TemplateId,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Persist a template.
    ///
    /// # Errors
    ///
    /// Returns a transient storage error if the call fails.
    fn insert_template(&self, template: &Template) -> impl Future<Output = Result<()>> + Send;

    /// Fetch a template by id.
    ///
    /// # Errors
    ///
    /// Returns a transient storage error if the call fails.
    fn template(&self, id: TemplateId) -> impl Future<Output = Result<Option<Template>>> + Send;

    /// Fetch a performer profile by id.
    ///
    /// # Errors
    ///
    /// Returns a transient storage error if the call fails.
    fn performer(
        &self,
        id: PerformerId,
    ) -> impl Future<Output = Result<Option<PerformerProfile>>> + Send;

    /// Create a performer profile.
    ///
    /// # Errors
    ///
    /// Returns a transient storage error if the call fails.
    fn insert_performer(
        &self,
        performer: &PerformerProfile,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Create a fee-ledger entry. Inserting an entry that already exists
    /// for the gig is a no-op (retry-idempotent).
    ///
    /// # Errors
    ///
    /// Returns a transient storage error if the call fails.
    fn insert_fee_record(&self, record: &FeeRecord) -> impl Future<Output = Result<()>> + Send;

    /// Fetch the fee record for a gig, if one exists.
    ///
    /// # Errors
    ///
    /// Returns a transient storage error if the call fails.
    fn fee_record(&self, gig: GigId) -> impl Future<Output = Result<Option<FeeRecord>>> + Send;

    /// All of one performer's fee records in `status` (query by field
    /// membership).
    ///
    /// # Errors
    ///
    /// Returns a transient storage error if the call fails.
    fn fee_records_for_performer(
        &self,
        performer: PerformerId,
        status: FeeStatus,
    ) -> impl Future<Output = Result<Vec<FeeRecord>>> + Send;

    /// Atomic keyed ledger move: pending → cleared.
    ///
    /// In one step: stamps the transfer id (when a payout was issued),
    /// moves the record to `cleared`, adds the amount to the performer's
    /// running-total and withdrawable balances, and marks the gig's status
    /// cleared. Calling it again for an already-cleared gig is a no-op —
    /// balances are never added twice.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::EngineError::FeeDisputed`] if the record is
    /// in dispute, [`crate::error::EngineError::GigNotFound`] when no
    /// record exists, or a transient storage error if the call fails.
    fn settle_fee(
        &self,
        gig: GigId,
        transfer: Option<TransferId>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Move a pending fee to `in_dispute` and clear its deadline, stamping
    /// the gig's status in the same step. Idempotent for an
    /// already-disputed fee.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::EngineError::GigNotFound`] when no record
    /// exists, a conflict if the fee already cleared, or a transient
    /// storage error if the call fails.
    fn mark_fee_disputed(&self, gig: GigId) -> impl Future<Output = Result<()>> + Send;

    /// Move a fee to `refunded`, stamping the gig's status in the same
    /// step. Idempotent for an already-refunded fee.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::EngineError::GigNotFound`] when no record
    /// exists, or a transient storage error if the call fails.
    fn mark_fee_refunded(&self, gig: GigId) -> impl Future<Output = Result<()>> + Send;

    /// Pending fee records whose deadline is at or before `at`; used by
    /// recovery and by an external poll trigger.
    ///
    /// # Errors
    ///
    /// Returns a transient storage error if the call fails.
    fn pending_fees_due(
        &self,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<FeeRecord>>> + Send;
}
