//! Cross-reference maintenance between venues and their gigs/templates.
//!
//! A venue document owns its gigs and templates as id sets. This
//! component keeps those sets consistent with the gig/template documents
//! under insert, update, and delete — always through the store's atomic
//! set-union and set-remove primitives, never read-modify-write, so
//! concurrent registrations for one venue converge regardless of arrival
//! order.
//!
//! Errors are never swallowed here; the factory and the lifecycle
//! controller decide whether a failed batch is abandoned or retried.

use crate::error::Result;
use crate::providers::MarketplaceStore;
use crate::types::{GigId, TemplateId, VenueId};
use std::sync::Arc;

/// Typed wrapper over the store's id-set primitives.
#[derive(Debug)]
pub struct CrossReferences<S> {
    store: Arc<S>,
}

impl<S> Clone for CrossReferences<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: MarketplaceStore> CrossReferences<S> {
    /// Wrap a store.
    #[must_use]
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Register gig ids against a venue in one set-union update.
    ///
    /// Re-registering an id already present is a no-op, so retried batch
    /// creations converge on the same set.
    ///
    /// # Errors
    ///
    /// Propagates the store's referential or transient error unchanged.
    pub async fn add_gigs(&self, venue: VenueId, gigs: &[GigId]) -> Result<()> {
        tracing::debug!(%venue, count = gigs.len(), "registering gigs against venue");
        self.store.add_gig_refs(venue, gigs).await
    }

    /// Pull one gig id from a venue's set.
    ///
    /// Removing a non-member is a no-op, not an error.
    ///
    /// # Errors
    ///
    /// Propagates the store's referential or transient error unchanged.
    pub async fn remove_gig(&self, venue: VenueId, gig: GigId) -> Result<()> {
        tracing::debug!(%venue, %gig, "removing gig from venue");
        self.store.remove_gig_ref(venue, gig).await
    }

    /// Register a template id against a venue.
    ///
    /// # Errors
    ///
    /// Propagates the store's referential or transient error unchanged.
    pub async fn add_template(&self, venue: VenueId, template: TemplateId) -> Result<()> {
        tracing::debug!(%venue, %template, "registering template against venue");
        self.store.add_template_ref(venue, template).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::mocks::InMemoryStore;
    use crate::state::VenueProfile;

    #[tokio::test]
    async fn add_twice_equals_add_once() {
        let store = Arc::new(InMemoryStore::new());
        let refs = CrossReferences::new(Arc::clone(&store));

        let venue = VenueProfile::new(VenueId::new(), "The Cellar");
        store.insert_venue(&venue).await.unwrap();

        let gigs = [GigId::new(), GigId::new()];
        refs.add_gigs(venue.id, &gigs).await.unwrap();
        refs.add_gigs(venue.id, &gigs).await.unwrap();

        let stored = store.venue(venue.id).await.unwrap().unwrap();
        assert_eq!(stored.gig_ids.len(), 2);
    }

    #[tokio::test]
    async fn concurrent_registrations_both_land() {
        let store = Arc::new(InMemoryStore::new());
        let venue = VenueProfile::new(VenueId::new(), "The Cellar");
        store.insert_venue(&venue).await.unwrap();

        let a = GigId::new();
        let b = GigId::new();

        let refs_a = CrossReferences::new(Arc::clone(&store));
        let refs_b = CrossReferences::new(Arc::clone(&store));
        let a_gigs = [a];
        let b_gigs = [b];
        let (ra, rb) = tokio::join!(
            refs_a.add_gigs(venue.id, &a_gigs),
            refs_b.add_gigs(venue.id, &b_gigs),
        );
        ra.unwrap();
        rb.unwrap();

        let stored = store.venue(venue.id).await.unwrap().unwrap();
        assert!(stored.gig_ids.contains(&a));
        assert!(stored.gig_ids.contains(&b));
    }

    #[tokio::test]
    async fn unknown_venue_error_propagates() {
        let store = Arc::new(InMemoryStore::new());
        let refs = CrossReferences::new(store);
        let err = refs.add_gigs(VenueId::new(), &[GigId::new()]).await.unwrap_err();
        assert!(matches!(err, crate::error::EngineError::VenueNotFound(_)));
    }
}
