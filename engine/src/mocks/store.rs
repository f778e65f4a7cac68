//! Mock marketplace store for testing.
//!
//! All collections live under one mutex, which is what makes the
//! set-union and ledger-move operations atomic here; the `PostgreSQL`
//! implementation gets the same guarantees from single-statement updates
//! and transactions.

use crate::error::{EngineError, Result};
use crate::providers::MarketplaceStore;
use crate::state::{FeeRecord, FeeStatus, Gig, GigStatus, PerformerProfile, Template, VenueProfile};
use crate::types::{GigId, PerformerId, TemplateId, TransferId, VenueId};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Default)]
struct StoreData {
    gigs: HashMap<GigId, Gig>,
    venues: HashMap<VenueId, VenueProfile>,
    templates: HashMap<TemplateId, Template>,
    performers: HashMap<PerformerId, PerformerProfile>,
    fees: HashMap<GigId, FeeRecord>,
    fail_next_ops: usize,
}

/// Mock marketplace store.
///
/// Uses in-memory storage for testing. [`InMemoryStore::fail_next_ops`]
/// makes the next N operations fail with a transient storage error, for
/// exercising retry and partial-failure ordering.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    data: Arc<Mutex<StoreData>>,
}

impl InMemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` mutating operations fail with a transient
    /// storage error. Reads are unaffected.
    pub fn fail_next_ops(&self, n: usize) {
        self.lock().fail_next_ops = n;
    }

    /// Number of stored gig documents (for assertions).
    #[must_use]
    pub fn gig_count(&self) -> usize {
        self.lock().gigs.len()
    }

    /// Number of stored fee records (for assertions).
    #[must_use]
    pub fn fee_record_count(&self) -> usize {
        self.lock().fees.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_injected_failure(data: &mut StoreData) -> Result<()> {
        if data.fail_next_ops > 0 {
            data.fail_next_ops -= 1;
            return Err(EngineError::Storage("injected storage failure".into()));
        }
        Ok(())
    }
}

impl MarketplaceStore for InMemoryStore {
    fn gig(&self, id: GigId) -> impl Future<Output = Result<Option<Gig>>> + Send {
        let data = Arc::clone(&self.data);
        async move {
            let data = data.lock().unwrap_or_else(PoisonError::into_inner);
            Ok(data.gigs.get(&id).cloned())
        }
    }

    fn insert_gigs(&self, gigs: &[Gig]) -> impl Future<Output = Result<()>> + Send {
        let data = Arc::clone(&self.data);
        let gigs = gigs.to_vec();
        async move {
            let mut data = data.lock().unwrap_or_else(PoisonError::into_inner);
            Self::check_injected_failure(&mut data)?;
            for gig in gigs {
                data.gigs.insert(gig.id, gig);
            }
            Ok(())
        }
    }

    fn update_gig(&self, gig: &Gig) -> impl Future<Output = Result<()>> + Send {
        let data = Arc::clone(&self.data);
        let gig = gig.clone();
        async move {
            let mut data = data.lock().unwrap_or_else(PoisonError::into_inner);
            Self::check_injected_failure(&mut data)?;
            if !data.gigs.contains_key(&gig.id) {
                return Err(EngineError::GigNotFound(gig.id));
            }
            data.gigs.insert(gig.id, gig);
            Ok(())
        }
    }

    fn set_gig_status(
        &self,
        id: GigId,
        status: GigStatus,
    ) -> impl Future<Output = Result<()>> + Send {
        let data = Arc::clone(&self.data);
        async move {
            let mut data = data.lock().unwrap_or_else(PoisonError::into_inner);
            Self::check_injected_failure(&mut data)?;
            let gig = data.gigs.get_mut(&id).ok_or(EngineError::GigNotFound(id))?;
            gig.status = status;
            Ok(())
        }
    }

    fn delete_gig(&self, id: GigId) -> impl Future<Output = Result<()>> + Send {
        let data = Arc::clone(&self.data);
        async move {
            let mut data = data.lock().unwrap_or_else(PoisonError::into_inner);
            Self::check_injected_failure(&mut data)?;

            if let Some(record) = data.fees.get(&id) {
                match record.status {
                    FeeStatus::Pending | FeeStatus::InDispute => {
                        return Err(EngineError::DeletionBlocked {
                            gig_id: id,
                            fee_state: record.status.label(),
                        });
                    },
                    // Settled records are archived with the gig.
                    FeeStatus::Cleared | FeeStatus::Refunded => {
                        data.fees.remove(&id);
                    },
                }
            }

            data.gigs
                .remove(&id)
                .map(|_| ())
                .ok_or(EngineError::GigNotFound(id))
        }
    }

    fn gigs_for_venue(&self, venue: VenueId) -> impl Future<Output = Result<Vec<Gig>>> + Send {
        let data = Arc::clone(&self.data);
        async move {
            let data = data.lock().unwrap_or_else(PoisonError::into_inner);
            Ok(data
                .gigs
                .values()
                .filter(|g| g.venue_id == venue)
                .cloned()
                .collect())
        }
    }

    fn active_gigs(&self) -> impl Future<Output = Result<Vec<Gig>>> + Send {
        let data = Arc::clone(&self.data);
        async move {
            let data = data.lock().unwrap_or_else(PoisonError::into_inner);
            Ok(data
                .gigs
                .values()
                .filter(|g| !g.status.is_terminal())
                .cloned()
                .collect())
        }
    }

    fn venue(&self, id: VenueId) -> impl Future<Output = Result<Option<VenueProfile>>> + Send {
        let data = Arc::clone(&self.data);
        async move {
            let data = data.lock().unwrap_or_else(PoisonError::into_inner);
            Ok(data.venues.get(&id).cloned())
        }
    }

    fn insert_venue(&self, venue: &VenueProfile) -> impl Future<Output = Result<()>> + Send {
        let data = Arc::clone(&self.data);
        let venue = venue.clone();
        async move {
            let mut data = data.lock().unwrap_or_else(PoisonError::into_inner);
            Self::check_injected_failure(&mut data)?;
            data.venues.insert(venue.id, venue);
            Ok(())
        }
    }

    fn add_gig_refs(
        &self,
        venue: VenueId,
        gigs: &[GigId],
    ) -> impl Future<Output = Result<()>> + Send {
        let data = Arc::clone(&self.data);
        let gigs = gigs.to_vec();
        async move {
            let mut data = data.lock().unwrap_or_else(PoisonError::into_inner);
            Self::check_injected_failure(&mut data)?;
            let profile = data
                .venues
                .get_mut(&venue)
                .ok_or(EngineError::VenueNotFound(venue))?;
            profile.gig_ids.extend(gigs);
            Ok(())
        }
    }

    fn remove_gig_ref(
        &self,
        venue: VenueId,
        gig: GigId,
    ) -> impl Future<Output = Result<()>> + Send {
        let data = Arc::clone(&self.data);
        async move {
            let mut data = data.lock().unwrap_or_else(PoisonError::into_inner);
            Self::check_injected_failure(&mut data)?;
            let profile = data
                .venues
                .get_mut(&venue)
                .ok_or(EngineError::VenueNotFound(venue))?;
            profile.gig_ids.remove(&gig);
            Ok(())
        }
    }

    fn add_template_ref(
        &self,
        venue: VenueId,
        template: TemplateId,
    ) -> impl Future<Output = Result<()>> + Send {
        let data = Arc::clone(&self.data);
        async move {
            let mut data = data.lock().unwrap_or_else(PoisonError::into_inner);
            Self::check_injected_failure(&mut data)?;
            let profile = data
                .venues
                .get_mut(&venue)
                .ok_or(EngineError::VenueNotFound(venue))?;
            profile.template_ids.insert(template);
            Ok(())
        }
    }

    fn insert_template(&self, template: &Template) -> impl Future<Output = Result<()>> + Send {
        let data = Arc::clone(&self.data);
        let template = template.clone();
        async move {
            let mut data = data.lock().unwrap_or_else(PoisonError::into_inner);
            Self::check_injected_failure(&mut data)?;
            data.templates.insert(template.id, template);
            Ok(())
        }
    }

    fn template(&self, id: TemplateId) -> impl Future<Output = Result<Option<Template>>> + Send {
        let data = Arc::clone(&self.data);
        async move {
            let data = data.lock().unwrap_or_else(PoisonError::into_inner);
            Ok(data.templates.get(&id).cloned())
        }
    }

    fn performer(
        &self,
        id: PerformerId,
    ) -> impl Future<Output = Result<Option<PerformerProfile>>> + Send {
        let data = Arc::clone(&self.data);
        async move {
            let data = data.lock().unwrap_or_else(PoisonError::into_inner);
            Ok(data.performers.get(&id).cloned())
        }
    }

    fn insert_performer(
        &self,
        performer: &PerformerProfile,
    ) -> impl Future<Output = Result<()>> + Send {
        let data = Arc::clone(&self.data);
        let performer = performer.clone();
        async move {
            let mut data = data.lock().unwrap_or_else(PoisonError::into_inner);
            Self::check_injected_failure(&mut data)?;
            data.performers.insert(performer.id, performer);
            Ok(())
        }
    }

    fn insert_fee_record(&self, record: &FeeRecord) -> impl Future<Output = Result<()>> + Send {
        let data = Arc::clone(&self.data);
        let record = record.clone();
        async move {
            let mut data = data.lock().unwrap_or_else(PoisonError::into_inner);
            Self::check_injected_failure(&mut data)?;
            // Retry-idempotent: a record that already exists stays as-is.
            data.fees.entry(record.gig_id).or_insert(record);
            Ok(())
        }
    }

    fn fee_record(&self, gig: GigId) -> impl Future<Output = Result<Option<FeeRecord>>> + Send {
        let data = Arc::clone(&self.data);
        async move {
            let data = data.lock().unwrap_or_else(PoisonError::into_inner);
            Ok(data.fees.get(&gig).cloned())
        }
    }

    fn fee_records_for_performer(
        &self,
        performer: PerformerId,
        status: FeeStatus,
    ) -> impl Future<Output = Result<Vec<FeeRecord>>> + Send {
        let data = Arc::clone(&self.data);
        async move {
            let data = data.lock().unwrap_or_else(PoisonError::into_inner);
            Ok(data
                .fees
                .values()
                .filter(|r| r.performer_id == performer && r.status == status)
                .cloned()
                .collect())
        }
    }

    fn settle_fee(
        &self,
        gig: GigId,
        transfer: Option<TransferId>,
    ) -> impl Future<Output = Result<()>> + Send {
        let data = Arc::clone(&self.data);
        async move {
            let mut guard = data.lock().unwrap_or_else(PoisonError::into_inner);
            let data = &mut *guard;
            Self::check_injected_failure(data)?;

            let record = data.fees.get_mut(&gig).ok_or(EngineError::GigNotFound(gig))?;

            match record.status {
                // At-most-once: a second settle is a no-op, balances are
                // never added twice.
                FeeStatus::Cleared => return Ok(()),
                FeeStatus::InDispute => return Err(EngineError::FeeDisputed(gig)),
                FeeStatus::Refunded => {
                    return Err(EngineError::IllegalTransition {
                        from: "refunded",
                        to: "cleared",
                    });
                },
                FeeStatus::Pending => {},
            }

            record.status = FeeStatus::Cleared;
            record.clears_at = None;
            record.transfer_id = transfer;
            let amount = record.amount;
            let performer_id = record.performer_id;

            let performer = data
                .performers
                .get_mut(&performer_id)
                .ok_or(EngineError::PerformerNotFound(performer_id))?;
            performer.total_earned = performer.total_earned.saturating_add(amount);
            performer.withdrawable = performer.withdrawable.saturating_add(amount);

            let gig_doc = data.gigs.get_mut(&gig).ok_or(EngineError::GigNotFound(gig))?;
            gig_doc.status = GigStatus::Cleared {
                performer: performer_id,
            };

            Ok(())
        }
    }

    fn mark_fee_disputed(&self, gig: GigId) -> impl Future<Output = Result<()>> + Send {
        let data = Arc::clone(&self.data);
        async move {
            let mut guard = data.lock().unwrap_or_else(PoisonError::into_inner);
            let data = &mut *guard;
            Self::check_injected_failure(data)?;

            let record = data.fees.get_mut(&gig).ok_or(EngineError::GigNotFound(gig))?;

            match record.status {
                FeeStatus::InDispute => return Ok(()),
                FeeStatus::Cleared => {
                    return Err(EngineError::IllegalTransition {
                        from: "cleared",
                        to: "in_dispute",
                    });
                },
                FeeStatus::Refunded => {
                    return Err(EngineError::IllegalTransition {
                        from: "refunded",
                        to: "in_dispute",
                    });
                },
                FeeStatus::Pending => {},
            }

            record.status = FeeStatus::InDispute;
            record.clears_at = None;
            let performer_id = record.performer_id;

            let gig_doc = data.gigs.get_mut(&gig).ok_or(EngineError::GigNotFound(gig))?;
            gig_doc.status = GigStatus::InDispute {
                performer: performer_id,
            };

            Ok(())
        }
    }

    fn mark_fee_refunded(&self, gig: GigId) -> impl Future<Output = Result<()>> + Send {
        let data = Arc::clone(&self.data);
        async move {
            let mut guard = data.lock().unwrap_or_else(PoisonError::into_inner);
            let data = &mut *guard;
            Self::check_injected_failure(data)?;

            let record = data.fees.get_mut(&gig).ok_or(EngineError::GigNotFound(gig))?;

            match record.status {
                FeeStatus::Refunded => return Ok(()),
                FeeStatus::Cleared => {
                    return Err(EngineError::IllegalTransition {
                        from: "cleared",
                        to: "refunded",
                    });
                },
                FeeStatus::Pending | FeeStatus::InDispute => {},
            }

            record.status = FeeStatus::Refunded;
            record.clears_at = None;

            let gig_doc = data.gigs.get_mut(&gig).ok_or(EngineError::GigNotFound(gig))?;
            gig_doc.status = GigStatus::Refunded;

            Ok(())
        }
    }

    fn pending_fees_due(
        &self,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<FeeRecord>>> + Send {
        let data = Arc::clone(&self.data);
        async move {
            let data = data.lock().unwrap_or_else(PoisonError::into_inner);
            Ok(data
                .fees
                .values()
                .filter(|r| {
                    r.status == FeeStatus::Pending && r.clears_at.is_some_and(|when| when <= at)
                })
                .cloned()
                .collect())
        }
    }
}
