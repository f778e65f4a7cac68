//! The gig instance factory: submit-or-update.
//!
//! One submitted draft either updates the gig it names or expands into a
//! batch of persisted instances (one per recurrence date). Ordering on
//! creation is deliberate: instances are fully persisted *before* the
//! venue's cross-reference set learns about them, so a failure in between
//! leaves no dangling ids and the whole submission is retry-idempotent.

use crate::error::{EngineError, Result};
use crate::providers::{EventPublisher, MarketplaceStore};
use crate::recurrence::{self, EndCondition, RepeatRule};
use crate::references::CrossReferences;
use crate::state::{Gig, GigDraft, GigStatus, Template};
use crate::types::GigId;
use callboard_core::environment::Clock;
use callboard_runtime::RetryPolicy;
use callboard_runtime::retry::retry_with_predicate;
use std::future::Future;
use std::sync::Arc;

use crate::events::DomainEvent;

/// What a submission did.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// The draft named an existing gig, which was updated in place.
    Updated(Gig),
    /// The draft was new; these instances were created.
    Created(Vec<Gig>),
}

/// Turns submitted drafts into persisted gig instances.
pub struct GigFactory<S, E>
where
    S: MarketplaceStore,
    E: EventPublisher,
{
    store: Arc<S>,
    refs: CrossReferences<S>,
    publisher: Arc<E>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl<S, E> GigFactory<S, E>
where
    S: MarketplaceStore,
    E: EventPublisher,
{
    /// Create a factory.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        publisher: Arc<E>,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            refs: CrossReferences::new(Arc::clone(&store)),
            store,
            publisher,
            clock,
            retry,
        }
    }

    async fn with_retry<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        retry_with_predicate(self.retry.clone(), operation, EngineError::is_transient).await
    }

    /// Submit a draft: update the gig it names, or create new instances.
    ///
    /// Validation and the referential venue check happen before anything
    /// is persisted; transient storage failures are retried with backoff.
    ///
    /// # Errors
    ///
    /// - validation errors from the draft or its recurrence bounds
    /// - [`EngineError::VenueNotFound`] when a creation names an unknown venue
    /// - [`EngineError::FinalizedGigImmutable`] when an update would change
    ///   a finalized gig's schedule or fee
    /// - transient storage errors once retries are exhausted
    #[tracing::instrument(skip(self, draft), fields(gig_id = %draft.id, venue_id = %draft.venue_id))]
    pub async fn create_or_update(&self, draft: GigDraft) -> Result<SubmitOutcome> {
        let schedule = draft.schedule()?;

        let existing = self.with_retry(|| self.store.gig(draft.id)).await?;

        if let Some(existing) = existing {
            return self.update(existing, draft).await.map(SubmitOutcome::Updated);
        }

        // Creation. The referential check comes before any persistence.
        let venue_id = draft.venue_id;
        self.with_retry(|| self.store.venue(venue_id))
            .await?
            .ok_or(EngineError::VenueNotFound(venue_id))?;

        let now = self.clock.now();

        if !draft.complete {
            // Incomplete drafts are registered immediately so abandoned
            // drafts stay discoverable and attributable to their venue.
            let gig = Gig {
                id: draft.id,
                venue_id,
                schedule,
                private: draft.private,
                fee: draft.fee,
                currency: draft.currency,
                complete: false,
                status: GigStatus::Draft,
                recurrence: draft.recurrence,
                applicants: Vec::new(),
                created_at: now,
            };

            self.with_retry(|| self.store.insert_gigs(std::slice::from_ref(&gig)))
                .await?;
            self.refs.add_gigs(venue_id, &[gig.id]).await?;

            self.publisher.publish(DomainEvent::GigCreated {
                gig_id: gig.id,
                venue_id,
                status: gig.status.label().to_string(),
            });

            return Ok(SubmitOutcome::Created(vec![gig]));
        }

        // Finalized: expand recurrence into independent instances.
        let (rule, end) = draft
            .recurrence
            .map_or((RepeatRule::None, EndCondition::default()), |r| {
                (r.rule, r.end)
            });
        let dates = recurrence::generate(schedule.date, rule, &end)?;

        let gigs: Vec<Gig> = dates
            .into_iter()
            .map(|date| Gig {
                id: GigId::new(),
                venue_id,
                schedule: schedule.on_date(date),
                private: draft.private,
                fee: draft.fee,
                currency: draft.currency,
                complete: true,
                status: GigStatus::Open,
                // Recurrence metadata is a draft-only concept; instances
                // never carry it.
                recurrence: None,
                applicants: Vec::new(),
                created_at: now,
            })
            .collect();

        if gigs.is_empty() {
            tracing::warn!("recurrence expansion produced no dates; nothing created");
            return Ok(SubmitOutcome::Created(gigs));
        }

        // Persist instances fully, then register the whole batch in one
        // cross-reference update. A failure in between leaves the venue
        // unaware of the new gigs, which is safe and retryable.
        self.with_retry(|| self.store.insert_gigs(&gigs)).await?;

        let ids: Vec<GigId> = gigs.iter().map(|g| g.id).collect();
        self.refs.add_gigs(venue_id, &ids).await?;

        for gig in &gigs {
            self.publisher.publish(DomainEvent::GigCreated {
                gig_id: gig.id,
                venue_id,
                status: gig.status.label().to_string(),
            });
        }

        tracing::info!(count = gigs.len(), "created gig instances");
        Ok(SubmitOutcome::Created(gigs))
    }

    /// Replace the mutable fields of an existing gig with the draft's.
    ///
    /// No new cross-references are created: the id was registered when the
    /// record first appeared, so a draft finalized later never shows up
    /// twice in the venue's set.
    async fn update(&self, existing: Gig, draft: GigDraft) -> Result<Gig> {
        let schedule = draft.schedule()?;

        if existing.complete && (schedule != existing.schedule || draft.fee != existing.fee) {
            return Err(EngineError::FinalizedGigImmutable(existing.id));
        }

        let finalizing = !existing.complete && draft.complete;
        let status = if finalizing {
            existing.status.transition(GigStatus::Open)?
        } else {
            existing.status
        };

        let complete = existing.complete || draft.complete;
        let updated = Gig {
            id: existing.id,
            venue_id: existing.venue_id,
            schedule,
            private: draft.private,
            fee: draft.fee,
            currency: draft.currency,
            complete,
            status,
            recurrence: if complete { None } else { draft.recurrence },
            applicants: existing.applicants,
            created_at: existing.created_at,
        };

        self.with_retry(|| self.store.update_gig(&updated)).await?;

        self.publisher.publish(DomainEvent::GigUpdated {
            gig_id: updated.id,
            venue_id: updated.venue_id,
            status: updated.status.label().to_string(),
        });

        Ok(updated)
    }

    /// Persist a reusable template and register it against its venue.
    ///
    /// # Errors
    ///
    /// - [`EngineError::VenueNotFound`] for an unknown venue
    /// - transient storage errors once retries are exhausted
    pub async fn save_template(&self, template: Template) -> Result<()> {
        let venue_id = template.venue_id;
        self.with_retry(|| self.store.venue(venue_id))
            .await?
            .ok_or(EngineError::VenueNotFound(venue_id))?;

        self.with_retry(|| self.store.insert_template(&template))
            .await?;
        self.refs.add_template(venue_id, template.id).await?;

        tracing::info!(template_id = %template.id, %venue_id, "saved template");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::mocks::{InMemoryStore, RecordingPublisher};
    use crate::recurrence::Recurrence;
    use crate::state::VenueProfile;
    use crate::types::{Currency, Money, VenueId};
    use callboard_core::environment::FixedClock;
    use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};

    fn factory(
        store: &Arc<InMemoryStore>,
        publisher: &Arc<RecordingPublisher>,
    ) -> GigFactory<InMemoryStore, RecordingPublisher> {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).single().unwrap());
        GigFactory::new(
            Arc::clone(store),
            Arc::clone(publisher),
            Arc::new(clock),
            RetryPolicy::builder()
                .max_retries(2)
                .initial_delay(std::time::Duration::from_millis(1))
                .build(),
        )
    }

    fn draft(venue_id: VenueId) -> GigDraft {
        GigDraft {
            id: GigId::new(),
            venue_id,
            date: NaiveDate::from_ymd_opt(2025, 5, 10),
            start_time: NaiveTime::from_hms_opt(19, 0, 0).unwrap(),
            duration_minutes: 90,
            private: false,
            recurrence: None,
            fee: Money::from_pounds(50),
            currency: Currency::Gbp,
            complete: true,
        }
    }

    async fn seeded_venue(store: &Arc<InMemoryStore>) -> VenueId {
        let venue = VenueProfile::new(VenueId::new(), "The Cellar");
        store.insert_venue(&venue).await.unwrap();
        venue.id
    }

    #[tokio::test]
    async fn incomplete_draft_registers_one_id_with_draft_status() {
        let store = Arc::new(InMemoryStore::new());
        let publisher = Arc::new(RecordingPublisher::new());
        let factory = factory(&store, &publisher);
        let venue_id = seeded_venue(&store).await;

        let mut submission = draft(venue_id);
        submission.complete = false;

        let outcome = factory.create_or_update(submission.clone()).await.unwrap();
        let SubmitOutcome::Created(gigs) = outcome else {
            panic!("expected creation");
        };
        assert_eq!(gigs.len(), 1);
        assert_eq!(gigs[0].id, submission.id);
        assert_eq!(gigs[0].status, GigStatus::Draft);

        let venue = store.venue(venue_id).await.unwrap().unwrap();
        assert_eq!(venue.gig_ids.len(), 1);
        assert!(venue.gig_ids.contains(&submission.id));
    }

    #[tokio::test]
    async fn recurring_draft_expands_into_instances() {
        let store = Arc::new(InMemoryStore::new());
        let publisher = Arc::new(RecordingPublisher::new());
        let factory = factory(&store, &publisher);
        let venue_id = seeded_venue(&store).await;

        let mut submission = draft(venue_id);
        submission.recurrence = Some(Recurrence {
            rule: RepeatRule::Weekly,
            end: EndCondition::after(4),
        });

        let outcome = factory.create_or_update(submission).await.unwrap();
        let SubmitOutcome::Created(gigs) = outcome else {
            panic!("expected creation");
        };
        assert_eq!(gigs.len(), 4);

        // Instances are a week apart, finalized, and carry no recurrence.
        for (i, gig) in gigs.iter().enumerate() {
            assert_eq!(
                gig.schedule.date,
                NaiveDate::from_ymd_opt(2025, 5, 10).unwrap() + chrono::Days::new(7 * i as u64)
            );
            assert_eq!(gig.status, GigStatus::Open);
            assert!(gig.recurrence.is_none());
        }

        // All registered against the venue in one batch.
        let venue = store.venue(venue_id).await.unwrap().unwrap();
        assert_eq!(venue.gig_ids.len(), 4);
        assert_eq!(publisher.events_of_type("gig_created").len(), 4);
    }

    #[tokio::test]
    async fn unknown_venue_is_rejected_before_persistence() {
        let store = Arc::new(InMemoryStore::new());
        let publisher = Arc::new(RecordingPublisher::new());
        let factory = factory(&store, &publisher);

        let err = factory.create_or_update(draft(VenueId::new())).await.unwrap_err();
        assert!(matches!(err, EngineError::VenueNotFound(_)));
        assert_eq!(store.gig_count(), 0);
    }

    #[tokio::test]
    async fn update_replaces_fields_without_new_references() {
        let store = Arc::new(InMemoryStore::new());
        let publisher = Arc::new(RecordingPublisher::new());
        let factory = factory(&store, &publisher);
        let venue_id = seeded_venue(&store).await;

        let mut submission = draft(venue_id);
        submission.complete = false;
        factory.create_or_update(submission.clone()).await.unwrap();

        // Finalize the same draft id.
        submission.complete = true;
        submission.private = true;
        let outcome = factory.create_or_update(submission.clone()).await.unwrap();
        let SubmitOutcome::Updated(updated) = outcome else {
            panic!("expected update");
        };
        assert!(updated.complete);
        assert!(updated.private);
        assert_eq!(updated.status, GigStatus::Open);

        // Round-trip: the id appears exactly once in the venue's set.
        let venue = store.venue(venue_id).await.unwrap().unwrap();
        assert_eq!(venue.gig_ids.len(), 1);
    }

    #[tokio::test]
    async fn finalized_schedule_and_fee_are_immutable() {
        let store = Arc::new(InMemoryStore::new());
        let publisher = Arc::new(RecordingPublisher::new());
        let factory = factory(&store, &publisher);
        let venue_id = seeded_venue(&store).await;

        let submission = draft(venue_id);
        let outcome = factory.create_or_update(submission.clone()).await.unwrap();
        let SubmitOutcome::Created(gigs) = outcome else {
            panic!("expected creation");
        };

        // Instances get fresh ids; resubmit against the created instance.
        let mut change = submission;
        change.id = gigs[0].id;
        change.fee = Money::from_pounds(60);

        let err = factory.create_or_update(change).await.unwrap_err();
        assert!(matches!(err, EngineError::FinalizedGigImmutable(_)));
    }

    #[tokio::test]
    async fn batch_failure_leaves_no_dangling_references() {
        let store = Arc::new(InMemoryStore::new());
        let publisher = Arc::new(RecordingPublisher::new());
        let factory = factory(&store, &publisher);
        let venue_id = seeded_venue(&store).await;

        let mut submission = draft(venue_id);
        submission.recurrence = Some(Recurrence {
            rule: RepeatRule::Daily,
            end: EndCondition::after(3),
        });

        // Exhaust every retry attempt (initial + 2 retries) for the batch
        // insert. Lookups are unaffected by injection; the first mutating
        // op is the instance batch.
        store.fail_next_ops(3);

        let err = factory.create_or_update(submission).await.unwrap_err();
        assert!(err.is_transient());

        let venue = store.venue(venue_id).await.unwrap().unwrap();
        assert!(venue.gig_ids.is_empty());
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let store = Arc::new(InMemoryStore::new());
        let publisher = Arc::new(RecordingPublisher::new());
        let factory = factory(&store, &publisher);
        let venue_id = seeded_venue(&store).await;

        // The first attempt at the instance batch fails, the retry
        // succeeds.
        store.fail_next_ops(1);
        let outcome = factory.create_or_update(draft(venue_id)).await.unwrap();
        let SubmitOutcome::Created(gigs) = outcome else {
            panic!("expected creation");
        };
        assert_eq!(gigs.len(), 1);
        assert_eq!(store.gig_count(), 1);
    }

    #[tokio::test]
    async fn save_template_registers_against_venue() {
        let store = Arc::new(InMemoryStore::new());
        let publisher = Arc::new(RecordingPublisher::new());
        let factory = factory(&store, &publisher);
        let venue_id = seeded_venue(&store).await;

        let template = Template {
            id: crate::types::TemplateId::new(),
            venue_id,
            title: "Friday jazz".to_string(),
            start_time: NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
            duration_minutes: 120,
            private: false,
            recurrence: Some(Recurrence {
                rule: RepeatRule::Weekly,
                end: EndCondition::after(8),
            }),
            fee: Money::from_pounds(80),
            currency: Currency::Gbp,
        };

        factory.save_template(template.clone()).await.unwrap();

        let venue = store.venue(venue_id).await.unwrap().unwrap();
        assert!(venue.template_ids.contains(&template.id));
        assert_eq!(
            store.template(template.id).await.unwrap().unwrap().title,
            "Friday jazz"
        );
    }

}
