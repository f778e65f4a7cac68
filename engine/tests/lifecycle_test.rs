//! End-to-end lifecycle tests over the full engine with in-memory
//! providers: escrow clearing, disputes, refunds, deletion, and recovery.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use callboard_core::environment::Clock;
use callboard_engine::mocks::{InMemoryStore, MockPaymentGateway, RecordingPublisher};
use callboard_engine::providers::MarketplaceStore;
use callboard_engine::state::{FeeStatus, GigDraft, PerformerProfile, VenueProfile};
use callboard_engine::types::{ChargeId, Currency, GigId, Money, PayoutAccount, PerformerId, VenueId};
use callboard_engine::{CancellationReason, Engine, EngineConfig, EngineError, SubmitOutcome};
use callboard_runtime::RetryPolicy;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use std::sync::{Arc, Mutex, PoisonError};

/// Settable clock, so tests can walk through the escrow window.
#[derive(Clone)]
struct SteppingClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl SteppingClock {
    fn starting_at(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct Harness {
    engine: Engine<InMemoryStore, MockPaymentGateway, RecordingPublisher>,
    store: Arc<InMemoryStore>,
    gateway: Arc<MockPaymentGateway>,
    publisher: Arc<RecordingPublisher>,
    clock: SteppingClock,
    venue_id: VenueId,
    performer_id: PerformerId,
}

/// 21 June 2025, 19:00–20:30 London (BST): performance ends 18:30 UTC.
fn performance_end() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 21, 18, 30, 0).single().unwrap()
}

async fn harness(clearing_window: Duration, connected_payout: bool) -> Harness {
    // RUST_LOG=debug surfaces the controller's tracing during a test run.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let store = Arc::new(InMemoryStore::new());
    let gateway = Arc::new(MockPaymentGateway::new());
    let publisher = Arc::new(RecordingPublisher::new());
    let clock = SteppingClock::starting_at(
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).single().unwrap(),
    );

    let config = EngineConfig::new()
        .with_clearing_window(clearing_window)
        .with_ack_timeout(std::time::Duration::from_secs(5))
        .with_retry(
            RetryPolicy::builder()
                .max_retries(2)
                .initial_delay(std::time::Duration::from_millis(1))
                .build(),
        );

    let engine = Engine::new(
        Arc::clone(&store),
        Arc::clone(&gateway),
        Arc::clone(&publisher),
        Arc::new(clock.clone()),
        config,
    );

    let venue = VenueProfile::new(VenueId::new(), "The Cellar");
    store.insert_venue(&venue).await.unwrap();

    let mut performer = PerformerProfile::new(PerformerId::new(), "Ada");
    if connected_payout {
        performer = performer.with_payout_destination(PayoutAccount::new("acct_ada"));
    }
    store.insert_performer(&performer).await.unwrap();

    Harness {
        engine,
        store,
        gateway,
        publisher,
        clock,
        venue_id: venue.id,
        performer_id: performer.id,
    }
}

fn draft(venue_id: VenueId) -> GigDraft {
    GigDraft {
        id: GigId::new(),
        venue_id,
        date: NaiveDate::from_ymd_opt(2025, 6, 21),
        start_time: NaiveTime::from_hms_opt(19, 0, 0).unwrap(),
        duration_minutes: 90,
        private: false,
        recurrence: None,
        fee: Money::from_pounds(50),
        currency: Currency::Gbp,
        complete: true,
    }
}

impl Harness {
    /// Submit one finalized gig and return its id.
    async fn posted_gig(&self) -> GigId {
        let outcome = self.engine.submit_draft(draft(self.venue_id)).await.unwrap();
        let SubmitOutcome::Created(gigs) = outcome else {
            panic!("expected creation");
        };
        gigs[0].id
    }

    /// Walk a posted gig to `fee_pending` at one hour past the performance.
    async fn fee_pending_gig(&self) -> GigId {
        let gig_id = self.posted_gig().await;
        self.engine
            .confirm_booking(
                gig_id,
                self.performer_id,
                Some((ChargeId::new("ch_1"), Money::from_pounds(50))),
            )
            .await
            .unwrap();

        self.clock.set(performance_end() + Duration::hours(1));
        self.engine.mark_performed(gig_id).await.unwrap();
        gig_id
    }

    /// Poll until the gig's fee record reaches `status`.
    async fn wait_for_fee_status(&self, gig_id: GigId, status: FeeStatus) {
        for _ in 0..200 {
            if let Some(record) = self.store.fee_record(gig_id).await.unwrap() {
                if record.status == status {
                    return;
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("fee record never reached {status:?}");
    }
}

#[tokio::test]
async fn scenario_fee_clears_exactly_once_under_concurrent_checks() {
    let h = harness(Duration::hours(48), true).await;
    let gig_id = h.fee_pending_gig().await;

    // The pending record carries the 48-hour deadline.
    let record = h.store.fee_record(gig_id).await.unwrap().unwrap();
    assert_eq!(record.status, FeeStatus::Pending);
    assert_eq!(record.clears_at, Some(performance_end() + Duration::hours(48)));
    assert_eq!(record.amount, Money::from_pounds(50));

    // Deadline passes; two clearing checks race. At least one observes the
    // release; the other either shares it or arrives after settlement and
    // is refused — never a second release.
    h.clock.set(performance_end() + Duration::hours(48) + Duration::seconds(1));
    let (a, b) = tokio::join!(h.engine.run_clearing(gig_id), h.engine.run_clearing(gig_id));
    assert!(a.is_ok() || b.is_ok());
    for outcome in [a, b] {
        if let Err(err) = outcome {
            assert!(err.is_conflict(), "unexpected failure: {err}");
        }
    }

    // Exactly one £50 transfer.
    let calls = h.gateway.transfer_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].amount, Money::from_pounds(50));
    assert_eq!(calls[0].destination, PayoutAccount::new("acct_ada"));

    // Ledger and gig agree, balances credited once.
    let record = h.store.fee_record(gig_id).await.unwrap().unwrap();
    assert_eq!(record.status, FeeStatus::Cleared);
    assert!(record.transfer_id.is_some());
    let gig = h.store.gig(gig_id).await.unwrap().unwrap();
    assert_eq!(gig.status.label(), "cleared");
    let performer = h.store.performer(h.performer_id).await.unwrap().unwrap();
    assert_eq!(performer.withdrawable, Money::from_pounds(50));
    assert_eq!(performer.total_earned, Money::from_pounds(50));

    assert_eq!(h.publisher.events_of_type("fee_cleared").len(), 1);

    // The controller's view agrees with storage.
    let (status_label, in_flight) = h
        .engine
        .settlement(|state| {
            let booking = state.booking(&gig_id).expect("tracked booking");
            (booking.status.label(), booking.clearing_in_flight)
        })
        .await;
    assert_eq!(status_label, "cleared");
    assert!(!in_flight);
}

#[tokio::test]
async fn scenario_dispute_at_47h_blocks_clearing_at_48h() {
    let h = harness(Duration::hours(48), true).await;
    let gig_id = h.fee_pending_gig().await;

    h.clock.set(performance_end() + Duration::hours(47));
    h.engine.report_dispute(gig_id).await.unwrap();

    let record = h.store.fee_record(gig_id).await.unwrap().unwrap();
    assert_eq!(record.status, FeeStatus::InDispute);
    assert_eq!(record.clears_at, None);
    assert_eq!(h.publisher.events_of_type("fee_disputed").len(), 1);

    // The deadline check must not clear a disputed fee.
    h.clock.set(performance_end() + Duration::hours(48) + Duration::seconds(1));
    let err = h.engine.run_clearing(gig_id).await.unwrap_err();
    assert!(err.is_conflict());

    assert!(h.gateway.transfer_calls().is_empty());
    let record = h.store.fee_record(gig_id).await.unwrap().unwrap();
    assert_eq!(record.status, FeeStatus::InDispute);
}

#[tokio::test]
async fn scenario_deleting_open_gig_leaves_no_trace() {
    let h = harness(Duration::hours(48), true).await;
    let gig_id = h.posted_gig().await;

    let venue = h.store.venue(h.venue_id).await.unwrap().unwrap();
    assert!(venue.gig_ids.contains(&gig_id));

    h.engine.delete_gig(gig_id).await.unwrap();

    let venue = h.store.venue(h.venue_id).await.unwrap().unwrap();
    assert!(venue.gig_ids.is_empty());
    assert!(h.store.gig(gig_id).await.unwrap().is_none());
    // No fee was ever recorded and no refund issued: no charge existed.
    assert_eq!(h.store.fee_record_count(), 0);
    assert!(h.gateway.refund_calls().is_empty());
}

#[tokio::test]
async fn deletion_is_refused_while_fee_is_held() {
    let h = harness(Duration::hours(48), true).await;
    let gig_id = h.fee_pending_gig().await;

    let err = h.engine.delete_gig(gig_id).await.unwrap_err();
    assert!(matches!(err, EngineError::Rejected { .. }));

    // Nothing was torn down.
    assert!(h.store.gig(gig_id).await.unwrap().is_some());
    let venue = h.store.venue(h.venue_id).await.unwrap().unwrap();
    assert!(venue.gig_ids.contains(&gig_id));
    assert_eq!(h.store.fee_record_count(), 1);
}

#[tokio::test]
async fn cancellation_after_confirmation_refunds_the_charge() {
    let h = harness(Duration::hours(48), true).await;
    let gig_id = h.posted_gig().await;
    h.engine
        .confirm_booking(
            gig_id,
            h.performer_id,
            Some((ChargeId::new("ch_42"), Money::from_pounds(50))),
        )
        .await
        .unwrap();

    h.engine
        .cancel_booking(gig_id, CancellationReason::VenueCancelled)
        .await
        .unwrap();

    let refunds = h.gateway.refund_calls();
    assert_eq!(refunds.len(), 1);
    assert_eq!(refunds[0].charge, ChargeId::new("ch_42"));

    let gig = h.store.gig(gig_id).await.unwrap().unwrap();
    assert_eq!(gig.status.label(), "refunded");
    assert_eq!(h.publisher.events_of_type("gig_refunded").len(), 1);
}

#[tokio::test]
async fn cancellation_before_confirmation_closes_without_refund() {
    let h = harness(Duration::hours(48), true).await;
    let gig_id = h.posted_gig().await;

    h.engine
        .cancel_booking(gig_id, CancellationReason::VenueCancelled)
        .await
        .unwrap();

    assert!(h.gateway.refund_calls().is_empty());
    let gig = h.store.gig(gig_id).await.unwrap().unwrap();
    assert_eq!(gig.status.label(), "closed");
}

#[tokio::test]
async fn scheduled_clearing_fires_on_its_own() {
    // A short escrow window so the deadline timer fires inside the test.
    let h = harness(Duration::milliseconds(50), true).await;
    let gig_id = h.posted_gig().await;
    h.engine
        .confirm_booking(
            gig_id,
            h.performer_id,
            Some((ChargeId::new("ch_1"), Money::from_pounds(50))),
        )
        .await
        .unwrap();

    h.clock.set(performance_end() + Duration::hours(1));
    h.engine.mark_performed(gig_id).await.unwrap();

    // No explicit clearing call: the timer drives the release.
    h.wait_for_fee_status(gig_id, FeeStatus::Cleared).await;
    assert_eq!(h.gateway.transfer_calls().len(), 1);
}

#[tokio::test]
async fn fee_clears_without_payout_destination() {
    let h = harness(Duration::hours(48), false).await;
    let gig_id = h.fee_pending_gig().await;

    h.clock.set(performance_end() + Duration::hours(49));
    h.engine.run_clearing(gig_id).await.unwrap();

    // No transfer, but the fee still clears and stays withdrawable.
    assert!(h.gateway.transfer_calls().is_empty());
    let record = h.store.fee_record(gig_id).await.unwrap().unwrap();
    assert_eq!(record.status, FeeStatus::Cleared);
    assert_eq!(record.transfer_id, None);
    let performer = h.store.performer(h.performer_id).await.unwrap().unwrap();
    assert_eq!(performer.withdrawable, Money::from_pounds(50));
}

#[tokio::test]
async fn clearing_retries_never_double_transfer() {
    let h = harness(Duration::hours(48), true).await;
    let gig_id = h.fee_pending_gig().await;

    // Every in-effect attempt fails (initial + 2 retries); the controller
    // reschedules, and the next round succeeds.
    h.gateway.fail_next_transfers(3);

    h.clock.set(performance_end() + Duration::hours(49));
    let first = h.engine.run_clearing(gig_id).await;
    assert!(first.is_err());

    h.wait_for_fee_status(gig_id, FeeStatus::Cleared).await;
    assert_eq!(h.gateway.transfer_calls().len(), 1);
    let performer = h.store.performer(h.performer_id).await.unwrap().unwrap();
    assert_eq!(performer.withdrawable, Money::from_pounds(50));
}

#[tokio::test]
async fn recovery_rearms_the_clearing_deadline() {
    let h = harness(Duration::hours(48), true).await;
    let gig_id = h.fee_pending_gig().await;

    // The first engine goes away; its timers are preempted but the
    // deadline survives on the fee record.
    h.engine.shutdown(std::time::Duration::from_secs(2)).await.unwrap();

    h.clock.set(performance_end() + Duration::hours(49));
    let successor = Engine::new(
        Arc::clone(&h.store),
        Arc::clone(&h.gateway),
        Arc::clone(&h.publisher),
        Arc::new(h.clock.clone()),
        EngineConfig::new().with_retry(
            RetryPolicy::builder()
                .max_retries(2)
                .initial_delay(std::time::Duration::from_millis(1))
                .build(),
        ),
    );

    let recovered = successor.recover().await.unwrap();
    assert!(recovered >= 1);

    // The overdue deadline fires immediately after re-arming.
    h.wait_for_fee_status(gig_id, FeeStatus::Cleared).await;
    assert_eq!(h.gateway.transfer_calls().len(), 1);
}

#[tokio::test]
async fn venue_removal_cancels_active_bookings() {
    let h = harness(Duration::hours(48), true).await;
    let gig_id = h.posted_gig().await;

    let dispatched = h.engine.handle_venue_removal(h.venue_id).await.unwrap();
    assert_eq!(dispatched, 1);

    // No charge existed, so the gig closes rather than refunds.
    for _ in 0..200 {
        let gig = h.store.gig(gig_id).await.unwrap().unwrap();
        if gig.status.label() == "closed" {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("gig never closed after venue removal");
}
