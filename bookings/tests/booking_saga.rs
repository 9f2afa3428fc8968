//! Integration tests for the booking orchestrator over the in-memory
//! inventory ledger and booking store.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use std::sync::Arc;
use std::time::Duration;

use ticket_tix_bookings::{BookingOrchestrator, BookingRequest, InMemoryBookingStore};
use ticket_tix_core::{
    Booking, BookingId, BookingStatus, BookingStore, Clock, ErrorKind, HoldId, ReservationProtocol,
    SeatStatus, TicketError, UserId,
};
use ticket_tix_inventory::{InMemoryLedger, InventoryLedger, InventoryService};
use ticket_tix_runtime::RetryPolicy;
use ticket_tix_testing::fixtures::{self, EVENT, GA, USER, VIP};
use ticket_tix_testing::{FailingBookingStore, FlakyProtocol, ManualClock};

// ============================================================================
// Test Fixtures
// ============================================================================

struct World {
    ledger: Arc<InMemoryLedger>,
    clock: ManualClock,
    protocol: Arc<FlakyProtocol>,
}

async fn world(release_failures: usize) -> World {
    ticket_tix_testing::init_tracing();
    let ledger = Arc::new(InMemoryLedger::new());
    ledger
        .add_seated_category(fixtures::vip_category(), fixtures::seat_labels("VIP", 10))
        .await
        .unwrap();
    ledger
        .add_standing_category(fixtures::ga_category(3))
        .await
        .unwrap();

    let clock = ManualClock::new(fixtures::t0());
    let service = InventoryService::new(
        Arc::clone(&ledger) as Arc<dyn InventoryLedger>,
        Arc::new(clock.clone()),
    );
    let protocol = Arc::new(FlakyProtocol::new(Arc::new(service)).failing_releases(release_failures));
    World {
        ledger,
        clock,
        protocol,
    }
}

fn fast_retries(max_retries: usize) -> RetryPolicy {
    RetryPolicy::builder()
        .max_retries(max_retries)
        .initial_delay(Duration::from_millis(1))
        .max_delay(Duration::from_millis(5))
        .build()
}

impl World {
    fn in_memory_store(&self) -> Arc<InMemoryBookingStore> {
        Arc::new(InMemoryBookingStore::new(Arc::new(self.clock.clone())))
    }

    fn orchestrator(&self, store: Arc<dyn BookingStore>) -> BookingOrchestrator {
        BookingOrchestrator::new(Arc::clone(&self.protocol) as Arc<dyn ReservationProtocol>, store)
            .with_compensation_policy(fast_retries(3))
    }

    async fn seat_status(&self, label: &str) -> SeatStatus {
        self.ledger.seat(VIP, label).await.unwrap().unwrap().status
    }
}

fn seat_request(label: &str) -> BookingRequest {
    BookingRequest::new(EVENT, VIP, Some(label.to_string()), USER)
}

fn standing_request() -> BookingRequest {
    BookingRequest::new(EVENT, GA, None, USER)
}

// ============================================================================
// create_booking
// ============================================================================

#[tokio::test]
async fn seat_booking_is_pending_and_holds_the_seat() {
    let w = world(0).await;
    let store = w.in_memory_store();
    let orchestrator = w.orchestrator(store.clone());

    let request = seat_request(" VIP-7 ");
    let booking = orchestrator.create_booking(request.clone()).await.unwrap();

    assert_eq!(booking.status, BookingStatus::Pending);
    assert_eq!(booking.attempt_id, request.attempt_id);
    assert_eq!(booking.seat_label.as_deref(), Some("VIP-7"));
    assert_eq!(booking.hold_expires_at, w.clock.now() + chrono::Duration::minutes(15));

    let seat = w.ledger.seat(VIP, "VIP-7").await.unwrap().unwrap();
    assert_eq!(seat.status, SeatStatus::Reserved);
    assert_eq!(seat.hold_id, Some(request.attempt_id));
    assert_eq!(booking.ticket_id, Some(seat.id));
}

#[tokio::test]
async fn standing_booking_takes_one_unit() {
    let w = world(0).await;
    let orchestrator = w.orchestrator(w.in_memory_store());

    let booking = orchestrator.create_booking(standing_request()).await.unwrap();

    assert_eq!(booking.seat_label, None);
    assert_eq!(booking.ticket_id, None);
    assert_eq!(w.protocol.availability(GA).await.unwrap().available, 2);
}

#[tokio::test]
async fn reservation_errors_propagate_without_a_booking() {
    let w = world(0).await;
    let store = w.in_memory_store();
    let orchestrator = w.orchestrator(store.clone());

    orchestrator.create_booking(seat_request("VIP-1")).await.unwrap();

    let cases = [
        (seat_request("VIP-1"), ErrorKind::Conflict),
        (seat_request("VIP-99"), ErrorKind::NotFound),
        (BookingRequest::new(EVENT, VIP, Some("   ".into()), USER), ErrorKind::InvalidArgument),
        (BookingRequest::new(EVENT, GA, Some("A-1".into()), USER), ErrorKind::InvalidArgument),
    ];
    for (request, kind) in cases {
        let err = orchestrator.create_booking(request).await.unwrap_err();
        assert_eq!(err.kind(), kind);
    }
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn non_positive_user_is_rejected_before_reserving() {
    let w = world(0).await;
    let orchestrator = w.orchestrator(w.in_memory_store());

    let request = BookingRequest::new(EVENT, VIP, Some("VIP-1".into()), UserId::new(0));
    let err = orchestrator.create_booking(request).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(w.protocol.reserve_calls(), 0);
}

#[tokio::test]
async fn sold_out_pool_is_a_conflict() {
    let w = world(0).await;
    let orchestrator = w.orchestrator(w.in_memory_store());

    for _ in 0..3 {
        orchestrator.create_booking(standing_request()).await.unwrap();
    }
    let err = orchestrator.create_booking(standing_request()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

// ============================================================================
// Idempotent retry
// ============================================================================

#[tokio::test]
async fn repeated_attempt_returns_same_booking_and_reserves_once() {
    let w = world(0).await;
    let orchestrator = w.orchestrator(w.in_memory_store());
    let request = standing_request();

    let first = orchestrator.create_booking(request.clone()).await.unwrap();
    let second = orchestrator.create_booking(request).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(w.protocol.reserve_calls(), 1);
    assert_eq!(w.protocol.availability(GA).await.unwrap().available, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_duplicates_share_one_booking_and_one_hold() {
    let w = world(0).await;
    let orchestrator = Arc::new(w.orchestrator(w.in_memory_store()));
    let request = standing_request();

    let tasks = (0..4).map(|_| {
        let orchestrator = Arc::clone(&orchestrator);
        let request = request.clone();
        tokio::spawn(async move { orchestrator.create_booking(request).await })
    });
    let bookings: Vec<Booking> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    assert!(bookings.iter().all(|b| b.id == bookings[0].id));
    assert_eq!(w.protocol.release_calls(), 0);
    let snapshot = w.protocol.availability(GA).await.unwrap();
    assert_eq!((snapshot.available, snapshot.reserved), (2, 1));
}

#[tokio::test]
async fn losing_the_insert_race_returns_the_winner_without_release() {
    let w = world(0).await;
    let attempt = HoldId::new();
    let request = seat_request("VIP-4").with_attempt_id(attempt);

    let winner = w
        .orchestrator(w.in_memory_store())
        .create_booking(request.clone())
        .await
        .unwrap();
    let racing = Arc::new(FailingBookingStore::racing(winner.clone()));
    let result = w.orchestrator(racing.clone()).create_booking(request).await.unwrap();

    assert_eq!(result, winner);
    assert_eq!(racing.create_calls(), 1);
    assert_eq!(w.protocol.release_calls(), 0);
    assert_eq!(w.seat_status("VIP-4").await, SeatStatus::Reserved);
}

// ============================================================================
// Compensation
// ============================================================================

#[tokio::test]
async fn failed_insert_releases_the_seat_and_returns_the_store_error() {
    let w = world(0).await;
    let store = Arc::new(FailingBookingStore::new());
    let orchestrator = w.orchestrator(store.clone());

    let err = orchestrator
        .create_booking(seat_request("VIP-2"))
        .await
        .unwrap_err();

    assert_eq!(err, TicketError::internal("booking database unavailable"));
    assert_eq!(w.seat_status("VIP-2").await, SeatStatus::Available);
    assert_eq!(w.protocol.release_calls(), 1);
}

#[tokio::test]
async fn failed_insert_returns_stock_to_the_pool() {
    let w = world(0).await;
    let orchestrator = w.orchestrator(Arc::new(FailingBookingStore::with_error(
        TicketError::invalid_argument("user 42 does not exist"),
    )));

    let err = orchestrator.create_booking(standing_request()).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(w.protocol.availability(GA).await.unwrap().available, 3);
}

#[tokio::test]
async fn transient_release_failures_are_retried() {
    let w = world(2).await;
    let orchestrator = w.orchestrator(Arc::new(FailingBookingStore::new()));

    orchestrator
        .create_booking(seat_request("VIP-3"))
        .await
        .unwrap_err();

    assert_eq!(w.protocol.release_calls(), 3);
    assert_eq!(w.seat_status("VIP-3").await, SeatStatus::Available);
}

#[tokio::test]
async fn exhausted_compensation_leaves_hold_for_the_reclaimer() {
    let w = world(10).await;
    let orchestrator = w.orchestrator(Arc::new(FailingBookingStore::new()));

    let err = orchestrator
        .create_booking(seat_request("VIP-5"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Internal);
    assert_eq!(err.message(), "booking database unavailable");
    assert_eq!(w.protocol.release_calls(), 4);
    assert_eq!(w.seat_status("VIP-5").await, SeatStatus::Reserved);

    w.clock.advance(chrono::Duration::minutes(16));
    let report = w.ledger.reclaim_expired(w.clock.now()).await.unwrap();
    assert_eq!(report.seats, 1);
    assert_eq!(w.seat_status("VIP-5").await, SeatStatus::Available);
}

// ============================================================================
// confirm_booking / cancel_booking
// ============================================================================

#[tokio::test]
async fn confirm_sells_the_seat() {
    let w = world(0).await;
    let orchestrator = w.orchestrator(w.in_memory_store());
    let booking = orchestrator.create_booking(seat_request("VIP-8")).await.unwrap();

    let confirmed = orchestrator.confirm_booking(booking.id).await.unwrap();
    assert_eq!(confirmed.status, BookingStatus::Confirmed);
    assert_eq!(w.seat_status("VIP-8").await, SeatStatus::Sold);

    let again = orchestrator.confirm_booking(booking.id).await.unwrap();
    assert_eq!(again.status, BookingStatus::Confirmed);
}

#[tokio::test]
async fn confirm_after_lapse_cancels_the_booking() {
    let w = world(0).await;
    let store = w.in_memory_store();
    let orchestrator = w.orchestrator(store.clone());
    let booking = orchestrator.create_booking(seat_request("VIP-9")).await.unwrap();

    w.clock.advance(chrono::Duration::minutes(15) + chrono::Duration::seconds(1));
    let err = orchestrator.confirm_booking(booking.id).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Conflict);
    let stored = store.get(booking.id).await.unwrap().unwrap();
    assert_eq!(stored.status, BookingStatus::Cancelled);
    assert_ne!(w.seat_status("VIP-9").await, SeatStatus::Sold);
}

#[tokio::test]
async fn cancel_releases_and_is_idempotent() {
    let w = world(0).await;
    let orchestrator = w.orchestrator(w.in_memory_store());
    let booking = orchestrator.create_booking(standing_request()).await.unwrap();

    let cancelled = orchestrator.cancel_booking(booking.id).await.unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);
    assert_eq!(w.protocol.availability(GA).await.unwrap().available, 3);

    let again = orchestrator.cancel_booking(booking.id).await.unwrap();
    assert_eq!(again.status, BookingStatus::Cancelled);
    assert_eq!(w.protocol.availability(GA).await.unwrap().available, 3);

    let err = orchestrator.confirm_booking(booking.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn confirmed_booking_cannot_be_cancelled() {
    let w = world(0).await;
    let orchestrator = w.orchestrator(w.in_memory_store());
    let booking = orchestrator.create_booking(standing_request()).await.unwrap();
    orchestrator.confirm_booking(booking.id).await.unwrap();

    let err = orchestrator.cancel_booking(booking.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(w.protocol.availability(GA).await.unwrap().sold, 1);
}

#[tokio::test]
async fn unknown_booking_is_not_found() {
    let w = world(0).await;
    let orchestrator = w.orchestrator(w.in_memory_store());

    for result in [
        orchestrator.confirm_booking(BookingId::new()).await,
        orchestrator.cancel_booking(BookingId::new()).await,
    ] {
        assert_eq!(result.unwrap_err().kind(), ErrorKind::NotFound);
    }
}
