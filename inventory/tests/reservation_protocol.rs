//! Integration tests for the reservation protocol over the in-memory ledger.
//!
//! Covers concurrent contention on one seat and on one stock unit, hold
//! expiry boundaries, idempotent release and the no-oversell property.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use std::sync::Arc;

use chrono::Duration;
use futures::future::join_all;
use proptest::prelude::*;
use ticket_tix_core::{
    Clock, ErrorKind, HoldId, ReservationProtocol, ReservationToken, ReserveRequest, SeatStatus,
};
use ticket_tix_inventory::{InMemoryLedger, InventoryLedger, InventoryService};
use ticket_tix_testing::fixtures::{self, EVENT, GA, VIP};
use ticket_tix_testing::properties::{ReservationOp, reservation_ops};
use ticket_tix_testing::{FixedClock, ManualClock};

// ============================================================================
// Test Fixtures
// ============================================================================

struct Harness {
    ledger: Arc<InMemoryLedger>,
    clock: ManualClock,
    service: Arc<InventoryService>,
}

async fn harness(seats: u32, ga_capacity: u32) -> Harness {
    let ledger = Arc::new(InMemoryLedger::new());
    ledger
        .add_seated_category(fixtures::vip_category(), fixtures::seat_labels("VIP", seats))
        .await
        .unwrap();
    ledger
        .add_standing_category(fixtures::ga_category(ga_capacity))
        .await
        .unwrap();

    let clock = ManualClock::new(fixtures::t0());
    let service = Arc::new(InventoryService::new(
        Arc::clone(&ledger) as Arc<dyn InventoryLedger>,
        Arc::new(clock.clone()),
    ));
    Harness {
        ledger,
        clock,
        service,
    }
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_concurrent_reservations_for_vip_7_yield_one_token() {
    let h = harness(10, 0).await;

    let attempts = (0..2).map(|_| {
        let service = Arc::clone(&h.service);
        tokio::spawn(async move { service.validate_and_reserve(fixtures::vip_request("VIP-7")).await })
    });
    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let tokens = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(e) if e.kind() == ErrorKind::Conflict))
        .count();
    assert_eq!((tokens, conflicts), (1, 1));

    let seat = h.ledger.seat(VIP, "VIP-7").await.unwrap().unwrap();
    assert_eq!(seat.status, SeatStatus::Reserved);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn last_standing_unit_goes_to_exactly_one_caller() {
    let h = harness(0, 1).await;

    let attempts = (0..2).map(|_| {
        let service = Arc::clone(&h.service);
        tokio::spawn(async move { service.validate_and_reserve(fixtures::ga_request()).await })
    });
    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(
        results
            .iter()
            .any(|r| matches!(r, Err(e) if e.kind() == ErrorKind::Conflict))
    );

    let category = h.ledger.category(GA).await.unwrap().unwrap();
    assert_eq!(category.available, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn many_callers_never_oversell_a_pool() {
    let h = harness(0, 25).await;

    let attempts = (0..200).map(|_| {
        let service = Arc::clone(&h.service);
        tokio::spawn(async move { service.validate_and_reserve(fixtures::ga_request()).await })
    });
    let granted = join_all(attempts)
        .await
        .into_iter()
        .filter(|joined| matches!(joined, Ok(Ok(_))))
        .count();

    assert_eq!(granted, 25);
    let snapshot = h.service.availability(GA).await.unwrap();
    assert_eq!(snapshot.available, 0);
    assert_eq!(snapshot.reserved, 25);
}

// ============================================================================
// Expiry
// ============================================================================

#[tokio::test]
async fn unconfirmed_ga_3_can_be_reserved_again_after_expiry() {
    let h = harness(5, 0).await;

    h.service
        .validate_and_reserve(fixtures::vip_request("VIP-3"))
        .await
        .unwrap();
    h.clock.advance(Duration::minutes(15) + Duration::seconds(1));

    let token = h
        .service
        .validate_and_reserve(fixtures::vip_request("VIP-3"))
        .await
        .unwrap();
    assert_eq!(token.seat_label(), Some("VIP-3"));
}

#[tokio::test]
async fn hold_is_exclusive_up_to_and_including_its_expiry() {
    let h = harness(5, 0).await;
    let reserved_at = h.clock.now();
    h.service
        .validate_and_reserve(fixtures::vip_request("VIP-1"))
        .await
        .unwrap();

    for offset in [Duration::minutes(15) - Duration::milliseconds(1), Duration::minutes(15)] {
        h.clock.set(reserved_at + offset);
        let err = h
            .service
            .validate_and_reserve(fixtures::vip_request("VIP-1"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict, "offset {offset}");
    }

    h.clock.set(reserved_at + Duration::minutes(15) + Duration::milliseconds(1));
    assert!(
        h.service
            .validate_and_reserve(fixtures::vip_request("VIP-1"))
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn stale_token_cannot_release_or_confirm_a_new_hold() {
    let h = harness(5, 0).await;
    let stale = h
        .service
        .validate_and_reserve(fixtures::vip_request("VIP-2"))
        .await
        .unwrap();
    h.clock.advance(Duration::minutes(16));
    let fresh = h
        .service
        .validate_and_reserve(fixtures::vip_request("VIP-2"))
        .await
        .unwrap();

    h.service.release(stale.clone()).await.unwrap();
    let seat = h.ledger.seat(VIP, "VIP-2").await.unwrap().unwrap();
    assert_eq!(seat.hold_id, Some(fresh.hold_id));

    let err = h.service.confirm_sold(stale).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    h.service.confirm_sold(fresh).await.unwrap();
}

#[tokio::test]
async fn lapsed_hold_cannot_be_confirmed() {
    let h = harness(1, 1).await;
    let seat = h
        .service
        .validate_and_reserve(fixtures::vip_request("VIP-1"))
        .await
        .unwrap();
    let stock = h
        .service
        .validate_and_reserve(fixtures::ga_request())
        .await
        .unwrap();
    h.clock.advance(Duration::minutes(15) + Duration::seconds(1));

    for token in [seat, stock] {
        let err = h.service.confirm_sold(token).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }
}

// ============================================================================
// Release
// ============================================================================

#[tokio::test]
async fn releasing_twice_equals_releasing_once() {
    let h = harness(3, 3).await;
    let seat = h
        .service
        .validate_and_reserve(fixtures::vip_request("VIP-1"))
        .await
        .unwrap();
    let stock = h
        .service
        .validate_and_reserve(fixtures::ga_request())
        .await
        .unwrap();

    for token in [seat, stock] {
        h.service.release(token.clone()).await.unwrap();
        let once = h.service.availability(token.category_id).await.unwrap();
        h.service.release(token.clone()).await.unwrap();
        let twice = h.service.availability(token.category_id).await.unwrap();
        assert_eq!(once, twice);
        assert_eq!(twice.available, twice.total);
    }
}

#[tokio::test]
async fn released_hold_id_can_reserve_again() {
    let h = harness(0, 1).await;
    let hold = HoldId::new();
    let request = ReserveRequest::standing(hold, EVENT, GA);

    let token = h.service.validate_and_reserve(request.clone()).await.unwrap();
    h.service.release(token).await.unwrap();
    let again = h.service.validate_and_reserve(request).await.unwrap();

    assert_eq!(again.hold_id, hold);
    assert_eq!(h.service.availability(GA).await.unwrap().available, 0);
}

#[tokio::test]
async fn sold_seat_is_never_released() {
    let h = harness(1, 0).await;
    let token = h
        .service
        .validate_and_reserve(fixtures::vip_request("VIP-1"))
        .await
        .unwrap();
    h.service.confirm_sold(token.clone()).await.unwrap();
    h.service.release(token).await.unwrap();

    let seat = h.ledger.seat(VIP, "VIP-1").await.unwrap().unwrap();
    assert_eq!(seat.status, SeatStatus::Sold);
}

// ============================================================================
// No oversell
// ============================================================================

fn run_workload(ops: &[ReservationOp], capacity: u32) -> Result<(), TestCaseError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    runtime.block_on(async {
        let h = harness(capacity, capacity).await;
        let labels = fixtures::seat_labels("VIP", capacity);
        let mut live: Vec<ReservationToken> = Vec::new();

        for op in ops {
            match *op {
                ReservationOp::Reserve(client) => {
                    let request = if client % 2 == 0 {
                        fixtures::ga_request()
                    } else {
                        fixtures::vip_request(&labels[client % labels.len()])
                    };
                    if let Ok(token) = h.service.validate_and_reserve(request).await {
                        live.push(token);
                    }
                }
                ReservationOp::Release(n) if !live.is_empty() => {
                    let token = live.remove(n % live.len());
                    h.service.release(token).await.unwrap();
                }
                ReservationOp::Confirm(n) if !live.is_empty() => {
                    let token = live.remove(n % live.len());
                    let _ = h.service.confirm_sold(token).await;
                }
                ReservationOp::Advance(minutes) => {
                    h.clock.advance(Duration::minutes(i64::from(minutes)));
                    h.ledger.reclaim_expired(h.clock.now()).await.unwrap();
                }
                ReservationOp::Release(_) | ReservationOp::Confirm(_) => {}
            }

            for category in [VIP, GA] {
                let snapshot = h.service.availability(category).await.unwrap();
                prop_assert!(snapshot.sold <= snapshot.total);
                prop_assert_eq!(
                    snapshot.available + snapshot.reserved + snapshot.sold,
                    snapshot.total
                );
            }
            let pool = h.ledger.category(GA).await.unwrap().unwrap();
            prop_assert!(pool.available <= pool.total);
        }
        Ok(())
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn no_interleaving_oversells(ops in reservation_ops(60), capacity in 1u32..5) {
        run_workload(&ops, capacity)?;
    }
}

#[tokio::test]
async fn fixed_clock_hold_never_lapses() {
    let ledger = Arc::new(InMemoryLedger::new());
    ledger
        .add_seated_category(fixtures::vip_category(), ["VIP-1"])
        .await
        .unwrap();
    let service = InventoryService::new(ledger, Arc::new(FixedClock::new(fixtures::t0())));

    service
        .validate_and_reserve(fixtures::vip_request("VIP-1"))
        .await
        .unwrap();
    let err = service
        .validate_and_reserve(fixtures::vip_request("VIP-1"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
}
