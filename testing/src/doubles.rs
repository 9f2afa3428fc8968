//! Failure doubles for the booking store and the reservation protocol.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use ticket_tix_core::{
    Availability, Booking, BookingId, BookingStatus, BookingStore, BoxFuture, CategoryId, HoldId,
    NewBooking, ReservationProtocol, ReservationToken, ReserveRequest, Result, TicketError,
};

/// Booking store whose `create` always fails.
///
/// By default the failure is `Internal`. [`FailingBookingStore::racing`]
/// simulates losing a uniqueness race: `create` fails with `InvalidArgument`
/// and the winner's booking becomes visible to `find_by_attempt`.
#[derive(Debug)]
pub struct FailingBookingStore {
    error: TicketError,
    winner: Option<Booking>,
    visible: Mutex<HashMap<HoldId, Booking>>,
    create_calls: AtomicUsize,
}

impl Default for FailingBookingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FailingBookingStore {
    /// Store failing every insert with `Internal`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_error(TicketError::internal("booking database unavailable"))
    }

    /// Store failing every insert with `error`.
    #[must_use]
    pub fn with_error(error: TicketError) -> Self {
        Self {
            error,
            winner: None,
            visible: Mutex::new(HashMap::new()),
            create_calls: AtomicUsize::new(0),
        }
    }

    /// Store that loses the insert race to `winner`.
    #[must_use]
    pub fn racing(winner: Booking) -> Self {
        Self {
            error: TicketError::invalid_argument(format!(
                "booking for attempt {} already exists",
                winner.attempt_id
            )),
            winner: Some(winner),
            visible: Mutex::new(HashMap::new()),
            create_calls: AtomicUsize::new(0),
        }
    }

    /// Number of `create` calls seen.
    #[must_use]
    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    fn visible(&self) -> std::sync::MutexGuard<'_, HashMap<HoldId, Booking>> {
        self.visible.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl BookingStore for FailingBookingStore {
    fn create(&self, _booking: NewBooking) -> BoxFuture<'_, Result<Booking>> {
        Box::pin(async move {
            self.create_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(winner) = &self.winner {
                self.visible().insert(winner.attempt_id, winner.clone());
            }
            Err(self.error.clone())
        })
    }

    fn get(&self, id: BookingId) -> BoxFuture<'_, Result<Option<Booking>>> {
        Box::pin(async move { Ok(self.visible().values().find(|b| b.id == id).cloned()) })
    }

    fn find_by_attempt(&self, attempt_id: HoldId) -> BoxFuture<'_, Result<Option<Booking>>> {
        Box::pin(async move { Ok(self.visible().get(&attempt_id).cloned()) })
    }

    fn transition(
        &self,
        id: BookingId,
        _from: BookingStatus,
        _to: BookingStatus,
    ) -> BoxFuture<'_, Result<Booking>> {
        Box::pin(async move { Err(TicketError::not_found(format!("booking {id} not found"))) })
    }
}

/// Reservation protocol wrapper that fails the first `n` releases.
///
/// Every other call is forwarded to the wrapped protocol. Call counts are
/// recorded for assertions.
pub struct FlakyProtocol {
    inner: Arc<dyn ReservationProtocol>,
    release_failures: AtomicUsize,
    reserve_calls: AtomicUsize,
    release_calls: AtomicUsize,
}

impl FlakyProtocol {
    /// Wrap `inner` without injecting failures.
    #[must_use]
    pub fn new(inner: Arc<dyn ReservationProtocol>) -> Self {
        Self {
            inner,
            release_failures: AtomicUsize::new(0),
            reserve_calls: AtomicUsize::new(0),
            release_calls: AtomicUsize::new(0),
        }
    }

    /// Fail the next `n` releases with `Internal`.
    #[must_use]
    pub fn failing_releases(self, n: usize) -> Self {
        self.release_failures.store(n, Ordering::SeqCst);
        self
    }

    /// Number of `validate_and_reserve` calls seen.
    #[must_use]
    pub fn reserve_calls(&self) -> usize {
        self.reserve_calls.load(Ordering::SeqCst)
    }

    /// Number of `release` calls seen, failed or not.
    #[must_use]
    pub fn release_calls(&self) -> usize {
        self.release_calls.load(Ordering::SeqCst)
    }
}

impl ReservationProtocol for FlakyProtocol {
    fn validate_and_reserve(
        &self,
        request: ReserveRequest,
    ) -> BoxFuture<'_, Result<ReservationToken>> {
        self.reserve_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.validate_and_reserve(request)
    }

    fn release(&self, token: ReservationToken) -> BoxFuture<'_, Result<()>> {
        self.release_calls.fetch_add(1, Ordering::SeqCst);
        let injected = self
            .release_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            tracing::debug!(hold_id = %token.hold_id, "Injecting release failure");
            return Box::pin(async { Err(TicketError::internal("inventory service unreachable")) });
        }
        self.inner.release(token)
    }

    fn confirm_sold(&self, token: ReservationToken) -> BoxFuture<'_, Result<()>> {
        self.inner.confirm_sold(token)
    }

    fn availability(&self, category_id: CategoryId) -> BoxFuture<'_, Result<Availability>> {
        self.inner.availability(category_id)
    }
}
