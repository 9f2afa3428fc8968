//! Service seams between the booking front-door and the inventory authority.
//!
//! Both traits are object safe and return boxed futures so that an
//! implementation can live in-process, behind a database, or behind a
//! network client.

use std::future::Future;
use std::pin::Pin;

use crate::error::Result;
use crate::types::{
    Availability, Booking, BookingId, BookingStatus, CategoryId, HoldId, NewBooking,
    ReservationToken, ReserveRequest,
};

/// Boxed, sendable future returned by trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Atomic check-and-transition operations over the inventory ledger.
///
/// Every operation is atomic with respect to concurrent callers on the same
/// seat row or category counter.
pub trait ReservationProtocol: Send + Sync {
    /// Validate a request and hold one seat or stock unit.
    ///
    /// Retrying with the same hold id returns the existing hold without
    /// taking a second unit.
    ///
    /// # Errors
    ///
    /// - [`TicketError::NotFound`](crate::TicketError::NotFound): unknown category or seat
    /// - [`TicketError::InvalidArgument`](crate::TicketError::InvalidArgument): seat label
    ///   missing for a seated category or present for a standing one, or the
    ///   category belongs to another event
    /// - [`TicketError::Conflict`](crate::TicketError::Conflict): seat held or sold, pool empty
    fn validate_and_reserve(&self, request: ReserveRequest) -> BoxFuture<'_, Result<ReservationToken>>;

    /// Return a held unit to availability. Idempotent: releasing a hold that
    /// is no longer held is a no-op.
    ///
    /// # Errors
    ///
    /// Storage failures only.
    fn release(&self, token: ReservationToken) -> BoxFuture<'_, Result<()>>;

    /// Mark a held unit sold.
    ///
    /// # Errors
    ///
    /// [`TicketError::Conflict`](crate::TicketError::Conflict) if the hold lapsed, was
    /// released, or belongs to someone else.
    fn confirm_sold(&self, token: ReservationToken) -> BoxFuture<'_, Result<()>>;

    /// Read-only availability snapshot of a category.
    ///
    /// # Errors
    ///
    /// [`TicketError::NotFound`](crate::TicketError::NotFound) for an unknown category.
    fn availability(&self, category_id: CategoryId) -> BoxFuture<'_, Result<Availability>>;
}

/// Durable booking records.
pub trait BookingStore: Send + Sync {
    /// Insert a PENDING booking.
    ///
    /// # Errors
    ///
    /// [`TicketError::InvalidArgument`](crate::TicketError::InvalidArgument) when the attempt
    /// id already has a booking or a reference is invalid; `Internal` otherwise.
    fn create(&self, booking: NewBooking) -> BoxFuture<'_, Result<Booking>>;

    /// Fetch a booking by id.
    ///
    /// # Errors
    ///
    /// Storage failures only.
    fn get(&self, id: BookingId) -> BoxFuture<'_, Result<Option<Booking>>>;

    /// Fetch the booking created for an attempt.
    ///
    /// # Errors
    ///
    /// Storage failures only.
    fn find_by_attempt(&self, attempt_id: HoldId) -> BoxFuture<'_, Result<Option<Booking>>>;

    /// Move a booking from `from` to `to`.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id, `Conflict` when the current status is not `from`.
    fn transition(
        &self,
        id: BookingId,
        from: BookingStatus,
        to: BookingStatus,
    ) -> BoxFuture<'_, Result<Booking>>;
}
