//! Booking orchestrator: executes the booking saga against the reservation
//! protocol and the booking store.
//!
//! No lock or transaction spans the flow. Consistency across the two
//! services comes from the reservation hold (which expires on its own) and
//! the idempotent compensating release.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use ticket_tix_core::{
    Booking, BookingId, BookingStatus, BookingStore, CategoryId, ErrorKind, EventId, HoldId,
    NewBooking, ReservationProtocol, ReservationToken, ReserveRequest, Result, TicketError, UserId,
};
use ticket_tix_runtime::metrics::BookingMetrics;
use ticket_tix_runtime::retry::{RetryPolicy, retry_with_predicate};

use crate::saga::{BookingSaga, SagaCommand, SagaEvent, SagaState};

/// A caller's request to book one seat or one stock unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRequest {
    /// Idempotency key for this attempt; becomes the reservation's hold id
    pub attempt_id: HoldId,
    /// Event
    pub event_id: EventId,
    /// Category within the event
    pub category_id: CategoryId,
    /// Seat label for seated categories
    pub seat_label: Option<String>,
    /// Purchaser
    pub user_id: UserId,
}

impl BookingRequest {
    /// Request with a fresh attempt id.
    #[must_use]
    pub fn new(
        event_id: EventId,
        category_id: CategoryId,
        seat_label: Option<String>,
        user_id: UserId,
    ) -> Self {
        Self {
            attempt_id: HoldId::new(),
            event_id,
            category_id,
            seat_label,
            user_id,
        }
    }

    /// Reuse an attempt id, e.g. when the caller retries after a timeout.
    #[must_use]
    pub const fn with_attempt_id(mut self, attempt_id: HoldId) -> Self {
        self.attempt_id = attempt_id;
        self
    }

    fn normalized(mut self) -> Self {
        self.seat_label = self
            .seat_label
            .map(|label| label.trim().to_owned())
            .filter(|label| !label.is_empty());
        self
    }
}

/// Drives booking attempts through the saga.
///
/// # Example
///
/// ```ignore
/// let orchestrator = BookingOrchestrator::new(protocol, store)
///     .with_compensation_policy(RetryPolicy::builder().max_retries(3).build());
///
/// let booking = orchestrator
///     .create_booking(BookingRequest::new(event, category, Some("VIP-7".into()), user))
///     .await?;
/// ```
pub struct BookingOrchestrator {
    protocol: Arc<dyn ReservationProtocol>,
    store: Arc<dyn BookingStore>,
    compensation: RetryPolicy,
}

impl BookingOrchestrator {
    /// Create an orchestrator with the default compensation retry policy.
    #[must_use]
    pub fn new(protocol: Arc<dyn ReservationProtocol>, store: Arc<dyn BookingStore>) -> Self {
        Self {
            protocol,
            store,
            compensation: RetryPolicy::default(),
        }
    }

    /// Override the retry policy used for compensating releases.
    #[must_use]
    pub fn with_compensation_policy(mut self, policy: RetryPolicy) -> Self {
        self.compensation = policy;
        self
    }

    /// Reserve inventory and record a PENDING booking.
    ///
    /// Repeating a request with the same attempt id returns the booking the
    /// first request created.
    ///
    /// # Errors
    ///
    /// - Reservation errors, unchanged (`NotFound`, `InvalidArgument`, `Conflict`)
    /// - `InvalidArgument` for a non-positive user id
    /// - The store's error when the insert fails; the hold has then been
    ///   released, or left to expire if the release failed
    pub async fn create_booking(&self, request: BookingRequest) -> Result<Booking> {
        let request = request.normalized();
        let mut saga = BookingSaga::new(request.attempt_id);
        let mut command = saga.handle(self.validate(&request).await);

        loop {
            command = match command {
                SagaCommand::Reserve => saga.handle(self.reserve(&request).await),
                SagaCommand::Persist(token) => {
                    saga.handle(self.persist(&token, request.user_id).await)
                }
                SagaCommand::Release(token) => saga.handle(self.compensate(token).await),
                SagaCommand::Complete(result) => {
                    Self::record_outcome(&saga, &result);
                    return result;
                }
            };
        }
    }

    /// Mark a PENDING booking's inventory sold and the booking CONFIRMED.
    ///
    /// Confirming an already CONFIRMED booking returns it unchanged.
    ///
    /// # Errors
    ///
    /// - `NotFound` for an unknown booking
    /// - `Conflict` if the booking is CANCELLED, or if the hold lapsed or was
    ///   released; the booking is then marked CANCELLED
    pub async fn confirm_booking(&self, booking_id: BookingId) -> Result<Booking> {
        let booking = self.load(booking_id).await?;
        match booking.status {
            BookingStatus::Confirmed => return Ok(booking),
            BookingStatus::Cancelled => {
                return Err(TicketError::conflict(format!(
                    "booking {booking_id} is cancelled"
                )));
            }
            BookingStatus::Pending => {}
        }

        match self.protocol.confirm_sold(booking.reservation_token()).await {
            Ok(()) => {
                let confirmed = self
                    .settle(booking_id, BookingStatus::Pending, BookingStatus::Confirmed)
                    .await?;
                BookingMetrics::record_status(BookingStatus::Confirmed);
                tracing::info!(
                    booking_id = %booking_id,
                    attempt_id = %booking.attempt_id,
                    "Booking confirmed"
                );
                Ok(confirmed)
            }
            Err(err) if err.kind() == ErrorKind::Conflict => {
                tracing::warn!(
                    booking_id = %booking_id,
                    attempt_id = %booking.attempt_id,
                    error = %err,
                    "Hold no longer valid, cancelling booking"
                );
                match self
                    .settle(booking_id, BookingStatus::Pending, BookingStatus::Cancelled)
                    .await
                {
                    Ok(_) => BookingMetrics::record_status(BookingStatus::Cancelled),
                    Err(e) => tracing::error!(
                        booking_id = %booking_id,
                        error = %e,
                        "Failed to cancel booking after lost hold"
                    ),
                }
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Release a PENDING booking's hold and mark it CANCELLED.
    ///
    /// Cancelling an already CANCELLED booking returns it unchanged.
    ///
    /// # Errors
    ///
    /// - `NotFound` for an unknown booking
    /// - `Conflict` for a CONFIRMED booking
    /// - The release error if the hold could not be released; the booking
    ///   stays PENDING
    pub async fn cancel_booking(&self, booking_id: BookingId) -> Result<Booking> {
        let booking = self.load(booking_id).await?;
        match booking.status {
            BookingStatus::Cancelled => return Ok(booking),
            BookingStatus::Confirmed => {
                return Err(TicketError::conflict(format!(
                    "booking {booking_id} is already confirmed"
                )));
            }
            BookingStatus::Pending => {}
        }

        let token = booking.reservation_token();
        retry_with_predicate(
            &self.compensation,
            || self.protocol.release(token.clone()),
            is_transient,
        )
        .await?;

        let cancelled = self
            .settle(booking_id, BookingStatus::Pending, BookingStatus::Cancelled)
            .await?;
        BookingMetrics::record_status(BookingStatus::Cancelled);
        tracing::info!(
            booking_id = %booking_id,
            attempt_id = %booking.attempt_id,
            "Booking cancelled"
        );
        Ok(cancelled)
    }

    async fn validate(&self, request: &BookingRequest) -> SagaEvent {
        if request.user_id.value() <= 0 {
            return SagaEvent::Rejected(TicketError::invalid_argument(format!(
                "invalid user id {}",
                request.user_id
            )));
        }

        match self.store.find_by_attempt(request.attempt_id).await {
            Ok(Some(existing)) => {
                tracing::debug!(
                    attempt_id = %request.attempt_id,
                    booking_id = %existing.id,
                    "Replaying existing booking"
                );
                SagaEvent::Replayed(existing)
            }
            Ok(None) => SagaEvent::Validated,
            Err(err) => SagaEvent::Rejected(err),
        }
    }

    async fn reserve(&self, request: &BookingRequest) -> SagaEvent {
        let reservation = ReserveRequest {
            hold_id: request.attempt_id,
            event_id: request.event_id,
            category_id: request.category_id,
            seat_label: request.seat_label.clone(),
        };
        match self.protocol.validate_and_reserve(reservation).await {
            Ok(token) => SagaEvent::Reserved(token),
            Err(err) => {
                tracing::debug!(
                    attempt_id = %request.attempt_id,
                    error = %err,
                    "Reservation refused"
                );
                SagaEvent::ReserveFailed(err)
            }
        }
    }

    async fn persist(&self, token: &ReservationToken, user_id: UserId) -> SagaEvent {
        match self.store.create(NewBooking::from_token(token, user_id)).await {
            Ok(booking) => SagaEvent::Persisted(booking),
            Err(err) if err.kind() == ErrorKind::InvalidArgument => {
                match self.store.find_by_attempt(token.hold_id).await {
                    Ok(Some(existing)) => {
                        tracing::info!(
                            attempt_id = %token.hold_id,
                            booking_id = %existing.id,
                            "Concurrent request already stored this attempt"
                        );
                        SagaEvent::DuplicateAttempt(existing)
                    }
                    _ => SagaEvent::PersistFailed(err),
                }
            }
            Err(err) => SagaEvent::PersistFailed(err),
        }
    }

    async fn compensate(&self, token: ReservationToken) -> SagaEvent {
        tracing::warn!(
            hold_id = %token.hold_id,
            kind = token.kind_label(),
            "Booking insert failed, releasing hold"
        );
        let result = retry_with_predicate(
            &self.compensation,
            || self.protocol.release(token.clone()),
            is_transient,
        )
        .await;

        match result {
            Ok(()) => {
                BookingMetrics::record_compensated();
                SagaEvent::Released
            }
            Err(err) => {
                BookingMetrics::record_compensation_failed();
                tracing::error!(
                    hold_id = %token.hold_id,
                    category_id = %token.category_id,
                    expires_at = %token.expires_at,
                    error = %err,
                    "Compensating release failed; hold will be reclaimed on expiry"
                );
                SagaEvent::ReleaseFailed(err)
            }
        }
    }

    async fn load(&self, booking_id: BookingId) -> Result<Booking> {
        self.store
            .get(booking_id)
            .await?
            .ok_or_else(|| TicketError::not_found(format!("booking {booking_id} not found")))
    }

    /// Conditional status change, retried on transient store errors. A
    /// `Conflict` whose booking already reached `to` counts as success.
    async fn settle(
        &self,
        booking_id: BookingId,
        from: BookingStatus,
        to: BookingStatus,
    ) -> Result<Booking> {
        let result = retry_with_predicate(
            &self.compensation,
            || self.store.transition(booking_id, from, to),
            is_transient,
        )
        .await;

        match result {
            Err(err) if err.kind() == ErrorKind::Conflict => match self.load(booking_id).await? {
                booking if booking.status == to => Ok(booking),
                _ => Err(err),
            },
            other => other,
        }
    }

    fn record_outcome(saga: &BookingSaga, result: &Result<Booking>) {
        match (saga.state(), result) {
            (SagaState::Committed, Ok(booking)) => {
                BookingMetrics::record_status(booking.status);
                tracing::info!(
                    attempt_id = %saga.attempt_id(),
                    booking_id = %booking.id,
                    status = %booking.status,
                    "Booking committed"
                );
            }
            (state, Err(err)) if err.kind() == ErrorKind::Conflict => {
                tracing::warn!(
                    attempt_id = %saga.attempt_id(),
                    saga_state = state.name(),
                    error = %err,
                    "Booking rejected"
                );
            }
            (state, Err(err)) => {
                tracing::info!(
                    attempt_id = %saga.attempt_id(),
                    saga_state = state.name(),
                    error = %err,
                    "Booking failed"
                );
            }
            (state, Ok(_)) => {
                tracing::debug!(saga_state = state.name(), "Booking saga completed");
            }
        }
    }
}

fn is_transient(err: &TicketError) -> bool {
    err.kind() == ErrorKind::Internal
}
