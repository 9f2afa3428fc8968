//! Booking saga state machine.
//!
//! The saga is a pure transition function: it consumes the outcome of the
//! last step ([`SagaEvent`]) and names the next step ([`SagaCommand`]). It
//! performs no I/O, so every path can be exercised without a ledger or a
//! store. [`BookingOrchestrator`](crate::BookingOrchestrator) executes the
//! commands.
//!
//! ```text
//! Validating ──► Reserving ──► Persisting ──► Committed
//!     │              │              │
//!     ▼              ▼              ▼
//!  Rejected       Rejected     Compensating ──► CompensatedOk
//!                                    └────────► CompensatedFailed
//! ```

use std::mem;

use ticket_tix_core::{Booking, HoldId, ReservationToken, Result, TicketError};

/// Where one booking attempt stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SagaState {
    /// Local checks and replay detection.
    Validating,
    /// Waiting on `validate_and_reserve`.
    Reserving,
    /// Inventory held; inserting the booking record.
    Persisting {
        /// Hold to compensate if the insert fails
        token: ReservationToken,
    },
    /// Booking stored (or replayed). Terminal.
    Committed,
    /// Insert failed; releasing the hold.
    Compensating {
        /// Hold being released
        token: ReservationToken,
        /// The insert failure returned to the caller
        cause: TicketError,
    },
    /// Hold released after a failed insert. Terminal.
    CompensatedOk,
    /// Hold could not be released; left to expire. Terminal.
    CompensatedFailed,
    /// Failed before any inventory was held. Terminal.
    Rejected,
}

impl SagaState {
    /// Short name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Validating => "validating",
            Self::Reserving => "reserving",
            Self::Persisting { .. } => "persisting",
            Self::Committed => "committed",
            Self::Compensating { .. } => "compensating",
            Self::CompensatedOk => "compensated_ok",
            Self::CompensatedFailed => "compensated_failed",
            Self::Rejected => "rejected",
        }
    }

    /// Whether no further step follows.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Committed | Self::CompensatedOk | Self::CompensatedFailed | Self::Rejected
        )
    }
}

/// Outcome of the step the saga last asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SagaEvent {
    /// Local checks passed and no booking exists for the attempt.
    Validated,
    /// A booking already exists for the attempt.
    Replayed(Booking),
    /// Local checks failed.
    Rejected(TicketError),
    /// Inventory held.
    Reserved(ReservationToken),
    /// `validate_and_reserve` failed.
    ReserveFailed(TicketError),
    /// Booking stored.
    Persisted(Booking),
    /// The insert lost a race to another request with the same attempt id.
    DuplicateAttempt(Booking),
    /// The insert failed.
    PersistFailed(TicketError),
    /// Compensating release succeeded.
    Released,
    /// Compensating release gave up.
    ReleaseFailed(TicketError),
}

impl SagaEvent {
    const fn name(&self) -> &'static str {
        match self {
            Self::Validated => "validated",
            Self::Replayed(_) => "replayed",
            Self::Rejected(_) => "rejected",
            Self::Reserved(_) => "reserved",
            Self::ReserveFailed(_) => "reserve_failed",
            Self::Persisted(_) => "persisted",
            Self::DuplicateAttempt(_) => "duplicate_attempt",
            Self::PersistFailed(_) => "persist_failed",
            Self::Released => "released",
            Self::ReleaseFailed(_) => "release_failed",
        }
    }
}

/// Next step for the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SagaCommand {
    /// Call `validate_and_reserve`.
    Reserve,
    /// Insert a PENDING booking for this hold.
    Persist(ReservationToken),
    /// Release this hold.
    Release(ReservationToken),
    /// Return this result to the caller.
    Complete(Result<Booking>),
}

/// State machine for one booking attempt.
#[derive(Debug, Clone)]
pub struct BookingSaga {
    attempt_id: HoldId,
    state: SagaState,
}

impl BookingSaga {
    /// Start an attempt in [`SagaState::Validating`].
    #[must_use]
    pub const fn new(attempt_id: HoldId) -> Self {
        Self {
            attempt_id,
            state: SagaState::Validating,
        }
    }

    /// The attempt this saga drives.
    #[must_use]
    pub const fn attempt_id(&self) -> HoldId {
        self.attempt_id
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> &SagaState {
        &self.state
    }

    /// Apply an event and return the next command.
    ///
    /// An event that does not fit the current state leaves the state
    /// untouched and completes with `Internal`.
    pub fn handle(&mut self, event: SagaEvent) -> SagaCommand {
        let state = mem::replace(&mut self.state, SagaState::Rejected);

        let (next, command) = match (state, event) {
            (SagaState::Validating, SagaEvent::Validated) => {
                (SagaState::Reserving, SagaCommand::Reserve)
            }
            (SagaState::Validating, SagaEvent::Replayed(booking)) => {
                (SagaState::Committed, SagaCommand::Complete(Ok(booking)))
            }
            (SagaState::Validating, SagaEvent::Rejected(err))
            | (SagaState::Reserving, SagaEvent::ReserveFailed(err)) => {
                (SagaState::Rejected, SagaCommand::Complete(Err(err)))
            }
            (SagaState::Reserving, SagaEvent::Reserved(token)) => (
                SagaState::Persisting {
                    token: token.clone(),
                },
                SagaCommand::Persist(token),
            ),
            (SagaState::Persisting { .. }, SagaEvent::Persisted(booking))
            | (SagaState::Persisting { .. }, SagaEvent::DuplicateAttempt(booking)) => {
                (SagaState::Committed, SagaCommand::Complete(Ok(booking)))
            }
            (SagaState::Persisting { token }, SagaEvent::PersistFailed(cause)) => (
                SagaState::Compensating {
                    token: token.clone(),
                    cause,
                },
                SagaCommand::Release(token),
            ),
            (SagaState::Compensating { cause, .. }, SagaEvent::Released) => {
                (SagaState::CompensatedOk, SagaCommand::Complete(Err(cause)))
            }
            (SagaState::Compensating { cause, .. }, SagaEvent::ReleaseFailed(_)) => (
                SagaState::CompensatedFailed,
                SagaCommand::Complete(Err(cause)),
            ),
            (state, event) => {
                let err = TicketError::internal(format!(
                    "booking saga {} received {} while {}",
                    self.attempt_id,
                    event.name(),
                    state.name()
                ));
                (state, SagaCommand::Complete(Err(err)))
            }
        };

        self.state = next;
        command
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use ticket_tix_core::{
        BookingId, BookingStatus, CategoryId, ErrorKind, EventId, HeldUnit, UserId,
    };

    fn token(attempt: HoldId) -> ReservationToken {
        ReservationToken {
            hold_id: attempt,
            event_id: EventId::new(1),
            category_id: CategoryId::new(20),
            unit: HeldUnit::Stock,
            expires_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 15, 0).unwrap(),
        }
    }

    fn booking(attempt: HoldId) -> Booking {
        let at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        Booking {
            id: BookingId::new(),
            attempt_id: attempt,
            event_id: EventId::new(1),
            category_id: CategoryId::new(20),
            ticket_id: None,
            seat_label: None,
            user_id: UserId::new(7),
            status: BookingStatus::Pending,
            hold_expires_at: at,
            created_at: at,
            updated_at: at,
        }
    }

    fn reserved_saga() -> (BookingSaga, ReservationToken) {
        let attempt = HoldId::new();
        let mut saga = BookingSaga::new(attempt);
        assert_eq!(saga.handle(SagaEvent::Validated), SagaCommand::Reserve);
        let token = token(attempt);
        assert_eq!(
            saga.handle(SagaEvent::Reserved(token.clone())),
            SagaCommand::Persist(token.clone())
        );
        (saga, token)
    }

    #[test]
    fn happy_path_commits() {
        let (mut saga, token) = reserved_saga();
        let booking = booking(token.hold_id);

        let command = saga.handle(SagaEvent::Persisted(booking.clone()));
        assert_eq!(command, SagaCommand::Complete(Ok(booking)));
        assert_eq!(saga.state(), &SagaState::Committed);
        assert!(saga.state().is_terminal());
    }

    #[test]
    fn replay_commits_without_reserving() {
        let attempt = HoldId::new();
        let mut saga = BookingSaga::new(attempt);
        let existing = booking(attempt);

        let command = saga.handle(SagaEvent::Replayed(existing.clone()));
        assert_eq!(command, SagaCommand::Complete(Ok(existing)));
        assert_eq!(saga.state(), &SagaState::Committed);
    }

    #[test]
    fn reserve_failure_is_returned_unchanged() {
        let mut saga = BookingSaga::new(HoldId::new());
        saga.handle(SagaEvent::Validated);

        let conflict = TicketError::conflict("seat VIP-7 is reserved");
        let command = saga.handle(SagaEvent::ReserveFailed(conflict.clone()));
        assert_eq!(command, SagaCommand::Complete(Err(conflict)));
        assert_eq!(saga.state(), &SagaState::Rejected);
    }

    #[test]
    fn persist_failure_compensates_then_returns_cause() {
        let (mut saga, token) = reserved_saga();
        let cause = TicketError::internal("insert timed out");

        let command = saga.handle(SagaEvent::PersistFailed(cause.clone()));
        assert_eq!(command, SagaCommand::Release(token));
        assert_eq!(saga.state().name(), "compensating");

        let command = saga.handle(SagaEvent::Released);
        assert_eq!(command, SagaCommand::Complete(Err(cause)));
        assert_eq!(saga.state(), &SagaState::CompensatedOk);
    }

    #[test]
    fn failed_release_does_not_mask_cause() {
        let (mut saga, _) = reserved_saga();
        let cause = TicketError::invalid_argument("unknown user");
        saga.handle(SagaEvent::PersistFailed(cause.clone()));

        let command = saga.handle(SagaEvent::ReleaseFailed(TicketError::internal("unreachable")));
        assert_eq!(command, SagaCommand::Complete(Err(cause)));
        assert_eq!(saga.state(), &SagaState::CompensatedFailed);
    }

    #[test]
    fn duplicate_attempt_commits_without_release() {
        let (mut saga, token) = reserved_saga();
        let winner = booking(token.hold_id);

        let command = saga.handle(SagaEvent::DuplicateAttempt(winner.clone()));
        assert_eq!(command, SagaCommand::Complete(Ok(winner)));
        assert_eq!(saga.state(), &SagaState::Committed);
    }

    #[test]
    fn out_of_order_event_is_internal_and_keeps_state() {
        let mut saga = BookingSaga::new(HoldId::new());

        let SagaCommand::Complete(Err(err)) = saga.handle(SagaEvent::Released) else {
            panic!("expected an internal error");
        };
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(saga.state(), &SagaState::Validating);
    }
}
