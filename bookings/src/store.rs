//! In-memory booking store.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use ticket_tix_core::{
    Booking, BookingId, BookingStatus, BookingStore, BoxFuture, Clock, HoldId, NewBooking, Result,
    TicketError,
};

#[derive(Debug, Default)]
struct Records {
    bookings: HashMap<BookingId, Booking>,
    by_attempt: HashMap<HoldId, BookingId>,
}

/// Booking records held in process memory.
///
/// Enforces the same uniqueness rule as the `bookings` table: one booking per
/// attempt id.
pub struct InMemoryBookingStore {
    records: RwLock<Records>,
    clock: Arc<dyn Clock>,
}

impl InMemoryBookingStore {
    /// Create an empty store stamping records with `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: RwLock::new(Records::default()),
            clock,
        }
    }

    /// Number of stored bookings.
    pub async fn len(&self) -> usize {
        self.records.read().await.bookings.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl BookingStore for InMemoryBookingStore {
    fn create(&self, booking: NewBooking) -> BoxFuture<'_, Result<Booking>> {
        Box::pin(async move {
            let mut records = self.records.write().await;
            if records.by_attempt.contains_key(&booking.attempt_id) {
                return Err(TicketError::invalid_argument(format!(
                    "booking for attempt {} already exists",
                    booking.attempt_id
                )));
            }

            let now = self.clock.now();
            let record = Booking {
                id: BookingId::new(),
                attempt_id: booking.attempt_id,
                event_id: booking.event_id,
                category_id: booking.category_id,
                ticket_id: booking.ticket_id,
                seat_label: booking.seat_label,
                user_id: booking.user_id,
                status: BookingStatus::Pending,
                hold_expires_at: booking.hold_expires_at,
                created_at: now,
                updated_at: now,
            };
            records.by_attempt.insert(record.attempt_id, record.id);
            records.bookings.insert(record.id, record.clone());
            Ok(record)
        })
    }

    fn get(&self, id: BookingId) -> BoxFuture<'_, Result<Option<Booking>>> {
        Box::pin(async move { Ok(self.records.read().await.bookings.get(&id).cloned()) })
    }

    fn find_by_attempt(&self, attempt_id: HoldId) -> BoxFuture<'_, Result<Option<Booking>>> {
        Box::pin(async move {
            let records = self.records.read().await;
            Ok(records
                .by_attempt
                .get(&attempt_id)
                .and_then(|id| records.bookings.get(id))
                .cloned())
        })
    }

    fn transition(
        &self,
        id: BookingId,
        from: BookingStatus,
        to: BookingStatus,
    ) -> BoxFuture<'_, Result<Booking>> {
        Box::pin(async move {
            let now = self.clock.now();
            let mut records = self.records.write().await;
            let booking = records
                .bookings
                .get_mut(&id)
                .ok_or_else(|| TicketError::not_found(format!("booking {id} not found")))?;

            if booking.status != from {
                return Err(TicketError::conflict(format!(
                    "booking {id} is {}, expected {from}",
                    booking.status
                )));
            }
            booking.status = to;
            booking.updated_at = now;
            Ok(booking.clone())
        })
    }
}
