//! PostgreSQL booking store.

use std::sync::Arc;

use sqlx::PgPool;
use ticket_tix_core::{
    Booking, BookingId, BookingStatus, BookingStore, BoxFuture, Clock, HoldId, NewBooking, Result,
    TicketError,
};

use crate::error::map_sqlx;
use crate::rows::BookingRow;

const BOOKING_COLUMNS: &str = "id, attempt_id, event_id, category_id, ticket_id, seat_label, \
     user_id, status, hold_expires_at, created_at, updated_at";

/// [`BookingStore`] backed by the booking database.
///
/// `attempt_id` is unique, so a second insert for the same attempt fails with
/// `InvalidArgument` and the caller can look up the winner.
#[derive(Clone)]
pub struct PostgresBookingStore {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl PostgresBookingStore {
    /// Create a store over an existing pool, stamping rows with `clock`.
    #[must_use]
    pub fn new(pool: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    async fn fetch_where(&self, column: &str, id: uuid::Uuid) -> Result<Option<Booking>> {
        sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE {column} = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?
        .map(Booking::try_from)
        .transpose()
    }
}

impl BookingStore for PostgresBookingStore {
    fn create(&self, booking: NewBooking) -> BoxFuture<'_, Result<Booking>> {
        Box::pin(async move {
            let now = self.clock.now();
            let row = sqlx::query_as::<_, BookingRow>(&format!(
                "INSERT INTO bookings ({BOOKING_COLUMNS})
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
                 RETURNING {BOOKING_COLUMNS}"
            ))
            .bind(BookingId::new().as_uuid())
            .bind(booking.attempt_id.as_uuid())
            .bind(booking.event_id.value())
            .bind(booking.category_id.value())
            .bind(booking.ticket_id.map(|id| id.value()))
            .bind(booking.seat_label)
            .bind(booking.user_id.value())
            .bind(BookingStatus::Pending.as_str())
            .bind(booking.hold_expires_at)
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx)?;

            let created = Booking::try_from(row)?;
            tracing::debug!(booking_id = %created.id, attempt_id = %created.attempt_id, "Booking inserted");
            Ok(created)
        })
    }

    fn get(&self, id: BookingId) -> BoxFuture<'_, Result<Option<Booking>>> {
        Box::pin(self.fetch_where("id", id.as_uuid()))
    }

    fn find_by_attempt(&self, attempt_id: HoldId) -> BoxFuture<'_, Result<Option<Booking>>> {
        Box::pin(self.fetch_where("attempt_id", attempt_id.as_uuid()))
    }

    fn transition(
        &self,
        id: BookingId,
        from: BookingStatus,
        to: BookingStatus,
    ) -> BoxFuture<'_, Result<Booking>> {
        Box::pin(async move {
            let row = sqlx::query_as::<_, BookingRow>(&format!(
                "UPDATE bookings SET status = $3, updated_at = $4
                 WHERE id = $1 AND status = $2
                 RETURNING {BOOKING_COLUMNS}"
            ))
            .bind(id.as_uuid())
            .bind(from.as_str())
            .bind(to.as_str())
            .bind(self.clock.now())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;

            if let Some(row) = row {
                return Booking::try_from(row);
            }

            match self.fetch_where("id", id.as_uuid()).await? {
                None => Err(TicketError::not_found(format!("booking {id} not found"))),
                Some(current) => Err(TicketError::conflict(format!(
                    "booking {id} is {}, expected {from}",
                    current.status
                ))),
            }
        })
    }
}
