//! Row shapes and their conversion into domain types.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use ticket_tix_core::{
    Booking, BookingId, BookingKind, BookingStatus, CategoryId, CategoryKind, EventCategory,
    EventId, HoldId, Money, Result, SeatStatus, SeatTicket, StockHold, StockHoldState, TicketError,
    TicketId, UserId,
};
use uuid::Uuid;

#[derive(Debug, FromRow)]
pub(crate) struct CategoryRow {
    pub id: i32,
    pub event_id: i32,
    pub name: String,
    pub kind: String,
    pub booking_kind: String,
    pub price_cents: i64,
    pub total: i32,
    pub available: i32,
}

impl TryFrom<CategoryRow> for EventCategory {
    type Error = TicketError;

    fn try_from(row: CategoryRow) -> Result<Self> {
        let price = u64::try_from(row.price_cents).map_err(|_| {
            TicketError::internal(format!("category {} has negative price", row.id))
        })?;
        Ok(Self {
            id: CategoryId::new(row.id),
            event_id: EventId::new(row.event_id),
            name: row.name,
            kind: CategoryKind::parse(&row.kind)?,
            booking_kind: BookingKind::parse(&row.booking_kind)?,
            price: Money::from_cents(price),
            total: crate::error::to_u32(row.total.into(), "total")?,
            available: crate::error::to_u32(row.available.into(), "available")?,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct SeatRow {
    pub id: i32,
    pub category_id: i32,
    pub seat_label: String,
    pub status: String,
    pub reserved_until: Option<DateTime<Utc>>,
    pub hold_id: Option<Uuid>,
}

impl TryFrom<SeatRow> for SeatTicket {
    type Error = TicketError;

    fn try_from(row: SeatRow) -> Result<Self> {
        Ok(Self {
            id: TicketId::new(row.id),
            category_id: CategoryId::new(row.category_id),
            seat_label: row.seat_label,
            status: SeatStatus::parse(&row.status)?,
            reserved_until: row.reserved_until,
            hold_id: row.hold_id.map(HoldId::from_uuid),
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct StockHoldRow {
    pub hold_id: Uuid,
    pub category_id: i32,
    pub state: String,
    pub expires_at: DateTime<Utc>,
}

impl TryFrom<StockHoldRow> for StockHold {
    type Error = TicketError;

    fn try_from(row: StockHoldRow) -> Result<Self> {
        Ok(Self {
            hold_id: HoldId::from_uuid(row.hold_id),
            category_id: CategoryId::new(row.category_id),
            state: StockHoldState::parse(&row.state)?,
            expires_at: row.expires_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct BookingRow {
    pub id: Uuid,
    pub attempt_id: Uuid,
    pub event_id: i32,
    pub category_id: i32,
    pub ticket_id: Option<i32>,
    pub seat_label: Option<String>,
    pub user_id: i32,
    pub status: String,
    pub hold_expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = TicketError;

    fn try_from(row: BookingRow) -> Result<Self> {
        Ok(Self {
            id: BookingId::from_uuid(row.id),
            attempt_id: HoldId::from_uuid(row.attempt_id),
            event_id: EventId::new(row.event_id),
            category_id: CategoryId::new(row.category_id),
            ticket_id: row.ticket_id.map(TicketId::new),
            seat_label: row.seat_label,
            user_id: UserId::new(row.user_id),
            status: BookingStatus::parse(&row.status)?,
            hold_expires_at: row.hold_expires_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
