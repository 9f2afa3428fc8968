//! Domain types for the inventory ledger and booking records.
//!
//! Integer ids mirror the inventory schema (`SERIAL` keys); booking and hold
//! ids are UUIDs generated by the booking front-door.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::TicketError;

macro_rules! int_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i32);

        impl $name {
            /// Wrap a raw id.
            #[must_use]
            pub const fn new(id: i32) -> Self {
                Self(id)
            }

            /// The raw id.
            #[must_use]
            pub const fn value(&self) -> i32 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

int_id!(
    /// Event identifier.
    EventId
);
int_id!(
    /// Category identifier, unique across events.
    CategoryId
);
int_id!(
    /// Ticket (seat row) identifier.
    TicketId
);
int_id!(
    /// Purchasing user. Owned by an external identity service.
    UserId
);

/// Booking identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookingId(Uuid);

impl BookingId {
    /// Generate a fresh id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// The underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for BookingId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BookingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hold identifier.
///
/// One hold per booking attempt: the booking's attempt id and the
/// reservation's hold id are the same value, so a retried attempt finds the
/// reservation it already made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HoldId(Uuid);

impl HoldId {
    /// Generate a fresh id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// The underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for HoldId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for HoldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! labelled_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($(#[$vmeta:meta])* $variant:ident => $label:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            /// Database and log label.
            #[must_use]
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $label),+
                }
            }

            /// Parse a database label.
            ///
            /// # Errors
            ///
            /// Returns [`TicketError::Internal`] for an unknown label; labels are
            /// written by this crate, so an unknown one means a corrupted row.
            pub fn parse(label: &str) -> Result<Self, TicketError> {
                match label {
                    $($label => Ok(Self::$variant),)+
                    other => Err(TicketError::internal(format!(
                        "unknown {} label: {other}",
                        stringify!($name)
                    ))),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

labelled_enum!(
    /// Physical layout of a category.
    CategoryKind {
        /// Numbered seats.
        Seated => "SEATED",
        /// Floor / general admission.
        Standing => "STANDING",
    }
);

labelled_enum!(
    /// How inventory is tracked for a category.
    BookingKind {
        /// One ticket row per seat.
        Fixed => "FIXED",
        /// A single fungible counter.
        Flexible => "FLEXIBLE",
    }
);

labelled_enum!(
    /// Seat lifecycle.
    SeatStatus {
        /// Free to reserve.
        Available => "AVAILABLE",
        /// Held until `reserved_until`.
        Reserved => "RESERVED",
        /// Terminal.
        Sold => "SOLD",
    }
);

labelled_enum!(
    /// Booking lifecycle.
    BookingStatus {
        /// Inventory reserved, payment outstanding.
        Pending => "PENDING",
        /// Inventory sold.
        Confirmed => "CONFIRMED",
        /// Inventory released or lost to expiry.
        Cancelled => "CANCELLED",
    }
);

labelled_enum!(
    /// Stock hold lifecycle.
    StockHoldState {
        /// Counter decremented, awaiting confirm or release.
        Held => "HELD",
        /// Sold.
        Confirmed => "CONFIRMED",
        /// Returned by the holder.
        Released => "RELEASED",
        /// Returned by the reclaimer.
        Expired => "EXPIRED",
    }
);

/// Money in integer cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    /// Create from cents.
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Amount in cents.
    #[must_use]
    pub const fn cents(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

/// A ticket category within an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCategory {
    /// Category id
    pub id: CategoryId,
    /// Owning event
    pub event_id: EventId,
    /// Display name ("VIP", "General Admission")
    pub name: String,
    /// Seated or standing
    pub kind: CategoryKind,
    /// Fixed seats or flexible stock
    pub booking_kind: BookingKind,
    /// Unit price
    pub price: Money,
    /// Total capacity
    pub total: u32,
    /// Remaining stock. Only meaningful for [`BookingKind::Flexible`].
    pub available: u32,
}

impl EventCategory {
    /// A seated category with fixed seats. Capacity is the seat count.
    #[must_use]
    pub fn seated(
        id: CategoryId,
        event_id: EventId,
        name: impl Into<String>,
        price: Money,
        seats: u32,
    ) -> Self {
        Self {
            id,
            event_id,
            name: name.into(),
            kind: CategoryKind::Seated,
            booking_kind: BookingKind::Fixed,
            price,
            total: seats,
            available: seats,
        }
    }

    /// A standing category with a flexible stock pool.
    #[must_use]
    pub fn standing(
        id: CategoryId,
        event_id: EventId,
        name: impl Into<String>,
        price: Money,
        capacity: u32,
    ) -> Self {
        Self {
            id,
            event_id,
            name: name.into(),
            kind: CategoryKind::Standing,
            booking_kind: BookingKind::Flexible,
            price,
            total: capacity,
            available: capacity,
        }
    }

    /// Whether reservations in this category address a numbered seat.
    #[must_use]
    pub const fn is_seated(&self) -> bool {
        matches!(self.booking_kind, BookingKind::Fixed)
    }
}

/// One numbered seat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatTicket {
    /// Ticket id
    pub id: TicketId,
    /// Owning category
    pub category_id: CategoryId,
    /// Label, unique within the category ("VIP-7")
    pub seat_label: String,
    /// Lifecycle status
    pub status: SeatStatus,
    /// Hold expiry, set while reserved
    pub reserved_until: Option<DateTime<Utc>>,
    /// Owning hold, set while reserved or sold
    pub hold_id: Option<HoldId>,
}

impl SeatTicket {
    /// Whether a reservation may claim this seat at `now`.
    ///
    /// A reserved seat becomes claimable only once `reserved_until` is strictly
    /// before `now`.
    #[must_use]
    pub fn is_claimable(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            SeatStatus::Available => true,
            SeatStatus::Reserved => self.reserved_until.is_none_or(|until| until < now),
            SeatStatus::Sold => false,
        }
    }

    /// Whether the seat is reserved by `hold_id` and the hold has not lapsed.
    #[must_use]
    pub fn is_held_by(&self, hold_id: HoldId, now: DateTime<Utc>) -> bool {
        self.status == SeatStatus::Reserved
            && self.hold_id == Some(hold_id)
            && self.reserved_until.is_some_and(|until| until >= now)
    }
}

/// A reservation against a stock pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockHold {
    /// Hold id
    pub hold_id: HoldId,
    /// Pool the unit was taken from
    pub category_id: CategoryId,
    /// Lifecycle state
    pub state: StockHoldState,
    /// Hold expiry
    pub expires_at: DateTime<Utc>,
}

/// What a reservation holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HeldUnit {
    /// A numbered seat.
    Seat {
        /// Seat row id
        ticket_id: TicketId,
        /// Seat label
        seat_label: String,
    },
    /// One unit of a stock pool.
    Stock,
}

/// Handle to a held seat or stock unit, used to confirm or release it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationToken {
    /// Hold id, equal to the booking attempt id
    pub hold_id: HoldId,
    /// Event
    pub event_id: EventId,
    /// Category
    pub category_id: CategoryId,
    /// Held unit
    pub unit: HeldUnit,
    /// When the hold lapses
    pub expires_at: DateTime<Utc>,
}

impl ReservationToken {
    /// Seat label, for seat holds.
    #[must_use]
    pub fn seat_label(&self) -> Option<&str> {
        match &self.unit {
            HeldUnit::Seat { seat_label, .. } => Some(seat_label),
            HeldUnit::Stock => None,
        }
    }

    /// Ticket id, for seat holds.
    #[must_use]
    pub const fn ticket_id(&self) -> Option<TicketId> {
        match &self.unit {
            HeldUnit::Seat { ticket_id, .. } => Some(*ticket_id),
            HeldUnit::Stock => None,
        }
    }

    /// Label for logs and metrics: `seat` or `stock`.
    #[must_use]
    pub const fn kind_label(&self) -> &'static str {
        match self.unit {
            HeldUnit::Seat { .. } => "seat",
            HeldUnit::Stock => "stock",
        }
    }
}

/// Input to `validate_and_reserve`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveRequest {
    /// Hold id. Retrying with the same id returns the existing hold.
    pub hold_id: HoldId,
    /// Event the caller believes the category belongs to
    pub event_id: EventId,
    /// Category
    pub category_id: CategoryId,
    /// Seat label; required for seated categories, absent for standing ones
    pub seat_label: Option<String>,
}

impl ReserveRequest {
    /// Request a numbered seat.
    #[must_use]
    pub fn seated(
        hold_id: HoldId,
        event_id: EventId,
        category_id: CategoryId,
        seat_label: impl Into<String>,
    ) -> Self {
        Self {
            hold_id,
            event_id,
            category_id,
            seat_label: Some(seat_label.into()),
        }
    }

    /// Request one unit of a stock pool.
    #[must_use]
    pub const fn standing(hold_id: HoldId, event_id: EventId, category_id: CategoryId) -> Self {
        Self {
            hold_id,
            event_id,
            category_id,
            seat_label: None,
        }
    }
}

/// Availability snapshot of one category. Lapsed holds count as available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Availability {
    /// Capacity
    pub total: u32,
    /// Claimable now
    pub available: u32,
    /// Held and unexpired
    pub reserved: u32,
    /// Sold
    pub sold: u32,
}

/// Result of one reclaimer sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReclaimReport {
    /// Seats returned to available
    pub seats: u64,
    /// Stock holds expired and returned to their pools
    pub stock: u64,
}

impl ReclaimReport {
    /// Total units reclaimed.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.seats + self.stock
    }

    /// Whether nothing was reclaimed.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// A purchase attempt and its outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    /// Booking id
    pub id: BookingId,
    /// Attempt id, equal to the reservation's hold id
    pub attempt_id: HoldId,
    /// Event
    pub event_id: EventId,
    /// Category
    pub category_id: CategoryId,
    /// Seat row, for seated bookings
    pub ticket_id: Option<TicketId>,
    /// Seat label, for seated bookings
    pub seat_label: Option<String>,
    /// Purchaser
    pub user_id: UserId,
    /// Lifecycle status
    pub status: BookingStatus,
    /// Expiry of the underlying hold
    pub hold_expires_at: DateTime<Utc>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last status change
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// Rebuild the reservation token this booking was created from.
    #[must_use]
    pub fn reservation_token(&self) -> ReservationToken {
        let unit = match (self.ticket_id, &self.seat_label) {
            (Some(ticket_id), Some(seat_label)) => HeldUnit::Seat {
                ticket_id,
                seat_label: seat_label.clone(),
            },
            _ => HeldUnit::Stock,
        };
        ReservationToken {
            hold_id: self.attempt_id,
            event_id: self.event_id,
            category_id: self.category_id,
            unit,
            expires_at: self.hold_expires_at,
        }
    }
}

/// Fields for a new PENDING booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBooking {
    /// Attempt id
    pub attempt_id: HoldId,
    /// Event
    pub event_id: EventId,
    /// Category
    pub category_id: CategoryId,
    /// Seat row
    pub ticket_id: Option<TicketId>,
    /// Seat label
    pub seat_label: Option<String>,
    /// Purchaser
    pub user_id: UserId,
    /// Hold expiry
    pub hold_expires_at: DateTime<Utc>,
}

impl NewBooking {
    /// Booking fields embedding a reservation token.
    #[must_use]
    pub fn from_token(token: &ReservationToken, user_id: UserId) -> Self {
        Self {
            attempt_id: token.hold_id,
            event_id: token.event_id,
            category_id: token.category_id,
            ticket_id: token.ticket_id(),
            seat_label: token.seat_label().map(str::to_owned),
            user_id,
            hold_expires_at: token.expires_at,
        }
    }
}
