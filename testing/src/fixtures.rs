//! Reference categories and seat maps used across the test suites.

use chrono::{DateTime, TimeZone, Utc};
use ticket_tix_core::{CategoryId, EventCategory, EventId, HoldId, Money, ReserveRequest, UserId};

/// Event all fixtures belong to.
pub const EVENT: EventId = EventId::new(1);
/// Seated VIP category.
pub const VIP: CategoryId = CategoryId::new(10);
/// Standing general admission category.
pub const GA: CategoryId = CategoryId::new(20);
/// Default purchaser.
pub const USER: UserId = UserId::new(42);

/// Reference instant: 2025-01-01 00:00:00 UTC.
#[must_use]
pub fn t0() -> DateTime<Utc> {
    Utc.timestamp_opt(1_735_689_600, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Labels `{prefix}-1` through `{prefix}-{count}`.
#[must_use]
pub fn seat_labels(prefix: &str, count: u32) -> Vec<String> {
    (1..=count).map(|n| format!("{prefix}-{n}")).collect()
}

/// Seated VIP category of [`EVENT`]; capacity comes from the seats provisioned with it.
#[must_use]
pub fn vip_category() -> EventCategory {
    EventCategory::seated(VIP, EVENT, "VIP", Money::from_cents(15_000), 0)
}

/// Standing general admission category of [`EVENT`].
#[must_use]
pub fn ga_category(capacity: u32) -> EventCategory {
    EventCategory::standing(GA, EVENT, "General Admission", Money::from_cents(4_500), capacity)
}

/// Request for a VIP seat with a fresh hold.
#[must_use]
pub fn vip_request(seat_label: &str) -> ReserveRequest {
    ReserveRequest::seated(HoldId::new(), EVENT, VIP, seat_label)
}

/// Request for a GA unit with a fresh hold.
#[must_use]
pub fn ga_request() -> ReserveRequest {
    ReserveRequest::standing(HoldId::new(), EVENT, GA)
}
