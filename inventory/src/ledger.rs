//! Atomic primitives over the inventory ledger.
//!
//! Each method is one conditional transition on a single seat row or a
//! single category counter (plus its stock hold row). A transition whose
//! precondition does not hold reports that instead of failing; the
//! reservation protocol decides which error, if any, the caller sees.

use chrono::{DateTime, Utc};
use ticket_tix_core::{
    Availability, BoxFuture, CategoryId, EventCategory, HoldId, ReclaimReport, Result, SeatTicket,
    StockHold,
};

/// A request to move a seat into RESERVED for `hold_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeatClaim {
    /// Category holding the seat
    pub category_id: CategoryId,
    /// Seat label
    pub seat_label: String,
    /// Claiming hold
    pub hold_id: HoldId,
    /// Time the claim is evaluated at
    pub now: DateTime<Utc>,
    /// New `reserved_until`
    pub expires_at: DateTime<Utc>,
}

/// Outcome of [`InventoryLedger::take_stock`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StockOutcome {
    /// A unit was taken (or a lapsed hold with this id was renewed).
    Taken(StockHold),
    /// A live or confirmed hold with this id already exists; nothing changed.
    Existing(StockHold),
    /// The pool is empty.
    SoldOut,
}

/// Storage for seats, stock pools and stock holds.
pub trait InventoryLedger: Send + Sync {
    /// Look up a category.
    ///
    /// # Errors
    ///
    /// Storage failures only.
    fn category(&self, id: CategoryId) -> BoxFuture<'_, Result<Option<EventCategory>>>;

    /// Look up a seat by label.
    ///
    /// # Errors
    ///
    /// Storage failures only.
    fn seat(&self, category_id: CategoryId, seat_label: &str)
    -> BoxFuture<'_, Result<Option<SeatTicket>>>;

    /// AVAILABLE, or RESERVED with `reserved_until < now`, becomes RESERVED by
    /// the claim's hold. Returns the updated seat, or `None` when the seat is
    /// missing or not claimable.
    ///
    /// # Errors
    ///
    /// Storage failures only.
    fn reserve_seat(&self, claim: SeatClaim) -> BoxFuture<'_, Result<Option<SeatTicket>>>;

    /// RESERVED by `hold_id` becomes AVAILABLE. Returns whether it changed.
    ///
    /// # Errors
    ///
    /// Storage failures only.
    fn release_seat(
        &self,
        category_id: CategoryId,
        seat_label: &str,
        hold_id: HoldId,
    ) -> BoxFuture<'_, Result<bool>>;

    /// RESERVED by `hold_id` with `reserved_until >= now` becomes SOLD.
    /// Returns whether it changed.
    ///
    /// # Errors
    ///
    /// Storage failures only.
    fn sell_seat(
        &self,
        category_id: CategoryId,
        seat_label: &str,
        hold_id: HoldId,
        now: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<bool>>;

    /// Take one unit from a stock pool for `hold_id`, recording a HELD stock
    /// hold in the same atomic unit.
    ///
    /// A hold id that is already HELD and unexpired, or CONFIRMED, is
    /// reported as [`StockOutcome::Existing`]. A lapsed HELD hold is renewed
    /// without touching the counter. A RELEASED or EXPIRED hold takes a fresh
    /// unit.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown category, otherwise storage failures.
    fn take_stock(
        &self,
        category_id: CategoryId,
        hold_id: HoldId,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<StockOutcome>>;

    /// Look up a stock hold.
    ///
    /// # Errors
    ///
    /// Storage failures only.
    fn stock_hold(
        &self,
        category_id: CategoryId,
        hold_id: HoldId,
    ) -> BoxFuture<'_, Result<Option<StockHold>>>;

    /// HELD becomes RELEASED and the counter is incremented, capped at
    /// capacity. Returns whether it changed.
    ///
    /// # Errors
    ///
    /// Storage failures only.
    fn return_stock(&self, category_id: CategoryId, hold_id: HoldId) -> BoxFuture<'_, Result<bool>>;

    /// HELD with `expires_at >= now` becomes CONFIRMED. The counter is not
    /// touched. Returns whether it changed.
    ///
    /// # Errors
    ///
    /// Storage failures only.
    fn settle_stock(
        &self,
        category_id: CategoryId,
        hold_id: HoldId,
        now: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<bool>>;

    /// Return every lapsed hold to availability: RESERVED seats with
    /// `reserved_until < now` become AVAILABLE, HELD stock holds with
    /// `expires_at < now` become EXPIRED and give their unit back.
    ///
    /// # Errors
    ///
    /// Storage failures only.
    fn reclaim_expired(&self, now: DateTime<Utc>) -> BoxFuture<'_, Result<ReclaimReport>>;

    /// Availability snapshot, counting lapsed holds as available. `None` for an
    /// unknown category.
    ///
    /// # Errors
    ///
    /// Storage failures only.
    fn availability(
        &self,
        category_id: CategoryId,
        now: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<Option<Availability>>>;
}
