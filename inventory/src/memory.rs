//! In-memory inventory ledger.
//!
//! The category map sits behind a `RwLock` that is only written during
//! provisioning. Every seat and every stock pool has its own `Mutex`; a
//! transition locks exactly one of them, so operations on different seats
//! or categories never contend.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use ticket_tix_core::{
    Availability, BookingKind, BoxFuture, CategoryId, CategoryKind, EventCategory, HoldId,
    ReclaimReport, Result, SeatStatus, SeatTicket, StockHold, StockHoldState, TicketError,
    TicketId,
};

use crate::ledger::{InventoryLedger, SeatClaim, StockOutcome};

#[derive(Debug)]
struct StockPool {
    available: u32,
    holds: HashMap<HoldId, StockHold>,
}

#[derive(Debug)]
struct CategoryEntry {
    category: EventCategory,
    seats: HashMap<String, Mutex<SeatTicket>>,
    pool: Mutex<StockPool>,
}

/// Ledger held entirely in process memory.
#[derive(Debug)]
pub struct InMemoryLedger {
    categories: RwLock<HashMap<CategoryId, Arc<CategoryEntry>>>,
    next_ticket_id: AtomicI32,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self {
            categories: RwLock::new(HashMap::new()),
            next_ticket_id: AtomicI32::new(1),
        }
    }

    /// Provision a seated category with one AVAILABLE seat per label.
    ///
    /// Capacity is taken from the number of labels.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the category is not `SEATED`/`FIXED`, the id is
    /// already provisioned, or a label is blank or repeated.
    pub async fn add_seated_category<I, S>(
        &self,
        mut category: EventCategory,
        seat_labels: I,
    ) -> Result<Vec<SeatTicket>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if category.kind != CategoryKind::Seated || category.booking_kind != BookingKind::Fixed {
            return Err(TicketError::invalid_argument(format!(
                "category {} must be SEATED/FIXED",
                category.id
            )));
        }

        let mut seats = HashMap::new();
        let mut created = Vec::new();
        for label in seat_labels {
            let label: String = label.into();
            if label.trim().is_empty() {
                return Err(TicketError::invalid_argument("seat label must not be blank"));
            }
            if seats.contains_key(&label) {
                return Err(TicketError::invalid_argument(format!(
                    "duplicate seat label {label} in category {}",
                    category.id
                )));
            }
            let seat = SeatTicket {
                id: TicketId::new(self.next_ticket_id.fetch_add(1, Ordering::Relaxed)),
                category_id: category.id,
                seat_label: label.clone(),
                status: SeatStatus::Available,
                reserved_until: None,
                hold_id: None,
            };
            created.push(seat.clone());
            seats.insert(label, Mutex::new(seat));
        }

        let count = u32::try_from(seats.len())
            .map_err(|_| TicketError::invalid_argument("too many seats"))?;
        category.total = count;
        category.available = count;

        self.insert(CategoryEntry {
            category,
            seats,
            pool: Mutex::new(StockPool {
                available: 0,
                holds: HashMap::new(),
            }),
        })
        .await?;
        Ok(created)
    }

    /// Provision a standing category whose pool starts full.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the category is not `STANDING`/`FLEXIBLE`, the id
    /// is already provisioned, or `available` exceeds `total`.
    pub async fn add_standing_category(&self, category: EventCategory) -> Result<()> {
        if category.kind != CategoryKind::Standing || category.booking_kind != BookingKind::Flexible
        {
            return Err(TicketError::invalid_argument(format!(
                "category {} must be STANDING/FLEXIBLE",
                category.id
            )));
        }
        if category.available > category.total {
            return Err(TicketError::invalid_argument(format!(
                "category {} available {} exceeds capacity {}",
                category.id, category.available, category.total
            )));
        }

        let available = category.available;
        self.insert(CategoryEntry {
            category,
            seats: HashMap::new(),
            pool: Mutex::new(StockPool {
                available,
                holds: HashMap::new(),
            }),
        })
        .await
    }

    async fn insert(&self, entry: CategoryEntry) -> Result<()> {
        let mut categories = self.categories.write().await;
        if categories.contains_key(&entry.category.id) {
            return Err(TicketError::invalid_argument(format!(
                "category {} already exists",
                entry.category.id
            )));
        }
        categories.insert(entry.category.id, Arc::new(entry));
        Ok(())
    }

    async fn entry(&self, id: CategoryId) -> Option<Arc<CategoryEntry>> {
        self.categories.read().await.get(&id).cloned()
    }

    async fn entries(&self) -> Vec<Arc<CategoryEntry>> {
        self.categories.read().await.values().cloned().collect()
    }
}

impl InventoryLedger for InMemoryLedger {
    fn category(&self, id: CategoryId) -> BoxFuture<'_, Result<Option<EventCategory>>> {
        Box::pin(async move {
            let Some(entry) = self.entry(id).await else {
                return Ok(None);
            };
            let mut category = entry.category.clone();
            if category.booking_kind == BookingKind::Flexible {
                category.available = entry.pool.lock().await.available;
            }
            Ok(Some(category))
        })
    }

    fn seat(
        &self,
        category_id: CategoryId,
        seat_label: &str,
    ) -> BoxFuture<'_, Result<Option<SeatTicket>>> {
        let seat_label = seat_label.to_owned();
        Box::pin(async move {
            let Some(entry) = self.entry(category_id).await else {
                return Ok(None);
            };
            match entry.seats.get(&seat_label) {
                Some(seat) => Ok(Some(seat.lock().await.clone())),
                None => Ok(None),
            }
        })
    }

    fn reserve_seat(&self, claim: SeatClaim) -> BoxFuture<'_, Result<Option<SeatTicket>>> {
        Box::pin(async move {
            let Some(entry) = self.entry(claim.category_id).await else {
                return Ok(None);
            };
            let Some(seat) = entry.seats.get(&claim.seat_label) else {
                return Ok(None);
            };

            let mut seat = seat.lock().await;
            if !seat.is_claimable(claim.now) {
                return Ok(None);
            }
            seat.status = SeatStatus::Reserved;
            seat.reserved_until = Some(claim.expires_at);
            seat.hold_id = Some(claim.hold_id);
            Ok(Some(seat.clone()))
        })
    }

    fn release_seat(
        &self,
        category_id: CategoryId,
        seat_label: &str,
        hold_id: HoldId,
    ) -> BoxFuture<'_, Result<bool>> {
        let seat_label = seat_label.to_owned();
        Box::pin(async move {
            let Some(entry) = self.entry(category_id).await else {
                return Ok(false);
            };
            let Some(seat) = entry.seats.get(&seat_label) else {
                return Ok(false);
            };

            let mut seat = seat.lock().await;
            if seat.status != SeatStatus::Reserved || seat.hold_id != Some(hold_id) {
                return Ok(false);
            }
            seat.status = SeatStatus::Available;
            seat.reserved_until = None;
            seat.hold_id = None;
            Ok(true)
        })
    }

    fn sell_seat(
        &self,
        category_id: CategoryId,
        seat_label: &str,
        hold_id: HoldId,
        now: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<bool>> {
        let seat_label = seat_label.to_owned();
        Box::pin(async move {
            let Some(entry) = self.entry(category_id).await else {
                return Ok(false);
            };
            let Some(seat) = entry.seats.get(&seat_label) else {
                return Ok(false);
            };

            let mut seat = seat.lock().await;
            if !seat.is_held_by(hold_id, now) {
                return Ok(false);
            }
            seat.status = SeatStatus::Sold;
            seat.reserved_until = None;
            Ok(true)
        })
    }

    fn take_stock(
        &self,
        category_id: CategoryId,
        hold_id: HoldId,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<StockOutcome>> {
        Box::pin(async move {
            let Some(entry) = self.entry(category_id).await else {
                return Err(TicketError::not_found(format!("category {category_id}")));
            };
            let mut pool = entry.pool.lock().await;

            if let Some(hold) = pool.holds.get_mut(&hold_id) {
                match hold.state {
                    StockHoldState::Held if hold.expires_at >= now => {
                        return Ok(StockOutcome::Existing(hold.clone()));
                    }
                    StockHoldState::Held => {
                        hold.expires_at = expires_at;
                        return Ok(StockOutcome::Taken(hold.clone()));
                    }
                    StockHoldState::Confirmed => {
                        return Ok(StockOutcome::Existing(hold.clone()));
                    }
                    StockHoldState::Released | StockHoldState::Expired => {}
                }
            }

            if pool.available == 0 {
                return Ok(StockOutcome::SoldOut);
            }
            pool.available -= 1;
            let hold = StockHold {
                hold_id,
                category_id,
                state: StockHoldState::Held,
                expires_at,
            };
            pool.holds.insert(hold_id, hold.clone());
            Ok(StockOutcome::Taken(hold))
        })
    }

    fn stock_hold(
        &self,
        category_id: CategoryId,
        hold_id: HoldId,
    ) -> BoxFuture<'_, Result<Option<StockHold>>> {
        Box::pin(async move {
            let Some(entry) = self.entry(category_id).await else {
                return Ok(None);
            };
            Ok(entry.pool.lock().await.holds.get(&hold_id).cloned())
        })
    }

    fn return_stock(&self, category_id: CategoryId, hold_id: HoldId) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move {
            let Some(entry) = self.entry(category_id).await else {
                return Ok(false);
            };
            let total = entry.category.total;
            let mut pool = entry.pool.lock().await;
            let pool = &mut *pool;

            let Some(hold) = pool.holds.get_mut(&hold_id) else {
                return Ok(false);
            };
            if hold.state != StockHoldState::Held {
                return Ok(false);
            }
            hold.state = StockHoldState::Released;
            pool.available = (pool.available + 1).min(total);
            Ok(true)
        })
    }

    fn settle_stock(
        &self,
        category_id: CategoryId,
        hold_id: HoldId,
        now: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move {
            let Some(entry) = self.entry(category_id).await else {
                return Ok(false);
            };
            let mut pool = entry.pool.lock().await;

            match pool.holds.get_mut(&hold_id) {
                Some(hold) if hold.state == StockHoldState::Held && hold.expires_at >= now => {
                    hold.state = StockHoldState::Confirmed;
                    Ok(true)
                }
                _ => Ok(false),
            }
        })
    }

    fn reclaim_expired(&self, now: DateTime<Utc>) -> BoxFuture<'_, Result<ReclaimReport>> {
        Box::pin(async move {
            let mut report = ReclaimReport::default();

            for entry in self.entries().await {
                for seat in entry.seats.values() {
                    let mut seat = seat.lock().await;
                    if seat.status == SeatStatus::Reserved
                        && seat.reserved_until.is_some_and(|until| until < now)
                    {
                        seat.status = SeatStatus::Available;
                        seat.reserved_until = None;
                        seat.hold_id = None;
                        report.seats += 1;
                    }
                }

                let total = entry.category.total;
                let mut pool = entry.pool.lock().await;
                let pool = &mut *pool;
                for hold in pool.holds.values_mut() {
                    if hold.state == StockHoldState::Held && hold.expires_at < now {
                        hold.state = StockHoldState::Expired;
                        pool.available = (pool.available + 1).min(total);
                        report.stock += 1;
                    }
                }
            }

            Ok(report)
        })
    }

    fn availability(
        &self,
        category_id: CategoryId,
        now: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<Option<Availability>>> {
        Box::pin(async move {
            let Some(entry) = self.entry(category_id).await else {
                return Ok(None);
            };
            let mut snapshot = Availability {
                total: entry.category.total,
                ..Availability::default()
            };

            match entry.category.kind {
                CategoryKind::Seated => {
                    for seat in entry.seats.values() {
                        let seat = seat.lock().await;
                        match seat.status {
                            SeatStatus::Sold => snapshot.sold += 1,
                            _ if seat.is_claimable(now) => snapshot.available += 1,
                            _ => snapshot.reserved += 1,
                        }
                    }
                }
                CategoryKind::Standing => {
                    let pool = entry.pool.lock().await;
                    snapshot.available = pool.available;
                    for hold in pool.holds.values() {
                        match hold.state {
                            StockHoldState::Held if hold.expires_at < now => {
                                snapshot.available += 1;
                            }
                            StockHoldState::Held => snapshot.reserved += 1,
                            StockHoldState::Confirmed => snapshot.sold += 1,
                            StockHoldState::Released | StockHoldState::Expired => {}
                        }
                    }
                }
            }

            Ok(Some(snapshot))
        })
    }
}
