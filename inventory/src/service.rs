//! Reservation protocol over an [`InventoryLedger`].
//!
//! The service validates requests against the category, then performs one
//! conditional ledger transition. When a transition's precondition fails it
//! reads the row back to tell the caller why.

use std::sync::Arc;

use chrono::Duration;
use metrics::counter;
use ticket_tix_core::{
    Availability, BoxFuture, CategoryId, CategoryKind, Clock, DEFAULT_HOLD_DURATION,
    EventCategory, HeldUnit, ReservationProtocol, ReservationToken, ReserveRequest, Result,
    SeatStatus, StockHoldState, TicketError,
};

use crate::ledger::{InventoryLedger, SeatClaim, StockOutcome};

const RESERVATIONS: &str = "ticket_tix_reservations_total";
const RELEASES: &str = "ticket_tix_releases_total";
const CONFIRMATIONS: &str = "ticket_tix_confirmations_total";

/// The inventory authority: implements [`ReservationProtocol`] over any ledger.
///
/// # Example
///
/// ```ignore
/// let ledger = Arc::new(InMemoryLedger::new());
/// let service = InventoryService::new(ledger, Arc::new(SystemClock));
/// let token = service.validate_and_reserve(request).await?;
/// ```
pub struct InventoryService {
    ledger: Arc<dyn InventoryLedger>,
    clock: Arc<dyn Clock>,
    hold_duration: Duration,
}

impl InventoryService {
    /// Create a service with the default 15 minute hold.
    #[must_use]
    pub fn new(ledger: Arc<dyn InventoryLedger>, clock: Arc<dyn Clock>) -> Self {
        Self {
            ledger,
            clock,
            hold_duration: DEFAULT_HOLD_DURATION,
        }
    }

    /// Override the hold duration.
    #[must_use]
    pub const fn with_hold_duration(mut self, hold_duration: Duration) -> Self {
        self.hold_duration = hold_duration;
        self
    }

    /// The configured hold duration.
    #[must_use]
    pub const fn hold_duration(&self) -> Duration {
        self.hold_duration
    }

    /// The ledger this service mutates.
    #[must_use]
    pub fn ledger(&self) -> Arc<dyn InventoryLedger> {
        Arc::clone(&self.ledger)
    }

    async fn load_category(&self, request: &ReserveRequest) -> Result<EventCategory> {
        let category = self
            .ledger
            .category(request.category_id)
            .await?
            .ok_or_else(|| {
                TicketError::not_found(format!("category {} not found", request.category_id))
            })?;

        if category.event_id != request.event_id {
            return Err(TicketError::invalid_argument(format!(
                "category {} does not belong to event {}",
                category.id, request.event_id
            )));
        }
        Ok(category)
    }

    async fn reserve_seat(
        &self,
        request: ReserveRequest,
        category: &EventCategory,
    ) -> Result<ReservationToken> {
        let seat_label = match request.seat_label.as_deref().map(str::trim) {
            Some(label) if !label.is_empty() => label.to_owned(),
            _ => {
                return Err(TicketError::invalid_argument(format!(
                    "seat label is required for seated category {}",
                    category.id
                )));
            }
        };

        let now = self.clock.now();
        let expires_at = now + self.hold_duration;
        let claim = SeatClaim {
            category_id: category.id,
            seat_label: seat_label.clone(),
            hold_id: request.hold_id,
            now,
            expires_at,
        };

        if let Some(seat) = self.ledger.reserve_seat(claim).await? {
            counter!(RESERVATIONS, "kind" => "seat", "outcome" => "reserved").increment(1);
            tracing::info!(
                hold_id = %request.hold_id,
                category_id = %category.id,
                seat_label = %seat.seat_label,
                expires_at = %expires_at,
                "Seat reserved"
            );
            return Ok(ReservationToken {
                hold_id: request.hold_id,
                event_id: category.event_id,
                category_id: category.id,
                unit: HeldUnit::Seat {
                    ticket_id: seat.id,
                    seat_label: seat.seat_label,
                },
                expires_at,
            });
        }

        let seat = self
            .ledger
            .seat(category.id, &seat_label)
            .await?
            .ok_or_else(|| {
                TicketError::not_found(format!(
                    "seat {seat_label} not found in category {}",
                    category.id
                ))
            })?;

        if seat.is_held_by(request.hold_id, now) {
            counter!(RESERVATIONS, "kind" => "seat", "outcome" => "replayed").increment(1);
            tracing::debug!(
                hold_id = %request.hold_id,
                seat_label = %seat.seat_label,
                "Seat already held by this hold"
            );
            return Ok(ReservationToken {
                hold_id: request.hold_id,
                event_id: category.event_id,
                category_id: category.id,
                expires_at: seat.reserved_until.unwrap_or(expires_at),
                unit: HeldUnit::Seat {
                    ticket_id: seat.id,
                    seat_label: seat.seat_label,
                },
            });
        }

        counter!(RESERVATIONS, "kind" => "seat", "outcome" => "conflict").increment(1);
        tracing::warn!(
            hold_id = %request.hold_id,
            category_id = %category.id,
            seat_label = %seat_label,
            status = %seat.status,
            "Seat not available"
        );
        Err(TicketError::conflict(match seat.status {
            SeatStatus::Sold => format!("seat {seat_label} is sold"),
            _ => format!("seat {seat_label} is reserved"),
        }))
    }

    async fn reserve_stock(
        &self,
        request: ReserveRequest,
        category: &EventCategory,
    ) -> Result<ReservationToken> {
        if request
            .seat_label
            .as_deref()
            .is_some_and(|label| !label.trim().is_empty())
        {
            return Err(TicketError::invalid_argument(format!(
                "standing category {} does not take a seat label",
                category.id
            )));
        }

        let now = self.clock.now();
        let expires_at = now + self.hold_duration;
        let outcome = self
            .ledger
            .take_stock(category.id, request.hold_id, now, expires_at)
            .await?;

        let hold = match outcome {
            StockOutcome::Taken(hold) => {
                counter!(RESERVATIONS, "kind" => "stock", "outcome" => "reserved").increment(1);
                tracing::info!(
                    hold_id = %request.hold_id,
                    category_id = %category.id,
                    expires_at = %hold.expires_at,
                    "Stock unit reserved"
                );
                hold
            }
            StockOutcome::Existing(hold) if hold.state == StockHoldState::Held => {
                counter!(RESERVATIONS, "kind" => "stock", "outcome" => "replayed").increment(1);
                tracing::debug!(hold_id = %request.hold_id, "Stock already held by this hold");
                hold
            }
            StockOutcome::Existing(hold) => {
                counter!(RESERVATIONS, "kind" => "stock", "outcome" => "conflict").increment(1);
                return Err(TicketError::conflict(format!(
                    "hold {} is already {}",
                    hold.hold_id, hold.state
                )));
            }
            StockOutcome::SoldOut => {
                counter!(RESERVATIONS, "kind" => "stock", "outcome" => "conflict").increment(1);
                tracing::warn!(
                    hold_id = %request.hold_id,
                    category_id = %category.id,
                    "Stock sold out"
                );
                return Err(TicketError::conflict(format!(
                    "category {} is sold out",
                    category.id
                )));
            }
        };

        Ok(ReservationToken {
            hold_id: request.hold_id,
            event_id: category.event_id,
            category_id: category.id,
            unit: HeldUnit::Stock,
            expires_at: hold.expires_at,
        })
    }

    async fn confirm_seat(&self, token: &ReservationToken, seat_label: &str) -> Result<()> {
        let now = self.clock.now();
        if self
            .ledger
            .sell_seat(token.category_id, seat_label, token.hold_id, now)
            .await?
        {
            counter!(CONFIRMATIONS, "kind" => "seat", "outcome" => "sold").increment(1);
            tracing::info!(hold_id = %token.hold_id, seat_label, "Seat sold");
            return Ok(());
        }

        counter!(CONFIRMATIONS, "kind" => "seat", "outcome" => "conflict").increment(1);
        tracing::warn!(
            hold_id = %token.hold_id,
            seat_label,
            "Seat confirm rejected: hold lapsed, released or taken over"
        );
        Err(TicketError::conflict(format!(
            "seat {seat_label} is not reserved by hold {}",
            token.hold_id
        )))
    }

    async fn confirm_stock(&self, token: &ReservationToken) -> Result<()> {
        let now = self.clock.now();
        if self
            .ledger
            .settle_stock(token.category_id, token.hold_id, now)
            .await?
        {
            counter!(CONFIRMATIONS, "kind" => "stock", "outcome" => "sold").increment(1);
            tracing::info!(hold_id = %token.hold_id, category_id = %token.category_id, "Stock unit sold");
            return Ok(());
        }

        let hold = self
            .ledger
            .stock_hold(token.category_id, token.hold_id)
            .await?;
        match hold {
            Some(hold) if hold.state == StockHoldState::Confirmed => Ok(()),
            Some(hold) => {
                counter!(CONFIRMATIONS, "kind" => "stock", "outcome" => "conflict").increment(1);
                tracing::warn!(
                    hold_id = %token.hold_id,
                    state = %hold.state,
                    "Stock confirm rejected"
                );
                Err(TicketError::conflict(format!(
                    "stock hold {} is {}{}",
                    hold.hold_id,
                    hold.state,
                    if hold.state == StockHoldState::Held { " but lapsed" } else { "" }
                )))
            }
            None => {
                counter!(CONFIRMATIONS, "kind" => "stock", "outcome" => "conflict").increment(1);
                Err(TicketError::conflict(format!(
                    "no stock hold {} in category {}",
                    token.hold_id, token.category_id
                )))
            }
        }
    }
}

impl ReservationProtocol for InventoryService {
    fn validate_and_reserve(
        &self,
        request: ReserveRequest,
    ) -> BoxFuture<'_, Result<ReservationToken>> {
        Box::pin(async move {
            let category = self.load_category(&request).await?;
            match category.kind {
                CategoryKind::Seated => self.reserve_seat(request, &category).await,
                CategoryKind::Standing => self.reserve_stock(request, &category).await,
            }
        })
    }

    fn release(&self, token: ReservationToken) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let released = match &token.unit {
                HeldUnit::Seat { seat_label, .. } => {
                    self.ledger
                        .release_seat(token.category_id, seat_label, token.hold_id)
                        .await?
                }
                HeldUnit::Stock => {
                    self.ledger
                        .return_stock(token.category_id, token.hold_id)
                        .await?
                }
            };

            if released {
                counter!(RELEASES, "kind" => token.kind_label()).increment(1);
                tracing::info!(
                    hold_id = %token.hold_id,
                    category_id = %token.category_id,
                    kind = token.kind_label(),
                    "Hold released"
                );
            } else {
                tracing::debug!(
                    hold_id = %token.hold_id,
                    kind = token.kind_label(),
                    "Release was a no-op"
                );
            }
            Ok(())
        })
    }

    fn confirm_sold(&self, token: ReservationToken) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            match &token.unit {
                HeldUnit::Seat { seat_label, .. } => self.confirm_seat(&token, seat_label).await,
                HeldUnit::Stock => self.confirm_stock(&token).await,
            }
        })
    }

    fn availability(&self, category_id: CategoryId) -> BoxFuture<'_, Result<Availability>> {
        Box::pin(async move {
            self.ledger
                .availability(category_id, self.clock.now())
                .await?
                .ok_or_else(|| TicketError::not_found(format!("category {category_id} not found")))
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::InMemoryLedger;
    use ticket_tix_core::{ErrorKind, EventId, HoldId, Money};
    use ticket_tix_testing::{FixedClock, test_clock};

    async fn service() -> InventoryService {
        let ledger = Arc::new(InMemoryLedger::new());
        ledger
            .add_seated_category(
                EventCategory::seated(CategoryId::new(1), EventId::new(1), "VIP", Money::from_cents(15_000), 0),
                ["VIP-1", "VIP-2"],
            )
            .await
            .unwrap();
        ledger
            .add_standing_category(EventCategory::standing(
                CategoryId::new(2),
                EventId::new(1),
                "GA",
                Money::from_cents(4_000),
                2,
            ))
            .await
            .unwrap();
        InventoryService::new(ledger, Arc::new(test_clock()))
    }

    #[tokio::test]
    async fn unknown_category_is_not_found() {
        let svc = service().await;
        let err = svc
            .validate_and_reserve(ReserveRequest::standing(HoldId::new(), EventId::new(1), CategoryId::new(99)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn category_of_another_event_is_invalid() {
        let svc = service().await;
        let err = svc
            .validate_and_reserve(ReserveRequest::standing(HoldId::new(), EventId::new(2), CategoryId::new(2)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn seated_requires_label() {
        let svc = service().await;
        for label in [None, Some("   ".to_string())] {
            let err = svc
                .validate_and_reserve(ReserveRequest {
                    hold_id: HoldId::new(),
                    event_id: EventId::new(1),
                    category_id: CategoryId::new(1),
                    seat_label: label,
                })
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        }
    }

    #[tokio::test]
    async fn standing_rejects_label() {
        let svc = service().await;
        let err = svc
            .validate_and_reserve(ReserveRequest::seated(HoldId::new(), EventId::new(1), CategoryId::new(2), "A-1"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn unknown_seat_is_not_found() {
        let svc = service().await;
        let err = svc
            .validate_and_reserve(ReserveRequest::seated(HoldId::new(), EventId::new(1), CategoryId::new(1), "VIP-9"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn token_expires_after_hold_duration() {
        let svc = service().await;
        let token = svc
            .validate_and_reserve(ReserveRequest::seated(HoldId::new(), EventId::new(1), CategoryId::new(1), "VIP-1"))
            .await
            .unwrap();
        assert_eq!(token.expires_at, test_clock().now() + Duration::minutes(15));
        assert_eq!(token.seat_label(), Some("VIP-1"));
    }

    #[tokio::test]
    async fn same_hold_retry_returns_existing_token() {
        let svc = service().await;
        let hold = HoldId::new();
        let request = ReserveRequest::standing(hold, EventId::new(1), CategoryId::new(2));

        let first = svc.validate_and_reserve(request.clone()).await.unwrap();
        let second = svc.validate_and_reserve(request).await.unwrap();

        assert_eq!(first, second);
        let snapshot = svc.availability(CategoryId::new(2)).await.unwrap();
        assert_eq!(snapshot.available, 1);
    }

    #[tokio::test]
    async fn repeated_seat_confirm_conflicts() {
        let svc = service().await;
        let token = svc
            .validate_and_reserve(ReserveRequest::seated(HoldId::new(), EventId::new(1), CategoryId::new(1), "VIP-2"))
            .await
            .unwrap();

        svc.confirm_sold(token.clone()).await.unwrap();
        let err = svc.confirm_sold(token).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn stock_confirm_is_idempotent_but_not_after_release() {
        let svc = service().await;
        let confirmed = svc
            .validate_and_reserve(ReserveRequest::standing(HoldId::new(), EventId::new(1), CategoryId::new(2)))
            .await
            .unwrap();
        svc.confirm_sold(confirmed.clone()).await.unwrap();
        svc.confirm_sold(confirmed).await.unwrap();

        let released = svc
            .validate_and_reserve(ReserveRequest::standing(HoldId::new(), EventId::new(1), CategoryId::new(2)))
            .await
            .unwrap();
        svc.release(released.clone()).await.unwrap();
        let err = svc.confirm_sold(released).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let snapshot = svc.availability(CategoryId::new(2)).await.unwrap();
        assert_eq!((snapshot.available, snapshot.sold), (1, 1));
    }

    #[tokio::test]
    async fn custom_hold_duration_applies() {
        let ledger = Arc::new(InMemoryLedger::new());
        ledger
            .add_standing_category(EventCategory::standing(
                CategoryId::new(5),
                EventId::new(3),
                "Floor",
                Money::default(),
                1,
            ))
            .await
            .unwrap();
        let clock = FixedClock::new(test_clock().now());
        let svc = InventoryService::new(ledger, Arc::new(clock.clone()))
            .with_hold_duration(Duration::seconds(30));

        let token = svc
            .validate_and_reserve(ReserveRequest::standing(HoldId::new(), EventId::new(3), CategoryId::new(5)))
            .await
            .unwrap();
        assert_eq!(token.expires_at, clock.now() + Duration::seconds(30));
    }
}
