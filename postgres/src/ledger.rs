//! PostgreSQL inventory ledger.
//!
//! Every transition is a single conditional statement
//! (`UPDATE ... WHERE <expected state> RETURNING`), so the database row lock
//! decides races. Stock transitions touch the category counter and the hold
//! row, and run in one transaction.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use ticket_tix_core::{
    Availability, BookingKind, BoxFuture, CategoryId, CategoryKind, EventCategory, HoldId,
    ReclaimReport, Result, SeatTicket, StockHold, StockHoldState, TicketError,
};
use ticket_tix_inventory::{InventoryLedger, SeatClaim, StockOutcome};

use crate::error::{map_sqlx, to_u32};
use crate::rows::{CategoryRow, SeatRow, StockHoldRow};

const CATEGORY_COLUMNS: &str =
    "id, event_id, name, kind, booking_kind, price_cents, total, available";
const SEAT_COLUMNS: &str = "id, category_id, seat_label, status, reserved_until, hold_id";
const HOLD_COLUMNS: &str = "hold_id, category_id, state, expires_at";

/// [`InventoryLedger`] backed by the inventory database.
#[derive(Clone)]
pub struct PostgresLedger {
    pool: PgPool,
}

impl PostgresLedger {
    /// Create a ledger over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Access the underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert a category and, for a seated category, one AVAILABLE seat per
    /// label. A seated category's capacity is the number of labels.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a kind/booking-kind mismatch, a blank or repeated
    /// seat label, or an id that already exists.
    pub async fn provision_category(
        &self,
        mut category: EventCategory,
        seat_labels: &[String],
    ) -> Result<EventCategory> {
        match (category.kind, category.booking_kind) {
            (CategoryKind::Seated, BookingKind::Fixed) => {
                if seat_labels.iter().any(|label| label.trim().is_empty()) {
                    return Err(TicketError::invalid_argument("seat label must not be blank"));
                }
                let count = u32::try_from(seat_labels.len())
                    .map_err(|_| TicketError::invalid_argument("too many seats"))?;
                category.total = count;
                category.available = count;
            }
            (CategoryKind::Standing, BookingKind::Flexible) => {
                if !seat_labels.is_empty() {
                    return Err(TicketError::invalid_argument(format!(
                        "standing category {} takes no seat labels",
                        category.id
                    )));
                }
            }
            (kind, booking_kind) => {
                return Err(TicketError::invalid_argument(format!(
                    "category {} cannot be {kind}/{booking_kind}",
                    category.id
                )));
            }
        }

        let total = i32::try_from(category.total)
            .map_err(|_| TicketError::invalid_argument("capacity out of range"))?;
        let available = i32::try_from(category.available)
            .map_err(|_| TicketError::invalid_argument("available out of range"))?;
        let price = i64::try_from(category.price.cents())
            .map_err(|_| TicketError::invalid_argument("price out of range"))?;

        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        sqlx::query(
            r"
            INSERT INTO event_categories
                (id, event_id, name, kind, booking_kind, price_cents, total, available)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ",
        )
        .bind(category.id.value())
        .bind(category.event_id.value())
        .bind(&category.name)
        .bind(category.kind.as_str())
        .bind(category.booking_kind.as_str())
        .bind(price)
        .bind(total)
        .bind(available)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        if !seat_labels.is_empty() {
            sqlx::query(
                r"
                INSERT INTO tickets (category_id, seat_label)
                SELECT $1, label FROM UNNEST($2::text[]) AS label
                ",
            )
            .bind(category.id.value())
            .bind(seat_labels)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;
        }

        tx.commit().await.map_err(map_sqlx)?;

        tracing::info!(
            category_id = %category.id,
            kind = %category.kind,
            total = category.total,
            "Provisioned category"
        );
        Ok(category)
    }

    async fn load_hold(&self, category_id: CategoryId, hold_id: HoldId) -> Result<Option<StockHold>> {
        sqlx::query_as::<_, StockHoldRow>(&format!(
            "SELECT {HOLD_COLUMNS} FROM stock_holds WHERE category_id = $1 AND hold_id = $2"
        ))
        .bind(category_id.value())
        .bind(hold_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?
        .map(StockHold::try_from)
        .transpose()
    }

    async fn take_stock_tx(
        &self,
        category_id: CategoryId,
        hold_id: HoldId,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<StockOutcome>> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        let exists = sqlx::query_scalar::<_, i32>("SELECT id FROM event_categories WHERE id = $1")
            .bind(category_id.value())
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx)?;
        if exists.is_none() {
            return Err(TicketError::not_found(format!("category {category_id} not found")));
        }

        let existing = sqlx::query_as::<_, StockHoldRow>(&format!(
            "SELECT {HOLD_COLUMNS} FROM stock_holds
             WHERE category_id = $1 AND hold_id = $2
             FOR UPDATE"
        ))
        .bind(category_id.value())
        .bind(hold_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx)?
        .map(StockHold::try_from)
        .transpose()?;

        match existing {
            Some(hold)
                if hold.state == StockHoldState::Confirmed
                    || (hold.state == StockHoldState::Held && hold.expires_at >= now) =>
            {
                tx.commit().await.map_err(map_sqlx)?;
                return Ok(Some(StockOutcome::Existing(hold)));
            }
            Some(hold) if hold.state == StockHoldState::Held => {
                let renewed = sqlx::query_as::<_, StockHoldRow>(&format!(
                    "UPDATE stock_holds SET expires_at = $3, updated_at = now()
                     WHERE category_id = $1 AND hold_id = $2 AND state = 'HELD'
                     RETURNING {HOLD_COLUMNS}"
                ))
                .bind(category_id.value())
                .bind(hold_id.as_uuid())
                .bind(expires_at)
                .fetch_one(&mut *tx)
                .await
                .map_err(map_sqlx)?;
                tx.commit().await.map_err(map_sqlx)?;
                return Ok(Some(StockOutcome::Taken(StockHold::try_from(renewed)?)));
            }
            _ => {}
        }

        let decremented = sqlx::query_scalar::<_, i32>(
            r"
            UPDATE event_categories SET available = available - 1
            WHERE id = $1 AND available > 0
            RETURNING available
            ",
        )
        .bind(category_id.value())
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx)?;
        if decremented.is_none() {
            tx.rollback().await.map_err(map_sqlx)?;
            return Ok(Some(StockOutcome::SoldOut));
        }

        // Insert races with a concurrent taker of the same hold id resolve to
        // zero rows here; the caller then reads the winner's hold.
        let held = sqlx::query_as::<_, StockHoldRow>(&format!(
            "INSERT INTO stock_holds (category_id, hold_id, state, expires_at)
             VALUES ($1, $2, 'HELD', $3)
             ON CONFLICT (category_id, hold_id) DO UPDATE
                 SET state = 'HELD', expires_at = EXCLUDED.expires_at, updated_at = now()
                 WHERE stock_holds.state IN ('RELEASED', 'EXPIRED')
             RETURNING {HOLD_COLUMNS}"
        ))
        .bind(category_id.value())
        .bind(hold_id.as_uuid())
        .bind(expires_at)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        let Some(held) = held else {
            tx.rollback().await.map_err(map_sqlx)?;
            return Ok(None);
        };
        tx.commit().await.map_err(map_sqlx)?;
        Ok(Some(StockOutcome::Taken(StockHold::try_from(held)?)))
    }
}

impl InventoryLedger for PostgresLedger {
    fn category(&self, id: CategoryId) -> BoxFuture<'_, Result<Option<EventCategory>>> {
        Box::pin(async move {
            sqlx::query_as::<_, CategoryRow>(&format!(
                "SELECT {CATEGORY_COLUMNS} FROM event_categories WHERE id = $1"
            ))
            .bind(id.value())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?
            .map(EventCategory::try_from)
            .transpose()
        })
    }

    fn seat(
        &self,
        category_id: CategoryId,
        seat_label: &str,
    ) -> BoxFuture<'_, Result<Option<SeatTicket>>> {
        let seat_label = seat_label.to_owned();
        Box::pin(async move {
            sqlx::query_as::<_, SeatRow>(&format!(
                "SELECT {SEAT_COLUMNS} FROM tickets WHERE category_id = $1 AND seat_label = $2"
            ))
            .bind(category_id.value())
            .bind(seat_label)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?
            .map(SeatTicket::try_from)
            .transpose()
        })
    }

    fn reserve_seat(&self, claim: SeatClaim) -> BoxFuture<'_, Result<Option<SeatTicket>>> {
        Box::pin(async move {
            sqlx::query_as::<_, SeatRow>(&format!(
                "UPDATE tickets
                 SET status = 'RESERVED', reserved_until = $4, hold_id = $3
                 WHERE category_id = $1 AND seat_label = $2
                   AND (status = 'AVAILABLE' OR (status = 'RESERVED' AND reserved_until < $5))
                 RETURNING {SEAT_COLUMNS}"
            ))
            .bind(claim.category_id.value())
            .bind(&claim.seat_label)
            .bind(claim.hold_id.as_uuid())
            .bind(claim.expires_at)
            .bind(claim.now)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?
            .map(SeatTicket::try_from)
            .transpose()
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
            let result = sqlx::query(
                r"
                UPDATE tickets
                SET status = 'AVAILABLE', reserved_until = NULL, hold_id = NULL
                WHERE category_id = $1 AND seat_label = $2
                  AND status = 'RESERVED' AND hold_id = $3
                ",
            )
            .bind(category_id.value())
            .bind(seat_label)
            .bind(hold_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
            Ok(result.rows_affected() == 1)
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
            let result = sqlx::query(
                r"
                UPDATE tickets
                SET status = 'SOLD', reserved_until = NULL
                WHERE category_id = $1 AND seat_label = $2
                  AND status = 'RESERVED' AND hold_id = $3 AND reserved_until >= $4
                ",
            )
            .bind(category_id.value())
            .bind(seat_label)
            .bind(hold_id.as_uuid())
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
            Ok(result.rows_affected() == 1)
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
            if let Some(outcome) = self.take_stock_tx(category_id, hold_id, now, expires_at).await? {
                return Ok(outcome);
            }
            // Lost an insert race for the same hold id.
            tracing::debug!(%category_id, %hold_id, "Concurrent stock take for the same hold");
            self.load_hold(category_id, hold_id)
                .await?
                .map(StockOutcome::Existing)
                .ok_or_else(|| {
                    TicketError::internal(format!("stock hold {hold_id} vanished during take"))
                })
        })
    }

    fn stock_hold(
        &self,
        category_id: CategoryId,
        hold_id: HoldId,
    ) -> BoxFuture<'_, Result<Option<StockHold>>> {
        Box::pin(self.load_hold(category_id, hold_id))
    }

    fn return_stock(&self, category_id: CategoryId, hold_id: HoldId) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

            let released = sqlx::query(
                r"
                UPDATE stock_holds SET state = 'RELEASED', updated_at = now()
                WHERE category_id = $1 AND hold_id = $2 AND state = 'HELD'
                ",
            )
            .bind(category_id.value())
            .bind(hold_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;

            if released.rows_affected() == 0 {
                tx.rollback().await.map_err(map_sqlx)?;
                return Ok(false);
            }

            sqlx::query(
                "UPDATE event_categories SET available = LEAST(available + 1, total) WHERE id = $1",
            )
            .bind(category_id.value())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;

            tx.commit().await.map_err(map_sqlx)?;
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
            let result = sqlx::query(
                r"
                UPDATE stock_holds SET state = 'CONFIRMED', updated_at = now()
                WHERE category_id = $1 AND hold_id = $2
                  AND state = 'HELD' AND expires_at >= $3
                ",
            )
            .bind(category_id.value())
            .bind(hold_id.as_uuid())
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
            Ok(result.rows_affected() == 1)
        })
    }

    fn reclaim_expired(&self, now: DateTime<Utc>) -> BoxFuture<'_, Result<ReclaimReport>> {
        Box::pin(async move {
            let seats = sqlx::query(
                r"
                UPDATE tickets
                SET status = 'AVAILABLE', reserved_until = NULL, hold_id = NULL
                WHERE status = 'RESERVED' AND reserved_until < $1
                ",
            )
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?
            .rows_affected();

            let returned = sqlx::query_scalar::<_, i32>(
                r"
                WITH expired AS (
                    UPDATE stock_holds SET state = 'EXPIRED', updated_at = now()
                    WHERE state = 'HELD' AND expires_at < $1
                    RETURNING category_id
                ), counts AS (
                    SELECT category_id, COUNT(*)::INTEGER AS n
                    FROM expired GROUP BY category_id
                )
                UPDATE event_categories c
                SET available = LEAST(c.available + counts.n, c.total)
                FROM counts
                WHERE c.id = counts.category_id
                RETURNING counts.n
                ",
            )
            .bind(now)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;

            let stock = returned
                .into_iter()
                .map(|n| u64::try_from(n).unwrap_or_default())
                .sum();

            Ok(ReclaimReport { seats, stock })
        })
    }

    fn availability(
        &self,
        category_id: CategoryId,
        now: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<Option<Availability>>> {
        Box::pin(async move {
            let Some(category) = self.category(category_id).await? else {
                return Ok(None);
            };

            let snapshot = match category.kind {
                CategoryKind::Seated => {
                    let (sold, reserved) = sqlx::query_as::<_, (i64, i64)>(
                        r"
                        SELECT
                            COUNT(*) FILTER (WHERE status = 'SOLD'),
                            COUNT(*) FILTER (WHERE status = 'RESERVED' AND reserved_until >= $2)
                        FROM tickets WHERE category_id = $1
                        ",
                    )
                    .bind(category_id.value())
                    .bind(now)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(map_sqlx)?;

                    let sold = to_u32(sold, "sold")?;
                    let reserved = to_u32(reserved, "reserved")?;
                    Availability {
                        total: category.total,
                        available: category.total.saturating_sub(sold + reserved),
                        reserved,
                        sold,
                    }
                }
                CategoryKind::Standing => {
                    let (sold, reserved, lapsed) = sqlx::query_as::<_, (i64, i64, i64)>(
                        r"
                        SELECT
                            COUNT(*) FILTER (WHERE state = 'CONFIRMED'),
                            COUNT(*) FILTER (WHERE state = 'HELD' AND expires_at >= $2),
                            COUNT(*) FILTER (WHERE state = 'HELD' AND expires_at < $2)
                        FROM stock_holds WHERE category_id = $1
                        ",
                    )
                    .bind(category_id.value())
                    .bind(now)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(map_sqlx)?;

                    Availability {
                        total: category.total,
                        available: category.available + to_u32(lapsed, "lapsed")?,
                        reserved: to_u32(reserved, "reserved")?,
                        sold: to_u32(sold, "sold")?,
                    }
                }
            };

            Ok(Some(snapshot))
        })
    }
}
