//! Service wiring.
//!
//! Builds the reservation protocol over the inventory ledger, the booking
//! orchestrator over the protocol and the booking store, and runs the expiry
//! reclaimer until shutdown.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::broadcast;
use tracing::info;
use ticket_tix_bookings::BookingOrchestrator;
use ticket_tix_core::{BookingStore, Clock, SystemClock};
use ticket_tix_inventory::{InventoryLedger, InventoryService};
use ticket_tix_postgres::{PostgresBookingStore, PostgresLedger, migrate_bookings, migrate_inventory};
use ticket_tix_runtime::{ExpiryReclaimer, RetryPolicy};

use crate::config::{Config, PostgresConfig};
use crate::lifecycle::await_shutdown;

/// A wired service ready to run.
pub struct App {
    inventory: Arc<InventoryService>,
    bookings: Arc<BookingOrchestrator>,
    reclaimer: ExpiryReclaimer,
    shutdown_timeout: Duration,
}

impl App {
    /// Wire the service over any ledger and store.
    #[must_use]
    pub fn new(
        ledger: Arc<dyn InventoryLedger>,
        store: Arc<dyn BookingStore>,
        clock: Arc<dyn Clock>,
        config: &Config,
    ) -> Self {
        let inventory = Arc::new(
            InventoryService::new(ledger.clone(), clock.clone())
                .with_hold_duration(config.hold_duration()),
        );
        let compensation = RetryPolicy::builder()
            .max_retries(config.reservation.compensation_max_retries)
            .jitter(true)
            .build();
        let bookings = Arc::new(
            BookingOrchestrator::new(inventory.clone(), store)
                .with_compensation_policy(compensation),
        );
        let reclaimer =
            ExpiryReclaimer::new(ledger, clock).with_interval(config.reclaim_interval());

        Self {
            inventory,
            bookings,
            reclaimer,
            shutdown_timeout: config.shutdown_timeout(),
        }
    }

    /// Connect both databases, apply migrations and wire the Postgres stores.
    ///
    /// # Errors
    ///
    /// Returns error if a pool cannot connect or a migration fails.
    pub async fn connect(config: &Config) -> anyhow::Result<Self> {
        let inventory_pool = connect_pool("inventory", &config.inventory_db).await?;
        migrate_inventory(&inventory_pool)
            .await
            .context("Failed to migrate inventory database")?;

        let booking_pool = connect_pool("booking", &config.booking_db).await?;
        migrate_bookings(&booking_pool)
            .await
            .context("Failed to migrate booking database")?;

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let ledger = Arc::new(PostgresLedger::new(inventory_pool));
        let store = Arc::new(PostgresBookingStore::new(booking_pool, clock.clone()));
        Ok(Self::new(ledger, store, clock, config))
    }

    /// The reservation protocol.
    #[must_use]
    pub fn inventory(&self) -> Arc<InventoryService> {
        self.inventory.clone()
    }

    /// The booking front-door.
    #[must_use]
    pub fn bookings(&self) -> Arc<BookingOrchestrator> {
        self.bookings.clone()
    }

    /// Run the reclaimer until `signal` completes, then drain it.
    pub async fn run<S>(self, signal: S)
    where
        S: Future<Output = ()>,
    {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let reclaimer = self.reclaimer.spawn(shutdown_rx);
        info!("Service running");

        signal.await;

        info!("Initiating graceful shutdown...");
        let _ = shutdown_tx.send(());
        await_shutdown(vec![("reclaimer", reclaimer)], self.shutdown_timeout).await;
        info!("Graceful shutdown complete");
    }
}

async fn connect_pool(name: &str, config: &PostgresConfig) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout))
        .connect(&config.url)
        .await
        .with_context(|| format!("Failed to connect to {name} database"))?;
    info!(database = name, max_connections = config.max_connections, "Database pool ready");
    Ok(pool)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use ticket_tix_bookings::{BookingRequest, InMemoryBookingStore};
    use ticket_tix_core::{BookingStatus, ReservationProtocol};
    use ticket_tix_inventory::InMemoryLedger;
    use ticket_tix_testing::ManualClock;
    use ticket_tix_testing::fixtures::{self, EVENT, GA, USER};

    async fn app(clock: &ManualClock) -> App {
        let ledger = Arc::new(InMemoryLedger::new());
        ledger
            .add_standing_category(fixtures::ga_category(2))
            .await
            .unwrap();
        let store = Arc::new(InMemoryBookingStore::new(Arc::new(clock.clone())));
        let config = Config::from_lookup(|key| {
            (key == "RESERVATION_HOLD_SECONDS").then(|| "60".to_string())
        });
        App::new(ledger, store, Arc::new(clock.clone()), &config)
    }

    #[tokio::test]
    async fn wiring_uses_configured_hold_duration() {
        let clock = ManualClock::new(fixtures::t0());
        let app = app(&clock).await;

        let booking = app
            .bookings()
            .create_booking(BookingRequest::new(EVENT, GA, None, USER))
            .await
            .unwrap();

        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.hold_expires_at, fixtures::t0() + chrono::Duration::seconds(60));
        assert_eq!(app.inventory().availability(GA).await.unwrap().reserved, 1);
    }

    #[tokio::test]
    async fn run_returns_after_signal() {
        let clock = ManualClock::new(fixtures::t0());
        let app = app(&clock).await;

        let handle = app.inventory();
        app.run(std::future::ready(())).await;

        assert_eq!(handle.availability(GA).await.unwrap().available, 2);
    }
}
