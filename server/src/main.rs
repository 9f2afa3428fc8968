//! Ticket Tix service.
//!
//! Connects the inventory and booking databases, applies migrations, starts
//! the Prometheus exporter and runs the expiry reclaimer until Ctrl+C or
//! SIGTERM.
//!
//! # Usage
//!
//! ```bash
//! INVENTORY_DATABASE_URL=postgres://... BOOKING_DATABASE_URL=postgres://... \
//!     cargo run --bin ticket-tix-server
//! ```

use ticket_tix_runtime::metrics::MetricsServer;
use ticket_tix_server::{App, Config, lifecycle};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,ticket_tix=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Ticket Tix...");

    let config = Config::from_env();
    config.validate()?;
    tracing::info!(
        hold_seconds = config.reservation.hold_seconds,
        reclaim_interval_seconds = config.reservation.reclaim_interval_seconds,
        compensation_max_retries = config.reservation.compensation_max_retries,
        "Configuration loaded"
    );

    let mut metrics = MetricsServer::new(config.metrics_addr()?);
    metrics.start()?;

    let app = App::connect(&config).await?;
    app.run(lifecycle::shutdown_signal()).await;

    Ok(())
}
