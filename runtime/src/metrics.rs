//! Prometheus metrics for reservations, bookings and the reclaimer.
//!
//! The inventory crate records its counters directly with
//! [`metrics::counter!`]; this module owns their descriptions and the
//! exporter.
//!
//! # Example
//!
//! ```rust,no_run
//! use ticket_tix_runtime::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//! // Metrics available at http://localhost:9090/metrics
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use ticket_tix_core::{BookingStatus, ReclaimReport};

// Re-export metrics macros for use in other modules
pub use metrics::{counter, gauge, histogram};

/// Reservations attempted, by `kind` (seat/stock) and `outcome`.
pub const RESERVATIONS_TOTAL: &str = "ticket_tix_reservations_total";
/// Holds returned to availability by `release`, by `kind`.
pub const RELEASES_TOTAL: &str = "ticket_tix_releases_total";
/// Confirmations attempted, by `kind` and `outcome`.
pub const CONFIRMATIONS_TOTAL: &str = "ticket_tix_confirmations_total";
/// Bookings reaching a status, by `status`.
pub const BOOKINGS_TOTAL: &str = "ticket_tix_bookings_total";
/// Compensating releases, by `outcome`.
pub const COMPENSATIONS_TOTAL: &str = "ticket_tix_compensations_total";
/// Holds reclaimed by the sweeper, by `kind`.
pub const RECLAIMED_TOTAL: &str = "ticket_tix_reclaimed_total";
/// Duration of one reclaimer sweep.
pub const RECLAIM_DURATION: &str = "ticket_tix_reclaim_duration_seconds";
/// Failed reclaimer sweeps.
pub const RECLAIM_ERRORS_TOTAL: &str = "ticket_tix_reclaim_errors_total";
/// Unix timestamp of the last successful sweep.
pub const RECLAIM_LAST_SUCCESS: &str = "ticket_tix_reclaim_last_success_timestamp";
/// Database failures in the Postgres stores, by `class` (constraint/internal).
pub const DB_ERRORS_TOTAL: &str = "ticket_tix_db_errors_total";
/// Retries scheduled.
pub const RETRY_ATTEMPTS_TOTAL: &str = "ticket_tix_retry_attempts_total";
/// Operations that succeeded after at least one retry.
pub const RETRY_SUCCESSES_TOTAL: &str = "ticket_tix_retry_successes_total";
/// Operations that exhausted their retries.
pub const RETRY_EXHAUSTED_TOTAL: &str = "ticket_tix_retry_exhausted_total";

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics server.
///
/// Exposes metrics on an HTTP endpoint for Prometheus scraping.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Socket address to bind to (e.g., `0.0.0.0:9090`)
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Install the global recorder and spawn the HTTP exporter.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built.
    ///
    /// # Note
    ///
    /// If a recorder is already installed (e.g., in tests), this logs a warning
    /// and leaves [`handle`](Self::handle) empty.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let (recorder, exporter) = PrometheusBuilder::new()
            .with_http_listener(self.addr)
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?
            .build()
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        let handle = recorder.handle();
        if metrics::set_global_recorder(recorder).is_err() {
            tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
            return Ok(());
        }

        tokio::spawn(async move {
            if exporter.await.is_err() {
                tracing::error!("Metrics exporter stopped");
            }
        });
        self.handle = Some(handle);
        tracing::info!(
            addr = %self.addr,
            "Metrics server started - available at http://{}/metrics",
            self.addr
        );
        Ok(())
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if this server did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(
        RESERVATIONS_TOTAL,
        "Reservation attempts by unit kind and outcome (reserved, replayed, conflict)"
    );
    describe_counter!(RELEASES_TOTAL, "Holds returned to availability by release");
    describe_counter!(
        CONFIRMATIONS_TOTAL,
        "Confirmation attempts by unit kind and outcome (sold, conflict)"
    );

    describe_counter!(BOOKINGS_TOTAL, "Bookings reaching each status");
    describe_counter!(
        COMPENSATIONS_TOTAL,
        "Compensating releases after a failed booking insert (ok, failed)"
    );

    describe_counter!(RECLAIMED_TOTAL, "Lapsed holds returned by the reclaimer");
    describe_histogram!(RECLAIM_DURATION, "Time taken by one reclaimer sweep");
    describe_counter!(RECLAIM_ERRORS_TOTAL, "Reclaimer sweeps that failed");
    describe_gauge!(RECLAIM_LAST_SUCCESS, "Unix timestamp of the last successful sweep");

    describe_counter!(DB_ERRORS_TOTAL, "Database failures by class");

    describe_counter!(RETRY_ATTEMPTS_TOTAL, "Total number of retry attempts");
    describe_counter!(RETRY_SUCCESSES_TOTAL, "Total number of successful retries");
    describe_counter!(
        RETRY_EXHAUSTED_TOTAL,
        "Total number of operations that exhausted their retries"
    );
}

/// Booking saga metrics recorder.
pub struct BookingMetrics;

impl BookingMetrics {
    /// Record a booking reaching `status`.
    pub fn record_status(status: BookingStatus) {
        counter!(BOOKINGS_TOTAL, "status" => status.as_str()).increment(1);
    }

    /// Record a compensating release that succeeded.
    pub fn record_compensated() {
        counter!(COMPENSATIONS_TOTAL, "outcome" => "ok").increment(1);
    }

    /// Record a compensating release that gave up.
    pub fn record_compensation_failed() {
        counter!(COMPENSATIONS_TOTAL, "outcome" => "failed").increment(1);
    }
}

/// Reclaimer metrics recorder.
pub struct ReclaimerMetrics;

impl ReclaimerMetrics {
    /// Record a completed sweep.
    #[allow(clippy::cast_precision_loss)] // timestamps fit in f64 mantissa for centuries
    pub fn record_sweep(report: ReclaimReport, duration: Duration, finished_at_unix: i64) {
        counter!(RECLAIMED_TOTAL, "kind" => "seat").increment(report.seats);
        counter!(RECLAIMED_TOTAL, "kind" => "stock").increment(report.stock);
        histogram!(RECLAIM_DURATION).record(duration.as_secs_f64());
        gauge!(RECLAIM_LAST_SUCCESS).set(finished_at_unix as f64);
    }

    /// Record a failed sweep.
    pub fn record_error() {
        counter!(RECLAIM_ERRORS_TOTAL).increment(1);
    }
}

/// Retry metrics recorder.
pub struct RetryMetrics;

impl RetryMetrics {
    /// Record a retry attempt.
    pub fn record_attempt() {
        counter!(RETRY_ATTEMPTS_TOTAL).increment(1);
    }

    /// Record a successful retry.
    pub fn record_success() {
        counter!(RETRY_SUCCESSES_TOTAL).increment(1);
    }

    /// Record exhausted retries.
    pub fn record_exhausted() {
        counter!(RETRY_EXHAUSTED_TOTAL).increment(1);
    }
}
