//! Background sweep returning lapsed holds to availability.
//!
//! The reclaimer is best-effort: a failed sweep is logged and the next tick
//! tries again. It uses the same conditional guards as `release`, so it can
//! never undo a concurrent confirmation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use ticket_tix_core::{Clock, ReclaimReport, Result};
use ticket_tix_inventory::InventoryLedger;

use crate::metrics::ReclaimerMetrics;

/// Default interval between sweeps.
pub const DEFAULT_RECLAIM_INTERVAL: Duration = Duration::from_secs(60);

/// Periodic expiry sweeper over an [`InventoryLedger`].
pub struct ExpiryReclaimer {
    ledger: Arc<dyn InventoryLedger>,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl ExpiryReclaimer {
    /// Create a reclaimer sweeping every [`DEFAULT_RECLAIM_INTERVAL`].
    #[must_use]
    pub fn new(ledger: Arc<dyn InventoryLedger>, clock: Arc<dyn Clock>) -> Self {
        Self {
            ledger,
            clock,
            interval: DEFAULT_RECLAIM_INTERVAL,
        }
    }

    /// Override the sweep interval.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sweep interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one sweep at the clock's current time.
    ///
    /// # Errors
    ///
    /// Propagates ledger failures.
    pub async fn sweep_once(&self) -> Result<ReclaimReport> {
        let started = Instant::now();
        let now = self.clock.now();

        match self.ledger.reclaim_expired(now).await {
            Ok(report) => {
                ReclaimerMetrics::record_sweep(report, started.elapsed(), now.timestamp());
                if report.is_empty() {
                    tracing::debug!("Reclaim sweep found no lapsed holds");
                } else {
                    tracing::warn!(
                        seats = report.seats,
                        stock = report.stock,
                        "Reclaimed lapsed holds"
                    );
                }
                Ok(report)
            }
            Err(e) => {
                ReclaimerMetrics::record_error();
                Err(e)
            }
        }
    }

    /// Spawn the sweep loop. It stops when `shutdown` fires or its sender is
    /// dropped.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn spawn(self, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            tracing::info!(
                interval_secs = self.interval.as_secs(),
                "Expiry reclaimer started"
            );

            loop {
                tokio::select! {
                    _ = shutdown.recv() => {
                        tracing::info!("Expiry reclaimer stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = self.sweep_once().await {
                            tracing::error!(error = %e, "Reclaim sweep failed");
                        }
                    }
                }
            }
        })
    }
}
