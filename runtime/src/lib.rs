//! # Ticket Tix Runtime
//!
//! Long-running machinery shared by the service binary and the booking
//! orchestrator.
//!
//! - [`reclaimer`]: the expiry sweeper returning lapsed holds to availability
//! - [`retry`]: exponential backoff for idempotent operations
//! - [`metrics`]: metric names, recorders and the Prometheus exporter

#![forbid(unsafe_code)]

pub mod metrics;
pub mod reclaimer;
pub mod retry;

pub use reclaimer::{DEFAULT_RECLAIM_INTERVAL, ExpiryReclaimer};
pub use retry::{RetryPolicy, RetryPolicyBuilder, retry_with_backoff, retry_with_predicate};
