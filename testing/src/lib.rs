//! # Ticket Tix Testing
//!
//! Testing utilities for the inventory and booking crates.
//!
//! This crate provides:
//! - Deterministic clocks ([`FixedClock`], [`ManualClock`])
//! - Failure doubles for the service seams ([`FailingBookingStore`], [`FlakyProtocol`])
//! - Category and seat fixtures
//! - Property-based testing strategies
//!
//! ## Example
//!
//! ```ignore
//! use ticket_tix_testing::{ManualClock, fixtures};
//!
//! #[tokio::test]
//! async fn hold_lapses() {
//!     let clock = ManualClock::new(fixtures::t0());
//!     let service = InventoryService::new(ledger, Arc::new(clock.clone()));
//!     let token = service.validate_and_reserve(request).await?;
//!     clock.advance(chrono::Duration::minutes(16));
//!     assert!(service.confirm_sold(token).await.is_err());
//! }
//! ```

use chrono::{DateTime, Utc};
use ticket_tix_core::Clock;

pub mod doubles;
pub mod fixtures;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::{Arc, Mutex, PoisonError};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use ticket_tix_testing::mocks::FixedClock;
    /// use ticket_tix_core::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that only moves when told to.
    ///
    /// Clones share the same time, so a test can keep one handle and pass
    /// another to the code under test.
    ///
    /// # Example
    ///
    /// ```
    /// use ticket_tix_testing::mocks::ManualClock;
    /// use ticket_tix_core::Clock;
    /// use chrono::{Duration, Utc};
    ///
    /// let clock = ManualClock::new(Utc::now());
    /// let start = clock.now();
    /// clock.advance(Duration::minutes(15));
    /// assert_eq!(clock.now() - start, Duration::minutes(15));
    /// ```
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<Mutex<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Create a clock starting at `time`
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(Mutex::new(time)),
            }
        }

        /// Move the clock forward (or backward, for a negative duration).
        pub fn advance(&self, by: chrono::Duration) {
            let mut time = self.time.lock().unwrap_or_else(PoisonError::into_inner);
            *time += by;
        }

        /// Jump to an absolute time.
        pub fn set(&self, to: DateTime<Utc>) {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner) = to;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(crate::fixtures::t0())
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use proptest::prelude::*;

    /// One step in a randomized reservation workload.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum ReservationOp {
        /// Reserve with a fresh hold, from the given client.
        Reserve(usize),
        /// Release the n-th live hold, if any.
        Release(usize),
        /// Confirm the n-th live hold, if any.
        Confirm(usize),
        /// Advance time by this many minutes and sweep.
        Advance(u8),
    }

    /// Strategy producing a workload of up to `max_len` operations.
    pub fn reservation_ops(max_len: usize) -> impl Strategy<Value = Vec<ReservationOp>> {
        let op = prop_oneof![
            4 => (0usize..8).prop_map(ReservationOp::Reserve),
            2 => (0usize..8).prop_map(ReservationOp::Release),
            2 => (0usize..8).prop_map(ReservationOp::Confirm),
            1 => (1u8..20).prop_map(ReservationOp::Advance),
        ];
        prop::collection::vec(op, 1..max_len)
    }
}

/// Install a `tracing` subscriber for test output. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use doubles::{FailingBookingStore, FlakyProtocol};
pub use mocks::{FixedClock, ManualClock, test_clock};
