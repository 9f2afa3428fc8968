//! # Ticket Tix Core
//!
//! Domain types, error taxonomy and service traits shared by the inventory
//! authority and the booking front-door.
//!
//! ## Core Concepts
//!
//! - **Ledger entities**: [`EventCategory`], [`SeatTicket`], [`StockHold`]
//! - **Reservation token**: [`ReservationToken`], the handle used to confirm or release a hold
//! - **Booking**: [`Booking`], one purchase attempt and its outcome
//! - **Protocol**: [`ReservationProtocol`], atomic validate-and-reserve, release and confirm
//! - **Store**: [`BookingStore`], durable booking records owned by the orchestrator
//! - **Environment**: [`Clock`], injected time for deterministic expiry
//!
//! ## Architecture Principles
//!
//! - The inventory ledger is only ever mutated through the reservation protocol
//! - Every inventory mutation is a single conditional transition on one seat row or
//!   one category counter
//! - Cross-service consistency comes from reserve-then-confirm with time-bounded holds
//!   and idempotent compensation, never from a shared transaction
//!
//! ## Example
//!
//! ```ignore
//! use ticket_tix_core::*;
//!
//! async fn book(protocol: &dyn ReservationProtocol) -> Result<ReservationToken> {
//!     protocol
//!         .validate_and_reserve(ReserveRequest::seated(
//!             HoldId::new(),
//!             EventId::new(1),
//!             CategoryId::new(10),
//!             "VIP-7",
//!         ))
//!         .await
//! }
//! ```

#![forbid(unsafe_code)]

pub mod environment;
pub mod error;
pub mod protocol;
pub mod types;

pub use environment::{Clock, SystemClock};
pub use error::{ErrorKind, Result, TicketError};
pub use protocol::{BookingStore, BoxFuture, ReservationProtocol};
pub use types::*;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};

/// Default hold duration for a reservation: 15 minutes.
pub const DEFAULT_HOLD_DURATION: chrono::Duration = chrono::Duration::minutes(15);
