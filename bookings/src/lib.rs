//! # Ticket Tix Bookings
//!
//! The booking front-door. A booking attempt runs as a saga:
//!
//! 1. **Validate**: local checks; an attempt id that already has a booking is replayed
//! 2. **Reserve**: `validate_and_reserve` on the inventory authority
//! 3. **Persist**: store a PENDING booking embedding the reservation
//! 4. **Compensate**: if the insert fails, release the hold (retried with backoff)
//!
//! Payment-driven follow-ups confirm or cancel the PENDING booking.
//!
//! - [`saga`]: the pure state machine
//! - [`BookingOrchestrator`]: runs the saga against a protocol and a store
//! - [`InMemoryBookingStore`]: [`BookingStore`](ticket_tix_core::BookingStore) for tests
//!   and single-process use

#![forbid(unsafe_code)]

pub mod orchestrator;
pub mod saga;
pub mod store;

pub use orchestrator::{BookingOrchestrator, BookingRequest};
pub use saga::{BookingSaga, SagaCommand, SagaEvent, SagaState};
pub use store::InMemoryBookingStore;
