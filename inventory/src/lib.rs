//! # Ticket Tix Inventory
//!
//! The inventory authority: the ledger of seats and stock pools and the
//! reservation protocol that is the only way to mutate it.
//!
//! - [`InventoryLedger`]: atomic conditional transitions on one seat row or one
//!   category counter
//! - [`InMemoryLedger`]: lock-per-row implementation for tests and single-process use
//! - [`InventoryService`]: validates requests and drives the ledger; implements
//!   [`ReservationProtocol`](ticket_tix_core::ReservationProtocol)

#![forbid(unsafe_code)]

pub mod ledger;
pub mod memory;
pub mod service;

pub use ledger::{InventoryLedger, SeatClaim, StockOutcome};
pub use memory::InMemoryLedger;
pub use service::InventoryService;
