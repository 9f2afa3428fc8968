//! # Ticket Tix Server
//!
//! Configuration, wiring and lifecycle for the service binary.

#![forbid(unsafe_code)]

pub mod app;
pub mod config;
pub mod lifecycle;

pub use app::App;
pub use config::{Config, ConfigError};
