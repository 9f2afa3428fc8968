//! Error taxonomy shared by the reservation protocol, the booking store and
//! the booking orchestrator.
//!
//! `NotFound`, `InvalidArgument` and `Conflict` are caller-correctable and are
//! propagated unchanged to the booking caller. `Internal` covers storage and
//! transport failures.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias used throughout Ticket Tix.
pub type Result<T> = std::result::Result<T, TicketError>;

/// Errors produced by inventory and booking operations.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketError {
    /// Seat, category, event or booking does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed or kind-mismatched request (seat label on a standing category,
    /// category belonging to another event, duplicate attempt id, ...).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Seat not available, stock exhausted, or reservation state mismatch.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Storage or transport failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Discriminant of a [`TicketError`], for matching without the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// See [`TicketError::NotFound`]
    NotFound,
    /// See [`TicketError::InvalidArgument`]
    InvalidArgument,
    /// See [`TicketError::Conflict`]
    Conflict,
    /// See [`TicketError::Internal`]
    Internal,
}

impl ErrorKind {
    /// Stable label for logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::InvalidArgument => "invalid_argument",
            Self::Conflict => "conflict",
            Self::Internal => "internal",
        }
    }
}

impl TicketError {
    /// Build a `NotFound` error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Build an `InvalidArgument` error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Build a `Conflict` error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Build an `Internal` error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// The kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// The message without the kind prefix.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::NotFound(m) | Self::InvalidArgument(m) | Self::Conflict(m) | Self::Internal(m) => m,
        }
    }

    /// Whether the caller can fix the request (pick another seat, correct input).
    ///
    /// Only `Internal` errors are worth retrying, and only when the operation is
    /// idempotent.
    #[must_use]
    pub const fn is_caller_correctable(&self) -> bool {
        !matches!(self, Self::Internal(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        assert_eq!(TicketError::not_found("x").kind(), ErrorKind::NotFound);
        assert_eq!(TicketError::invalid_argument("x").kind(), ErrorKind::InvalidArgument);
        assert_eq!(TicketError::conflict("x").kind(), ErrorKind::Conflict);
        assert_eq!(TicketError::internal("x").kind(), ErrorKind::Internal);
    }

    #[test]
    fn display_includes_reason() {
        let err = TicketError::conflict("seat VIP-7 is SOLD");
        assert_eq!(err.to_string(), "Conflict: seat VIP-7 is SOLD");
        assert_eq!(err.message(), "seat VIP-7 is SOLD");
    }

    #[test]
    fn only_internal_is_not_caller_correctable() {
        assert!(TicketError::conflict("sold out").is_caller_correctable());
        assert!(!TicketError::internal("db down").is_caller_correctable());
    }
}
