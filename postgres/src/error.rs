//! Mapping from `sqlx` failures to [`TicketError`].

use ticket_tix_core::TicketError;

/// Counter for database failures, labelled by `SQLSTATE` class.
pub const DB_ERRORS_TOTAL: &str = "ticket_tix_db_errors_total";

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";
const CHECK_VIOLATION: &str = "23514";

/// Convert a `sqlx` error.
///
/// Constraint violations are the caller's fault and become
/// `InvalidArgument`; everything else (connectivity, timeouts, pool
/// exhaustion, decoding) becomes `Internal`.
pub fn map_sqlx(err: sqlx::Error) -> TicketError {
    let code = err
        .as_database_error()
        .and_then(|db| db.code())
        .map(|code| code.into_owned());

    match code.as_deref() {
        Some(UNIQUE_VIOLATION | FOREIGN_KEY_VIOLATION | CHECK_VIOLATION) => {
            metrics::counter!(DB_ERRORS_TOTAL, "class" => "constraint").increment(1);
            TicketError::invalid_argument(err.to_string())
        }
        _ => {
            metrics::counter!(DB_ERRORS_TOTAL, "class" => "internal").increment(1);
            tracing::warn!(error = %err, sqlstate = ?code, "database operation failed");
            TicketError::internal(err.to_string())
        }
    }
}

/// Convert a count read from the database into a `u32`.
pub(crate) fn to_u32(value: i64, what: &str) -> Result<u32, TicketError> {
    u32::try_from(value).map_err(|_| TicketError::internal(format!("{what} out of range: {value}")))
}
