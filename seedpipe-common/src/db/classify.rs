//! Storage error classification
//!
//! Write-path failures split into two classes with different handling:
//! transient unavailability, which callers retry with backoff, and
//! constraint violations, which mean the live table no longer matches the
//! rule set and must never be retried.

use sqlx::error::ErrorKind;

/// How a storage error should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorKind {
    /// Transient: locked database, exhausted or closed pool, I/O.
    Unavailable,
    /// Integrity: unique/foreign-key/not-null/check violations, or a
    /// statement that no longer matches the live table.
    Constraint,
}

/// Classify a sqlx error for the write path.
pub fn classify_error(err: &sqlx::Error) -> StorageErrorKind {
    match err {
        sqlx::Error::Database(db_err) => match db_err.kind() {
            ErrorKind::UniqueViolation
            | ErrorKind::ForeignKeyViolation
            | ErrorKind::NotNullViolation
            | ErrorKind::CheckViolation => StorageErrorKind::Constraint,
            _ => {
                let message = db_err.message().to_lowercase();
                if message.contains("locked") || message.contains("busy") {
                    StorageErrorKind::Unavailable
                } else {
                    // Anything else the engine reports (e.g. a missing
                    // column) is drift between rule set and live table.
                    StorageErrorKind::Constraint
                }
            }
        },
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StorageErrorKind::Unavailable
        }
        _ => StorageErrorKind::Unavailable,
    }
}
