//! SQLite access layer shared by the ingest CLI and the query API
//!
//! Row-level write primitives (`upsert_record`, `record_file`, the run-row
//! functions) return raw `sqlx::Error` so callers can classify and retry;
//! read-path functions return the crate `Result`.

pub mod classify;
pub mod init;
pub mod records;
pub mod runs;
pub mod source_files;

pub use classify::{classify_error, StorageErrorKind};
pub use init::init_database;
