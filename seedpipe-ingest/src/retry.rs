//! Bounded retry for storage operations
//!
//! SQLite under WAL returns transient busy/locked errors when another
//! connection holds the write lock. Those are retried with doubling
//! delays up to a configured attempt count; constraint violations are
//! never retried.

use seedpipe_common::db::{classify_error, StorageErrorKind};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

const MAX_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// A storage operation that did not succeed.
#[derive(Debug, Error)]
pub enum StorageFailure {
    #[error("storage unavailable after {attempts} attempt(s): {source}")]
    Unavailable { attempts: u32, source: sqlx::Error },
    #[error("constraint violation: {0}")]
    Constraint(sqlx::Error),
}

/// Run `operation`, retrying transient storage errors up to `max_attempts`
/// with a doubling delay starting at `base_delay`.
pub async fn retry_storage<T, F, Fut>(
    operation_name: &str,
    max_attempts: u32,
    base_delay: Duration,
    mut operation: F,
) -> Result<T, StorageFailure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, sqlx::Error>>,
{
    let max_attempts = max_attempts.max(1);
    let mut delay = base_delay;
    let mut attempt = 1u32;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => match classify_error(&e) {
                StorageErrorKind::Constraint => return Err(StorageFailure::Constraint(e)),
                StorageErrorKind::Unavailable => {
                    if attempt >= max_attempts {
                        tracing::error!(
                            operation = operation_name,
                            attempts = attempt,
                            error = %e,
                            "Storage still unavailable, giving up"
                        );
                        return Err(StorageFailure::Unavailable {
                            attempts: attempt,
                            source: e,
                        });
                    }
                    tracing::warn!(
                        operation = operation_name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Storage unavailable, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2).min(MAX_RETRY_DELAY);
                    attempt += 1;
                }
            },
        }
    }
}
