//! Source file provenance, keyed by content checksum
//!
//! A checksum present here means identical content was fully accepted by
//! an earlier run, which is what lets re-ingestion skip unchanged files.

use sqlx::{Sqlite, SqlitePool, Transaction};
use std::collections::HashSet;

/// All checksums ever recorded, loaded once per run for the resume check.
pub async fn all_checksums(
    pool: &SqlitePool,
) -> std::result::Result<HashSet<String>, sqlx::Error> {
    let rows: Vec<(String,)> = sqlx::query_as("SELECT checksum FROM source_files")
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().map(|(checksum,)| checksum).collect())
}

/// Upsert the provenance row for one fully accepted file.
pub async fn record_file(
    tx: &mut Transaction<'_, Sqlite>,
    checksum: &str,
    path: &str,
    run_id: &str,
    record_count: i64,
) -> std::result::Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO source_files (checksum, path, run_id, record_count)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(checksum) DO UPDATE SET
            path = excluded.path,
            run_id = excluded.run_id,
            record_count = excluded.record_count,
            processed_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(checksum)
    .bind(path)
    .bind(run_id)
    .bind(record_count)
    .execute(&mut **tx)
    .await?;

    Ok(())
}
