//! Ingest run rows
//!
//! One row per non-dry run, updated at each phase transition so an
//! operator can see where a run is, or where it stopped. Write functions
//! return raw sqlx errors for the caller's retry loop.

use crate::Result;
use chrono::NaiveDateTime;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Counter columns on a run row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounters {
    pub files_seen: i64,
    pub files_skipped: i64,
    pub records_parsed: i64,
    pub records_accepted: i64,
    pub records_rejected: i64,
    pub duplicates_collapsed: i64,
}

/// One row from ingest_runs.
#[derive(Debug, Clone)]
pub struct RunRow {
    pub run_id: String,
    pub input_folder: String,
    pub state: String,
    pub counters: RunCounters,
    pub summary_json: Option<String>,
    pub started_at: NaiveDateTime,
    pub ended_at: Option<NaiveDateTime>,
}

/// Mint a new run id.
pub fn new_run_id() -> String {
    Uuid::new_v4().to_string()
}

/// Insert the run row in its initial state.
pub async fn insert_run(
    pool: &SqlitePool,
    run_id: &str,
    input_folder: &str,
    state: &str,
) -> std::result::Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO ingest_runs (run_id, input_folder, state) VALUES (?, ?, ?)")
        .bind(run_id)
        .bind(input_folder)
        .bind(state)
        .execute(pool)
        .await?;

    Ok(())
}

/// Record a phase transition.
pub async fn update_run_state(
    pool: &SqlitePool,
    run_id: &str,
    state: &str,
) -> std::result::Result<(), sqlx::Error> {
    sqlx::query("UPDATE ingest_runs SET state = ? WHERE run_id = ?")
        .bind(state)
        .bind(run_id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Finalize the run row with its terminal state, counters and summary.
pub async fn finalize_run(
    pool: &SqlitePool,
    run_id: &str,
    state: &str,
    counters: &RunCounters,
    summary_json: &str,
) -> std::result::Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE ingest_runs
        SET state = ?,
            files_seen = ?,
            files_skipped = ?,
            records_parsed = ?,
            records_accepted = ?,
            records_rejected = ?,
            duplicates_collapsed = ?,
            summary_json = ?,
            ended_at = CURRENT_TIMESTAMP
        WHERE run_id = ?
        "#,
    )
    .bind(state)
    .bind(counters.files_seen)
    .bind(counters.files_skipped)
    .bind(counters.records_parsed)
    .bind(counters.records_accepted)
    .bind(counters.records_rejected)
    .bind(counters.duplicates_collapsed)
    .bind(summary_json)
    .bind(run_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Load a run row for inspection.
pub async fn fetch_run(pool: &SqlitePool, run_id: &str) -> Result<Option<RunRow>> {
    let row = sqlx::query("SELECT * FROM ingest_runs WHERE run_id = ?")
        .bind(run_id)
        .fetch_optional(pool)
        .await?;

    let row = match row {
        Some(row) => row,
        None => return Ok(None),
    };

    Ok(Some(RunRow {
        run_id: row.try_get("run_id")?,
        input_folder: row.try_get("input_folder")?,
        state: row.try_get("state")?,
        counters: RunCounters {
            files_seen: row.try_get("files_seen")?,
            files_skipped: row.try_get("files_skipped")?,
            records_parsed: row.try_get("records_parsed")?,
            records_accepted: row.try_get("records_accepted")?,
            records_rejected: row.try_get("records_rejected")?,
            duplicates_collapsed: row.try_get("duplicates_collapsed")?,
        },
        summary_json: row.try_get("summary_json")?,
        started_at: row.try_get("started_at")?,
        ended_at: row.try_get("ended_at")?,
    }))
}
