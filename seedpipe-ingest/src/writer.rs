//! Batched record writer
//!
//! Commits accepted records in fixed-size batches, each inside its own
//! transaction. A batch either commits whole or leaves no trace; a
//! failed batch never prevents earlier committed batches from standing.
//! Cancellation is honored between batches, never inside one.

use crate::retry::{retry_storage, StorageFailure};
use seedpipe_common::db::records::{upsert_record, upsert_sql};
use seedpipe_common::schema::{Record, SchemaRules};
use sqlx::SqlitePool;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum WriteError {
    #[error(transparent)]
    Storage(#[from] StorageFailure),
    #[error("run cancelled before completion")]
    Cancelled,
}

/// What the write phase accomplished before stopping.
#[derive(Debug, Default)]
pub struct WriteOutcome {
    pub records_written: u64,
    pub batches_committed: u64,
    pub error: Option<WriteError>,
}

pub struct RecordWriter {
    pool: SqlitePool,
    batch_size: usize,
    max_attempts: u32,
    base_delay: Duration,
}

impl RecordWriter {
    pub fn new(
        pool: SqlitePool,
        batch_size: usize,
        max_attempts: u32,
        base_delay: Duration,
    ) -> Self {
        Self {
            pool,
            batch_size: batch_size.max(1),
            max_attempts,
            base_delay,
        }
    }

    /// Write all records in batches, stopping at the first failed batch
    /// or at cancellation.
    pub async fn write_all(
        &self,
        rules: &SchemaRules,
        records: &[Record],
        run_id: &str,
        cancel: &CancellationToken,
    ) -> WriteOutcome {
        let mut outcome = WriteOutcome::default();
        if records.is_empty() {
            return outcome;
        }

        let sql = upsert_sql(rules);

        for batch in records.chunks(self.batch_size) {
            if cancel.is_cancelled() {
                tracing::warn!(
                    records_written = outcome.records_written,
                    "Write phase cancelled"
                );
                outcome.error = Some(WriteError::Cancelled);
                return outcome;
            }

            let result = retry_storage("record batch", self.max_attempts, self.base_delay, || {
                self.try_write_batch(&sql, rules, batch, run_id)
            })
            .await;

            match result {
                Ok(()) => {
                    outcome.records_written += batch.len() as u64;
                    outcome.batches_committed += 1;
                    tracing::debug!(
                        batch = outcome.batches_committed,
                        records = batch.len(),
                        "Committed record batch"
                    );
                }
                Err(e) => {
                    tracing::error!(
                        batch = outcome.batches_committed + 1,
                        error = %e,
                        "Record batch failed, stopping write phase"
                    );
                    outcome.error = Some(WriteError::Storage(e));
                    return outcome;
                }
            }
        }

        tracing::info!(
            records = outcome.records_written,
            batches = outcome.batches_committed,
            "Write phase complete"
        );
        outcome
    }

    async fn try_write_batch(
        &self,
        sql: &str,
        rules: &SchemaRules,
        batch: &[Record],
        run_id: &str,
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for record in batch {
            upsert_record(&mut tx, rules, sql, record, run_id).await?;
        }
        tx.commit().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seedpipe_common::db::records::count_records;
    use seedpipe_common::schema::{FieldKind, FieldRule, FieldValue, SchemaRules};
    use std::collections::BTreeMap;

    fn test_rules() -> SchemaRules {
        SchemaRules {
            fields: vec![
                FieldRule::new("id", FieldKind::String).required().identity(),
                FieldRule::new("v", FieldKind::Integer),
            ],
            collapse_repeats: false,
        }
    }

    fn record(rules: &SchemaRules, id: &str, v: i64) -> Record {
        let mut values = BTreeMap::new();
        values.insert("id".to_string(), FieldValue::Text(id.to_string()));
        values.insert("v".to_string(), FieldValue::Integer(v));
        Record {
            identity_key: rules.identity_key(&values),
            values,
            raw_texts: BTreeMap::new(),
            source_path: "test.json".to_string(),
        }
    }

    async fn memory_pool(rules: &SchemaRules) -> SqlitePool {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        seedpipe_common::db::init::provision_records_table(&pool, rules)
            .await
            .unwrap();
        pool
    }

    #[tokio::test]
    async fn writes_all_records_across_batches() {
        let rules = test_rules();
        let pool = memory_pool(&rules).await;
        let records: Vec<Record> = (0..5).map(|i| record(&rules, &format!("r{}", i), i)).collect();

        let writer = RecordWriter::new(pool.clone(), 2, 3, Duration::from_millis(1));
        let outcome = writer
            .write_all(&rules, &records, "run-1", &CancellationToken::new())
            .await;

        assert!(outcome.error.is_none());
        assert_eq!(outcome.records_written, 5);
        assert_eq!(outcome.batches_committed, 3);
        assert_eq!(count_records(&pool).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn cancelled_token_writes_nothing() {
        let rules = test_rules();
        let pool = memory_pool(&rules).await;
        let records = vec![record(&rules, "a", 1)];

        let cancel = CancellationToken::new();
        cancel.cancel();

        let writer = RecordWriter::new(pool.clone(), 10, 3, Duration::from_millis(1));
        let outcome = writer.write_all(&rules, &records, "run-1", &cancel).await;

        assert!(matches!(outcome.error, Some(WriteError::Cancelled)));
        assert_eq!(outcome.records_written, 0);
        assert_eq!(count_records(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn empty_input_is_a_no_op() {
        let rules = test_rules();
        let pool = memory_pool(&rules).await;

        let writer = RecordWriter::new(pool, 10, 3, Duration::from_millis(1));
        let outcome = writer
            .write_all(&rules, &[], "run-1", &CancellationToken::new())
            .await;

        assert!(outcome.error.is_none());
        assert_eq!(outcome.batches_committed, 0);
    }
}
