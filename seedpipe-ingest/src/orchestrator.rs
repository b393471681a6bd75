//! Ingest run orchestrator
//!
//! Drives one run through its states:
//!
//! discovering → parsing → validating → deduplicating → writing → reporting
//!
//! terminating in completed, failed or cancelled. Per-file and per-record
//! problems become outcomes in the summary and never abort the run; storage
//! problems abort after retry exhaustion. Non-dry runs persist each
//! transition on their run row.

use crate::adapters::Adapter;
use crate::dedup::{self, DuplicateNote};
use crate::parse::{parse_files, ParseResult};
use crate::retry::retry_storage;
use crate::scanner::{FolderScanner, ScanError};
use crate::summary::{FileOutcome, RecordRejection, RunState, RunSummary};
use crate::validate::validate_document;
use crate::writer::{RecordWriter, WriteError};
use chrono::Utc;
use seedpipe_common::config::{DuplicatePolicy, IngestConfig};
use seedpipe_common::db::runs::{insert_run, new_run_id, update_run_state};
use seedpipe_common::db::source_files::{all_checksums, record_file};
use seedpipe_common::schema::{Record, SchemaRules};
use seedpipe_common::{Error, Result};
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Per-run knobs, resolved from config plus CLI overrides.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub adapter: Adapter,
    pub batch_size: usize,
    pub on_duplicate: DuplicatePolicy,
    pub parse_workers: usize,
    pub max_write_attempts: u32,
    pub retry_base_delay: Duration,
    pub run_name: Option<String>,
    pub dry_run: bool,
    pub resume: bool,
}

impl RunOptions {
    pub fn from_config(config: &IngestConfig) -> Self {
        RunOptions {
            adapter: Adapter::default(),
            batch_size: config.batch_size,
            on_duplicate: config.on_duplicate,
            parse_workers: config.parse_workers.max(1),
            max_write_attempts: config.max_write_attempts,
            retry_base_delay: Duration::from_millis(config.retry_base_delay_ms),
            run_name: None,
            dry_run: false,
            resume: true,
        }
    }
}

pub struct IngestOrchestrator {
    pool: SqlitePool,
    rules: SchemaRules,
    options: RunOptions,
}

impl IngestOrchestrator {
    pub fn new(pool: SqlitePool, rules: SchemaRules, options: RunOptions) -> Self {
        Self {
            pool,
            rules,
            options,
        }
    }

    /// Run one ingest over `input_folder`.
    ///
    /// Returns `Err` only when the input folder cannot be scanned or the
    /// parse phase dies; every other failure mode lands in the summary.
    pub async fn run(
        &self,
        input_folder: &Path,
        cancel: &CancellationToken,
    ) -> Result<RunSummary> {
        let started_at = Utc::now();
        let run_id = self
            .options
            .run_name
            .clone()
            .unwrap_or_else(new_run_id);
        let input_display = input_folder.display().to_string();

        tracing::info!(
            run_id = %run_id,
            input = %input_display,
            adapter = %self.options.adapter,
            dry_run = self.options.dry_run,
            "Starting ingest run"
        );

        let files = FolderScanner::new()
            .scan(input_folder)
            .map_err(map_scan_error)?;
        let files_seen = files.len() as u64;

        let mut outcomes: Vec<FileOutcome> = Vec::new();
        let mut duplicates: Vec<DuplicateNote> = Vec::new();
        let mut files_skipped = 0u64;
        let mut records_parsed = 0u64;
        let mut records_accepted = 0u64;
        let mut records_rejected = 0u64;
        let mut duplicates_collapsed = 0u64;
        let mut fatal: Option<String> = None;
        let mut cancelled = false;
        let mut run_row_created = false;

        if !self.options.dry_run {
            let insert = retry_storage(
                "run row insert",
                self.options.max_write_attempts,
                self.options.retry_base_delay,
                || insert_run(&self.pool, &run_id, &input_display, RunState::Discovering.as_str()),
            )
            .await;
            match insert {
                Ok(()) => run_row_created = true,
                Err(e) => fatal = Some(format!("could not create run row: {}", e)),
            }
        }

        // Resume set is loaded once per run; files whose checksum is already
        // recorded are skipped during parse.
        let mut known_checksums = HashSet::new();
        if fatal.is_none() && self.options.resume {
            match retry_storage(
                "resume checksum load",
                self.options.max_write_attempts,
                self.options.retry_base_delay,
                || all_checksums(&self.pool),
            )
            .await
            {
                Ok(set) => known_checksums = set,
                Err(e) => fatal = Some(format!("could not load resume checksums: {}", e)),
            }
        }

        let mut survivors: Vec<Record> = Vec::new();
        let mut accepted_files: Vec<(String, String, i64)> = Vec::new();

        if fatal.is_none() {
            if cancel.is_cancelled() {
                cancelled = true;
            } else {
                self.transition(&run_id, RunState::Parsing).await;
                let parsed = parse_files(
                    files,
                    self.options.adapter,
                    self.options.parse_workers,
                    known_checksums,
                )
                .await?;

                if cancel.is_cancelled() {
                    cancelled = true;
                } else {
                    self.transition(&run_id, RunState::Validating).await;
                    let mut validated: Vec<Record> = Vec::new();

                    for file in &parsed {
                        let path = file.path.display().to_string();
                        match &file.result {
                            ParseResult::ResumeSkip => {
                                files_skipped += 1;
                                outcomes.push(FileOutcome::Skipped {
                                    path,
                                    reason: "content already ingested (checksum match)"
                                        .to_string(),
                                });
                            }
                            ParseResult::Failed(reason) => {
                                outcomes.push(FileOutcome::Rejected {
                                    path,
                                    reason: reason.clone(),
                                });
                            }
                            ParseResult::Parsed {
                                documents,
                                shape_errors,
                            } => {
                                records_parsed += documents.len() as u64;

                                let mut rejected: Vec<RecordRejection> = shape_errors
                                    .iter()
                                    .map(|(index, reason)| RecordRejection {
                                        index: *index,
                                        field: None,
                                        reason: reason.clone(),
                                    })
                                    .collect();
                                let mut file_records: Vec<Record> = Vec::new();

                                for (index, document) in documents.iter().enumerate() {
                                    match validate_document(&self.rules, document, &path) {
                                        Ok(record) => file_records.push(record),
                                        Err(failure) => rejected.push(RecordRejection {
                                            index,
                                            field: failure.field,
                                            reason: failure.message,
                                        }),
                                    }
                                }

                                records_rejected += rejected.len() as u64;

                                if rejected.is_empty() {
                                    accepted_files.push((
                                        file.checksum.clone(),
                                        path.clone(),
                                        file_records.len() as i64,
                                    ));
                                    outcomes.push(FileOutcome::Accepted {
                                        path,
                                        records: file_records.len() as u64,
                                    });
                                } else {
                                    outcomes.push(FileOutcome::PartiallyAccepted {
                                        path,
                                        accepted: file_records.len() as u64,
                                        rejected,
                                    });
                                }

                                validated.append(&mut file_records);
                            }
                        }
                    }

                    self.transition(&run_id, RunState::Deduplicating).await;
                    let deduped = dedup::collapse(validated, self.options.on_duplicate);
                    survivors = deduped.records;
                    duplicates = deduped.notes;
                    duplicates_collapsed = deduped.collapsed;
                    records_rejected += deduped.rejected;
                }
            }
        }

        // Dedup-to-write boundary.
        if fatal.is_none() && !cancelled && cancel.is_cancelled() {
            cancelled = true;
        }

        if fatal.is_none() && !cancelled {
            if self.options.dry_run {
                records_accepted = survivors.len() as u64;
            } else {
                self.transition(&run_id, RunState::Writing).await;
                let writer = RecordWriter::new(
                    self.pool.clone(),
                    self.options.batch_size,
                    self.options.max_write_attempts,
                    self.options.retry_base_delay,
                );
                let write = writer.write_all(&self.rules, &survivors, &run_id, cancel).await;
                records_accepted = write.records_written;

                match write.error {
                    None => {
                        if let Err(e) = self
                            .record_provenance(&run_id, &accepted_files)
                            .await
                        {
                            fatal = Some(format!(
                                "{} (records are committed; re-running is safe, the upsert is idempotent)",
                                e
                            ));
                        }
                    }
                    Some(WriteError::Cancelled) => cancelled = true,
                    Some(WriteError::Storage(e)) => {
                        let standing = if write.batches_committed == 0 {
                            "no batch was committed, the store is unchanged"
                        } else {
                            "earlier batches are committed; re-running is safe, the upsert is idempotent"
                        };
                        fatal = Some(format!("{} ({})", e, standing));
                    }
                }
            }
        }

        if run_row_created {
            self.transition(&run_id, RunState::Reporting).await;
        }

        let state = if fatal.is_some() {
            RunState::Failed
        } else if cancelled {
            RunState::Cancelled
        } else {
            RunState::Completed
        };

        let summary = RunSummary {
            run_id: run_id.clone(),
            input_folder: input_display,
            state,
            dry_run: self.options.dry_run,
            started_at,
            finished_at: Utc::now(),
            files_seen,
            files_skipped,
            records_parsed,
            records_accepted,
            records_rejected,
            duplicates_collapsed,
            outcomes,
            duplicates,
            fatal,
        };

        if run_row_created {
            self.finalize(&summary).await;
        }

        tracing::info!(
            run_id = %summary.run_id,
            state = %summary.state,
            files = summary.files_seen,
            accepted = summary.records_accepted,
            rejected = summary.records_rejected,
            "Ingest run finished"
        );

        Ok(summary)
    }

    /// Record provenance rows for files that were accepted in full, inside
    /// one transaction so resume never sees a half-recorded run.
    async fn record_provenance(
        &self,
        run_id: &str,
        accepted_files: &[(String, String, i64)],
    ) -> std::result::Result<(), crate::retry::StorageFailure> {
        if accepted_files.is_empty() {
            return Ok(());
        }

        retry_storage(
            "source file provenance",
            self.options.max_write_attempts,
            self.options.retry_base_delay,
            || async {
                let mut tx = self.pool.begin().await?;
                for (checksum, path, record_count) in accepted_files {
                    record_file(&mut tx, checksum, path, run_id, *record_count).await?;
                }
                tx.commit().await
            },
        )
        .await
    }

    async fn transition(&self, run_id: &str, state: RunState) {
        if self.options.dry_run {
            return;
        }
        tracing::debug!(run_id = %run_id, state = %state, "Run state transition");
        if let Err(e) = update_run_state(&self.pool, run_id, state.as_str()).await {
            tracing::warn!(
                run_id = %run_id,
                state = %state,
                error = %e,
                "Could not persist run state transition"
            );
        }
    }

    async fn finalize(&self, summary: &RunSummary) {
        let summary_json = match serde_json::to_string(summary) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(error = %e, "Could not serialize run summary");
                return;
            }
        };

        if let Err(e) = seedpipe_common::db::runs::finalize_run(
            &self.pool,
            &summary.run_id,
            summary.state.as_str(),
            &summary.counters(),
            &summary_json,
        )
        .await
        {
            tracing::warn!(
                run_id = %summary.run_id,
                error = %e,
                "Could not finalize run row"
            );
        }
    }
}

fn map_scan_error(e: ScanError) -> Error {
    match e {
        ScanError::NotFound(path) => {
            Error::NotFound(format!("input folder not found: {}", path.display()))
        }
        ScanError::NotADirectory(path) => {
            Error::InvalidInput(format!("input path is not a directory: {}", path.display()))
        }
        ScanError::PermissionDenied(path) => Error::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            format!("input folder not readable: {}", path.display()),
        )),
        ScanError::Io { path, message } => Error::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("{}: {}", path.display(), message),
        )),
    }
}
