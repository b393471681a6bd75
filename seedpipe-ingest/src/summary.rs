//! Run states and the end-of-run summary

use crate::dedup::DuplicateNote;
use chrono::{DateTime, Utc};
use seedpipe_common::db::runs::RunCounters;
use serde::Serialize;

/// Lifecycle of a single ingest run.
///
/// Phases advance strictly forward; `Completed`, `Failed` and `Cancelled`
/// are terminal. The current state is mirrored to the run row so an
/// interrupted run shows where it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Discovering,
    Parsing,
    Validating,
    Deduplicating,
    Writing,
    Reporting,
    Completed,
    Failed,
    Cancelled,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Discovering => "discovering",
            RunState::Parsing => "parsing",
            RunState::Validating => "validating",
            RunState::Deduplicating => "deduplicating",
            RunState::Writing => "writing",
            RunState::Reporting => "reporting",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
            RunState::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One record the run refused, with enough context to find it again.
#[derive(Debug, Clone, Serialize)]
pub struct RecordRejection {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub reason: String,
}

/// Per-file verdict, in discovery order.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FileOutcome {
    Accepted {
        path: String,
        records: u64,
    },
    PartiallyAccepted {
        path: String,
        accepted: u64,
        rejected: Vec<RecordRejection>,
    },
    Rejected {
        path: String,
        reason: String,
    },
    Skipped {
        path: String,
        reason: String,
    },
}

impl FileOutcome {
    pub fn path(&self) -> &str {
        match self {
            FileOutcome::Accepted { path, .. }
            | FileOutcome::PartiallyAccepted { path, .. }
            | FileOutcome::Rejected { path, .. }
            | FileOutcome::Skipped { path, .. } => path,
        }
    }
}

/// Everything a run has to say for itself once it stops.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub input_folder: String,
    pub state: RunState,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub files_seen: u64,
    pub files_skipped: u64,
    pub records_parsed: u64,
    pub records_accepted: u64,
    pub records_rejected: u64,
    pub duplicates_collapsed: u64,
    pub outcomes: Vec<FileOutcome>,
    pub duplicates: Vec<DuplicateNote>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fatal: Option<String>,
}

impl RunSummary {
    /// Process exit code: 0 clean, 1 partial, 2 fatal.
    pub fn exit_code(&self) -> u8 {
        if self.fatal.is_some() || self.state == RunState::Failed {
            return 2;
        }
        let any_rejected_file = self
            .outcomes
            .iter()
            .any(|o| matches!(o, FileOutcome::Rejected { .. } | FileOutcome::PartiallyAccepted { .. }));
        if self.records_rejected > 0 || any_rejected_file || self.state == RunState::Cancelled {
            return 1;
        }
        0
    }

    /// Counter columns for the run row.
    pub fn counters(&self) -> RunCounters {
        RunCounters {
            files_seen: self.files_seen as i64,
            files_skipped: self.files_skipped as i64,
            records_parsed: self.records_parsed as i64,
            records_accepted: self.records_accepted as i64,
            records_rejected: self.records_rejected as i64,
            duplicates_collapsed: self.duplicates_collapsed as i64,
        }
    }

    /// Human-readable report for the terminal.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let duration = self
            .finished_at
            .signed_duration_since(self.started_at)
            .num_milliseconds();

        out.push_str(&format!(
            "Run {} ({}){}\n",
            self.run_id,
            self.state,
            if self.dry_run { " [dry-run]" } else { "" }
        ));
        out.push_str(&format!("  input:      {}\n", self.input_folder));
        out.push_str(&format!("  duration:   {} ms\n", duration));
        out.push_str(&format!(
            "  files:      {} seen, {} skipped\n",
            self.files_seen, self.files_skipped
        ));
        out.push_str(&format!(
            "  records:    {} parsed, {} accepted, {} rejected\n",
            self.records_parsed, self.records_accepted, self.records_rejected
        ));
        out.push_str(&format!("  duplicates: {} collapsed\n", self.duplicates_collapsed));

        if let Some(fatal) = &self.fatal {
            out.push_str(&format!("  fatal:      {}\n", fatal));
        }

        for outcome in &self.outcomes {
            match outcome {
                FileOutcome::Accepted { .. } | FileOutcome::Skipped { .. } => {}
                FileOutcome::PartiallyAccepted { path, accepted, rejected } => {
                    out.push_str(&format!(
                        "  {}: {} accepted, {} rejected\n",
                        path,
                        accepted,
                        rejected.len()
                    ));
                    for rejection in rejected {
                        match &rejection.field {
                            Some(field) => out.push_str(&format!(
                                "    record {} field {}: {}\n",
                                rejection.index, field, rejection.reason
                            )),
                            None => out.push_str(&format!(
                                "    record {}: {}\n",
                                rejection.index, rejection.reason
                            )),
                        }
                    }
                }
                FileOutcome::Rejected { path, reason } => {
                    out.push_str(&format!("  {}: rejected ({})\n", path, reason));
                }
            }
        }

        out
    }
}
