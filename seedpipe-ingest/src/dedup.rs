//! In-run duplicate handling
//!
//! Collapses records that share an identity key within a single run,
//! before anything reaches storage. Later files win under
//! `last-write-wins`; under `reject` the first occurrence is kept and
//! later ones are counted as rejected. Cross-run duplicates are handled
//! by the writer's upsert, not here.

use seedpipe_common::config::DuplicatePolicy;
use seedpipe_common::schema::Record;
use serde::Serialize;
use std::collections::HashMap;

/// One duplicate decision, reported in the run summary.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateNote {
    pub identity_key: String,
    pub kept_source: String,
    pub dropped_source: String,
    pub policy: DuplicatePolicy,
}

#[derive(Debug)]
pub struct DedupOutcome {
    pub records: Vec<Record>,
    pub notes: Vec<DuplicateNote>,
    pub collapsed: u64,
    pub rejected: u64,
}

/// Collapse duplicates in arrival order.
pub fn collapse(records: Vec<Record>, policy: DuplicatePolicy) -> DedupOutcome {
    let mut kept: Vec<Record> = Vec::with_capacity(records.len());
    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut notes = Vec::new();
    let mut collapsed = 0u64;
    let mut rejected = 0u64;

    for record in records {
        match slots.get(&record.identity_key) {
            None => {
                slots.insert(record.identity_key.clone(), kept.len());
                kept.push(record);
            }
            Some(&slot) => match policy {
                DuplicatePolicy::LastWriteWins => {
                    collapsed += 1;
                    notes.push(DuplicateNote {
                        identity_key: record.identity_key.clone(),
                        kept_source: record.source_path.clone(),
                        dropped_source: kept[slot].source_path.clone(),
                        policy,
                    });
                    kept[slot] = record;
                }
                DuplicatePolicy::Reject => {
                    rejected += 1;
                    notes.push(DuplicateNote {
                        identity_key: record.identity_key.clone(),
                        kept_source: kept[slot].source_path.clone(),
                        dropped_source: record.source_path.clone(),
                        policy,
                    });
                }
            },
        }
    }

    if !notes.is_empty() {
        tracing::info!(
            duplicates = notes.len(),
            policy = %policy,
            "Collapsed in-run duplicates"
        );
    }

    DedupOutcome {
        records: kept,
        notes,
        collapsed,
        rejected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seedpipe_common::schema::{FieldValue, SchemaRules};
    use std::collections::BTreeMap;

    fn record(seed: &str, score: f64, source: &str) -> Record {
        let rules = SchemaRules::seed_default();
        let mut values = BTreeMap::new();
        values.insert("seed".to_string(), FieldValue::Text(seed.to_string()));
        values.insert("variation".to_string(), FieldValue::Text(seed.to_string()));
        values.insert("miner".to_string(), FieldValue::Null);
        values.insert("score".to_string(), FieldValue::Real(score));
        Record {
            identity_key: rules.identity_key(&values),
            values,
            raw_texts: BTreeMap::new(),
            source_path: source.to_string(),
        }
    }

    fn score(record: &Record) -> f64 {
        match record.values["score"] {
            FieldValue::Real(f) => f,
            _ => panic!("missing score"),
        }
    }

    #[test]
    fn last_write_wins_keeps_later_record_in_place() {
        let outcome = collapse(
            vec![
                record("a", 1.0, "one.json"),
                record("b", 1.0, "one.json"),
                record("a", 2.0, "two.json"),
            ],
            DuplicatePolicy::LastWriteWins,
        );

        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.collapsed, 1);
        assert_eq!(outcome.rejected, 0);
        // Survivor stays at the first occurrence's position.
        assert_eq!(score(&outcome.records[0]), 2.0);
        assert_eq!(outcome.notes[0].kept_source, "two.json");
        assert_eq!(outcome.notes[0].dropped_source, "one.json");
    }

    #[test]
    fn reject_keeps_first_record() {
        let outcome = collapse(
            vec![record("a", 1.0, "one.json"), record("a", 2.0, "two.json")],
            DuplicatePolicy::Reject,
        );

        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.collapsed, 0);
        assert_eq!(outcome.rejected, 1);
        assert_eq!(score(&outcome.records[0]), 1.0);
        assert_eq!(outcome.notes[0].kept_source, "one.json");
    }

    #[test]
    fn distinct_keys_pass_through_untouched() {
        let outcome = collapse(
            vec![record("a", 1.0, "one.json"), record("b", 2.0, "one.json")],
            DuplicatePolicy::LastWriteWins,
        );

        assert_eq!(outcome.records.len(), 2);
        assert!(outcome.notes.is_empty());
    }
}
