//! Parallel file parsing
//!
//! Reads, checksums and JSON-parses the discovered files on a rayon pool
//! sized by configuration, running inside `spawn_blocking` so the tokio
//! runtime stays responsive. Output order matches input order regardless
//! of which worker finished first.

use crate::adapters::Adapter;
use rayon::prelude::*;
use seedpipe_common::{Error, Result};
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// One discovered file after the parse phase.
#[derive(Debug)]
pub struct ParsedFile {
    pub path: PathBuf,
    pub checksum: String,
    pub result: ParseResult,
}

#[derive(Debug)]
pub enum ParseResult {
    /// File was read and adapted; shape errors are per-element rejects.
    Parsed {
        documents: Vec<crate::adapters::RawDocument>,
        shape_errors: Vec<(usize, String)>,
    },
    /// Checksum already present in `source_files`, content skipped.
    ResumeSkip,
    /// File could not be read or is not valid JSON.
    Failed(String),
}

/// Parse all files in parallel, preserving discovery order.
pub async fn parse_files(
    files: Vec<PathBuf>,
    adapter: Adapter,
    workers: usize,
    known_checksums: HashSet<String>,
) -> Result<Vec<ParsedFile>> {
    if files.is_empty() {
        return Ok(Vec::new());
    }

    tracing::debug!(
        files = files.len(),
        workers,
        "Starting parallel parse in spawn_blocking"
    );

    let parsed = tokio::task::spawn_blocking(move || -> Result<Vec<ParsedFile>> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build parse pool: {}", e)))?;

        let results: Vec<ParsedFile> = pool.install(|| {
            files
                .par_iter()
                .map(|path| parse_one(path, adapter, &known_checksums))
                .collect()
        });

        Ok(results)
    })
    .await
    .map_err(|e| Error::Internal(format!("Parse task panicked: {}", e)))??;

    let skipped = parsed
        .iter()
        .filter(|f| matches!(f.result, ParseResult::ResumeSkip))
        .count();
    tracing::info!(
        files = parsed.len(),
        skipped,
        "Parse phase complete"
    );

    Ok(parsed)
}

fn parse_one(path: &Path, adapter: Adapter, known_checksums: &HashSet<String>) -> ParsedFile {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            return ParsedFile {
                path: path.to_path_buf(),
                checksum: String::new(),
                result: ParseResult::Failed(format!("failed to read file: {}", e)),
            };
        }
    };

    let checksum = content_hash_bytes(&bytes);

    if known_checksums.contains(&checksum) {
        return ParsedFile {
            path: path.to_path_buf(),
            checksum,
            result: ParseResult::ResumeSkip,
        };
    }

    let value: Value = match serde_json::from_slice(&bytes) {
        Ok(value) => value,
        Err(e) => {
            return ParsedFile {
                path: path.to_path_buf(),
                checksum,
                result: ParseResult::Failed(format!("invalid JSON: {}", e)),
            };
        }
    };

    let output = adapter.adapt(&value);

    ParsedFile {
        path: path.to_path_buf(),
        checksum,
        result: ParseResult::Parsed {
            documents: output.documents,
            shape_errors: output.shape_errors,
        },
    }
}

fn content_hash_bytes(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use seedpipe_common::normalize::content_hash;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn parses_files_in_input_order() {
        let dir = TempDir::new().unwrap();
        let a = write(&dir, "a.json", r#"{"seed": "x"}"#);
        let b = write(&dir, "b.json", r#"[{"seed": "y"}, {"seed": "z"}]"#);

        let parsed = parse_files(
            vec![a.clone(), b.clone()],
            Adapter::RecordsV1,
            2,
            HashSet::new(),
        )
        .await
        .unwrap();

        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].path, a);
        assert_eq!(parsed[1].path, b);
        match &parsed[1].result {
            ParseResult::Parsed { documents, .. } => assert_eq!(documents.len(), 2),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn malformed_json_fails_only_that_file() {
        let dir = TempDir::new().unwrap();
        let good = write(&dir, "good.json", r#"{"seed": "x"}"#);
        let bad = write(&dir, "bad.json", "{not json");

        let parsed = parse_files(vec![good, bad], Adapter::RecordsV1, 2, HashSet::new())
            .await
            .unwrap();

        assert!(matches!(parsed[0].result, ParseResult::Parsed { .. }));
        match &parsed[1].result {
            ParseResult::Failed(reason) => assert!(reason.contains("invalid JSON")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn known_checksums_are_skipped_without_parsing() {
        let dir = TempDir::new().unwrap();
        let content = r#"{"seed": "x"}"#;
        let path = write(&dir, "a.json", content);

        let mut known = HashSet::new();
        known.insert(content_hash(content));

        let parsed = parse_files(vec![path], Adapter::RecordsV1, 1, known)
            .await
            .unwrap();
        assert!(matches!(parsed[0].result, ParseResult::ResumeSkip));
    }

    #[tokio::test]
    async fn unreadable_file_reports_read_failure() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("gone.json");

        let parsed = parse_files(vec![missing], Adapter::RecordsV1, 1, HashSet::new())
            .await
            .unwrap();
        match &parsed[0].result {
            ParseResult::Failed(reason) => assert!(reason.contains("failed to read")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn byte_and_str_hashes_agree() {
        let text = r#"{"seed": "Michaël"}"#;
        assert_eq!(content_hash_bytes(text.as_bytes()), content_hash(text));
    }
}
