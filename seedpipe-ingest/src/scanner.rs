//! Input folder discovery
//!
//! Recursive JSON file discovery with deterministic ordering. The result
//! is sorted by path so record precedence within a run never depends on
//! directory iteration order.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Folder discovery errors
#[derive(Debug, Error)]
pub enum ScanError {
    /// Specified input folder does not exist
    #[error("Input folder not found: {0}")]
    NotFound(PathBuf),

    /// Input path exists but is not a directory
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// Permission denied on the input folder itself
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// General I/O error on the input folder itself
    #[error("I/O error reading {path}: {message}")]
    Io { path: PathBuf, message: String },
}

/// Input folder scanner
pub struct FolderScanner {
    ignore_patterns: Vec<String>,
}

impl FolderScanner {
    /// Create a scanner that skips the usual system clutter.
    pub fn new() -> Self {
        Self {
            ignore_patterns: vec![
                ".DS_Store".to_string(),
                "Thumbs.db".to_string(),
                ".git".to_string(),
            ],
        }
    }

    /// Enumerate `*.json` files under `input`, recursively, sorted by path.
    ///
    /// Errors on the input folder itself are fatal; unreadable children
    /// are logged and skipped so one bad subtree cannot abort the run.
    pub fn scan(&self, input: &Path) -> Result<Vec<PathBuf>, ScanError> {
        if !input.exists() {
            return Err(ScanError::NotFound(input.to_path_buf()));
        }

        if !input.is_dir() {
            return Err(ScanError::NotADirectory(input.to_path_buf()));
        }

        let mut files = Vec::new();

        let walker = WalkDir::new(input)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| {
                let name = entry.file_name().to_string_lossy();
                !self.ignore_patterns.iter().any(|pattern| name == *pattern)
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    if err.path() == Some(input) {
                        return Err(map_walk_error(input, err));
                    }
                    warn!("Skipping unreadable entry: {}", err);
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let is_json = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("json"))
                .unwrap_or(false);

            if is_json {
                files.push(path.to_path_buf());
            } else {
                debug!("Ignoring non-JSON file: {}", path.display());
            }
        }

        files.sort();
        info!(
            "Discovered {} JSON file(s) under {}",
            files.len(),
            input.display()
        );

        Ok(files)
    }
}

impl Default for FolderScanner {
    fn default() -> Self {
        Self::new()
    }
}

fn map_walk_error(input: &Path, err: walkdir::Error) -> ScanError {
    if let Some(io_err) = err.io_error() {
        if io_err.kind() == std::io::ErrorKind::PermissionDenied {
            return ScanError::PermissionDenied(input.to_path_buf());
        }
    }
    ScanError::Io {
        path: input.to_path_buf(),
        message: err.to_string(),
    }
}
