//! Directory scanner and differ.
//!
//! Walks a ManagedRoot into a sorted map of path -> FileRecord, skipping the
//! `.kmsync/` control directory, and classifies the difference between two
//! scans into Added / Modified / Deleted / Unchanged.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::config::CheckpointConfig;
use crate::error::{KmsyncError, Result};
use crate::hashing;
use crate::types::FileRecord;

const CONTROL_DIR: &str = ".kmsync";

/// A skipped symlink that resolves outside the ManagedRoot.
#[derive(Debug, Clone)]
pub struct ScanWarning {
    pub path: PathBuf,
    pub message: String,
}

pub struct ScanResult {
    pub files: BTreeMap<String, FileRecord>,
    pub warnings: Vec<ScanWarning>,
}

/// Walks `root`, emitting one FileRecord per regular file reachable from it,
/// keyed by slash-normalized path relative to `root`, in lexicographic
/// order. Symlinks are followed only if they resolve inside `root`; a loop
/// or an external target is recorded as a warning and skipped.
pub fn scan(root: &Path, config: &CheckpointConfig) -> Result<ScanResult> {
    let mut files = BTreeMap::new();
    let mut warnings = Vec::new();
    let canonical_root = root
        .canonicalize()
        .map_err(|e| KmsyncError::io(root, e))?;

    for entry in WalkDir::new(root).follow_links(false).into_iter() {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                let path = err.path().map(Path::to_path_buf).unwrap_or_default();
                warnings.push(ScanWarning {
                    path,
                    message: err.to_string(),
                });
                continue;
            }
        };

        let path = entry.path();
        if is_control_path(root, path) {
            continue;
        }

        let file_type = entry.file_type();
        let is_symlink = file_type.is_symlink();
        if is_symlink {
            match resolve_symlink(path, &canonical_root) {
                Ok(Some(_real)) => {}
                Ok(None) => {
                    warnings.push(ScanWarning {
                        path: path.to_path_buf(),
                        message: "symlink resolves outside ManagedRoot".to_string(),
                    });
                    continue;
                }
                Err(message) => {
                    warnings.push(ScanWarning {
                        path: path.to_path_buf(),
                        message,
                    });
                    continue;
                }
            }
        }

        if !file_type.is_file() && !is_symlink {
            continue;
        }
        // For symlinks use the resolved target's metadata so size/content
        // reflect the file actually pointed to, not the link itself.
        let metadata = match std::fs::metadata(path) {
            Ok(m) => m,
            Err(err) => {
                warnings.push(ScanWarning {
                    path: path.to_path_buf(),
                    message: err.to_string(),
                });
                continue;
            }
        };
        if metadata.is_dir() {
            continue;
        }

        let rel = path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");

        let size = metadata.len();
        let hash = hashing::content_hash(path)?;
        let piece_length = hashing::piece_size(size, config.piece_size_min, config.piece_size_max);
        let piece_hashes = hashing::piece_hashes(path, piece_length)?;

        files.insert(
            rel.clone(),
            FileRecord {
                path: rel,
                size,
                hash: hash.clone(),
                cas_hash: hash,
                piece_length,
                piece_hashes,
                forward_delta: None,
                reverse_delta: None,
            },
        );
    }

    Ok(ScanResult { files, warnings })
}

fn is_control_path(root: &Path, path: &Path) -> bool {
    path.strip_prefix(root)
        .ok()
        .and_then(|rel| rel.components().next())
        .map(|c| c.as_os_str() == CONTROL_DIR)
        .unwrap_or(false)
}

/// Resolves a symlink and checks whether its target is inside `canonical_root`.
/// Returns `Ok(None)` if the link escapes the root, `Err` if it cannot be
/// resolved at all (dangling link, loop), and `Ok(Some(path))` otherwise.
fn resolve_symlink(path: &Path, canonical_root: &Path) -> std::result::Result<Option<PathBuf>, String> {
    match path.canonicalize() {
        Ok(real) if real.starts_with(canonical_root) => Ok(Some(real)),
        Ok(_) => Ok(None),
        Err(e) => Err(e.to_string()),
    }
}

#[derive(Debug, Clone, Default)]
pub struct DiffResult {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
    pub unchanged: Vec<String>,
    /// For a `modified` entry whose case changed between scans (only
    /// possible when `case_sensitive` is false), maps the current path to
    /// the path it was recorded under in `prev`, so callers can still find
    /// its prior FileRecord by identity rather than by literal string match.
    pub renamed_from: BTreeMap<String, String>,
}

/// Folds a path to its identity key under the configured case-sensitivity
/// policy. Case-sensitive hosts (the POSIX default) use the path verbatim;
/// case-insensitive hosts fold to lowercase so `Override/X.2da` and
/// `override/x.2da` are recognized as the same file across scans.
fn identity_key(path: &str, case_sensitive: bool) -> String {
    if case_sensitive {
        path.to_string()
    } else {
        path.to_lowercase()
    }
}

/// Partitions the union of paths between `prev` and `curr` into
/// Added/Modified/Deleted/Unchanged, lexicographically ordered by path.
///
/// Identity between a `prev` path and a `curr` path is decided by
/// `identity_key` under `case_sensitive`: on a case-insensitive host, a path
/// recorded as `Override/X.2da` and rescanned as `override/x.2da` is the
/// same file (a potential rename-by-case is reported as `Modified`, not as
/// an Added/Deleted pair), matching the FileRecord actually stored in
/// `curr` since case is otherwise preserved.
pub fn diff(
    prev: &BTreeMap<String, FileRecord>,
    curr: &BTreeMap<String, FileRecord>,
    case_sensitive: bool,
) -> DiffResult {
    let mut result = DiffResult::default();

    let prev_by_key: BTreeMap<String, &str> = prev
        .keys()
        .map(|p| (identity_key(p, case_sensitive), p.as_str()))
        .collect();
    let curr_by_key: BTreeMap<String, &str> = curr
        .keys()
        .map(|p| (identity_key(p, case_sensitive), p.as_str()))
        .collect();

    for (key, path) in &curr_by_key {
        if !prev_by_key.contains_key(key) {
            result.added.push((*path).to_string());
        }
    }
    for (key, path) in &prev_by_key {
        if !curr_by_key.contains_key(key) {
            result.deleted.push((*path).to_string());
        }
    }
    for (key, curr_path) in &curr_by_key {
        if let Some(prev_path) = prev_by_key.get(key) {
            let curr_record = &curr[*curr_path];
            let prev_record = &prev[*prev_path];
            if prev_record.hash == curr_record.hash && prev_path == curr_path {
                result.unchanged.push((*curr_path).to_string());
            } else {
                result.modified.push((*curr_path).to_string());
                if prev_path != curr_path {
                    result
                        .renamed_from
                        .insert((*curr_path).to_string(), (*prev_path).to_string());
                }
            }
        }
    }

    result.added.sort();
    result.modified.sort();
    result.deleted.sort();
    result.unchanged.sort();
    result
}
