//! Partial-download path layout.
//!
//! Downloads land under `<cache_dir>/.partial/<content_id>` while in flight
//! and are promoted into the CAS (via `ObjectStore::put`) only once fully
//! verified. Keeping partial files under a dedicated subdirectory, rather
//! than alongside finished content, mirrors the cache/marketplaces split the
//! plugin fetcher uses for its own working directories.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{KmsyncError, Result};

const PARTIAL_DIR: &str = ".partial";

pub struct PartialDownloads {
    cache_dir: PathBuf,
}

impl PartialDownloads {
    pub fn new(cache_dir: &Path) -> Self {
        Self {
            cache_dir: cache_dir.to_path_buf(),
        }
    }

    pub fn partial_dir(&self) -> PathBuf {
        self.cache_dir.join(PARTIAL_DIR)
    }

    /// Path a given content id's in-progress download should be written to.
    /// Does not create the directory; callers that write should call
    /// `ensure_dir` first.
    pub fn path_for(&self, content_id: &str) -> PathBuf {
        self.partial_dir().join(content_id)
    }

    pub fn ensure_dir(&self) -> Result<()> {
        let dir = self.partial_dir();
        fs::create_dir_all(&dir).map_err(|e| KmsyncError::io(&dir, e))
    }

    /// Removes a partial download's on-disk file, e.g. after it has been
    /// promoted into the object store or abandoned. Missing files are not
    /// an error.
    pub fn discard(&self, content_id: &str) -> Result<()> {
        let path = self.path_for(content_id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(KmsyncError::io(&path, e)),
        }
    }

    /// Bytes already written for a resumable partial download, or 0 if none
    /// exists yet.
    pub fn existing_len(&self, content_id: &str) -> Result<u64> {
        let path = self.path_for(content_id);
        match fs::metadata(&path) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(KmsyncError::io(&path, e)),
        }
    }

    /// Lists content ids with an in-progress partial download on disk.
    pub fn list(&self) -> Result<Vec<String>> {
        let dir = self.partial_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in fs::read_dir(&dir).map_err(|e| KmsyncError::io(&dir, e))? {
            let entry = entry.map_err(|e| KmsyncError::io(&dir, e))?;
            if let Some(name) = entry.file_name().to_str() {
                ids.push(name.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}
