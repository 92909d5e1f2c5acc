//! Content-addressed object store.
//!
//! Objects are immutable blobs keyed by the SHA-256 of their own bytes,
//! stored under a fanout directory (`objects/<aa>/<bb>/<hash>`). Writes go
//! to a temp file in `objects/tmp/`, are fsynced, then renamed into place so
//! a reader that observes the final path always sees complete, correctly
//! hashed bytes.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::{KmsyncError, Result};
use crate::hashing;

pub struct ObjectStore {
    root: PathBuf,
}

impl ObjectStore {
    /// `root` is the `objects/` or `deltas/` directory itself.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("tmp")).map_err(|e| KmsyncError::io(&root, e))?;
        Ok(Self { root })
    }

    fn fanout_path(&self, hash: &str) -> PathBuf {
        let a = &hash[0..2];
        let b = &hash[2..4];
        self.root.join(a).join(b).join(hash)
    }

    /// Computes the SHA-256 of `bytes`; if an object with that key already
    /// exists it is reused (deduplication), otherwise `bytes` is written
    /// atomically. Returns the hex key.
    pub fn put(&self, bytes: &[u8]) -> Result<String> {
        let hash = hashing::content_hash_bytes(bytes);
        let dest = self.fanout_path(&hash);
        if dest.exists() {
            return Ok(hash);
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| KmsyncError::io(parent, e))?;
        }

        let tmp_dir = self.root.join("tmp");
        let mut tmp = NamedTempFile::new_in(&tmp_dir).map_err(|e| KmsyncError::io(&tmp_dir, e))?;
        tmp.write_all(bytes)
            .map_err(|e| KmsyncError::io(tmp.path(), e))?;
        tmp.as_file().sync_all().map_err(|e| KmsyncError::io(tmp.path(), e))?;

        // If a concurrent writer won the race, our temp file is simply
        // dropped (and thus removed) once `persist` fails to find it needed;
        // the destination already holds the correct bytes either way.
        match tmp.persist(&dest) {
            Ok(_) => {}
            Err(persist_err) if dest.exists() => {
                drop(persist_err);
            }
            Err(persist_err) => {
                return Err(KmsyncError::io(&dest, persist_err.error));
            }
        }
        Ok(hash)
    }

    pub fn get(&self, hash: &str) -> Result<Vec<u8>> {
        let path = self.fanout_path(hash);
        fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                KmsyncError::MissingCasObject {
                    hash: hash.to_string(),
                }
            } else {
                KmsyncError::io(&path, e)
            }
        })
    }

    pub fn exists(&self, hash: &str) -> bool {
        self.fanout_path(hash).exists()
    }

    /// Removes an object. Only meant to be called by GC, which must hold
    /// the ManagedRoot exclusive lock while doing so.
    pub fn delete(&self, hash: &str) -> Result<()> {
        let path = self.fanout_path(hash);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(KmsyncError::io(&path, e)),
        }
    }

    /// Lists every object hash currently stored, for GC's sweep phase.
    pub fn all_hashes(&self) -> Result<Vec<String>> {
        let mut hashes = Vec::new();
        for a_entry in read_dir_ignoring_tmp(&self.root)? {
            let a_path = a_entry.path();
            if !a_path.is_dir() {
                continue;
            }
            for b_entry in fs::read_dir(&a_path).map_err(|e| KmsyncError::io(&a_path, e))? {
                let b_entry = b_entry.map_err(|e| KmsyncError::io(&a_path, e))?;
                let b_path = b_entry.path();
                if !b_path.is_dir() {
                    continue;
                }
                for obj_entry in fs::read_dir(&b_path).map_err(|e| KmsyncError::io(&b_path, e))? {
                    let obj_entry = obj_entry.map_err(|e| KmsyncError::io(&b_path, e))?;
                    if let Some(name) = obj_entry.file_name().to_str() {
                        hashes.push(name.to_string());
                    }
                }
            }
        }
        Ok(hashes)
    }
}

fn read_dir_ignoring_tmp(root: &Path) -> Result<Vec<fs::DirEntry>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(root).map_err(|e| KmsyncError::io(root, e))? {
        let entry = entry.map_err(|e| KmsyncError::io(root, e))?;
        if entry.file_name() == "tmp" {
            continue;
        }
        out.push(entry);
    }
    Ok(out)
}
