//! Checkpoint and session integrity validation.
//!
//! Unlike every other fallible Engine operation, validation does not abort on
//! the first problem it finds: it walks every FileRecord of a checkpoint,
//! collecting one message per defect, and hands the caller the full list so
//! remediation (re-download, re-run GC, discard the session) can be driven
//! from it. Grounded on `history::checkpoint::CheckpointManager`'s chain-
//! walking code in `session.rs`, reused here for the "hash the reconstructed
//! bytes" sampling pass instead of a full restore.

use std::collections::BTreeMap;

use crate::error::Result;
use crate::hashing;
use crate::session::Engine;
use crate::types::Checkpoint;

/// Result of validating one checkpoint: `ok` iff `errors` is empty.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub ok: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    fn from_errors(errors: Vec<String>) -> Self {
        Self {
            ok: errors.is_empty(),
            errors,
        }
    }
}

/// Cheap, deterministic hash used to pick a reproducible sample of paths to
/// rehash without pulling in a `rand` dependency the rest of the stack never
/// needed. Not security-sensitive: it only decides which paths get the
/// expensive byte-for-byte check this pass.
fn sample_key(path: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in path.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

fn in_sample(path: &str, sample_rate: f64) -> bool {
    if sample_rate >= 1.0 {
        return true;
    }
    if sample_rate <= 0.0 {
        return false;
    }
    let threshold = (sample_rate * u64::MAX as f64) as u64;
    sample_key(path) <= threshold
}

impl Engine {
    /// Validates `checkpoint_id`: every FileRecord's `cas_hash` and delta
    /// references must resolve to an extant object, and every path is
    /// rehashed from its reconstructed bytes and checked against the
    /// recorded hash. Equivalent to `validate_checkpoint_sampled(id, 1.0)`.
    pub fn validate_checkpoint(&self, checkpoint_id: &str) -> Result<ValidationReport> {
        self.validate_checkpoint_sampled(checkpoint_id, 1.0)
    }

    /// As `validate_checkpoint`, but only `sample_rate` (0.0..=1.0) of paths
    /// are rehashed from reconstructed bytes; every path's CAS/delta
    /// reference existence is still always checked, regardless of sampling.
    pub fn validate_checkpoint_sampled(
        &self,
        checkpoint_id: &str,
        sample_rate: f64,
    ) -> Result<ValidationReport> {
        let (session_id, checkpoint) = self.find_checkpoint(checkpoint_id)?;
        let chain: BTreeMap<u64, Checkpoint> = self
            .load_all_checkpoints(&session_id)?
            .into_iter()
            .map(|c| (c.sequence, c))
            .collect();

        let mut errors = Vec::new();
        for (path, record) in &checkpoint.files {
            if !self.objects.exists(&record.cas_hash) {
                if let Some(forward) = &record.forward_delta {
                    if !self.deltas.exists(&forward.delta_cas_hash) {
                        errors.push(format!(
                            "Missing delta object {} for {path}",
                            forward.delta_cas_hash
                        ));
                    }
                    if !self.objects.exists(&forward.base_cas_hash) {
                        errors.push(format!(
                            "Missing CAS object {} (delta base for {path})",
                            forward.base_cas_hash
                        ));
                    }
                } else {
                    errors.push(format!("Missing CAS object {} for {path}", record.cas_hash));
                    continue;
                }
            }

            if !in_sample(path, sample_rate) {
                continue;
            }
            match self.reconstruct(&chain, checkpoint.sequence, path) {
                Ok(bytes) => {
                    let actual = hashing::content_hash_bytes(&bytes);
                    if actual != record.hash {
                        errors.push(format!(
                            "Hash mismatch for {path}: expected {}, got {actual}",
                            record.hash
                        ));
                    }
                }
                Err(e) => errors.push(format!("{path}: {e}")),
            }
        }

        Ok(ValidationReport::from_errors(errors))
    }

    /// Validates every checkpoint of `session_id`, returning one report per
    /// checkpoint id. A single invalid checkpoint does not stop the others
    /// from being checked.
    pub fn validate_session(
        &self,
        session_id: &str,
    ) -> Result<BTreeMap<String, ValidationReport>> {
        self.load_session_meta(session_id)?;
        let mut reports = BTreeMap::new();
        for checkpoint in self.load_all_checkpoints(session_id)? {
            let report = self.validate_checkpoint(&checkpoint.id)?;
            reports.insert(checkpoint.id, report);
        }
        Ok(reports)
    }
}
