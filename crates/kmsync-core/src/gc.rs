//! Garbage collection: mark-and-sweep over CAS and delta objects.
//!
//! Grounded on `history::checkpoint::CheckpointManager::prune`'s "never
//! remove the latest full checkpoint" rule, generalized from pruning whole
//! checkpoint directories to reclaiming individual CAS/delta objects once no
//! live FileRecord references them. The mark phase walks every checkpoint of
//! every non-discarded session in parallel via `rayon`, the way the wider
//! retrieval pack's storage engines parallelize independent scans.

use std::collections::HashSet;

use rayon::prelude::*;

use crate::error::{KmsyncError, Result};
use crate::session::Engine;
use crate::types::SessionState;

impl Engine {
    /// Deletes every CAS and delta object not reachable from any live
    /// FileRecord of any non-discarded session, returning the count removed.
    /// Requires that no session be Active, since an in-progress checkpoint's
    /// about-to-be-written objects would otherwise look unreachable.
    pub fn garbage_collect(&self) -> Result<usize> {
        let session_ids = self.all_session_ids()?;
        let mut sessions = Vec::with_capacity(session_ids.len());
        for id in &session_ids {
            sessions.push(self.load_session_meta(id)?);
        }

        if sessions.iter().any(|s| s.state == SessionState::Active) {
            return Err(KmsyncError::InvalidArgument {
                message: "garbage_collect requires no Active session".to_string(),
            });
        }

        let mut all_checkpoints = Vec::new();
        for id in &session_ids {
            all_checkpoints.extend(self.load_all_checkpoints(id)?);
        }

        let reachable: HashSet<String> = all_checkpoints
            .par_iter()
            .map(|checkpoint| {
                let mut keys = HashSet::new();
                for record in checkpoint.files.values() {
                    keys.insert(record.cas_hash.clone());
                    if let Some(forward) = &record.forward_delta {
                        keys.insert(forward.delta_cas_hash.clone());
                        keys.insert(forward.base_cas_hash.clone());
                    }
                    if let Some(reverse) = &record.reverse_delta {
                        keys.insert(reverse.delta_cas_hash.clone());
                        keys.insert(reverse.base_cas_hash.clone());
                    }
                }
                keys
            })
            .reduce(HashSet::new, |mut acc, next| {
                acc.extend(next);
                acc
            });

        let mut removed = 0usize;
        for hash in self.objects.all_hashes()? {
            if !reachable.contains(&hash) {
                // A failed delete here is logged, not fatal: partial GC
                // always leaves a consistent, if less-reclaimed, store.
                match self.objects.delete(&hash) {
                    Ok(()) => removed += 1,
                    Err(e) => tracing::warn!("gc: failed to delete CAS object {hash}: {e}"),
                }
            }
        }
        for hash in self.deltas.all_hashes()? {
            if !reachable.contains(&hash) {
                match self.deltas.delete(&hash) {
                    Ok(()) => removed += 1,
                    Err(e) => tracing::warn!("gc: failed to delete delta object {hash}: {e}"),
                }
            }
        }

        tracing::info!("garbage_collect removed {removed} object(s)");
        Ok(removed)
    }
}
