//! Session Manager: the on-disk layout of a ManagedRoot's `.kmsync/`
//! directory, session lifecycle, checkpoint sealing, and restore.
//!
//! Grounded on `history::manager::HistoryManager` (`record_operation`/
//! `rollback`) and `history::checkpoint::CheckpointManager`
//! (`create_checkpoint`/`restore_checkpoint`), generalized from a single
//! linear history to full bidirectional forward/reverse delta references and
//! from one implicit history per base dir to many named sessions, at most
//! one of them Active, over the lifetime of a ManagedRoot.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tempfile::NamedTempFile;
use ulid::Ulid;
use uuid::Uuid;

use crate::cancel::CancellationToken;
use crate::cas::ObjectStore;
use crate::config::Config;
use crate::delta_codec;
use crate::error::{KmsyncError, Result};
use crate::hashing;
use crate::lock::RootLock;
use crate::manifest_codec;
use crate::scanner::{self, DiffResult};
use crate::types::{
    Checkpoint, CheckpointSummary, DeltaRef, FileRecord, ModifiedEntry, Session, SessionState,
    SessionSummary,
};

const SESSION_META_FILE: &str = "session.meta";

/// The Checkpoint Engine: one instance owns exclusive access to a single
/// ManagedRoot for its lifetime (via `RootLock`), and exposes the full
/// session/checkpoint/restore/validate/GC surface.
pub struct Engine {
    root: PathBuf,
    kmsync_dir: PathBuf,
    sessions_dir: PathBuf,
    pub(crate) objects: ObjectStore,
    pub(crate) deltas: ObjectStore,
    pub(crate) config: Config,
    cancel: CancellationToken,
    _lock: RootLock,
}

impl Engine {
    /// Opens (creating if necessary) the Checkpoint Engine for `root`,
    /// acquiring the process-exclusive lock over its `.kmsync/` directory for
    /// as long as this `Engine` lives.
    pub fn open(root: &Path) -> Result<Self> {
        let kmsync_dir = root.join(".kmsync");
        fs::create_dir_all(&kmsync_dir).map_err(|e| KmsyncError::io(&kmsync_dir, e))?;
        let lock = RootLock::acquire(&kmsync_dir)?;

        let config = Config::load(&kmsync_dir)?;
        let checkpoints_dir = kmsync_dir.join("checkpoints");
        let objects = ObjectStore::new(checkpoints_dir.join("objects"))?;
        let deltas = ObjectStore::new(checkpoints_dir.join("deltas"))?;
        let sessions_dir = checkpoints_dir.join("sessions");
        fs::create_dir_all(&sessions_dir).map_err(|e| KmsyncError::io(&sessions_dir, e))?;

        Ok(Self {
            root: root.to_path_buf(),
            kmsync_dir,
            sessions_dir,
            objects,
            deltas,
            config,
            cancel: CancellationToken::new(),
            _lock: lock,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn kmsync_dir(&self) -> &Path {
        &self.kmsync_dir
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn session_dir(&self, session_id: &str) -> PathBuf {
        self.sessions_dir.join(session_id)
    }

    fn session_meta_path(&self, session_id: &str) -> PathBuf {
        self.session_dir(session_id).join(SESSION_META_FILE)
    }

    fn manifest_path(&self, session_id: &str, sequence: u64) -> PathBuf {
        self.session_dir(session_id).join(format!("{sequence}.manifest"))
    }

    pub(crate) fn all_session_ids(&self) -> Result<Vec<String>> {
        if !self.sessions_dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.sessions_dir).map_err(|e| KmsyncError::io(&self.sessions_dir, e))? {
            let entry = entry.map_err(|e| KmsyncError::io(&self.sessions_dir, e))?;
            if entry.path().is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    ids.push(name.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    pub(crate) fn load_session_meta(&self, session_id: &str) -> Result<Session> {
        let path = self.session_meta_path(session_id);
        let content = fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                KmsyncError::SessionNotFound {
                    id: session_id.to_string(),
                }
            } else {
                KmsyncError::io(&path, e)
            }
        })?;
        Ok(toml::from_str(&content)?)
    }

    fn save_session_meta(&self, session: &Session) -> Result<()> {
        let dir = self.session_dir(&session.id);
        fs::create_dir_all(&dir).map_err(|e| KmsyncError::io(&dir, e))?;
        let path = self.session_meta_path(&session.id);
        let content = toml::to_string_pretty(session)?;

        let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| KmsyncError::io(&dir, e))?;
        tmp.write_all(content.as_bytes())
            .map_err(|e| KmsyncError::io(tmp.path(), e))?;
        tmp.as_file().sync_all().map_err(|e| KmsyncError::io(tmp.path(), e))?;
        tmp.persist(&path).map_err(|e| KmsyncError::io(&path, e.error))?;
        Ok(())
    }

    /// Manifest sequences currently present on disk for `session_id`, sorted.
    pub(crate) fn manifest_sequences(&self, session_id: &str) -> Result<Vec<u64>> {
        let dir = self.session_dir(session_id);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut sequences = Vec::new();
        for entry in fs::read_dir(&dir).map_err(|e| KmsyncError::io(&dir, e))? {
            let entry = entry.map_err(|e| KmsyncError::io(&dir, e))?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(seq_str) = name.strip_suffix(".manifest") {
                if let Ok(seq) = seq_str.parse::<u64>() {
                    sequences.push(seq);
                }
            }
        }
        sequences.sort_unstable();
        Ok(sequences)
    }

    pub(crate) fn load_checkpoint(&self, session_id: &str, sequence: u64) -> Result<Checkpoint> {
        manifest_codec::read(&self.manifest_path(session_id, sequence))
    }

    /// All checkpoints of a session, in ascending sequence order.
    pub(crate) fn load_all_checkpoints(&self, session_id: &str) -> Result<Vec<Checkpoint>> {
        self.manifest_sequences(session_id)?
            .into_iter()
            .map(|seq| self.load_checkpoint(session_id, seq))
            .collect()
    }

    fn active_session(&self) -> Result<Option<Session>> {
        for id in self.all_session_ids()? {
            let session = self.load_session_meta(&id)?;
            if session.state == SessionState::Active {
                return Ok(Some(session));
            }
        }
        Ok(None)
    }

    /// Finds the session owning `checkpoint_id` and the checkpoint itself.
    /// Checkpoint ids are ULIDs and therefore globally unique, so a linear
    /// scan over sessions is sufficient without a separate index.
    pub(crate) fn find_checkpoint(&self, checkpoint_id: &str) -> Result<(String, Checkpoint)> {
        for session_id in self.all_session_ids()? {
            for sequence in self.manifest_sequences(&session_id)? {
                let checkpoint = self.load_checkpoint(&session_id, sequence)?;
                if checkpoint.id == checkpoint_id {
                    return Ok((session_id, checkpoint));
                }
            }
        }
        Err(KmsyncError::CheckpointNotFound {
            id: checkpoint_id.to_string(),
        })
    }

    // ---- Public Engine API -------------------------------------------------

    /// Creates a new session, scans the ManagedRoot, and seals the baseline
    /// checkpoint (`sequence = 0`). Fails if a session is already Active.
    pub fn start_session(&self) -> Result<String> {
        if self.active_session()?.is_some() {
            return Err(KmsyncError::SessionAlreadyActive);
        }
        self.cancel.check()?;

        let session_id = format!("sess-{}", Uuid::new_v4().simple());
        let session = Session::new(session_id.clone(), Utc::now());
        self.save_session_meta(&session)?;

        let scan = scanner::scan(&self.root, &self.config.checkpoint)?;
        let mut files = scan.files;
        self.cancel.check()?;

        let mut total_size = 0u64;
        for (path, record) in files.iter_mut() {
            let bytes = fs::read(self.root.join(path)).map_err(|e| KmsyncError::io(&self.root.join(path), e))?;
            let cas_hash = self.objects.put(&bytes)?;
            debug_assert_eq!(cas_hash, record.hash, "CAS hash must match the scanned content hash");
            record.cas_hash = cas_hash;
            total_size += record.size;
        }

        let added: Vec<String> = files.keys().cloned().collect();
        let checkpoint = Checkpoint {
            id: Ulid::new().to_string(),
            session_id: session_id.clone(),
            sequence: 0,
            component_name: "Baseline".to_string(),
            component_id: "baseline".to_string(),
            created_utc: Utc::now(),
            files,
            added,
            modified: Vec::new(),
            deleted: Vec::new(),
            is_anchor: true,
            total_size,
            delta_size: 0,
        };
        self.seal_checkpoint(&checkpoint)?;

        let mut session = session;
        session.tip_sequence = Some(0);
        self.save_session_meta(&session)?;

        tracing::info!("started session {session_id} with {} baseline files", checkpoint.files.len());
        Ok(session_id)
    }

    fn seal_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()> {
        let bytes = manifest_codec::encode(checkpoint)?;
        manifest_codec::write_atomic(
            &self.manifest_path(&checkpoint.session_id, checkpoint.sequence),
            &bytes,
        )
    }

    /// Scans and diffs against the Active session's tip, seals a new
    /// checkpoint, and advances the tip. Requires an Active session.
    pub fn create_checkpoint(&self, component_name: &str, component_id: &str) -> Result<String> {
        let mut session = self.active_session()?.ok_or(KmsyncError::NoActiveSession)?;
        let tip_sequence = session.tip_sequence.ok_or(KmsyncError::NoActiveSession)?;
        let tip = self.load_checkpoint(&session.id, tip_sequence)?;
        self.cancel.check()?;

        let scan = scanner::scan(&self.root, &self.config.checkpoint)?;
        let diff: DiffResult = scanner::diff(&tip.files, &scan.files, self.config.checkpoint.case_sensitive_paths);
        self.cancel.check()?;

        let sequence = tip_sequence + 1;
        let is_anchor = sequence % self.config.checkpoint.anchor_interval == 0;

        let mut files = tip.files.clone();
        for path in &diff.deleted {
            files.remove(path);
        }
        // A case-only rename (identity-matched by the differ, but a distinct
        // map key under plain string equality) leaves its old-cased entry
        // behind in `files` unless removed explicitly here.
        for old_path in diff.renamed_from.values() {
            files.remove(old_path);
        }

        let mut modified_entries = Vec::with_capacity(diff.modified.len());
        let mut delta_size = 0u64;

        for path in diff.added.iter().chain(diff.modified.iter()) {
            self.cancel.check()?;
            let abs_path = self.root.join(path);
            let bytes = fs::read(&abs_path).map_err(|e| KmsyncError::io(&abs_path, e))?;
            let mut record = scan.files.get(path).cloned().ok_or_else(|| {
                KmsyncError::Internal(format!("scanned file record missing for {path}"))
            })?;
            let cas_hash = self.objects.put(&bytes)?;
            record.cas_hash = cas_hash.clone();

            let prior_path = diff.renamed_from.get(path).map(String::as_str).unwrap_or(path);
            if diff.modified.contains(path) && !is_anchor {
                if let Some(prior) = tip.files.get(prior_path) {
                    if self.objects.exists(&prior.cas_hash) {
                        let base_bytes = self.objects.get(&prior.cas_hash)?;

                        let forward_bytes = delta_codec::encode(&base_bytes, &bytes);
                        let forward_hash = self.deltas.put(&forward_bytes)?;
                        let forward = DeltaRef {
                            base_cas_hash: prior.cas_hash.clone(),
                            delta_cas_hash: forward_hash,
                            size: forward_bytes.len() as u64,
                        };
                        delta_size += forward.size;

                        let reverse_bytes = delta_codec::encode(&bytes, &base_bytes);
                        let reverse_hash = self.deltas.put(&reverse_bytes)?;
                        record.reverse_delta = Some(DeltaRef {
                            base_cas_hash: cas_hash.clone(),
                            delta_cas_hash: reverse_hash,
                            size: reverse_bytes.len() as u64,
                        });

                        modified_entries.push(ModifiedEntry {
                            path: path.clone(),
                            forward_delta_size: forward.size,
                            target_size: record.size,
                        });
                        record.forward_delta = Some(forward);
                    } else {
                        modified_entries.push(ModifiedEntry {
                            path: path.clone(),
                            forward_delta_size: 0,
                            target_size: record.size,
                        });
                    }
                }
            } else if diff.modified.contains(path) {
                modified_entries.push(ModifiedEntry {
                    path: path.clone(),
                    forward_delta_size: 0,
                    target_size: record.size,
                });
            }

            files.insert(path.clone(), record);
        }

        let total_size: u64 = files.values().map(|r| r.size).sum();

        let checkpoint = Checkpoint {
            id: Ulid::new().to_string(),
            session_id: session.id.clone(),
            sequence,
            component_name: component_name.to_string(),
            component_id: component_id.to_string(),
            created_utc: Utc::now(),
            files,
            added: diff.added,
            modified: modified_entries,
            deleted: diff.deleted,
            is_anchor,
            total_size,
            delta_size,
        };
        let checkpoint_id = checkpoint.id.clone();
        self.seal_checkpoint(&checkpoint)?;

        session.tip_sequence = Some(sequence);
        self.save_session_meta(&session)?;

        tracing::info!(
            "sealed checkpoint {checkpoint_id} (session {}, sequence {sequence}, anchor={is_anchor})",
            session.id
        );
        Ok(checkpoint_id)
    }

    pub fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        let mut summaries = Vec::new();
        for id in self.all_session_ids()? {
            let session = self.load_session_meta(&id)?;
            let checkpoint_count = self.manifest_sequences(&id)?.len() as u64;
            summaries.push(SessionSummary {
                id: session.id,
                started_utc: session.started_utc,
                completed_utc: session.completed_utc,
                state: session.state,
                checkpoint_count,
            });
        }
        Ok(summaries)
    }

    pub fn list_checkpoints(&self, session_id: &str) -> Result<Vec<CheckpointSummary>> {
        // Confirms the session exists before reporting an empty list for a
        // typo'd id instead of silently returning nothing.
        self.load_session_meta(session_id)?;
        self.load_all_checkpoints(session_id)
            .map(|checkpoints| checkpoints.iter().map(CheckpointSummary::from).collect())
    }

    /// Reconstructs `path`'s bytes as of checkpoint sequence `at_sequence`,
    /// preferring the direct CAS object and falling back to a forward-delta
    /// chain against the immediately preceding sequence when the object has
    /// been reclaimed by GC.
    pub(crate) fn reconstruct(&self, checkpoints: &BTreeMap<u64, Checkpoint>, at_sequence: u64, path: &str) -> Result<Vec<u8>> {
        let checkpoint = checkpoints.get(&at_sequence).ok_or_else(|| KmsyncError::Internal(
            format!("checkpoint sequence {at_sequence} missing from loaded chain"),
        ))?;
        let record = checkpoint.files.get(path).ok_or_else(|| {
            KmsyncError::Internal(format!("path {path} missing from checkpoint {at_sequence}"))
        })?;

        if self.objects.exists(&record.cas_hash) {
            return self.objects.get(&record.cas_hash);
        }

        if let Some(forward) = &record.forward_delta {
            if at_sequence == 0 {
                return Err(KmsyncError::MissingCasObject {
                    hash: record.cas_hash.clone(),
                });
            }
            let delta_bytes = self.deltas.get(&forward.delta_cas_hash)?;
            let base_bytes = self.reconstruct(checkpoints, at_sequence - 1, path)?;
            return delta_codec::decode(&base_bytes, &delta_bytes);
        }

        Err(KmsyncError::MissingCasObject {
            hash: record.cas_hash.clone(),
        })
    }

    /// Rewrites the ManagedRoot to match checkpoint `checkpoint_id` exactly:
    /// every file in the checkpoint is reconstructed and written via
    /// temp+rename, every file on disk outside the checkpoint is removed,
    /// and every restored path is re-hashed and checked against the
    /// checkpoint's record. Does not touch any session's state.
    pub fn restore_checkpoint(&self, checkpoint_id: &str) -> Result<()> {
        let (session_id, target) = self.find_checkpoint(checkpoint_id)?;
        let chain: BTreeMap<u64, Checkpoint> = self
            .load_all_checkpoints(&session_id)?
            .into_iter()
            .map(|c| (c.sequence, c))
            .collect();

        for path in target.files.keys() {
            self.cancel.check()?;
            let bytes = self.reconstruct(&chain, target.sequence, path)?;
            let dest = self.root.join(path);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).map_err(|e| KmsyncError::io(parent, e))?;
            }
            let mut tmp = NamedTempFile::new_in(dest.parent().unwrap_or(&self.root))
                .map_err(|e| KmsyncError::io(&dest, e))?;
            tmp.write_all(&bytes).map_err(|e| KmsyncError::io(tmp.path(), e))?;
            tmp.as_file().sync_all().map_err(|e| KmsyncError::io(tmp.path(), e))?;
            tmp.persist(&dest).map_err(|e| KmsyncError::io(&dest, e.error))?;
        }

        let current = scanner::scan(&self.root, &self.config.checkpoint)?;
        for path in current.files.keys() {
            if !target.files.contains_key(path) {
                let abs = self.root.join(path);
                if abs.exists() {
                    fs::remove_file(&abs).map_err(|e| KmsyncError::io(&abs, e))?;
                }
            }
        }

        let mut mismatches = Vec::new();
        for (path, record) in &target.files {
            let abs = self.root.join(path);
            let actual = hashing::content_hash(&abs)?;
            if actual != record.hash {
                mismatches.push(abs);
            }
        }
        if !mismatches.is_empty() {
            tracing::warn!("restore verification failed for {} path(s)", mismatches.len());
            return Err(KmsyncError::RestoreVerifyFailed { paths: mismatches });
        }

        tracing::info!("restored checkpoint {checkpoint_id} ({} files)", target.files.len());
        Ok(())
    }

    /// Marks `session_id` complete. Discarded sessions retain only the last
    /// `gc_safety_window` manifests (0 by default, i.e. none); the rest are
    /// deleted immediately, and `garbage_collect` later reclaims any CAS/
    /// delta object those manifests were the last reference to.
    pub fn complete_session(&self, session_id: &str, keep: bool) -> Result<()> {
        let mut session = self.load_session_meta(session_id)?;
        session.state = if keep {
            SessionState::CompletedKept
        } else {
            SessionState::CompletedDiscarded
        };
        session.completed_utc = Some(Utc::now());

        if !keep {
            let window = self.config.checkpoint.gc_safety_window;
            let mut sequences = self.manifest_sequences(session_id)?;
            sequences.sort_unstable();
            let keep_from = sequences.len().saturating_sub(window as usize);
            for (i, sequence) in sequences.iter().enumerate() {
                if i < keep_from {
                    let path = self.manifest_path(session_id, *sequence);
                    let _ = fs::remove_file(&path);
                }
            }
        }

        self.save_session_meta(&session)?;
        tracing::info!("completed session {session_id} (kept={keep})");
        Ok(())
    }

    /// Removes every manifest and the session record entirely.
    pub fn delete_session(&self, session_id: &str) -> Result<()> {
        let session = self.load_session_meta(session_id)?;
        if session.state == SessionState::Active {
            return Err(KmsyncError::InvalidArgument {
                message: format!("cannot delete active session {session_id}; complete it first"),
            });
        }
        let dir = self.session_dir(session_id);
        fs::remove_dir_all(&dir).map_err(|e| KmsyncError::io(&dir, e))?;
        tracing::info!("deleted session {session_id}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_file(root: &Path, rel: &str, content: &[u8]) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[test]
    fn start_session_seals_baseline_and_rejects_second_active() {
        let temp = TempDir::new().unwrap();
        write_file(temp.path(), "chitin.key", &[0u8; 1024]);
        write_file(temp.path(), "Override/appearance.2da", b"appearance data");

        let engine = Engine::open(temp.path()).unwrap();
        let session_id = engine.start_session().unwrap();

        let checkpoints = engine.list_checkpoints(&session_id).unwrap();
        assert_eq!(checkpoints.len(), 1);
        assert_eq!(checkpoints[0].sequence, 0);
        assert!(checkpoints[0].is_anchor);

        assert!(matches!(
            engine.start_session(),
            Err(KmsyncError::SessionAlreadyActive)
        ));
    }

    #[test]
    fn create_checkpoint_on_unchanged_tree_is_idempotent() {
        let temp = TempDir::new().unwrap();
        write_file(temp.path(), "a.txt", b"hello");
        let engine = Engine::open(temp.path()).unwrap();
        engine.start_session().unwrap();

        let checkpoint_id = engine.create_checkpoint("mod1", "mod1").unwrap();
        let checkpoints = engine.list_checkpoints(&engine.list_sessions().unwrap()[0].id).unwrap();
        let checkpoint = checkpoints.iter().find(|c| c.id == checkpoint_id).unwrap();
        assert_eq!(checkpoint.added_count, 0);
        assert_eq!(checkpoint.modified_count, 0);
        assert_eq!(checkpoint.deleted_count, 0);
    }

    #[test]
    fn baseline_mod_and_restore_round_trips() {
        let temp = TempDir::new().unwrap();
        write_file(temp.path(), "chitin.key", &[1u8; 1024]);
        write_file(temp.path(), "Override/appearance.2da", b"original appearance");

        let engine = Engine::open(temp.path()).unwrap();
        let session_id = engine.start_session().unwrap();
        let baseline_checkpoints = engine.list_checkpoints(&session_id).unwrap();
        let baseline_id = baseline_checkpoints[0].id.clone();

        write_file(temp.path(), "Override/texture_1.tga", b"new texture bytes");
        write_file(temp.path(), "Override/appearance.2da", b"modded appearance");

        let mod_checkpoint_id = engine.create_checkpoint("mod1", "mod1").unwrap();
        let checkpoints = engine.list_checkpoints(&session_id).unwrap();
        let mod_checkpoint = checkpoints.iter().find(|c| c.id == mod_checkpoint_id).unwrap();
        assert_eq!(mod_checkpoint.added_count, 1);
        assert_eq!(mod_checkpoint.modified_count, 1);

        engine.restore_checkpoint(&baseline_id).unwrap();

        assert!(!temp.path().join("Override/texture_1.tga").exists());
        assert_eq!(
            fs::read(temp.path().join("Override/appearance.2da")).unwrap(),
            b"original appearance"
        );
    }

    #[test]
    fn anchor_checkpoints_land_every_tenth_sequence() {
        let temp = TempDir::new().unwrap();
        write_file(temp.path(), "seed.txt", b"seed");
        let engine = Engine::open(temp.path()).unwrap();
        let session_id = engine.start_session().unwrap();

        for i in 0..25 {
            write_file(temp.path(), &format!("mod_{i}.txt"), format!("payload {i}").as_bytes());
            engine.create_checkpoint(&format!("mod{i}"), &format!("mod{i}")).unwrap();
        }

        let checkpoints = engine.list_checkpoints(&session_id).unwrap();
        let anchors: Vec<u64> = checkpoints.iter().filter(|c| c.is_anchor).map(|c| c.sequence).collect();
        assert_eq!(anchors, vec![0, 10, 20]);
    }

    #[test]
    fn large_file_small_mutation_yields_compact_delta() {
        let temp = TempDir::new().unwrap();
        let mut base = vec![0u8; 50 * 1024 * 1024];
        for (i, b) in base.iter_mut().enumerate() {
            *b = (i % 253) as u8;
        }
        write_file(temp.path(), "dialog.tlk", &base);

        let engine = Engine::open(temp.path()).unwrap();
        engine.start_session().unwrap();

        let mut mutated = base.clone();
        for b in mutated[1_000_000..1_000_030].iter_mut() {
            *b = 0xAB;
        }
        write_file(temp.path(), "dialog.tlk", &mutated);

        let checkpoint_id = engine.create_checkpoint("mod1", "mod1").unwrap();
        let session_id = engine.list_sessions().unwrap()[0].id.clone();
        let checkpoint = engine
            .load_all_checkpoints(&session_id)
            .unwrap()
            .into_iter()
            .find(|c| c.id == checkpoint_id)
            .unwrap();
        let record = &checkpoint.files["dialog.tlk"];
        let forward = record.forward_delta.as_ref().unwrap();
        assert!(forward.size < mutated.len() as u64 / 10);
    }

    #[test]
    fn deduplicates_identical_content_across_checkpoints() {
        let temp = TempDir::new().unwrap();
        write_file(temp.path(), "seed.txt", b"seed");
        let engine = Engine::open(temp.path()).unwrap();
        engine.start_session().unwrap();

        write_file(temp.path(), "a/blob.bin", b"14-byte-blob!!");
        engine.create_checkpoint("mod1", "mod1").unwrap();

        write_file(temp.path(), "b/blob.bin", b"14-byte-blob!!");
        let checkpoint_id = engine.create_checkpoint("mod2", "mod2").unwrap();

        let session_id = engine.list_sessions().unwrap()[0].id.clone();
        let checkpoint = engine
            .load_all_checkpoints(&session_id)
            .unwrap()
            .into_iter()
            .find(|c| c.id == checkpoint_id)
            .unwrap();
        assert_eq!(
            checkpoint.files["a/blob.bin"].cas_hash,
            checkpoint.files["b/blob.bin"].cas_hash
        );
    }

    #[test]
    fn complete_session_discarded_prunes_manifests_by_default() {
        let temp = TempDir::new().unwrap();
        write_file(temp.path(), "seed.txt", b"seed");
        let engine = Engine::open(temp.path()).unwrap();
        let session_id = engine.start_session().unwrap();
        engine.create_checkpoint("mod1", "mod1").unwrap();

        engine.complete_session(&session_id, false).unwrap();
        let checkpoints = engine.load_all_checkpoints(&session_id).unwrap();
        assert!(checkpoints.is_empty());

        let sessions = engine.list_sessions().unwrap();
        assert_eq!(sessions[0].state, SessionState::CompletedDiscarded);
    }

    #[test]
    fn delete_session_removes_everything() {
        let temp = TempDir::new().unwrap();
        write_file(temp.path(), "seed.txt", b"seed");
        let engine = Engine::open(temp.path()).unwrap();
        let session_id = engine.start_session().unwrap();
        engine.complete_session(&session_id, true).unwrap();

        engine.delete_session(&session_id).unwrap();
        assert!(engine.list_sessions().unwrap().is_empty());
    }
}
