//! Core data model: FileRecord, Checkpoint, Session, and their component
//! collections, as persisted in checkpoint manifests and session metadata.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A reference describing how to reconstruct one file's content from
/// another file's content via a stored delta object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaRef {
    pub base_cas_hash: String,
    pub delta_cas_hash: String,
    pub size: u64,
}

/// Per-file state tracked inside a checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Slash-normalized path relative to the ManagedRoot.
    pub path: String,
    pub size: u64,
    /// SHA-256 of full content, 64 lowercase hex chars.
    pub hash: String,
    /// CAS object key storing the full content.
    pub cas_hash: String,
    /// Power-of-two piece size chosen for this file.
    pub piece_length: u64,
    /// Concatenation of hex-encoded SHA-1 piece digests.
    pub piece_hashes: String,
    /// How to reconstruct this file from the same path in the prior checkpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forward_delta: Option<DeltaRef>,
    /// How to reconstruct the prior checkpoint's file from this one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reverse_delta: Option<DeltaRef>,
}

/// A diff entry carried in `Checkpoint::modified`, reporting delta economy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifiedEntry {
    pub path: String,
    pub forward_delta_size: u64,
    pub target_size: u64,
}

/// An immutable, append-only checkpoint record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Opaque identifier, unique within a session (a ULID).
    pub id: String,
    pub session_id: String,
    /// Non-negative, strictly increasing within a session; 0 is the baseline.
    pub sequence: u64,
    pub component_name: String,
    pub component_id: String,
    pub created_utc: DateTime<Utc>,
    /// Full state of the ManagedRoot after this checkpoint.
    pub files: BTreeMap<String, FileRecord>,
    pub added: Vec<String>,
    pub modified: Vec<ModifiedEntry>,
    pub deleted: Vec<String>,
    /// True iff `sequence == 0` or `sequence % anchor_interval == 0`.
    pub is_anchor: bool,
    pub total_size: u64,
    pub delta_size: u64,
}

impl Checkpoint {
    pub fn is_baseline(&self) -> bool {
        self.sequence == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Active,
    CompletedKept,
    CompletedDiscarded,
    Corrupt,
}

/// An ordered sequence of Checkpoints sharing one ManagedRoot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub started_utc: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_utc: Option<DateTime<Utc>>,
    pub state: SessionState,
    /// Highest sealed checkpoint sequence, or `None` before the baseline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tip_sequence: Option<u64>,
}

impl Session {
    pub fn new(id: String, started_utc: DateTime<Utc>) -> Self {
        Self {
            id,
            started_utc,
            completed_utc: None,
            state: SessionState::Active,
            tip_sequence: None,
        }
    }
}

/// Summary view of a session for `list_sessions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub started_utc: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_utc: Option<DateTime<Utc>>,
    pub state: SessionState,
    pub checkpoint_count: u64,
}

/// Summary view of a checkpoint for `list_checkpoints`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointSummary {
    pub id: String,
    pub sequence: u64,
    pub component_name: String,
    pub component_id: String,
    pub created_utc: DateTime<Utc>,
    pub is_anchor: bool,
    pub added_count: u64,
    pub modified_count: u64,
    pub deleted_count: u64,
    pub total_size: u64,
    pub delta_size: u64,
}

impl From<&Checkpoint> for CheckpointSummary {
    fn from(c: &Checkpoint) -> Self {
        Self {
            id: c.id.clone(),
            sequence: c.sequence,
            component_name: c.component_name.clone(),
            component_id: c.component_id.clone(),
            created_utc: c.created_utc,
            is_anchor: c.is_anchor,
            added_count: c.added.len() as u64,
            modified_count: c.modified.len() as u64,
            deleted_count: c.deleted.len() as u64,
            total_size: c.total_size,
            delta_size: c.delta_size,
        }
    }
}
