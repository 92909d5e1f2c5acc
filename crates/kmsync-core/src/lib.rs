//! `kmsync-core`: the Checkpoint Engine, the Download Integrity Core, and
//! the Install Planner that sequences checkpoint creation across a mod
//! dependency graph.
//!
//! [`session::Engine`] is the facade most callers want: it owns a
//! ManagedRoot's `.kmsync/` directory for its lifetime and exposes the full
//! session/checkpoint/restore/validate/GC surface described in `spec.md`.

pub mod cancel;
pub mod cas;
pub mod config;
pub mod delta_codec;
pub mod download;
pub mod error;
pub mod gc;
pub mod hashing;
pub mod lock;
pub mod manifest_codec;
pub mod planner;
pub mod scanner;
pub mod session;
pub mod types;
pub mod validate;

pub use cancel::CancellationToken;
pub use cas::ObjectStore;
pub use config::{CheckpointConfig, Config};
pub use delta_codec::{decode as delta_decode, encode as delta_encode};
pub use error::{KmsyncError, Result};
pub use hashing::{content_hash, content_hash_bytes, piece_hashes, piece_size, verify, verify_fast, HashRecord};
pub use planner::{mark_blocked_descendants, ordered_install_list, Component, ComponentState};
pub use scanner::{diff, scan, DiffResult, ScanResult, ScanWarning};
pub use session::Engine;
pub use types::{
    Checkpoint, CheckpointSummary, DeltaRef, FileRecord, ModifiedEntry, Session, SessionState,
    SessionSummary,
};
pub use validate::ValidationReport;

pub use download::{
    content_id, content_id_opt, normalize_url, verify_existing_partial, BlockList, ContentKeyLockTable,
    PartialDownloads, PieceTable, Value as ContentIdValue,
};
