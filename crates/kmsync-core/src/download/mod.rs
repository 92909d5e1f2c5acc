//! Download integrity: content identification, per-piece verification,
//! resumable partial-file bookkeeping, and in-process coordination over a
//! content id's in-flight work.

pub mod blocklist;
pub mod content_id;
pub mod integrity;
pub mod partial_path;

pub use blocklist::{BlockList, ContentKeyLockTable};
pub use content_id::{content_id, content_id_opt, normalize_url, Value};
pub use integrity::{verify_existing_partial, PieceTable};
pub use partial_path::PartialDownloads;
