//! Binary checkpoint manifest codec.
//!
//! A sealed checkpoint is a single file: magic bytes, a format version, a
//! length-prefixed TOML header/summary block, a length-prefixed files
//! table, and a CRC32 footer over every preceding byte. Manifests are
//! written via temp+rename and are immutable once sealed.

use std::collections::BTreeMap;
use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use crc32fast::Hasher as Crc32Hasher;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{KmsyncError, Result};
use crate::types::{Checkpoint, FileRecord, ModifiedEntry};

const MANIFEST_MAGIC: &[u8; 8] = b"KMSYNCM\0";
const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct ManifestHeader {
    session_id: String,
    sequence: u64,
    component_name: String,
    component_id: String,
    created_utc: String,
    is_anchor: bool,
    id: String,
    total_size: u64,
    delta_size: u64,
    added: Vec<String>,
    modified: Vec<ModifiedEntry>,
    deleted: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct FilesTable {
    files: BTreeMap<String, FileRecord>,
}

fn write_length_prefixed<W: Write>(writer: &mut W, bytes: &[u8]) -> std::io::Result<()> {
    writer.write_all(&(bytes.len() as u32).to_le_bytes())?;
    writer.write_all(bytes)
}

fn read_length_prefixed<R: Read>(reader: &mut R) -> std::io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_le_bytes(len_buf) as usize;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

/// Serializes `checkpoint` into the on-disk manifest format.
pub fn encode(checkpoint: &Checkpoint) -> Result<Vec<u8>> {
    let header = ManifestHeader {
        session_id: checkpoint.session_id.clone(),
        sequence: checkpoint.sequence,
        component_name: checkpoint.component_name.clone(),
        component_id: checkpoint.component_id.clone(),
        created_utc: checkpoint.created_utc.to_rfc3339(),
        is_anchor: checkpoint.is_anchor,
        id: checkpoint.id.clone(),
        total_size: checkpoint.total_size,
        delta_size: checkpoint.delta_size,
        added: checkpoint.added.clone(),
        modified: checkpoint.modified.clone(),
        deleted: checkpoint.deleted.clone(),
    };
    let header_bytes = toml::to_string(&header)?.into_bytes();

    let table = FilesTable {
        files: checkpoint.files.clone(),
    };
    let table_bytes = toml::to_string(&table)?.into_bytes();

    let mut body = Vec::new();
    body.extend_from_slice(MANIFEST_MAGIC);
    body.extend_from_slice(&MANIFEST_VERSION.to_le_bytes());
    write_length_prefixed(&mut body, &header_bytes).map_err(|e| KmsyncError::Internal(e.to_string()))?;
    write_length_prefixed(&mut body, &table_bytes).map_err(|e| KmsyncError::Internal(e.to_string()))?;

    let mut hasher = Crc32Hasher::new();
    hasher.update(&body);
    let checksum = hasher.finalize();
    body.extend_from_slice(&checksum.to_le_bytes());

    Ok(body)
}

/// Parses a manifest previously produced by `encode`, validating the magic
/// bytes, version, and CRC32 footer.
pub fn decode(bytes: &[u8]) -> Result<Checkpoint> {
    if bytes.len() < MANIFEST_MAGIC.len() + 4 + 4 {
        return Err(KmsyncError::CorruptManifest {
            checkpoint_id: "<unknown>".to_string(),
        });
    }

    let (body, checksum_bytes) = bytes.split_at(bytes.len() - 4);
    let expected_checksum = u32::from_le_bytes(checksum_bytes.try_into().unwrap());
    let mut hasher = Crc32Hasher::new();
    hasher.update(body);
    if hasher.finalize() != expected_checksum {
        return Err(KmsyncError::CorruptManifest {
            checkpoint_id: "<unknown>".to_string(),
        });
    }

    let mut cursor = std::io::Cursor::new(body);
    let mut magic = [0u8; 8];
    cursor
        .read_exact(&mut magic)
        .map_err(|_| corrupt())?;
    if &magic != MANIFEST_MAGIC {
        return Err(corrupt());
    }

    let mut version_buf = [0u8; 4];
    cursor
        .read_exact(&mut version_buf)
        .map_err(|_| corrupt())?;
    let version = u32::from_le_bytes(version_buf);
    if version != MANIFEST_VERSION {
        return Err(corrupt());
    }

    let header_bytes = read_length_prefixed(&mut cursor).map_err(|_| corrupt())?;
    let table_bytes = read_length_prefixed(&mut cursor).map_err(|_| corrupt())?;

    let header: ManifestHeader = toml::from_str(
        std::str::from_utf8(&header_bytes).map_err(|_| corrupt())?,
    )
    .map_err(|_| corrupt())?;
    let table: FilesTable = toml::from_str(
        std::str::from_utf8(&table_bytes).map_err(|_| corrupt())?,
    )
    .map_err(|_| corrupt())?;

    let created_utc = chrono::DateTime::parse_from_rfc3339(&header.created_utc)
        .map_err(|_| corrupt())?
        .with_timezone(&chrono::Utc);

    Ok(Checkpoint {
        id: header.id,
        session_id: header.session_id,
        sequence: header.sequence,
        component_name: header.component_name,
        component_id: header.component_id,
        created_utc,
        files: table.files,
        added: header.added,
        modified: header.modified,
        deleted: header.deleted,
        is_anchor: header.is_anchor,
        total_size: header.total_size,
        delta_size: header.delta_size,
    })
}

fn corrupt() -> KmsyncError {
    KmsyncError::CorruptManifest {
        checkpoint_id: "<unknown>".to_string(),
    }
}

/// Writes an encoded manifest to `path` via temp+rename, so a reader never
/// observes a partially written file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|e| KmsyncError::io(parent, e))?;
    let mut tmp = NamedTempFile::new_in(parent).map_err(|e| KmsyncError::io(parent, e))?;
    tmp.write_all(bytes).map_err(|e| KmsyncError::io(tmp.path(), e))?;
    tmp.as_file().sync_all().map_err(|e| KmsyncError::io(tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| KmsyncError::io(path, e.error))?;
    Ok(())
}

pub fn read(path: &Path) -> Result<Checkpoint> {
    let bytes = fs::read(path).map_err(|e| KmsyncError::io(path, e))?;
    decode(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    fn sample_checkpoint() -> Checkpoint {
        let mut files = BTreeMap::new();
        files.insert(
            "chitin.key".to_string(),
            FileRecord {
                path: "chitin.key".to_string(),
                size: 1024,
                hash: "a".repeat(64),
                cas_hash: "a".repeat(64),
                piece_length: 65536,
                piece_hashes: "b".repeat(40),
                forward_delta: None,
                reverse_delta: None,
            },
        );
        Checkpoint {
            id: "cp-baseline".to_string(),
            session_id: "sess-1".to_string(),
            sequence: 0,
            component_name: "Baseline".to_string(),
            component_id: "baseline".to_string(),
            created_utc: Utc::now(),
            files,
            added: Vec::new(),
            modified: Vec::new(),
            deleted: Vec::new(),
            is_anchor: true,
            total_size: 1024,
            delta_size: 0,
        }
    }

    #[test]
    fn encode_decode_round_trips() {
        let checkpoint = sample_checkpoint();
        let bytes = encode(&checkpoint).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.id, checkpoint.id);
        assert_eq!(decoded.files.len(), 1);
        assert_eq!(decoded.files["chitin.key"].hash, "a".repeat(64));
    }

    #[test]
    fn corrupted_footer_is_detected() {
        let checkpoint = sample_checkpoint();
        let mut bytes = encode(&checkpoint).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(decode(&bytes).is_err());
    }

    #[test]
    fn write_atomic_then_read_round_trips() {
        let temp = TempDir::new().unwrap();
        let checkpoint = sample_checkpoint();
        let bytes = encode(&checkpoint).unwrap();
        let path = temp.path().join("0.manifest");
        write_atomic(&path, &bytes).unwrap();

        let read_back = read(&path).unwrap();
        assert_eq!(read_back.sequence, checkpoint.sequence);
    }
}
