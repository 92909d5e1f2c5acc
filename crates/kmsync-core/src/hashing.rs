//! Content hashing and piece sizing.
//!
//! `piece_size` decides, deterministically and from file size alone, how a
//! file is chopped into pieces for partial verification. `content_hash` and
//! `piece_hashes` stream the bytes once each, never loading a whole large
//! file into memory.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::error::{KmsyncError, Result};

const READ_CHUNK: usize = 64 * 1024;
const MAX_PIECES: u64 = 1 << 20;

/// Chooses the smallest power-of-two piece size in `[min, max]` such that
/// `ceil(file_size / piece_size) <= MAX_PIECES`. Files smaller than `min`
/// still use `min`.
pub fn piece_size(file_size: u64, min: u64, max: u64) -> u64 {
    let mut size = min.next_power_of_two();
    if size == 0 {
        size = 1;
    }
    while size < max {
        let piece_count = file_size.div_ceil(size).max(1);
        if piece_count <= MAX_PIECES {
            break;
        }
        size *= 2;
    }
    size.min(max).max(min)
}

/// Streaming SHA-256 over the full contents of `path`.
pub fn content_hash(path: &Path) -> Result<String> {
    let file = File::open(path).map_err(|e| KmsyncError::io(path, e))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; READ_CHUNK];
    loop {
        let n = reader
            .read(&mut buf)
            .map_err(|e| KmsyncError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// SHA-256 over an in-memory byte slice (used for CAS puts where the bytes
/// are already resident, e.g. reconstructed restore targets).
pub fn content_hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Concatenation of hex-encoded SHA-1 piece digests, one per `piece_size`
/// chunk read in order. The final piece may be short.
pub fn piece_hashes(path: &Path, piece_len: u64) -> Result<String> {
    let file = File::open(path).map_err(|e| KmsyncError::io(path, e))?;
    let mut reader = BufReader::new(file);
    let mut out = String::new();
    let piece_len = piece_len.max(1) as usize;
    let mut buf = vec![0u8; piece_len];

    loop {
        let mut filled = 0usize;
        while filled < piece_len {
            let n = reader
                .read(&mut buf[filled..])
                .map_err(|e| KmsyncError::io(path, e))?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if filled == 0 {
            break;
        }
        let mut hasher = Sha1::new();
        hasher.update(&buf[..filled]);
        out.push_str(&hex::encode(hasher.finalize()));
        if filled < piece_len {
            break;
        }
    }
    Ok(out)
}

/// A verifiable record of a hashed file: what `verify` checks a live file
/// against.
pub struct HashRecord<'a> {
    pub size: u64,
    pub content_hash: &'a str,
    pub piece_length: u64,
    pub piece_hashes: &'a str,
}

/// Returns true iff `size`, full content hash, and every piece hash match.
/// A size mismatch short-circuits without touching the file's bytes.
pub fn verify(path: &Path, record: &HashRecord) -> Result<bool> {
    let metadata = std::fs::metadata(path).map_err(|e| KmsyncError::io(path, e))?;
    if metadata.len() != record.size {
        return Ok(false);
    }
    if content_hash(path)? != record.content_hash {
        return Ok(false);
    }
    if record.piece_length > 0 && piece_hashes(path, record.piece_length)? != record.piece_hashes {
        return Ok(false);
    }
    Ok(true)
}

/// Fast-verify: checks size and piece hashes only, skipping the full
/// content hash. Still rejects any single-byte modification because every
/// byte of the file falls inside exactly one piece.
pub fn verify_fast(path: &Path, record: &HashRecord) -> Result<bool> {
    let metadata = std::fs::metadata(path).map_err(|e| KmsyncError::io(path, e))?;
    if metadata.len() != record.size {
        return Ok(false);
    }
    if record.piece_length > 0 && piece_hashes(path, record.piece_length)? != record.piece_hashes {
        return Ok(false);
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn piece_size_respects_minimum() {
        assert_eq!(piece_size(100, 65_536, 4 * 1024 * 1024), 65_536);
        assert_eq!(piece_size(0, 65_536, 4 * 1024 * 1024), 65_536);
    }

    #[test]
    fn piece_size_caps_piece_count() {
        let size = piece_size(4 * 1024 * 1024 * 1024, 65_536, 4 * 1024 * 1024);
        let piece_count = (4u64 * 1024 * 1024 * 1024).div_ceil(size);
        assert!(piece_count <= MAX_PIECES);
        assert!(size.is_power_of_two());
    }

    #[test]
    fn piece_size_deterministic() {
        let a = piece_size(123_456_789, 65_536, 4 * 1024 * 1024);
        let b = piece_size(123_456_789, 65_536, 4 * 1024 * 1024);
        assert_eq!(a, b);
    }

    #[test]
    fn content_hash_of_empty_file() {
        let file = NamedTempFile::new().unwrap();
        let hash = content_hash(file.path()).unwrap();
        assert_eq!(
            hash,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(hash.len(), 64);
    }

    #[test]
    fn verify_detects_single_byte_change() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"hello world").unwrap();
        file.flush().unwrap();

        let hash = content_hash(file.path()).unwrap();
        let piece_len = piece_size(11, 65_536, 4 * 1024 * 1024);
        let pieces = piece_hashes(file.path(), piece_len).unwrap();
        let record = HashRecord {
            size: 11,
            content_hash: &hash,
            piece_length: piece_len,
            piece_hashes: &pieces,
        };
        assert!(verify(file.path(), &record).unwrap());

        let mut file2 = NamedTempFile::new().unwrap();
        file2.write_all(b"hello World").unwrap();
        file2.flush().unwrap();
        assert!(!verify(file2.path(), &record).unwrap());
    }

    #[test]
    fn verify_short_circuits_on_size_mismatch() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"short").unwrap();
        file.flush().unwrap();

        let record = HashRecord {
            size: 999,
            content_hash: "deadbeef",
            piece_length: 65_536,
            piece_hashes: "",
        };
        assert!(!verify(file.path(), &record).unwrap());
    }
}
