//! Per-piece verification table for resumable downloads.
//!
//! A download's expected piece hashes (as produced by `hashing::piece_hashes`)
//! are split into a table of fixed-width SHA-1 hex digests, one per piece.
//! As bytes arrive they're checked piece-by-piece rather than only at the
//! end, so a partially-downloaded file can be resumed from the last known
//! good piece boundary instead of restarting from zero after a crash.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use sha1::{Digest, Sha1};

use crate::error::{KmsyncError, Result};

const SHA1_HEX_LEN: usize = 40;

/// Splits a concatenated piece-hashes string into one digest per piece.
fn split_piece_hashes(piece_hashes: &str) -> Result<Vec<String>> {
    if piece_hashes.len() % SHA1_HEX_LEN != 0 {
        return Err(KmsyncError::InvalidArgument {
            message: format!(
                "piece hash string length {} is not a multiple of {}",
                piece_hashes.len(),
                SHA1_HEX_LEN
            ),
        });
    }
    Ok(piece_hashes
        .as_bytes()
        .chunks(SHA1_HEX_LEN)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect())
}

/// Tracks which pieces of an in-progress download have been verified.
pub struct PieceTable {
    piece_length: u64,
    expected: Vec<String>,
    verified: Vec<bool>,
}

impl PieceTable {
    pub fn new(piece_length: u64, piece_hashes: &str) -> Result<Self> {
        let expected = split_piece_hashes(piece_hashes)?;
        let verified = vec![false; expected.len()];
        Ok(Self {
            piece_length,
            expected,
            verified,
        })
    }

    pub fn piece_count(&self) -> usize {
        self.expected.len()
    }

    pub fn piece_length(&self) -> u64 {
        self.piece_length
    }

    /// Checks `bytes` (a single piece's worth, or a short final piece)
    /// against the expected hash for `index` and records the result.
    pub fn verify_piece(&mut self, index: usize, bytes: &[u8]) -> bool {
        let Some(expected) = self.expected.get(index) else {
            return false;
        };
        let mut hasher = Sha1::new();
        hasher.update(bytes);
        let actual = hex::encode(hasher.finalize());
        let ok = &actual == expected;
        if let Some(slot) = self.verified.get_mut(index) {
            *slot = ok;
        }
        ok
    }

    pub fn is_verified(&self, index: usize) -> bool {
        self.verified.get(index).copied().unwrap_or(false)
    }

    pub fn is_complete(&self) -> bool {
        !self.verified.is_empty() && self.verified.iter().all(|v| *v)
    }

    /// Index of the first unverified piece, used as the resume point.
    pub fn first_missing(&self) -> Option<usize> {
        self.verified.iter().position(|v| !v)
    }

    /// Byte offset to resume downloading from: the start of the first
    /// unverified piece.
    pub fn resume_offset(&self) -> u64 {
        match self.first_missing() {
            Some(index) => index as u64 * self.piece_length,
            None => self.expected.len() as u64 * self.piece_length,
        }
    }
}

/// Re-verifies every complete piece already present in a partial download
/// file on disk, returning a table reflecting how much of it can be trusted.
/// Used after a crash, before resuming: anything beyond the first
/// unverified piece is discarded by the caller and re-downloaded.
pub fn verify_existing_partial(path: &Path, mut table: PieceTable) -> Result<PieceTable> {
    let file = File::open(path).map_err(|e| KmsyncError::io(path, e))?;
    let mut reader = BufReader::new(file);
    let piece_len = table.piece_length.max(1) as usize;
    let mut buf = vec![0u8; piece_len];

    for index in 0..table.piece_count() {
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
        if !table.verify_piece(index, &buf[..filled]) {
            break;
        }
        if filled < piece_len {
            break;
        }
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::piece_hashes;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn make_file(contents: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn verify_piece_accepts_correct_and_rejects_wrong_bytes() {
        let contents = b"the quick brown fox jumps over the lazy dog";
        let piece_len = 8u64;
        let file = make_file(contents);
        let hashes = piece_hashes(file.path(), piece_len).unwrap();
        let mut table = PieceTable::new(piece_len, &hashes).unwrap();

        assert!(table.verify_piece(0, &contents[0..8]));
        assert!(table.is_verified(0));
        assert!(!table.verify_piece(1, b"WRONGBYT"));
        assert!(!table.is_verified(1));
    }

    #[test]
    fn is_complete_requires_every_piece_verified() {
        let contents = b"0123456789abcdef";
        let piece_len = 8u64;
        let file = make_file(contents);
        let hashes = piece_hashes(file.path(), piece_len).unwrap();
        let mut table = PieceTable::new(piece_len, &hashes).unwrap();

        assert!(!table.is_complete());
        table.verify_piece(0, &contents[0..8]);
        assert!(!table.is_complete());
        table.verify_piece(1, &contents[8..16]);
        assert!(table.is_complete());
    }

    #[test]
    fn resume_offset_points_at_first_unverified_piece() {
        let contents = vec![7u8; 24];
        let piece_len = 8u64;
        let file = make_file(&contents);
        let hashes = piece_hashes(file.path(), piece_len).unwrap();
        let mut table = PieceTable::new(piece_len, &hashes).unwrap();

        table.verify_piece(0, &contents[0..8]);
        assert_eq!(table.resume_offset(), 8);
        table.verify_piece(1, &contents[8..16]);
        assert_eq!(table.resume_offset(), 16);
    }

    #[test]
    fn verify_existing_partial_stops_at_first_corrupt_piece() {
        let contents = vec![3u8; 24];
        let piece_len = 8u64;
        let source = make_file(&contents);
        let hashes = piece_hashes(source.path(), piece_len).unwrap();

        let mut corrupted = contents.clone();
        corrupted[10] = 0xFF;
        let partial_file = make_file(&corrupted);

        let table = PieceTable::new(piece_len, &hashes).unwrap();
        let table = verify_existing_partial(partial_file.path(), table).unwrap();

        assert!(table.is_verified(0));
        assert!(!table.is_verified(1));
        assert_eq!(table.resume_offset(), 8);
    }

    #[test]
    fn malformed_piece_hash_length_is_invalid_argument() {
        let err = PieceTable::new(8, "not-a-multiple-of-forty").unwrap_err();
        assert!(matches!(err, KmsyncError::InvalidArgument { .. }));
    }
}
