//! A rolling-hash copy/insert delta codec.
//!
//! No bsdiff/xdelta-family crate is available, so the codec is hand-rolled
//! here: `base_bytes` is chopped into fixed-size blocks, each block's weak
//! (Adler-like) rolling checksum is indexed, and `target_bytes` is scanned
//! with a sliding window that looks up matching blocks. Matching runs become
//! `Copy` ops; everything else becomes `Insert` ops. `decode` replays the op
//! list against `base_bytes`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{KmsyncError, Result};

const BLOCK_SIZE: usize = 64;
const MODULUS: u32 = 1 << 16;

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Op {
    /// Copy `len` bytes from `base_bytes[offset..offset+len]`.
    Copy { offset: u64, len: u64 },
    /// Insert these literal bytes.
    Insert { bytes: Vec<u8> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DeltaFile {
    target_len: u64,
    ops: Vec<Op>,
}

/// Adler-32-style checksum over a byte window, used as a block fingerprint.
struct RollingHash {
    a: u32,
    b: u32,
}

impl RollingHash {
    fn new(window: &[u8]) -> Self {
        let mut a: u32 = 1;
        let mut b: u32 = 0;
        for &byte in window {
            a = (a + byte as u32) % MODULUS;
            b = (b + a) % MODULUS;
        }
        Self { a, b }
    }

    fn value(&self) -> u32 {
        (self.b << 16) | self.a
    }
}

fn index_blocks(base: &[u8]) -> HashMap<u32, Vec<(usize, Vec<u8>)>> {
    let mut index: HashMap<u32, Vec<(usize, Vec<u8>)>> = HashMap::new();
    let mut offset = 0;
    while offset < base.len() {
        let end = (offset + BLOCK_SIZE).min(base.len());
        let block = &base[offset..end];
        let hash = RollingHash::new(block).value();
        index.entry(hash).or_default().push((offset, block.to_vec()));
        offset += BLOCK_SIZE;
    }
    index
}

/// Deterministic, size-efficient for highly correlated inputs. Not required
/// to match any particular published algorithm byte-for-byte, only to
/// round-trip via `decode`.
pub fn encode(base_bytes: &[u8], target_bytes: &[u8]) -> Vec<u8> {
    let index = index_blocks(base_bytes);
    let mut ops: Vec<Op> = Vec::new();
    let mut literal: Vec<u8> = Vec::new();
    let mut pos = 0usize;

    while pos < target_bytes.len() {
        let end = (pos + BLOCK_SIZE).min(target_bytes.len());
        let window = &target_bytes[pos..end];
        let hash = RollingHash::new(window).value();

        let matched = index
            .get(&hash)
            .and_then(|candidates| candidates.iter().find(|(_, bytes)| bytes == window));

        if let Some((offset, bytes)) = matched {
            if !literal.is_empty() {
                ops.push(Op::Insert {
                    bytes: std::mem::take(&mut literal),
                });
            }
            ops.push(Op::Copy {
                offset: *offset as u64,
                len: bytes.len() as u64,
            });
            pos = end;
        } else {
            literal.push(target_bytes[pos]);
            pos += 1;
        }
    }
    if !literal.is_empty() {
        ops.push(Op::Insert { bytes: literal });
    }

    let delta = DeltaFile {
        target_len: target_bytes.len() as u64,
        ops: merge_adjacent_ops(ops),
    };
    bincode::serialize(&delta).expect("delta encoding never fails")
}

/// Coalesces consecutive `Insert` ops, and consecutive `Copy` ops whose base
/// ranges are contiguous, into single ops. This is what keeps a delta over a
/// large, mostly-unchanged file compact: without it every matched block
/// would carry its own offset/length overhead.
fn merge_adjacent_ops(ops: Vec<Op>) -> Vec<Op> {
    let mut merged: Vec<Op> = Vec::with_capacity(ops.len());
    for op in ops {
        match (merged.last_mut(), &op) {
            (Some(Op::Insert { bytes: prev }), Op::Insert { bytes: next }) => {
                prev.extend_from_slice(next);
            }
            (
                Some(Op::Copy {
                    offset: prev_offset,
                    len: prev_len,
                }),
                Op::Copy { offset, len },
            ) if *prev_offset + *prev_len == *offset => {
                *prev_len += len;
            }
            _ => merged.push(op),
        }
    }
    merged
}

/// Must satisfy `decode(base, encode(base, target)) == target` for all
/// `base, target`.
pub fn decode(base_bytes: &[u8], delta_bytes: &[u8]) -> Result<Vec<u8>> {
    let delta: DeltaFile =
        bincode::deserialize(delta_bytes).map_err(|e| KmsyncError::Internal(e.to_string()))?;
    let mut out = Vec::with_capacity(delta.target_len as usize);
    for op in &delta.ops {
        match op {
            Op::Copy { offset, len } => {
                let start = *offset as usize;
                let end = start + *len as usize;
                let slice = base_bytes.get(start..end).ok_or_else(|| {
                    KmsyncError::Internal("delta copy op out of bounds".to_string())
                })?;
                out.extend_from_slice(slice);
            }
            Op::Insert { bytes } => out.extend_from_slice(bytes),
        }
    }
    Ok(out)
}
