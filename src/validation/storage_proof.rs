/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Storage proof segments and the Merkle trees they are proven against.
//!
//! A file is split into segments of [`SEGMENT_SIZE`] bytes, the last one zero-padded. Leaves are
//! hashed as `H(0x00 || segment)` and interior nodes as `H(0x01 || left || right)`. A tree over `n`
//! leaves puts the largest power of two strictly less than `n` leaves in its left subtree and the rest
//! in its right subtree, so trees over any number of leaves are well-defined.

use num_bigint::BigUint;
use num_traits::ToPrimitive;
use std::fmt::{self, Display, Formatter};

use crate::block_tree::BlockTree;
use crate::ledger::LedgerReader;
use crate::types::{
    basic::{BlockID, ContractID, CryptoHash},
    crypto_primitives::{hash_parts, specifiers},
};

/// Size in bytes of one segment of a stored file.
pub const SEGMENT_SIZE: usize = 64;

const LEAF_PREFIX: &[u8] = &[0x00];
const NODE_PREFIX: &[u8] = &[0x01];

/// Number of segments in a file of `file_size` bytes. An empty file has one, all-zero, segment.
pub fn num_segments(file_size: u64) -> u64 {
    file_size.div_ceil(SEGMENT_SIZE as u64).max(1)
}

/// The index of the segment that must be proven for the contract `contract_id`, given the id of the
/// block at height `window_start - 1`.
pub fn segment_index(trigger_block: &BlockID, contract_id: &ContractID, file_size: u64) -> u64 {
    let seed = hash_parts(&[
        specifiers::STORAGE_PROOF,
        &trigger_block.bytes(),
        &contract_id.bytes(),
    ]);
    let index = BigUint::from_bytes_be(&seed.bytes()) % BigUint::from(num_segments(file_size));
    // The remainder is below a u64 modulus.
    index.to_u64().unwrap_or(0)
}

/// The segment index that must be proven for the unresolved contract `contract_id` on the current
/// path.
///
/// The index is only known once the block at height `window_start - 1` is on the current path.
pub fn storage_proof_segment(
    tree: &BlockTree,
    ledger: &impl LedgerReader,
    contract_id: &ContractID,
) -> Result<u64, SegmentError> {
    let contract = ledger
        .contract(contract_id)
        .ok_or(SegmentError::UnknownContract(*contract_id))?;
    let trigger_height = contract
        .window_start
        .checked_sub(1)
        .ok_or(SegmentError::WindowNotStarted(*contract_id))?;
    let trigger_block = tree
        .block_id_at_height(trigger_height)
        .ok_or(SegmentError::WindowNotStarted(*contract_id))?;
    Ok(segment_index(&trigger_block, contract_id, contract.file_size))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SegmentError {
    UnknownContract(ContractID),
    WindowNotStarted(ContractID),
}

impl Display for SegmentError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SegmentError::UnknownContract(id) => write!(f, "contract {} is unknown", id),
            SegmentError::WindowNotStarted(id) => {
                write!(f, "proof window of contract {} has not started", id)
            }
        }
    }
}

impl std::error::Error for SegmentError {}

/* ↓↓↓ Merkle trees ↓↓↓ */

/// `data` split into zero-padded segments.
pub fn segments(data: &[u8]) -> Vec<[u8; SEGMENT_SIZE]> {
    let mut segments: Vec<[u8; SEGMENT_SIZE]> = data
        .chunks(SEGMENT_SIZE)
        .map(|chunk| {
            let mut segment = [0u8; SEGMENT_SIZE];
            segment[..chunk.len()].copy_from_slice(chunk);
            segment
        })
        .collect();
    if segments.is_empty() {
        segments.push([0u8; SEGMENT_SIZE]);
    }
    segments
}

/// Merkle root of `data`, the value committed to by a contract's `file_merkle_root`.
pub fn merkle_root(data: &[u8]) -> CryptoHash {
    let leaves: Vec<CryptoHash> = segments(data).iter().map(|s| leaf_hash(s)).collect();
    subtree_root(&leaves)
}

/// The padded segment at `index` of `data` and its Merkle siblings from the leaf upwards, or `None` if
/// `index` is out of range.
pub fn build_storage_proof(data: &[u8], index: u64) -> Option<(Vec<u8>, Vec<CryptoHash>)> {
    let segments = segments(data);
    let index = usize::try_from(index).ok()?;
    let segment = segments.get(index)?.to_vec();
    let leaves: Vec<CryptoHash> = segments.iter().map(|s| leaf_hash(s)).collect();

    let mut hash_set = Vec::new();
    let (mut leaves, mut index) = (&leaves[..], index);
    while leaves.len() > 1 {
        let split = left_subtree_size(leaves.len() as u64) as usize;
        if index < split {
            hash_set.push(subtree_root(&leaves[split..]));
            leaves = &leaves[..split];
        } else {
            hash_set.push(subtree_root(&leaves[..split]));
            leaves = &leaves[split..];
            index -= split;
        }
    }
    // Collected from the root down.
    hash_set.reverse();
    Some((segment, hash_set))
}

/// Whether `segment`, with siblings `hash_set`, is the segment at `index` of a file of `num_segments`
/// segments whose Merkle root is `root`.
pub fn verify_segment(
    segment: &[u8],
    hash_set: &[CryptoHash],
    num_segments: u64,
    index: u64,
    root: &CryptoHash,
) -> bool {
    if segment.len() != SEGMENT_SIZE || index >= num_segments {
        return false;
    }

    // Whether the proven leaf lies in the left subtree, at each level from the root down.
    let mut in_left = Vec::new();
    let (mut size, mut index) = (num_segments, index);
    while size > 1 {
        let split = left_subtree_size(size);
        if index < split {
            in_left.push(true);
            size = split;
        } else {
            in_left.push(false);
            size -= split;
            index -= split;
        }
    }
    if in_left.len() != hash_set.len() {
        return false;
    }

    let mut hash = leaf_hash(segment);
    for (sibling, left) in hash_set.iter().zip(in_left.iter().rev()) {
        hash = if *left {
            node_hash(&hash, sibling)
        } else {
            node_hash(sibling, &hash)
        };
    }
    &hash == root
}

fn leaf_hash(segment: &[u8]) -> CryptoHash {
    hash_parts(&[LEAF_PREFIX, segment])
}

fn node_hash(left: &CryptoHash, right: &CryptoHash) -> CryptoHash {
    hash_parts(&[NODE_PREFIX, &left.bytes(), &right.bytes()])
}

/// Largest power of two strictly less than `size`. `size` must be at least 2.
fn left_subtree_size(size: u64) -> u64 {
    1 << (63 - (size - 1).leading_zeros())
}

fn subtree_root(leaves: &[CryptoHash]) -> CryptoHash {
    if leaves.len() <= 1 {
        return leaves.first().copied().unwrap_or_default();
    }
    let split = left_subtree_size(leaves.len() as u64) as usize;
    node_hash(&subtree_root(&leaves[..split]), &subtree_root(&leaves[split..]))
}
