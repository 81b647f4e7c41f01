/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Invariants of the block tree and the ledger, and the fatal error raised when one is found broken.
//!
//! # Invariants
//!
//! 1. **Path consistency**: `current_path[0]` is genesis, `current_path[h]` has height `h`, and for every
//!    `h > 0`, `current_path[h]`'s parent is `current_path[h - 1]`.
//! 2. **Generated diffs**: every block on the current path has had its diffs generated.
//! 3. **Ledger consistency**: the ledger equals the result of committing the diffs of every block on the
//!    current path, in order, to an empty ledger.
//! 4. **Weight monotonicity**: every block is strictly heavier than its parent.
//!
//! These are maintained by construction: the block tree only grows, and the ledger only changes by
//! committing diffs. The checks below exist to detect a broken invariant, not to repair it.
//!
//! # Fatal errors
//!
//! A [`ConsistencyError`] means the in-memory state no longer follows from the blocks that were
//! accepted. It is never caused by a bad block from a peer. The
//! [consensus set](crate::consensus_set::ConsensusSet) stops accepting blocks and stops notifying
//! subscribers once it sees one.

use std::fmt::{self, Display, Formatter};

use super::{BlockTree, DiffState};
use crate::ledger::Ledger;
use crate::types::{
    basic::{BlockHeight, BlockID, ContractID, OutputID},
    diffs::DiffDirection,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConsistencyError {
    OutputAlreadyExists(OutputID),
    OutputMissing(OutputID),
    ContractAlreadyExists(ContractID),
    ContractMissing(ContractID),
    DelayedOutputAlreadyExists(OutputID),
    DelayedOutputMissing(OutputID),
    MissingBlock(BlockID),
    DiffsNotGenerated(BlockID),
    BrokenPath { height: BlockHeight },
    LedgerMismatch,
}

impl Display for ConsistencyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ConsistencyError::OutputAlreadyExists(id) => write!(f, "output {} already exists", id),
            ConsistencyError::OutputMissing(id) => write!(f, "output {} is missing", id),
            ConsistencyError::ContractAlreadyExists(id) => {
                write!(f, "contract {} already exists", id)
            }
            ConsistencyError::ContractMissing(id) => write!(f, "contract {} is missing", id),
            ConsistencyError::DelayedOutputAlreadyExists(id) => {
                write!(f, "delayed output {} already exists", id)
            }
            ConsistencyError::DelayedOutputMissing(id) => {
                write!(f, "delayed output {} is missing", id)
            }
            ConsistencyError::MissingBlock(id) => {
                write!(f, "block {} is missing from the tree", id)
            }
            ConsistencyError::DiffsNotGenerated(id) => {
                write!(f, "block {} is on the current path without generated diffs", id)
            }
            ConsistencyError::BrokenPath { height } => {
                write!(f, "current path is broken at height {}", height)
            }
            ConsistencyError::LedgerMismatch => {
                write!(f, "ledger does not match the diffs of the current path")
            }
        }
    }
}

impl std::error::Error for ConsistencyError {}

/// Check path consistency, generated diffs and weight monotonicity along the current path.
pub fn check_current_path(tree: &BlockTree) -> Result<(), ConsistencyError> {
    let mut parent: Option<&super::BlockNode> = None;
    for (height, id) in tree.current_path().iter().enumerate() {
        let height = BlockHeight::new(height as u64);
        let node = tree.node(id).ok_or(ConsistencyError::MissingBlock(*id))?;
        if node.height() != height {
            return Err(ConsistencyError::BrokenPath { height });
        }
        if !node.diffs_generated() {
            return Err(ConsistencyError::DiffsNotGenerated(*id));
        }
        if let Some(parent) = parent {
            if node.block().parent_id != parent.id() || node.weight() <= parent.weight() {
                return Err(ConsistencyError::BrokenPath { height });
            }
        }
        parent = Some(node);
    }
    Ok(())
}

/// Check that `ledger` equals the ledger rebuilt from the diffs of the current path.
///
/// Rebuilds the whole ledger, so this is for tests and diagnostics only.
pub fn check_ledger(tree: &BlockTree, ledger: &Ledger) -> Result<(), ConsistencyError> {
    let mut rebuilt = Ledger::new();
    for id in tree.current_path() {
        match tree.node(id).map(|node| node.diffs()) {
            Some(DiffState::Generated(diffs)) => {
                rebuilt.commit_diff_set(diffs, DiffDirection::Apply)?
            }
            Some(DiffState::Unvisited) => return Err(ConsistencyError::DiffsNotGenerated(*id)),
            None => return Err(ConsistencyError::MissingBlock(*id)),
        }
    }
    if &rebuilt == ledger {
        Ok(())
    } else {
        Err(ConsistencyError::LedgerMismatch)
    }
}
