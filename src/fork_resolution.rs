/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Moving the current path (and the ledger with it) onto a heavier chain.
//!
//! A reorg to a new head happens in three phases:
//! 1. **Compare**: the caller has established that the new head is heavier than the current head.
//! 2. **Reconcile**: find the common ancestor by walking back from the new head until a block on the
//!    current path is reached, then revert and pop every block above the ancestor, newest first.
//! 3. **Apply**: for every block from the ancestor up to the new head, generate its diffs if they have
//!    never been generated (validating its transactions) or commit its cached diffs otherwise, and push
//!    it onto the current path.
//!
//! When a block turns out to contain an invalid transaction in phase 3, the reorg is undone: the blocks
//! applied so far are reverted and the blocks reverted in phase 2 are applied again, so the current path
//! and the ledger end up exactly as they started.

use std::fmt::{self, Display, Formatter};

use crate::block_tree::{invariants::ConsistencyError, BlockTree, DiffState};
use crate::config::Configuration;
use crate::diff_engine::{apply_diffs, generate_diffs, revert_diffs, GenerationError};
use crate::ledger::Ledger;
use crate::types::basic::BlockID;
use crate::validation::BlockError;

/// The blocks a successful reorg took off and put on the current path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reorg {
    /// In the order they were reverted: the old head first.
    pub reverted: Vec<BlockID>,
    /// In the order they were applied: the new head last.
    pub applied: Vec<BlockID>,
}

/// Make `new_head` the head of the current path.
pub fn fork_blockchain(
    tree: &mut BlockTree,
    ledger: &mut Ledger,
    new_head: &BlockID,
    config: &Configuration,
) -> Result<Reorg, ReorgError> {
    let mut backtrack = tree.backtrack_to_current_path(new_head).map_err(|_| {
        ReorgError::Consistency(ConsistencyError::MissingBlock(*new_head))
    })?;
    let ancestor = backtrack
        .pop()
        .ok_or(ReorgError::Consistency(ConsistencyError::MissingBlock(*new_head)))?;
    backtrack.reverse();
    let to_apply = backtrack;

    let mut reverted = Vec::new();
    while tree.head_id() != ancestor {
        reverted.push(revert_head(tree, ledger)?);
    }

    let mut applied = Vec::with_capacity(to_apply.len());
    for id in &to_apply {
        match apply_block(tree, ledger, id, config) {
            Ok(()) => applied.push(*id),
            Err(ReorgError::Invalid { block, error }) => {
                undo(tree, ledger, &applied, &reverted)?;
                tree.mark_invalid(&block);
                return Err(ReorgError::Invalid { block, error });
            }
            Err(error) => return Err(error),
        }
    }

    Ok(Reorg { reverted, applied })
}

/// Revert the diffs of the head and pop it off the current path.
fn revert_head(tree: &mut BlockTree, ledger: &mut Ledger) -> Result<BlockID, ConsistencyError> {
    let head = tree.head_id();
    let node = tree.node(&head).ok_or(ConsistencyError::MissingBlock(head))?;
    revert_diffs(node, ledger)?;
    tree.pop_current_path()
        .ok_or(ConsistencyError::BrokenPath { height: tree.height() })
}

/// Commit (generating first, if necessary) the diffs of the child of the head with `id`, and push it
/// onto the current path.
fn apply_block(
    tree: &mut BlockTree,
    ledger: &mut Ledger,
    id: &BlockID,
    config: &Configuration,
) -> Result<(), ReorgError> {
    let node = tree.node(id).ok_or(ConsistencyError::MissingBlock(*id))?;
    if node.diffs_generated() {
        apply_diffs(node, ledger)?;
    } else {
        let validate = !node.transactions_validated;
        let block = node.block().clone();
        let diffs = match generate_diffs(&block, tree, ledger, config, validate) {
            Ok(diffs) => diffs,
            Err(GenerationError::Invalid(error)) => {
                return Err(ReorgError::Invalid { block: *id, error })
            }
            Err(GenerationError::Consistency(error)) => return Err(error.into()),
        };
        let node = tree.node_mut(id).ok_or(ConsistencyError::MissingBlock(*id))?;
        node.diffs = DiffState::Generated(diffs);
        node.transactions_validated = true;
    }
    tree.push_current_path(*id);
    Ok(())
}

/// Revert the blocks in `applied` and re-apply the blocks in `reverted`.
fn undo(
    tree: &mut BlockTree,
    ledger: &mut Ledger,
    applied: &[BlockID],
    reverted: &[BlockID],
) -> Result<(), ConsistencyError> {
    for _ in applied {
        revert_head(tree, ledger)?;
    }
    for id in reverted.iter().rev() {
        let node = tree.node(id).ok_or(ConsistencyError::MissingBlock(*id))?;
        apply_diffs(node, ledger)?;
        tree.push_current_path(*id);
    }
    Ok(())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReorgError {
    /// `block` contains an invalid transaction. The reorg was undone, and `block` and its descendants
    /// were marked invalid.
    Invalid { block: BlockID, error: BlockError },
    /// Fatal.
    Consistency(ConsistencyError),
}

impl From<ConsistencyError> for ReorgError {
    fn from(error: ConsistencyError) -> Self {
        ReorgError::Consistency(error)
    }
}

impl Display for ReorgError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ReorgError::Invalid { block, error } => {
                write!(f, "block {} is invalid: {}", block, error)
            }
            ReorgError::Consistency(error) => write!(f, "inconsistent state: {}", error),
        }
    }
}

impl std::error::Error for ReorgError {}
