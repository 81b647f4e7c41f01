/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The Block Tree: every block ever accepted, and the current path through them.
//!
//! ## Nodes
//!
//! Blocks are stored in an arena of [`BlockNode`]s keyed by [`BlockID`]. A node refers to its parent
//! and children by id rather than by pointer, so the tree has no ownership cycles. Nodes are never
//! removed: a block that falls off the canonical chain stays in the tree, with its diffs cached, so that
//! a later reorg back onto it only has to commit them again.
//!
//! When a block is inserted its node is given:
//! 1. A height: the parent's height plus one.
//! 2. A target: the parent's child target, which the block's id must already satisfy.
//! 3. A child target: the target adjusted by how fast the chain ending at the block was mined (see
//!    [`Target::adjusted`]).
//! 4. A weight: the parent's weight plus the inverse of the target.
//!
//! ## Current Path
//!
//! The current path lists the ids of the blocks of the canonical chain, indexed by height. It starts
//! at genesis and ends at the head. A reorg pops blocks off its end and pushes the blocks of the new
//! chain, so lookups by height on the canonical chain are constant-time.
//!
//! The block tree does not check the validity of blocks and never mutates the ledger; that is the job
//! of the [validation](crate::validation) and [fork resolution](crate::fork_resolution) modules.

use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};

use crate::config::Configuration;
use crate::types::{
    basic::{BlockHeight, BlockID, Timestamp},
    block::Block,
    diffs::{DiffSet, OutputDiff},
    target::Target,
};

pub mod invariants;

mod node;
pub use node::{BlockNode, DiffState};

pub struct BlockTree {
    nodes: HashMap<BlockID, BlockNode>,
    current_path: Vec<BlockID>,
}

impl BlockTree {
    /// Create a block tree containing only `genesis`, whose diffs are `genesis_diffs`.
    pub(crate) fn new(genesis: Block, genesis_diffs: DiffSet, config: &Configuration) -> BlockTree {
        let id = genesis.id();
        let node = BlockNode {
            id,
            block: genesis,
            children: Vec::new(),
            height: BlockHeight::new(0),
            target: config.root_target,
            child_target: config.root_target,
            weight: config.root_target.inverse(),
            diffs: DiffState::Generated(genesis_diffs),
            transactions_validated: true,
            invalid: false,
        };
        BlockTree {
            nodes: HashMap::from([(id, node)]),
            current_path: vec![id],
        }
    }

    /* ↓↓↓ Current path ↓↓↓ */

    pub fn genesis_id(&self) -> BlockID {
        self.current_path[0]
    }

    pub fn head_id(&self) -> BlockID {
        self.current_path[self.current_path.len() - 1]
    }

    pub fn head(&self) -> &BlockNode {
        &self.nodes[&self.head_id()]
    }

    /// Height of the head. The current path always contains at least genesis.
    pub fn height(&self) -> BlockHeight {
        BlockHeight::new(self.current_path.len() as u64 - 1)
    }

    pub fn current_path(&self) -> &[BlockID] {
        &self.current_path
    }

    pub fn block_id_at_height(&self, height: BlockHeight) -> Option<BlockID> {
        self.current_path.get(height.int() as usize).copied()
    }

    /// The block at `height` on the current path, `None` if `height` is above the head.
    pub fn block_at_height(&self, height: BlockHeight) -> Option<&Block> {
        let id = self.block_id_at_height(height)?;
        Some(&self.nodes.get(&id)?.block)
    }

    /// The blocks of the current path with heights in `[start, stop]`.
    pub fn block_range(
        &self,
        start: BlockHeight,
        stop: BlockHeight,
    ) -> Result<Vec<&Block>, BlockTreeError> {
        if start > stop || stop > self.height() {
            return Err(BlockTreeError::InvalidRange { start, stop });
        }
        (start.int()..=stop.int())
            .map(|height| {
                self.block_at_height(BlockHeight::new(height))
                    .ok_or(BlockTreeError::InvalidRange { start, stop })
            })
            .collect()
    }

    pub fn is_on_current_path(&self, id: &BlockID) -> bool {
        match self.nodes.get(id) {
            Some(node) => self.block_id_at_height(node.height) == Some(*id),
            None => false,
        }
    }

    pub(crate) fn push_current_path(&mut self, id: BlockID) {
        self.current_path.push(id)
    }

    /// Remove the head from the current path. Genesis is never removed.
    pub(crate) fn pop_current_path(&mut self) -> Option<BlockID> {
        if self.current_path.len() > 1 {
            self.current_path.pop()
        } else {
            None
        }
    }

    /* ↓↓↓ Any block ↓↓↓ */

    pub fn node(&self, id: &BlockID) -> Option<&BlockNode> {
        self.nodes.get(id)
    }

    pub(crate) fn node_mut(&mut self, id: &BlockID) -> Option<&mut BlockNode> {
        self.nodes.get_mut(id)
    }

    pub fn block_by_id(&self, id: &BlockID) -> Option<&Block> {
        Some(&self.nodes.get(id)?.block)
    }

    /// Height of the block with `id`, whether or not it is on the current path.
    pub fn height_of_block(&self, id: &BlockID) -> Option<BlockHeight> {
        Some(self.nodes.get(id)?.height)
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// The output diffs cached for the block with `id`.
    pub fn block_output_diffs(&self, id: &BlockID) -> Result<&[OutputDiff], BlockTreeError> {
        match &self.nodes.get(id).ok_or(BlockTreeError::UnknownBlock(*id))?.diffs {
            DiffState::Generated(diffs) => Ok(&diffs.output_diffs),
            DiffState::Unvisited => Err(BlockTreeError::DiffsNotGenerated(*id)),
        }
    }

    /// The ancestor of the block with `id` (or the block itself) at `height`.
    pub fn ancestor_at_height(&self, id: &BlockID, height: BlockHeight) -> Option<&BlockNode> {
        let mut node = self.nodes.get(id)?;
        loop {
            if node.height == height {
                return Some(node);
            }
            if node.height < height {
                return None;
            }
            if self.is_on_current_path(&node.id) {
                return self.nodes.get(&self.block_id_at_height(height)?);
            }
            node = self.nodes.get(&node.parent()?)?;
        }
    }

    /// The ids from the block with `id` back to its closest ancestor on the current path, both
    /// included. If the block is on the current path the result is just `[id]`.
    pub fn backtrack_to_current_path(&self, id: &BlockID) -> Result<Vec<BlockID>, BlockTreeError> {
        let mut path = Vec::new();
        let mut node = self.nodes.get(id).ok_or(BlockTreeError::UnknownBlock(*id))?;
        loop {
            path.push(node.id);
            if self.is_on_current_path(&node.id) {
                return Ok(path);
            }
            let parent = node.parent().ok_or(BlockTreeError::UnknownBlock(node.id))?;
            node = self
                .nodes
                .get(&parent)
                .ok_or(BlockTreeError::UnknownParent(parent))?;
        }
    }

    /// The blocks that were reverted and applied to get from the chain whose head was `id` to the
    /// current chain.
    ///
    /// Reverted blocks are listed from `id` downwards; applied blocks from the common ancestor upwards.
    pub fn blocks_since(
        &self,
        id: &BlockID,
    ) -> Result<(Vec<BlockID>, Vec<BlockID>), BlockTreeError> {
        let mut reverted = self.backtrack_to_current_path(id)?;
        let ancestor = reverted.pop().ok_or(BlockTreeError::UnknownBlock(*id))?;
        let ancestor_height = self.nodes[&ancestor].height.int() as usize;
        let applied = self.current_path[ancestor_height + 1..].to_vec();
        Ok((reverted, applied))
    }

    /// The earliest timestamp a child of the block with `id` may have: the median of the timestamps of
    /// the block and its closest ancestors, `window` timestamps in all. Near genesis, where there are
    /// not enough ancestors, the genesis timestamp fills the remaining places.
    pub fn earliest_child_timestamp(&self, id: &BlockID, window: usize) -> Option<Timestamp> {
        let mut node = self.nodes.get(id)?;
        let mut timestamps = Vec::with_capacity(window);
        for _ in 0..window.max(1) {
            timestamps.push(node.block.timestamp);
            if let Some(parent) = node.parent() {
                node = self.nodes.get(&parent)?;
            }
        }
        timestamps.sort();
        Some(timestamps[timestamps.len() / 2])
    }

    /* ↓↓↓ Insertion ↓↓↓ */

    /// Add `block` as a child of its parent, computing its height, targets and weight.
    ///
    /// Does not check whether `block` is valid. The caller must have checked that the block is not
    /// already in the tree.
    pub(crate) fn insert(
        &mut self,
        block: Block,
        config: &Configuration,
    ) -> Result<BlockID, BlockTreeError> {
        let id = block.id();
        let parent_id = block.parent_id;
        let parent = self
            .nodes
            .get(&parent_id)
            .ok_or(BlockTreeError::UnknownParent(parent_id))?;

        let height = parent.height + 1;
        let target = parent.child_target;
        let weight = &parent.weight + &target.inverse();
        let invalid = parent.invalid;
        let child_target = self.child_target(&parent_id, height, block.timestamp, target, config);

        let node = BlockNode {
            id,
            block,
            children: Vec::new(),
            height,
            target,
            child_target,
            weight,
            diffs: DiffState::Unvisited,
            transactions_validated: false,
            invalid,
        };
        self.nodes.insert(id, node);
        if let Some(parent) = self.nodes.get_mut(&parent_id) {
            parent.children.push(id);
        }
        Ok(id)
    }

    /// Mark the block with `id` and all of its descendants as invalid.
    pub(crate) fn mark_invalid(&mut self, id: &BlockID) {
        let mut stack = vec![*id];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.nodes.get_mut(&id) {
                node.invalid = true;
                stack.extend(node.children.iter().copied());
            }
        }
    }

    /// Target for the children of a block with the given `height`, `timestamp` and `target`, whose parent
    /// is `parent_id`.
    fn child_target(
        &self,
        parent_id: &BlockID,
        height: BlockHeight,
        timestamp: Timestamp,
        target: Target,
        config: &Configuration,
    ) -> Target {
        let (secs_passed, secs_expected) = match height.checked_sub(config.target_window) {
            Some(window_start) if config.target_window > 0 => {
                let window_start_timestamp = self
                    .ancestor_at_height(parent_id, window_start)
                    .map(|node| node.block.timestamp)
                    .unwrap_or(config.genesis_timestamp);
                (
                    timestamp.secs_since(window_start_timestamp),
                    config.block_frequency.saturating_mul(config.target_window),
                )
            }
            _ => (
                timestamp.secs_since(config.genesis_timestamp),
                config.block_frequency.saturating_mul(height.int()),
            ),
        };
        target.adjusted(
            secs_passed,
            secs_expected,
            &config.max_adjustment_up,
            &config.max_adjustment_down,
            &config.root_target,
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlockTreeError {
    UnknownParent(BlockID),
    UnknownBlock(BlockID),
    InvalidRange {
        start: BlockHeight,
        stop: BlockHeight,
    },
    DiffsNotGenerated(BlockID),
}

impl Display for BlockTreeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            BlockTreeError::UnknownParent(id) => write!(f, "parent block {} is unknown", id),
            BlockTreeError::UnknownBlock(id) => write!(f, "block {} is unknown", id),
            BlockTreeError::InvalidRange { start, stop } => {
                write!(f, "invalid range [{}, {}]", start, stop)
            }
            BlockTreeError::DiffsNotGenerated(id) => {
                write!(f, "diffs of block {} have not been generated", id)
            }
        }
    }
}

impl std::error::Error for BlockTreeError {}
