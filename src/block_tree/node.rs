/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

use crate::types::{
    basic::{BlockHeight, BlockID},
    block::Block,
    diffs::DiffSet,
    target::{Target, Weight},
};

/// Whether the diffs of a block have been computed.
///
/// A node starts `Unvisited` and moves to `Generated` the first time its block joins the current path.
/// It never moves back: later reorgs commit the cached diffs instead of regenerating them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DiffState {
    Unvisited,
    Generated(DiffSet),
}

/// Everything the block tree knows about one block.
#[derive(Clone, Debug)]
pub struct BlockNode {
    pub(crate) id: BlockID,
    pub(crate) block: Block,
    pub(crate) children: Vec<BlockID>,
    pub(crate) height: BlockHeight,
    pub(crate) target: Target,
    pub(crate) child_target: Target,
    pub(crate) weight: Weight,
    pub(crate) diffs: DiffState,
    pub(crate) transactions_validated: bool,
    pub(crate) invalid: bool,
}

impl BlockNode {
    pub fn id(&self) -> BlockID {
        self.id
    }

    pub fn block(&self) -> &Block {
        &self.block
    }

    /// `None` for the genesis block.
    pub fn parent(&self) -> Option<BlockID> {
        if self.height.int() == 0 {
            None
        } else {
            Some(self.block.parent_id)
        }
    }

    /// In the order they were inserted.
    pub fn children(&self) -> &[BlockID] {
        &self.children
    }

    pub fn height(&self) -> BlockHeight {
        self.height
    }

    /// The target this block's id satisfied.
    pub fn target(&self) -> Target {
        self.target
    }

    /// The target this block's children must satisfy.
    pub fn child_target(&self) -> Target {
        self.child_target
    }

    /// Sum of the inverse targets of this block and all of its ancestors.
    pub fn weight(&self) -> &Weight {
        &self.weight
    }

    pub fn diffs(&self) -> &DiffState {
        &self.diffs
    }

    pub fn diffs_generated(&self) -> bool {
        matches!(self.diffs, DiffState::Generated(_))
    }

    /// Whether this block, or one of its ancestors, contained an invalid transaction.
    pub fn is_invalid(&self) -> bool {
        self.invalid
    }
}
