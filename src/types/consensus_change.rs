/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The unit of notification sent to [subscribers](crate::subscription::Subscriber).

use borsh::{BorshDeserialize, BorshSerialize};
use std::fmt::{self, Debug, Display, Formatter};

use super::{
    basic::{BlockID, CryptoHash},
    block::Block,
    crypto_primitives::{encode, hash_parts, specifiers},
    diffs::{ContractDiff, DelayedOutputDiff, OutputDiff},
};

/// Opaque checkpoint naming one entry of the change log.
///
/// Subscribers persist the id of the last change they processed and pass it back to
/// [`subscribe`](crate::consensus_set::ConsensusSet::subscribe) to resume.
#[derive(Clone, Copy, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct ConsensusChangeID(CryptoHash);

impl ConsensusChangeID {
    /// Sentinel meaning "replay every change since genesis".
    pub const BEGINNING: ConsensusChangeID = ConsensusChangeID(CryptoHash::new([0; 32]));

    pub const fn new(hash: CryptoHash) -> Self {
        Self(hash)
    }

    pub const fn bytes(&self) -> [u8; 32] {
        self.0.bytes()
    }

    /// Id of the change at `log_index` that reverted `reverted` and applied `applied`.
    pub(crate) fn compute(log_index: u64, reverted: &[BlockID], applied: &[BlockID]) -> Self {
        Self(hash_parts(&[
            specifiers::CHANGE,
            &log_index.to_le_bytes(),
            &encode(reverted),
            &encode(applied),
        ]))
    }
}

impl Display for ConsensusChangeID {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl Debug for ConsensusChangeID {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "ConsensusChangeID({:?})", self.0)
    }
}

/// One step of the canonical chain: the blocks removed from and added to the current path by a single
/// accepted block, and the net ledger diffs of that step.
///
/// Diffs of reverted blocks appear flipped and in reverse order, followed by the diffs of applied
/// blocks in order, so that a consumer committing every diff forward tracks the ledger exactly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsensusChange {
    pub id: ConsensusChangeID,
    /// In the order they were reverted: the old head first.
    pub reverted_blocks: Vec<Block>,
    /// In the order they were applied: the new head last.
    pub applied_blocks: Vec<Block>,
    pub output_diffs: Vec<OutputDiff>,
    pub contract_diffs: Vec<ContractDiff>,
    pub delayed_output_diffs: Vec<DelayedOutputDiff>,
}

impl ConsensusChange {
    pub fn reverted_block_ids(&self) -> Vec<BlockID> {
        self.reverted_blocks.iter().map(Block::id).collect()
    }

    pub fn applied_block_ids(&self) -> Vec<BlockID> {
        self.applied_blocks.iter().map(Block::id).collect()
    }
}
