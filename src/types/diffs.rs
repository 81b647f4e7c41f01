/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types that describe mutations of the ledger.
//!
//! Every mutation of the [ledger](crate::ledger::Ledger) is a diff: an immutable fact ("output `id`
//! with value `output`") plus a [`DiffDirection`]. A diff whose direction is [`Apply`](DiffDirection::Apply)
//! adds its object to the ledger when committed forward, and removes it when committed in reverse. A
//! diff whose direction is [`Revert`](DiffDirection::Revert) does the opposite. Committing a diff forward
//! and then in reverse is therefore a no-op, which is what makes reorgs possible.

use borsh::{BorshDeserialize, BorshSerialize};

use super::{
    basic::{BlockHeight, ContractID, OutputID},
    transaction::{FileContract, Output},
};

/// Whether a diff adds or removes its object when committed forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub enum DiffDirection {
    Apply,
    Revert,
}

impl DiffDirection {
    pub fn flip(self) -> DiffDirection {
        match self {
            DiffDirection::Apply => DiffDirection::Revert,
            DiffDirection::Revert => DiffDirection::Apply,
        }
    }

    /// The direction a diff with this direction takes effect in when committed in `commit` direction.
    pub fn effective(self, commit: DiffDirection) -> DiffDirection {
        match commit {
            DiffDirection::Apply => self,
            DiffDirection::Revert => self.flip(),
        }
    }
}

/// An unspent output was created (`Apply`) or spent (`Revert`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct OutputDiff {
    pub direction: DiffDirection,
    pub id: OutputID,
    pub output: Output,
}

/// A file contract was created (`Apply`) or resolved (`Revert`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct ContractDiff {
    pub direction: DiffDirection,
    pub id: ContractID,
    pub contract: FileContract,
}

/// A delayed output maturing at `maturity_height` was created (`Apply`) or matured (`Revert`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct DelayedOutputDiff {
    pub direction: DiffDirection,
    pub maturity_height: BlockHeight,
    pub id: OutputID,
    pub output: Output,
}

/// All diffs produced by applying one block, in the order they were generated.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct DiffSet {
    pub output_diffs: Vec<OutputDiff>,
    pub contract_diffs: Vec<ContractDiff>,
    pub delayed_output_diffs: Vec<DelayedOutputDiff>,
}

impl DiffSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.output_diffs.is_empty()
            && self.contract_diffs.is_empty()
            && self.delayed_output_diffs.is_empty()
    }

    /// Append the diffs of `other` after the diffs of `self`.
    pub fn extend(&mut self, other: DiffSet) {
        self.output_diffs.extend(other.output_diffs);
        self.contract_diffs.extend(other.contract_diffs);
        self.delayed_output_diffs.extend(other.delayed_output_diffs);
    }

    /// The diffs that undo this set: every diff flipped, in reverse order.
    pub fn inverted(&self) -> DiffSet {
        DiffSet {
            output_diffs: self
                .output_diffs
                .iter()
                .rev()
                .map(|diff| OutputDiff {
                    direction: diff.direction.flip(),
                    ..diff.clone()
                })
                .collect(),
            contract_diffs: self
                .contract_diffs
                .iter()
                .rev()
                .map(|diff| ContractDiff {
                    direction: diff.direction.flip(),
                    ..diff.clone()
                })
                .collect(),
            delayed_output_diffs: self
                .delayed_output_diffs
                .iter()
                .rev()
                .map(|diff| DelayedOutputDiff {
                    direction: diff.direction.flip(),
                    ..diff.clone()
                })
                .collect(),
        }
    }
}
