/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The ledger: the three maps that make up the state of the canonical chain.
//!
//! 1. Unspent outputs of both [assets](Asset), keyed by [`OutputID`].
//! 2. Unresolved file contracts, keyed by [`ContractID`].
//! 3. Delayed outputs, grouped by the height at which they mature.
//!
//! The maps are never written to directly. They only change by [committing](Ledger::commit_diff_set)
//! diffs, so at any point they equal the cumulative effect of the diffs of every block on the current
//! path. Every map is ordered, so enumerations are sorted by identifier.
//!
//! Readers that only need lookups go through the [`LedgerReader`] trait, which is also implemented by
//! [`BlockOverlay`], a view of the ledger plus the effects of some transactions that have not been
//! committed.

use std::collections::BTreeMap;

use crate::block_tree::invariants::ConsistencyError;
use crate::types::{
    basic::{Asset, BlockHeight, ContractID, OutputID},
    diffs::{ContractDiff, DelayedOutputDiff, DiffDirection, DiffSet, OutputDiff},
    transaction::{FileContract, Output},
};

mod overlay;
pub use overlay::BlockOverlay;

/// Read access to unspent outputs and unresolved contracts.
pub trait LedgerReader {
    fn output(&self, id: &OutputID) -> Option<&Output>;

    fn contract(&self, id: &ContractID) -> Option<&FileContract>;

    /// Whether an output with `id` exists, or has ever existed within the view.
    fn contains_output(&self, id: &OutputID) -> bool {
        self.output(id).is_some()
    }

    /// Whether a contract with `id` exists, or has ever existed within the view.
    fn contains_contract(&self, id: &ContractID) -> bool {
        self.contract(id).is_some()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Ledger {
    outputs: BTreeMap<OutputID, Output>,
    contracts: BTreeMap<ContractID, FileContract>,
    delayed_outputs: BTreeMap<BlockHeight, BTreeMap<OutputID, Output>>,
}

impl LedgerReader for Ledger {
    fn output(&self, id: &OutputID) -> Option<&Output> {
        self.outputs.get(id)
    }

    fn contract(&self, id: &ContractID) -> Option<&FileContract> {
        self.contracts.get(id)
    }
}

impl Ledger {
    pub fn new() -> Ledger {
        Ledger::default()
    }

    /// Whether all three maps are empty.
    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty() && self.contracts.is_empty() && self.delayed_outputs.is_empty()
    }

    /// Unspent outputs of `asset`, sorted by id.
    pub fn sorted_outputs(&self, asset: Asset) -> Vec<(OutputID, Output)> {
        self.outputs
            .iter()
            .filter(|(_, output)| output.asset == asset)
            .map(|(id, output)| (*id, output.clone()))
            .collect()
    }

    /// Unresolved contracts, sorted by id.
    pub fn contracts(&self) -> impl Iterator<Item = (&ContractID, &FileContract)> {
        self.contracts.iter()
    }

    /// Outputs maturing when the block at `height` is applied, sorted by id.
    pub fn delayed_outputs(&self, height: BlockHeight) -> Vec<(OutputID, Output)> {
        self.delayed_outputs
            .get(&height)
            .map(|outputs| {
                outputs
                    .iter()
                    .map(|(id, output)| (*id, output.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The delayed output `id` maturing at `height`.
    pub fn delayed_output(&self, height: BlockHeight, id: &OutputID) -> Option<&Output> {
        self.delayed_outputs.get(&height)?.get(id)
    }

    pub fn num_contracts(&self) -> usize {
        self.contracts.len()
    }

    /// Commit every diff of `diffs` in `direction`.
    ///
    /// Forward commits go through each list in order. Reverse commits go through each list backwards,
    /// and through the lists in the opposite order, so that a reverse commit exactly undoes a forward
    /// one. On error, the diffs committed before the failing one stay committed: callers must treat the
    /// error as fatal.
    pub fn commit_diff_set(
        &mut self,
        diffs: &DiffSet,
        direction: DiffDirection,
    ) -> Result<(), ConsistencyError> {
        match direction {
            DiffDirection::Apply => {
                for diff in &diffs.output_diffs {
                    self.commit_output_diff(diff, direction)?;
                }
                for diff in &diffs.contract_diffs {
                    self.commit_contract_diff(diff, direction)?;
                }
                for diff in &diffs.delayed_output_diffs {
                    self.commit_delayed_output_diff(diff, direction)?;
                }
            }
            DiffDirection::Revert => {
                for diff in diffs.delayed_output_diffs.iter().rev() {
                    self.commit_delayed_output_diff(diff, direction)?;
                }
                for diff in diffs.contract_diffs.iter().rev() {
                    self.commit_contract_diff(diff, direction)?;
                }
                for diff in diffs.output_diffs.iter().rev() {
                    self.commit_output_diff(diff, direction)?;
                }
            }
        }
        Ok(())
    }

    pub fn commit_output_diff(
        &mut self,
        diff: &OutputDiff,
        direction: DiffDirection,
    ) -> Result<(), ConsistencyError> {
        match diff.direction.effective(direction) {
            DiffDirection::Apply => {
                if self.outputs.contains_key(&diff.id) {
                    return Err(ConsistencyError::OutputAlreadyExists(diff.id));
                }
                self.outputs.insert(diff.id, diff.output.clone());
            }
            DiffDirection::Revert => match self.outputs.get(&diff.id) {
                Some(output) if output == &diff.output => {
                    self.outputs.remove(&diff.id);
                }
                _ => return Err(ConsistencyError::OutputMissing(diff.id)),
            },
        }
        Ok(())
    }

    pub fn commit_contract_diff(
        &mut self,
        diff: &ContractDiff,
        direction: DiffDirection,
    ) -> Result<(), ConsistencyError> {
        match diff.direction.effective(direction) {
            DiffDirection::Apply => {
                if self.contracts.contains_key(&diff.id) {
                    return Err(ConsistencyError::ContractAlreadyExists(diff.id));
                }
                self.contracts.insert(diff.id, diff.contract.clone());
            }
            DiffDirection::Revert => match self.contracts.get(&diff.id) {
                Some(contract) if contract == &diff.contract => {
                    self.contracts.remove(&diff.id);
                }
                _ => return Err(ConsistencyError::ContractMissing(diff.id)),
            },
        }
        Ok(())
    }

    pub fn commit_delayed_output_diff(
        &mut self,
        diff: &DelayedOutputDiff,
        direction: DiffDirection,
    ) -> Result<(), ConsistencyError> {
        match diff.direction.effective(direction) {
            DiffDirection::Apply => {
                let bucket = self.delayed_outputs.entry(diff.maturity_height).or_default();
                if bucket.contains_key(&diff.id) {
                    return Err(ConsistencyError::DelayedOutputAlreadyExists(diff.id));
                }
                bucket.insert(diff.id, diff.output.clone());
            }
            DiffDirection::Revert => {
                let bucket = self
                    .delayed_outputs
                    .get_mut(&diff.maturity_height)
                    .ok_or(ConsistencyError::DelayedOutputMissing(diff.id))?;
                match bucket.get(&diff.id) {
                    Some(output) if output == &diff.output => {
                        bucket.remove(&diff.id);
                    }
                    _ => return Err(ConsistencyError::DelayedOutputMissing(diff.id)),
                }
                // Empty buckets are dropped so that reverting every diff leaves an empty ledger.
                if bucket.is_empty() {
                    self.delayed_outputs.remove(&diff.maturity_height);
                }
            }
        }
        Ok(())
    }
}
