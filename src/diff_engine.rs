/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Generation, application and reversal of the diffs of a block.
//!
//! [`generate_diffs`] runs once per block, the first time the block joins the current path. It walks
//! the block's transactions in order, committing the diffs of each transaction to the ledger before
//! looking at the next one (so later transactions can spend outputs created by earlier ones). Then it
//! performs the per-block maintenance, in this order:
//! 1. Contracts whose window ends at this height are resolved as missed.
//! 2. Miner payouts become delayed outputs.
//! 3. Delayed outputs maturing at this height become spendable outputs.
//!
//! The resulting [`DiffSet`] is cached in the block's node. From then on [`apply_diffs`] and
//! [`revert_diffs`] move the ledger across the block without looking at its transactions again.

use std::collections::HashSet;
use std::fmt::{self, Display, Formatter};

use crate::block_tree::{invariants::ConsistencyError, BlockNode, BlockTree, DiffState};
use crate::config::Configuration;
use crate::ledger::{Ledger, LedgerReader};
use crate::types::{
    basic::{BlockHeight, ContractID, OutputID},
    block::Block,
    diffs::{ContractDiff, DelayedOutputDiff, DiffDirection, DiffSet, OutputDiff},
    transaction::{storage_proof_output_id, FileContract, Transaction},
};
use crate::validation::{valid_transaction, BlockError, TransactionError};

/// Commit every diff of `node` to `ledger`, moving the ledger from the node's parent to the node.
pub fn apply_diffs(node: &BlockNode, ledger: &mut Ledger) -> Result<(), ConsistencyError> {
    match node.diffs() {
        DiffState::Generated(diffs) => ledger.commit_diff_set(diffs, DiffDirection::Apply),
        DiffState::Unvisited => Err(ConsistencyError::DiffsNotGenerated(node.id())),
    }
}

/// Undo every diff of `node`, moving the ledger from the node to the node's parent.
pub fn revert_diffs(node: &BlockNode, ledger: &mut Ledger) -> Result<(), ConsistencyError> {
    match node.diffs() {
        DiffState::Generated(diffs) => ledger.commit_diff_set(diffs, DiffDirection::Revert),
        DiffState::Unvisited => Err(ConsistencyError::DiffsNotGenerated(node.id())),
    }
}

/// Compute the diffs of `block` and commit them to `ledger`.
///
/// The current path of `tree` and `ledger` must be positioned at the block's parent. On success they
/// are left positioned at the block (the ledger has the diffs committed; the caller pushes the block
/// onto the path). If `validate` is set, every transaction is checked before its diffs are committed;
/// if one is invalid, every diff committed so far is reverted and the error returned.
pub fn generate_diffs(
    block: &Block,
    tree: &BlockTree,
    ledger: &mut Ledger,
    config: &Configuration,
    validate: bool,
) -> Result<DiffSet, GenerationError> {
    if tree.head_id() != block.parent_id {
        return Err(GenerationError::Consistency(ConsistencyError::BrokenPath {
            height: tree.height(),
        }));
    }
    let height = tree.height() + 1;

    let mut recorder = DiffRecorder::new(ledger);
    match recorder.generate(block, height, tree, config, validate) {
        Ok(()) => Ok(recorder.diffs),
        Err(error) => {
            recorder.rollback()?;
            Err(error)
        }
    }
}

/// The diffs of the genesis block: every output of its transactions is created as-is.
pub fn generate_genesis_diffs(
    genesis: &Block,
    ledger: &mut Ledger,
) -> Result<DiffSet, ConsistencyError> {
    let mut recorder = DiffRecorder::new(ledger);
    for tx in &genesis.transactions {
        for (index, output) in tx.outputs.iter().enumerate() {
            recorder.output(OutputDiff {
                direction: DiffDirection::Apply,
                id: tx.output_id(index),
                output: output.clone(),
            })?;
        }
    }
    Ok(recorder.diffs)
}

/// Commits diffs to a ledger, keeping a record of every diff committed.
struct DiffRecorder<'a> {
    ledger: &'a mut Ledger,
    diffs: DiffSet,
    created_outputs: HashSet<OutputID>,
    created_contracts: HashSet<ContractID>,
}

impl<'a> DiffRecorder<'a> {
    fn new(ledger: &'a mut Ledger) -> DiffRecorder<'a> {
        DiffRecorder {
            ledger,
            diffs: DiffSet::new(),
            created_outputs: HashSet::new(),
            created_contracts: HashSet::new(),
        }
    }

    fn output(&mut self, diff: OutputDiff) -> Result<(), ConsistencyError> {
        self.ledger.commit_output_diff(&diff, DiffDirection::Apply)?;
        self.diffs.output_diffs.push(diff);
        Ok(())
    }

    fn contract(&mut self, diff: ContractDiff) -> Result<(), ConsistencyError> {
        self.ledger.commit_contract_diff(&diff, DiffDirection::Apply)?;
        self.diffs.contract_diffs.push(diff);
        Ok(())
    }

    fn delayed_output(&mut self, diff: DelayedOutputDiff) -> Result<(), ConsistencyError> {
        self.ledger
            .commit_delayed_output_diff(&diff, DiffDirection::Apply)?;
        self.diffs.delayed_output_diffs.push(diff);
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), ConsistencyError> {
        let diffs = std::mem::take(&mut self.diffs);
        self.ledger.commit_diff_set(&diffs, DiffDirection::Revert)
    }

    fn generate(
        &mut self,
        block: &Block,
        height: BlockHeight,
        tree: &BlockTree,
        config: &Configuration,
        validate: bool,
    ) -> Result<(), GenerationError> {
        for (index, tx) in block.transactions.iter().enumerate() {
            if validate {
                valid_transaction(tx, &*self.ledger, tree, height, config)
                    .and_then(|()| self.not_created_in_block(tx))
                    .map_err(|error| {
                        GenerationError::Invalid(BlockError::Transaction { index, error })
                    })?;
            }
            self.apply_transaction(tx, height, config)?;
        }
        self.apply_contract_expiries(height, config)?;
        self.apply_miner_payouts(block, height, config)?;
        self.apply_matured_outputs(height)?;
        Ok(())
    }

    /// Outputs and contracts created earlier in the block may already be spent or resolved, and so
    /// missing from the ledger.
    fn not_created_in_block(&self, tx: &Transaction) -> Result<(), TransactionError> {
        for index in 0..tx.outputs.len() {
            let id = tx.output_id(index);
            if self.created_outputs.contains(&id) {
                return Err(TransactionError::OutputAlreadyExists(id));
            }
        }
        for index in 0..tx.file_contracts.len() {
            let id = tx.contract_id(index);
            if self.created_contracts.contains(&id) {
                return Err(TransactionError::ContractAlreadyExists(id));
            }
        }
        Ok(())
    }

    fn apply_transaction(
        &mut self,
        tx: &Transaction,
        height: BlockHeight,
        config: &Configuration,
    ) -> Result<(), ConsistencyError> {
        for input in &tx.inputs {
            let output = self
                .ledger
                .output(&input.parent_id)
                .cloned()
                .ok_or(ConsistencyError::OutputMissing(input.parent_id))?;
            self.output(OutputDiff {
                direction: DiffDirection::Revert,
                id: input.parent_id,
                output,
            })?;
        }
        for (index, output) in tx.outputs.iter().enumerate() {
            let id = tx.output_id(index);
            self.created_outputs.insert(id);
            self.output(OutputDiff {
                direction: DiffDirection::Apply,
                id,
                output: output.clone(),
            })?;
        }
        for (index, contract) in tx.file_contracts.iter().enumerate() {
            let id = tx.contract_id(index);
            self.created_contracts.insert(id);
            self.contract(ContractDiff {
                direction: DiffDirection::Apply,
                id,
                contract: contract.clone(),
            })?;
        }
        for proof in &tx.storage_proofs {
            let contract = self
                .ledger
                .contract(&proof.parent_id)
                .cloned()
                .ok_or(ConsistencyError::ContractMissing(proof.parent_id))?;
            self.resolve_contract(proof.parent_id, contract, true, height, config)?;
        }
        Ok(())
    }

    fn apply_contract_expiries(
        &mut self,
        height: BlockHeight,
        config: &Configuration,
    ) -> Result<(), ConsistencyError> {
        let expiring: Vec<(ContractID, FileContract)> = self
            .ledger
            .contracts()
            .filter(|(_, contract)| contract.window_end == height)
            .map(|(id, contract)| (*id, contract.clone()))
            .collect();
        for (id, contract) in expiring {
            self.resolve_contract(id, contract, false, height, config)?;
        }
        Ok(())
    }

    /// Remove the contract and schedule its valid or missed proof outputs.
    fn resolve_contract(
        &mut self,
        id: ContractID,
        contract: FileContract,
        proof_valid: bool,
        height: BlockHeight,
        config: &Configuration,
    ) -> Result<(), ConsistencyError> {
        let outputs = if proof_valid {
            &contract.valid_proof_outputs
        } else {
            &contract.missed_proof_outputs
        };
        for (index, output) in outputs.iter().enumerate() {
            self.delayed_output(DelayedOutputDiff {
                direction: DiffDirection::Apply,
                maturity_height: height + config.maturity_delay,
                id: storage_proof_output_id(&id, proof_valid, index),
                output: output.clone(),
            })?;
        }
        self.contract(ContractDiff {
            direction: DiffDirection::Revert,
            id,
            contract,
        })
    }

    fn apply_miner_payouts(
        &mut self,
        block: &Block,
        height: BlockHeight,
        config: &Configuration,
    ) -> Result<(), ConsistencyError> {
        for (index, payout) in block.miner_payouts.iter().enumerate() {
            self.delayed_output(DelayedOutputDiff {
                direction: DiffDirection::Apply,
                maturity_height: height + config.maturity_delay,
                id: block.miner_payout_id(index),
                output: payout.clone(),
            })?;
        }
        Ok(())
    }

    fn apply_matured_outputs(&mut self, height: BlockHeight) -> Result<(), ConsistencyError> {
        for (id, output) in self.ledger.delayed_outputs(height) {
            self.delayed_output(DelayedOutputDiff {
                direction: DiffDirection::Revert,
                maturity_height: height,
                id,
                output: output.clone(),
            })?;
            self.output(OutputDiff {
                direction: DiffDirection::Apply,
                id,
                output,
            })?;
        }
        Ok(())
    }
}

/// Why the diffs of a block could not be generated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GenerationError {
    /// The block contains an invalid transaction. The ledger is unchanged.
    Invalid(BlockError),
    /// The ledger or the current path is inconsistent.
    Consistency(ConsistencyError),
}

impl From<ConsistencyError> for GenerationError {
    fn from(error: ConsistencyError) -> Self {
        GenerationError::Consistency(error)
    }
}

impl Display for GenerationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            GenerationError::Invalid(error) => write!(f, "invalid block: {}", error),
            GenerationError::Consistency(error) => write!(f, "inconsistent state: {}", error),
        }
    }
}

impl std::error::Error for GenerationError {}
