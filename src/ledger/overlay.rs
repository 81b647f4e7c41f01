/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

use std::collections::{HashMap, HashSet};

use super::{Ledger, LedgerReader};
use crate::types::{
    basic::{ContractID, OutputID},
    transaction::{FileContract, Output, Transaction},
};

/// A view of a [`Ledger`] plus the effects of the transactions already checked earlier in the same
/// block.
///
/// Outputs created by an earlier transaction are visible, and outputs spent by an earlier transaction
/// are not. This makes in-block chaining work, and makes the second of two spends of the same output
/// fail. Every id created in the block stays [contained](LedgerReader::contains_output) even after it
/// is spent, so no two transactions in one block can create the same output or contract.
pub struct BlockOverlay<'a> {
    ledger: &'a Ledger,
    created_outputs: HashMap<OutputID, Output>,
    spent_outputs: HashSet<OutputID>,
    created_contracts: HashMap<ContractID, FileContract>,
    resolved_contracts: HashSet<ContractID>,
    created_output_ids: HashSet<OutputID>,
    created_contract_ids: HashSet<ContractID>,
}

impl<'a> BlockOverlay<'a> {
    pub fn new(ledger: &'a Ledger) -> BlockOverlay<'a> {
        BlockOverlay {
            ledger,
            created_outputs: HashMap::new(),
            spent_outputs: HashSet::new(),
            created_contracts: HashMap::new(),
            resolved_contracts: HashSet::new(),
            created_output_ids: HashSet::new(),
            created_contract_ids: HashSet::new(),
        }
    }

    /// Record the effects of `tx`, which must already have been validated against this overlay.
    ///
    /// Storage proof payouts are delayed outputs and so are not visible to later transactions.
    pub fn push_transaction(&mut self, tx: &Transaction) {
        for input in &tx.inputs {
            if self.created_outputs.remove(&input.parent_id).is_none() {
                self.spent_outputs.insert(input.parent_id);
            }
        }
        for (index, output) in tx.outputs.iter().enumerate() {
            let id = tx.output_id(index);
            self.created_output_ids.insert(id);
            self.created_outputs.insert(id, output.clone());
        }
        for (index, contract) in tx.file_contracts.iter().enumerate() {
            let id = tx.contract_id(index);
            self.created_contract_ids.insert(id);
            self.created_contracts.insert(id, contract.clone());
        }
        for proof in &tx.storage_proofs {
            if self.created_contracts.remove(&proof.parent_id).is_none() {
                self.resolved_contracts.insert(proof.parent_id);
            }
        }
    }
}

impl LedgerReader for BlockOverlay<'_> {
    fn output(&self, id: &OutputID) -> Option<&Output> {
        if let Some(output) = self.created_outputs.get(id) {
            return Some(output);
        }
        if self.spent_outputs.contains(id) {
            return None;
        }
        self.ledger.output(id)
    }

    fn contract(&self, id: &ContractID) -> Option<&FileContract> {
        if let Some(contract) = self.created_contracts.get(id) {
            return Some(contract);
        }
        if self.resolved_contracts.contains(id) {
            return None;
        }
        self.ledger.contract(id)
    }

    fn contains_output(&self, id: &OutputID) -> bool {
        self.created_output_ids.contains(id) || self.ledger.contains_output(id)
    }

    fn contains_contract(&self, id: &ContractID) -> bool {
        self.created_contract_ids.contains(id) || self.ledger.contains_contract(id)
    }
}
