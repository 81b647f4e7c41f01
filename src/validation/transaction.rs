/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Transaction validity.
//!
//! Validity is split in two:
//! 1. [`valid_transaction_components`] checks everything that can be checked from the transaction and
//!    a height alone. It does not look at the ledger, so it accepts a transaction spending an output
//!    that does not exist.
//! 2. [`valid_transaction`] additionally checks the transaction against a [ledger](LedgerReader): every
//!    input is unspent and unlockable, every storage proof targets an open contract and proves the
//!    right segment, no output or contract it creates already exists, and value is conserved.
//!
//! `height` is always the height of the block the transaction would be included in.

use std::collections::HashSet;
use std::fmt::{self, Display, Formatter};

use crate::block_tree::BlockTree;
use crate::config::Configuration;
use crate::ledger::LedgerReader;
use crate::types::{
    basic::{Asset, BlockHeight, ContractID, Currency, OutputID, UnlockHash},
    crypto_primitives::{encoded_size, verify_signature},
    transaction::{Transaction, UnlockConditions},
};

use super::storage_proof::{num_segments, segment_index, verify_segment};

/// Check every rule that does not depend on the ledger.
pub fn valid_transaction_components(
    tx: &Transaction,
    height: BlockHeight,
    config: &Configuration,
) -> Result<(), TransactionError> {
    let size = encoded_size(tx);
    let limit = config.transaction_size_limit();
    if size > limit {
        return Err(TransactionError::TooLarge { size, limit });
    }
    follows_storage_proof_rules(tx)?;
    nonzero_values(tx)?;
    valid_file_contracts(tx, height)?;
    valid_signatures(tx, height)
}

/// Check `tx` against `ledger`, including every rule checked by [`valid_transaction_components`].
///
/// `tree` is used to find the block that selects the segment each storage proof must prove. Its
/// current path must end at the parent of the block at `height`.
pub fn valid_transaction(
    tx: &Transaction,
    ledger: &impl LedgerReader,
    tree: &BlockTree,
    height: BlockHeight,
    config: &Configuration,
) -> Result<(), TransactionError> {
    valid_transaction_components(tx, height, config)?;

    let mut coins_in = Currency::ZERO;
    let mut funds_in = Currency::ZERO;
    for input in &tx.inputs {
        let output = ledger
            .output(&input.parent_id)
            .ok_or(TransactionError::MissingOutput(input.parent_id))?;
        if input.unlock_conditions.unlock_hash() != output.unlock_hash {
            return Err(TransactionError::UnlockHashMismatch(input.parent_id));
        }
        let total = match output.asset {
            Asset::Coin => &mut coins_in,
            Asset::Fund => &mut funds_in,
        };
        *total = total
            .checked_add(output.value)
            .ok_or(TransactionError::Overflow)?;
    }

    // Ids derive from the transaction's contents, so a repeated transaction would recreate them.
    for index in 0..tx.outputs.len() {
        let id = tx.output_id(index);
        if ledger.contains_output(&id) {
            return Err(TransactionError::OutputAlreadyExists(id));
        }
    }
    for index in 0..tx.file_contracts.len() {
        let id = tx.contract_id(index);
        if ledger.contains_contract(&id) {
            return Err(TransactionError::ContractAlreadyExists(id));
        }
    }

    valid_storage_proofs(tx, ledger, tree, height)?;

    let mut coins_out = Currency::ZERO;
    let mut funds_out = Currency::ZERO;
    for output in &tx.outputs {
        let total = match output.asset {
            Asset::Coin => &mut coins_out,
            Asset::Fund => &mut funds_out,
        };
        *total = total
            .checked_add(output.value)
            .ok_or(TransactionError::Overflow)?;
    }
    let payouts = Currency::checked_sum(tx.file_contracts.iter().map(|fc| &fc.payout))
        .ok_or(TransactionError::Overflow)?;
    let fees = tx.total_miner_fees().ok_or(TransactionError::Overflow)?;
    let coins_out = coins_out
        .checked_add(payouts)
        .and_then(|total| total.checked_add(fees))
        .ok_or(TransactionError::Overflow)?;

    if coins_in != coins_out {
        return Err(TransactionError::Unbalanced {
            asset: Asset::Coin,
            inputs: coins_in,
            outputs: coins_out,
        });
    }
    if funds_in != funds_out {
        return Err(TransactionError::Unbalanced {
            asset: Asset::Fund,
            inputs: funds_in,
            outputs: funds_out,
        });
    }
    Ok(())
}

/// Whether `unlock_conditions` unlock outputs locked to `unlock_hash` in a block at `height`.
pub fn valid_unlock_conditions(
    unlock_conditions: &UnlockConditions,
    unlock_hash: &UnlockHash,
    height: BlockHeight,
) -> Result<(), TransactionError> {
    if unlock_conditions.timelock > height {
        return Err(TransactionError::Timelocked {
            timelock: unlock_conditions.timelock,
        });
    }
    if &unlock_conditions.unlock_hash() != unlock_hash {
        return Err(TransactionError::UnlockConditionsMismatch(*unlock_hash));
    }
    Ok(())
}

/// A transaction carrying storage proofs may not create outputs or contracts: if the proof were
/// invalidated by a reorg, everything built on those objects would be invalidated too.
fn follows_storage_proof_rules(tx: &Transaction) -> Result<(), TransactionError> {
    if !tx.storage_proofs.is_empty() && (!tx.outputs.is_empty() || !tx.file_contracts.is_empty()) {
        return Err(TransactionError::StorageProofWithOutputs);
    }
    Ok(())
}

fn nonzero_values(tx: &Transaction) -> Result<(), TransactionError> {
    if let Some(index) = tx.outputs.iter().position(|output| output.value == Currency::ZERO) {
        return Err(TransactionError::ZeroOutput { index });
    }
    if let Some(index) = tx
        .file_contracts
        .iter()
        .position(|contract| contract.payout == Currency::ZERO)
    {
        return Err(TransactionError::ZeroPayout { index });
    }
    Ok(())
}

fn valid_file_contracts(tx: &Transaction, height: BlockHeight) -> Result<(), TransactionError> {
    for (index, contract) in tx.file_contracts.iter().enumerate() {
        if contract.window_start <= height {
            return Err(TransactionError::ContractWindowStarted { index });
        }
        if contract.window_end <= contract.window_start {
            return Err(TransactionError::ContractWindowInvalid { index });
        }
        for outputs in [&contract.valid_proof_outputs, &contract.missed_proof_outputs] {
            if outputs.iter().any(|output| output.asset != Asset::Coin) {
                return Err(TransactionError::ContractPayoutMismatch { index });
            }
            let total = Currency::checked_sum(outputs.iter().map(|output| &output.value))
                .ok_or(TransactionError::Overflow)?;
            if total != contract.payout {
                return Err(TransactionError::ContractPayoutMismatch { index });
            }
        }
    }
    Ok(())
}

fn valid_signatures(tx: &Transaction, height: BlockHeight) -> Result<(), TransactionError> {
    // Signatures still required, per input.
    let mut required: Vec<(OutputID, &UnlockConditions, u64)> = Vec::with_capacity(tx.inputs.len());
    let mut parents = HashSet::new();
    for input in &tx.inputs {
        if !parents.insert(input.parent_id) {
            return Err(TransactionError::DoubleSpend(input.parent_id));
        }
        if input.unlock_conditions.timelock > height {
            return Err(TransactionError::Timelocked {
                timelock: input.unlock_conditions.timelock,
            });
        }
        required.push((
            input.parent_id,
            &input.unlock_conditions,
            input.unlock_conditions.signatures_required,
        ));
    }

    let mut used_keys = HashSet::new();
    for (index, sig) in tx.signatures.iter().enumerate() {
        let entry = required
            .iter_mut()
            .find(|(parent_id, _, _)| parent_id == &sig.parent_id)
            .ok_or(TransactionError::SignatureUnknownParent { index })?;
        let conditions: &UnlockConditions = entry.1;
        let public_key = usize::try_from(sig.public_key_index)
            .ok()
            .and_then(|key_index| conditions.public_keys.get(key_index))
            .ok_or(TransactionError::SignatureKeyIndex { index })?;
        if !used_keys.insert((sig.parent_id, sig.public_key_index)) {
            return Err(TransactionError::DuplicateSignature { index });
        }
        let message = tx.sig_hash(&sig.parent_id, sig.public_key_index);
        if !verify_signature(public_key, &message.bytes(), &sig.signature) {
            return Err(TransactionError::InvalidSignature { index });
        }
        entry.2 = entry.2.saturating_sub(1);
    }

    match required.iter().find(|(_, _, remaining)| *remaining > 0) {
        Some((parent_id, _, _)) => Err(TransactionError::MissingSignatures(*parent_id)),
        None => Ok(()),
    }
}

fn valid_storage_proofs(
    tx: &Transaction,
    ledger: &impl LedgerReader,
    tree: &BlockTree,
    height: BlockHeight,
) -> Result<(), TransactionError> {
    let mut proven = HashSet::new();
    for proof in &tx.storage_proofs {
        if !proven.insert(proof.parent_id) {
            return Err(TransactionError::DuplicateStorageProof(proof.parent_id));
        }
        let contract = ledger
            .contract(&proof.parent_id)
            .ok_or(TransactionError::MissingContract(proof.parent_id))?;
        if height < contract.window_start || height >= contract.window_end {
            return Err(TransactionError::StorageProofWindowClosed(proof.parent_id));
        }
        let trigger_block = contract
            .window_start
            .checked_sub(1)
            .and_then(|trigger_height| tree.block_id_at_height(trigger_height))
            .ok_or(TransactionError::StorageProofWindowClosed(proof.parent_id))?;
        let index = segment_index(&trigger_block, &proof.parent_id, contract.file_size);
        if !verify_segment(
            &proof.segment,
            &proof.hash_set,
            num_segments(contract.file_size),
            index,
            &contract.file_merkle_root,
        ) {
            return Err(TransactionError::InvalidStorageProof(proof.parent_id));
        }
    }
    Ok(())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransactionError {
    TooLarge { size: usize, limit: usize },
    StorageProofWithOutputs,
    ZeroOutput { index: usize },
    ZeroPayout { index: usize },
    ContractWindowStarted { index: usize },
    ContractWindowInvalid { index: usize },
    ContractPayoutMismatch { index: usize },
    Timelocked { timelock: BlockHeight },
    DoubleSpend(OutputID),
    SignatureUnknownParent { index: usize },
    SignatureKeyIndex { index: usize },
    DuplicateSignature { index: usize },
    InvalidSignature { index: usize },
    MissingSignatures(OutputID),
    MissingOutput(OutputID),
    UnlockHashMismatch(OutputID),
    UnlockConditionsMismatch(UnlockHash),
    OutputAlreadyExists(OutputID),
    ContractAlreadyExists(ContractID),
    MissingContract(ContractID),
    DuplicateStorageProof(ContractID),
    StorageProofWindowClosed(ContractID),
    InvalidStorageProof(ContractID),
    Unbalanced {
        asset: Asset,
        inputs: Currency,
        outputs: Currency,
    },
    Overflow,
}

impl Display for TransactionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            TransactionError::TooLarge { size, limit } => {
                write!(f, "transaction is too large: {} bytes, limit {}", size, limit)
            }
            TransactionError::StorageProofWithOutputs => {
                write!(f, "transaction with storage proofs creates outputs or contracts")
            }
            TransactionError::ZeroOutput { index } => write!(f, "output {} has zero value", index),
            TransactionError::ZeroPayout { index } => {
                write!(f, "file contract {} has a zero payout", index)
            }
            TransactionError::ContractWindowStarted { index } => {
                write!(f, "file contract {} has a window that already started", index)
            }
            TransactionError::ContractWindowInvalid { index } => {
                write!(f, "file contract {} ends before it starts", index)
            }
            TransactionError::ContractPayoutMismatch { index } => {
                write!(f, "outputs of file contract {} do not match its payout", index)
            }
            TransactionError::Timelocked { timelock } => {
                write!(f, "input is timelocked until height {}", timelock)
            }
            TransactionError::DoubleSpend(id) => write!(f, "output {} is spent twice", id),
            TransactionError::SignatureUnknownParent { index } => {
                write!(f, "signature {} does not belong to an input", index)
            }
            TransactionError::SignatureKeyIndex { index } => {
                write!(f, "signature {} refers to a missing public key", index)
            }
            TransactionError::DuplicateSignature { index } => {
                write!(f, "signature {} duplicates an earlier signature", index)
            }
            TransactionError::InvalidSignature { index } => {
                write!(f, "signature {} does not verify", index)
            }
            TransactionError::MissingSignatures(id) => {
                write!(f, "input spending {} is not sufficiently signed", id)
            }
            TransactionError::MissingOutput(id) => {
                write!(f, "output {} does not exist or is already spent", id)
            }
            TransactionError::UnlockHashMismatch(id) => {
                write!(f, "unlock conditions do not match output {}", id)
            }
            TransactionError::UnlockConditionsMismatch(unlock_hash) => {
                write!(f, "unlock conditions do not hash to {}", unlock_hash)
            }
            TransactionError::OutputAlreadyExists(id) => {
                write!(f, "output {} already exists", id)
            }
            TransactionError::ContractAlreadyExists(id) => {
                write!(f, "file contract {} already exists", id)
            }
            TransactionError::MissingContract(id) => {
                write!(f, "file contract {} does not exist", id)
            }
            TransactionError::DuplicateStorageProof(id) => {
                write!(f, "file contract {} is proven twice", id)
            }
            TransactionError::StorageProofWindowClosed(id) => {
                write!(f, "proof window of file contract {} is not open", id)
            }
            TransactionError::InvalidStorageProof(id) => {
                write!(f, "storage proof for file contract {} is invalid", id)
            }
            TransactionError::Unbalanced {
                asset,
                inputs,
                outputs,
            } => write!(
                f,
                "{:?} inputs ({}) do not equal outputs ({})",
                asset, inputs, outputs
            ),
            TransactionError::Overflow => write!(f, "currency overflow"),
        }
    }
}

impl std::error::Error for TransactionError {}
