/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Transactions and the objects they create: outputs, file contracts and storage proofs.

use borsh::{BorshDeserialize, BorshSerialize};

use super::{
    basic::{
        Asset, BlockHeight, ContractID, CryptoHash, Currency, OutputID, SignatureBytes,
        TransactionID, UnlockHash, VerifyingKeyBytes,
    },
    crypto_primitives::{encode, hash_parts, specifiers, CryptoHasher, Digest, Keypair},
};

/// The conditions under which an output can be spent: a height before which it cannot be spent, a set
/// of public keys, and the number of those keys that must sign.
#[derive(Clone, Debug, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct UnlockConditions {
    pub timelock: BlockHeight,
    pub public_keys: Vec<VerifyingKeyBytes>,
    pub signatures_required: u64,
}

impl UnlockConditions {
    /// Conditions satisfied by a single signature from `public_key`, with no timelock.
    pub fn single_key(public_key: VerifyingKeyBytes) -> UnlockConditions {
        UnlockConditions {
            timelock: BlockHeight::new(0),
            public_keys: vec![public_key],
            signatures_required: 1,
        }
    }

    pub fn unlock_hash(&self) -> UnlockHash {
        UnlockHash::new(hash_parts(&[specifiers::UNLOCK, &encode(self)]))
    }
}

/// Spends the output identified by `parent_id`. The asset being spent is the asset of that output.
#[derive(Clone, Debug, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct Input {
    pub parent_id: OutputID,
    pub unlock_conditions: UnlockConditions,
}

/// An amount of one asset, spendable by whoever can satisfy the conditions hashing to `unlock_hash`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct Output {
    pub asset: Asset,
    pub value: Currency,
    pub unlock_hash: UnlockHash,
}

impl Output {
    pub fn coins(value: Currency, unlock_hash: UnlockHash) -> Output {
        Output {
            asset: Asset::Coin,
            value,
            unlock_hash,
        }
    }

    pub fn funds(value: Currency, unlock_hash: UnlockHash) -> Output {
        Output {
            asset: Asset::Fund,
            value,
            unlock_hash,
        }
    }
}

/// An agreement that a host stores a file for the blocks in `[window_start, window_end)`.
///
/// The contract locks `payout` coins. If a valid [storage proof](StorageProof) appears in a block inside
/// the window, `valid_proof_outputs` are paid out; otherwise `missed_proof_outputs` are paid out at
/// `window_end`. Either way the outputs are delayed like any other created-by-consensus output.
#[derive(Clone, Debug, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct FileContract {
    pub file_size: u64,
    pub file_merkle_root: CryptoHash,
    pub window_start: BlockHeight,
    pub window_end: BlockHeight,
    pub payout: Currency,
    pub valid_proof_outputs: Vec<Output>,
    pub missed_proof_outputs: Vec<Output>,
    pub unlock_hash: UnlockHash,
}

/// Proof that the host of the contract identified by `parent_id` still holds one segment of the file.
///
/// `segment` is the segment selected by [storage_proof_segment](crate::validation::storage_proof_segment),
/// zero-padded to [SEGMENT_SIZE](crate::validation::SEGMENT_SIZE), and `hash_set` the Merkle siblings
/// from the leaf up to the root.
#[derive(Clone, Debug, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct StorageProof {
    pub parent_id: ContractID,
    pub segment: Vec<u8>,
    pub hash_set: Vec<CryptoHash>,
}

/// A signature over a transaction on behalf of the input spending `parent_id`, made with the
/// `public_key_index`-th key of that input's unlock conditions.
#[derive(Clone, Debug, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct TransactionSignature {
    pub parent_id: OutputID,
    pub public_key_index: u64,
    pub signature: SignatureBytes,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct Transaction {
    pub inputs: Vec<Input>,
    pub outputs: Vec<Output>,
    pub file_contracts: Vec<FileContract>,
    pub storage_proofs: Vec<StorageProof>,
    pub miner_fees: Vec<Currency>,
    pub arbitrary_data: Vec<Vec<u8>>,
    pub signatures: Vec<TransactionSignature>,
}

impl Transaction {
    /// Hash of every field except `signatures`, so that adding signatures does not change the id.
    pub fn id(&self) -> TransactionID {
        let mut hasher = CryptoHasher::new();
        hasher.update(specifiers::TRANSACTION);
        hasher.update(encode(&self.inputs));
        hasher.update(encode(&self.outputs));
        hasher.update(encode(&self.file_contracts));
        hasher.update(encode(&self.storage_proofs));
        hasher.update(encode(&self.miner_fees));
        hasher.update(encode(&self.arbitrary_data));
        TransactionID::new(CryptoHash::new(hasher.finalize().into()))
    }

    /// Id of the output created by `self.outputs[index]`.
    pub fn output_id(&self, index: usize) -> OutputID {
        OutputID::new(hash_parts(&[
            specifiers::OUTPUT,
            &self.id().bytes(),
            &(index as u64).to_le_bytes(),
        ]))
    }

    /// Id of the contract created by `self.file_contracts[index]`.
    pub fn contract_id(&self, index: usize) -> ContractID {
        ContractID::new(hash_parts(&[
            specifiers::CONTRACT,
            &self.id().bytes(),
            &(index as u64).to_le_bytes(),
        ]))
    }

    /// The message signed by a [`TransactionSignature`] with the given `parent_id` and `public_key_index`.
    pub fn sig_hash(&self, parent_id: &OutputID, public_key_index: u64) -> CryptoHash {
        hash_parts(&[
            specifiers::SIGNATURE,
            &self.id().bytes(),
            &parent_id.bytes(),
            &public_key_index.to_le_bytes(),
        ])
    }

    /// Append a signature by `keypair` on behalf of the input spending `parent_id`.
    pub fn sign_input(&mut self, parent_id: OutputID, public_key_index: u64, keypair: &Keypair) {
        let message = self.sig_hash(&parent_id, public_key_index);
        self.signatures.push(TransactionSignature {
            parent_id,
            public_key_index,
            signature: keypair.sign(&message.bytes()),
        })
    }

    /// Sum of the miner fees, `None` on overflow.
    pub fn total_miner_fees(&self) -> Option<Currency> {
        Currency::checked_sum(&self.miner_fees)
    }
}

/// Id of the output paid by the `index`-th valid or missed proof output of the contract `contract_id`.
pub fn storage_proof_output_id(
    contract_id: &ContractID,
    proof_valid: bool,
    index: usize,
) -> OutputID {
    let specifier = if proof_valid {
        specifiers::VALID_PROOF
    } else {
        specifiers::MISSED_PROOF
    };
    OutputID::new(hash_parts(&[
        specifier,
        &contract_id.bytes(),
        &(index as u64).to_le_bytes(),
    ]))
}
