/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definition of the `Block` struct and its methods.

use borsh::{BorshDeserialize, BorshSerialize};

use super::{
    basic::{BlockID, Currency, OutputID, Timestamp},
    crypto_primitives::{encode, encoded_size, hash_parts, specifiers, CryptoHasher, Digest},
    transaction::{Output, Transaction},
};

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct Block {
    pub parent_id: BlockID,
    pub nonce: u64,
    pub timestamp: Timestamp,
    pub miner_payouts: Vec<Output>,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn new(
        parent_id: BlockID,
        nonce: u64,
        timestamp: Timestamp,
        miner_payouts: Vec<Output>,
        transactions: Vec<Transaction>,
    ) -> Block {
        Block {
            parent_id,
            nonce,
            timestamp,
            miner_payouts,
            transactions,
        }
    }

    /// Hash over the header: the parent id, nonce, timestamp, and a digest of the payouts and
    /// transactions. Miners search over `nonce` until the id meets the parent's child target.
    pub fn id(&self) -> BlockID {
        let mut body_hasher = CryptoHasher::new();
        body_hasher.update(encode(&self.miner_payouts));
        body_hasher.update(encode(&self.transactions));
        let body: [u8; 32] = body_hasher.finalize().into();

        BlockID::new(hash_parts(&[
            specifiers::BLOCK,
            &self.parent_id.bytes(),
            &self.nonce.to_le_bytes(),
            &self.timestamp.int().to_le_bytes(),
            &body,
        ]))
    }

    /// Id of the output created by `self.miner_payouts[index]`.
    pub fn miner_payout_id(&self, index: usize) -> OutputID {
        OutputID::new(hash_parts(&[
            specifiers::MINER_PAYOUT,
            &self.id().bytes(),
            &(index as u64).to_le_bytes(),
        ]))
    }

    /// Sum of the miner fees of every transaction, `None` on overflow.
    pub fn total_miner_fees(&self) -> Option<Currency> {
        self.transactions
            .iter()
            .try_fold(Currency::ZERO, |total, tx| total.checked_add(tx.total_miner_fees()?))
    }

    pub fn encoded_size(&self) -> usize {
        encoded_size(self)
    }
}
