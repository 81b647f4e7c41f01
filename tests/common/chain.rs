/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Deterministic keys, a test network configuration, and helpers that mine blocks onto a
//! [`ConsensusSet`].
//!
//! The test configuration uses [`Target::MAX`] as its root target, so every block id meets every
//! target, and blocks are timestamped exactly [`BLOCK_INTERVAL`] seconds apart, so targets never move
//! and every block adds the same weight.

use consensus_set::{
    types::{
        basic::{BlockHeight, BlockID, Currency, OutputID, Timestamp, UnlockHash},
        block::Block,
        crypto_primitives::{Keypair, SigningKey},
        target::Target,
        transaction::{Input, Output, Transaction, UnlockConditions},
    },
    BlockStatus, ConsensusError, ConsensusSet, Configuration,
};

pub(crate) const BLOCK_INTERVAL: u64 = 600;
pub(crate) const MATURITY_DELAY: u64 = 3;
pub(crate) const GENESIS_COINS: u64 = 1_000;
pub(crate) const GENESIS_FUNDS: u128 = 10_000;

pub(crate) fn keypair(seed: u8) -> Keypair {
    Keypair::new(SigningKey::from_bytes(&[seed; 32]))
}

/// Owns the genesis outputs.
pub(crate) fn owner() -> Keypair {
    keypair(1)
}

/// Receives every miner payout.
pub(crate) fn miner() -> Keypair {
    keypair(2)
}

pub(crate) fn unlock_conditions(keypair: &Keypair) -> UnlockConditions {
    UnlockConditions::single_key(keypair.public())
}

pub(crate) fn unlock_hash(keypair: &Keypair) -> UnlockHash {
    unlock_conditions(keypair).unlock_hash()
}

pub(crate) fn test_config() -> Configuration {
    Configuration::builder()
        .root_target(Target::MAX)
        .maturity_delay(MATURITY_DELAY)
        .genesis_outputs(vec![
            Output::coins(Currency::from_coins(GENESIS_COINS), unlock_hash(&owner())),
            Output::funds(Currency::new(GENESIS_FUNDS), unlock_hash(&owner())),
        ])
        .log_events(true)
        .build()
}

pub(crate) fn genesis_coin_output(config: &Configuration) -> OutputID {
    config.genesis_block().transactions[0].output_id(0)
}

pub(crate) fn genesis_fund_output(config: &Configuration) -> OutputID {
    config.genesis_block().transactions[0].output_id(1)
}

pub(crate) fn timestamp_at(config: &Configuration, height: u64) -> Timestamp {
    config.genesis_timestamp + BLOCK_INTERVAL * height
}

/// A block at `height` on top of `parent` that pays the subsidy plus fees to [`miner`]. Blocks with
/// the same parent are told apart by `nonce`.
pub(crate) fn child_block(
    config: &Configuration,
    parent: BlockID,
    height: u64,
    nonce: u64,
    transactions: Vec<Transaction>,
) -> Block {
    let fees = transactions
        .iter()
        .map(|tx| tx.total_miner_fees().unwrap())
        .fold(Currency::ZERO, |total, fee| total.checked_add(fee).unwrap());
    let payout = config
        .block_subsidy(BlockHeight::new(height))
        .checked_add(fees)
        .unwrap();
    Block::new(
        parent,
        nonce,
        timestamp_at(config, height),
        vec![Output::coins(payout, unlock_hash(&miner()))],
        transactions,
    )
}

/// Build a child of the block with `parent` and submit it.
pub(crate) fn mine_on(
    consensus_set: &ConsensusSet,
    parent: BlockID,
    nonce: u64,
    transactions: Vec<Transaction>,
) -> (Block, Result<BlockStatus, ConsensusError>) {
    let block = {
        let snapshot = consensus_set.snapshot();
        let height = snapshot.height_of_block(&parent).unwrap().int() + 1;
        child_block(snapshot.config(), parent, height, nonce, transactions)
    };
    let status = consensus_set.accept_block(block.clone());
    (block, status)
}

/// Build a child of the current head and submit it, expecting it to become the new head.
pub(crate) fn mine(consensus_set: &ConsensusSet, transactions: Vec<Transaction>) -> Block {
    let head = consensus_set.snapshot().current_block_id();
    let (block, status) = mine_on(consensus_set, head, 0, transactions);
    assert!(
        matches!(status, Ok(BlockStatus::Accepted { .. })),
        "block was not accepted: {:?}",
        status
    );
    block
}

/// Mine `count` empty blocks onto the current head.
pub(crate) fn mine_empty(consensus_set: &ConsensusSet, count: usize) -> Vec<Block> {
    (0..count).map(|_| mine(consensus_set, Vec::new())).collect()
}

/// Mine `count` empty blocks in a chain starting at `parent`, returning their ids. Blocks that do not
/// become the head are accepted as stale.
pub(crate) fn mine_branch(
    consensus_set: &ConsensusSet,
    parent: BlockID,
    nonce: u64,
    count: usize,
) -> Vec<BlockID> {
    let mut parent = parent;
    let mut ids = Vec::with_capacity(count);
    for _ in 0..count {
        let (block, status) = mine_on(consensus_set, parent, nonce, Vec::new());
        assert!(status.is_ok(), "block was rejected: {:?}", status);
        parent = block.id();
        ids.push(parent);
    }
    ids
}

/// A transaction spending the output `parent_id`, owned by `keypair`, into `outputs` plus `fee`.
pub(crate) fn spend(
    parent_id: OutputID,
    keypair: &Keypair,
    outputs: Vec<Output>,
    fee: Currency,
) -> Transaction {
    let mut tx = Transaction {
        inputs: vec![Input {
            parent_id,
            unlock_conditions: unlock_conditions(keypair),
        }],
        outputs,
        miner_fees: if fee == Currency::ZERO { Vec::new() } else { vec![fee] },
        ..Default::default()
    };
    tx.sign_input(parent_id, 0, keypair);
    tx
}

/// A transaction moving all the genesis coins of [`owner`] to `recipient`, less `fee`.
pub(crate) fn spend_genesis_coins(
    config: &Configuration,
    recipient: &Keypair,
    fee: u64,
) -> Transaction {
    spend(
        genesis_coin_output(config),
        &owner(),
        vec![Output::coins(
            Currency::from_coins(GENESIS_COINS - fee),
            unlock_hash(recipient),
        )],
        Currency::from_coins(fee),
    )
}
