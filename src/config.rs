/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Consensus parameters.
//!
//! Every node on a network must use the same [`Configuration`]: two nodes with different parameters
//! disagree on which blocks are valid. The defaults are the parameters of the production network; tests
//! usually override the genesis fields and the root target.

use num_bigint::BigInt;
use num_rational::BigRational;
use typed_builder::TypedBuilder;

use crate::types::{
    basic::{BlockHeight, Currency, Timestamp},
    block::Block,
    target::Target,
    transaction::{Output, Transaction},
};

/// Bytes of headroom between the largest transaction and the block size limit, so that a block holding
/// a maximum-size transaction still has room for its header and payouts.
pub const TRANSACTION_SIZE_HEADROOM: usize = 5_000;

/// Stores every parameter that affects the validity of blocks and transactions.
///
/// ## Log Events
///
/// The consensus set logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages
/// printed onto a terminal or to a file, set up a [logging
/// implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
#[derive(Clone, Debug, TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [Configuration]. Every field has a default, so
    `Configuration::builder().build()` yields the production parameters.

    Commonly set:
    - `.genesis_timestamp(...)`
    - `.genesis_outputs(...)`
    - `.root_target(...)`
    - `.log_events(...)`
"))]
pub struct Configuration {
    #[builder(
        default = 1_000_000,
        setter(doc = "Set the maximum encoded size of a block, in bytes. Defaults to 1 000 000.")
    )]
    pub block_size_limit: usize,
    #[builder(
        default = 50,
        setter(doc = "Set the number of blocks a miner payout or contract payout waits before it can be spent. Must be at least 1. Defaults to 50.")
    )]
    pub maturity_delay: u64,
    #[builder(
        default = 11,
        setter(doc = "Set the number of ancestor timestamps whose median bounds the timestamp of a child block. Defaults to 11.")
    )]
    pub median_timestamp_window: usize,
    #[builder(
        default = 3 * 60 * 60,
        setter(doc = "Set how far ahead of the local clock (in seconds) a block's timestamp may be. Defaults to three hours.")
    )]
    pub future_threshold: u64,
    #[builder(
        default = 600,
        setter(doc = "Set the intended number of seconds between blocks. Defaults to 600.")
    )]
    pub block_frequency: u64,
    #[builder(
        default = 1_000,
        setter(doc = "Set the number of blocks over which the block rate is measured when adjusting targets. Defaults to 1 000.")
    )]
    pub target_window: u64,
    #[builder(
        default = BigRational::new(BigInt::from(1001), BigInt::from(1000)),
        setter(doc = "Set the largest factor by which a child target may exceed its parent's target. Defaults to 1001/1000.")
    )]
    pub max_adjustment_up: BigRational,
    #[builder(
        default = BigRational::new(BigInt::from(999), BigInt::from(1000)),
        setter(doc = "Set the smallest factor by which a child target may fall below its parent's target. Defaults to 999/1000.")
    )]
    pub max_adjustment_down: BigRational,
    #[builder(
        default = default_root_target(),
        setter(doc = "Set the target of the genesis block's children. No target may ever exceed it.")
    )]
    pub root_target: Target,
    #[builder(
        default = Timestamp::new(1_433_600_000),
        setter(doc = "Set the timestamp of the genesis block.")
    )]
    pub genesis_timestamp: Timestamp,
    #[builder(
        default,
        setter(doc = "Set the outputs created by the genesis block. These are the only source of the secondary asset.")
    )]
    pub genesis_outputs: Vec<Output>,
    #[builder(
        default = 300_000,
        setter(doc = "Set the block subsidy at height 0, in whole coins. Defaults to 300 000.")
    )]
    pub initial_coinbase: u64,
    #[builder(
        default = 30_000,
        setter(doc = "Set the lowest block subsidy, in whole coins. Defaults to 30 000.")
    )]
    pub minimum_coinbase: u64,
    #[builder(
        default = false,
        setter(doc = "Enable logging of consensus events? Defaults to false.")
    )]
    pub log_events: bool,
}

impl Configuration {
    /// The genesis block: no parent, no payouts, and a single transaction creating
    /// [`genesis_outputs`](Self::genesis_outputs).
    pub fn genesis_block(&self) -> Block {
        Block::new(
            Default::default(),
            0,
            self.genesis_timestamp,
            Vec::new(),
            vec![Transaction {
                outputs: self.genesis_outputs.clone(),
                ..Default::default()
            }],
        )
    }

    /// Coins a miner may pay itself for a block at `height`, excluding fees.
    pub fn block_subsidy(&self, height: BlockHeight) -> Currency {
        let coins = self
            .initial_coinbase
            .saturating_sub(height.int())
            .max(self.minimum_coinbase);
        Currency::from_coins(coins)
    }

    /// Largest encoded size of a transaction.
    pub fn transaction_size_limit(&self) -> usize {
        self.block_size_limit.saturating_sub(TRANSACTION_SIZE_HEADROOM)
    }
}

fn default_root_target() -> Target {
    let mut bytes = [0u8; 32];
    bytes[4] = 0x40;
    Target::new(bytes)
}
