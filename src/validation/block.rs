/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Block validity.

use std::fmt::{self, Display, Formatter};
use std::time::SystemTime;

use crate::block_tree::BlockTree;
use crate::config::Configuration;
use crate::ledger::{BlockOverlay, Ledger};
use crate::types::{
    basic::{Asset, BlockID, Currency, Timestamp},
    block::Block,
};

use super::transaction::{valid_transaction, TransactionError};

/// The local clock, in seconds since the Unix Epoch.
pub fn current_timestamp() -> Timestamp {
    let secs = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default();
    Timestamp::new(secs)
}

/// Check every rule of `block` that does not involve its transactions' effect on the ledger: a known
/// and valid parent, the timestamp bounds, the target, the size limit, and the miner payouts.
///
/// `now` is the local clock, used to reject blocks from too far in the future.
pub fn valid_block_header(
    block: &Block,
    tree: &BlockTree,
    config: &Configuration,
    now: Timestamp,
) -> Result<(), BlockError> {
    let parent = tree
        .node(&block.parent_id)
        .ok_or(BlockError::UnknownParent(block.parent_id))?;
    if parent.is_invalid() {
        return Err(BlockError::InvalidAncestor(block.parent_id));
    }

    let earliest = tree
        .earliest_child_timestamp(&block.parent_id, config.median_timestamp_window)
        .ok_or(BlockError::UnknownParent(block.parent_id))?;
    if block.timestamp < earliest {
        return Err(BlockError::EarlyTimestamp {
            timestamp: block.timestamp,
            earliest,
        });
    }
    let latest = now + config.future_threshold;
    if block.timestamp > latest {
        return Err(BlockError::FutureTimestamp {
            timestamp: block.timestamp,
            latest,
        });
    }

    if !parent.child_target().is_met_by(&block.id()) {
        return Err(BlockError::TargetNotMet);
    }

    let size = block.encoded_size();
    if size > config.block_size_limit {
        return Err(BlockError::TooLarge {
            size,
            limit: config.block_size_limit,
        });
    }

    let height = parent.height() + 1;
    if block
        .miner_payouts
        .iter()
        .any(|payout| payout.asset != Asset::Coin)
    {
        return Err(BlockError::IncorrectPayouts);
    }
    let paid = Currency::checked_sum(block.miner_payouts.iter().map(|payout| &payout.value))
        .ok_or(BlockError::IncorrectPayouts)?;
    let owed = block
        .total_miner_fees()
        .and_then(|fees| fees.checked_add(config.block_subsidy(height)))
        .ok_or(BlockError::IncorrectPayouts)?;
    if paid != owed {
        return Err(BlockError::IncorrectPayouts);
    }
    Ok(())
}

/// Check `block` completely: its header, and every transaction against `ledger` plus the effects of the
/// transactions before it in the block. Of two transactions spending the same output, the first one is
/// valid and the second is not.
///
/// `ledger` and the current path of `tree` must be positioned at the block's parent.
pub fn valid_block(
    block: &Block,
    tree: &BlockTree,
    ledger: &Ledger,
    config: &Configuration,
    now: Timestamp,
) -> Result<(), BlockError> {
    valid_block_header(block, tree, config, now)?;
    let height = tree.height() + 1;
    let mut overlay = BlockOverlay::new(ledger);
    for (index, tx) in block.transactions.iter().enumerate() {
        valid_transaction(tx, &overlay, tree, height, config)
            .map_err(|error| BlockError::Transaction { index, error })?;
        overlay.push_transaction(tx);
    }
    Ok(())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlockError {
    UnknownParent(BlockID),
    KnownInvalid(BlockID),
    InvalidAncestor(BlockID),
    EarlyTimestamp {
        timestamp: Timestamp,
        earliest: Timestamp,
    },
    FutureTimestamp {
        timestamp: Timestamp,
        latest: Timestamp,
    },
    TargetNotMet,
    TooLarge {
        size: usize,
        limit: usize,
    },
    IncorrectPayouts,
    Transaction {
        index: usize,
        error: TransactionError,
    },
}

impl Display for BlockError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            BlockError::UnknownParent(id) => write!(f, "parent block {} is unknown", id),
            BlockError::KnownInvalid(id) => write!(f, "block {} was already found invalid", id),
            BlockError::InvalidAncestor(id) => write!(f, "ancestor block {} is invalid", id),
            BlockError::EarlyTimestamp {
                timestamp,
                earliest,
            } => write!(
                f,
                "timestamp {} is earlier than the median of its ancestors ({})",
                timestamp, earliest
            ),
            BlockError::FutureTimestamp { timestamp, latest } => write!(
                f,
                "timestamp {} is too far in the future (latest {})",
                timestamp, latest
            ),
            BlockError::TargetNotMet => write!(f, "block id does not meet its target"),
            BlockError::TooLarge { size, limit } => {
                write!(f, "block is too large: {} bytes, limit {}", size, limit)
            }
            BlockError::IncorrectPayouts => {
                write!(f, "miner payouts do not equal the subsidy plus fees")
            }
            BlockError::Transaction { index, error } => {
                write!(f, "transaction {} is invalid: {}", index, error)
            }
        }
    }
}

impl std::error::Error for BlockError {}
