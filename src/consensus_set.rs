/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The consensus set: the block tree, the ledger and the change log behind a single lock.
//!
//! [`ConsensusSet`] is a cheaply cloneable handle. Writers ([`accept_block`](ConsensusSet::accept_block),
//! [`subscribe`](ConsensusSet::subscribe), [`unsubscribe`](ConsensusSet::unsubscribe)) hold the write
//! lock for their whole duration, so a reorg and the notification of its change are atomic with respect
//! to every reader. Readers take a [`ConsensusSnapshot`], which holds the read lock until dropped and
//! sees a single consistent state through all of its queries.
//!
//! Snapshots should be short-lived: a writer on the same thread that holds a snapshot will deadlock.

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;
use std::time::SystemTime;

use crate::block_tree::{
    invariants::{self, ConsistencyError},
    BlockTree, BlockTreeError, DiffState,
};
use crate::config::Configuration;
use crate::diff_engine::generate_genesis_diffs;
use crate::events::*;
use crate::fork_resolution::{fork_blockchain, Reorg, ReorgError};
use crate::ledger::{Ledger, LedgerReader};
use crate::subscription::{Subscriber, SubscriberID, SubscriptionError, SubscriptionManager};
use crate::types::{
    basic::{Asset, BlockHeight, BlockID, ContractID, OutputID, Timestamp, UnlockHash},
    block::Block,
    consensus_change::{ConsensusChange, ConsensusChangeID},
    diffs::{DiffSet, OutputDiff},
    target::{Target, Weight},
    transaction::{FileContract, Output, Transaction, UnlockConditions},
};
use crate::validation::{
    self, current_timestamp, valid_block, valid_block_header, BlockError, SegmentError,
    TransactionError,
};

/// Outcome of [`accept_block`](ConsensusSet::accept_block) for a block that was not rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockStatus {
    /// The block is the new head. `change` names the entry appended to the change log.
    Accepted { change: ConsensusChangeID },
    /// The block was added to the tree, but its chain is not heavier than the current path.
    Stale,
}

#[derive(Clone)]
pub struct ConsensusSet {
    state: Arc<RwLock<ConsensusState>>,
}

struct ConsensusState {
    config: Configuration,
    tree: BlockTree,
    ledger: Ledger,
    subscriptions: SubscriptionManager,
    halted: Option<ConsistencyError>,
}

impl ConsensusSet {
    /// Create a consensus set whose current path is the genesis block of `config`.
    pub fn new(config: Configuration) -> Result<ConsensusSet, ConsensusError> {
        let genesis = config.genesis_block();
        let mut ledger = Ledger::new();
        let genesis_diffs = generate_genesis_diffs(&genesis, &mut ledger)?;
        let tree = BlockTree::new(genesis, genesis_diffs, &config);

        Event::publish(
            config.log_events,
            Event::ApplyBlock(ApplyBlockEvent {
                timestamp: SystemTime::now(),
                block: tree.genesis_id(),
                height: BlockHeight::new(0),
            }),
        );

        Ok(ConsensusSet {
            state: Arc::new(RwLock::new(ConsensusState {
                config,
                tree,
                ledger,
                subscriptions: SubscriptionManager::new(),
                halted: None,
            })),
        })
    }

    /// Add `block` to the block tree and, if its chain is now the heaviest, make it the head.
    ///
    /// A block extending the current head is fully validated before it is added. A block extending any
    /// other block is only checked against the rules that do not need the ledger; its transactions are
    /// validated when its chain becomes the heaviest, and if one is invalid the block and its
    /// descendants are marked invalid and the current path is left unchanged.
    pub fn accept_block(&self, block: Block) -> Result<BlockStatus, ConsensusError> {
        let mut state = self.write_state("accept_block");
        state.accept_block(block, current_timestamp())
    }

    /// Deliver every change after `from` to `subscriber`, then every new change.
    ///
    /// Pass [`ConsensusChangeID::BEGINNING`] to receive every change since genesis. If `from` is not in
    /// the change log, the error is [`SubscriptionError::InvalidConsensusChangeID`], and the subscriber
    /// should retry from the beginning.
    pub fn subscribe(
        &self,
        subscriber: impl Subscriber,
        from: ConsensusChangeID,
    ) -> Result<SubscriberID, ConsensusError> {
        let mut state = self.write_state("subscribe");
        if let Some(error) = &state.halted {
            return Err(ConsensusError::Fatal(error.clone()));
        }
        let (id, replayed) = state.subscriptions.subscribe(subscriber, &from)?;
        Event::publish(
            state.config.log_events,
            Event::Subscribe(SubscribeEvent {
                timestamp: SystemTime::now(),
                subscriber: id,
                replayed,
            }),
        );
        Ok(id)
    }

    /// Stop delivering changes to the subscriber with `id`. Returns whether it was subscribed.
    ///
    /// May be called from inside [`Subscriber::process_consensus_change`].
    pub fn unsubscribe(&self, id: SubscriberID) -> bool {
        let mut state = self.write_state("unsubscribe");
        let removed = state.subscriptions.unsubscribe(&id);
        if removed {
            Event::publish(
                state.config.log_events,
                Event::Unsubscribe(UnsubscribeEvent {
                    timestamp: SystemTime::now(),
                    subscriber: id,
                }),
            );
        }
        removed
    }

    /// Take the read lock and return a view of the current state.
    pub fn snapshot(&self) -> ConsensusSnapshot<'_> {
        ConsensusSnapshot {
            state: self.read_state("snapshot"),
        }
    }

    fn read_state(&self, caller: &'static str) -> RwLockReadGuard<'_, ConsensusState> {
        log::trace!("{}: acquiring read lock", caller);
        self.state.read()
    }

    fn write_state(&self, caller: &'static str) -> RwLockWriteGuard<'_, ConsensusState> {
        log::trace!("{}: acquiring write lock", caller);
        self.state.write()
    }
}

impl ConsensusState {
    fn accept_block(
        &mut self,
        block: Block,
        now: Timestamp,
    ) -> Result<BlockStatus, ConsensusError> {
        if let Some(error) = &self.halted {
            return Err(ConsensusError::Fatal(error.clone()));
        }

        let id = block.id();
        if let Some(node) = self.tree.node(&id) {
            return if node.is_invalid() {
                Err(ConsensusError::InvalidBlock(BlockError::KnownInvalid(id)))
            } else {
                Err(ConsensusError::BlockKnown(id))
            };
        }

        let extends_head = block.parent_id == self.tree.head_id();
        let validity = if extends_head {
            valid_block(&block, &self.tree, &self.ledger, &self.config, now)
        } else {
            valid_block_header(&block, &self.tree, &self.config, now)
        };
        if let Err(error) = validity {
            self.publish_rejection(id, &error);
            return Err(error.into());
        }

        let id = self.tree.insert(block, &self.config)?;
        let height = match self.tree.node_mut(&id) {
            Some(node) => {
                node.transactions_validated = extends_head;
                node.height()
            }
            None => return Err(self.halt(ConsistencyError::MissingBlock(id))),
        };
        let heavier = match self.tree.node(&id) {
            Some(node) => node.weight() > self.tree.head().weight(),
            None => false,
        };
        Event::publish(
            self.config.log_events,
            Event::InsertBlock(InsertBlockEvent {
                timestamp: SystemTime::now(),
                block: id,
                height,
            }),
        );

        if !heavier {
            return Ok(BlockStatus::Stale);
        }

        match fork_blockchain(&mut self.tree, &mut self.ledger, &id, &self.config) {
            Ok(reorg) => match self.record_change(reorg) {
                Ok(change) => Ok(BlockStatus::Accepted { change }),
                Err(error) => Err(self.halt(error)),
            },
            Err(ReorgError::Invalid { block, error }) => {
                self.publish_rejection(block, &error);
                Err(ConsensusError::InvalidBlock(error))
            }
            Err(ReorgError::Consistency(error)) => Err(self.halt(error)),
        }
    }

    /// Append the change made by `reorg` to the log and queue it for every subscriber.
    fn record_change(&mut self, reorg: Reorg) -> Result<ConsensusChangeID, ConsistencyError> {
        let log_index = self.subscriptions.log().len() as u64;
        let id = ConsensusChangeID::compute(log_index, &reorg.reverted, &reorg.applied);

        let mut diffs = DiffSet::new();
        let mut reverted_blocks = Vec::with_capacity(reorg.reverted.len());
        for block_id in &reorg.reverted {
            let (block, height, block_diffs) = self.generated(block_id)?;
            diffs.extend(block_diffs.inverted());
            reverted_blocks.push(block.clone());
            Event::publish(
                self.config.log_events,
                Event::RevertBlock(RevertBlockEvent {
                    timestamp: SystemTime::now(),
                    block: *block_id,
                    height,
                }),
            );
        }
        let mut applied_blocks = Vec::with_capacity(reorg.applied.len());
        for block_id in &reorg.applied {
            let (block, height, block_diffs) = self.generated(block_id)?;
            diffs.extend(block_diffs.clone());
            applied_blocks.push(block.clone());
            Event::publish(
                self.config.log_events,
                Event::ApplyBlock(ApplyBlockEvent {
                    timestamp: SystemTime::now(),
                    block: *block_id,
                    height,
                }),
            );
        }

        let change = ConsensusChange {
            id,
            reverted_blocks,
            applied_blocks,
            output_diffs: diffs.output_diffs,
            contract_diffs: diffs.contract_diffs,
            delayed_output_diffs: diffs.delayed_output_diffs,
        };
        self.subscriptions.notify(change);
        Event::publish(
            self.config.log_events,
            Event::ConsensusChange(ConsensusChangeEvent {
                timestamp: SystemTime::now(),
                change: id,
                reverted: reorg.reverted.len(),
                applied: reorg.applied.len(),
            }),
        );
        Ok(id)
    }

    /// The block, height and diffs of a block whose diffs have been generated.
    fn generated(&self, id: &BlockID) -> Result<(&Block, BlockHeight, &DiffSet), ConsistencyError> {
        let node = self.tree.node(id).ok_or(ConsistencyError::MissingBlock(*id))?;
        match node.diffs() {
            DiffState::Generated(diffs) => Ok((node.block(), node.height(), diffs)),
            DiffState::Unvisited => Err(ConsistencyError::DiffsNotGenerated(*id)),
        }
    }

    /// Stop accepting blocks and delivering changes.
    fn halt(&mut self, error: ConsistencyError) -> ConsensusError {
        log::error!("consensus set halted: {}", error);
        self.subscriptions.halt();
        self.halted = Some(error.clone());
        ConsensusError::Fatal(error)
    }

    fn publish_rejection(&self, block: BlockID, error: &BlockError) {
        Event::publish(
            self.config.log_events,
            Event::RejectBlock(RejectBlockEvent {
                timestamp: SystemTime::now(),
                block,
                reason: error.to_string(),
            }),
        );
    }

    /// Height of the block the next transaction would be included in.
    fn next_height(&self) -> BlockHeight {
        self.tree.height() + 1
    }
}

/// A read-locked view of the consensus set.
pub struct ConsensusSnapshot<'a> {
    state: RwLockReadGuard<'a, ConsensusState>,
}

impl ConsensusSnapshot<'_> {
    /* ↓↓↓ Current path ↓↓↓ */

    pub fn current_block(&self) -> &Block {
        self.state.tree.head().block()
    }

    pub fn current_block_id(&self) -> BlockID {
        self.state.tree.head_id()
    }

    pub fn genesis_block_id(&self) -> BlockID {
        self.state.tree.genesis_id()
    }

    pub fn height(&self) -> BlockHeight {
        self.state.tree.height()
    }

    /// The target the next block must meet.
    pub fn current_target(&self) -> Target {
        self.state.tree.head().child_target()
    }

    /// The cumulative weight of the current path.
    pub fn current_weight(&self) -> Weight {
        self.state.tree.head().weight().clone()
    }

    /// The earliest timestamp the next block may have.
    pub fn earliest_timestamp(&self) -> Timestamp {
        let head = self.state.tree.head();
        self.state
            .tree
            .earliest_child_timestamp(&head.id(), self.state.config.median_timestamp_window)
            .unwrap_or(head.block().timestamp)
    }

    pub fn block_at_height(&self, height: BlockHeight) -> Option<&Block> {
        self.state.tree.block_at_height(height)
    }

    /// The blocks of the current path with heights in `[start, stop]`.
    pub fn block_range(
        &self,
        start: BlockHeight,
        stop: BlockHeight,
    ) -> Result<Vec<&Block>, ConsensusError> {
        Ok(self.state.tree.block_range(start, stop)?)
    }

    /// The blocks reverted and applied since `id` was the head. See [`BlockTree::blocks_since`].
    pub fn blocks_since(
        &self,
        id: &BlockID,
    ) -> Result<(Vec<BlockID>, Vec<BlockID>), ConsensusError> {
        Ok(self.state.tree.blocks_since(id)?)
    }

    /* ↓↓↓ Any block ↓↓↓ */

    pub fn block_by_id(&self, id: &BlockID) -> Option<&Block> {
        self.state.tree.block_by_id(id)
    }

    pub fn height_of_block(&self, id: &BlockID) -> Option<BlockHeight> {
        self.state.tree.height_of_block(id)
    }

    pub fn block_output_diffs(&self, id: &BlockID) -> Result<&[OutputDiff], ConsensusError> {
        Ok(self.state.tree.block_output_diffs(id)?)
    }

    /* ↓↓↓ Ledger ↓↓↓ */

    pub fn output(&self, id: &OutputID) -> Option<&Output> {
        self.state.ledger.output(id)
    }

    pub fn contract(&self, id: &ContractID) -> Option<&FileContract> {
        self.state.ledger.contract(id)
    }

    /// Outputs that mature when the block at `height` is applied.
    pub fn delayed_outputs(&self, height: BlockHeight) -> Vec<(OutputID, Output)> {
        self.state.ledger.delayed_outputs(height)
    }

    /// Every unspent coin output, sorted by id.
    pub fn sorted_coin_outputs(&self) -> Vec<(OutputID, Output)> {
        self.state.ledger.sorted_outputs(Asset::Coin)
    }

    /// Every unspent fund output, sorted by id.
    pub fn sorted_fund_outputs(&self) -> Vec<(OutputID, Output)> {
        self.state.ledger.sorted_outputs(Asset::Fund)
    }

    pub fn storage_proof_segment(&self, contract_id: &ContractID) -> Result<u64, ConsensusError> {
        Ok(validation::storage_proof_segment(
            &self.state.tree,
            &self.state.ledger,
            contract_id,
        )?)
    }

    /* ↓↓↓ Validation against the next block ↓↓↓ */

    pub fn valid_transaction_components(&self, tx: &Transaction) -> Result<(), TransactionError> {
        validation::valid_transaction_components(tx, self.state.next_height(), &self.state.config)
    }

    pub fn valid_transaction(&self, tx: &Transaction) -> Result<(), TransactionError> {
        validation::valid_transaction(
            tx,
            &self.state.ledger,
            &self.state.tree,
            self.state.next_height(),
            &self.state.config,
        )
    }

    pub fn valid_unlock_conditions(
        &self,
        unlock_conditions: &UnlockConditions,
        unlock_hash: &UnlockHash,
    ) -> Result<(), TransactionError> {
        validation::valid_unlock_conditions(
            unlock_conditions,
            unlock_hash,
            self.state.next_height(),
        )
    }

    /// Check `block` as [`accept_block`](ConsensusSet::accept_block) would before adding it to the tree:
    /// fully if it extends the head, and without its transactions otherwise.
    pub fn valid_block(&self, block: &Block) -> Result<(), BlockError> {
        let state = &self.state;
        if block.parent_id == state.tree.head_id() {
            valid_block(block, &state.tree, &state.ledger, &state.config, current_timestamp())
        } else {
            valid_block_header(block, &state.tree, &state.config, current_timestamp())
        }
    }

    /* ↓↓↓ Change log ↓↓↓ */

    /// Id of the most recent change, [`BEGINNING`](ConsensusChangeID::BEGINNING) if there is none.
    pub fn latest_change_id(&self) -> ConsensusChangeID {
        self.state.subscriptions.log().latest_id()
    }

    pub fn num_changes(&self) -> usize {
        self.state.subscriptions.log().len()
    }

    pub fn num_subscribers(&self) -> usize {
        self.state.subscriptions.num_subscribers()
    }

    /* ↓↓↓ Internals ↓↓↓ */

    pub fn config(&self) -> &Configuration {
        &self.state.config
    }

    pub fn block_tree(&self) -> &BlockTree {
        &self.state.tree
    }

    pub fn ledger(&self) -> &Ledger {
        &self.state.ledger
    }

    /// The fatal error that stopped the consensus set, if any.
    pub fn halted(&self) -> Option<&ConsistencyError> {
        self.state.halted.as_ref()
    }

    /// Check every invariant of the block tree and the ledger. Rebuilds the ledger from scratch.
    pub fn check_consistency(&self) -> Result<(), ConsistencyError> {
        invariants::check_current_path(&self.state.tree)?;
        invariants::check_ledger(&self.state.tree, &self.state.ledger)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConsensusError {
    /// The block is already in the tree.
    BlockKnown(BlockID),
    /// The parent of the block is not in the tree. The block may become acceptable once its parent
    /// has been accepted.
    UnknownParent(BlockID),
    InvalidBlock(BlockError),
    Tree(BlockTreeError),
    Segment(SegmentError),
    Subscription(SubscriptionError),
    /// The consensus set is halted.
    Fatal(ConsistencyError),
}

impl ConsensusError {
    /// Whether the same request could succeed later without changing it.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ConsensusError::UnknownParent(_))
    }
}

impl From<BlockError> for ConsensusError {
    fn from(error: BlockError) -> Self {
        match error {
            BlockError::UnknownParent(id) => ConsensusError::UnknownParent(id),
            error => ConsensusError::InvalidBlock(error),
        }
    }
}

impl From<BlockTreeError> for ConsensusError {
    fn from(error: BlockTreeError) -> Self {
        match error {
            BlockTreeError::UnknownParent(id) => ConsensusError::UnknownParent(id),
            error => ConsensusError::Tree(error),
        }
    }
}

impl From<SegmentError> for ConsensusError {
    fn from(error: SegmentError) -> Self {
        ConsensusError::Segment(error)
    }
}

impl From<SubscriptionError> for ConsensusError {
    fn from(error: SubscriptionError) -> Self {
        ConsensusError::Subscription(error)
    }
}

impl From<ConsistencyError> for ConsensusError {
    fn from(error: ConsistencyError) -> Self {
        ConsensusError::Fatal(error)
    }
}

impl Display for ConsensusError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ConsensusError::BlockKnown(id) => write!(f, "block {} is already known", id),
            ConsensusError::UnknownParent(id) => write!(f, "parent block {} is unknown", id),
            ConsensusError::InvalidBlock(error) => write!(f, "invalid block: {}", error),
            ConsensusError::Tree(error) => Display::fmt(error, f),
            ConsensusError::Segment(error) => Display::fmt(error, f),
            ConsensusError::Subscription(error) => Display::fmt(error, f),
            ConsensusError::Fatal(error) => write!(f, "fatal: {}", error),
        }
    }
}

impl std::error::Error for ConsensusError {}
