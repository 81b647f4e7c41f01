/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The consensus set of a proof-of-work blockchain with file contracts.
//!
//! The consensus set keeps every block it has ever accepted in a [block tree](block_tree), follows the
//! heaviest valid chain through it, and maintains the [ledger](ledger) of unspent outputs, open file
//! contracts and delayed outputs that the chain produces. Every change to the chain is recorded as a
//! [consensus change](types::consensus_change::ConsensusChange) and delivered, in order, to
//! [subscribers](subscription).
//!
//! The entry point is [`ConsensusSet`].

pub mod block_tree;

pub mod config;

pub mod consensus_set;

pub mod diff_engine;

pub mod events;

pub mod fork_resolution;

pub mod ledger;

pub mod logging;

pub mod subscription;

pub mod types;

pub mod validation;

pub use config::Configuration;
pub use consensus_set::{BlockStatus, ConsensusError, ConsensusSet, ConsensusSnapshot};
pub use subscription::{Subscriber, SubscriberID};
