/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types shared by every component of the consensus set.
//!
//! Types specific to one component (for example the [block node](crate::block_tree::BlockNode)) are
//! defined in that component's module.

pub mod basic;

pub mod block;

pub mod consensus_change;

pub mod crypto_primitives;

pub mod diffs;

pub mod target;

pub mod transaction;
