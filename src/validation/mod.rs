/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Pure predicates deciding whether blocks and transactions may join the chain.
//!
//! Nothing in this module mutates state. Predicates are given the ledger (or a
//! [view](crate::ledger::LedgerReader) of it) and the block tree, and return `Ok(())` or the first rule
//! the candidate breaks.

mod block;
pub use block::{current_timestamp, valid_block, valid_block_header, BlockError};

mod storage_proof;
pub use storage_proof::{
    build_storage_proof, merkle_root, num_segments, segment_index, segments,
    storage_proof_segment, verify_segment, SegmentError, SEGMENT_SIZE,
};

mod transaction;
pub use transaction::{
    valid_transaction, valid_transaction_components, valid_unlock_conditions, TransactionError,
};
