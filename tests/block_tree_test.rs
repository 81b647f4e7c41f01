/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Tests for the block tree and fork resolution, driven through the consensus set.

use consensus_set::{
    types::{
        basic::{BlockHeight, BlockID, CryptoHash},
        block::Block,
        target::Target,
    },
    BlockStatus, ConsensusError, ConsensusSet,
};
use log::LevelFilter;

mod common;

use crate::common::{
    chain::{child_block, mine_branch, mine_empty, mine_on, test_config},
    logging::setup_logger,
};

#[test]
fn reorg_to_heavier_branch_test() {
    setup_logger(LevelFilter::Debug);

    // 1. Build chain A: a1..a5 on top of genesis.
    let consensus_set = ConsensusSet::new(test_config()).unwrap();
    let genesis = consensus_set.snapshot().genesis_block_id();
    let a = mine_branch(&consensus_set, genesis, 0, 5);
    assert_eq!(consensus_set.snapshot().current_block_id(), a[4]);
    let ledger_at_a5 = {
        let snapshot = consensus_set.snapshot();
        let mut expected = vec![genesis];
        expected.extend(&a);
        assert_eq!(snapshot.block_tree().current_path(), &expected[..]);
        snapshot.ledger().clone()
    };

    // 2. Build chain B, sharing a1 and a2, with distinct blocks b3..b5. Each is stale: at best it ties
    //    the current head.
    log::debug!("Mining b3..b5, which do not outweigh a5.");
    let mut b = vec![a[0], a[1]];
    for _ in 0..3 {
        let (block, status) = mine_on(&consensus_set, b[b.len() - 1], 1, Vec::new());
        assert_eq!(status, Ok(BlockStatus::Stale));
        b.push(block.id());
    }
    assert_eq!(consensus_set.snapshot().current_block_id(), a[4]);

    // 3. b6 makes chain B the heaviest. The head moves to b6.
    log::debug!("Mining b6, which outweighs a5.");
    let (b6, status) = mine_on(&consensus_set, b[4], 1, Vec::new());
    assert!(matches!(status, Ok(BlockStatus::Accepted { .. })));
    b.push(b6.id());
    let (b7, status) = mine_on(&consensus_set, b[5], 1, Vec::new());
    assert!(matches!(status, Ok(BlockStatus::Accepted { .. })));
    b.push(b7.id());

    // 4. Check the current path, the blocks since a5, and the ledger.
    let snapshot = consensus_set.snapshot();
    assert_eq!(snapshot.current_block_id(), b[6]);
    assert_eq!(snapshot.height(), BlockHeight::new(7));
    for (index, id) in b.iter().enumerate() {
        assert_eq!(
            snapshot.block_at_height(BlockHeight::new(index as u64 + 1)).map(Block::id),
            Some(*id)
        );
    }

    let (reverted, applied) = snapshot.blocks_since(&a[4]).unwrap();
    assert_eq!(reverted, vec![a[4], a[3], a[2]]);
    assert_eq!(applied, b[2..].to_vec());

    // Chain A's blocks are still in the tree, off the current path.
    assert!(snapshot.block_by_id(&a[4]).is_some());
    assert!(!snapshot.block_tree().is_on_current_path(&a[4]));
    assert_eq!(snapshot.height_of_block(&a[4]), Some(BlockHeight::new(5)));

    // The miner payouts of a3..a5 are gone from the delayed outputs. Those of b3..b7 are present.
    assert_ne!(snapshot.ledger(), &ledger_at_a5);
    for id in &a[2..] {
        let block = snapshot.block_by_id(id).unwrap();
        let maturity = snapshot.height_of_block(id).unwrap() + snapshot.config().maturity_delay;
        assert!(snapshot
            .ledger()
            .delayed_output(maturity, &block.miner_payout_id(0))
            .is_none());
    }
    for id in &b[2..] {
        let block = snapshot.block_by_id(id).unwrap();
        let maturity = snapshot.height_of_block(id).unwrap() + snapshot.config().maturity_delay;
        let matured = maturity <= snapshot.height();
        let payout_id = block.miner_payout_id(0);
        assert_eq!(snapshot.output(&payout_id).is_some(), matured);
        assert_eq!(
            snapshot.ledger().delayed_output(maturity, &payout_id).is_some(),
            !matured
        );
    }
    snapshot.check_consistency().unwrap();

    // 5. A fresh consensus set fed only the winning chain ends up with the same ledger.
    let winning: Vec<Block> = b
        .iter()
        .map(|id| snapshot.block_by_id(id).unwrap().clone())
        .collect();
    let fresh = ConsensusSet::new(test_config()).unwrap();
    for block in winning {
        assert!(matches!(
            fresh.accept_block(block),
            Ok(BlockStatus::Accepted { .. })
        ));
    }
    assert_eq!(fresh.snapshot().ledger(), snapshot.ledger());
}

#[test]
fn reorg_back_to_original_branch_test() {
    setup_logger(LevelFilter::Debug);

    // Chain A of 2 blocks, then chain B of 3 blocks from genesis, then chain A again up to 4 blocks.
    let consensus_set = ConsensusSet::new(test_config()).unwrap();
    let genesis = consensus_set.snapshot().genesis_block_id();
    let a = mine_branch(&consensus_set, genesis, 0, 2);
    let ledger_at_a2 = consensus_set.snapshot().ledger().clone();
    let b = mine_branch(&consensus_set, genesis, 1, 3);
    assert_eq!(consensus_set.snapshot().current_block_id(), b[2]);

    let a_rest = mine_branch(&consensus_set, a[1], 0, 2);
    let snapshot = consensus_set.snapshot();
    assert_eq!(snapshot.current_block_id(), a_rest[1]);
    let (reverted, applied) = snapshot.blocks_since(&b[2]).unwrap();
    assert_eq!(reverted, vec![b[2], b[1], b[0]]);
    assert_eq!(applied, vec![a[0], a[1], a_rest[0], a_rest[1]]);
    assert_ne!(snapshot.ledger(), &ledger_at_a2);
    snapshot.check_consistency().unwrap();
}

#[test]
fn current_path_consistency_test() {
    setup_logger(LevelFilter::Debug);

    let consensus_set = ConsensusSet::new(test_config()).unwrap();
    let blocks = mine_empty(&consensus_set, 6);

    let snapshot = consensus_set.snapshot();
    let tree = snapshot.block_tree();
    assert_eq!(tree.height(), BlockHeight::new(6));
    assert_eq!(tree.current_path().len(), 7);
    assert_eq!(tree.current_path()[0], snapshot.genesis_block_id());
    for (height, id) in tree.current_path().iter().enumerate() {
        let node = tree.node(id).unwrap();
        assert_eq!(node.height(), BlockHeight::new(height as u64));
        assert!(node.diffs_generated());
        if height > 0 {
            assert_eq!(node.parent(), Some(tree.current_path()[height - 1]));
            assert!(tree
                .node(&tree.current_path()[height - 1])
                .unwrap()
                .children()
                .contains(id));
        }
    }

    let range = snapshot
        .block_range(BlockHeight::new(2), BlockHeight::new(4))
        .unwrap();
    let range_ids: Vec<BlockID> = range.into_iter().map(Block::id).collect();
    assert_eq!(range_ids, blocks[1..4].iter().map(Block::id).collect::<Vec<_>>());
    assert!(matches!(
        snapshot.block_range(BlockHeight::new(4), BlockHeight::new(9)),
        Err(ConsensusError::Tree(_))
    ));
    assert!(snapshot.block_at_height(BlockHeight::new(7)).is_none());

    // Blocks since the head: nothing reverted, nothing applied.
    let (reverted, applied) = snapshot.blocks_since(&blocks[5].id()).unwrap();
    assert!(reverted.is_empty());
    assert!(applied.is_empty());
    // Blocks since an ancestor on the current path: only applied blocks.
    let (reverted, applied) = snapshot.blocks_since(&blocks[3].id()).unwrap();
    assert!(reverted.is_empty());
    assert_eq!(applied, vec![blocks[4].id(), blocks[5].id()]);

    snapshot.check_consistency().unwrap();
}

#[test]
fn weight_monotonicity_test() {
    setup_logger(LevelFilter::Debug);

    let consensus_set = ConsensusSet::new(test_config()).unwrap();
    let genesis = consensus_set.snapshot().genesis_block_id();
    mine_empty(&consensus_set, 4);
    let side = mine_branch(&consensus_set, genesis, 7, 2);

    let snapshot = consensus_set.snapshot();
    let tree = snapshot.block_tree();
    let mut ids: Vec<BlockID> = tree.current_path().to_vec();
    ids.extend(&side);
    for id in ids.iter().filter(|id| **id != genesis) {
        let node = tree.node(id).unwrap();
        let parent = tree.node(&node.parent().unwrap()).unwrap();
        assert!(node.weight() > parent.weight());
        // With targets capped at the maximum, every block adds the same weight.
        assert_eq!(node.target(), Target::MAX);
        assert_eq!(
            node.weight().ratio() - parent.weight().ratio(),
            Target::MAX.inverse().ratio().clone()
        );
    }
    assert_eq!(snapshot.current_weight(), tree.head().weight().clone());
    assert_eq!(snapshot.current_target(), Target::MAX);
}

#[test]
fn known_and_orphan_blocks_test() {
    setup_logger(LevelFilter::Debug);

    let consensus_set = ConsensusSet::new(test_config()).unwrap();
    let block = mine_empty(&consensus_set, 1).remove(0);

    // 1. Resubmitting an accepted block.
    assert_eq!(
        consensus_set.accept_block(block.clone()),
        Err(ConsensusError::BlockKnown(block.id()))
    );

    // 2. A block whose parent is unknown is rejected, and may be retried.
    let orphan_parent = BlockID::new(CryptoHash::new([9; 32]));
    let orphan = child_block(&test_config(), orphan_parent, 2, 0, Vec::new());
    let error = consensus_set.accept_block(orphan).unwrap_err();
    assert_eq!(error, ConsensusError::UnknownParent(orphan_parent));
    assert!(error.is_retryable());

    let snapshot = consensus_set.snapshot();
    assert_eq!(snapshot.block_tree().num_nodes(), 2);
    assert_eq!(snapshot.current_block_id(), block.id());
    assert_eq!(snapshot.num_changes(), 1);
}

#[test]
fn target_adjustment_test() {
    // Blocks mined twice as fast as intended lower the target of their children, down to the
    // adjustment limit.
    let consensus_set = ConsensusSet::new(test_config()).unwrap();
    let config = test_config();
    let genesis = consensus_set.snapshot().genesis_block_id();
    let mut fast = child_block(&config, genesis, 1, 0, Vec::new());
    fast.timestamp = config.genesis_timestamp + 300;
    consensus_set.accept_block(fast.clone()).unwrap();

    let snapshot = consensus_set.snapshot();
    let node = snapshot.block_tree().node(&fast.id()).unwrap();
    assert_eq!(node.target(), Target::MAX);
    assert_eq!(
        node.child_target(),
        Target::MAX.mul_ratio(&config.max_adjustment_down)
    );
    assert!(node.child_target() < Target::MAX);
    assert_eq!(snapshot.current_target(), node.child_target());
}
