/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Tests for transaction and block validity.

use consensus_set::{
    ledger::BlockOverlay,
    types::{
        basic::{Asset, BlockHeight, CryptoHash, Currency, OutputID, Timestamp},
        target::Target,
        transaction::{FileContract, Input, Output, Transaction, UnlockConditions},
    },
    validation::{current_timestamp, valid_transaction, BlockError, TransactionError},
    BlockStatus, ConsensusError, ConsensusSet, Configuration,
};
use log::LevelFilter;

mod common;

use crate::common::{
    chain::{
        child_block, genesis_coin_output, genesis_fund_output, keypair, mine, mine_branch,
        mine_empty, mine_on, owner, spend, spend_genesis_coins, test_config, unlock_conditions,
        unlock_hash, GENESIS_COINS, GENESIS_FUNDS,
    },
    logging::setup_logger,
};

#[test]
fn transaction_size_gate_test() {
    setup_logger(LevelFilter::Debug);

    let consensus_set = ConsensusSet::new(test_config()).unwrap();
    let snapshot = consensus_set.snapshot();
    let limit = snapshot.config().transaction_size_limit();

    let oversized = Transaction {
        arbitrary_data: vec![vec![0u8; limit]],
        ..Default::default()
    };
    assert!(matches!(
        snapshot.valid_transaction_components(&oversized),
        Err(TransactionError::TooLarge { limit: l, .. }) if l == limit
    ));
    assert!(matches!(
        snapshot.valid_transaction(&oversized),
        Err(TransactionError::TooLarge { .. })
    ));

    let small = Transaction {
        arbitrary_data: vec![vec![0u8; 100]],
        ..Default::default()
    };
    assert_eq!(snapshot.valid_transaction_components(&small), Ok(()));
    assert_eq!(snapshot.valid_transaction(&small), Ok(()));
}

#[test]
fn block_size_gate_test() {
    setup_logger(LevelFilter::Debug);

    let config = test_config();
    let consensus_set = ConsensusSet::new(config.clone()).unwrap();
    let genesis = consensus_set.snapshot().genesis_block_id();
    let oversized = Transaction {
        arbitrary_data: vec![vec![0u8; config.block_size_limit]],
        ..Default::default()
    };
    let block = child_block(&config, genesis, 1, 0, vec![oversized]);
    assert!(matches!(
        consensus_set.accept_block(block),
        Err(ConsensusError::InvalidBlock(BlockError::TooLarge { .. }))
    ));
    assert_eq!(consensus_set.snapshot().block_tree().num_nodes(), 1);
}

#[test]
fn unknown_input_test() {
    setup_logger(LevelFilter::Debug);

    // A correctly signed spend of an output that does not exist passes every ledger-independent check,
    // but not full validation.
    let consensus_set = ConsensusSet::new(test_config()).unwrap();
    let unknown = OutputID::new(CryptoHash::new([7; 32]));
    let tx = spend(
        unknown,
        &owner(),
        vec![Output::coins(Currency::from_coins(1), unlock_hash(&owner()))],
        Currency::ZERO,
    );

    let snapshot = consensus_set.snapshot();
    assert_eq!(snapshot.valid_transaction_components(&tx), Ok(()));
    assert_eq!(
        snapshot.valid_transaction(&tx),
        Err(TransactionError::MissingOutput(unknown))
    );
}

#[test]
fn in_block_double_spend_test() {
    setup_logger(LevelFilter::Debug);

    let config = test_config();
    let consensus_set = ConsensusSet::new(config.clone()).unwrap();
    let first = spend_genesis_coins(&config, &keypair(10), 0);
    let second = spend_genesis_coins(&config, &keypair(11), 0);

    // 1. Each transaction is valid on its own.
    {
        let snapshot = consensus_set.snapshot();
        assert_eq!(snapshot.valid_transaction(&first), Ok(()));
        assert_eq!(snapshot.valid_transaction(&second), Ok(()));
    }

    // 2. Together in one block, the second is rejected.
    let genesis = consensus_set.snapshot().genesis_block_id();
    let block = child_block(&config, genesis, 1, 0, vec![first.clone(), second]);
    assert_eq!(
        consensus_set.accept_block(block),
        Err(ConsensusError::InvalidBlock(BlockError::Transaction {
            index: 1,
            error: TransactionError::MissingOutput(genesis_coin_output(&config)),
        }))
    );
    assert_eq!(consensus_set.snapshot().height(), BlockHeight::new(0));

    // 3. Spending the same output twice within one transaction fails without the ledger.
    let mut doubled = first.clone();
    doubled.inputs.push(doubled.inputs[0].clone());
    assert_eq!(
        consensus_set.snapshot().valid_transaction_components(&doubled),
        Err(TransactionError::DoubleSpend(genesis_coin_output(&config)))
    );

    // 4. The first transaction alone is accepted.
    mine(&consensus_set, vec![first]);
}

#[test]
fn in_block_chaining_test() {
    setup_logger(LevelFilter::Debug);

    // A transaction may spend an output created by an earlier transaction in the same block.
    let config = test_config();
    let consensus_set = ConsensusSet::new(config.clone()).unwrap();
    let middle = keypair(10);
    let first = spend_genesis_coins(&config, &middle, 1);
    let second = spend(
        first.output_id(0),
        &middle,
        vec![Output::coins(
            Currency::from_coins(GENESIS_COINS - 3),
            unlock_hash(&keypair(11)),
        )],
        Currency::from_coins(2),
    );
    assert!(matches!(
        consensus_set.snapshot().valid_transaction(&second),
        Err(TransactionError::MissingOutput(_))
    ));

    let block = mine(&consensus_set, vec![first.clone(), second.clone()]);
    let snapshot = consensus_set.snapshot();
    assert!(snapshot.output(&first.output_id(0)).is_none());
    assert_eq!(
        snapshot.output(&second.output_id(0)).map(|output| output.value),
        Some(Currency::from_coins(GENESIS_COINS - 3))
    );
    // Fees go to the miner on top of the subsidy.
    assert_eq!(
        block.miner_payouts[0].value,
        config
            .block_subsidy(BlockHeight::new(1))
            .checked_add(Currency::from_coins(3))
            .unwrap()
    );
}

#[test]
fn signature_rules_test() {
    setup_logger(LevelFilter::Debug);

    let config = test_config();
    let consensus_set = ConsensusSet::new(config.clone()).unwrap();
    let snapshot = consensus_set.snapshot();
    let valid = spend_genesis_coins(&config, &keypair(10), 0);

    // Unsigned.
    let mut unsigned = valid.clone();
    unsigned.signatures.clear();
    assert_eq!(
        snapshot.valid_transaction_components(&unsigned),
        Err(TransactionError::MissingSignatures(genesis_coin_output(&config)))
    );

    // Signed by the wrong key.
    let mut forged = unsigned.clone();
    forged.sign_input(genesis_coin_output(&config), 0, &keypair(99));
    assert_eq!(
        snapshot.valid_transaction_components(&forged),
        Err(TransactionError::InvalidSignature { index: 0 })
    );

    // Signed twice with the same key.
    let mut twice = valid.clone();
    twice.signatures.push(twice.signatures[0].clone());
    assert_eq!(
        snapshot.valid_transaction_components(&twice),
        Err(TransactionError::DuplicateSignature { index: 1 })
    );

    // A key index outside the unlock conditions.
    let mut bad_index = unsigned.clone();
    bad_index.sign_input(genesis_coin_output(&config), 1, &owner());
    assert_eq!(
        snapshot.valid_transaction_components(&bad_index),
        Err(TransactionError::SignatureKeyIndex { index: 0 })
    );

    // Unlock conditions that do not hash to the output's unlock hash.
    let imposter = keypair(12);
    let mut wrong_conditions = Transaction {
        inputs: vec![Input {
            parent_id: genesis_coin_output(&config),
            unlock_conditions: unlock_conditions(&imposter),
        }],
        outputs: valid.outputs.clone(),
        ..Default::default()
    };
    wrong_conditions.sign_input(genesis_coin_output(&config), 0, &imposter);
    assert_eq!(snapshot.valid_transaction_components(&wrong_conditions), Ok(()));
    assert_eq!(
        snapshot.valid_transaction(&wrong_conditions),
        Err(TransactionError::UnlockHashMismatch(genesis_coin_output(&config)))
    );

    assert_eq!(snapshot.valid_transaction(&valid), Ok(()));
}

#[test]
fn timelock_test() {
    setup_logger(LevelFilter::Debug);

    let consensus_set = ConsensusSet::new(test_config()).unwrap();
    let conditions = UnlockConditions {
        timelock: BlockHeight::new(3),
        ..unlock_conditions(&owner())
    };
    let unlock_hash = conditions.unlock_hash();

    // The next block is at height 1.
    assert_eq!(
        consensus_set
            .snapshot()
            .valid_unlock_conditions(&conditions, &unlock_hash),
        Err(TransactionError::Timelocked {
            timelock: BlockHeight::new(3)
        })
    );
    assert_eq!(
        consensus_set
            .snapshot()
            .valid_unlock_conditions(&unlock_conditions(&owner()), &unlock_hash),
        Err(TransactionError::UnlockConditionsMismatch(unlock_hash))
    );

    // The next block is at height 3.
    mine_empty(&consensus_set, 2);
    assert_eq!(
        consensus_set
            .snapshot()
            .valid_unlock_conditions(&conditions, &unlock_hash),
        Ok(())
    );
}

#[test]
fn balance_test() {
    setup_logger(LevelFilter::Debug);

    let config = test_config();
    let consensus_set = ConsensusSet::new(config.clone()).unwrap();
    let snapshot = consensus_set.snapshot();
    let recipient = unlock_hash(&keypair(10));

    // Creating coins out of nothing.
    let inflating = spend(
        genesis_coin_output(&config),
        &owner(),
        vec![Output::coins(Currency::from_coins(GENESIS_COINS + 1), recipient)],
        Currency::ZERO,
    );
    assert_eq!(
        snapshot.valid_transaction(&inflating),
        Err(TransactionError::Unbalanced {
            asset: Asset::Coin,
            inputs: Currency::from_coins(GENESIS_COINS),
            outputs: Currency::from_coins(GENESIS_COINS + 1),
        })
    );

    // Turning funds into coins.
    let converting = spend(
        genesis_fund_output(&config),
        &owner(),
        vec![Output::coins(Currency::new(GENESIS_FUNDS), recipient)],
        Currency::ZERO,
    );
    assert!(matches!(
        snapshot.valid_transaction(&converting),
        Err(TransactionError::Unbalanced { .. })
    ));

    // Moving funds.
    let moving = spend(
        genesis_fund_output(&config),
        &owner(),
        vec![
            Output::funds(Currency::new(GENESIS_FUNDS - 1), recipient),
            Output::funds(Currency::new(1), unlock_hash(&owner())),
        ],
        Currency::ZERO,
    );
    assert_eq!(snapshot.valid_transaction(&moving), Ok(()));
}

#[test]
fn block_header_rules_test() {
    setup_logger(LevelFilter::Debug);

    let config = test_config();
    let consensus_set = ConsensusSet::new(config.clone()).unwrap();
    let genesis = consensus_set.snapshot().genesis_block_id();

    // 1. Timestamps before the median of the recent timestamps.
    let mut early = child_block(&config, genesis, 1, 0, Vec::new());
    early.timestamp = Timestamp::new(config.genesis_timestamp.int() - 1);
    assert!(matches!(
        consensus_set.accept_block(early),
        Err(ConsensusError::InvalidBlock(BlockError::EarlyTimestamp { .. }))
    ));

    // 2. Timestamps too far in the future.
    let mut future = child_block(&config, genesis, 1, 0, Vec::new());
    future.timestamp = current_timestamp() + config.future_threshold + 60;
    assert!(matches!(
        consensus_set.accept_block(future),
        Err(ConsensusError::InvalidBlock(BlockError::FutureTimestamp { .. }))
    ));

    // 3. Overpaying the miner.
    let mut greedy = child_block(&config, genesis, 1, 0, Vec::new());
    greedy.miner_payouts.push(Output::coins(
        Currency::from_coins(1),
        unlock_hash(&keypair(10)),
    ));
    assert_eq!(
        consensus_set.accept_block(greedy),
        Err(ConsensusError::InvalidBlock(BlockError::IncorrectPayouts))
    );

    // 4. Paying the miner in funds.
    let mut funds = child_block(&config, genesis, 1, 0, Vec::new());
    funds.miner_payouts[0].asset = Asset::Fund;
    assert_eq!(
        consensus_set.accept_block(funds),
        Err(ConsensusError::InvalidBlock(BlockError::IncorrectPayouts))
    );

    // 5. None of the above entered the tree, and the earliest timestamp is unchanged.
    let snapshot = consensus_set.snapshot();
    assert_eq!(snapshot.block_tree().num_nodes(), 1);
    assert_eq!(snapshot.earliest_timestamp(), config.genesis_timestamp);
    assert_eq!(
        snapshot.valid_block(&child_block(&config, genesis, 1, 0, Vec::new())),
        Ok(())
    );
}

#[test]
fn target_not_met_test() {
    setup_logger(LevelFilter::Debug);

    let config = Configuration {
        root_target: Target::new([0; 32]),
        ..test_config()
    };
    let consensus_set = ConsensusSet::new(config.clone()).unwrap();
    let genesis = consensus_set.snapshot().genesis_block_id();
    let block = child_block(&config, genesis, 1, 0, Vec::new());
    assert_eq!(
        consensus_set.accept_block(block),
        Err(ConsensusError::InvalidBlock(BlockError::TargetNotMet))
    );
}

#[test]
fn invalid_side_chain_test() {
    setup_logger(LevelFilter::Debug);

    let config = test_config();
    let consensus_set = ConsensusSet::new(config.clone()).unwrap();
    let genesis = consensus_set.snapshot().genesis_block_id();

    // 1. Chain A: two blocks, the first spending the genesis coins.
    mine(&consensus_set, vec![spend_genesis_coins(&config, &keypair(10), 0)]);
    mine(&consensus_set, Vec::new());
    let (head, ledger_before) = {
        let snapshot = consensus_set.snapshot();
        (snapshot.current_block_id(), snapshot.ledger().clone())
    };

    // 2. Chain B: b1 is fine, b2 spends an output that does not exist. Neither outweighs chain A, so
    //    only their headers are checked.
    let b1 = mine_branch(&consensus_set, genesis, 1, 1)[0];
    let bogus = spend(
        OutputID::new(CryptoHash::new([7; 32])),
        &owner(),
        vec![Output::coins(Currency::from_coins(1), unlock_hash(&owner()))],
        Currency::ZERO,
    );
    let (b2, status) = mine_on(&consensus_set, b1, 1, vec![bogus]);
    assert_eq!(status, Ok(BlockStatus::Stale));

    // 3. b3 outweighs chain A. Applying b2 fails, and the reorg is undone.
    let (b3, status) = mine_on(&consensus_set, b2.id(), 1, Vec::new());
    assert!(matches!(
        status,
        Err(ConsensusError::InvalidBlock(BlockError::Transaction { index: 0, .. }))
    ));
    {
        let snapshot = consensus_set.snapshot();
        assert_eq!(snapshot.current_block_id(), head);
        assert_eq!(snapshot.ledger(), &ledger_before);
        assert_eq!(snapshot.num_changes(), 2);
        let tree = snapshot.block_tree();
        assert!(!tree.node(&b1).unwrap().is_invalid());
        assert!(tree.node(&b1).unwrap().diffs_generated());
        assert!(tree.node(&b2.id()).unwrap().is_invalid());
        assert!(tree.node(&b3.id()).unwrap().is_invalid());
        snapshot.check_consistency().unwrap();
    }

    // 4. Invalid blocks and their descendants are rejected without further work.
    assert_eq!(
        consensus_set.accept_block(b2.clone()),
        Err(ConsensusError::InvalidBlock(BlockError::KnownInvalid(b2.id())))
    );
    let (_, status) = mine_on(&consensus_set, b3.id(), 1, Vec::new());
    assert_eq!(
        status,
        Err(ConsensusError::InvalidBlock(BlockError::InvalidAncestor(b3.id())))
    );

    // 5. Chain A keeps growing.
    mine(&consensus_set, Vec::new());
}

#[test]
fn recreated_ids_test() {
    setup_logger(LevelFilter::Debug);

    // Output and contract ids derive from the contents of the transaction creating them. A
    // transaction that creates something from nothing could otherwise be included twice.
    let config = test_config();
    let consensus_set = ConsensusSet::new(config.clone()).unwrap();
    let genesis = consensus_set.snapshot().genesis_block_id();

    // 1. A zero-value output with no inputs is rejected on its own, in two separate blocks, and twice
    //    in one block. None of these halts the consensus set.
    let free = Transaction {
        outputs: vec![Output::coins(Currency::ZERO, unlock_hash(&owner()))],
        ..Default::default()
    };
    assert_eq!(
        consensus_set.snapshot().valid_transaction_components(&free),
        Err(TransactionError::ZeroOutput { index: 0 })
    );
    let rejected: Result<BlockStatus, ConsensusError> =
        Err(ConsensusError::InvalidBlock(BlockError::Transaction {
            index: 0,
            error: TransactionError::ZeroOutput { index: 0 },
        }));
    let (_, status) = mine_on(&consensus_set, genesis, 0, vec![free.clone()]);
    assert_eq!(status, rejected);
    let (_, status) = mine_on(&consensus_set, genesis, 1, vec![free.clone()]);
    assert_eq!(status, rejected);
    let (_, status) = mine_on(&consensus_set, genesis, 2, vec![free.clone(), free]);
    assert_eq!(status, rejected);
    assert!(consensus_set.snapshot().halted().is_none());

    // 2. So is a contract with a zero payout.
    let free_contract = Transaction {
        file_contracts: vec![FileContract {
            file_size: 0,
            file_merkle_root: CryptoHash::new([0; 32]),
            window_start: BlockHeight::new(5),
            window_end: BlockHeight::new(10),
            payout: Currency::ZERO,
            valid_proof_outputs: Vec::new(),
            missed_proof_outputs: Vec::new(),
            unlock_hash: unlock_hash(&owner()),
        }],
        ..Default::default()
    };
    assert_eq!(
        consensus_set.snapshot().valid_transaction(&free_contract),
        Err(TransactionError::ZeroPayout { index: 0 })
    );

    // 3. Resubmitting the genesis transaction would recreate the genesis outputs.
    let genesis_tx = config.genesis_block().transactions[0].clone();
    {
        let snapshot = consensus_set.snapshot();
        assert_eq!(snapshot.valid_transaction_components(&genesis_tx), Ok(()));
        assert_eq!(
            snapshot.valid_transaction(&genesis_tx),
            Err(TransactionError::OutputAlreadyExists(genesis_coin_output(&config)))
        );
    }
    let (_, status) = mine_on(&consensus_set, genesis, 0, vec![genesis_tx]);
    assert_eq!(
        status,
        Err(ConsensusError::InvalidBlock(BlockError::Transaction {
            index: 0,
            error: TransactionError::OutputAlreadyExists(genesis_coin_output(&config)),
        }))
    );

    // 4. Within a block, an id stays taken after the output it names is spent.
    let snapshot = consensus_set.snapshot();
    let minted = Transaction {
        outputs: vec![Output::coins(Currency::from_coins(1), unlock_hash(&owner()))],
        ..Default::default()
    };
    let spender = spend(
        minted.output_id(0),
        &owner(),
        vec![Output::coins(Currency::from_coins(1), unlock_hash(&keypair(10)))],
        Currency::ZERO,
    );
    let mut overlay = BlockOverlay::new(snapshot.ledger());
    overlay.push_transaction(&minted);
    overlay.push_transaction(&spender);
    assert_eq!(
        valid_transaction(
            &minted,
            &overlay,
            snapshot.block_tree(),
            snapshot.height() + 1,
            snapshot.config(),
        ),
        Err(TransactionError::OutputAlreadyExists(minted.output_id(0)))
    );
    drop(snapshot);

    // 5. The consensus set is still running and its ledger untouched.
    let block = mine(&consensus_set, Vec::new());
    let snapshot = consensus_set.snapshot();
    assert_eq!(snapshot.current_block(), &block);
    assert_eq!(
        snapshot.sorted_fund_outputs(),
        vec![(
            genesis_fund_output(&config),
            Output::funds(Currency::new(GENESIS_FUNDS), unlock_hash(&owner()))
        )]
    );
    snapshot.check_consistency().unwrap();
}
