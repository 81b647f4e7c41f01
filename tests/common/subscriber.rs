/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

use std::sync::{
    mpsc::{self, Receiver, RecvTimeoutError, Sender},
    Arc,
};
use std::time::Duration;

use consensus_set::{
    diff_engine::generate_genesis_diffs,
    ledger::Ledger,
    types::{
        consensus_change::{ConsensusChange, ConsensusChangeID},
        diffs::{DiffDirection, DiffSet},
    },
    Configuration, Subscriber,
};
use parking_lot::Mutex;

pub(crate) const DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Forwards every change it receives into a channel.
pub(crate) struct ChannelSubscriber {
    sender: Sender<ConsensusChange>,
}

impl Subscriber for ChannelSubscriber {
    fn process_consensus_change(&mut self, change: &ConsensusChange) {
        let _ = self.sender.send(change.clone());
    }
}

pub(crate) fn channel_subscriber() -> (ChannelSubscriber, Receiver<ConsensusChange>) {
    let (sender, receiver) = mpsc::channel();
    (ChannelSubscriber { sender }, receiver)
}

/// Wait for exactly `count` changes.
pub(crate) fn receive(receiver: &Receiver<ConsensusChange>, count: usize) -> Vec<ConsensusChange> {
    (0..count)
        .map(|_| receiver.recv_timeout(DELIVERY_TIMEOUT).unwrap())
        .collect()
}

/// Assert that nothing arrives within a short wait.
pub(crate) fn assert_nothing_received(receiver: &Receiver<ConsensusChange>) {
    match receiver.recv_timeout(Duration::from_millis(200)) {
        Err(RecvTimeoutError::Timeout) => {}
        other => panic!("expected no change, got {:?}", other),
    }
}

/// Keeps its own copy of the ledger by committing every diff of every change, and reports the id of
/// each change once it has been committed.
pub(crate) struct LedgerMirror {
    ledger: Arc<Mutex<Ledger>>,
    committed: Sender<ConsensusChangeID>,
}

impl LedgerMirror {
    /// A mirror starting from the genesis ledger of `config`.
    pub(crate) fn new(
        config: &Configuration,
    ) -> (LedgerMirror, Arc<Mutex<Ledger>>, Receiver<ConsensusChangeID>) {
        let mut ledger = Ledger::new();
        generate_genesis_diffs(&config.genesis_block(), &mut ledger).unwrap();
        let ledger = Arc::new(Mutex::new(ledger));
        let (committed, receiver) = mpsc::channel();
        let mirror = LedgerMirror {
            ledger: Arc::clone(&ledger),
            committed,
        };
        (mirror, ledger, receiver)
    }
}

impl Subscriber for LedgerMirror {
    fn process_consensus_change(&mut self, change: &ConsensusChange) {
        let diffs = DiffSet {
            output_diffs: change.output_diffs.clone(),
            contract_diffs: change.contract_diffs.clone(),
            delayed_output_diffs: change.delayed_output_diffs.clone(),
        };
        self.ledger
            .lock()
            .commit_diff_set(&diffs, DiffDirection::Apply)
            .unwrap();
        let _ = self.committed.send(change.id);
    }
}
