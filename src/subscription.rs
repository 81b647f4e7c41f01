/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The change log and delivery of its entries to subscribers.
//!
//! Every change to the current path is appended to an append-only log of [`ConsensusChange`]s, each
//! addressable by its [`ConsensusChangeID`]. A subscriber names the last change it has seen, receives
//! every later change from the log, and then every new change as it is appended.
//!
//! ## Delivery
//!
//! Each subscriber has its own queue and its own worker thread, which drains the queue and calls
//! [`Subscriber::process_consensus_change`]. Appending to the log and enqueueing to every subscriber
//! happen under the consensus set's write lock, so every subscriber sees the same changes in the same
//! order with no gaps, but the callbacks themselves run outside the lock. A callback may therefore
//! query the consensus set, or [unsubscribe](crate::consensus_set::ConsensusSet::unsubscribe), without
//! deadlocking.

use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    mpsc::{self, Sender},
    Arc,
};
use std::thread;

use crate::types::consensus_change::{ConsensusChange, ConsensusChangeID};

/// Implemented by components that track the ledger, for example wallets and transaction pools.
pub trait Subscriber: Send + 'static {
    /// Called on the subscriber's worker thread, once per change, in log order.
    fn process_consensus_change(&mut self, change: &ConsensusChange);
}

/// Handle returned by [`subscribe`](crate::consensus_set::ConsensusSet::subscribe), used to unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriberID(u64);

impl SubscriberID {
    pub const fn int(&self) -> u64 {
        self.0
    }
}

impl Display for SubscriberID {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Append-only list of changes, indexed by id.
#[derive(Default)]
pub(crate) struct ChangeLog {
    changes: Vec<Arc<ConsensusChange>>,
    positions: HashMap<ConsensusChangeID, usize>,
}

impl ChangeLog {
    pub(crate) fn len(&self) -> usize {
        self.changes.len()
    }

    pub(crate) fn latest_id(&self) -> ConsensusChangeID {
        self.changes
            .last()
            .map(|change| change.id)
            .unwrap_or(ConsensusChangeID::BEGINNING)
    }

    fn push(&mut self, change: ConsensusChange) -> Arc<ConsensusChange> {
        let change = Arc::new(change);
        self.positions.insert(change.id, self.changes.len());
        self.changes.push(Arc::clone(&change));
        change
    }

    /// Every change after the one with id `from`, or every change if `from` is
    /// [`BEGINNING`](ConsensusChangeID::BEGINNING).
    pub(crate) fn changes_since(
        &self,
        from: &ConsensusChangeID,
    ) -> Result<&[Arc<ConsensusChange>], SubscriptionError> {
        if from == &ConsensusChangeID::BEGINNING {
            return Ok(&self.changes);
        }
        match self.positions.get(from) {
            Some(position) => Ok(&self.changes[position + 1..]),
            None => Err(SubscriptionError::InvalidConsensusChangeID(*from)),
        }
    }
}

struct SubscriberEntry {
    id: SubscriberID,
    queue: Sender<Arc<ConsensusChange>>,
    active: Arc<AtomicBool>,
}

/// The change log plus the queues of every current subscriber, in subscription order.
#[derive(Default)]
pub(crate) struct SubscriptionManager {
    log: ChangeLog,
    subscribers: Vec<SubscriberEntry>,
    next_id: u64,
}

impl SubscriptionManager {
    pub(crate) fn new() -> SubscriptionManager {
        SubscriptionManager::default()
    }

    pub(crate) fn log(&self) -> &ChangeLog {
        &self.log
    }

    /// Start a worker for `subscriber`, queue every change after `from`, and register the subscriber
    /// for new changes. Returns the id of the subscriber and the number of changes replayed.
    pub(crate) fn subscribe(
        &mut self,
        subscriber: impl Subscriber,
        from: &ConsensusChangeID,
    ) -> Result<(SubscriberID, usize), SubscriptionError> {
        let replay = self.log.changes_since(from)?;

        let (queue, receiver) = mpsc::channel::<Arc<ConsensusChange>>();
        let active = Arc::new(AtomicBool::new(true));
        for change in replay {
            // The receiver is alive until the worker below starts and drains it.
            let _ = queue.send(Arc::clone(change));
        }
        let replayed = replay.len();

        let id = SubscriberID(self.next_id);
        self.next_id += 1;

        let worker_active = Arc::clone(&active);
        let mut subscriber = subscriber;
        thread::Builder::new()
            .name(format!("consensus-subscriber-{}", id))
            .spawn(move || {
                for change in receiver {
                    if !worker_active.load(Ordering::Acquire) {
                        break;
                    }
                    subscriber.process_consensus_change(&change);
                }
            })
            .map_err(|_| SubscriptionError::WorkerSpawnFailed)?;

        self.subscribers.push(SubscriberEntry { id, queue, active });
        Ok((id, replayed))
    }

    /// Stop delivering changes to the subscriber with `id`. Returns whether it was subscribed.
    ///
    /// A change the worker is processing when this is called is allowed to finish; no change is
    /// delivered after that.
    pub(crate) fn unsubscribe(&mut self, id: &SubscriberID) -> bool {
        match self.subscribers.iter().position(|entry| &entry.id == id) {
            Some(position) => {
                let entry = self.subscribers.remove(position);
                entry.active.store(false, Ordering::Release);
                true
            }
            None => false,
        }
    }

    /// Append `change` to the log and queue it for every subscriber. Subscribers whose worker has died
    /// are dropped.
    pub(crate) fn notify(&mut self, change: ConsensusChange) -> ConsensusChangeID {
        let change = self.log.push(change);
        self.subscribers.retain(|entry| {
            let delivered = entry.queue.send(Arc::clone(&change)).is_ok();
            if !delivered {
                log::warn!("dropping subscriber {}: its worker has stopped", entry.id);
            }
            delivered
        });
        change.id
    }

    /// Stop every worker.
    pub(crate) fn halt(&mut self) {
        for entry in self.subscribers.drain(..) {
            entry.active.store(false, Ordering::Release);
        }
    }

    pub(crate) fn num_subscribers(&self) -> usize {
        self.subscribers.len()
    }
}

impl Drop for SubscriptionManager {
    fn drop(&mut self) {
        self.halt()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The change id is not in the log. Subscribers should start over from
    /// [`BEGINNING`](ConsensusChangeID::BEGINNING).
    InvalidConsensusChangeID(ConsensusChangeID),
    WorkerSpawnFailed,
}

impl Display for SubscriptionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionError::InvalidConsensusChangeID(id) => {
                write!(f, "consensus change id {} is not in the change log", id)
            }
            SubscriptionError::WorkerSpawnFailed => {
                write!(f, "failed to spawn a subscriber worker thread")
            }
        }
    }
}

impl std::error::Error for SubscriptionError {}
