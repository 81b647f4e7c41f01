/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions of consensus set events for logging.
//! Note: an event for a given action indicates that the action has been completed.

use std::time::SystemTime;

use crate::logging::Logger;
use crate::subscription::SubscriberID;
use crate::types::{
    basic::{BlockHeight, BlockID},
    consensus_change::ConsensusChangeID,
};

pub enum Event {
    // Events that change the block tree.
    InsertBlock(InsertBlockEvent),
    RejectBlock(RejectBlockEvent),
    // Events that change the current path and the ledger.
    ApplyBlock(ApplyBlockEvent),
    RevertBlock(RevertBlockEvent),
    ConsensusChange(ConsensusChangeEvent),
    // Events that change the set of subscribers.
    Subscribe(SubscribeEvent),
    Unsubscribe(UnsubscribeEvent),
}

impl Event {
    /// Log `event` if `log_events` is set.
    pub(crate) fn publish(log_events: bool, event: Event) {
        if !log_events {
            return;
        }
        match event {
            Event::InsertBlock(event) => event.log(),
            Event::RejectBlock(event) => event.log(),
            Event::ApplyBlock(event) => event.log(),
            Event::RevertBlock(event) => event.log(),
            Event::ConsensusChange(event) => event.log(),
            Event::Subscribe(event) => event.log(),
            Event::Unsubscribe(event) => event.log(),
        }
    }
}

pub struct InsertBlockEvent {
    pub timestamp: SystemTime,
    pub block: BlockID,
    pub height: BlockHeight,
}

pub struct RejectBlockEvent {
    pub timestamp: SystemTime,
    pub block: BlockID,
    pub reason: String,
}

pub struct ApplyBlockEvent {
    pub timestamp: SystemTime,
    pub block: BlockID,
    pub height: BlockHeight,
}

pub struct RevertBlockEvent {
    pub timestamp: SystemTime,
    pub block: BlockID,
    pub height: BlockHeight,
}

pub struct ConsensusChangeEvent {
    pub timestamp: SystemTime,
    pub change: ConsensusChangeID,
    pub reverted: usize,
    pub applied: usize,
}

pub struct SubscribeEvent {
    pub timestamp: SystemTime,
    pub subscriber: SubscriberID,
    pub replayed: usize,
}

pub struct UnsubscribeEvent {
    pub timestamp: SystemTime,
    pub subscriber: SubscriberID,
}
