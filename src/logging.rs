/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions that log out events.
//!
//! The logs defined in this module are printed if the user enabled them via the consensus set's
//! [configuration](crate::config::Configuration::log_events).
//!
//! The consensus set logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages
//! printed onto a terminal or to a file, set up a
//! [logging implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
//!
//! ## Log message format
//!
//! Log messages are CSVs (Comma Separated Values) with at least two values. The first two values are
//! always:
//! 1. The name of the [event](crate::events) in PascalCase (defined in this module as constants).
//! 2. The time the event was emitted (as number of seconds since the Unix Epoch).
//!
//! The rest of the values differ depending on the kind of event. For example, the following snippet
//! is how an [ApplyBlock](crate::events::ApplyBlockEvent) is printed:
//!
//! ```text
//! ApplyBlock, 1701329264, fNGCJyk, 12
//! ```
//!
//! In the snippet, the third value is the first seven characters of the Base64 encoding of the id of
//! the applied block, and the fourth value is its height.
//!
//! Fatal consistency errors are always logged at the `error` level, whether or not events are enabled.

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use std::time::SystemTime;

use crate::events::*;

// Names of each event in PascalCase for printing:
pub const INSERT_BLOCK: &str = "InsertBlock";
pub const REJECT_BLOCK: &str = "RejectBlock";
pub const APPLY_BLOCK: &str = "ApplyBlock";
pub const REVERT_BLOCK: &str = "RevertBlock";
pub const CONSENSUS_CHANGE: &str = "ConsensusChange";
pub const SUBSCRIBE: &str = "Subscribe";
pub const UNSUBSCRIBE: &str = "Unsubscribe";

/// Implemented by event types. Prints the event as a CSV line at the `info` level.
pub(crate) trait Logger {
    fn log(&self);
}

impl Logger for InsertBlockEvent {
    fn log(&self) {
        log::info!(
            "{}, {}, {}, {}",
            INSERT_BLOCK,
            secs_since_unix_epoch(self.timestamp),
            first_seven_base64_chars(&self.block.bytes()),
            self.height
        )
    }
}

impl Logger for RejectBlockEvent {
    fn log(&self) {
        log::info!(
            "{}, {}, {}, {}",
            REJECT_BLOCK,
            secs_since_unix_epoch(self.timestamp),
            first_seven_base64_chars(&self.block.bytes()),
            self.reason
        )
    }
}

impl Logger for ApplyBlockEvent {
    fn log(&self) {
        log::info!(
            "{}, {}, {}, {}",
            APPLY_BLOCK,
            secs_since_unix_epoch(self.timestamp),
            first_seven_base64_chars(&self.block.bytes()),
            self.height
        )
    }
}

impl Logger for RevertBlockEvent {
    fn log(&self) {
        log::info!(
            "{}, {}, {}, {}",
            REVERT_BLOCK,
            secs_since_unix_epoch(self.timestamp),
            first_seven_base64_chars(&self.block.bytes()),
            self.height
        )
    }
}

impl Logger for ConsensusChangeEvent {
    fn log(&self) {
        log::info!(
            "{}, {}, {}, {}, {}",
            CONSENSUS_CHANGE,
            secs_since_unix_epoch(self.timestamp),
            first_seven_base64_chars(&self.change.bytes()),
            self.reverted,
            self.applied
        )
    }
}

impl Logger for SubscribeEvent {
    fn log(&self) {
        log::info!(
            "{}, {}, {}, {}",
            SUBSCRIBE,
            secs_since_unix_epoch(self.timestamp),
            self.subscriber,
            self.replayed
        )
    }
}

impl Logger for UnsubscribeEvent {
    fn log(&self) {
        log::info!(
            "{}, {}, {}",
            UNSUBSCRIBE,
            secs_since_unix_epoch(self.timestamp),
            self.subscriber
        )
    }
}

// Get a more readable representation of a bytesequence by base64-encoding it and taking the first 7 characters.
pub(crate) fn first_seven_base64_chars(bytes: &[u8]) -> String {
    let encoded = STANDARD_NO_PAD.encode(bytes);
    if encoded.len() > 7 {
        encoded[0..7].to_string()
    } else {
        encoded
    }
}

fn secs_since_unix_epoch(timestamp: SystemTime) -> u64 {
    timestamp
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}
