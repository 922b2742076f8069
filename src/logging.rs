/*
    Copyright © 2026, The pbft_rs Authors
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions that log out events.
//!
//! The logs defined in this module are printed if the host enabled them when building the
//! replica's [`EventHandlers`](crate::event_bus::EventHandlers).
//!
//! pbft_rs logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages
//! printed onto a terminal or to a file, set up a
//! [logging implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
//!
//! ## Log message format
//!
//! Log messages are CSVs (Comma Separated Values) with at least two values. The first two values
//! are always:
//! 1. The name of the [event](crate::events) in PascalCase (defined in this module as constants).
//! 2. The time the event was emitted (as number of seconds since the Unix Epoch).
//!
//! The rest of the values differ depending on the kind of event. For example, the following
//! snippet is how a [`ReceivePrePrepare`](crate::events::ReceivePrePrepareEvent) is printed:
//!
//! ```text
//! ReceivePrePrepare, 1701329264, 0, 3, 12, 4fe1c2b9
//! ```
//!
//! In the snippet, the third value is the originating node index, the fourth the view, the fifth
//! the sequence number, and the sixth the first eight hex characters of the proposal hash.

use std::time::SystemTime;

use crate::events::*;
use crate::types::data_types::CryptoHash;

// Names of each event in PascalCase for printing:
pub const COMMIT_PROPOSAL: &str = "CommitProposal";
pub const STABLE_CHECKPOINT: &str = "StableCheckpoint";
pub const UPDATE_CONSENSUS_NODE_SET: &str = "UpdateConsensusNodeSet";

pub const PROPOSE: &str = "Propose";
pub const PREPARE: &str = "Prepare";
pub const COMMIT: &str = "Commit";
pub const VIEW_CHANGE: &str = "ViewChange";
pub const NEW_VIEW: &str = "NewView";

pub const RECEIVE_PRE_PREPARE: &str = "ReceivePrePrepare";
pub const RECEIVE_PREPARE: &str = "ReceivePrepare";
pub const RECEIVE_COMMIT: &str = "ReceiveCommit";
pub const RECEIVE_VIEW_CHANGE: &str = "ReceiveViewChange";
pub const RECEIVE_NEW_VIEW: &str = "ReceiveNewView";

pub const PRECOMMIT: &str = "Precommit";
pub const START_VIEW: &str = "StartView";
pub const VIEW_TIMEOUT: &str = "ViewTimeout";

pub const START_SYNC: &str = "StartSync";
pub const END_SYNC: &str = "EndSync";
pub const RECEIVE_SYNC_REQUEST: &str = "ReceiveSyncRequest";
pub const SEND_SYNC_RESPONSE: &str = "SendSyncResponse";

/// Implemented by event types. Used to get a closure that logs the event.
pub(crate) trait Logger {
    /// Returns a pointer to the default logging handler for a given event type.
    fn get_logger() -> Box<dyn Fn(&Self) + Send>;
}

/// The first eight hex characters of `hash`.
fn short_hash(hash: &CryptoHash) -> String {
    let bytes = hash.bytes();
    format!(
        "{:02x}{:02x}{:02x}{:02x}",
        bytes[0], bytes[1], bytes[2], bytes[3]
    )
}

fn secs_since_unix_epoch(timestamp: SystemTime) -> u64 {
    timestamp
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or(0)
}

impl Logger for CommitProposalEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        Box::new(|event: &CommitProposalEvent| {
            log::info!(
                "{}, {}, {}, {}",
                COMMIT_PROPOSAL,
                secs_since_unix_epoch(event.timestamp),
                event.index,
                short_hash(&event.hash)
            )
        })
    }
}

impl Logger for StableCheckpointEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        Box::new(|event: &StableCheckpointEvent| {
            log::info!(
                "{}, {}, {}",
                STABLE_CHECKPOINT,
                secs_since_unix_epoch(event.timestamp),
                event.index
            )
        })
    }
}

impl Logger for UpdateConsensusNodeSetEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        Box::new(|event: &UpdateConsensusNodeSetEvent| {
            log::info!(
                "{}, {}, {}",
                UPDATE_CONSENSUS_NODE_SET,
                secs_since_unix_epoch(event.timestamp),
                event.node_count
            )
        })
    }
}

impl Logger for ProposeEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        Box::new(|event: &ProposeEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                PROPOSE,
                secs_since_unix_epoch(event.timestamp),
                event.pre_prepare.view,
                event.pre_prepare.index,
                short_hash(&event.pre_prepare.proposal.hash)
            )
        })
    }
}

impl Logger for PrepareEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        Box::new(|event: &PrepareEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                PREPARE,
                secs_since_unix_epoch(event.timestamp),
                event.prepare.view,
                event.prepare.index,
                short_hash(&event.prepare.proposal_hash)
            )
        })
    }
}

impl Logger for CommitEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        Box::new(|event: &CommitEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                COMMIT,
                secs_since_unix_epoch(event.timestamp),
                event.commit.view,
                event.commit.index,
                short_hash(&event.commit.proposal_hash)
            )
        })
    }
}

impl Logger for ViewChangeEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        Box::new(|event: &ViewChangeEvent| {
            log::info!(
                "{}, {}, {}, {}",
                VIEW_CHANGE,
                secs_since_unix_epoch(event.timestamp),
                event.view_change.view,
                event.view_change.prepared_proposals.len()
            )
        })
    }
}

impl Logger for NewViewEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        Box::new(|event: &NewViewEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                NEW_VIEW,
                secs_since_unix_epoch(event.timestamp),
                event.new_view.view,
                event.new_view.view_changes.len(),
                event.new_view.pre_prepares.len()
            )
        })
    }
}

impl Logger for ReceivePrePrepareEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        Box::new(|event: &ReceivePrePrepareEvent| {
            log::info!(
                "{}, {}, {}, {}, {}, {}",
                RECEIVE_PRE_PREPARE,
                secs_since_unix_epoch(event.timestamp),
                event.origin,
                event.pre_prepare.view,
                event.pre_prepare.index,
                short_hash(&event.pre_prepare.proposal.hash)
            )
        })
    }
}

impl Logger for ReceivePrepareEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        Box::new(|event: &ReceivePrepareEvent| {
            log::info!(
                "{}, {}, {}, {}, {}, {}",
                RECEIVE_PREPARE,
                secs_since_unix_epoch(event.timestamp),
                event.origin,
                event.prepare.view,
                event.prepare.index,
                short_hash(&event.prepare.proposal_hash)
            )
        })
    }
}

impl Logger for ReceiveCommitEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        Box::new(|event: &ReceiveCommitEvent| {
            log::info!(
                "{}, {}, {}, {}, {}, {}",
                RECEIVE_COMMIT,
                secs_since_unix_epoch(event.timestamp),
                event.origin,
                event.commit.view,
                event.commit.index,
                short_hash(&event.commit.proposal_hash)
            )
        })
    }
}

impl Logger for ReceiveViewChangeEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        Box::new(|event: &ReceiveViewChangeEvent| {
            log::info!(
                "{}, {}, {}, {}",
                RECEIVE_VIEW_CHANGE,
                secs_since_unix_epoch(event.timestamp),
                event.origin,
                event.view_change.view
            )
        })
    }
}

impl Logger for ReceiveNewViewEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        Box::new(|event: &ReceiveNewViewEvent| {
            log::info!(
                "{}, {}, {}, {}",
                RECEIVE_NEW_VIEW,
                secs_since_unix_epoch(event.timestamp),
                event.origin,
                event.new_view.view
            )
        })
    }
}

impl Logger for PrecommitEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        Box::new(|event: &PrecommitEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                PRECOMMIT,
                secs_since_unix_epoch(event.timestamp),
                event.view,
                event.index,
                short_hash(&event.hash)
            )
        })
    }
}

impl Logger for StartViewEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        Box::new(|event: &StartViewEvent| {
            log::info!(
                "{}, {}, {}",
                START_VIEW,
                secs_since_unix_epoch(event.timestamp),
                event.view
            )
        })
    }
}

impl Logger for ViewTimeoutEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        Box::new(|event: &ViewTimeoutEvent| {
            log::warn!(
                "{}, {}, {}, {}",
                VIEW_TIMEOUT,
                secs_since_unix_epoch(event.timestamp),
                event.view,
                event.to_view
            )
        })
    }
}

impl Logger for StartSyncEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        Box::new(|event: &StartSyncEvent| {
            log::info!(
                "{}, {}, {}, {}",
                START_SYNC,
                secs_since_unix_epoch(event.timestamp),
                event.peer,
                event.index
            )
        })
    }
}

impl Logger for EndSyncEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        Box::new(|event: &EndSyncEvent| {
            log::info!(
                "{}, {}, {}",
                END_SYNC,
                secs_since_unix_epoch(event.timestamp),
                event.index
            )
        })
    }
}

impl Logger for ReceiveSyncRequestEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        Box::new(|event: &ReceiveSyncRequestEvent| {
            log::info!(
                "{}, {}, {}, {}",
                RECEIVE_SYNC_REQUEST,
                secs_since_unix_epoch(event.timestamp),
                event.peer,
                event.index
            )
        })
    }
}

impl Logger for SendSyncResponseEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        Box::new(|event: &SendSyncResponseEvent| {
            log::info!(
                "{}, {}, {}, {}",
                SEND_SYNC_RESPONSE,
                secs_since_unix_epoch(event.timestamp),
                event.peer,
                event.proposal_count
            )
        })
    }
}
