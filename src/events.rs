/*
    Copyright © 2026, The pbft_rs Authors
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Notifications that are emitted when significant things happen in the local replica.
//!
//! ## Event enum
//!
//! Significant occurrences in the replica include committing a proposal, entering a new view,
//! broadcasting a pre-prepare, or receiving one. Each corresponds to a variant of the [event
//! enum](Event), and each variant tuple contains an inner struct type summarizing the particular
//! kind of event. The information always includes a timestamp corresponding to the time the event
//! occurred.
//!
//! ## Registering event handlers
//!
//! Hosts can register event handler closures on the
//! [`EventHandlers`](crate::event_bus::EventHandlers) passed at start. Handlers are called by the
//! [event bus](crate::event_bus) thread when the handler's event variant happens. Default
//! handlers that log events through the [`log`] crate are defined in
//! [`logging`](crate::logging).
//!
//! ## Timing
//!
//! Events are emitted **after** the corresponding occurrence is completed. For example, the
//! [commit event](CommitProposalEvent) is emitted only after the proposal has been handed to the
//! ledger store.

use std::sync::mpsc::Sender;
use std::time::SystemTime;

use crate::messages::{Commit, NewView, PrePrepare, Prepare, ViewChange};
use crate::types::data_types::{CryptoHash, NodeIndex, SequenceNumber, ViewNumber};

/// Enumerates all events defined for pbft_rs.
pub enum Event {
    // Events that change durable or configuration state.
    CommitProposal(CommitProposalEvent),
    StableCheckpoint(StableCheckpointEvent),
    UpdateConsensusNodeSet(UpdateConsensusNodeSetEvent),

    // Events that involve broadcasting a protocol message.
    Propose(ProposeEvent),
    Prepare(PrepareEvent),
    Commit(CommitEvent),
    ViewChange(ViewChangeEvent),
    NewView(NewViewEvent),

    // Events that involve receiving a protocol message.
    ReceivePrePrepare(ReceivePrePrepareEvent),
    ReceivePrepare(ReceivePrepareEvent),
    ReceiveCommit(ReceiveCommitEvent),
    ReceiveViewChange(ReceiveViewChangeEvent),
    ReceiveNewView(ReceiveNewViewEvent),

    // Other progress events.
    Precommit(PrecommitEvent),
    StartView(StartViewEvent),
    ViewTimeout(ViewTimeoutEvent),

    // Log-sync events.
    StartSync(StartSyncEvent),
    EndSync(EndSyncEvent),
    ReceiveSyncRequest(ReceiveSyncRequestEvent),
    SendSyncResponse(SendSyncResponseEvent),
}

impl Event {
    /// Publishes a given instance of the [`Event`] enum on the event publisher channel (if the
    /// channel is defined).
    pub(crate) fn publish(self, event_publisher: &Option<Sender<Event>>) {
        if let Some(event_publisher) = event_publisher {
            let _ = event_publisher.send(self);
        }
    }
}

/// A proposal gathered a quorum of commits and was handed to the ledger store.
pub struct CommitProposalEvent {
    pub timestamp: SystemTime,
    pub index: SequenceNumber,
    pub hash: CryptoHash,
}

/// A committed proposal's durability was confirmed and the stable checkpoint advanced past it.
pub struct StableCheckpointEvent {
    pub timestamp: SystemTime,
    pub index: SequenceNumber,
}

/// A ledger configuration was applied, replacing the consensus-node set.
pub struct UpdateConsensusNodeSetEvent {
    pub timestamp: SystemTime,
    pub node_count: usize,
}

/// The local node, as leader, broadcasted a pre-prepare.
pub struct ProposeEvent {
    pub timestamp: SystemTime,
    pub pre_prepare: PrePrepare,
}

/// The local node accepted a pre-prepare and broadcasted a matching prepare.
pub struct PrepareEvent {
    pub timestamp: SystemTime,
    pub prepare: Prepare,
}

/// The local node collected a precommit certificate and broadcasted a commit.
pub struct CommitEvent {
    pub timestamp: SystemTime,
    pub commit: Commit,
}

/// The local node's view timed out and it broadcasted a view change.
pub struct ViewChangeEvent {
    pub timestamp: SystemTime,
    pub view_change: ViewChange,
}

/// The local node, as leader after a view change, broadcasted a new-view message.
pub struct NewViewEvent {
    pub timestamp: SystemTime,
    pub new_view: NewView,
}

/// A pre-prepare passed validation.
pub struct ReceivePrePrepareEvent {
    pub timestamp: SystemTime,
    pub origin: NodeIndex,
    pub pre_prepare: PrePrepare,
}

/// A prepare passed validation.
pub struct ReceivePrepareEvent {
    pub timestamp: SystemTime,
    pub origin: NodeIndex,
    pub prepare: Prepare,
}

/// A commit passed validation.
pub struct ReceiveCommitEvent {
    pub timestamp: SystemTime,
    pub origin: NodeIndex,
    pub commit: Commit,
}

/// A view-change message passed validation.
pub struct ReceiveViewChangeEvent {
    pub timestamp: SystemTime,
    pub origin: NodeIndex,
    pub view_change: ViewChange,
}

/// A new-view message passed validation.
pub struct ReceiveNewViewEvent {
    pub timestamp: SystemTime,
    pub origin: NodeIndex,
    pub new_view: NewView,
}

/// An entry gathered a quorum of matching prepares and became precommitted.
pub struct PrecommitEvent {
    pub timestamp: SystemTime,
    pub view: ViewNumber,
    pub index: SequenceNumber,
    pub hash: CryptoHash,
}

/// The replica entered a new view.
pub struct StartViewEvent {
    pub timestamp: SystemTime,
    pub view: ViewNumber,
}

/// The view-change timer fired.
pub struct ViewTimeoutEvent {
    pub timestamp: SystemTime,
    pub view: ViewNumber,
    pub to_view: ViewNumber,
}

/// A precommit-data fetch was issued to a peer.
pub struct StartSyncEvent {
    pub timestamp: SystemTime,
    pub peer: NodeIndex,
    pub index: SequenceNumber,
}

/// A pending fetch completed and its pre-prepare re-entered the engine.
pub struct EndSyncEvent {
    pub timestamp: SystemTime,
    pub index: SequenceNumber,
}

/// A log-sync request arrived.
pub struct ReceiveSyncRequestEvent {
    pub timestamp: SystemTime,
    pub peer: NodeIndex,
    pub index: SequenceNumber,
}

/// A log-sync response was sent back to a peer.
pub struct SendSyncResponseEvent {
    pub timestamp: SystemTime,
    pub peer: NodeIndex,
    pub proposal_count: usize,
}
