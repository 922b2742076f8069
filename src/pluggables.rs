/*
    Copyright © 2026, The pbft_rs Authors
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Traits for the external collaborators of the consensus engine.
//!
//! The engine never talks to a socket, executes a transaction, or touches a disk itself. Hosts
//! plug in:
//! 1. A [`FrontService`]: the wire transport and node-identity directory. Delivers inbound frames
//!    through a registered [dispatcher](MessageDispatcher) and fans outbound frames out to a list
//!    of node identities.
//! 2. A [`ProposalValidator`]: validates the content of proposed payloads asynchronously.
//! 3. A [`LedgerStore`]: durable storage for committed proposals and the source of ledger
//!    configurations.
//!
//! All three are treated as thread-safe collaborators: their methods may be called from the
//! engine's worker thread and from host threads concurrently.

use std::time::Duration;

use crate::types::{
    crypto_primitives::VerifyingKey,
    data_types::SequenceNumber,
    proposal::Proposal,
    validator_set::ConsensusNode,
};

/// Identifies the protocol module a frame belongs to, so one front service can multiplex several
/// protocol engines.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ModuleId(pub u16);

impl ModuleId {
    /// The module id under which this engine registers its dispatcher.
    pub const PBFT: ModuleId = ModuleId(0x1000);
}

/// An error reported by the front service alongside a delivery.
#[derive(Clone, Debug)]
pub struct FrontError {
    pub detail: String,
}

/// One-shot callback for answering a request frame back to its sender.
pub type Responder = Box<dyn FnOnce(Vec<u8>) + Send>;

/// Inbound delivery callback registered with the front service.
///
/// Arguments: the delivery status, the sender's node identity, the frame bytes, and a responder
/// for request frames (absent when the transport cannot route a response).
pub type MessageDispatcher =
    Box<dyn Fn(Result<(), FrontError>, VerifyingKey, Vec<u8>, Option<Responder>) + Send + Sync>;

/// The wire transport and node-identity directory.
pub trait FrontService: Clone + Send + 'static {
    /// Register the inbound delivery callback for `module_id`. Called once at engine start.
    fn register_message_dispatcher(&mut self, module_id: ModuleId, dispatcher: MessageDispatcher);

    /// Send `data` to every node in `node_ids` without blocking. Best-effort: delivery is
    /// unordered and unacknowledged; the protocol's redundancy covers losses.
    fn async_send_message_by_node_ids(
        &self,
        module_id: ModuleId,
        node_ids: &[VerifyingKey],
        data: Vec<u8>,
    );
}

/// An error reported by the proposal validator.
#[derive(Clone, Debug)]
pub struct ValidatorError {
    pub detail: String,
}

/// Completion callback for [`ProposalValidator::verify_proposal`]: `Ok(true)` means the payload
/// is valid, `Ok(false)` that verification completed and rejected it, `Err` that verification
/// itself failed.
pub type VerifyProposalCallback = Box<dyn FnOnce(Result<bool, ValidatorError>) + Send>;

/// Validates the content of proposed payloads. Verification runs asynchronously on the
/// validator's own executor; the result re-enters the engine through its inbound queue.
pub trait ProposalValidator: Send + Sync + 'static {
    fn verify_proposal(
        &self,
        node_id: VerifyingKey,
        proposal: Proposal,
        callback: VerifyProposalCallback,
    );
}

/// The different ways a ledger-store operation can fail.
#[derive(Clone, Debug)]
pub enum StorageError {
    /// A proposal that the store was expected to hold is missing.
    ProposalExpectedButNotFound { index: SequenceNumber },

    /// The backing store failed.
    Backend { detail: String },
}

/// Durable storage for committed proposals and configuration.
///
/// Two logical key spaces exist behind this trait: a single `max_committed_proposal` key tracking
/// the stable checkpoint, and a `pbftCommitDB` keyspace of committed proposals indexed by
/// sequence number.
pub trait LedgerStore: Send + Sync + 'static {
    /// Load the committed-but-not-yet-stable proposals above `stabled_index`. Called once at
    /// engine start to warm the cache after a restart.
    fn load_state(&self, stabled_index: SequenceNumber) -> Result<Vec<Proposal>, StorageError>;

    /// Durably record a committed proposal under its sequence number.
    fn async_commit_proposal(&self, proposal: Proposal) -> Result<(), StorageError>;

    /// Hand a committed proposal over for execution and advance the stable checkpoint. State
    /// below the checkpoint may be garbage-collected.
    fn async_commit_stable_checkpoint(&self, proposal: Proposal) -> Result<(), StorageError>;

    /// Read the committed proposals in `[start, start + offset)`, delivering them (in ascending
    /// sequence-number order) to `on_success`.
    fn async_get_committed_proposals(
        &self,
        start: SequenceNumber,
        offset: u64,
        on_success: Box<dyn FnOnce(Vec<Proposal>) + Send>,
    );

    /// The sequence number of the highest proposal recorded as committed.
    fn max_committed_proposal_index(&self) -> SequenceNumber;
}

/// A ledger configuration, delivered with every new-block notification. Applying it advances the
/// committed proposal and installs the consensus-node set and timeout that the new height
/// prescribes.
#[derive(Clone, Debug)]
pub struct LedgerConfig {
    pub committed_proposal: Proposal,
    pub consensus_nodes: Vec<ConsensusNode>,
    pub consensus_timeout: Duration,
}
