/*
    Copyright © 2026, The pbft_rs Authors
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Structured messages that are sent between replicas as part of the PBFT protocol.
//!
//! ## Messages
//!
//! The protocol involves five progress message types:
//! 1. [`PrePrepare`]: broadcasted by the leader of a given view, who proposes to extend the total
//!    order by the proposal contained in the message.
//! 2. [`Prepare`]: broadcasted by a consensus node that has accepted a pre-prepare, vouching for
//!    the proposal's digest at its (sequence number, view).
//! 3. [`Commit`]: broadcasted by a consensus node that has collected a quorum of matching
//!    prepares, vouching that the proposal is precommitted.
//! 4. [`ViewChange`]: broadcasted on view timeout. Carries the node's committed proposal and a
//!    summary of every precommitted entry it knows of, so prepared evidence survives the change.
//! 5. [`NewView`]: broadcasted by the leader of the pending view once it has collected a quorum
//!    weight of view changes. Closes the view change, carrying the view-change evidence and the
//!    reconstructed pre-prepare list.
//!
//! Two request/response pairs serve [log synchronization](crate::log_sync): committed-proposal
//! fetch and prepared-proposal (precommit data) fetch.
//!
//! ## Signing
//!
//! Every message implements [`SignedMessage`]: the signature covers the borsh serialization of
//! all fields except the signature itself.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::{
    crypto_primitives::{Keypair, Signature, Verifier, VerifyingKey},
    data_types::{CryptoHash, NodeIndex, SequenceNumber, SignatureBytes, Timestamp, ViewNumber},
    proposal::Proposal,
};

/// Numeric tag identifying the shape of a message on the wire.
///
/// These constants are part of the wire format and MUST be stable across a network.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    PrePrepare = 0x10,
    Prepare = 0x11,
    Commit = 0x12,
    ViewChange = 0x20,
    NewView = 0x21,
    CommittedProposalRequest = 0x30,
    PreparedProposalRequest = 0x31,
    CommittedProposalResponse = 0x32,
    PreparedProposalResponse = 0x33,
}

impl TryFrom<u8> for PacketType {
    type Error = u8;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            0x10 => Ok(PacketType::PrePrepare),
            0x11 => Ok(PacketType::Prepare),
            0x12 => Ok(PacketType::Commit),
            0x20 => Ok(PacketType::ViewChange),
            0x21 => Ok(PacketType::NewView),
            0x30 => Ok(PacketType::CommittedProposalRequest),
            0x31 => Ok(PacketType::PreparedProposalRequest),
            0x32 => Ok(PacketType::CommittedProposalResponse),
            0x33 => Ok(PacketType::PreparedProposalResponse),
            other => Err(other),
        }
    }
}

/// Data types that contain: 1. A message, and 2. A digital signature over said message whose
/// correctness can be verified against a `VerifyingKey`.
pub(crate) trait SignedMessage: Clone {
    /// Get the bytes that are passed as input into the signing function to form the signature of
    /// the `SignedMessage`.
    fn message_bytes(&self) -> Vec<u8>;

    /// Get the signature of the `SignedMessage`.
    fn signature_bytes(&self) -> SignatureBytes;

    /// Verify that `signature_bytes` is a signature created by `verifying_key` over
    /// `message_bytes`.
    fn is_correct(&self, verifying_key: &VerifyingKey) -> bool {
        let signature = Signature::from_bytes(&self.signature_bytes().bytes());
        verifying_key
            .verify(&self.message_bytes(), &signature)
            .is_ok()
    }
}

/// The closed set of message shapes handled by the engine's inbound pipeline.
#[derive(Clone, Debug, PartialEq, BorshSerialize, BorshDeserialize)]
pub enum PbftMessage {
    PrePrepare(PrePrepare),
    Prepare(Prepare),
    Commit(Commit),
    ViewChange(ViewChange),
    NewView(NewView),
    CommittedProposalRequest(CommittedProposalRequest),
    PreparedProposalRequest(PreparedProposalRequest),
    CommittedProposalResponse(CommittedProposalResponse),
    PreparedProposalResponse(PreparedProposalResponse),
}

impl PbftMessage {
    /// Returns the packet type associated with a given [`PbftMessage`].
    pub fn packet_type(&self) -> PacketType {
        match self {
            PbftMessage::PrePrepare(_) => PacketType::PrePrepare,
            PbftMessage::Prepare(_) => PacketType::Prepare,
            PbftMessage::Commit(_) => PacketType::Commit,
            PbftMessage::ViewChange(_) => PacketType::ViewChange,
            PbftMessage::NewView(_) => PacketType::NewView,
            PbftMessage::CommittedProposalRequest(_) => PacketType::CommittedProposalRequest,
            PbftMessage::PreparedProposalRequest(_) => PacketType::PreparedProposalRequest,
            PbftMessage::CommittedProposalResponse(_) => PacketType::CommittedProposalResponse,
            PbftMessage::PreparedProposalResponse(_) => PacketType::PreparedProposalResponse,
        }
    }

    /// Returns the node index of the message's originator.
    pub fn generated_from(&self) -> NodeIndex {
        match self {
            PbftMessage::PrePrepare(m) => m.generated_from,
            PbftMessage::Prepare(m) => m.generated_from,
            PbftMessage::Commit(m) => m.generated_from,
            PbftMessage::ViewChange(m) => m.generated_from,
            PbftMessage::NewView(m) => m.generated_from,
            PbftMessage::CommittedProposalRequest(m) => m.generated_from,
            PbftMessage::PreparedProposalRequest(m) => m.generated_from,
            PbftMessage::CommittedProposalResponse(m) => m.generated_from,
            PbftMessage::PreparedProposalResponse(m) => m.generated_from,
        }
    }
}

impl From<PrePrepare> for PbftMessage {
    fn from(pre_prepare: PrePrepare) -> Self {
        PbftMessage::PrePrepare(pre_prepare)
    }
}

impl From<Prepare> for PbftMessage {
    fn from(prepare: Prepare) -> Self {
        PbftMessage::Prepare(prepare)
    }
}

impl From<Commit> for PbftMessage {
    fn from(commit: Commit) -> Self {
        PbftMessage::Commit(commit)
    }
}

impl From<ViewChange> for PbftMessage {
    fn from(view_change: ViewChange) -> Self {
        PbftMessage::ViewChange(view_change)
    }
}

impl From<NewView> for PbftMessage {
    fn from(new_view: NewView) -> Self {
        PbftMessage::NewView(new_view)
    }
}

impl From<CommittedProposalRequest> for PbftMessage {
    fn from(request: CommittedProposalRequest) -> Self {
        PbftMessage::CommittedProposalRequest(request)
    }
}

impl From<PreparedProposalRequest> for PbftMessage {
    fn from(request: PreparedProposalRequest) -> Self {
        PbftMessage::PreparedProposalRequest(request)
    }
}

impl From<CommittedProposalResponse> for PbftMessage {
    fn from(response: CommittedProposalResponse) -> Self {
        PbftMessage::CommittedProposalResponse(response)
    }
}

impl From<PreparedProposalResponse> for PbftMessage {
    fn from(response: PreparedProposalResponse) -> Self {
        PbftMessage::PreparedProposalResponse(response)
    }
}

/// Broadcasted by the leader of a given view, who proposes to extend the total order by inserting
/// the proposal contained in the message at its sequence number.
#[derive(Clone, Debug, PartialEq, BorshSerialize, BorshDeserialize)]
pub struct PrePrepare {
    pub view: ViewNumber,
    pub index: SequenceNumber,
    pub timestamp: Timestamp,
    pub generated_from: NodeIndex,
    pub proposal: Proposal,
    pub signature: SignatureBytes,
}

impl PrePrepare {
    /// Create a `PrePrepare` for the given `view` and `proposal` by signing over the values with
    /// the provided `keypair`.
    pub(crate) fn new(
        keypair: &Keypair,
        view: ViewNumber,
        generated_from: NodeIndex,
        proposal: Proposal,
    ) -> Self {
        let index = proposal.index;
        let timestamp = Timestamp::now();
        let message_bytes = (view, index, timestamp, generated_from, &proposal)
            .try_to_vec()
            .unwrap();
        let signature = keypair.sign(&message_bytes);
        Self {
            view,
            index,
            timestamp,
            generated_from,
            proposal,
            signature,
        }
    }
}

impl SignedMessage for PrePrepare {
    fn message_bytes(&self) -> Vec<u8> {
        (
            self.view,
            self.index,
            self.timestamp,
            self.generated_from,
            &self.proposal,
        )
            .try_to_vec()
            .unwrap()
    }

    fn signature_bytes(&self) -> SignatureBytes {
        self.signature
    }
}

/// Broadcasted by a consensus node that has accepted a pre-prepare, vouching for `proposal_hash`
/// at the (sequence number, view) of the pre-prepare.
#[derive(Clone, Debug, PartialEq, BorshSerialize, BorshDeserialize)]
pub struct Prepare {
    pub view: ViewNumber,
    pub index: SequenceNumber,
    pub timestamp: Timestamp,
    pub generated_from: NodeIndex,
    pub proposal_hash: CryptoHash,
    pub signature: SignatureBytes,
}

impl Prepare {
    /// Create a `Prepare` for the given `view`, `index`, and `proposal_hash` by signing over the
    /// values with the provided `keypair`.
    pub(crate) fn new(
        keypair: &Keypair,
        view: ViewNumber,
        index: SequenceNumber,
        generated_from: NodeIndex,
        proposal_hash: CryptoHash,
    ) -> Self {
        let timestamp = Timestamp::now();
        let message_bytes = (view, index, timestamp, generated_from, proposal_hash)
            .try_to_vec()
            .unwrap();
        let signature = keypair.sign(&message_bytes);
        Self {
            view,
            index,
            timestamp,
            generated_from,
            proposal_hash,
            signature,
        }
    }
}

impl SignedMessage for Prepare {
    fn message_bytes(&self) -> Vec<u8> {
        (
            self.view,
            self.index,
            self.timestamp,
            self.generated_from,
            self.proposal_hash,
        )
            .try_to_vec()
            .unwrap()
    }

    fn signature_bytes(&self) -> SignatureBytes {
        self.signature
    }
}

/// Broadcasted by a consensus node that has collected a precommit certificate, vouching that the
/// proposal identified by `proposal_hash` is precommitted at its (sequence number, view).
///
/// Besides the message signature, a commit carries `proposal_signature`: the sender's signature
/// over the bare proposal digest. When a commit certificate forms, these are collected into the
/// committed proposal's signature list, making the stored proposal verifiable on its own (by the
/// block validator, and by replicas catching up through log sync).
#[derive(Clone, Debug, PartialEq, BorshSerialize, BorshDeserialize)]
pub struct Commit {
    pub view: ViewNumber,
    pub index: SequenceNumber,
    pub timestamp: Timestamp,
    pub generated_from: NodeIndex,
    pub proposal_hash: CryptoHash,
    pub proposal_signature: SignatureBytes,
    pub signature: SignatureBytes,
}

impl Commit {
    /// Create a `Commit` for the given `view`, `index`, and `proposal_hash` by signing over the
    /// values with the provided `keypair`.
    pub(crate) fn new(
        keypair: &Keypair,
        view: ViewNumber,
        index: SequenceNumber,
        generated_from: NodeIndex,
        proposal_hash: CryptoHash,
    ) -> Self {
        let timestamp = Timestamp::now();
        let proposal_signature = keypair.sign(&proposal_hash.bytes());
        let message_bytes = (
            view,
            index,
            timestamp,
            generated_from,
            proposal_hash,
            proposal_signature,
        )
            .try_to_vec()
            .unwrap();
        let signature = keypair.sign(&message_bytes);
        Self {
            view,
            index,
            timestamp,
            generated_from,
            proposal_hash,
            proposal_signature,
            signature,
        }
    }
}

impl SignedMessage for Commit {
    fn message_bytes(&self) -> Vec<u8> {
        (
            self.view,
            self.index,
            self.timestamp,
            self.generated_from,
            self.proposal_hash,
            self.proposal_signature,
        )
            .try_to_vec()
            .unwrap()
    }

    fn signature_bytes(&self) -> SignatureBytes {
        self.signature
    }
}

/// Payload-less summary of a precommitted pre-prepare, carried inside view-change evidence.
///
/// Omitting the payload bytes keeps view-change messages bounded in size; replicas that need the
/// payload fetch it through [log synchronization](crate::log_sync).
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct PrePrepareSummary {
    pub view: ViewNumber,
    pub index: SequenceNumber,
    pub hash: CryptoHash,
    pub generated_from: NodeIndex,
}

impl From<&PrePrepare> for PrePrepareSummary {
    fn from(pre_prepare: &PrePrepare) -> Self {
        Self {
            view: pre_prepare.view,
            index: pre_prepare.index,
            hash: pre_prepare.proposal.hash,
            generated_from: pre_prepare.generated_from,
        }
    }
}

/// Broadcasted on view timeout. `view` is the view the sender wants to move to; the message
/// carries the sender's committed proposal and a summary of every precommitted entry it holds, so
/// that prepared evidence survives the leader change.
#[derive(Clone, Debug, PartialEq, BorshSerialize, BorshDeserialize)]
pub struct ViewChange {
    pub view: ViewNumber,
    pub timestamp: Timestamp,
    pub generated_from: NodeIndex,
    pub committed_proposal: Proposal,
    pub prepared_proposals: Vec<PrePrepareSummary>,
    pub signature: SignatureBytes,
}

impl ViewChange {
    /// Create a `ViewChange` towards `view` by signing over the values with the provided
    /// `keypair`.
    pub(crate) fn new(
        keypair: &Keypair,
        view: ViewNumber,
        generated_from: NodeIndex,
        committed_proposal: Proposal,
        prepared_proposals: Vec<PrePrepareSummary>,
    ) -> Self {
        let timestamp = Timestamp::now();
        let message_bytes = (
            view,
            timestamp,
            generated_from,
            &committed_proposal,
            &prepared_proposals,
        )
            .try_to_vec()
            .unwrap();
        let signature = keypair.sign(&message_bytes);
        Self {
            view,
            timestamp,
            generated_from,
            committed_proposal,
            prepared_proposals,
            signature,
        }
    }
}

impl SignedMessage for ViewChange {
    fn message_bytes(&self) -> Vec<u8> {
        (
            self.view,
            self.timestamp,
            self.generated_from,
            &self.committed_proposal,
            &self.prepared_proposals,
        )
            .try_to_vec()
            .unwrap()
    }

    fn signature_bytes(&self) -> SignatureBytes {
        self.signature
    }
}

/// Broadcasted by the leader of the pending view to close a view change.
///
/// Carries the quorum of view-change messages that justify the change, and the pre-prepare list
/// reconstructed from the highest-viewed prepared evidence (with empty-proposal markers for
/// sequence numbers that carry none). `generated_from` is the claiming leader and must equal the
/// leader determined by the view-change rotation.
#[derive(Clone, Debug, PartialEq, BorshSerialize, BorshDeserialize)]
pub struct NewView {
    pub view: ViewNumber,
    pub timestamp: Timestamp,
    pub generated_from: NodeIndex,
    pub view_changes: Vec<ViewChange>,
    pub pre_prepares: Vec<PrePrepare>,
    pub signature: SignatureBytes,
}

impl NewView {
    /// Create a `NewView` closing the change into `view` by signing over the values with the
    /// provided `keypair`.
    pub(crate) fn new(
        keypair: &Keypair,
        view: ViewNumber,
        generated_from: NodeIndex,
        view_changes: Vec<ViewChange>,
        pre_prepares: Vec<PrePrepare>,
    ) -> Self {
        let timestamp = Timestamp::now();
        let message_bytes = (view, timestamp, generated_from, &view_changes, &pre_prepares)
            .try_to_vec()
            .unwrap();
        let signature = keypair.sign(&message_bytes);
        Self {
            view,
            timestamp,
            generated_from,
            view_changes,
            pre_prepares,
            signature,
        }
    }
}

impl SignedMessage for NewView {
    fn message_bytes(&self) -> Vec<u8> {
        (
            self.view,
            self.timestamp,
            self.generated_from,
            &self.view_changes,
            &self.pre_prepares,
        )
            .try_to_vec()
            .unwrap()
    }

    fn signature_bytes(&self) -> SignatureBytes {
        self.signature
    }
}

/// Request for committed proposals in the range `[index, index + offset)`, served read-only from
/// the responder's ledger store.
#[derive(Clone, Debug, PartialEq, BorshSerialize, BorshDeserialize)]
pub struct CommittedProposalRequest {
    pub index: SequenceNumber,
    pub offset: u64,
    pub timestamp: Timestamp,
    pub generated_from: NodeIndex,
    pub signature: SignatureBytes,
}

impl CommittedProposalRequest {
    pub(crate) fn new(
        keypair: &Keypair,
        index: SequenceNumber,
        offset: u64,
        generated_from: NodeIndex,
    ) -> Self {
        let timestamp = Timestamp::now();
        let message_bytes = (index, offset, timestamp, generated_from)
            .try_to_vec()
            .unwrap();
        let signature = keypair.sign(&message_bytes);
        Self {
            index,
            offset,
            timestamp,
            generated_from,
            signature,
        }
    }
}

impl SignedMessage for CommittedProposalRequest {
    fn message_bytes(&self) -> Vec<u8> {
        (self.index, self.offset, self.timestamp, self.generated_from)
            .try_to_vec()
            .unwrap()
    }

    fn signature_bytes(&self) -> SignatureBytes {
        self.signature
    }
}

/// Answer to a [`CommittedProposalRequest`]: the committed proposals the responder could load,
/// in ascending sequence-number order.
#[derive(Clone, Debug, PartialEq, BorshSerialize, BorshDeserialize)]
pub struct CommittedProposalResponse {
    pub proposals: Vec<Proposal>,
    pub timestamp: Timestamp,
    pub generated_from: NodeIndex,
    pub signature: SignatureBytes,
}

impl CommittedProposalResponse {
    pub(crate) fn new(keypair: &Keypair, proposals: Vec<Proposal>, generated_from: NodeIndex) -> Self {
        let timestamp = Timestamp::now();
        let message_bytes = (&proposals, timestamp, generated_from).try_to_vec().unwrap();
        let signature = keypair.sign(&message_bytes);
        Self {
            proposals,
            timestamp,
            generated_from,
            signature,
        }
    }
}

impl SignedMessage for CommittedProposalResponse {
    fn message_bytes(&self) -> Vec<u8> {
        (&self.proposals, self.timestamp, self.generated_from)
            .try_to_vec()
            .unwrap()
    }

    fn signature_bytes(&self) -> SignatureBytes {
        self.signature
    }
}

/// Request for the full payload of a precommitted proposal, identified by its digest.
#[derive(Clone, Debug, PartialEq, BorshSerialize, BorshDeserialize)]
pub struct PreparedProposalRequest {
    pub index: SequenceNumber,
    pub hash: CryptoHash,
    pub timestamp: Timestamp,
    pub generated_from: NodeIndex,
    pub signature: SignatureBytes,
}

impl PreparedProposalRequest {
    pub(crate) fn new(
        keypair: &Keypair,
        index: SequenceNumber,
        hash: CryptoHash,
        generated_from: NodeIndex,
    ) -> Self {
        let timestamp = Timestamp::now();
        let message_bytes = (index, hash, timestamp, generated_from)
            .try_to_vec()
            .unwrap();
        let signature = keypair.sign(&message_bytes);
        Self {
            index,
            hash,
            timestamp,
            generated_from,
            signature,
        }
    }
}

impl SignedMessage for PreparedProposalRequest {
    fn message_bytes(&self) -> Vec<u8> {
        (self.index, self.hash, self.timestamp, self.generated_from)
            .try_to_vec()
            .unwrap()
    }

    fn signature_bytes(&self) -> SignatureBytes {
        self.signature
    }
}

/// Answer to a [`PreparedProposalRequest`]: the precommitted proposal with its payload.
#[derive(Clone, Debug, PartialEq, BorshSerialize, BorshDeserialize)]
pub struct PreparedProposalResponse {
    pub proposal: Proposal,
    pub timestamp: Timestamp,
    pub generated_from: NodeIndex,
    pub signature: SignatureBytes,
}

impl PreparedProposalResponse {
    pub(crate) fn new(keypair: &Keypair, proposal: Proposal, generated_from: NodeIndex) -> Self {
        let timestamp = Timestamp::now();
        let message_bytes = (&proposal, timestamp, generated_from).try_to_vec().unwrap();
        let signature = keypair.sign(&message_bytes);
        Self {
            proposal,
            timestamp,
            generated_from,
            signature,
        }
    }
}

impl SignedMessage for PreparedProposalResponse {
    fn message_bytes(&self) -> Vec<u8> {
        (&self.proposal, self.timestamp, self.generated_from)
            .try_to_vec()
            .unwrap()
    }

    fn signature_bytes(&self) -> SignatureBytes {
        self.signature
    }
}
