/*
    Copyright © 2026, The pbft_rs Authors
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The unit of agreement: an opaque payload bound to a position in the total order.

use borsh::{BorshDeserialize, BorshSerialize};

use super::{
    crypto_primitives::empty_hash,
    data_types::{CryptoHash, NodeIndex, SequenceNumber, SignatureBytes},
};

/// A block proposal as seen by consensus: a sequence number, the digest of the payload, the opaque
/// payload bytes themselves, and the signatures collected over the payload.
///
/// Consensus never inspects `data`; executing and validating the payload is the job of the
/// [proposal validator](crate::pluggables::ProposalValidator). A proposal is immutable once
/// signed.
///
/// ## Empty proposals
///
/// A proposal whose `hash` equals [`empty_hash`] is an **empty proposal**. Empty proposals are
/// produced during view changes to fill sequence numbers for which no prepared evidence survived;
/// they commit like any other proposal but carry no payload.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct Proposal {
    pub index: SequenceNumber,
    pub hash: CryptoHash,
    pub data: Vec<u8>,
    pub signatures: Vec<(NodeIndex, SignatureBytes)>,
}

impl Proposal {
    /// Create a new `Proposal` binding `data` (with digest `hash`) to `index`.
    pub fn new(index: SequenceNumber, hash: CryptoHash, data: Vec<u8>) -> Self {
        Self {
            index,
            hash,
            data,
            signatures: Vec::new(),
        }
    }

    /// Create the empty proposal for `index`.
    pub fn empty(index: SequenceNumber) -> Self {
        Self {
            index,
            hash: empty_hash(),
            data: Vec::new(),
            signatures: Vec::new(),
        }
    }

    /// The genesis proposal: the empty proposal at sequence number 0. Every replica starts with
    /// this as its committed proposal.
    pub fn genesis() -> Self {
        Self::empty(SequenceNumber::new(0))
    }

    /// Check whether this proposal is an empty proposal.
    pub fn is_empty(&self) -> bool {
        self.hash == empty_hash()
    }

    /// Get a copy of this proposal with the payload bytes stripped, keeping size bounded when the
    /// proposal travels inside view-change evidence.
    pub fn without_data(&self) -> Proposal {
        Proposal {
            index: self.index,
            hash: self.hash,
            data: Vec::new(),
            signatures: self.signatures.clone(),
        }
    }

    /// Whether the payload for this proposal's hash is actually present.
    pub fn has_data(&self) -> bool {
        !self.data.is_empty() || self.is_empty()
    }
}
