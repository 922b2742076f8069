/*
    Copyright © 2026, The pbft_rs Authors
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types that exist only to store bytes or numbers, and do not have any major "active" behavior.

use std::{
    fmt::{self, Debug, Display, Formatter},
    hash::Hash,
    ops::{Add, AddAssign, Sub},
};

use borsh::{BorshDeserialize, BorshSerialize};

/// A monotonically increasing round identifier selecting the current leader.
///
/// Every replica tracks two views: the view it currently operates in, and the view it is trying to
/// move to through a view change (`to_view`). The invariant `view <= to_view` holds at all times.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct ViewNumber(u64);

impl ViewNumber {
    /// Create a new `ViewNumber` wrapping `int`.
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    /// Get the initial `ViewNumber`, which is 0.
    pub const fn init() -> Self {
        Self(0)
    }

    /// Get the inner `u64` of this `ViewNumber`.
    pub const fn int(&self) -> u64 {
        self.0
    }
}

impl Display for ViewNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl Add<u64> for ViewNumber {
    type Output = ViewNumber;

    fn add(self, rhs: u64) -> Self::Output {
        ViewNumber(self.0.add(rhs))
    }
}

/// Position of a proposal in the total order that consensus produces.
///
/// Also referred to as the "index" of a proposal. Starts at 0 for the genesis proposal and
/// increases by 1 for every committed proposal.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct SequenceNumber(u64);

impl SequenceNumber {
    /// Create a new `SequenceNumber` wrapping `int`.
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    /// Get the inner `u64` of this `SequenceNumber`.
    pub const fn int(&self) -> u64 {
        self.0
    }
}

impl Display for SequenceNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl Add<u64> for SequenceNumber {
    type Output = SequenceNumber;

    fn add(self, rhs: u64) -> Self::Output {
        SequenceNumber(self.0.add(rhs))
    }
}

impl Sub<u64> for SequenceNumber {
    type Output = SequenceNumber;

    fn sub(self, rhs: u64) -> Self::Output {
        SequenceNumber(self.0.saturating_sub(rhs))
    }
}

/// Index of a consensus node inside the ordered consensus-node list.
///
/// Node indices are assigned by the ledger configuration and are stable for the lifetime of a
/// configuration: the i-th entry of the list (in ascending order of indices) has index i.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct NodeIndex(u32);

impl NodeIndex {
    /// Create a new `NodeIndex` wrapping `int`.
    pub const fn new(int: u32) -> Self {
        Self(int)
    }

    /// Get the inner `u32` of this `NodeIndex`.
    pub const fn int(&self) -> u32 {
        self.0
    }
}

impl Display for NodeIndex {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Weight of a specific consensus node's votes in consensus decisions.
///
/// The higher the weight, the more the node's prepares, commits, and view changes count towards a
/// quorum.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct Weight(u64);

impl Weight {
    /// Create a new `Weight` wrapping `int`.
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    /// Get the inner `u64` of this `Weight`.
    pub const fn int(&self) -> u64 {
        self.0
    }
}

/// Sum of the [`Weight`]s of a set of consensus nodes.
///
/// The inner type is `u128`, bigger than the `u64` that `Weight` wraps, so that summing up large
/// weights does not overflow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, BorshDeserialize, BorshSerialize)]
pub struct TotalWeight(u128);

impl TotalWeight {
    /// Create a new `TotalWeight` wrapping `int`.
    pub(crate) const fn new(int: u128) -> Self {
        Self(int)
    }

    /// Get the inner `u128` of this `TotalWeight`.
    pub const fn int(&self) -> u128 {
        self.0
    }
}

impl AddAssign<Weight> for TotalWeight {
    fn add_assign(&mut self, rhs: Weight) {
        self.0.add_assign(rhs.0 as u128)
    }
}

/// Milliseconds since the Unix epoch.
///
/// Stamped on every outbound message. Informational: timestamps are not used in validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Create a new `Timestamp` wrapping `int`.
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    /// Get the current wall-clock time as a `Timestamp`.
    pub fn now() -> Self {
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self(millis)
    }

    /// Get the inner `u64` of this `Timestamp`.
    pub const fn int(&self) -> u64 {
        self.0
    }
}

/// 32-byte cryptographic hash.
///
/// Within pbft_rs, `CryptoHash`-es are SHA256 digests: either the digest of a proposal's payload,
/// or the [well-known digest](crate::types::crypto_primitives::empty_hash) that marks an empty
/// proposal.
#[derive(Clone, Copy, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct CryptoHash([u8; 32]);

impl CryptoHash {
    /// Create a new `CryptoHash` wrapping `bytes`.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the inner `[u8; 32]` value of this `CryptoHash`.
    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }
}

impl Display for CryptoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Debug for CryptoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Ed25519 digital signature.
///
/// Produced using the [`ed25519_dalek`] crate, whose main definitions are re-exported from the
/// [`crypto_primitives`](super::crypto_primitives) module.
#[derive(Clone, Copy, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct SignatureBytes([u8; 64]);

impl SignatureBytes {
    /// Create a new `SignatureBytes` wrapping `bytes`.
    pub(crate) const fn new(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    /// Get the inner `[u8; 64]` value of this `SignatureBytes`.
    pub const fn bytes(&self) -> [u8; 64] {
        self.0
    }
}

impl Debug for SignatureBytes {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0[..].fmt(f)
    }
}
