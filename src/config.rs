/*
    Copyright © 2026, The pbft_rs Authors
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Live consensus parameters shared between the worker thread and the host-facing surface.
//!
//! Reads of scalar state (views, watermarks, timeout) are lock-free through atomics. The
//! consensus-node list is published as a copy-on-write [`Arc`] snapshot: readers clone the `Arc`
//! out from under a mutex and keep working on an immutable set, writers install a whole new
//! snapshot. Writes that must be consistent together (applying a ledger configuration) are
//! serialized by the engine, which is the only writer.

use std::sync::{
    atomic::{AtomicU32, AtomicU64, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

use crate::types::{
    crypto_primitives::{Keypair, VerifyingKey},
    data_types::{NodeIndex, SequenceNumber, TotalWeight, ViewNumber},
    proposal::Proposal,
    validator_set::ConsensusNodeSet,
};

pub(crate) struct Config {
    keypair: Keypair,

    view: AtomicU64,
    to_view: AtomicU64,
    progressed_index: AtomicU64,
    consensus_timeout_ms: AtomicU64,
    node_index: AtomicU32,

    /// Width of the admissible index window `[progressed_index, high_water_mark)`.
    watermark_window: u64,

    committed_proposal: Mutex<Proposal>,
    consensus_nodes: Mutex<Arc<ConsensusNodeSet>>,
}

impl Config {
    pub(crate) fn new(
        keypair: Keypair,
        consensus_nodes: ConsensusNodeSet,
        committed_proposal: Proposal,
        consensus_timeout: Duration,
        watermark_window: u64,
    ) -> Self {
        let node_index = consensus_nodes
            .get_by_id(&keypair.public())
            .map(|node| node.index.int())
            .unwrap_or(u32::MAX);
        let progressed_index = committed_proposal.index + 1;

        Self {
            keypair,
            view: AtomicU64::new(ViewNumber::init().int()),
            to_view: AtomicU64::new(ViewNumber::init().int()),
            progressed_index: AtomicU64::new(progressed_index.int()),
            consensus_timeout_ms: AtomicU64::new(consensus_timeout.as_millis() as u64),
            node_index: AtomicU32::new(node_index),
            watermark_window,
            committed_proposal: Mutex::new(committed_proposal),
            consensus_nodes: Mutex::new(Arc::new(consensus_nodes)),
        }
    }

    pub(crate) fn keypair(&self) -> &Keypair {
        &self.keypair
    }

    pub(crate) fn node_id(&self) -> VerifyingKey {
        self.keypair.public()
    }

    /// The local node's index in the current consensus-node list, if the local node is a
    /// consensus node.
    pub(crate) fn node_index(&self) -> Option<NodeIndex> {
        match self.node_index.load(Ordering::Relaxed) {
            u32::MAX => None,
            index => Some(NodeIndex::new(index)),
        }
    }

    pub(crate) fn is_consensus_node(&self) -> bool {
        self.node_index().is_some()
    }

    pub(crate) fn view(&self) -> ViewNumber {
        ViewNumber::new(self.view.load(Ordering::Relaxed))
    }

    pub(crate) fn to_view(&self) -> ViewNumber {
        ViewNumber::new(self.to_view.load(Ordering::Relaxed))
    }

    /// Set the current view. `to_view` is lifted along so that `view <= to_view` keeps holding.
    pub(crate) fn set_view(&self, view: ViewNumber) {
        self.view.store(view.int(), Ordering::Relaxed);
        self.to_view.fetch_max(view.int(), Ordering::Relaxed);
    }

    pub(crate) fn inc_to_view(&self, delta: u64) {
        self.to_view.fetch_add(delta, Ordering::Relaxed);
    }

    /// The lowest sequence number this replica still accepts evidence for: the index right after
    /// its committed proposal.
    pub(crate) fn progressed_index(&self) -> SequenceNumber {
        SequenceNumber::new(self.progressed_index.load(Ordering::Relaxed))
    }

    /// The exclusive upper bound of the admissible index window.
    pub(crate) fn high_water_mark(&self) -> SequenceNumber {
        self.progressed_index() + self.watermark_window
    }

    pub(crate) fn consensus_timeout(&self) -> Duration {
        Duration::from_millis(self.consensus_timeout_ms.load(Ordering::Relaxed))
    }

    pub(crate) fn set_consensus_timeout(&self, timeout: Duration) {
        self.consensus_timeout_ms
            .store(timeout.as_millis() as u64, Ordering::Relaxed);
    }

    pub(crate) fn committed_proposal(&self) -> Proposal {
        self.committed_proposal.lock().unwrap().clone()
    }

    /// Install `proposal` as the committed proposal, advancing `progressed_index` to
    /// `proposal.index + 1`. `progressed_index` is non-decreasing: stale installs are ignored.
    pub(crate) fn set_committed_proposal(&self, proposal: Proposal) {
        let mut committed = self.committed_proposal.lock().unwrap();
        if proposal.index >= committed.index {
            self.progressed_index
                .fetch_max(proposal.index.int() + 1, Ordering::Relaxed);
            *committed = proposal;
        }
    }

    /// Get the current consensus-node list snapshot. The snapshot is immutable; a configuration
    /// change installs a new one.
    pub(crate) fn consensus_nodes(&self) -> Arc<ConsensusNodeSet> {
        self.consensus_nodes.lock().unwrap().clone()
    }

    /// Publish a new consensus-node list snapshot and refresh the local node's index under it.
    pub(crate) fn set_consensus_nodes(&self, nodes: ConsensusNodeSet) {
        let node_index = nodes
            .get_by_id(&self.keypair.public())
            .map(|node| node.index.int())
            .unwrap_or(u32::MAX);
        self.node_index.store(node_index, Ordering::Relaxed);
        *self.consensus_nodes.lock().unwrap() = Arc::new(nodes);
    }

    pub(crate) fn quorum(&self) -> TotalWeight {
        self.consensus_nodes().quorum()
    }

    /// The node index expected to lead (send the pre-prepare for) sequence number `index` in the
    /// current view.
    ///
    /// The mapping is a hard compatibility constant; all replicas of a network must compute it
    /// identically. With `committed` the committed-proposal index, `n` the size of the node list,
    /// and the list ordered by ascending node index:
    ///
    /// ```text
    /// leader_index(index) = (committed + (index - committed - 1) + view) mod n
    /// ```
    ///
    /// Rotation ties are broken stably by ascending node index (the list order itself).
    pub(crate) fn leader_index(&self, index: SequenceNumber) -> NodeIndex {
        let nodes = self.consensus_nodes();
        let n = nodes.len() as u64;
        let committed = self.committed_proposal().index.int();
        let offset = index.int().saturating_sub(committed).saturating_sub(1);
        NodeIndex::new(((committed + offset + self.view().int()) % n) as u32)
    }

    /// The node index expected to lead the pending view `to_view` and close the current view
    /// change with a NewView message: `to_view mod n` against the snapshot taken at view-change.
    ///
    /// For a single-step view change (`to_view == view + 1`) this is `(view + 1) mod n`.
    pub(crate) fn leader_after_view_change(&self) -> NodeIndex {
        let n = self.consensus_nodes().len() as u64;
        NodeIndex::new((self.to_view().int() % n) as u32)
    }
}
