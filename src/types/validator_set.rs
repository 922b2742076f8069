/*
    Copyright © 2026, The pbft_rs Authors
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types that store information about the set of consensus nodes.

use std::slice;

use super::data_types::{NodeIndex, TotalWeight, Weight};
use crate::types::crypto_primitives::VerifyingKey;

/// A single entry in the consensus-node list: the node's index, its Ed25519 identity, and the
/// weight of its votes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsensusNode {
    pub index: NodeIndex,
    pub node_id: VerifyingKey,
    pub weight: Weight,
}

/// The ordered list of consensus nodes for a configuration.
///
/// ## Ordering of nodes
///
/// `ConsensusNodeSet` internally maintains the list in ascending order of [`NodeIndex`]. Leader
/// rotation is defined over this order, so all replicas of a network must be configured with the
/// same list.
///
/// ## Limits to total weight
///
/// Users must make sure that the total weight of the node set does not exceed `u128::MAX / 2`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsensusNodeSet {
    // Kept sorted by ascending node index.
    nodes: Vec<ConsensusNode>,
}

impl ConsensusNodeSet {
    /// Create a `ConsensusNodeSet` from `nodes`, sorting them into ascending order of node index.
    pub fn new(mut nodes: Vec<ConsensusNode>) -> Self {
        nodes.sort_by_key(|node| node.index);
        Self { nodes }
    }

    /// Get the node with the given `index`, if it is in the set.
    pub fn get_by_index(&self, index: NodeIndex) -> Option<&ConsensusNode> {
        self.nodes
            .binary_search_by_key(&index, |node| node.index)
            .ok()
            .map(|pos| &self.nodes[pos])
    }

    /// Get the node with the given `node_id`, if it is in the set.
    pub fn get_by_id(&self, node_id: &VerifyingKey) -> Option<&ConsensusNode> {
        self.nodes.iter().find(|node| &node.node_id == node_id)
    }

    /// Check whether the set contains a node identified by `node_id`.
    pub fn contains(&self, node_id: &VerifyingKey) -> bool {
        self.get_by_id(node_id).is_some()
    }

    /// Get an iterator through the nodes in ascending order of node index.
    pub fn iter(&self) -> slice::Iter<ConsensusNode> {
        self.nodes.iter()
    }

    /// Get the identities of all nodes, in ascending order of node index. This is the recipient
    /// list for consensus broadcasts.
    pub fn node_id_list(&self) -> Vec<VerifyingKey> {
        self.nodes.iter().map(|node| node.node_id).collect()
    }

    /// Get the number of nodes in the set.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check whether the set is empty (i.e., `self.len() == 0`).
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Get the sum of the weights of all of the nodes in the set.
    pub fn total_weight(&self) -> TotalWeight {
        let mut total = TotalWeight::new(0);
        for node in &self.nodes {
            total += node.weight;
        }
        total
    }

    /// Compute the total weight that a set of matching votes must match or exceed (`>=`) in order
    /// to count as a quorum under this node set: the smallest integer strictly greater than two
    /// thirds of the total weight.
    ///
    /// This threshold guarantees that at most one certificate can form per (sequence number,
    /// view) given that strictly less than one third of the total weight is Byzantine.
    pub fn quorum(&self) -> TotalWeight {
        const TOTAL_WEIGHT_OVERFLOW: &str =
            "Consensus node set weight exceeds u128::MAX/2. Read the itemdoc for `ConsensusNodeSet`.";

        TotalWeight::new(
            (self
                .total_weight()
                .int()
                .checked_mul(2)
                .expect(TOTAL_WEIGHT_OVERFLOW)
                / 3)
                + 1,
        )
    }
}
