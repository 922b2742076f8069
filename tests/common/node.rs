//! A consensus node for testing: a started [`Pbft`] handle plus the mock collaborators needed to
//! drive and observe it.

use std::time::Duration;

use pbft_rs::engine::EngineOptions;
use pbft_rs::event_bus::EventHandlers;
use pbft_rs::pbft::Pbft;
use pbft_rs::pluggables::{LedgerConfig, ProposalValidator, VerifyProposalCallback};
use pbft_rs::types::{
    crypto_primitives::{sha256, SigningKey, VerifyingKey},
    data_types::{NodeIndex, SequenceNumber, ViewNumber, Weight},
    proposal::Proposal,
    validator_set::ConsensusNode,
};

use super::front::FrontStub;
use super::ledger::MemLedger;

/// A proposal validator that approves every payload.
pub struct AutoApprover;

impl ProposalValidator for AutoApprover {
    fn verify_proposal(&self, _: VerifyingKey, _: Proposal, callback: VerifyProposalCallback) {
        callback(Ok(true))
    }
}

pub struct Node {
    pub public_key: VerifyingKey,
    pub pbft: Pbft<MemLedger>,
    pub ledger: MemLedger,
}

impl Node {
    pub fn new(
        signing_key: SigningKey,
        front: FrontStub,
        consensus_nodes: Vec<ConsensusNode>,
        consensus_timeout: Duration,
    ) -> Node {
        let public_key = signing_key.verifying_key();
        let ledger = MemLedger::new();
        let initial = LedgerConfig {
            committed_proposal: Proposal::genesis(),
            consensus_nodes,
            consensus_timeout,
        };
        let pbft = Pbft::start(
            front,
            AutoApprover,
            ledger.clone(),
            signing_key,
            initial,
            EngineOptions::default(),
            EventHandlers::with_logging_defaults(),
        );
        Node {
            public_key,
            pbft,
            ledger,
        }
    }

    /// Submit `payload` for the given sequence number. The submission only takes effect on the
    /// node that currently leads that sequence number; other nodes drop it.
    pub fn submit(&self, index: u64, payload: &[u8]) {
        self.pbft.async_submit_proposal(
            payload.to_vec(),
            SequenceNumber::new(index),
            sha256(payload),
            Box::new(|result| {
                if let Err(error) = result {
                    panic!("submission failed: {:?}", error);
                }
            }),
        );
    }

    pub fn committed_at(&self, index: u64) -> Option<Proposal> {
        self.ledger.committed_at(index)
    }

    pub fn view(&self) -> ViewNumber {
        let mut view = ViewNumber::init();
        self.pbft.async_get_pbft_view(|v| view = v);
        view
    }
}

/// Build the shared consensus-node list for a set of keys, all with weight 1.
pub fn consensus_node_list(keys: &[SigningKey]) -> Vec<ConsensusNode> {
    keys.iter()
        .enumerate()
        .map(|(i, key)| ConsensusNode {
            index: NodeIndex::new(i as u32),
            node_id: key.verifying_key(),
            weight: Weight::new(1),
        })
        .collect()
}
