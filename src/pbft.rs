/*
    Copyright © 2026, The pbft_rs Authors
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The public surface to the host node: functions that [start](Pbft::start) the consensus engine
//! and the [handle](Pbft) that keeps it alive.
//!
//! pbft_rs replicates a total order of proposals across a known set of consensus nodes. The
//! `Pbft` handle is a thin forwarder: host calls become items on the engine's inbound queue and
//! are processed on the worker thread. Dropping the handle stops the engine: shutdown signals are
//! sent and the worker and event-bus threads are joined in dependency order.
//!
//! ## Consensus nodes and observers
//!
//! Not every replica has to vote in consensus. A replica whose identity is absent from the
//! consensus-node list is an observer: it rejects protocol messages and waits until a ledger
//! configuration adds it to the set.

use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::codec;
use crate::config::Config;
use crate::engine::{proposal_quorum_reached, Engine, EngineOptions, Inbound, ProtocolError, SubmitCallback};
use crate::event_bus::{start_event_bus, EventHandlers};
use crate::pluggables::{
    FrontError, FrontService, LedgerConfig, LedgerStore, ProposalValidator, Responder,
};
use crate::types::{
    crypto_primitives::{Signature, SigningKey, Verifier, VerifyingKey},
    data_types::{CryptoHash, SequenceNumber, ViewNumber},
    proposal::Proposal,
    validator_set::ConsensusNodeSet,
};

pub struct Pbft<L: LedgerStore> {
    config: Arc<Config>,
    inbound_sender: Sender<Inbound>,
    block_validator: BlockValidator,
    worker: Option<JoinHandle<()>>,
    worker_shutdown: Sender<()>,
    event_bus: Option<JoinHandle<()>>,
    event_bus_shutdown: Option<Sender<()>>,
    _ledger: Arc<L>,
}

impl<L: LedgerStore> Pbft<L> {
    /// Start the consensus engine: build the live configuration from `initial`, register the
    /// inbound dispatcher with `front`, and spawn the worker and (if any handlers are
    /// registered) event-bus threads.
    pub fn start<F: FrontService, V: ProposalValidator>(
        front: F,
        validator: V,
        ledger: L,
        signing_key: SigningKey,
        initial: LedgerConfig,
        options: EngineOptions,
        event_handlers: EventHandlers,
    ) -> Pbft<L> {
        let config = Arc::new(Config::new(
            crate::types::crypto_primitives::Keypair::new(signing_key),
            ConsensusNodeSet::new(initial.consensus_nodes),
            initial.committed_proposal,
            initial.consensus_timeout,
            options.watermark_window,
        ));
        let ledger = Arc::new(ledger);

        let (event_publisher, event_bus, event_bus_shutdown) = if event_handlers.is_empty() {
            (None, None, None)
        } else {
            let (event_publisher, event_subscriber) = mpsc::channel();
            let (event_bus_shutdown, event_bus_shutdown_receiver) = mpsc::channel();
            let event_bus = start_event_bus(
                event_handlers,
                event_subscriber,
                event_bus_shutdown_receiver,
            );
            (Some(event_publisher), Some(event_bus), Some(event_bus_shutdown))
        };

        let (inbound_sender, inbound) = mpsc::channel();
        let (worker_shutdown, worker_shutdown_receiver) = mpsc::channel();
        let engine = Engine::new(
            config.clone(),
            front,
            Arc::new(validator),
            ledger.clone(),
            &options,
            inbound,
            inbound_sender.clone(),
            worker_shutdown_receiver,
            event_publisher,
        );
        let worker = engine.start();

        Pbft {
            block_validator: BlockValidator {
                config: config.clone(),
            },
            config,
            inbound_sender,
            worker: Some(worker),
            worker_shutdown,
            event_bus,
            event_bus_shutdown,
            _ledger: ledger,
        }
    }

    /// Submit a proposal for consensus. Takes effect when the local node is the rotation leader
    /// for `index`; `on_submitted` reports `NotConsensusNode` when the local node cannot vote at
    /// all.
    pub fn async_submit_proposal(
        &self,
        data: Vec<u8>,
        index: SequenceNumber,
        hash: CryptoHash,
        on_submitted: SubmitCallback,
    ) {
        let item = Inbound::Submit {
            data,
            index,
            hash,
            on_submitted,
        };
        if self.inbound_sender.send(item).is_err() {
            log::debug!("Pbft: dropping submission, the engine has stopped");
        }
    }

    /// Query the current view.
    pub fn async_get_pbft_view(&self, on_get_view: impl FnOnce(ViewNumber)) {
        on_get_view(self.config.view())
    }

    /// Feed a consensus message delivered outside the registered dispatcher (e.g., relayed by
    /// the host's sync module) into the engine.
    pub fn async_notify_consensus_message(
        &self,
        delivery: Result<(), FrontError>,
        from: VerifyingKey,
        data: Vec<u8>,
        responder: Option<Responder>,
        on_recv: SubmitCallback,
    ) {
        if let Err(front_error) = delivery {
            log::debug!(
                "Pbft: dropping errored consensus-message delivery: {}",
                front_error.detail
            );
            on_recv(Ok(()));
            return;
        }
        match codec::decode(&data) {
            Ok(msg) => {
                let _ = self.inbound_sender.send(Inbound::Message {
                    from,
                    msg,
                    responder,
                });
                on_recv(Ok(()));
            }
            Err(error) => {
                log::debug!("Pbft: undecodable consensus message: {:?}", error);
                on_recv(Err(ProtocolError::MalformedMessage));
            }
        }
    }

    /// Re-run signature and index checks on a block offered by the host's sync module.
    pub fn async_check_block(
        &self,
        block: Proposal,
        on_check_finish: impl FnOnce(bool) + Send + 'static,
    ) {
        self.block_validator.async_check_block(block, on_check_finish)
    }

    /// Notify the engine of a newly committed block and the ledger configuration it prescribes.
    pub fn async_notify_new_block(&self, ledger_config: LedgerConfig, on_recv: SubmitCallback) {
        let item = Inbound::NewBlock {
            ledger_config,
            on_recv,
        };
        if self.inbound_sender.send(item).is_err() {
            log::debug!("Pbft: dropping new-block notification, the engine has stopped");
        }
    }
}

impl<L: LedgerStore> Drop for Pbft<L> {
    fn drop(&mut self) {
        // Shutdown order: the event bus goes first so the worker's remaining publishes fall on a
        // closed channel (which it tolerates); the worker is joined last.
        if let (Some(shutdown), Some(event_bus)) =
            (self.event_bus_shutdown.take(), self.event_bus.take())
        {
            let _ = shutdown.send(());
            let _ = event_bus.join();
        }

        let _ = self.worker_shutdown.send(());
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Validator for blocks offered by the host's sync module. Re-runs the checks a replica would
/// have performed had it committed the block through consensus: the index must lie beyond the
/// committed proposal, and the signature list must carry a quorum weight of valid signatures
/// from distinct consensus nodes.
struct BlockValidator {
    config: Arc<Config>,
}

impl BlockValidator {
    fn async_check_block(&self, block: Proposal, on_check_finish: impl FnOnce(bool)) {
        // The genesis proposal needs no certificate.
        if block.index == SequenceNumber::new(0) {
            on_check_finish(true);
            return;
        }
        if block.index <= self.config.committed_proposal().index {
            on_check_finish(false);
            return;
        }
        // Any invalid signature rejects the block outright.
        let nodes = self.config.consensus_nodes();
        for (node_index, signature_bytes) in &block.signatures {
            let Some(node) = nodes.get_by_index(*node_index) else {
                log::warn!(
                    "BlockValidator: signature from unknown node index {}",
                    node_index
                );
                on_check_finish(false);
                return;
            };
            let signature = Signature::from_bytes(&signature_bytes.bytes());
            if node.node_id.verify(&block.hash.bytes(), &signature).is_err() {
                log::warn!(
                    "BlockValidator: invalid signature from node index {}",
                    node_index
                );
                on_check_finish(false);
                return;
            }
        }
        on_check_finish(proposal_quorum_reached(&self.config, &block));
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rand_core::OsRng;

    use super::*;
    use crate::types::{
        crypto_primitives::{sha256, Keypair},
        data_types::{NodeIndex, Weight},
        validator_set::ConsensusNode,
    };

    fn four_node_setup() -> (Arc<Config>, Vec<Keypair>) {
        let mut csprg = OsRng {};
        let keys: Vec<SigningKey> = (0..4).map(|_| SigningKey::generate(&mut csprg)).collect();
        let nodes = ConsensusNodeSet::new(
            keys.iter()
                .enumerate()
                .map(|(i, key)| ConsensusNode {
                    index: NodeIndex::new(i as u32),
                    node_id: key.verifying_key(),
                    weight: Weight::new(1),
                })
                .collect(),
        );
        let keypairs: Vec<Keypair> = keys.into_iter().map(Keypair::new).collect();
        let config = Arc::new(Config::new(
            keypairs[0].clone(),
            nodes,
            Proposal::genesis(),
            Duration::from_secs(3),
            100,
        ));
        (config, keypairs)
    }

    fn signed_block(keypairs: &[Keypair], signers: &[usize], index: u64) -> Proposal {
        let data = b"block".to_vec();
        let mut block = Proposal::new(SequenceNumber::new(index), sha256(&data), data);
        block.signatures = signers
            .iter()
            .map(|signer| {
                (
                    NodeIndex::new(*signer as u32),
                    keypairs[*signer].sign(&block.hash.bytes()),
                )
            })
            .collect();
        block
    }

    #[test]
    fn check_block_accepts_a_quorum_signed_block() {
        let (config, keypairs) = four_node_setup();
        let validator = BlockValidator { config };

        let block = signed_block(&keypairs, &[0, 1, 2], 1);
        let mut verdict = None;
        validator.async_check_block(block, |ok| verdict = Some(ok));
        assert_eq!(verdict, Some(true));
    }

    #[test]
    fn check_block_rejects_short_or_forged_certificates() {
        let (config, keypairs) = four_node_setup();
        let validator = BlockValidator { config };

        // Two signatures: below quorum.
        let mut verdict = None;
        validator.async_check_block(signed_block(&keypairs, &[0, 1], 1), |ok| {
            verdict = Some(ok)
        });
        assert_eq!(verdict, Some(false));

        // Three signatures, one forged (node 3's slot signed by node 0's key).
        let mut block = signed_block(&keypairs, &[0, 1], 1);
        block
            .signatures
            .push((NodeIndex::new(3), keypairs[0].sign(&block.hash.bytes())));
        let mut verdict = None;
        validator.async_check_block(block, |ok| verdict = Some(ok));
        assert_eq!(verdict, Some(false));
    }

    #[test]
    fn check_block_rejects_stale_indices_and_accepts_genesis() {
        let (config, keypairs) = four_node_setup();
        let validator = BlockValidator {
            config: config.clone(),
        };

        let mut verdict = None;
        validator.async_check_block(Proposal::genesis(), |ok| verdict = Some(ok));
        assert_eq!(verdict, Some(true));

        config.set_committed_proposal(signed_block(&keypairs, &[0, 1, 2], 5));
        let mut verdict = None;
        validator.async_check_block(signed_block(&keypairs, &[0, 1, 2], 5), |ok| {
            verdict = Some(ok)
        });
        assert_eq!(verdict, Some(false));
    }
}
