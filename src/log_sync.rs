/*
    Copyright © 2026, The pbft_rs Authors
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Log synchronization between replicas.
//!
//! Two request types are served:
//! 1. **Committed-proposal requests**: a read-only lookup against the ledger store for proposals
//!    in `[index, index + offset)`. These touch no worker-owned state, so they are answered
//!    directly on the dispatcher's thread.
//! 2. **Prepared-proposal requests**: return a precommitted proposal (with payload) by hash out
//!    of the [cache](crate::cache::CacheProcessor). The cache is owned by the worker, so the
//!    engine enqueues these and answers them on the worker thread.
//!
//! The client half fetches precommit data that a new-view reconstruction references but the local
//! replica does not hold, and committed proposals when view-change evidence shows a peer is
//! ahead. A pending fetch is keyed by proposal hash, times out after `sync_timeout`, and retries
//! against a rotating peer up to `sync_retries` times.

use std::collections::HashMap;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use crate::codec::{encode, CODEC_VERSION};
use crate::config::Config;
use crate::events::{
    EndSyncEvent, Event, ReceiveSyncRequestEvent, SendSyncResponseEvent, StartSyncEvent,
};
use crate::messages::{
    CommittedProposalRequest, CommittedProposalResponse, PrePrepare, PreparedProposalRequest,
    PreparedProposalResponse,
};
use crate::pluggables::{FrontService, LedgerStore, ModuleId, Responder};
use crate::types::{
    crypto_primitives::sha256,
    data_types::{CryptoHash, NodeIndex, SequenceNumber},
};

/// A precommit-data fetch that has been issued and not yet answered.
struct PendingFetch {
    /// The payload-less pre-prepare from a new-view reconstruction, waiting to be filled.
    pre_prepare: PrePrepare,
    peer: NodeIndex,
    deadline: Instant,
    attempts: u32,
}

pub(crate) struct LogSync {
    pending: HashMap<CryptoHash, PendingFetch>,
    sync_timeout: Duration,
    sync_retries: u32,
    event_publisher: Option<Sender<Event>>,
}

impl LogSync {
    pub(crate) fn new(
        sync_timeout: Duration,
        sync_retries: u32,
        event_publisher: Option<Sender<Event>>,
    ) -> Self {
        Self {
            pending: HashMap::new(),
            sync_timeout,
            sync_retries,
            event_publisher,
        }
    }

    /// Issue a prepared-proposal request for the payload of `pre_prepare`'s proposal to `peer`,
    /// and install a pending callback keyed by the proposal hash. The filled pre-prepare is
    /// handed back through [`on_prepared_proposal_response`](Self::on_prepared_proposal_response).
    pub(crate) fn request_precommit_data<F: FrontService>(
        &mut self,
        config: &Config,
        front: &F,
        pre_prepare: PrePrepare,
        peer: NodeIndex,
    ) {
        let Some(local_index) = config.node_index() else {
            return;
        };
        let hash = pre_prepare.proposal.hash;
        let index = pre_prepare.index;

        let request =
            PreparedProposalRequest::new(config.keypair(), index, hash, local_index);
        send_to_peer(config, front, peer, encode(&request.into(), CODEC_VERSION));

        self.pending.insert(
            hash,
            PendingFetch {
                pre_prepare,
                peer,
                deadline: Instant::now() + self.sync_timeout,
                attempts: 0,
            },
        );

        Event::StartSync(StartSyncEvent {
            timestamp: SystemTime::now(),
            peer,
            index,
        })
        .publish(&self.event_publisher);
    }

    /// Issue a committed-proposal request for `[start, start + offset)` to `peer`.
    pub(crate) fn request_committed_proposals<F: FrontService>(
        &self,
        config: &Config,
        front: &F,
        start: SequenceNumber,
        offset: u64,
        peer: NodeIndex,
    ) {
        let Some(local_index) = config.node_index() else {
            return;
        };
        let request = CommittedProposalRequest::new(config.keypair(), start, offset, local_index);
        send_to_peer(config, front, peer, encode(&request.into(), CODEC_VERSION));

        Event::StartSync(StartSyncEvent {
            timestamp: SystemTime::now(),
            peer,
            index: start,
        })
        .publish(&self.event_publisher);
    }

    /// Complete a pending fetch with `response`, returning the filled pre-prepare for
    /// re-handling. Responses that match no pending fetch, or whose payload does not hash to the
    /// requested digest, are dropped.
    pub(crate) fn on_prepared_proposal_response(
        &mut self,
        response: PreparedProposalResponse,
    ) -> Option<PrePrepare> {
        let hash = response.proposal.hash;
        if !self.pending.contains_key(&hash) {
            return None;
        }
        if sha256(&response.proposal.data) != hash {
            log::warn!(
                "LogSync: dropping prepared-proposal response whose payload does not match its digest, index {}",
                response.proposal.index
            );
            return None;
        }

        // Safety: presence of the key was checked above, and only this thread mutates `pending`.
        let fetch = self.pending.remove(&hash).unwrap();
        let mut pre_prepare = fetch.pre_prepare;
        pre_prepare.proposal.data = response.proposal.data;

        Event::EndSync(EndSyncEvent {
            timestamp: SystemTime::now(),
            index: pre_prepare.index,
        })
        .publish(&self.event_publisher);

        Some(pre_prepare)
    }

    /// Expire overdue fetches: each is retried against the next peer in rotation, up to
    /// `sync_retries` times, after which it is dropped.
    pub(crate) fn tick<F: FrontService>(&mut self, now: Instant, config: &Config, front: &F) {
        let Some(local_index) = config.node_index() else {
            return;
        };
        let n = config.consensus_nodes().len() as u32;
        if n == 0 {
            return;
        }
        let sync_retries = self.sync_retries;
        let sync_timeout = self.sync_timeout;

        let mut resend = Vec::new();
        self.pending.retain(|hash, fetch| {
            if now < fetch.deadline {
                return true;
            }
            fetch.attempts += 1;
            if fetch.attempts > sync_retries {
                log::warn!(
                    "LogSync: precommit-data fetch for index {} timed out after {} retries",
                    fetch.pre_prepare.index,
                    sync_retries
                );
                return false;
            }
            // Rotate to the next peer, skipping ourselves.
            let mut next = NodeIndex::new((fetch.peer.int() + 1) % n);
            if next == local_index {
                next = NodeIndex::new((next.int() + 1) % n);
            }
            fetch.peer = next;
            fetch.deadline = now + sync_timeout;
            resend.push((*hash, fetch.pre_prepare.index, next));
            true
        });

        for (hash, index, peer) in resend {
            let request = PreparedProposalRequest::new(config.keypair(), index, hash, local_index);
            send_to_peer(config, front, peer, encode(&request.into(), CODEC_VERSION));
            Event::StartSync(StartSyncEvent {
                timestamp: SystemTime::now(),
                peer,
                index,
            })
            .publish(&self.event_publisher);
        }
    }
}

/// Answer a committed-proposal request from the ledger store. Runs on the dispatcher's thread:
/// the ledger is a thread-safe collaborator and no worker-owned state is touched.
pub(crate) fn serve_committed_proposal_request<L: LedgerStore>(
    config: &Arc<Config>,
    ledger: &Arc<L>,
    request: CommittedProposalRequest,
    respond: Responder,
    event_publisher: &Option<Sender<Event>>,
) {
    Event::ReceiveSyncRequest(ReceiveSyncRequestEvent {
        timestamp: SystemTime::now(),
        peer: request.generated_from,
        index: request.index,
    })
    .publish(event_publisher);

    let Some(local_index) = config.node_index() else {
        return;
    };
    let keypair = config.keypair().clone();
    let peer = request.generated_from;
    let publisher = event_publisher.clone();

    ledger.async_get_committed_proposals(
        request.index,
        request.offset,
        Box::new(move |proposals| {
            let count = proposals.len();
            let response = CommittedProposalResponse::new(&keypair, proposals, local_index);
            respond(encode(&response.into(), CODEC_VERSION));

            Event::SendSyncResponse(SendSyncResponseEvent {
                timestamp: SystemTime::now(),
                peer,
                proposal_count: count,
            })
            .publish(&publisher);
        }),
    );
}

/// Answer a prepared-proposal request from the cache. Runs on the worker thread, which owns the
/// cache.
pub(crate) fn serve_prepared_proposal_request(
    config: &Config,
    cache: &crate::cache::CacheProcessor,
    request: PreparedProposalRequest,
    respond: Responder,
    event_publisher: &Option<Sender<Event>>,
) {
    Event::ReceiveSyncRequest(ReceiveSyncRequestEvent {
        timestamp: SystemTime::now(),
        peer: request.generated_from,
        index: request.index,
    })
    .publish(event_publisher);

    let Some(local_index) = config.node_index() else {
        return;
    };
    let Some(proposal) = cache.precommitted_proposal_by_hash(&request.hash) else {
        log::debug!(
            "LogSync: no precommitted proposal with payload for prepared-proposal request at index {}",
            request.index
        );
        return;
    };

    let peer = request.generated_from;
    let response = PreparedProposalResponse::new(config.keypair(), proposal, local_index);
    respond(encode(&response.into(), CODEC_VERSION));

    Event::SendSyncResponse(SendSyncResponseEvent {
        timestamp: SystemTime::now(),
        peer,
        proposal_count: 1,
    })
    .publish(event_publisher);
}

/// Send an encoded frame to the consensus node with index `peer`.
fn send_to_peer<F: FrontService>(config: &Config, front: &F, peer: NodeIndex, data: Vec<u8>) {
    let nodes = config.consensus_nodes();
    let Some(node) = nodes.get_by_index(peer) else {
        log::debug!("LogSync: peer index {} is not in the consensus-node list", peer);
        return;
    };
    front.async_send_message_by_node_ids(ModuleId::PBFT, &[node.node_id], data);
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use rand_core::OsRng;

    use super::*;
    use crate::pluggables::MessageDispatcher;
    use crate::types::{
        crypto_primitives::{Keypair, SigningKey, VerifyingKey},
        data_types::Weight,
        proposal::Proposal,
        validator_set::{ConsensusNode, ConsensusNodeSet},
    };

    /// A front service that records every send it is asked to perform.
    #[derive(Clone)]
    struct RecordingFront {
        sent: Arc<Mutex<Vec<(Vec<VerifyingKey>, Vec<u8>)>>>,
    }

    impl FrontService for RecordingFront {
        fn register_message_dispatcher(&mut self, _: ModuleId, _: MessageDispatcher) {}

        fn async_send_message_by_node_ids(
            &self,
            _: ModuleId,
            node_ids: &[VerifyingKey],
            data: Vec<u8>,
        ) {
            self.sent.lock().unwrap().push((node_ids.to_vec(), data));
        }
    }

    fn four_node_config() -> Config {
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
        Config::new(
            Keypair::new(keys[0].clone()),
            nodes,
            Proposal::genesis(),
            Duration::from_secs(3),
            100,
        )
    }

    fn payload_less_pre_prepare(config: &Config, payload: &[u8]) -> PrePrepare {
        let full = Proposal::new(SequenceNumber::new(1), sha256(payload), payload.to_vec());
        PrePrepare::new(
            config.keypair(),
            crate::types::data_types::ViewNumber::new(1),
            NodeIndex::new(0),
            full.without_data(),
        )
    }

    #[test]
    fn fill_completes_a_pending_fetch_exactly_once() {
        let config = four_node_config();
        let front = RecordingFront {
            sent: Arc::new(Mutex::new(Vec::new())),
        };
        let mut log_sync = LogSync::new(Duration::from_millis(100), 3, None);

        let pre_prepare = payload_less_pre_prepare(&config, b"fetched");
        log_sync.request_precommit_data(&config, &front, pre_prepare.clone(), NodeIndex::new(1));
        assert_eq!(front.sent.lock().unwrap().len(), 1);

        let response = PreparedProposalResponse::new(
            config.keypair(),
            Proposal::new(SequenceNumber::new(1), sha256(b"fetched"), b"fetched".to_vec()),
            NodeIndex::new(1),
        );
        let filled = log_sync.on_prepared_proposal_response(response.clone()).unwrap();
        assert_eq!(filled.proposal.data, b"fetched".to_vec());

        // The pending entry is gone: a replayed response is dropped.
        assert!(log_sync.on_prepared_proposal_response(response).is_none());
    }

    #[test]
    fn responses_with_wrong_payload_are_dropped() {
        let config = four_node_config();
        let front = RecordingFront {
            sent: Arc::new(Mutex::new(Vec::new())),
        };
        let mut log_sync = LogSync::new(Duration::from_millis(100), 3, None);

        let pre_prepare = payload_less_pre_prepare(&config, b"expected");
        let expected_hash = pre_prepare.proposal.hash;
        log_sync.request_precommit_data(&config, &front, pre_prepare, NodeIndex::new(1));

        // A Byzantine responder echoes the right hash with the wrong bytes.
        let mut forged = Proposal::new(SequenceNumber::new(1), expected_hash, b"forged".to_vec());
        forged.hash = expected_hash;
        let response = PreparedProposalResponse::new(config.keypair(), forged, NodeIndex::new(1));
        assert!(log_sync.on_prepared_proposal_response(response).is_none());
    }

    #[test]
    fn timed_out_fetches_rotate_peers_then_give_up() {
        let config = four_node_config();
        let front = RecordingFront {
            sent: Arc::new(Mutex::new(Vec::new())),
        };
        let mut log_sync = LogSync::new(Duration::from_millis(10), 2, None);

        let pre_prepare = payload_less_pre_prepare(&config, b"slow");
        log_sync.request_precommit_data(&config, &front, pre_prepare, NodeIndex::new(1));

        let far_future = Instant::now() + Duration::from_secs(10);
        log_sync.tick(far_future, &config, &front); // retry 1, peer rotates to 2
        log_sync.tick(far_future + Duration::from_secs(10), &config, &front); // retry 2, peer 3
        log_sync.tick(far_future + Duration::from_secs(20), &config, &front); // exhausted

        let sent = front.sent.lock().unwrap();
        // Initial send plus two retries; the third tick drops the fetch.
        assert_eq!(sent.len(), 3);
        assert!(log_sync.pending.is_empty());

        // The retries went to different peers, never to ourselves (node 0).
        let nodes = config.consensus_nodes();
        let peer_of = |send: &(Vec<VerifyingKey>, Vec<u8>)| {
            nodes.get_by_id(&send.0[0]).unwrap().index.int()
        };
        assert_eq!(peer_of(&sent[0]), 1);
        assert_eq!(peer_of(&sent[1]), 2);
        assert_eq!(peer_of(&sent[2]), 3);
    }
}
