/*
    Copyright © 2026, The pbft_rs Authors
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The state machine driver: decodes, dispatches, enforces state transitions, drives timeouts and
//! broadcasts.
//!
//! ## Worker loop
//!
//! The engine runs one dedicated worker thread. Every iteration it: (1) pops one item from the
//! inbound queue with a bounded wait, (2) dispatches it by packet type, (3) drives the
//! view-change timer and pending log-sync fetches, and (4) sweeps expired cache entries.
//!
//! The inbound queue is the only cross-thread entry point. Everything that must touch consensus
//! state (inbound frames, submitted proposals, new-block notifications, proposal-verification
//! results) enters as an [`Inbound`] item and is processed on the worker thread, which owns the
//! [`CacheProcessor`], the timer, and the log-sync client state exclusively. Exclusive ownership
//! is what serializes state transitions: there is no lock to forget to take. A callback that
//! fires after the engine has stopped finds the queue closed and is dropped silently.
//!
//! ## Validation gates
//!
//! Prepares and commits share one gate: the index must fall inside the watermark window, the view
//! must not be stale, self-generated messages are rejected, hashes must not conflict with a
//! stored pre-prepare, and the signature must verify against the consensus-node table entry at
//! `generated_from`. Pre-prepares additionally require the sender to be the rotation leader for
//! their sequence number, unless they were reconstructed by a validated new-view message, whose
//! aggregate proof has already been checked.
//!
//! All validation paths return a [`Result`]; the worker matches once at the top and logs/continues
//! on failure, so no malformed frame can kill the loop.

use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime};

use crate::cache::CacheProcessor;
use crate::codec::{self, CodecError, CODEC_VERSION};
use crate::config::Config;
use crate::events::*;
use crate::log_sync::{
    serve_committed_proposal_request, serve_prepared_proposal_request, LogSync,
};
use crate::messages::{
    Commit, NewView, PbftMessage, PrePrepare, Prepare, SignedMessage, ViewChange,
};
use crate::pluggables::{
    FrontService, LedgerConfig, LedgerStore, ModuleId, ProposalValidator, Responder, StorageError,
    ValidatorError,
};
use crate::types::{
    crypto_primitives::{empty_hash, sha256, VerifyingKey},
    data_types::{CryptoHash, NodeIndex, SequenceNumber, ViewNumber},
    proposal::Proposal,
    validator_set::ConsensusNodeSet,
};

/// Bounded wait on the inbound queue per worker iteration.
const POP_WAIT: Duration = Duration::from_millis(100);

/// The different ways handling a protocol message can fail.
///
/// Protocol-layer errors are absorbed locally: they are logged and the offending message is
/// dropped. Only [`NotConsensusNode`](ProtocolError::NotConsensusNode) and
/// [`Storage`](ProtocolError::Storage) ever surface to the submitter.
#[derive(Debug)]
pub enum ProtocolError {
    /// The frame did not decode into a known message shape or version.
    MalformedMessage,
    /// The message signature does not verify against the sender's registered identity.
    BadSignature,
    /// The message's hash disagrees with evidence already accepted at its (sequence number,
    /// view).
    Conflict,
    /// The message's sequence number falls outside the watermark window.
    OutOfWindow,
    /// The message's view lies behind the replica's current view.
    StaleView,
    /// The local node is not part of the consensus-node set.
    NotConsensusNode,
    /// The message claims an origin that is not in the consensus-node table.
    UnknownSender,
    /// A message from this sender was already accepted at this (sequence number, view).
    DuplicateMessage,
    /// Proposal verification rejected the payload or failed outright.
    VerificationFailed,
    /// A log-sync fetch exhausted its retries.
    SyncTimeout,
    /// The ledger store failed.
    Storage(StorageError),
}

impl From<CodecError> for ProtocolError {
    fn from(_: CodecError) -> Self {
        ProtocolError::MalformedMessage
    }
}

impl From<StorageError> for ProtocolError {
    fn from(error: StorageError) -> Self {
        ProtocolError::Storage(error)
    }
}

/// Callback through which submitter-visible results are delivered.
pub type SubmitCallback = Box<dyn FnOnce(Result<(), ProtocolError>) + Send>;

/// Items that enter the worker through the inbound queue.
pub(crate) enum Inbound {
    /// A decoded inbound frame from the front service.
    Message {
        from: VerifyingKey,
        msg: PbftMessage,
        responder: Option<Responder>,
    },
    /// Completion of an asynchronous proposal verification.
    Verified {
        pre_prepare: PrePrepare,
        result: Result<bool, ValidatorError>,
    },
    /// A proposal submitted by the host node.
    Submit {
        data: Vec<u8>,
        index: SequenceNumber,
        hash: CryptoHash,
        on_submitted: SubmitCallback,
    },
    /// A new-block notification from the host node.
    NewBlock {
        ledger_config: LedgerConfig,
        on_recv: SubmitCallback,
    },
}

/// Tuning knobs for the engine, fixed at start. The base view-change timeout is not among them:
/// it comes from the ledger configuration, which remains its authority across reconfigurations.
pub struct EngineOptions {
    /// Width of the admissible index window `[progressed_index, high_water_mark)`.
    pub watermark_window: u64,
    /// How many sequence numbers below `progressed_index` the cache retains before sweeping.
    pub retain_window: u64,
    /// Deadline for a single log-sync fetch attempt.
    pub sync_timeout: Duration,
    /// How many times a log-sync fetch is retried against rotating peers.
    pub sync_retries: u32,
    /// How many times a failed ledger write is retried before progress halts.
    pub commit_retries: u32,
    /// Whether pre-prepare proposals are verified through the proposal validator before being
    /// accepted.
    pub need_verify_proposal: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            watermark_window: 100,
            retain_window: 50,
            sync_timeout: Duration::from_secs(1),
            sync_retries: 3,
            commit_retries: 3,
            need_verify_proposal: true,
        }
    }
}

pub(crate) struct Engine<F: FrontService, V: ProposalValidator, L: LedgerStore> {
    config: Arc<Config>,
    front: F,
    validator: Arc<V>,
    ledger: Arc<L>,
    cache: CacheProcessor,
    log_sync: LogSync,
    timer: crate::timer::ViewChangeTimer,
    inbound: Receiver<Inbound>,
    inbound_sender: Sender<Inbound>,
    shutdown: Receiver<()>,
    event_publisher: Option<Sender<Event>>,
    retain_window: u64,
    commit_retries: u32,
    need_verify_proposal: bool,
}

impl<F: FrontService, V: ProposalValidator, L: LedgerStore> Engine<F, V, L> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        config: Arc<Config>,
        front: F,
        validator: Arc<V>,
        ledger: Arc<L>,
        options: &EngineOptions,
        inbound: Receiver<Inbound>,
        inbound_sender: Sender<Inbound>,
        shutdown: Receiver<()>,
        event_publisher: Option<Sender<Event>>,
    ) -> Self {
        let log_sync = LogSync::new(
            options.sync_timeout,
            options.sync_retries,
            event_publisher.clone(),
        );
        let timer = crate::timer::ViewChangeTimer::new(config.consensus_timeout());
        Self {
            config,
            front,
            validator,
            ledger,
            cache: CacheProcessor::new(),
            log_sync,
            timer,
            inbound,
            inbound_sender,
            shutdown,
            event_publisher,
            retain_window: options.retain_window,
            commit_retries: options.commit_retries,
            need_verify_proposal: options.need_verify_proposal,
        }
    }

    /// Register the inbound dispatcher with the front service, warm the committed state from the
    /// ledger store, and start the worker thread.
    pub(crate) fn start(mut self) -> JoinHandle<()> {
        // Resume from the stable checkpoint: committed-but-unstable proposals recorded by a
        // previous run move the watermarks forward before any message is processed.
        match self
            .ledger
            .load_state(self.ledger.max_committed_proposal_index())
        {
            Ok(proposals) => {
                for proposal in proposals {
                    self.config.set_committed_proposal(proposal);
                }
            }
            Err(error) => {
                log::warn!("Engine: could not load state from the ledger store: {:?}", error)
            }
        }

        let dispatcher = self.make_dispatcher();
        self.front
            .register_message_dispatcher(ModuleId::PBFT, dispatcher);

        thread::spawn(move || loop {
            match self.shutdown.try_recv() {
                Ok(()) => return,
                Err(TryRecvError::Empty) => (),
                Err(TryRecvError::Disconnected) => {
                    panic!("Engine thread disconnected from main thread")
                }
            }

            match self.inbound.recv_timeout(POP_WAIT) {
                Ok(item) => self.handle_inbound(item),
                Err(RecvTimeoutError::Timeout) => (),
                Err(RecvTimeoutError::Disconnected) => return,
            }

            if self.config.is_consensus_node() && self.timer.expired(Instant::now()) {
                self.on_timeout();
            }
            self.log_sync.tick(Instant::now(), &self.config, &self.front);
            self.cache.clear_expired_cache(
                self.config.progressed_index(),
                self.retain_window,
                self.config.view(),
            );
        })
    }

    /// Build the dispatcher closure registered with the front service. Runs on the front's
    /// delivery thread: it early-rejects, decodes, answers committed-proposal requests straight
    /// from the (thread-safe) ledger store, and enqueues everything else for the worker.
    fn make_dispatcher(&self) -> crate::pluggables::MessageDispatcher {
        let sender = self.inbound_sender.clone();
        let config = self.config.clone();
        let ledger = self.ledger.clone();
        let event_publisher = self.event_publisher.clone();

        Box::new(move |delivery, from, data, responder| {
            if let Err(front_error) = delivery {
                log::debug!("Engine: dropping errored delivery: {}", front_error.detail);
                return;
            }
            if !config.is_consensus_node() {
                log::debug!("Engine: rejecting message, the local node is not a consensus node");
                return;
            }

            match codec::decode(&data) {
                Ok(PbftMessage::CommittedProposalRequest(request)) => {
                    let Some(responder) = responder else {
                        return;
                    };
                    serve_committed_proposal_request(
                        &config,
                        &ledger,
                        request,
                        responder,
                        &event_publisher,
                    );
                }
                Ok(msg) => {
                    let _ = sender.send(Inbound::Message {
                        from,
                        msg,
                        responder,
                    });
                }
                Err(error) => {
                    log::debug!("Engine: dropping undecodable frame: {:?}", error);
                }
            }
        })
    }

    fn handle_inbound(&mut self, item: Inbound) {
        match item {
            Inbound::Message {
                from: _,
                msg,
                responder,
            } => {
                let packet_type = msg.packet_type();
                let origin = msg.generated_from();
                if let Err(error) = self.handle_msg(msg, responder) {
                    log::debug!(
                        "Engine: dropping {:?} from node {}: {:?}",
                        packet_type,
                        origin,
                        error
                    );
                }
            }
            Inbound::Verified {
                pre_prepare,
                result,
            } => self.on_proposal_verified(pre_prepare, result),
            Inbound::Submit {
                data,
                index,
                hash,
                on_submitted,
            } => self.handle_submit(data, index, hash, on_submitted),
            Inbound::NewBlock {
                ledger_config,
                on_recv,
            } => self.handle_new_block(ledger_config, on_recv),
        }
    }

    /// Dispatch a decoded message by packet type. Every path returns a result; the caller logs
    /// and drops on failure.
    fn handle_msg(
        &mut self,
        msg: PbftMessage,
        responder: Option<Responder>,
    ) -> Result<(), ProtocolError> {
        match msg {
            PbftMessage::PrePrepare(m) => {
                self.handle_pre_prepare(m, self.need_verify_proposal, false)
            }
            PbftMessage::Prepare(m) => self.handle_prepare(m),
            PbftMessage::Commit(m) => self.handle_commit(m),
            PbftMessage::ViewChange(m) => self.handle_view_change(m),
            PbftMessage::NewView(m) => self.handle_new_view(m),
            PbftMessage::PreparedProposalRequest(request) => {
                let Some(responder) = responder else {
                    return Ok(());
                };
                serve_prepared_proposal_request(
                    &self.config,
                    &self.cache,
                    request,
                    responder,
                    &self.event_publisher,
                );
                Ok(())
            }
            PbftMessage::PreparedProposalResponse(response) => {
                match self.log_sync.on_prepared_proposal_response(response) {
                    Some(filled) => self.handle_pre_prepare(filled, false, true),
                    None => Ok(()),
                }
            }
            PbftMessage::CommittedProposalRequest(request) => {
                // Normally answered on the dispatcher thread; kept here for fronts that cannot
                // attach responders to their delivery path.
                let Some(responder) = responder else {
                    return Ok(());
                };
                serve_committed_proposal_request(
                    &self.config,
                    &self.ledger,
                    request,
                    responder,
                    &self.event_publisher,
                );
                Ok(())
            }
            PbftMessage::CommittedProposalResponse(response) => {
                self.handle_committed_proposals(response.proposals);
                Ok(())
            }
        }
    }

    /// Gate 1, shared by every three-phase message: watermark window and view freshness.
    fn check_pbft_msg_state(
        &self,
        index: SequenceNumber,
        view: ViewNumber,
    ) -> Result<(), ProtocolError> {
        if index < self.config.progressed_index() || index >= self.config.high_water_mark() {
            return Err(ProtocolError::OutOfWindow);
        }
        if view < self.config.view() {
            return Err(ProtocolError::StaleView);
        }
        Ok(())
    }

    /// Gate 4: verify the message signature against the consensus-node table entry at
    /// `generated_from`.
    fn check_signature<M: SignedMessage>(
        &self,
        generated_from: NodeIndex,
        msg: &M,
    ) -> Result<(), ProtocolError> {
        let nodes = self.config.consensus_nodes();
        let node = nodes
            .get_by_index(generated_from)
            .ok_or(ProtocolError::UnknownSender)?;
        if !msg.is_correct(&node.node_id) {
            return Err(ProtocolError::BadSignature);
        }
        Ok(())
    }

    /// The shared gate for prepares and commits.
    fn check_pbft_msg<M: SignedMessage>(
        &self,
        index: SequenceNumber,
        view: ViewNumber,
        hash: &CryptoHash,
        generated_from: NodeIndex,
        msg: &M,
    ) -> Result<(), ProtocolError> {
        self.check_pbft_msg_state(index, view)?;
        if Some(generated_from) == self.config.node_index() {
            return Err(ProtocolError::DuplicateMessage);
        }
        if self.cache.conflict_with_processed_req(index, view, hash) {
            return Err(ProtocolError::Conflict);
        }
        self.check_signature(generated_from, msg)
    }

    fn check_pre_prepare_msg(&self, m: &PrePrepare) -> Result<(), ProtocolError> {
        if self.cache.exist_pre_prepare(m) {
            return Err(ProtocolError::DuplicateMessage);
        }
        if self.cache.conflict_with_precommit_req(m) {
            return Err(ProtocolError::Conflict);
        }
        // At most one pre-prepare hash is accepted per (sequence number, view): a second
        // pre-prepare whose hash disagrees with the cached one must not reach the prepare
        // broadcast.
        if self
            .cache
            .conflict_with_processed_req(m.index, m.view, &m.proposal.hash)
        {
            return Err(ProtocolError::Conflict);
        }
        self.check_pbft_msg_state(m.index, m.view)
    }

    /// Handle a pre-prepare.
    ///
    /// `from_new_view` marks pre-prepares reconstructed by a validated new-view message: for
    /// these the leader and signature checks are skipped, since the new-view's aggregate quorum
    /// proof has already been verified.
    fn handle_pre_prepare(
        &mut self,
        m: PrePrepare,
        need_verify_proposal: bool,
        from_new_view: bool,
    ) -> Result<(), ProtocolError> {
        self.check_pre_prepare_msg(&m)?;

        if !from_new_view {
            // 1. The proposal must come from the rotation leader for its sequence number.
            if self.config.leader_index(m.index) != m.generated_from {
                log::debug!(
                    "Engine: pre-prepare for index {} from node {} who is not its leader",
                    m.index,
                    m.generated_from
                );
                return Ok(());
            }
            // 2. The signature must verify.
            self.check_signature(m.generated_from, &m)?;
        }

        // 3. A non-empty payload must match the advertised digest.
        if m.proposal.hash != empty_hash()
            && m.proposal.has_data()
            && sha256(&m.proposal.data) != m.proposal.hash
        {
            return Err(ProtocolError::Conflict);
        }

        // 4. If proposal verification is required, hand the payload to the validator; its result
        //    re-enters through the inbound queue and recurses here with verification off.
        if need_verify_proposal {
            let sender = self.inbound_sender.clone();
            let proposal = m.proposal.clone();
            self.validator.verify_proposal(
                self.config.node_id(),
                proposal,
                Box::new(move |result| {
                    let _ = sender.send(Inbound::Verified {
                        pre_prepare: m,
                        result,
                    });
                }),
            );
            return Ok(());
        }

        // 5. Accept: cache the pre-prepare, then prepare for the same (index, view, hash).
        Event::ReceivePrePrepare(ReceivePrePrepareEvent {
            timestamp: SystemTime::now(),
            origin: m.generated_from,
            pre_prepare: m.clone(),
        })
        .publish(&self.event_publisher);

        self.cache.add_pre_prepare_cache(m.clone());
        self.broadcast_prepare(&m)?;
        self.try_pre_commit();
        Ok(())
    }

    /// Completion of an asynchronous proposal verification. Failures and errors drop the
    /// pre-prepare silently (with a log line); success re-enters pre-prepare handling.
    fn on_proposal_verified(
        &mut self,
        pre_prepare: PrePrepare,
        result: Result<bool, ValidatorError>,
    ) {
        match result {
            Ok(true) => {
                if let Err(error) = self.handle_pre_prepare(pre_prepare, false, false) {
                    log::debug!("Engine: dropping verified pre-prepare: {:?}", error);
                }
            }
            Ok(false) => {
                log::warn!(
                    "Engine: proposal verification rejected pre-prepare for index {}",
                    pre_prepare.index
                );
            }
            Err(error) => {
                log::warn!(
                    "Engine: proposal verification errored for index {}: {}",
                    pre_prepare.index,
                    error.detail
                );
            }
        }
    }

    /// Build and sign a prepare matching `pre_prepare`, cache it, and broadcast it to the
    /// consensus nodes.
    fn broadcast_prepare(&mut self, pre_prepare: &PrePrepare) -> Result<(), ProtocolError> {
        let local_index = self
            .config
            .node_index()
            .ok_or(ProtocolError::NotConsensusNode)?;

        let prepare = Prepare::new(
            self.config.keypair(),
            pre_prepare.view,
            pre_prepare.index,
            local_index,
            pre_prepare.proposal.hash,
        );
        self.cache.add_prepare_cache(prepare.clone());
        self.broadcast(prepare.clone().into());

        Event::Prepare(PrepareEvent {
            timestamp: SystemTime::now(),
            prepare,
        })
        .publish(&self.event_publisher);
        Ok(())
    }

    fn handle_prepare(&mut self, m: Prepare) -> Result<(), ProtocolError> {
        self.check_pbft_msg(m.index, m.view, &m.proposal_hash, m.generated_from, &m)?;

        Event::ReceivePrepare(ReceivePrepareEvent {
            timestamp: SystemTime::now(),
            origin: m.generated_from,
            prepare: m.clone(),
        })
        .publish(&self.event_publisher);

        self.cache.add_prepare_cache(m);
        self.try_pre_commit();
        Ok(())
    }

    fn handle_commit(&mut self, m: Commit) -> Result<(), ProtocolError> {
        self.check_pbft_msg(m.index, m.view, &m.proposal_hash, m.generated_from, &m)?;

        Event::ReceiveCommit(ReceiveCommitEvent {
            timestamp: SystemTime::now(),
            origin: m.generated_from,
            commit: m.clone(),
        })
        .publish(&self.event_publisher);

        self.cache.add_commit_cache(m);
        self.try_commit();
        Ok(())
    }

    /// Run the precommit check; broadcast a commit for every entry that just gathered its
    /// certificate, then run the commit check (commits from faster peers may already be waiting).
    fn try_pre_commit(&mut self) {
        let commits = self.cache.check_and_pre_commit(&self.config);
        for commit in commits {
            Event::Precommit(PrecommitEvent {
                timestamp: SystemTime::now(),
                view: commit.view,
                index: commit.index,
                hash: commit.proposal_hash,
            })
            .publish(&self.event_publisher);

            self.broadcast(commit.clone().into());

            Event::Commit(CommitEvent {
                timestamp: SystemTime::now(),
                commit,
            })
            .publish(&self.event_publisher);
        }
        self.try_commit();
    }

    /// Hand every newly committed proposal to the ledger store, in sequence order, advancing the
    /// watermarks as each one lands.
    fn try_commit(&mut self) {
        let proposals = self.cache.check_and_commit(&self.config);
        for proposal in proposals {
            // Only the commit callback advances `progressed_index`; an entry committing out of
            // order waits for its predecessors, which log sync will recover if they never arrive.
            if proposal.index != self.config.progressed_index() {
                log::warn!(
                    "Engine: commit certificate for index {} arrived ahead of index {}",
                    proposal.index,
                    self.config.progressed_index()
                );
                continue;
            }
            self.commit_proposal(proposal);
        }
    }

    /// Durably record `proposal`, advance the stable checkpoint, and slide the watermark window.
    fn commit_proposal(&mut self, proposal: Proposal) {
        let index = proposal.index;
        let hash = proposal.hash;

        if !self.commit_with_retry(|| self.ledger.async_commit_proposal(proposal.clone())) {
            log::error!(
                "Engine: halting progress, committed proposal {} could not be recorded",
                index
            );
            return;
        }
        Event::CommitProposal(CommitProposalEvent {
            timestamp: SystemTime::now(),
            index,
            hash,
        })
        .publish(&self.event_publisher);

        if !self.commit_with_retry(|| self.ledger.async_commit_stable_checkpoint(proposal.clone())) {
            log::error!(
                "Engine: halting progress, stable checkpoint {} could not be recorded",
                index
            );
            return;
        }
        Event::StableCheckpoint(StableCheckpointEvent {
            timestamp: SystemTime::now(),
            index,
        })
        .publish(&self.event_publisher);

        self.config.set_committed_proposal(proposal);
        self.timer.reset_change_cycle(Instant::now());
    }

    /// Retry a ledger write with doubling back-off, up to `commit_retries` times.
    fn commit_with_retry(&self, op: impl Fn() -> Result<(), StorageError>) -> bool {
        let mut delay = Duration::from_millis(20);
        let mut retry_time = 0;
        loop {
            match op() {
                Ok(()) => return true,
                Err(error) => {
                    if retry_time >= self.commit_retries {
                        log::error!("Engine: ledger write failed permanently: {:?}", error);
                        return false;
                    }
                    log::warn!(
                        "Engine: ledger write failed (retry {}): {:?}",
                        retry_time,
                        error
                    );
                    thread::sleep(delay);
                    delay *= 2;
                    retry_time += 1;
                }
            }
        }
    }

    /// The view-change timer fired: move `to_view` forward, drop stale view-change evidence, and
    /// broadcast a view change.
    fn on_timeout(&mut self) {
        self.config.inc_to_view(1);
        self.timer.enter_next_change_cycle(Instant::now());
        self.cache.remove_invalid_view_change(self.config.view());

        Event::ViewTimeout(ViewTimeoutEvent {
            timestamp: SystemTime::now(),
            view: self.config.view(),
            to_view: self.config.to_view(),
        })
        .publish(&self.event_publisher);

        self.broadcast_view_change();
    }

    /// Broadcast a view change carrying the committed proposal and the precommitted evidence,
    /// then try to close the change locally (the local node might be the next leader, and its own
    /// view change might complete the quorum).
    fn broadcast_view_change(&mut self) {
        let Some(local_index) = self.config.node_index() else {
            return;
        };

        let view_change = ViewChange::new(
            self.config.keypair(),
            self.config.to_view(),
            local_index,
            self.config.committed_proposal(),
            self.cache.pre_commit_caches_without_data(),
        );
        self.broadcast(view_change.clone().into());

        Event::ViewChange(ViewChangeEvent {
            timestamp: SystemTime::now(),
            view_change: view_change.clone(),
        })
        .publish(&self.event_publisher);

        self.cache.add_view_change_req(view_change);
        self.try_into_new_view();
    }

    /// If the local node is the rotation leader and holds a quorum of view changes, assemble,
    /// broadcast, and apply a new-view message.
    fn try_into_new_view(&mut self) {
        let Some(new_view) = self.cache.check_and_try_into_new_view(&self.config) else {
            return;
        };
        self.broadcast(new_view.clone().into());

        Event::NewView(NewViewEvent {
            timestamp: SystemTime::now(),
            new_view: new_view.clone(),
        })
        .publish(&self.event_publisher);

        self.re_handle_pre_prepare_proposals(new_view);
    }

    /// Validity of a view-change message. A signature failure is a hard reject.
    fn is_valid_view_change_msg(&self, m: &ViewChange) -> Result<(), ProtocolError> {
        let local_committed = self.config.committed_proposal();
        if m.committed_proposal.index < local_committed.index {
            return Err(ProtocolError::OutOfWindow);
        }
        if m.view <= self.config.view() {
            return Err(ProtocolError::StaleView);
        }
        if m.committed_proposal.index == local_committed.index
            && m.committed_proposal.hash != local_committed.hash
        {
            return Err(ProtocolError::Conflict);
        }
        for summary in &m.prepared_proposals {
            if !self.cache.check_precommit_msg(summary) {
                return Err(ProtocolError::Conflict);
            }
        }
        self.check_signature(m.generated_from, m)
    }

    fn handle_view_change(&mut self, m: ViewChange) -> Result<(), ProtocolError> {
        self.is_valid_view_change_msg(&m)?;

        Event::ReceiveViewChange(ReceiveViewChangeEvent {
            timestamp: SystemTime::now(),
            origin: m.generated_from,
            view_change: m.clone(),
        })
        .publish(&self.event_publisher);

        // A peer whose committed proposal is ahead of ours has blocks we are missing; fetch them
        // while the view change plays out.
        let local_committed = self.config.committed_proposal().index;
        if m.committed_proposal.index > local_committed {
            let gap = m.committed_proposal.index.int() - local_committed.int();
            self.log_sync.request_committed_proposals(
                &self.config,
                &self.front,
                self.config.progressed_index(),
                gap,
                m.generated_from,
            );
        }

        self.cache.add_view_change_req(m);
        self.try_into_new_view();
        Ok(())
    }

    /// Validity of a new-view message: the sender must be the leader the rotation expects, the
    /// view must advance, every embedded view change must be valid, and the distinct senders'
    /// weight must reach quorum.
    fn is_valid_new_view_msg(&self, m: &NewView) -> Result<(), ProtocolError> {
        if m.generated_from != self.config.leader_after_view_change() {
            log::debug!(
                "Engine: new-view from node {}, expected leader {}",
                m.generated_from,
                self.config.leader_after_view_change()
            );
            return Err(ProtocolError::UnknownSender);
        }
        if m.view <= self.config.view() {
            return Err(ProtocolError::StaleView);
        }

        let nodes = self.config.consensus_nodes();
        let mut weight = crate::types::data_types::TotalWeight::new(0);
        let mut seen = std::collections::HashSet::new();
        for view_change in &m.view_changes {
            self.is_valid_view_change_msg(view_change)?;
            if seen.insert(view_change.generated_from) {
                if let Some(node) = nodes.get_by_index(view_change.generated_from) {
                    weight += node.weight;
                }
            }
        }
        if weight < self.config.quorum() {
            return Err(ProtocolError::Conflict);
        }

        self.check_signature(m.generated_from, m)
    }

    fn handle_new_view(&mut self, m: NewView) -> Result<(), ProtocolError> {
        self.is_valid_new_view_msg(&m)?;

        Event::ReceiveNewView(ReceiveNewViewEvent {
            timestamp: SystemTime::now(),
            origin: m.generated_from,
            new_view: m.clone(),
        })
        .publish(&self.event_publisher);

        self.re_handle_pre_prepare_proposals(m);
        Ok(())
    }

    /// Feed the pre-prepare list of a validated new-view message back through pre-prepare
    /// handling (with the leader check skipped), fetching missing payloads through log sync, then
    /// enter the new view.
    fn re_handle_pre_prepare_proposals(&mut self, new_view: NewView) {
        let new_view_number = new_view.view;
        let leader = new_view.generated_from;

        for mut pre_prepare in new_view.pre_prepares {
            // Empty-proposal markers go straight through.
            if pre_prepare.proposal.hash == empty_hash() {
                if let Err(error) = self.handle_pre_prepare(pre_prepare, false, true) {
                    log::debug!("Engine: dropping empty new-view pre-prepare: {:?}", error);
                }
                continue;
            }
            // Payload present or recoverable from the local cache.
            if self.cache.try_to_fill_proposal(&mut pre_prepare) {
                if let Err(error) = self.handle_pre_prepare(pre_prepare, false, true) {
                    log::debug!("Engine: dropping filled new-view pre-prepare: {:?}", error);
                }
                continue;
            }
            // Cache miss: fetch the payload from the new leader; the filled pre-prepare
            // re-enters through the inbound queue.
            self.log_sync.request_precommit_data(
                &self.config,
                &self.front,
                pre_prepare,
                leader,
            );
        }

        self.reach_new_view(new_view_number);
    }

    /// Enter `view`: reset the change cycle, set `view`, and point `to_view` at the next
    /// candidate view.
    fn reach_new_view(&mut self, view: ViewNumber) {
        self.timer.reset_change_cycle(Instant::now());
        self.config.set_view(view);
        self.config.inc_to_view(1);

        Event::StartView(StartViewEvent {
            timestamp: SystemTime::now(),
            view,
        })
        .publish(&self.event_publisher);
    }

    /// A proposal submitted by the host. When the local node is the rotation leader for `index`,
    /// construct a pre-prepare, broadcast it, and enter the three-phase flow locally.
    fn handle_submit(
        &mut self,
        data: Vec<u8>,
        index: SequenceNumber,
        hash: CryptoHash,
        on_submitted: SubmitCallback,
    ) {
        let Some(local_index) = self.config.node_index() else {
            on_submitted(Err(ProtocolError::NotConsensusNode));
            return;
        };
        if self.config.leader_index(index) != local_index {
            log::debug!(
                "Engine: dropping submission for index {}, the local node is not its leader",
                index
            );
            on_submitted(Ok(()));
            return;
        }

        let proposal = Proposal::new(index, hash, data);
        let pre_prepare = PrePrepare::new(
            self.config.keypair(),
            self.config.view(),
            local_index,
            proposal,
        );
        self.broadcast(pre_prepare.clone().into());

        Event::Propose(ProposeEvent {
            timestamp: SystemTime::now(),
            pre_prepare: pre_prepare.clone(),
        })
        .publish(&self.event_publisher);

        on_submitted(Ok(()));

        // The leader runs the same three-phase flow over its own proposal.
        if let Err(error) = self.handle_pre_prepare(pre_prepare, false, false) {
            log::debug!("Engine: local pre-prepare rejected: {:?}", error);
        }
    }

    /// A new-block notification: advance the committed proposal, apply the configuration, reset
    /// the view-change timer, and expire now-redundant cache entries.
    fn handle_new_block(&mut self, ledger_config: LedgerConfig, on_recv: SubmitCallback) {
        self.config
            .set_committed_proposal(ledger_config.committed_proposal);
        let nodes = ConsensusNodeSet::new(ledger_config.consensus_nodes);
        let node_count = nodes.len();
        self.config.set_consensus_nodes(nodes);
        self.config
            .set_consensus_timeout(ledger_config.consensus_timeout);
        self.timer
            .set_base(ledger_config.consensus_timeout, Instant::now());
        self.cache.clear_expired_cache(
            self.config.progressed_index(),
            self.retain_window,
            self.config.view(),
        );

        Event::UpdateConsensusNodeSet(UpdateConsensusNodeSetEvent {
            timestamp: SystemTime::now(),
            node_count,
        })
        .publish(&self.event_publisher);

        on_recv(Ok(()));
    }

    /// Committed proposals fetched from a peer: verify each one's signature quorum and replay
    /// them into the ledger in sequence order.
    fn handle_committed_proposals(&mut self, mut proposals: Vec<Proposal>) {
        proposals.sort_by_key(|proposal| proposal.index);
        for proposal in proposals {
            if proposal.index != self.config.progressed_index() {
                continue;
            }
            if !proposal_quorum_reached(&self.config, &proposal) {
                log::warn!(
                    "Engine: fetched committed proposal {} lacks a signature quorum",
                    proposal.index
                );
                break;
            }
            self.commit_proposal(proposal);
        }
    }

    /// Encode `msg` and fan it out to the current consensus nodes.
    fn broadcast(&self, msg: PbftMessage) {
        let data = codec::encode(&msg, CODEC_VERSION);
        let node_ids = self.config.consensus_nodes().node_id_list();
        self.front
            .async_send_message_by_node_ids(ModuleId::PBFT, &node_ids, data);
    }
}

/// Whether `proposal` carries a quorum weight of valid signatures over its digest from distinct
/// consensus nodes.
pub(crate) fn proposal_quorum_reached(config: &Config, proposal: &Proposal) -> bool {
    use crate::types::crypto_primitives::{Signature, Verifier};

    let nodes = config.consensus_nodes();
    let mut weight = crate::types::data_types::TotalWeight::new(0);
    let mut seen = std::collections::HashSet::new();
    for (node_index, signature_bytes) in &proposal.signatures {
        if !seen.insert(*node_index) {
            continue;
        }
        let Some(node) = nodes.get_by_index(*node_index) else {
            continue;
        };
        let signature = Signature::from_bytes(&signature_bytes.bytes());
        if node
            .node_id
            .verify(&proposal.hash.bytes(), &signature)
            .is_ok()
        {
            weight += node.weight;
        }
    }
    weight >= config.quorum()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use rand_core::OsRng;

    use super::*;
    use crate::types::{
        crypto_primitives::{Keypair, SigningKey},
        data_types::Weight,
        validator_set::ConsensusNode,
    };

    /// A front service that records every frame it is asked to send, so tests can assert what
    /// the engine put on the wire.
    #[derive(Clone)]
    struct RecordingFront {
        sent: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl FrontService for RecordingFront {
        fn register_message_dispatcher(
            &mut self,
            _: ModuleId,
            _: crate::pluggables::MessageDispatcher,
        ) {
        }
        fn async_send_message_by_node_ids(&self, _: ModuleId, _: &[VerifyingKey], data: Vec<u8>) {
            self.sent.lock().unwrap().push(data);
        }
    }

    struct NullValidator;

    impl ProposalValidator for NullValidator {
        fn verify_proposal(
            &self,
            _: VerifyingKey,
            _: Proposal,
            callback: crate::pluggables::VerifyProposalCallback,
        ) {
            callback(Ok(true))
        }
    }

    struct NullLedger {
        committed: Mutex<Vec<Proposal>>,
    }

    impl LedgerStore for NullLedger {
        fn load_state(&self, _: SequenceNumber) -> Result<Vec<Proposal>, StorageError> {
            Ok(Vec::new())
        }
        fn async_commit_proposal(&self, proposal: Proposal) -> Result<(), StorageError> {
            self.committed.lock().unwrap().push(proposal);
            Ok(())
        }
        fn async_commit_stable_checkpoint(&self, _: Proposal) -> Result<(), StorageError> {
            Ok(())
        }
        fn async_get_committed_proposals(
            &self,
            _: SequenceNumber,
            _: u64,
            on_success: Box<dyn FnOnce(Vec<Proposal>) + Send>,
        ) {
            on_success(Vec::new())
        }
        fn max_committed_proposal_index(&self) -> SequenceNumber {
            SequenceNumber::new(0)
        }
    }

    fn four_node_engine() -> (
        Engine<RecordingFront, NullValidator, NullLedger>,
        Vec<Keypair>,
        Arc<Mutex<Vec<Vec<u8>>>>,
    ) {
        let mut csprg = OsRng {};
        let keys: Vec<SigningKey> = (0..4).map(|_| SigningKey::generate(&mut csprg)).collect();
        let nodes = crate::types::validator_set::ConsensusNodeSet::new(
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
            keypairs[1].clone(),
            nodes,
            Proposal::genesis(),
            Duration::from_secs(3),
            100,
        ));
        let sent = Arc::new(Mutex::new(Vec::new()));
        let (inbound_sender, inbound) = std::sync::mpsc::channel();
        let (_shutdown_sender, shutdown) = std::sync::mpsc::channel();
        // _shutdown_sender is dropped: these tests drive the engine synchronously and never
        // start the worker thread.
        let engine = Engine::new(
            config,
            RecordingFront { sent: sent.clone() },
            Arc::new(NullValidator),
            Arc::new(NullLedger {
                committed: Mutex::new(Vec::new()),
            }),
            &EngineOptions {
                need_verify_proposal: false,
                ..EngineOptions::default()
            },
            inbound,
            inbound_sender,
            shutdown,
            None,
        );
        (engine, keypairs, sent)
    }

    fn proposal_at(index: u64, payload: &[u8]) -> Proposal {
        Proposal::new(SequenceNumber::new(index), sha256(payload), payload.to_vec())
    }

    #[test]
    fn out_of_window_messages_are_rejected_without_cache_mutation() {
        let (mut engine, keypairs, _sent) = four_node_engine();

        // Move the window to [100, 200).
        engine
            .config
            .set_committed_proposal(proposal_at(99, b"history"));
        assert_eq!(engine.config.progressed_index(), SequenceNumber::new(100));

        let stale = Prepare::new(
            &keypairs[2],
            ViewNumber::init(),
            SequenceNumber::new(99),
            NodeIndex::new(2),
            sha256(b"stale"),
        );
        match engine.handle_prepare(stale) {
            Err(ProtocolError::OutOfWindow) => (),
            other => panic!("expected OutOfWindow, got {:?}", other),
        }

        let beyond = Prepare::new(
            &keypairs[2],
            ViewNumber::init(),
            SequenceNumber::new(200),
            NodeIndex::new(2),
            sha256(b"beyond"),
        );
        match engine.handle_prepare(beyond) {
            Err(ProtocolError::OutOfWindow) => (),
            other => panic!("expected OutOfWindow, got {:?}", other),
        }
    }

    #[test]
    fn stale_views_and_self_messages_are_rejected() {
        let (mut engine, keypairs, _sent) = four_node_engine();
        engine.config.set_view(ViewNumber::new(2));

        let stale_view = Prepare::new(
            &keypairs[2],
            ViewNumber::new(1),
            SequenceNumber::new(1),
            NodeIndex::new(2),
            sha256(b"x"),
        );
        match engine.handle_prepare(stale_view) {
            Err(ProtocolError::StaleView) => (),
            other => panic!("expected StaleView, got {:?}", other),
        }

        // The local node is node 1: its own messages coming back are rejected.
        let own = Prepare::new(
            &keypairs[1],
            ViewNumber::new(2),
            SequenceNumber::new(1),
            NodeIndex::new(1),
            sha256(b"x"),
        );
        match engine.handle_prepare(own) {
            Err(ProtocolError::DuplicateMessage) => (),
            other => panic!("expected DuplicateMessage, got {:?}", other),
        }
    }

    #[test]
    fn forged_signatures_and_unknown_senders_are_rejected() {
        let (mut engine, keypairs, _sent) = four_node_engine();

        // Node 3's message signed with node 2's key.
        let forged = Prepare::new(
            &keypairs[2],
            ViewNumber::init(),
            SequenceNumber::new(1),
            NodeIndex::new(3),
            sha256(b"x"),
        );
        match engine.handle_prepare(forged) {
            Err(ProtocolError::BadSignature) => (),
            other => panic!("expected BadSignature, got {:?}", other),
        }

        let unknown = Prepare::new(
            &keypairs[2],
            ViewNumber::init(),
            SequenceNumber::new(1),
            NodeIndex::new(9),
            sha256(b"x"),
        );
        match engine.handle_prepare(unknown) {
            Err(ProtocolError::UnknownSender) => (),
            other => panic!("expected UnknownSender, got {:?}", other),
        }
    }

    #[test]
    fn pre_prepare_from_a_non_leader_is_dropped() {
        let (mut engine, keypairs, _sent) = four_node_engine();

        // At view 0 with committed index 0, index 1 is led by node 0. Node 2's pre-prepare must
        // not enter the cache.
        let from_wrong_leader = PrePrepare::new(
            &keypairs[2],
            ViewNumber::init(),
            NodeIndex::new(2),
            proposal_at(1, b"impostor"),
        );
        assert!(engine
            .handle_pre_prepare(from_wrong_leader.clone(), false, false)
            .is_ok());
        assert!(!engine.cache.exist_pre_prepare(&from_wrong_leader));
    }

    #[test]
    fn prepare_conflicting_with_the_cached_pre_prepare_is_rejected() {
        let (mut engine, keypairs, _sent) = four_node_engine();

        let honest = PrePrepare::new(
            &keypairs[0],
            ViewNumber::init(),
            NodeIndex::new(0),
            proposal_at(1, b"honest"),
        );
        engine.handle_pre_prepare(honest, false, false).unwrap();

        let conflicting = Prepare::new(
            &keypairs[2],
            ViewNumber::init(),
            SequenceNumber::new(1),
            NodeIndex::new(2),
            sha256(b"conflicting"),
        );
        match engine.handle_prepare(conflicting) {
            Err(ProtocolError::Conflict) => (),
            other => panic!("expected Conflict, got {:?}", other),
        }
    }

    #[test]
    fn equivocating_pre_prepare_is_rejected_and_not_prepared() {
        let (mut engine, keypairs, sent) = four_node_engine();

        let honest = PrePrepare::new(
            &keypairs[0],
            ViewNumber::init(),
            NodeIndex::new(0),
            proposal_at(1, b"honest"),
        );
        engine
            .handle_pre_prepare(honest.clone(), false, false)
            .unwrap();
        // Accepting the pre-prepare put exactly one prepare on the wire.
        assert_eq!(sent.lock().unwrap().len(), 1);

        // The leader equivocates: a second pre-prepare at the same (sequence number, view) with
        // a different payload hash.
        let equivocation = PrePrepare::new(
            &keypairs[0],
            ViewNumber::init(),
            NodeIndex::new(0),
            proposal_at(1, b"equivocation"),
        );
        match engine.handle_pre_prepare(equivocation.clone(), false, false) {
            Err(ProtocolError::Conflict) => (),
            other => panic!("expected Conflict, got {:?}", other),
        }

        // The cache still holds only the first hash, and no second prepare went out.
        assert!(engine.cache.exist_pre_prepare(&honest));
        assert!(!engine.cache.exist_pre_prepare(&equivocation));
        assert_eq!(sent.lock().unwrap().len(), 1);
    }

    #[test]
    fn full_three_phase_flow_commits_exactly_once() {
        let (mut engine, keypairs, _sent) = four_node_engine();

        let pre_prepare = PrePrepare::new(
            &keypairs[0],
            ViewNumber::init(),
            NodeIndex::new(0),
            proposal_at(1, b"block-one"),
        );
        engine
            .handle_pre_prepare(pre_prepare.clone(), false, false)
            .unwrap();

        // Prepares from nodes 0 and 2 (node 1's own prepare was cached on accept) complete the
        // precommit certificate.
        for sender in [0usize, 2] {
            let prepare = Prepare::new(
                &keypairs[sender],
                pre_prepare.view,
                pre_prepare.index,
                NodeIndex::new(sender as u32),
                pre_prepare.proposal.hash,
            );
            engine.handle_prepare(prepare).unwrap();
        }

        // Commits from nodes 0 and 2 (plus our own) complete the commit certificate.
        for sender in [0usize, 2] {
            let commit = Commit::new(
                &keypairs[sender],
                pre_prepare.view,
                pre_prepare.index,
                NodeIndex::new(sender as u32),
                pre_prepare.proposal.hash,
            );
            engine.handle_commit(commit).unwrap();
        }

        assert_eq!(engine.config.progressed_index(), SequenceNumber::new(2));
        assert_eq!(
            engine.config.committed_proposal().hash,
            pre_prepare.proposal.hash
        );
        let committed = engine.ledger.committed.lock().unwrap();
        assert_eq!(committed.len(), 1);
        // The stored proposal carries a verifiable signature quorum.
        assert!(proposal_quorum_reached(&engine.config, &committed[0]));

        // A replayed commit is a duplicate of a now-out-of-window index.
        drop(committed);
        let replay = Commit::new(
            &keypairs[0],
            pre_prepare.view,
            pre_prepare.index,
            NodeIndex::new(0),
            pre_prepare.proposal.hash,
        );
        assert!(matches!(
            engine.handle_commit(replay),
            Err(ProtocolError::OutOfWindow)
        ));
        assert_eq!(engine.config.progressed_index(), SequenceNumber::new(2));
    }

    #[test]
    fn valid_new_view_is_accepted_and_enters_the_view() {
        let (mut engine, keypairs, _sent) = four_node_engine();
        engine.config.inc_to_view(1);

        let view_changes: Vec<ViewChange> = [0usize, 2, 3]
            .iter()
            .map(|sender| {
                ViewChange::new(
                    &keypairs[*sender],
                    ViewNumber::new(1),
                    NodeIndex::new(*sender as u32),
                    Proposal::genesis(),
                    Vec::new(),
                )
            })
            .collect();

        let new_view = NewView::new(
            &keypairs[1],
            ViewNumber::new(1),
            NodeIndex::new(1),
            view_changes,
            Vec::new(),
        );
        engine.handle_new_view(new_view).unwrap();
        assert_eq!(engine.config.view(), ViewNumber::new(1));
        assert_eq!(engine.config.to_view(), ViewNumber::new(2));
    }

    #[test]
    fn new_view_without_quorum_or_from_wrong_leader_is_rejected() {
        let (mut engine, keypairs, _sent) = four_node_engine();
        engine.config.inc_to_view(1);

        let view_changes = |senders: &[usize]| -> Vec<ViewChange> {
            senders
                .iter()
                .map(|sender| {
                    ViewChange::new(
                        &keypairs[*sender],
                        ViewNumber::new(1),
                        NodeIndex::new(*sender as u32),
                        Proposal::genesis(),
                        Vec::new(),
                    )
                })
                .collect()
        };

        // Only two view changes: below quorum.
        let below_quorum = NewView::new(
            &keypairs[1],
            ViewNumber::new(1),
            NodeIndex::new(1),
            view_changes(&[0, 2]),
            Vec::new(),
        );
        assert!(matches!(
            engine.handle_new_view(below_quorum),
            Err(ProtocolError::Conflict)
        ));

        // Node 2 is not the leader for view 1.
        let wrong_leader = NewView::new(
            &keypairs[2],
            ViewNumber::new(1),
            NodeIndex::new(2),
            view_changes(&[0, 2, 3]),
            Vec::new(),
        );
        assert!(matches!(
            engine.handle_new_view(wrong_leader),
            Err(ProtocolError::UnknownSender)
        ));
        assert_eq!(engine.config.view(), ViewNumber::init());
    }

    #[test]
    fn prepared_evidence_is_carried_across_a_view_change() {
        let (mut engine, keypairs, _sent) = four_node_engine();

        // The local node (node 1) reaches Prepared on H1 at index 1 in view 0.
        let pre_prepare = PrePrepare::new(
            &keypairs[0],
            ViewNumber::init(),
            NodeIndex::new(0),
            proposal_at(1, b"carried-over"),
        );
        engine
            .handle_pre_prepare(pre_prepare.clone(), false, false)
            .unwrap();
        for sender in [0usize, 2] {
            let prepare = Prepare::new(
                &keypairs[sender],
                pre_prepare.view,
                pre_prepare.index,
                NodeIndex::new(sender as u32),
                pre_prepare.proposal.hash,
            );
            engine.handle_prepare(prepare).unwrap();
        }

        // The leader goes silent; the local timer fires, and view changes from the other nodes
        // carry the prepared evidence. Node 1 is the leader for view 1: the third view change
        // completes the quorum and it assembles the new view itself.
        engine.config.inc_to_view(1);
        let summary = crate::messages::PrePrepareSummary::from(&pre_prepare);
        for sender in [0usize, 2, 3] {
            let view_change = ViewChange::new(
                &keypairs[sender],
                ViewNumber::new(1),
                NodeIndex::new(sender as u32),
                Proposal::genesis(),
                vec![summary.clone()],
            );
            engine.handle_view_change(view_change).unwrap();
        }

        // The view advanced, and the prepared proposal was re-proposed at view 1 with its
        // payload refilled from the local cache.
        assert_eq!(engine.config.view(), ViewNumber::new(1));
        assert!(engine
            .cache
            .has_pre_prepare(SequenceNumber::new(1), ViewNumber::new(1)));
        let refilled = engine
            .cache
            .proposal_with_data(SequenceNumber::new(1), &pre_prepare.proposal.hash)
            .unwrap();
        assert_eq!(refilled.data, b"carried-over".to_vec());
    }

    #[test]
    fn view_change_with_conflicting_committed_proposal_is_rejected() {
        let (mut engine, keypairs, _sent) = four_node_engine();

        let mut forged_committed = Proposal::genesis();
        forged_committed.hash = sha256(b"not-the-genesis");
        let view_change = ViewChange::new(
            &keypairs[2],
            ViewNumber::new(1),
            NodeIndex::new(2),
            forged_committed,
            Vec::new(),
        );
        assert!(matches!(
            engine.handle_view_change(view_change),
            Err(ProtocolError::Conflict)
        ));
    }
}
