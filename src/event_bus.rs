/*
    Copyright © 2026, The pbft_rs Authors
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Thread that receives events emitted by the [engine](crate::engine) and passes them to event
//! handlers.
//!
//! When the thread receives a message containing an [event](crate::events::Event), it triggers
//! the execution of all handlers registered for the contained event type. Handlers for each event
//! type are stored in [`EventHandlers`]. When no handlers are registered at all, the thread is
//! not started.

use std::{
    sync::mpsc::{Receiver, TryRecvError},
    thread::{self, JoinHandle},
};

use crate::{events::*, logging::Logger};

/// Pointer to a handler closure, parametrised by the argument (for our use case, event) type.
pub type HandlerPtr<T> = Box<dyn Fn(&T) + Send>;

/// Stores the handlers registered for each pre-defined event type from [events](crate::events).
///
/// [`with_logging_defaults`](Self::with_logging_defaults) pre-populates every slot with the
/// default logging handler from [`logging`](crate::logging); hosts push their own handlers on top
/// before passing the struct to [`Pbft::start`](crate::pbft::Pbft::start).
pub struct EventHandlers {
    pub commit_proposal_handlers: Vec<HandlerPtr<CommitProposalEvent>>,
    pub stable_checkpoint_handlers: Vec<HandlerPtr<StableCheckpointEvent>>,
    pub update_consensus_node_set_handlers: Vec<HandlerPtr<UpdateConsensusNodeSetEvent>>,

    pub propose_handlers: Vec<HandlerPtr<ProposeEvent>>,
    pub prepare_handlers: Vec<HandlerPtr<PrepareEvent>>,
    pub commit_handlers: Vec<HandlerPtr<CommitEvent>>,
    pub view_change_handlers: Vec<HandlerPtr<ViewChangeEvent>>,
    pub new_view_handlers: Vec<HandlerPtr<NewViewEvent>>,

    pub receive_pre_prepare_handlers: Vec<HandlerPtr<ReceivePrePrepareEvent>>,
    pub receive_prepare_handlers: Vec<HandlerPtr<ReceivePrepareEvent>>,
    pub receive_commit_handlers: Vec<HandlerPtr<ReceiveCommitEvent>>,
    pub receive_view_change_handlers: Vec<HandlerPtr<ReceiveViewChangeEvent>>,
    pub receive_new_view_handlers: Vec<HandlerPtr<ReceiveNewViewEvent>>,

    pub precommit_handlers: Vec<HandlerPtr<PrecommitEvent>>,
    pub start_view_handlers: Vec<HandlerPtr<StartViewEvent>>,
    pub view_timeout_handlers: Vec<HandlerPtr<ViewTimeoutEvent>>,

    pub start_sync_handlers: Vec<HandlerPtr<StartSyncEvent>>,
    pub end_sync_handlers: Vec<HandlerPtr<EndSyncEvent>>,
    pub receive_sync_request_handlers: Vec<HandlerPtr<ReceiveSyncRequestEvent>>,
    pub send_sync_response_handlers: Vec<HandlerPtr<SendSyncResponseEvent>>,
}

impl EventHandlers {
    /// Create an `EventHandlers` with no handlers registered.
    pub fn new() -> Self {
        Self {
            commit_proposal_handlers: Vec::new(),
            stable_checkpoint_handlers: Vec::new(),
            update_consensus_node_set_handlers: Vec::new(),
            propose_handlers: Vec::new(),
            prepare_handlers: Vec::new(),
            commit_handlers: Vec::new(),
            view_change_handlers: Vec::new(),
            new_view_handlers: Vec::new(),
            receive_pre_prepare_handlers: Vec::new(),
            receive_prepare_handlers: Vec::new(),
            receive_commit_handlers: Vec::new(),
            receive_view_change_handlers: Vec::new(),
            receive_new_view_handlers: Vec::new(),
            precommit_handlers: Vec::new(),
            start_view_handlers: Vec::new(),
            view_timeout_handlers: Vec::new(),
            start_sync_handlers: Vec::new(),
            end_sync_handlers: Vec::new(),
            receive_sync_request_handlers: Vec::new(),
            send_sync_response_handlers: Vec::new(),
        }
    }

    /// Create an `EventHandlers` with the default logging handler registered for every event
    /// type.
    pub fn with_logging_defaults() -> Self {
        let mut handlers = Self::new();
        handlers.commit_proposal_handlers.push(CommitProposalEvent::get_logger());
        handlers.stable_checkpoint_handlers.push(StableCheckpointEvent::get_logger());
        handlers
            .update_consensus_node_set_handlers
            .push(UpdateConsensusNodeSetEvent::get_logger());
        handlers.propose_handlers.push(ProposeEvent::get_logger());
        handlers.prepare_handlers.push(PrepareEvent::get_logger());
        handlers.commit_handlers.push(CommitEvent::get_logger());
        handlers.view_change_handlers.push(ViewChangeEvent::get_logger());
        handlers.new_view_handlers.push(NewViewEvent::get_logger());
        handlers.receive_pre_prepare_handlers.push(ReceivePrePrepareEvent::get_logger());
        handlers.receive_prepare_handlers.push(ReceivePrepareEvent::get_logger());
        handlers.receive_commit_handlers.push(ReceiveCommitEvent::get_logger());
        handlers.receive_view_change_handlers.push(ReceiveViewChangeEvent::get_logger());
        handlers.receive_new_view_handlers.push(ReceiveNewViewEvent::get_logger());
        handlers.precommit_handlers.push(PrecommitEvent::get_logger());
        handlers.start_view_handlers.push(StartViewEvent::get_logger());
        handlers.view_timeout_handlers.push(ViewTimeoutEvent::get_logger());
        handlers.start_sync_handlers.push(StartSyncEvent::get_logger());
        handlers.end_sync_handlers.push(EndSyncEvent::get_logger());
        handlers.receive_sync_request_handlers.push(ReceiveSyncRequestEvent::get_logger());
        handlers.send_sync_response_handlers.push(SendSyncResponseEvent::get_logger());
        handlers
    }

    /// Whether no handlers are registered for any event type.
    pub fn is_empty(&self) -> bool {
        self.commit_proposal_handlers.is_empty()
            && self.stable_checkpoint_handlers.is_empty()
            && self.update_consensus_node_set_handlers.is_empty()
            && self.propose_handlers.is_empty()
            && self.prepare_handlers.is_empty()
            && self.commit_handlers.is_empty()
            && self.view_change_handlers.is_empty()
            && self.new_view_handlers.is_empty()
            && self.receive_pre_prepare_handlers.is_empty()
            && self.receive_prepare_handlers.is_empty()
            && self.receive_commit_handlers.is_empty()
            && self.receive_view_change_handlers.is_empty()
            && self.receive_new_view_handlers.is_empty()
            && self.precommit_handlers.is_empty()
            && self.start_view_handlers.is_empty()
            && self.view_timeout_handlers.is_empty()
            && self.start_sync_handlers.is_empty()
            && self.end_sync_handlers.is_empty()
            && self.receive_sync_request_handlers.is_empty()
            && self.send_sync_response_handlers.is_empty()
    }

    fn fire_handlers(&self, event: Event) {
        match event {
            Event::CommitProposal(e) => self.commit_proposal_handlers.iter().for_each(|h| h(&e)),
            Event::StableCheckpoint(e) => self.stable_checkpoint_handlers.iter().for_each(|h| h(&e)),
            Event::UpdateConsensusNodeSet(e) => {
                self.update_consensus_node_set_handlers.iter().for_each(|h| h(&e))
            }
            Event::Propose(e) => self.propose_handlers.iter().for_each(|h| h(&e)),
            Event::Prepare(e) => self.prepare_handlers.iter().for_each(|h| h(&e)),
            Event::Commit(e) => self.commit_handlers.iter().for_each(|h| h(&e)),
            Event::ViewChange(e) => self.view_change_handlers.iter().for_each(|h| h(&e)),
            Event::NewView(e) => self.new_view_handlers.iter().for_each(|h| h(&e)),
            Event::ReceivePrePrepare(e) => {
                self.receive_pre_prepare_handlers.iter().for_each(|h| h(&e))
            }
            Event::ReceivePrepare(e) => self.receive_prepare_handlers.iter().for_each(|h| h(&e)),
            Event::ReceiveCommit(e) => self.receive_commit_handlers.iter().for_each(|h| h(&e)),
            Event::ReceiveViewChange(e) => {
                self.receive_view_change_handlers.iter().for_each(|h| h(&e))
            }
            Event::ReceiveNewView(e) => self.receive_new_view_handlers.iter().for_each(|h| h(&e)),
            Event::Precommit(e) => self.precommit_handlers.iter().for_each(|h| h(&e)),
            Event::StartView(e) => self.start_view_handlers.iter().for_each(|h| h(&e)),
            Event::ViewTimeout(e) => self.view_timeout_handlers.iter().for_each(|h| h(&e)),
            Event::StartSync(e) => self.start_sync_handlers.iter().for_each(|h| h(&e)),
            Event::EndSync(e) => self.end_sync_handlers.iter().for_each(|h| h(&e)),
            Event::ReceiveSyncRequest(e) => {
                self.receive_sync_request_handlers.iter().for_each(|h| h(&e))
            }
            Event::SendSyncResponse(e) => {
                self.send_sync_response_handlers.iter().for_each(|h| h(&e))
            }
        }
    }
}

impl Default for EventHandlers {
    fn default() -> Self {
        EventHandlers::new()
    }
}

/// Spawn the event-bus thread.
pub(crate) fn start_event_bus(
    event_handlers: EventHandlers,
    event_subscriber: Receiver<Event>,
    shutdown_signal: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        match shutdown_signal.try_recv() {
            Ok(()) => return,
            Err(TryRecvError::Empty) => (),
            Err(TryRecvError::Disconnected) => {
                panic!("Event bus thread disconnected from main thread")
            }
        }

        if let Ok(event) = event_subscriber.try_recv() {
            event_handlers.fire_handlers(event);
        } else {
            thread::yield_now()
        }
    })
}
