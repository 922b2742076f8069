/*
    Copyright © 2026, The pbft_rs Authors
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A Practical Byzantine Fault Tolerance (PBFT) consensus engine for permissioned blockchain
//! nodes.
//!
//! pbft_rs drives a replicated state machine across a known set of consensus nodes, producing a
//! totally ordered sequence of committed proposals identical across all correct replicas,
//! assuming strictly less than one third of the total voting weight is Byzantine.
//!
//! The library implements the consensus core (message validation, the three-phase protocol of
//! pre-prepare, prepare, and commit, quorum-evidence aggregation, view change, and log
//! synchronization) and consumes everything else through pluggable traits: wire transport
//! ([`FrontService`](pluggables::FrontService)), payload validation
//! ([`ProposalValidator`](pluggables::ProposalValidator)), and durable storage
//! ([`LedgerStore`](pluggables::LedgerStore)).
//!
//! Hosts interact with the engine through the [`Pbft`](pbft::Pbft) handle: submit proposals,
//! query the view, relay consensus messages, check blocks for the sync module, and notify new
//! blocks.

pub mod types;

pub mod messages;

pub mod codec;

pub mod pluggables;

pub mod events;

pub mod event_bus;

pub mod engine;

pub mod pbft;

pub(crate) mod cache;

pub(crate) mod config;

pub mod logging;

pub(crate) mod log_sync;

pub(crate) mod timer;

// Re-exports
pub use engine::{EngineOptions, ProtocolError};
pub use pbft::Pbft;
