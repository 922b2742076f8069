/*
    Copyright © 2026, The pbft_rs Authors
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Aggregation of protocol evidence and detection of phase transitions.
//!
//! The [`CacheProcessor`] keeps one [`CacheEntry`] per (sequence number, view) it has seen
//! evidence for, plus a per-view cache of view-change messages. The engine is the only mutator.
//!
//! Per entry, the state machine is `Idle -> HavePrePrepare -> Prepared -> Committed`:
//! - `Idle -> HavePrePrepare` on a valid pre-prepare.
//! - `HavePrePrepare -> Prepared` (the entry becomes *precommitted*) when a quorum weight of
//!   prepares matches the pre-prepare's hash.
//! - `Prepared -> Committed` when a quorum weight of commits matches on an already-precommitted
//!   entry. `Committed` is terminal for the (sequence number, view).
//!
//! The cache holds no reference back to the engine. Quorum checks *return* what should happen
//! next (commits to broadcast, proposals ready for the ledger, an assembled new-view), and the
//! engine, which owns the cache, performs the effects.

use std::collections::{BTreeMap, HashMap};

use crate::config::Config;
use crate::messages::{
    Commit, NewView, PrePrepare, PrePrepareSummary, Prepare, ViewChange,
};
use crate::types::{
    crypto_primitives::empty_hash,
    data_types::{CryptoHash, NodeIndex, SequenceNumber, TotalWeight, ViewNumber},
    proposal::Proposal,
};

/// Evidence accumulated for a single (sequence number, view).
#[derive(Default)]
pub(crate) struct CacheEntry {
    pre_prepare: Option<PrePrepare>,
    prepares: HashMap<NodeIndex, Prepare>,
    commits: HashMap<NodeIndex, Commit>,
    precommitted: bool,
    committed: bool,
}

impl CacheEntry {
    /// Sum the weights of the cached prepares whose hash matches `hash`, under `config`'s current
    /// node-list snapshot.
    fn matching_prepare_weight(&self, config: &Config, hash: &CryptoHash) -> TotalWeight {
        let nodes = config.consensus_nodes();
        let mut weight = TotalWeight::new(0);
        for prepare in self.prepares.values() {
            if &prepare.proposal_hash == hash {
                if let Some(node) = nodes.get_by_index(prepare.generated_from) {
                    weight += node.weight;
                }
            }
        }
        weight
    }

    /// Sum the weights of the cached commits whose hash matches `hash`.
    fn matching_commit_weight(&self, config: &Config, hash: &CryptoHash) -> TotalWeight {
        let nodes = config.consensus_nodes();
        let mut weight = TotalWeight::new(0);
        for commit in self.commits.values() {
            if &commit.proposal_hash == hash {
                if let Some(node) = nodes.get_by_index(commit.generated_from) {
                    weight += node.weight;
                }
            }
        }
        weight
    }
}

pub(crate) struct CacheProcessor {
    /// Evidence per sequence number, then per view.
    caches: BTreeMap<SequenceNumber, BTreeMap<ViewNumber, CacheEntry>>,

    /// View-change messages per target view, deduplicated by sender.
    view_change_cache: BTreeMap<ViewNumber, HashMap<NodeIndex, ViewChange>>,
}

impl CacheProcessor {
    pub(crate) fn new() -> Self {
        Self {
            caches: BTreeMap::new(),
            view_change_cache: BTreeMap::new(),
        }
    }

    fn entry(&mut self, index: SequenceNumber, view: ViewNumber) -> &mut CacheEntry {
        self.caches
            .entry(index)
            .or_default()
            .entry(view)
            .or_default()
    }

    fn get(&self, index: SequenceNumber, view: ViewNumber) -> Option<&CacheEntry> {
        self.caches.get(&index).and_then(|views| views.get(&view))
    }

    /// Check whether the entry for `(m.index, m.view)` already holds a pre-prepare with a
    /// matching hash.
    pub(crate) fn exist_pre_prepare(&self, m: &PrePrepare) -> bool {
        self.get(m.index, m.view)
            .and_then(|entry| entry.pre_prepare.as_ref())
            .is_some_and(|cached| cached.proposal.hash == m.proposal.hash)
    }

    /// Check whether any precommitted entry at `m.index` with a view below `m.view` carries a
    /// different hash than `m`. Accepting such a pre-prepare would let a new leader overwrite a
    /// proposal the replica already holds a prepared certificate for.
    pub(crate) fn conflict_with_precommit_req(&self, m: &PrePrepare) -> bool {
        let Some(views) = self.caches.get(&m.index) else {
            return false;
        };
        views.iter().any(|(view, entry)| {
            *view < m.view
                && entry.precommitted
                && entry
                    .pre_prepare
                    .as_ref()
                    .is_some_and(|cached| cached.proposal.hash != m.proposal.hash)
        })
    }

    /// Check whether the stored pre-prepare for `(index, view)` carries a different hash than
    /// `hash`.
    pub(crate) fn conflict_with_processed_req(
        &self,
        index: SequenceNumber,
        view: ViewNumber,
        hash: &CryptoHash,
    ) -> bool {
        self.get(index, view)
            .and_then(|entry| entry.pre_prepare.as_ref())
            .is_some_and(|cached| &cached.proposal.hash != hash)
    }

    /// Whether a pre-prepare is cached at all for `(index, view)`.
    pub(crate) fn has_pre_prepare(&self, index: SequenceNumber, view: ViewNumber) -> bool {
        self.get(index, view)
            .is_some_and(|entry| entry.pre_prepare.is_some())
    }

    /// Insert a pre-prepare. Idempotent: an entry keeps the first pre-prepare it was given.
    pub(crate) fn add_pre_prepare_cache(&mut self, m: PrePrepare) {
        let entry = self.entry(m.index, m.view);
        if entry.pre_prepare.is_none() {
            entry.pre_prepare = Some(m);
        }
    }

    /// Insert a prepare, keyed by sender. A second prepare from the same sender at the same
    /// (sequence number, view) is a duplicate and is ignored.
    pub(crate) fn add_prepare_cache(&mut self, m: Prepare) {
        self.entry(m.index, m.view)
            .prepares
            .entry(m.generated_from)
            .or_insert(m);
    }

    /// Insert a commit, keyed by sender. Duplicates from the same sender are ignored.
    pub(crate) fn add_commit_cache(&mut self, m: Commit) {
        self.entry(m.index, m.view)
            .commits
            .entry(m.generated_from)
            .or_insert(m);
    }

    /// Scan entries that lack a precommit certificate. An entry whose pre-prepare has gathered a
    /// quorum weight of matching prepares becomes precommitted; a locally signed commit is built
    /// for it, cached, and returned for broadcast.
    pub(crate) fn check_and_pre_commit(&mut self, config: &Config) -> Vec<Commit> {
        let Some(local_index) = config.node_index() else {
            return Vec::new();
        };
        let quorum = config.quorum();
        let mut out = Vec::new();

        for views in self.caches.values_mut() {
            for entry in views.values_mut() {
                if entry.precommitted {
                    continue;
                }
                let Some(pre_prepare) = entry.pre_prepare.as_ref() else {
                    continue;
                };
                let hash = pre_prepare.proposal.hash;
                if entry.matching_prepare_weight(config, &hash) >= quorum {
                    entry.precommitted = true;
                    let commit = Commit::new(
                        config.keypair(),
                        pre_prepare.view,
                        pre_prepare.index,
                        local_index,
                        hash,
                    );
                    entry.commits.entry(local_index).or_insert(commit.clone());
                    out.push(commit);
                }
            }
        }
        out
    }

    /// Scan precommitted entries. An entry that has gathered a quorum weight of matching commits
    /// becomes committed; its proposal, carrying the proposal signatures collected from the
    /// commit certificate, is returned so the engine can hand it to the ledger store and advance
    /// the watermarks.
    ///
    /// Replaying a duplicate commit cannot re-trigger this: a committed entry is never returned
    /// twice.
    pub(crate) fn check_and_commit(&mut self, config: &Config) -> Vec<Proposal> {
        let quorum = config.quorum();
        let mut out = Vec::new();

        for views in self.caches.values_mut() {
            for entry in views.values_mut() {
                if !entry.precommitted || entry.committed {
                    continue;
                }
                let Some(pre_prepare) = entry.pre_prepare.as_ref() else {
                    continue;
                };
                let hash = pre_prepare.proposal.hash;
                if entry.matching_commit_weight(config, &hash) >= quorum {
                    entry.committed = true;
                    let mut proposal = pre_prepare.proposal.clone();
                    proposal.signatures = entry
                        .commits
                        .values()
                        .filter(|commit| commit.proposal_hash == hash)
                        .map(|commit| (commit.generated_from, commit.proposal_signature))
                        .collect();
                    out.push(proposal);
                }
            }
        }
        out.sort_by_key(|proposal| proposal.index);
        out
    }

    /// Insert a view-change message into the cache for its target view, keyed by sender.
    /// Duplicates from the same sender are ignored.
    pub(crate) fn add_view_change_req(&mut self, m: ViewChange) {
        self.view_change_cache
            .entry(m.view)
            .or_default()
            .entry(m.generated_from)
            .or_insert(m);
    }

    /// Try to close the pending view change.
    ///
    /// Returns an assembled [`NewView`] when the local node is the leader the rotation expects
    /// after the change AND the view-change cache for `to_view` holds at least a quorum weight of
    /// entries. The assembled message carries:
    /// 1. The union of received view-change messages, and
    /// 2. For each sequence number between the committed index (exclusive) and the highest
    ///    prepared index (inclusive): the pre-prepare with the highest view appearing in any
    ///    prepared set, refilled with payload from the local cache where possible, or an
    ///    empty-proposal pre-prepare when no prepared evidence exists.
    pub(crate) fn check_and_try_into_new_view(&mut self, config: &Config) -> Option<NewView> {
        let local_index = config.node_index()?;
        if config.leader_after_view_change() != local_index {
            return None;
        }

        let to_view = config.to_view();
        let collected = self.view_change_cache.get(&to_view)?;

        let nodes = config.consensus_nodes();
        let mut weight = TotalWeight::new(0);
        for node_index in collected.keys() {
            if let Some(node) = nodes.get_by_index(*node_index) {
                weight += node.weight;
            }
        }
        if weight < config.quorum() {
            return None;
        }

        let view_changes: Vec<ViewChange> = collected.values().cloned().collect();

        // The reconstruction window starts above the highest committed index any view change
        // reports (or the local one, whichever is higher) and ends at the highest prepared index.
        let committed_index = view_changes
            .iter()
            .map(|vc| vc.committed_proposal.index)
            .chain(std::iter::once(config.committed_proposal().index))
            .max()
            .expect("the iterator contains at least the local committed index");
        let max_prepared_index = view_changes
            .iter()
            .flat_map(|vc| vc.prepared_proposals.iter())
            .map(|summary| summary.index)
            .max();

        let mut pre_prepares = Vec::new();
        if let Some(max_prepared_index) = max_prepared_index {
            let mut index = committed_index + 1;
            while index <= max_prepared_index {
                let best = view_changes
                    .iter()
                    .flat_map(|vc| vc.prepared_proposals.iter())
                    .filter(|summary| summary.index == index)
                    .max_by_key(|summary| summary.view);

                let proposal = match best {
                    Some(summary) => self
                        .proposal_with_data(summary.index, &summary.hash)
                        .unwrap_or(Proposal {
                            index: summary.index,
                            hash: summary.hash,
                            data: Vec::new(),
                            signatures: Vec::new(),
                        }),
                    None => Proposal::empty(index),
                };

                pre_prepares.push(PrePrepare::new(
                    config.keypair(),
                    to_view,
                    local_index,
                    proposal,
                ));
                index = index + 1;
            }
        }

        Some(NewView::new(
            config.keypair(),
            to_view,
            local_index,
            view_changes,
            pre_prepares,
        ))
    }

    /// Verify that a prepared-proposal summary from view-change evidence is consistent with the
    /// local prepared certificate at its sequence number: a precommitted entry at the same
    /// (sequence number, view) must carry the same hash.
    pub(crate) fn check_precommit_msg(&self, summary: &PrePrepareSummary) -> bool {
        match self.get(summary.index, summary.view) {
            Some(entry) if entry.precommitted => entry
                .pre_prepare
                .as_ref()
                .is_some_and(|cached| cached.proposal.hash == summary.hash),
            _ => true,
        }
    }

    /// If the local cache holds the full payload for `m`'s proposal hash, splice it in and return
    /// true.
    pub(crate) fn try_to_fill_proposal(&self, m: &mut PrePrepare) -> bool {
        if m.proposal.hash == empty_hash() {
            return true;
        }
        if m.proposal.has_data() {
            return true;
        }
        match self.proposal_with_data(m.index, &m.proposal.hash) {
            Some(proposal) => {
                m.proposal.data = proposal.data;
                true
            }
            None => false,
        }
    }

    /// Find a cached proposal with payload for `(index, hash)`, searching entries at `index`
    /// across views.
    pub(crate) fn proposal_with_data(
        &self,
        index: SequenceNumber,
        hash: &CryptoHash,
    ) -> Option<Proposal> {
        let views = self.caches.get(&index)?;
        views
            .values()
            .filter_map(|entry| entry.pre_prepare.as_ref())
            .map(|pre_prepare| &pre_prepare.proposal)
            .find(|proposal| &proposal.hash == hash && proposal.has_data())
            .cloned()
    }

    /// Find a precommitted proposal with payload by hash, for answering prepared-proposal
    /// requests.
    pub(crate) fn precommitted_proposal_by_hash(&self, hash: &CryptoHash) -> Option<Proposal> {
        self.caches
            .values()
            .flat_map(|views| views.values())
            .filter(|entry| entry.precommitted)
            .filter_map(|entry| entry.pre_prepare.as_ref())
            .map(|pre_prepare| &pre_prepare.proposal)
            .find(|proposal| &proposal.hash == hash && proposal.has_data())
            .cloned()
    }

    /// Snapshot of all precommitted-but-uncommitted entries with payloads stripped. This is the
    /// prepared evidence a view change carries.
    pub(crate) fn pre_commit_caches_without_data(&self) -> Vec<PrePrepareSummary> {
        self.caches
            .values()
            .flat_map(|views| views.values())
            .filter(|entry| entry.precommitted && !entry.committed)
            .filter_map(|entry| entry.pre_prepare.as_ref())
            .map(PrePrepareSummary::from)
            .collect()
    }

    /// Drop view-change cache entries for target views at or below `current_view`.
    pub(crate) fn remove_invalid_view_change(&mut self, current_view: ViewNumber) {
        self.view_change_cache = self.view_change_cache.split_off(&(current_view + 1));
    }

    /// Remove entries with `index < progressed_index - retain_window` and view-change entries for
    /// views at or below the current view.
    pub(crate) fn clear_expired_cache(
        &mut self,
        progressed_index: SequenceNumber,
        retain_window: u64,
        current_view: ViewNumber,
    ) {
        let cutoff = progressed_index - retain_window;
        self.caches = self.caches.split_off(&cutoff);
        self.remove_invalid_view_change(current_view);
    }
}
