//! A hashmap-backed mock ledger store.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use pbft_rs::pluggables::{LedgerStore, StorageError};
use pbft_rs::types::{data_types::SequenceNumber, proposal::Proposal};

struct MemLedgerInner {
    committed: Mutex<BTreeMap<u64, Proposal>>,
    stable_index: Mutex<u64>,
}

/// An in-memory ledger store. Clones share the same state, so tests can keep a handle and query
/// what consensus committed.
#[derive(Clone)]
pub struct MemLedger {
    inner: Arc<MemLedgerInner>,
}

impl MemLedger {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MemLedgerInner {
                committed: Mutex::new(BTreeMap::new()),
                stable_index: Mutex::new(0),
            }),
        }
    }

    /// The committed proposal at `index`, if there is one.
    pub fn committed_at(&self, index: u64) -> Option<Proposal> {
        self.inner.committed.lock().unwrap().get(&index).cloned()
    }

    /// The stable checkpoint index.
    pub fn stable_index(&self) -> u64 {
        *self.inner.stable_index.lock().unwrap()
    }
}

impl LedgerStore for MemLedger {
    fn load_state(&self, stabled_index: SequenceNumber) -> Result<Vec<Proposal>, StorageError> {
        let committed = self.inner.committed.lock().unwrap();
        Ok(committed
            .range(stabled_index.int()..)
            .map(|(_, proposal)| proposal.clone())
            .collect())
    }

    fn async_commit_proposal(&self, proposal: Proposal) -> Result<(), StorageError> {
        self.inner
            .committed
            .lock()
            .unwrap()
            .insert(proposal.index.int(), proposal);
        Ok(())
    }

    fn async_commit_stable_checkpoint(&self, proposal: Proposal) -> Result<(), StorageError> {
        let mut stable_index = self.inner.stable_index.lock().unwrap();
        if proposal.index.int() > *stable_index {
            *stable_index = proposal.index.int();
        }
        Ok(())
    }

    fn async_get_committed_proposals(
        &self,
        start: SequenceNumber,
        offset: u64,
        on_success: Box<dyn FnOnce(Vec<Proposal>) + Send>,
    ) {
        let committed = self.inner.committed.lock().unwrap();
        let proposals = committed
            .range(start.int()..start.int().saturating_add(offset))
            .map(|(_, proposal)| proposal.clone())
            .collect();
        on_success(proposals)
    }

    fn max_committed_proposal_index(&self) -> SequenceNumber {
        let committed = self.inner.committed.lock().unwrap();
        SequenceNumber::new(committed.keys().next_back().copied().unwrap_or(0))
    }
}
