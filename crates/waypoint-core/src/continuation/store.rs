//! Bounded, insertion-ordered continuation store for one conversation.
//!
//! Insertion order is tracked with a monotonically increasing sequence
//! number. When a put pushes the count past the maximum, the entry with the
//! lowest sequence (the oldest insertion) is evicted. Re-putting an existing
//! id replaces its snapshot and moves it to the newest position.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use parking_lot::Mutex;
use waypoint_types::error::RepositoryError;
use waypoint_types::id::{ContinuationId, ConversationId};

use super::Continuation;

#[derive(Default)]
struct StoreInner {
    next_seq: u64,
    by_seq: BTreeMap<u64, Continuation>,
    seq_by_id: HashMap<ContinuationId, u64>,
}

pub struct ContinuationStore {
    conversation_id: ConversationId,
    /// Zero means unbounded.
    max_continuations: usize,
    inner: Mutex<StoreInner>,
}

impl ContinuationStore {
    pub fn new(conversation_id: ConversationId, max_continuations: usize) -> Self {
        Self {
            conversation_id,
            max_continuations,
            inner: Mutex::new(StoreInner::default()),
        }
    }

    pub fn max_continuations(&self) -> usize {
        self.max_continuations
    }

    /// Insert a continuation, returning the entry evicted to make room.
    pub fn put(&self, continuation: Continuation) -> Option<Continuation> {
        let mut inner = self.inner.lock();
        let id = continuation.id();
        if let Some(previous) = inner.seq_by_id.remove(&id) {
            inner.by_seq.remove(&previous);
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.by_seq.insert(seq, continuation);
        inner.seq_by_id.insert(id, seq);

        if self.max_continuations == 0 || inner.by_seq.len() <= self.max_continuations {
            return None;
        }
        let (_, evicted) = inner.by_seq.pop_first()?;
        inner.seq_by_id.remove(&evicted.id());
        tracing::debug!(
            conversation_id = %self.conversation_id,
            continuation_id = %evicted.id(),
            max_continuations = self.max_continuations,
            "evicted oldest continuation"
        );
        Some(evicted)
    }

    pub fn get(&self, id: &ContinuationId) -> Result<Continuation, RepositoryError> {
        let inner = self.inner.lock();
        inner
            .seq_by_id
            .get(id)
            .and_then(|seq| inner.by_seq.get(seq))
            .cloned()
            .ok_or(RepositoryError::ContinuationNotFound {
                conversation_id: self.conversation_id,
                continuation_id: *id,
            })
    }

    pub fn remove(&self, id: &ContinuationId) -> Option<Continuation> {
        let mut inner = self.inner.lock();
        let seq = inner.seq_by_id.remove(id)?;
        inner.by_seq.remove(&seq)
    }

    pub fn contains(&self, id: &ContinuationId) -> bool {
        self.inner.lock().seq_by_id.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().by_seq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids from oldest to newest.
    pub fn ids(&self) -> Vec<ContinuationId> {
        self.inner.lock().by_seq.values().map(Continuation::id).collect()
    }
}

impl fmt::Debug for ContinuationStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContinuationStore")
            .field("conversation_id", &self.conversation_id)
            .field("max_continuations", &self.max_continuations)
            .field("len", &self.len())
            .finish()
    }
}
