//! Continuations: immutable snapshots of an execution at one point in time.

pub mod snapshot;
pub mod store;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use waypoint_types::id::ContinuationId;

pub use snapshot::SnapshotCodec;
pub use store::ContinuationStore;

/// A saved snapshot, addressed by its continuation id.
///
/// The blob is shared, so handing a continuation out of the store never
/// copies or mutates the bytes that were stored.
#[derive(Debug, Clone)]
pub struct Continuation {
    id: ContinuationId,
    snapshot: Arc<[u8]>,
    created_at: DateTime<Utc>,
}

impl Continuation {
    pub fn new(id: ContinuationId, snapshot: Vec<u8>) -> Self {
        Self {
            id,
            snapshot: snapshot.into(),
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> ContinuationId {
        self.id
    }

    pub fn snapshot(&self) -> &[u8] {
        &self.snapshot
    }

    pub fn size(&self) -> usize {
        self.snapshot.len()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
