//! Bounded correlation table of in-flight requests.
//!
//! Ownership of removal is explicit: [`CorrelationStore::get`] never
//! deletes, and whoever gets `Some` back from [`CorrelationStore::delete`]
//! owns the entry. The dispatcher and the ingress timeout path both claim
//! this way before acting, so a reply is delivered at most once.
//!
//! Capacity is a hard bound. Inserting into a full store evicts the
//! least-recently-touched entry even if its expiry has not passed. The
//! evicted record's completion slot is dropped with it, which wakes its
//! waiter with a closed slot instead of leaving it to time out.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;

use lru::LruCache;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::warn;

use crate::ids::{CorrelationId, RequestId};

/// Default store capacity.
pub const DEFAULT_CAPACITY: usize = 100;

/// Single-use rendezvous shared by all clones of a [`PendingRequest`].
#[derive(Debug)]
struct CompletionSlot {
    tx: Mutex<Option<oneshot::Sender<Value>>>,
}

/// A caller waiting for its upstream reply.
#[derive(Clone, Debug)]
pub struct PendingRequest {
    correlation_id: CorrelationId,
    original_id: RequestId,
    slot: Arc<CompletionSlot>,
}

impl PendingRequest {
    /// Create a pending record and the receiver its caller waits on.
    pub fn new(
        correlation_id: CorrelationId,
        original_id: RequestId,
    ) -> (Self, oneshot::Receiver<Value>) {
        let (tx, rx) = oneshot::channel();
        let record = Self {
            correlation_id,
            original_id,
            slot: Arc::new(CompletionSlot {
                tx: Mutex::new(Some(tx)),
            }),
        };
        (record, rx)
    }

    /// The relay-assigned id.
    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    /// The caller's id, type preserved.
    pub fn original_id(&self) -> &RequestId {
        &self.original_id
    }

    /// Complete the slot with `payload`.
    ///
    /// Never blocks. Returns `false` if the slot was already completed or
    /// the waiter has gone away.
    pub fn complete(&self, payload: Value) -> bool {
        let Some(tx) = self.slot.tx.lock().take() else {
            return false;
        };
        tx.send(payload).is_ok()
    }
}

#[derive(Debug)]
struct Entry {
    record: PendingRequest,
    expiry: Instant,
}

/// Capacity-bounded, recency-ordered map from correlation id to
/// [`PendingRequest`]. Safe to share across tasks.
pub struct CorrelationStore {
    entries: Mutex<LruCache<CorrelationId, Entry>>,
}

impl CorrelationStore {
    /// Create a store holding at most `capacity` entries.
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Insert or overwrite `id`, marking it most recently used.
    ///
    /// Returns the id of a different entry evicted to make room, if any.
    pub fn set(
        &self,
        id: CorrelationId,
        record: PendingRequest,
        expiry: Instant,
    ) -> Option<CorrelationId> {
        let displaced = self.entries.lock().push(id.clone(), Entry { record, expiry });
        match displaced {
            Some((evicted, entry)) if evicted != id => {
                warn!(
                    correlation_id = %evicted,
                    original_id = %entry.record.original_id,
                    "correlation store full, evicted least recently used request"
                );
                Some(evicted)
            }
            _ => None,
        }
    }

    /// Look up `id`, marking it most recently used. Does not remove it.
    pub fn get(&self, id: &str) -> Option<PendingRequest> {
        self.entries.lock().get(id).map(|e| e.record.clone())
    }

    /// Remove `id`. Deleting an absent id is a no-op.
    ///
    /// `Some` means the caller now exclusively owns the record.
    pub fn delete(&self, id: &str) -> Option<PendingRequest> {
        self.entries.lock().pop(id).map(|e| e.record)
    }

    /// The expiry recorded for `id`, without touching recency.
    pub fn expiry(&self, id: &str) -> Option<Instant> {
        self.entries.lock().peek(id).map(|e| e.expiry)
    }

    /// Whether `id` is present, without touching recency.
    pub fn contains(&self, id: &str) -> bool {
        self.entries.lock().contains(id)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.entries.lock().cap().get()
    }
}

impl Default for CorrelationStore {
    fn default() -> Self {
        Self::new(NonZeroUsize::new(DEFAULT_CAPACITY).unwrap_or(NonZeroUsize::MIN))
    }
}
