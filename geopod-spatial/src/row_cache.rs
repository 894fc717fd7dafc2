//! Single-flight row cache.
//!
//! Deduplicates concurrent fetches of the same logical row within one
//! index session. The state map is guarded by a mutex; waiters block on a
//! condvar (wait/wake, never polling):
//!
//! - completed fetch cached → returned immediately
//! - fetch in flight → block until the publisher releases all waiters
//! - neither → the caller atomically claims the id and is obligated to
//!   [`publish`](RowCache::publish) (or [`abandon`](RowCache::abandon) on
//!   fetch failure)
//!
//! At most one authoritative fetch per id at a time. A thread must never
//! call [`get_or_claim`](RowCache::get_or_claim) for an id it currently
//! holds claimed — it would wait on itself.
//!
//! The cache is scoped to one index session and never persisted.

use geopod_core::Row;
use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Cached fetch result: the row, or `None` for a row that does not exist.
pub type CachedRow = Option<Arc<Row>>;

enum Slot {
    /// A fetch is in flight; waiters sleep on the condvar.
    Pending,
    /// Fetch completed.
    Ready(CachedRow),
}

/// Outcome of [`RowCache::get_or_claim`].
pub enum Fetch {
    /// A completed result, shared with every other caller for this id.
    Ready(CachedRow),
    /// The caller now owns the fetch for this id and must `publish`
    /// (or `abandon`).
    Claimed,
}

/// Session-scoped single-flight cache of rows by feature id.
#[derive(Default)]
pub struct RowCache {
    state: Mutex<FxHashMap<i64, Slot>>,
    ready: Condvar,
}

impl RowCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a completed result, wait out an in-flight fetch, or claim
    /// the id.
    pub fn get_or_claim(&self, id: i64) -> Fetch {
        let mut state = self.state.lock();
        loop {
            match state.get(&id) {
                Some(Slot::Ready(row)) => return Fetch::Ready(row.clone()),
                Some(Slot::Pending) => {
                    self.ready.wait(&mut state);
                }
                None => {
                    state.insert(id, Slot::Pending);
                    return Fetch::Claimed;
                }
            }
        }
    }

    /// Store the fetch result for a claimed id and release all waiters.
    pub fn publish(&self, id: i64, row: CachedRow) {
        let mut state = self.state.lock();
        state.insert(id, Slot::Ready(row));
        self.ready.notify_all();
    }

    /// Drop the claim for an id whose fetch failed, waking waiters so one
    /// of them can claim and retry.
    pub fn abandon(&self, id: i64) {
        let mut state = self.state.lock();
        if matches!(state.get(&id), Some(Slot::Pending)) {
            state.remove(&id);
        }
        self.ready.notify_all();
    }

    /// Offer a row that streamed past on another path. Fills an empty
    /// slot; never disturbs an in-flight claim or an existing result.
    pub fn offer(&self, row: Arc<Row>) {
        let mut state = self.state.lock();
        state.entry(row.id()).or_insert(Slot::Ready(Some(row)));
    }

    /// Completed result for an id, if any (no claim, no blocking).
    pub fn peek(&self, id: i64) -> Option<CachedRow> {
        match self.state.lock().get(&id) {
            Some(Slot::Ready(row)) => Some(row.clone()),
            _ => None,
        }
    }

    /// Discard all completed results. In-flight claims are left alone.
    pub fn clear(&self) {
        self.state
            .lock()
            .retain(|_, slot| matches!(slot, Slot::Pending));
    }
}
