//! Observer registry for reactive cells.
//!
//! An observer is any callback that wants to hear about value changes:
//! display hooks, trackers mirroring another cell, or an algorithm's
//! recompute trigger.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use smallvec::SmallVec;

use crate::error::Result;

/// Unique identifier for a registered observer.
///
/// Closures have no identity of their own, so every registration hands out
/// an id and removal goes through it. Registering the same closure twice
/// yields two ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

impl ObserverId {
    /// Generate a new unique observer ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ObserverId {
    fn default() -> Self {
        Self::new()
    }
}

/// A stored observer callback.
pub(crate) type Callback<T> = Arc<dyn Fn(&T) -> Result<()> + Send + Sync>;

/// Ordered list of observers. Insertion order is notification order.
pub(crate) struct ObserverList<T> {
    entries: RwLock<Vec<(ObserverId, Callback<T>)>>,
}

impl<T> ObserverList<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    pub(crate) fn add(&self, callback: Callback<T>) -> ObserverId {
        let id = ObserverId::new();
        self.entries.write().push((id, callback));
        id
    }

    pub(crate) fn remove(&self, id: ObserverId) -> bool {
        let mut entries = self.entries.write();
        match entries.iter().position(|(entry, _)| *entry == id) {
            Some(index) => {
                entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Copy out the callbacks so none of them runs under the lock.
    pub(crate) fn snapshot(&self) -> SmallVec<[Callback<T>; 4]> {
        self.entries
            .read()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.read().len()
    }
}
