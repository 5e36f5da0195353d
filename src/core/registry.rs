/*!
 * Handle Registry
 * Handle-indexed storage for callbacks and thresholds
 */

use super::id::AtomicGenerator;
use super::types::HandleId;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Registry of shared entries addressed by monotonically increasing handles
///
/// Handles are never reused. Removal is idempotent. Callers snapshot the
/// entries and invoke them after the lock is released.
pub struct HandleRegistry<T: ?Sized> {
    ids: AtomicGenerator,
    entries: RwLock<BTreeMap<HandleId, Arc<T>>>,
}

impl<T: ?Sized> HandleRegistry<T> {
    pub fn new() -> Self {
        Self {
            ids: AtomicGenerator::starting_at(1),
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn register(&self, entry: Arc<T>) -> HandleId {
        let id = self.ids.next();
        self.entries.write().insert(id, entry);
        id
    }

    /// Returns false when the handle is unknown or already removed
    pub fn remove(&self, id: HandleId) -> bool {
        self.entries.write().remove(&id).is_some()
    }

    pub fn get(&self, id: HandleId) -> Option<Arc<T>> {
        self.entries.read().get(&id).cloned()
    }

    /// Entries in registration order
    pub fn snapshot(&self) -> Vec<(HandleId, Arc<T>)> {
        self.entries
            .read()
            .iter()
            .map(|(id, entry)| (*id, Arc::clone(entry)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl<T: ?Sized> Default for HandleRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}
