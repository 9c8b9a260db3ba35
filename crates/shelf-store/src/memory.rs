use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use shelf_types::ItemId;
use tracing::warn;

use crate::error::{StoreError, StoreResult};
use crate::state::{RawAttributes, StoreState};
use crate::traits::ObjectStore;

/// In-memory, `BTreeMap`-based attribute store.
///
/// Intended for tests and embedding. Contents are lost when the store is
/// dropped. Write failures can be injected with [`fail_writes`] to exercise
/// rollback paths.
///
/// Every write applies to a full copy of the state, so a mutation costs
/// time proportional to the number of stored attributes. That suits
/// bookmark-sized collections, not large ones.
///
/// [`fail_writes`]: InMemoryObjectStore::fail_writes
pub struct InMemoryObjectStore {
    state: RwLock<StoreState>,
    failing_writes: AtomicUsize,
}

impl InMemoryObjectStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            failing_writes: AtomicUsize::new(0),
        }
    }

    /// Make the next `n` batch writes fail without applying anything.
    pub fn fail_writes(&self, n: usize) {
        self.failing_writes.store(n, Ordering::SeqCst);
    }

    /// Returns `true` if the store holds no items.
    pub fn is_empty(&self) -> bool {
        self.state
            .read()
            .map(|s| s.objects.is_empty())
            .unwrap_or(true)
    }

    /// Remove all items from the store.
    pub fn clear(&self) {
        if let Ok(mut state) = self.state.write() {
            state.objects.clear();
        }
    }

    fn take_injected_failure(&self) -> bool {
        self.failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn list_ids(&self) -> StoreResult<Vec<ItemId>> {
        let state = self.state.read().map_err(|_| StoreError::Poisoned)?;
        Ok(state.objects.keys().copied().collect())
    }

    fn get(&self, id: ItemId, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let state = self.state.read().map_err(|_| StoreError::Poisoned)?;
        Ok(state.objects.get(&id).and_then(|a| a.get(key)).cloned())
    }

    fn get_all(&self, id: ItemId) -> StoreResult<RawAttributes> {
        let state = self.state.read().map_err(|_| StoreError::Poisoned)?;
        Ok(state.objects.get(&id).cloned().unwrap_or_default())
    }

    fn replace_keys(
        &self,
        id: ItemId,
        delete: &[String],
        puts: &[(String, Vec<u8>)],
    ) -> StoreResult<()> {
        let mut state = self.state.write().map_err(|_| StoreError::Poisoned)?;
        if self.take_injected_failure() {
            warn!(id, "injected write failure");
            return Err(StoreError::WriteFailed {
                id,
                reason: "injected failure".into(),
            });
        }
        let mut next = state.clone();
        next.delete_keys(id, delete);
        next.put_batch(id, puts)?;
        *state = next;
        Ok(())
    }

    fn import_items(&self, entries: &[Vec<(String, Vec<u8>)>]) -> StoreResult<Vec<ItemId>> {
        let mut state = self.state.write().map_err(|_| StoreError::Poisoned)?;
        if self.take_injected_failure() {
            let id = state.next_id()?;
            warn!(id, entries = entries.len(), "injected import failure");
            return Err(StoreError::WriteFailed {
                id,
                reason: "injected failure".into(),
            });
        }
        let mut next = state.clone();
        let ids = next.import(entries)?;
        *state = next;
        Ok(ids)
    }

    fn delete_object(&self, id: ItemId) -> StoreResult<bool> {
        let mut state = self.state.write().map_err(|_| StoreError::Poisoned)?;
        Ok(state.delete_object(id))
    }

    fn exists(&self, id: ItemId) -> StoreResult<bool> {
        let state = self.state.read().map_err(|_| StoreError::Poisoned)?;
        Ok(state.objects.contains_key(&id))
    }

    fn next_id(&self) -> StoreResult<ItemId> {
        let state = self.state.read().map_err(|_| StoreError::Poisoned)?;
        state.next_id()
    }

    fn bootstrap_done(&self) -> StoreResult<bool> {
        let state = self.state.read().map_err(|_| StoreError::Poisoned)?;
        Ok(state.bootstrap_done)
    }

    fn mark_bootstrap_done(&self) -> StoreResult<()> {
        let mut state = self.state.write().map_err(|_| StoreError::Poisoned)?;
        state.bootstrap_done = true;
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.state.read().map(|s| s.objects.len()).unwrap_or(0);
        f.debug_struct("InMemoryObjectStore")
            .field("item_count", &count)
            .finish()
    }
}
