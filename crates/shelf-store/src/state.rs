//! Backend-independent store contents.
//!
//! Both backends keep a [`StoreState`] and apply every mutation to a copy
//! first; the copy replaces the live state only when the whole batch
//! succeeded (and, for the file store, was persisted).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use shelf_types::ItemId;

use crate::error::{StoreError, StoreResult};

/// Raw attributes of one item: key to frozen value bytes.
pub type RawAttributes = BTreeMap<String, Vec<u8>>;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreState {
    /// Highest item id that ever held attributes.
    pub high_water: ItemId,
    /// Whether the one-time bootstrap import has run against this store.
    pub bootstrap_done: bool,
    pub objects: BTreeMap<ItemId, RawAttributes>,
}

impl StoreState {
    pub fn put_batch(&mut self, id: ItemId, puts: &[(String, Vec<u8>)]) -> StoreResult<()> {
        if puts.iter().any(|(k, _)| k.is_empty()) {
            return Err(StoreError::EmptyKey(id));
        }
        if puts.is_empty() {
            return Ok(());
        }
        let attrs = self.objects.entry(id).or_default();
        for (key, value) in puts {
            attrs.insert(key.clone(), value.clone());
        }
        self.high_water = self.high_water.max(id);
        Ok(())
    }

    pub fn delete_keys(&mut self, id: ItemId, keys: &[String]) {
        let now_empty = match self.objects.get_mut(&id) {
            Some(attrs) => {
                for key in keys {
                    attrs.remove(key);
                }
                attrs.is_empty()
            }
            None => false,
        };
        // An item with no attributes does not exist.
        if now_empty {
            self.objects.remove(&id);
        }
    }

    /// Create one item per entry under fresh ids and set the bootstrap
    /// marker. Entries without attributes create nothing.
    pub fn import(&mut self, entries: &[Vec<(String, Vec<u8>)>]) -> StoreResult<Vec<ItemId>> {
        let mut ids = Vec::with_capacity(entries.len());
        for puts in entries.iter().filter(|puts| !puts.is_empty()) {
            let id = self.next_id()?;
            self.put_batch(id, puts)?;
            ids.push(id);
        }
        self.bootstrap_done = true;
        Ok(ids)
    }

    pub fn delete_object(&mut self, id: ItemId) -> bool {
        self.objects.remove(&id).is_some()
    }

    pub fn next_id(&self) -> StoreResult<ItemId> {
        let top = self
            .objects
            .keys()
            .next_back()
            .copied()
            .unwrap_or(0)
            .max(self.high_water);
        top.checked_add(1).ok_or(StoreError::IdSpaceExhausted)
    }
}
