use shelf_types::ItemId;

use crate::error::StoreResult;
use crate::state::RawAttributes;

/// Persistent attribute store: `item id -> {key: bytes}`.
///
/// All implementations must satisfy these invariants:
/// - Every batch is atomic: either all of its writes persist or none do.
///   A failed batch leaves the item's prior state unchanged.
/// - An item exists exactly while it holds at least one attribute.
/// - Item ids handed out by [`ObjectStore::next_id`] are never reused, even
///   after the item that held them was deleted.
/// - The store never interprets value bytes.
pub trait ObjectStore: Send + Sync {
    /// All stored item ids, in ascending order.
    fn list_ids(&self) -> StoreResult<Vec<ItemId>>;

    /// Read one attribute. Returns `Ok(None)` if item or key is missing.
    fn get(&self, id: ItemId, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Read every attribute of an item (empty if the item does not exist).
    fn get_all(&self, id: ItemId) -> StoreResult<RawAttributes>;

    /// Write a set of attributes atomically, creating the item if needed.
    fn put_batch(&self, id: ItemId, puts: &[(String, Vec<u8>)]) -> StoreResult<()> {
        self.replace_keys(id, &[], puts)
    }

    /// Delete the named keys, then write `puts`, as one atomic batch.
    fn replace_keys(
        &self,
        id: ItemId,
        delete: &[String],
        puts: &[(String, Vec<u8>)],
    ) -> StoreResult<()>;

    /// Remove the named keys of an item.
    fn delete_keys(&self, id: ItemId, keys: &[String]) -> StoreResult<()> {
        self.replace_keys(id, keys, &[])
    }

    /// Remove an item and all its attributes. Returns `true` if it existed.
    fn delete_object(&self, id: ItemId) -> StoreResult<bool>;

    /// Check whether an item exists.
    fn exists(&self, id: ItemId) -> StoreResult<bool>;

    /// Largest stored item id, if any.
    fn max_id(&self) -> StoreResult<Option<ItemId>> {
        Ok(self.list_ids()?.last().copied())
    }

    /// The id the next created item should receive.
    fn next_id(&self) -> StoreResult<ItemId>;

    /// Whether the one-time bootstrap import already ran against this store.
    fn bootstrap_done(&self) -> StoreResult<bool>;

    /// Record that the bootstrap import ran.
    fn mark_bootstrap_done(&self) -> StoreResult<()>;

    /// Create one item per entry under fresh ids and record the bootstrap
    /// marker, all as one atomic batch. Returns the new ids in entry order.
    fn import_items(&self, entries: &[Vec<(String, Vec<u8>)>]) -> StoreResult<Vec<ItemId>>;

    /// Number of stored items.
    fn count(&self) -> StoreResult<usize> {
        Ok(self.list_ids()?.len())
    }
}
