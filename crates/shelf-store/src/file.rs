//! Snapshot-file attribute store.
//!
//! [`FileObjectStore`] keeps the whole [`StoreState`] in memory and rewrites
//! a JSON snapshot after every mutation. The snapshot is written to a
//! temporary file in the same directory and renamed over the old one, so a
//! crash mid-write leaves the previous snapshot intact.
//!
//! Each mutation clones the whole state and rewrites the whole file, so
//! its cost grows with the store. That suits bookmark-sized collections,
//! not large ones.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use shelf_types::ItemId;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::state::{RawAttributes, StoreState};
use crate::traits::ObjectStore;

pub struct FileObjectStore {
    path: PathBuf,
    state: RwLock<StoreState>,
}

impl FileObjectStore {
    /// Open the snapshot at `path`, starting empty if it does not exist.
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let state = if path.exists() {
            let bytes = fs::read(&path)?;
            serde_json::from_slice(&bytes).map_err(|e| StoreError::CorruptSnapshot {
                path: path.clone(),
                reason: e.to_string(),
            })?
        } else {
            StoreState::default()
        };

        info!(path = %path.display(), items = state.objects.len(), "file store opened");
        Ok(Self {
            path,
            state: RwLock::new(state),
        })
    }

    /// Location of the snapshot file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, state: &StoreState) -> StoreResult<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let json =
            serde_json::to_vec_pretty(state).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(&json)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| StoreError::Io(e.error))?;

        debug!(path = %self.path.display(), bytes = json.len(), "snapshot written");
        Ok(())
    }

    /// Apply `f` to a copy of the state, persist it, then publish it.
    fn commit<T>(&self, f: impl FnOnce(&mut StoreState) -> StoreResult<T>) -> StoreResult<T> {
        let mut state = self.state.write().map_err(|_| StoreError::Poisoned)?;
        let mut next = state.clone();
        let out = f(&mut next)?;
        if next != *state {
            if let Err(e) = self.persist(&next) {
                warn!(error = %e, "snapshot write failed; change discarded");
                return Err(e);
            }
            *state = next;
        }
        Ok(out)
    }
}

impl ObjectStore for FileObjectStore {
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
        self.commit(|state| {
            state.delete_keys(id, delete);
            state.put_batch(id, puts)
        })
    }

    fn import_items(&self, entries: &[Vec<(String, Vec<u8>)>]) -> StoreResult<Vec<ItemId>> {
        self.commit(|state| state.import(entries))
    }

    fn delete_object(&self, id: ItemId) -> StoreResult<bool> {
        self.commit(|state| Ok(state.delete_object(id)))
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
        self.commit(|state| {
            state.bootstrap_done = true;
            Ok(())
        })
    }
}

impl std::fmt::Debug for FileObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileObjectStore")
            .field("path", &self.path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kv(key: &str, value: &[u8]) -> (String, Vec<u8>) {
        (key.to_string(), value.to_vec())
    }

    #[test]
    fn contents_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shelf.json");

        {
            let store = FileObjectStore::open(&path).unwrap();
            store.put_batch(1, &[kv("uri", b"http://a")]).unwrap();
            store.put_batch(2, &[kv("uri", b"http://b")]).unwrap();
            store.delete_object(2).unwrap();
            store.mark_bootstrap_done().unwrap();
        }

        let store = FileObjectStore::open(&path).unwrap();
        assert_eq!(store.list_ids().unwrap(), vec![1]);
        assert_eq!(store.get(1, "uri").unwrap(), Some(b"http://a".to_vec()));
        assert!(store.bootstrap_done().unwrap());
        // The deleted top id stays retired across reopen.
        assert_eq!(store.next_id().unwrap(), 3);
    }

    #[test]
    fn missing_file_opens_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileObjectStore::open(dir.path().join("none.json")).unwrap();
        assert!(store.list_ids().unwrap().is_empty());
        assert!(!store.bootstrap_done().unwrap());
    }

    #[test]
    fn corrupt_snapshot_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, b"{not json").unwrap();
        let err = FileObjectStore::open(&path).unwrap_err();
        assert!(matches!(err, StoreError::CorruptSnapshot { .. }));
    }

    #[test]
    fn import_persists_items_and_marker_together() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shelf.json");
        let store = FileObjectStore::open(&path).unwrap();

        let bad = vec![vec![kv("uri", b"a")], vec![kv("", b"bad")]];
        assert!(store.import_items(&bad).is_err());
        let reopened = FileObjectStore::open(&path).unwrap();
        assert!(reopened.list_ids().unwrap().is_empty());
        assert!(!reopened.bootstrap_done().unwrap());

        let good = vec![vec![kv("uri", b"a")], vec![kv("uri", b"b")]];
        assert_eq!(store.import_items(&good).unwrap(), vec![1, 2]);
        let reopened = FileObjectStore::open(&path).unwrap();
        assert_eq!(reopened.list_ids().unwrap(), vec![1, 2]);
        assert!(reopened.bootstrap_done().unwrap());
    }

    #[test]
    fn rejected_batch_is_not_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shelf.json");
        let store = FileObjectStore::open(&path).unwrap();
        store.put_batch(1, &[kv("uri", b"x")]).unwrap();

        assert!(store
            .put_batch(1, &[kv("title", b"T"), kv("", b"bad")])
            .is_err());

        let reopened = FileObjectStore::open(&path).unwrap();
        assert_eq!(reopened.get(1, "title").unwrap(), None);
    }
}
