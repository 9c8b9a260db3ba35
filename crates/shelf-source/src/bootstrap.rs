//! One-time import of preset bookmarks into an empty store.
//!
//! Whether the import already ran is recorded in the store itself, so a
//! store is seeded at most once no matter how many sources open it. The
//! marker is written in the same atomic batch as the imported items; a
//! failed import leaves the store as it was and can be retried.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use shelf_store::ObjectStore;
use shelf_types::{keys, ItemId, Metadata, MetadataValue};
use tracing::{info, warn};

use crate::error::{SourceError, SourceResult};

/// A provider of preset bookmarks.
pub trait Bootstrap {
    /// Attribute sets to import, one per bookmark.
    fn entries(&self) -> SourceResult<Vec<Metadata>>;
}

/// Bootstrap entries held in memory.
#[derive(Clone, Debug, Default)]
pub struct StaticBootstrap {
    entries: Vec<Metadata>,
}

impl StaticBootstrap {
    pub fn new(entries: Vec<Metadata>) -> Self {
        Self { entries }
    }
}

impl Bootstrap for StaticBootstrap {
    fn entries(&self) -> SourceResult<Vec<Metadata>> {
        Ok(self.entries.clone())
    }
}

/// Outcome of a bootstrap run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    /// Ids of the items created, in import order.
    pub imported: Vec<ItemId>,
    /// Entries skipped because their URI was already stored.
    pub duplicates: usize,
    /// Entries skipped because they had no URI.
    pub rejected: usize,
}

/// Import `bootstrap` into `store` unless that already happened.
///
/// Every imported entry gets an `added` timestamp (seconds since the epoch)
/// unless it carries one. With `check_duplicates`, entries whose URI is
/// already stored are skipped. Returns `None` when the store was seeded
/// before.
pub fn run_bootstrap(
    store: &dyn ObjectStore,
    bootstrap: &dyn Bootstrap,
    check_duplicates: bool,
    now: DateTime<Utc>,
) -> SourceResult<Option<BootstrapReport>> {
    if store.bootstrap_done()? {
        return Ok(None);
    }

    let mut known_uris = HashSet::new();
    if check_duplicates {
        for id in store.list_ids()? {
            if let Some(bytes) = store.get(id, keys::URI)? {
                if let Ok(MetadataValue::Str(uri)) = MetadataValue::thaw(&bytes) {
                    known_uris.insert(uri);
                }
            }
        }
    }

    let mut report = BootstrapReport::default();
    let mut batches = Vec::new();
    for mut entry in bootstrap.entries()? {
        let uri = match entry.get(keys::URI) {
            Some(value) => value.to_string(),
            None => {
                warn!("bootstrap entry without uri skipped");
                report.rejected += 1;
                continue;
            }
        };
        if check_duplicates && !known_uris.insert(uri.clone()) {
            report.duplicates += 1;
            continue;
        }

        entry
            .entry(keys::ADDED.to_string())
            .or_insert(MetadataValue::Long(now.timestamp()));
        let puts = entry
            .iter()
            .map(|(k, v)| {
                v.freeze()
                    .map(|bytes| (k.clone(), bytes))
                    .map_err(|e| SourceError::StorageFailure(e.to_string()))
            })
            .collect::<SourceResult<Vec<_>>>()?;
        batches.push(puts);
    }

    // Items and the done marker land together or not at all.
    report.imported = store.import_items(&batches).map_err(|e| {
        warn!(entries = batches.len(), error = %e, "bootstrap import failed");
        SourceError::from(e)
    })?;
    info!(
        imported = report.imported.len(),
        duplicates = report.duplicates,
        rejected = report.rejected,
        "bootstrap import finished"
    );
    Ok(Some(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use shelf_store::InMemoryObjectStore;

    fn bookmark(uri: &str, title: &str) -> Metadata {
        Metadata::from([
            (keys::URI.to_string(), MetadataValue::from(uri)),
            (keys::TITLE.to_string(), MetadataValue::from(title)),
        ])
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn thawed(store: &InMemoryObjectStore, id: ItemId, key: &str) -> Option<MetadataValue> {
        store.get(id, key).unwrap().map(|b| MetadataValue::thaw(&b).unwrap())
    }

    #[test]
    fn imports_once_with_timestamp() {
        let store = InMemoryObjectStore::new();
        let seed = StaticBootstrap::new(vec![bookmark("http://a", "A"), bookmark("http://b", "B")]);

        let report = run_bootstrap(&store, &seed, false, at()).unwrap().unwrap();
        assert_eq!(report.imported, vec![1, 2]);
        assert_eq!(
            thawed(&store, 1, keys::ADDED),
            Some(MetadataValue::Long(at().timestamp()))
        );
        assert_eq!(thawed(&store, 2, keys::TITLE), Some(MetadataValue::from("B")));

        assert_eq!(run_bootstrap(&store, &seed, false, at()).unwrap(), None);
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn existing_added_is_kept() {
        let store = InMemoryObjectStore::new();
        let mut entry = bookmark("http://a", "A");
        entry.insert(keys::ADDED.to_string(), MetadataValue::Long(5));
        run_bootstrap(&store, &StaticBootstrap::new(vec![entry]), false, at()).unwrap();
        assert_eq!(thawed(&store, 1, keys::ADDED), Some(MetadataValue::Long(5)));
    }

    #[test]
    fn duplicates_are_suppressed() {
        let store = InMemoryObjectStore::new();
        let existing = MetadataValue::from("http://a").freeze().unwrap();
        store.put_batch(1, &[(keys::URI.to_string(), existing)]).unwrap();

        let seed = StaticBootstrap::new(vec![
            bookmark("http://a", "dup of stored"),
            bookmark("http://b", "B"),
            bookmark("http://b", "dup within seed"),
        ]);
        let report = run_bootstrap(&store, &seed, true, at()).unwrap().unwrap();
        assert_eq!(report.imported, vec![2]);
        assert_eq!(report.duplicates, 2);
    }

    #[test]
    fn failed_import_leaves_store_untouched_and_retries_cleanly() {
        let store = InMemoryObjectStore::new();
        let seed = StaticBootstrap::new(vec![
            bookmark("http://a", "A"),
            bookmark("http://b", "B"),
            bookmark("http://c", "C"),
        ]);

        store.fail_writes(1);
        let err = run_bootstrap(&store, &seed, false, at()).unwrap_err();
        assert!(matches!(err, SourceError::StorageFailure(_)));
        assert!(store.is_empty());
        assert!(!store.bootstrap_done().unwrap());

        let report = run_bootstrap(&store, &seed, false, at()).unwrap().unwrap();
        assert_eq!(report.imported, vec![1, 2, 3]);
        assert_eq!(store.count().unwrap(), 3);
        assert!(store.bootstrap_done().unwrap());
    }

    #[test]
    fn entries_without_uri_are_rejected() {
        let store = InMemoryObjectStore::new();
        let no_uri = Metadata::from([(keys::TITLE.to_string(), MetadataValue::from("x"))]);
        let report = run_bootstrap(&store, &StaticBootstrap::new(vec![no_uri]), true, at())
            .unwrap()
            .unwrap();
        assert_eq!(report.rejected, 1);
        assert!(store.is_empty());
        assert!(store.bootstrap_done().unwrap());
    }
}
