//! Synthesized attributes of the root container.

use shelf_store::ObjectStore;
use shelf_types::{keys, KeySelection, Metadata, MetadataValue};

use crate::error::SourceResult;

/// Attributes of the root container: a container MIME marker and the live
/// number of stored items.
///
/// Only `mime` and `childcount` exist. Other requested keys are dropped,
/// and a request naming neither yields `None`.
pub fn root_metadata(
    store: &dyn ObjectStore,
    selection: &KeySelection,
) -> SourceResult<Option<Metadata>> {
    let wants = |key: &str| selection.is_all() || selection.keys().iter().any(|k| k == key);

    let mut full = Metadata::new();
    if wants(keys::MIME) {
        full.insert(keys::MIME.to_string(), MetadataValue::from(keys::MIME_CONTAINER));
    }
    if wants(keys::CHILDCOUNT) {
        let count = i32::try_from(store.count()?).unwrap_or(i32::MAX);
        full.insert(keys::CHILDCOUNT.to_string(), MetadataValue::Int(count));
    }
    Ok(selection.project(&full))
}
