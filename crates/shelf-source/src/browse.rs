//! The browse pipeline.
//!
//! A browse runs in two phases. [`materialize`] scans the store, filters,
//! sorts and paginates synchronously, producing the complete result list.
//! A [`Delivery`] then hands that list to the caller one item per
//! scheduler tick.

use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;

use shelf_query::{Filter, SortSpec};
use shelf_store::ObjectStore;
use shelf_sched::TaskStatus;
use shelf_types::{ItemId, KeySelection, Metadata, MetadataValue, ObjectId};
use tracing::{debug, warn};

use crate::error::{SourceError, SourceResult};
use crate::registry::BrowseId;
use crate::traits::BrowseCallback;

/// Parameters of one browse call.
#[derive(Clone, Debug, Default)]
pub struct BrowseParams {
    /// Must be the root container id.
    pub parent: String,
    /// Accepted for compatibility; the container is flat.
    pub recursive: bool,
    pub filter: Option<Filter>,
    pub sort: Option<SortSpec>,
    /// Attributes to include in each result.
    pub keys: KeySelection,
    /// Number of leading results to drop. `0` drops nothing.
    pub skip: usize,
    /// Maximum number of results. `0` means unlimited.
    pub limit: usize,
}

impl BrowseParams {
    pub fn new(parent: impl Into<String>) -> Self {
        Self {
            parent: parent.into(),
            ..Self::default()
        }
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn sort(mut self, sort: SortSpec) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn keys(mut self, keys: KeySelection) -> Self {
        self.keys = keys;
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// One delivery to a browse callback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BrowseResult {
    pub browse_id: BrowseId,
    /// Results still to come after this one.
    pub remaining: usize,
    /// 0-based position of this result in the delivery sequence.
    pub index: usize,
    /// `None` for the terminal empty-result and error deliveries.
    pub object_id: Option<ObjectId>,
    pub metadata: Option<Metadata>,
    pub error: Option<SourceError>,
}

impl BrowseResult {
    fn terminal(browse_id: BrowseId, error: Option<SourceError>) -> Self {
        Self {
            browse_id,
            remaining: 0,
            index: 0,
            object_id: None,
            metadata: None,
            error,
        }
    }

    /// `true` if no further result will be delivered for this request.
    pub fn is_last(&self) -> bool {
        self.remaining == 0
    }
}

/// The fully computed answer to a browse, before delivery.
#[derive(Debug, PartialEq)]
pub(crate) enum Materialized {
    Items(VecDeque<(ItemId, Option<Metadata>)>),
    Empty,
    SkipOverflow,
}

impl Materialized {
    pub(crate) fn len(&self) -> usize {
        match self {
            Self::Items(items) => items.len(),
            _ => 0,
        }
    }
}

/// Read the selected attributes of one item.
///
/// `KeySelection::None` reads nothing and yields `None`. Values that fail
/// to decode are skipped.
pub(crate) fn fetch_metadata(
    store: &dyn ObjectStore,
    id: ItemId,
    keys: &KeySelection,
) -> SourceResult<Option<Metadata>> {
    let raw: Vec<(String, Vec<u8>)> = match keys {
        KeySelection::None => return Ok(None),
        KeySelection::All => store.get_all(id)?.into_iter().collect(),
        KeySelection::Keys(keys) => {
            let mut raw = Vec::with_capacity(keys.len());
            for key in keys {
                if let Some(bytes) = store.get(id, key)? {
                    raw.push((key.clone(), bytes));
                }
            }
            raw
        }
    };

    let mut metadata = Metadata::new();
    for (key, bytes) in raw {
        match MetadataValue::thaw(&bytes) {
            Ok(value) => {
                metadata.insert(key, value);
            }
            Err(e) => warn!(id, key = %key, error = %e, "undecodable attribute skipped"),
        }
    }
    Ok(Some(metadata))
}

/// Scan, filter, sort and paginate.
///
/// Unsorted results come out in reverse store order: every match is
/// prepended during the scan.
pub(crate) fn materialize(
    store: &dyn ObjectStore,
    params: &BrowseParams,
    fetch: &KeySelection,
) -> SourceResult<Materialized> {
    let empty = Metadata::new();
    let mut matched: VecDeque<(ItemId, Option<Metadata>)> = VecDeque::new();

    for id in store.list_ids()? {
        let metadata = fetch_metadata(store, id, fetch)?;
        if let Some(filter) = &params.filter {
            if !filter.matches(metadata.as_ref().unwrap_or(&empty)) {
                continue;
            }
        }
        matched.push_front((id, metadata));
    }
    let scanned = matched.len();

    let mut matched: Vec<_> = matched.into();
    if let Some(sort) = &params.sort {
        sort.sort(&mut matched);
    }

    if params.skip > 0 {
        if params.skip >= matched.len() {
            debug!(matched = scanned, skip = params.skip, "skip past end of results");
            return Ok(Materialized::SkipOverflow);
        }
        matched.drain(..params.skip);
    }
    if params.limit > 0 {
        matched.truncate(params.limit);
    }

    debug!(matched = scanned, delivering = matched.len(), "browse materialized");
    if matched.is_empty() {
        Ok(Materialized::Empty)
    } else {
        Ok(Materialized::Items(matched.into()))
    }
}

/// Incremental delivery of one browse request.
pub(crate) struct Delivery {
    id: BrowseId,
    source: String,
    results: Materialized,
    projection: KeySelection,
    next_index: usize,
    cancelled: Rc<Cell<bool>>,
    callback: BrowseCallback,
}

impl Delivery {
    pub(crate) fn new(
        id: BrowseId,
        source: impl Into<String>,
        results: Materialized,
        projection: KeySelection,
        cancelled: Rc<Cell<bool>>,
        callback: BrowseCallback,
    ) -> Self {
        Self {
            id,
            source: source.into(),
            results,
            projection,
            next_index: 0,
            cancelled,
            callback,
        }
    }

    pub(crate) fn id(&self) -> BrowseId {
        self.id
    }

    /// Deliver one result.
    ///
    /// A cancelled request delivers nothing. The callback may cancel the
    /// request itself; no tick follows in that case.
    pub(crate) fn tick(&mut self) -> TaskStatus {
        if self.cancelled.get() {
            debug!(browse_id = %self.id, "cancelled browse dropped");
            return TaskStatus::Done;
        }

        let result = match &mut self.results {
            Materialized::SkipOverflow => {
                BrowseResult::terminal(self.id, Some(SourceError::BrowseResultFailed))
            }
            Materialized::Empty => BrowseResult::terminal(self.id, None),
            Materialized::Items(items) => match items.pop_front() {
                Some((item, metadata)) => {
                    let index = self.next_index;
                    self.next_index += 1;
                    BrowseResult {
                        browse_id: self.id,
                        remaining: items.len(),
                        index,
                        object_id: Some(ObjectId::item(self.source.as_str(), item)),
                        metadata: metadata.and_then(|m| self.projection.project(&m)),
                        error: None,
                    }
                }
                None => return TaskStatus::Done,
            },
        };

        (self.callback)(result);

        let more = matches!(&self.results, Materialized::Items(items) if !items.is_empty());
        if more && !self.cancelled.get() {
            TaskStatus::Continue
        } else {
            TaskStatus::Done
        }
    }
}
