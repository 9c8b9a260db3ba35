//! The bookmark source.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::sync::Arc;

use chrono::Utc;
use shelf_query::relevant_keys;
use shelf_sched::{Scheduler, TaskId, TaskStatus};
use shelf_store::ObjectStore;
use shelf_types::{keys, ItemId, KeySelection, Metadata, ObjectId};
use tracing::{debug, info, warn};

use crate::bootstrap::{run_bootstrap, Bootstrap, BootstrapReport};
use crate::browse::{fetch_metadata, materialize, BrowseParams, Delivery};
use crate::config::SourceConfig;
use crate::error::{SourceError, SourceResult};
use crate::events::{EventBus, EventStream, SourceEvent};
use crate::registry::{BrowseId, RequestRegistry};
use crate::root::root_metadata;
use crate::traits::{
    BrowseCallback, CreateCallback, DestroyCallback, GetMetadataCallback, SetMetadataCallback,
    Source,
};

struct SourceInner {
    config: SourceConfig,
    root: ObjectId,
    root_text: String,
    store: Arc<dyn ObjectStore>,
    scheduler: Rc<Scheduler>,
    registry: RefCell<RequestRegistry>,
    events: EventBus,
}

impl SourceInner {
    fn item_id(&self, id: ItemId) -> ObjectId {
        ObjectId::item(self.config.uuid.as_str(), id)
    }

    fn parse(&self, object_id: &str) -> SourceResult<ObjectId> {
        ObjectId::parse_for(object_id, &self.config.uuid)
            .map_err(|e| SourceError::InvalidObjectId(e.to_string()))
    }

    /// Parse an id that must name an item, not the root.
    fn parse_item(&self, object_id: &str) -> SourceResult<ItemId> {
        self.parse(object_id)?
            .item_id()
            .ok_or_else(|| SourceError::InvalidObjectId(format!("{object_id} is not an item")))
    }

    fn cancel_browse(&self, browse_id: BrowseId) -> SourceResult<()> {
        let task = self.registry.borrow_mut().cancel(browse_id)?;
        self.scheduler.cancel(task);
        info!(browse_id = %browse_id, "browse cancelled");
        Ok(())
    }

    fn shutdown(&self) {
        let tasks = self.registry.borrow_mut().cancel_all();
        if !tasks.is_empty() {
            info!(cancelled = tasks.len(), "active browses cancelled at shutdown");
        }
        for task in tasks {
            self.scheduler.cancel(task);
        }
    }
}

fn freeze_all(attributes: &Metadata) -> SourceResult<Vec<(String, Vec<u8>)>> {
    attributes
        .iter()
        .map(|(key, value)| {
            value
                .freeze()
                .map(|bytes| (key.clone(), bytes))
                .map_err(|e| SourceError::StorageFailure(e.to_string()))
        })
        .collect()
}

/// A flat collection of bookmarks backed by an [`ObjectStore`].
///
/// Work is driven by a shared [`Scheduler`]: every mutation, metadata read
/// and browse delivery runs as a task on it, and nothing happens until the
/// owner runs the scheduler. Dropping the source cancels all of its active
/// browses; queued mutations of a dropped source are discarded.
pub struct BookmarkSource {
    inner: Rc<SourceInner>,
}

impl BookmarkSource {
    pub fn new(
        config: SourceConfig,
        store: Arc<dyn ObjectStore>,
        scheduler: Rc<Scheduler>,
    ) -> SourceResult<Self> {
        config.validate()?;
        let root = ObjectId::root(config.uuid.as_str());
        info!(uuid = %config.uuid, items = store.count()?, "bookmark source started");
        Ok(Self {
            inner: Rc::new(SourceInner {
                root_text: root.to_string(),
                root,
                events: EventBus::new(config.event_capacity),
                config,
                store,
                scheduler,
                registry: RefCell::new(RequestRegistry::new()),
            }),
        })
    }

    pub fn config(&self) -> &SourceConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.inner.store
    }

    pub fn scheduler(&self) -> &Rc<Scheduler> {
        &self.inner.scheduler
    }

    /// Receive container and metadata change notifications.
    pub fn subscribe(&self) -> EventStream {
        self.inner.events.subscribe()
    }

    /// A weak handle, usable from inside callbacks.
    pub fn handle(&self) -> SourceHandle {
        SourceHandle {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Number of browses still delivering.
    pub fn active_browses(&self) -> usize {
        self.inner.registry.borrow().len()
    }

    /// Seed the store from `bootstrap` if it was never seeded.
    pub fn bootstrap(&self, bootstrap: &dyn Bootstrap) -> SourceResult<Option<BootstrapReport>> {
        let report = run_bootstrap(
            self.inner.store.as_ref(),
            bootstrap,
            self.inner.config.check_duplicates,
            Utc::now(),
        )?;
        if report.as_ref().is_some_and(|r| !r.imported.is_empty()) {
            self.inner
                .events
                .emit(SourceEvent::ContainerChanged(self.inner.root.clone()));
        }
        Ok(report)
    }

    /// Cancel every active browse.
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }

    /// Run `f` on a later tick, if the source still exists then.
    fn defer<F>(&self, f: F) -> TaskId
    where
        F: FnOnce(&SourceInner) + 'static,
    {
        let weak = Rc::downgrade(&self.inner);
        let mut f = Some(f);
        self.inner.scheduler.submit(move || {
            if let (Some(inner), Some(f)) = (weak.upgrade(), f.take()) {
                f(&inner);
            }
            TaskStatus::Done
        })
    }
}

impl Source for BookmarkSource {
    fn uuid(&self) -> &str {
        &self.inner.config.uuid
    }

    fn create_object(&self, parent: &str, attributes: Metadata, callback: CreateCallback) {
        debug!(parent, keys = attributes.len(), "create object");
        if !attributes.contains_key(keys::URI) {
            callback(None, Some(SourceError::InvalidObjectId("uri is missing".into())));
            return;
        }
        if parent != self.inner.root_text {
            let reason = format!("parent must be {}", self.inner.root_text);
            callback(None, Some(SourceError::InvalidObjectId(reason)));
            return;
        }
        let puts = match freeze_all(&attributes) {
            Ok(puts) => puts,
            Err(e) => return callback(None, Some(e)),
        };

        self.defer(move |inner| {
            let created = inner
                .store
                .next_id()
                .and_then(|id| inner.store.put_batch(id, &puts).map(|()| id));
            match created {
                Ok(id) => {
                    let object_id = inner.item_id(id);
                    info!(object_id = %object_id, "object created");
                    callback(Some(object_id), None);
                    inner
                        .events
                        .emit(SourceEvent::ContainerChanged(inner.root.clone()));
                }
                Err(e) => {
                    warn!(error = %e, "object creation failed");
                    callback(None, Some(e.into()));
                }
            }
        });
    }

    fn destroy_object(&self, object_id: &str, callback: DestroyCallback) {
        debug!(object_id, "destroy object");
        let id = match self.inner.parse_item(object_id) {
            Ok(id) => id,
            Err(e) => return callback(object_id.to_string(), Some(e)),
        };

        let object_id = object_id.to_string();
        self.defer(move |inner| match inner.store.delete_object(id) {
            Ok(existed) => {
                info!(object_id = %object_id, existed, "object destroyed");
                callback(object_id, None);
                inner
                    .events
                    .emit(SourceEvent::ContainerChanged(inner.root.clone()));
            }
            Err(e) => {
                warn!(object_id = %object_id, error = %e, "object destruction failed");
                callback(object_id, Some(e.into()));
            }
        });
    }

    fn set_metadata(&self, object_id: &str, attributes: Metadata, callback: SetMetadataCallback) {
        debug!(object_id, keys = attributes.len(), "set metadata");
        let keys: Vec<String> = attributes.keys().cloned().collect();

        let prepared = self.inner.parse_item(object_id).and_then(|id| {
            if !self.inner.store.exists(id)? {
                return Err(SourceError::InvalidObjectId(format!("{object_id} does not exist")));
            }
            Ok((id, freeze_all(&attributes)?))
        });
        let (id, puts) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => return callback(object_id.to_string(), keys, Some(e)),
        };

        let object_id = object_id.to_string();
        self.defer(move |inner| {
            let written = match inner.store.exists(id) {
                Ok(true) => inner.store.replace_keys(id, &keys, &puts).map_err(SourceError::from),
                Ok(false) => Err(SourceError::InvalidObjectId(format!("{object_id} does not exist"))),
                Err(e) => Err(e.into()),
            };
            match written {
                Ok(()) => {
                    debug!(object_id = %object_id, "metadata replaced");
                    callback(object_id, Vec::new(), None);
                    inner
                        .events
                        .emit(SourceEvent::MetadataChanged(inner.item_id(id)));
                }
                Err(e) => {
                    warn!(object_id = %object_id, error = %e, "metadata update failed");
                    callback(object_id, keys, Some(e));
                }
            }
        });
    }

    fn get_metadata(&self, object_id: &str, keys: &KeySelection, callback: GetMetadataCallback) {
        debug!(object_id, "get metadata");
        let target = match self.inner.parse(object_id) {
            Ok(target) => target,
            Err(e) => return callback(object_id.to_string(), None, Some(e)),
        };

        let object_id = object_id.to_string();
        let keys = keys.clone();
        self.defer(move |inner| {
            let store = inner.store.as_ref();
            let found = match target.item_id() {
                None => root_metadata(store, &keys),
                Some(id) => match store.exists(id) {
                    Ok(true) => fetch_metadata(store, id, &keys)
                        .map(|metadata| metadata.and_then(|m| keys.project(&m))),
                    Ok(false) => Err(SourceError::InvalidObjectId(format!(
                        "{object_id} does not exist"
                    ))),
                    Err(e) => Err(e.into()),
                },
            };
            match found {
                Ok(metadata) => callback(object_id, metadata, None),
                Err(e) => callback(object_id, None, Some(e)),
            }
        });
    }

    fn browse(&self, params: BrowseParams, callback: BrowseCallback) -> SourceResult<BrowseId> {
        let inner = &self.inner;
        if params.parent != inner.root_text {
            warn!(parent = %params.parent, "browse of a non-root container rejected");
            return Err(SourceError::InvalidRequest(format!(
                "parent must be {}",
                inner.root_text
            )));
        }
        if let Some(filter) = &params.filter {
            filter
                .validate_depth()
                .map_err(|e| SourceError::InvalidRequest(e.to_string()))?;
        }

        let fetch = relevant_keys(&params.keys, params.filter.as_ref(), params.sort.as_ref());
        let results = materialize(inner.store.as_ref(), &params, &fetch)?;
        let delivering = results.len();
        let browse_id = inner.registry.borrow_mut().allocate()?;

        let cancelled = Rc::new(Cell::new(false));
        let mut delivery = Delivery::new(
            browse_id,
            inner.config.uuid.as_str(),
            results,
            params.keys.clone(),
            Rc::clone(&cancelled),
            callback,
        );
        let weak = Rc::downgrade(inner);
        let task = inner.scheduler.submit(move || {
            let status = delivery.tick();
            if status == TaskStatus::Done {
                if let Some(inner) = weak.upgrade() {
                    inner.registry.borrow_mut().unregister(delivery.id());
                }
            }
            status
        });
        inner.registry.borrow_mut().register(browse_id, cancelled, task);

        info!(
            browse_id = %browse_id,
            delivering,
            skip = params.skip,
            limit = params.limit,
            "browse scheduled"
        );
        Ok(browse_id)
    }

    fn cancel_browse(&self, browse_id: BrowseId) -> SourceResult<()> {
        self.inner.cancel_browse(browse_id)
    }
}

impl Drop for BookmarkSource {
    fn drop(&mut self) {
        self.inner.shutdown();
    }
}

impl std::fmt::Debug for BookmarkSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BookmarkSource")
            .field("uuid", &self.inner.config.uuid)
            .field("active_browses", &self.active_browses())
            .finish()
    }
}

/// Weak reference to a [`BookmarkSource`].
///
/// Browse callbacks cannot hold the source itself; a handle lets them
/// cancel their own request or another one.
#[derive(Clone)]
pub struct SourceHandle {
    inner: Weak<SourceInner>,
}

impl SourceHandle {
    /// Cancel a browse. Fails with `NotFound` if the source is gone.
    pub fn cancel_browse(&self, browse_id: BrowseId) -> SourceResult<()> {
        match self.inner.upgrade() {
            Some(inner) => inner.cancel_browse(browse_id),
            None => Err(SourceError::NotFound(browse_id)),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }
}

impl std::fmt::Debug for SourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceHandle")
            .field("alive", &self.is_alive())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browse::BrowseResult;
    use crate::StaticBootstrap;
    use proptest::prelude::*;
    use shelf_query::{Filter, SortSpec};
    use shelf_store::InMemoryObjectStore;
    use shelf_types::MetadataValue;

    const ROOT: &str = "shelf::";

    struct Fixture {
        source: BookmarkSource,
        sched: Rc<Scheduler>,
        store: Arc<InMemoryObjectStore>,
    }

    type Seen = Rc<RefCell<Vec<BrowseResult>>>;

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryObjectStore::new());
        let sched = Rc::new(Scheduler::new());
        let source =
            BookmarkSource::new(SourceConfig::default(), store.clone(), Rc::clone(&sched)).unwrap();
        Fixture {
            source,
            sched,
            store,
        }
    }

    fn bookmark(i: i32) -> Metadata {
        Metadata::from([
            (keys::URI.to_string(), MetadataValue::from(format!("http://radio/{i}"))),
            (keys::TITLE.to_string(), MetadataValue::from(format!("Station {i}"))),
            (keys::BITRATE.to_string(), MetadataValue::Int(i)),
            (keys::DURATION.to_string(), MetadataValue::Int(i)),
        ])
    }

    impl Fixture {
        fn create(&self, attributes: Metadata) -> ObjectId {
            let out = Rc::new(RefCell::new(None));
            let sink = Rc::clone(&out);
            self.source.create_object(
                ROOT,
                attributes,
                Box::new(move |id, err| {
                    assert!(err.is_none(), "create failed: {err:?}");
                    *sink.borrow_mut() = id;
                }),
            );
            self.sched.run_until_idle();
            let created = out.borrow_mut().take();
            created.expect("object created")
        }

        fn get(&self, object_id: &str, keys: KeySelection) -> (Option<Metadata>, Option<SourceError>) {
            let out = Rc::new(RefCell::new(None));
            let sink = Rc::clone(&out);
            self.source.get_metadata(
                object_id,
                &keys,
                Box::new(move |_, metadata, err| *sink.borrow_mut() = Some((metadata, err))),
            );
            self.sched.run_until_idle();
            let result = out.borrow_mut().take();
            result.expect("get_metadata called back")
        }

        fn set(&self, object_id: &str, attributes: Metadata) -> (Vec<String>, Option<SourceError>) {
            let out = Rc::new(RefCell::new(None));
            let sink = Rc::clone(&out);
            self.source.set_metadata(
                object_id,
                attributes,
                Box::new(move |_, failed, err| *sink.borrow_mut() = Some((failed, err))),
            );
            self.sched.run_until_idle();
            let result = out.borrow_mut().take();
            result.expect("set_metadata called back")
        }

        fn destroy(&self, object_id: &str) -> Option<SourceError> {
            let out = Rc::new(RefCell::new(None));
            let sink = Rc::clone(&out);
            self.source.destroy_object(
                object_id,
                Box::new(move |_, err| *sink.borrow_mut() = Some(err)),
            );
            self.sched.run_until_idle();
            let result = out.borrow_mut().take();
            result.expect("destroy_object called back")
        }

        fn start_browse(&self, params: BrowseParams) -> (BrowseId, Seen) {
            let seen: Seen = Rc::new(RefCell::new(Vec::new()));
            let sink = Rc::clone(&seen);
            let id = self
                .source
                .browse(params, Box::new(move |r| sink.borrow_mut().push(r)))
                .unwrap();
            (id, seen)
        }

        fn browse_all(&self, params: BrowseParams) -> Vec<BrowseResult> {
            let (_, seen) = self.start_browse(params);
            self.sched.run_until_idle();
            let results = seen.borrow().clone();
            results
        }

        fn populate(&self, n: i32) -> Vec<ObjectId> {
            (0..n).map(|i| self.create(bookmark(i))).collect()
        }
    }

    fn item_ids(results: &[BrowseResult]) -> Vec<Option<ItemId>> {
        results
            .iter()
            .map(|r| r.object_id.as_ref().and_then(ObjectId::item_id))
            .collect()
    }

    // -----------------------------------------------------------------------
    // Create / destroy
    // -----------------------------------------------------------------------

    #[test]
    fn create_assigns_sequential_ids() {
        let fx = fixture();
        let ids = fx.populate(3);
        assert_eq!(ids[0].to_string(), "shelf::1");
        assert_eq!(ids[2].to_string(), "shelf::3");
        assert_eq!(fx.store.count().unwrap(), 3);
    }

    #[test]
    fn ids_are_not_reused_after_destroy() {
        let fx = fixture();
        let ids = fx.populate(2);
        assert_eq!(fx.destroy(&ids[1].to_string()), None);
        assert_eq!(fx.create(bookmark(9)).item_id(), Some(3));
    }

    #[test]
    fn create_without_uri_fails_synchronously() {
        let fx = fixture();
        let out = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&out);
        let mut attrs = bookmark(1);
        attrs.remove(keys::URI);
        fx.source.create_object(
            ROOT,
            attrs,
            Box::new(move |id, err| *sink.borrow_mut() = Some((id, err))),
        );

        let (id, err) = out.borrow_mut().take().unwrap();
        assert_eq!(id, None);
        assert!(matches!(err, Some(SourceError::InvalidObjectId(_))));
        assert_eq!(fx.sched.pending(), 0);
    }

    #[test]
    fn create_under_item_is_rejected() {
        let fx = fixture();
        let out = Rc::new(Cell::new(false));
        let sink = Rc::clone(&out);
        fx.source.create_object(
            "shelf::1",
            bookmark(1),
            Box::new(move |id, err| {
                assert!(id.is_none());
                assert!(matches!(err, Some(SourceError::InvalidObjectId(_))));
                sink.set(true);
            }),
        );
        assert!(out.get());
        assert!(fx.store.is_empty());
    }

    #[test]
    fn failed_create_leaves_nothing() {
        let fx = fixture();
        fx.store.fail_writes(1);
        let out = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&out);
        fx.source.create_object(
            ROOT,
            bookmark(1),
            Box::new(move |id, err| *sink.borrow_mut() = Some((id, err))),
        );
        fx.sched.run_until_idle();

        let (id, err) = out.borrow_mut().take().unwrap();
        assert_eq!(id, None);
        assert!(matches!(err, Some(SourceError::StorageFailure(_))));
        assert!(fx.store.is_empty());
    }

    #[test]
    fn destroy_then_get_is_invalid() {
        let fx = fixture();
        let id = fx.create(bookmark(1)).to_string();
        assert_eq!(fx.destroy(&id), None);
        let (metadata, err) = fx.get(&id, KeySelection::All);
        assert_eq!(metadata, None);
        assert!(matches!(err, Some(SourceError::InvalidObjectId(_))));
    }

    #[test]
    fn destroy_rejects_root_and_malformed_ids() {
        let fx = fixture();
        for bad in [ROOT, "shelf::01", "shelf::0", "shelf::x", "radio::1", "shelf"] {
            assert!(
                matches!(fx.destroy(bad), Some(SourceError::InvalidObjectId(_))),
                "accepted {bad:?}"
            );
        }
    }

    // -----------------------------------------------------------------------
    // Metadata
    // -----------------------------------------------------------------------

    #[test]
    fn set_then_get_round_trips_each_kind() {
        let fx = fixture();
        let id = fx.create(bookmark(1)).to_string();
        let values = [
            ("title", MetadataValue::from("Jazz \u{e9}t\u{e9}")),
            ("bitrate", MetadataValue::Int(-320)),
            ("added", MetadataValue::Long(i64::MAX - 7)),
            ("thumbnail-uri", MetadataValue::Blob(vec![0, 1, 255])),
        ];
        for (key, value) in values {
            let attrs = Metadata::from([(key.to_string(), value.clone())]);
            assert_eq!(fx.set(&id, attrs), (Vec::new(), None));
            let (metadata, err) = fx.get(&id, KeySelection::from_keys([key]));
            assert_eq!(err, None);
            assert_eq!(metadata.unwrap().get(key), Some(&value));
        }
    }

    #[test]
    fn set_replaces_only_named_keys() {
        let fx = fixture();
        let id = fx.create(bookmark(1)).to_string();
        let attrs = Metadata::from([(keys::TITLE.to_string(), MetadataValue::from("Renamed"))]);
        fx.set(&id, attrs);

        let (metadata, _) = fx.get(&id, KeySelection::All);
        let metadata = metadata.unwrap();
        assert_eq!(metadata.get(keys::TITLE), Some(&MetadataValue::from("Renamed")));
        assert_eq!(metadata.get(keys::BITRATE), Some(&MetadataValue::Int(1)));
    }

    #[test]
    fn set_on_unknown_item_fails_synchronously() {
        let fx = fixture();
        let out = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&out);
        fx.source.set_metadata(
            "shelf::42",
            bookmark(1),
            Box::new(move |id, failed, err| *sink.borrow_mut() = Some((id, failed, err))),
        );

        let (id, failed, err) = out.borrow_mut().take().unwrap();
        assert_eq!(id, "shelf::42");
        assert_eq!(failed, vec!["bitrate", "duration", "title", "uri"]);
        assert!(matches!(err, Some(SourceError::InvalidObjectId(_))));
    }

    #[test]
    fn failed_set_rolls_back() {
        let fx = fixture();
        let id = fx.create(bookmark(1)).to_string();
        fx.store.fail_writes(1);

        let attrs = Metadata::from([
            (keys::TITLE.to_string(), MetadataValue::from("New")),
            (keys::URI.to_string(), MetadataValue::from("http://new")),
        ]);
        let (failed, err) = fx.set(&id, attrs);
        assert_eq!(failed, vec!["title", "uri"]);
        assert!(matches!(err, Some(SourceError::StorageFailure(_))));

        let (metadata, _) = fx.get(&id, KeySelection::from_keys(["title", "uri"]));
        let metadata = metadata.unwrap();
        assert_eq!(metadata.get(keys::TITLE), Some(&MetadataValue::from("Station 1")));
        assert_eq!(metadata.get(keys::URI), Some(&MetadataValue::from("http://radio/1")));
    }

    #[test]
    fn get_projects_requested_keys() {
        let fx = fixture();
        let id = fx.create(bookmark(1)).to_string();

        let (metadata, _) = fx.get(&id, KeySelection::from_keys(["title", "missing"]));
        assert_eq!(metadata.unwrap().len(), 1);

        let (metadata, err) = fx.get(&id, KeySelection::from_keys(["missing"]));
        assert_eq!((metadata, err), (None, None));

        let (metadata, _) = fx.get(&id, KeySelection::from_keys(["*"]));
        assert_eq!(metadata.unwrap().len(), 4);
    }

    #[test]
    fn root_metadata_is_synthesized() {
        let fx = fixture();
        fx.populate(3);

        let (metadata, err) = fx.get(ROOT, KeySelection::All);
        assert_eq!(err, None);
        let metadata = metadata.unwrap();
        assert_eq!(metadata.get(keys::MIME), Some(&MetadataValue::from(keys::MIME_CONTAINER)));
        assert_eq!(metadata.get(keys::CHILDCOUNT), Some(&MetadataValue::Int(3)));

        let (metadata, _) = fx.get(ROOT, KeySelection::from_keys(["mime", "title"]));
        assert_eq!(metadata.unwrap().len(), 1);
        let (metadata, err) = fx.get(ROOT, KeySelection::from_keys(["title"]));
        assert_eq!((metadata, err), (None, None));
    }

    #[test]
    fn get_with_foreign_id_fails_synchronously() {
        let fx = fixture();
        let called = Rc::new(Cell::new(false));
        let sink = Rc::clone(&called);
        fx.source.get_metadata(
            "radio::1",
            &KeySelection::All,
            Box::new(move |_, metadata, err| {
                assert!(metadata.is_none());
                assert!(matches!(err, Some(SourceError::InvalidObjectId(_))));
                sink.set(true);
            }),
        );
        assert!(called.get());
    }

    // -----------------------------------------------------------------------
    // Notifications
    // -----------------------------------------------------------------------

    #[test]
    fn mutations_emit_events() {
        let fx = fixture();
        let mut rx = fx.source.subscribe();

        let id = fx.create(bookmark(1));
        assert_eq!(rx.try_recv().unwrap(), SourceEvent::ContainerChanged(ObjectId::root("shelf")));

        fx.set(&id.to_string(), Metadata::from([("title".to_string(), "x".into())]));
        assert_eq!(rx.try_recv().unwrap(), SourceEvent::MetadataChanged(id.clone()));

        fx.destroy(&id.to_string());
        assert_eq!(rx.try_recv().unwrap(), SourceEvent::ContainerChanged(ObjectId::root("shelf")));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn failures_emit_nothing() {
        let fx = fixture();
        let mut rx = fx.source.subscribe();
        fx.store.fail_writes(1);
        fx.source.create_object(ROOT, bookmark(1), Box::new(|_, _| {}));
        fx.sched.run_until_idle();
        fx.set("shelf::5", bookmark(1));
        assert!(rx.try_recv().is_err());
    }

    // -----------------------------------------------------------------------
    // Browse
    // -----------------------------------------------------------------------

    #[test]
    fn filter_sort_skip_limit_scenario() {
        let fx = fixture();
        fx.populate(10);

        let params = BrowseParams::new(ROOT)
            .filter(Filter::gt("bitrate", 4))
            .sort(SortSpec::parse("-duration").unwrap())
            .keys(KeySelection::from_keys(["duration"]))
            .skip(2)
            .limit(2);
        let results = fx.browse_all(params);

        assert_eq!(results.len(), 2);
        // Items are created with duration i under id i + 1.
        assert_eq!(item_ids(&results), vec![Some(8), Some(7)]);
        assert_eq!(
            results[0].metadata.as_ref().unwrap().get("duration"),
            Some(&MetadataValue::Int(7))
        );
        assert_eq!((results[0].remaining, results[0].index), (1, 0));
        assert_eq!((results[1].remaining, results[1].index), (0, 1));
        assert!(results.iter().all(|r| r.error.is_none()));
    }

    #[test]
    fn unsorted_browse_is_reverse_creation_order() {
        let fx = fixture();
        fx.populate(3);
        let results = fx.browse_all(BrowseParams::new(ROOT));
        assert_eq!(item_ids(&results), vec![Some(3), Some(2), Some(1)]);
        assert!(results.iter().all(|r| r.metadata.is_none()));
    }

    #[test]
    fn empty_store_yields_single_empty_result() {
        let fx = fixture();
        let results = fx.browse_all(BrowseParams::new(ROOT).keys(KeySelection::All));
        assert_eq!(results.len(), 1);
        let r = &results[0];
        assert_eq!((r.remaining, r.index), (0, 0));
        assert_eq!((&r.object_id, &r.metadata, &r.error), (&None, &None, &None));
        assert_eq!(fx.source.active_browses(), 0);
    }

    #[test]
    fn skip_overflow_yields_single_error() {
        let fx = fixture();
        fx.populate(4);
        let params = BrowseParams::new(ROOT).filter(Filter::ge("bitrate", 2)).skip(2);
        let results = fx.browse_all(params);

        assert_eq!(results.len(), 1);
        let r = &results[0];
        assert_eq!(r.error, Some(SourceError::BrowseResultFailed));
        assert_eq!((r.remaining, r.index), (0, 0));
        assert_eq!(r.object_id, None);
        assert_eq!(fx.source.active_browses(), 0);
    }

    #[test]
    fn limit_delivers_exactly_limit_items() {
        let fx = fixture();
        fx.populate(6);
        let results = fx.browse_all(BrowseParams::new(ROOT).limit(4));
        assert_eq!(results.len(), 4);
        assert_eq!(results.last().map(|r| r.remaining), Some(0));
        let indexes: Vec<_> = results.iter().map(|r| r.index).collect();
        assert_eq!(indexes, vec![0, 1, 2, 3]);
    }

    #[test]
    fn browse_projection_follows_requested_keys() {
        let fx = fixture();
        fx.populate(1);

        let results = fx.browse_all(
            BrowseParams::new(ROOT)
                .filter(Filter::gt("bitrate", -1))
                .keys(KeySelection::from_keys(["title", "missing"])),
        );
        let metadata = results[0].metadata.as_ref().unwrap();
        assert_eq!(metadata.len(), 1);
        assert!(metadata.contains_key("title"));

        let results = fx.browse_all(BrowseParams::new(ROOT).keys(KeySelection::from_keys(["missing"])));
        assert_eq!(results[0].metadata, None);

        let results = fx.browse_all(BrowseParams::new(ROOT).keys(KeySelection::All));
        assert_eq!(results[0].metadata.as_ref().unwrap().len(), 4);
    }

    #[test]
    fn invalid_parent_never_calls_back() {
        let fx = fixture();
        fx.populate(1);
        for parent in ["shelf::1", "radio::", "", "shelf:", "shelf"] {
            let called = Rc::new(Cell::new(false));
            let sink = Rc::clone(&called);
            let err = fx
                .source
                .browse(BrowseParams::new(parent), Box::new(move |_| sink.set(true)))
                .unwrap_err();
            assert!(matches!(err, SourceError::InvalidRequest(_)));
            fx.sched.run_until_idle();
            assert!(!called.get());
        }
        assert_eq!(fx.source.active_browses(), 0);
    }

    #[test]
    fn overly_deep_filter_is_rejected() {
        let fx = fixture();
        let mut filter = Filter::exists("uri");
        for _ in 0..shelf_query::MAX_FILTER_DEPTH {
            filter = filter.not();
        }
        let err = fx
            .source
            .browse(BrowseParams::new(ROOT).filter(filter), Box::new(|_| {}))
            .unwrap_err();
        assert!(matches!(err, SourceError::InvalidRequest(_)));
    }

    #[test]
    fn browse_ids_increase() {
        let fx = fixture();
        let (a, _) = fx.start_browse(BrowseParams::new(ROOT));
        let (b, _) = fx.start_browse(BrowseParams::new(ROOT));
        assert_eq!(a.get(), 1);
        assert_eq!(b.get(), 2);
    }

    #[test]
    fn results_are_delivered_only_from_ticks() {
        let fx = fixture();
        fx.populate(2);
        let (_, seen) = fx.start_browse(BrowseParams::new(ROOT).skip(5));
        assert!(seen.borrow().is_empty());
        fx.sched.run_once();
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn concurrent_browses_interleave() {
        let fx = fixture();
        fx.populate(3);
        let order = Rc::new(RefCell::new(Vec::new()));
        for _ in 0..2 {
            let sink = Rc::clone(&order);
            fx.source
                .browse(
                    BrowseParams::new(ROOT),
                    Box::new(move |r| sink.borrow_mut().push((r.browse_id.get(), r.index))),
                )
                .unwrap();
        }
        fx.sched.run_until_idle();
        assert_eq!(
            *order.borrow(),
            vec![(1, 0), (2, 0), (1, 1), (2, 1), (1, 2), (2, 2)]
        );
    }

    #[test]
    fn browse_snapshot_ignores_later_mutations() {
        let fx = fixture();
        fx.populate(2);
        let (_, seen) = fx.start_browse(BrowseParams::new(ROOT));
        fx.source.create_object(ROOT, bookmark(7), Box::new(|_, _| {}));
        fx.sched.run_until_idle();
        assert_eq!(seen.borrow().len(), 2);
        assert_eq!(fx.store.count().unwrap(), 3);
    }

    // -----------------------------------------------------------------------
    // Cancellation
    // -----------------------------------------------------------------------

    #[test]
    fn cancel_mid_delivery_stops_callbacks() {
        let fx = fixture();
        fx.populate(5);
        let (id, seen) = fx.start_browse(BrowseParams::new(ROOT));

        assert!(fx.sched.run_once());
        assert!(fx.sched.run_once());
        assert_eq!(seen.borrow().len(), 2);

        fx.source.cancel_browse(id).unwrap();
        assert_eq!(fx.sched.run_until_idle(), 0);
        assert_eq!(seen.borrow().len(), 2);
        assert_eq!(fx.source.cancel_browse(id), Err(SourceError::NotFound(id)));
    }

    #[test]
    fn cancel_from_inside_callback() {
        let fx = fixture();
        fx.populate(5);
        let handle = fx.source.handle();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let id = fx
            .source
            .browse(
                BrowseParams::new(ROOT),
                Box::new(move |r| {
                    let browse_id = r.browse_id;
                    sink.borrow_mut().push(r);
                    handle.cancel_browse(browse_id).unwrap();
                }),
            )
            .unwrap();

        fx.sched.run_until_idle();
        assert_eq!(seen.borrow().len(), 1);
        assert_eq!(fx.source.active_browses(), 0);
        assert!(fx.source.cancel_browse(id).is_err());
    }

    #[test]
    fn cancel_finished_browse_is_not_found() {
        let fx = fixture();
        fx.populate(1);
        let (id, _) = fx.start_browse(BrowseParams::new(ROOT));
        fx.sched.run_until_idle();
        assert_eq!(fx.source.cancel_browse(id), Err(SourceError::NotFound(id)));
    }

    #[test]
    fn cancel_before_first_tick() {
        let fx = fixture();
        fx.populate(3);
        let (id, seen) = fx.start_browse(BrowseParams::new(ROOT));
        fx.source.cancel_browse(id).unwrap();
        fx.sched.run_until_idle();
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn drop_cancels_active_browses() {
        let fx = fixture();
        fx.populate(3);
        let (_, seen) = fx.start_browse(BrowseParams::new(ROOT));
        let handle = fx.source.handle();
        fx.sched.run_once();

        let Fixture { source, sched, .. } = fx;
        drop(source);
        assert_eq!(sched.run_until_idle(), 0);
        assert_eq!(seen.borrow().len(), 1);
        assert!(!handle.is_alive());
    }

    #[test]
    fn shutdown_cancels_everything() {
        let fx = fixture();
        fx.populate(3);
        let (a, _) = fx.start_browse(BrowseParams::new(ROOT));
        let (_b, _) = fx.start_browse(BrowseParams::new(ROOT));
        assert_eq!(fx.source.active_browses(), 2);
        fx.source.shutdown();
        assert_eq!(fx.source.active_browses(), 0);
        assert_eq!(fx.sched.pending(), 0);
        assert!(fx.source.cancel_browse(a).is_err());
    }

    // -----------------------------------------------------------------------
    // Bootstrap
    // -----------------------------------------------------------------------

    #[test]
    fn bootstrap_seeds_once_and_notifies() {
        let fx = fixture();
        let mut rx = fx.source.subscribe();
        let seed = StaticBootstrap::new(vec![bookmark(1), bookmark(2), bookmark(1)]);

        let report = fx.source.bootstrap(&seed).unwrap().unwrap();
        assert_eq!(report.imported.len(), 2);
        assert_eq!(report.duplicates, 1);
        assert!(matches!(rx.try_recv(), Ok(SourceEvent::ContainerChanged(_))));

        assert_eq!(fx.source.bootstrap(&seed).unwrap(), None);
        let (metadata, _) = fx.get("shelf::1", KeySelection::from_keys([keys::ADDED]));
        assert!(matches!(
            metadata.unwrap().get(keys::ADDED),
            Some(MetadataValue::Long(_))
        ));
    }

    #[test]
    fn failed_bootstrap_changes_nothing() {
        let fx = fixture();
        let mut rx = fx.source.subscribe();
        let seed = StaticBootstrap::new(vec![bookmark(1), bookmark(2), bookmark(3)]);

        fx.store.fail_writes(1);
        assert!(matches!(
            fx.source.bootstrap(&seed),
            Err(SourceError::StorageFailure(_))
        ));
        assert!(fx.store.is_empty());
        assert!(rx.try_recv().is_err());

        let report = fx.source.bootstrap(&seed).unwrap().unwrap();
        assert_eq!(report.imported, vec![1, 2, 3]);
        assert!(matches!(rx.try_recv(), Ok(SourceEvent::ContainerChanged(_))));
    }

    proptest! {
        #[test]
        fn delivery_follows_skip_and_limit(n in 0i32..10, skip in 0usize..12, limit in 0usize..12) {
            let fx = fixture();
            fx.populate(n);
            let results = fx.browse_all(BrowseParams::new(ROOT).skip(skip).limit(limit));
            let n = n as usize;

            if skip > 0 && skip >= n {
                prop_assert_eq!(results.len(), 1);
                prop_assert_eq!(&results[0].error, &Some(SourceError::BrowseResultFailed));
            } else if n == 0 {
                prop_assert_eq!(results.len(), 1);
                prop_assert!(results[0].object_id.is_none() && results[0].error.is_none());
            } else {
                let available = n - skip;
                let expected = if limit == 0 { available } else { limit.min(available) };
                prop_assert_eq!(results.len(), expected);
                for (i, r) in results.iter().enumerate() {
                    prop_assert_eq!(r.index, i);
                    prop_assert_eq!(r.remaining, expected - 1 - i);
                }
            }
            prop_assert_eq!(fx.source.active_browses(), 0);
        }
    }
}
