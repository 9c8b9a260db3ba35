//! Bookmark item source for Shelf.
//!
//! A [`BookmarkSource`] exposes a flat container of bookmarks kept in an
//! [`ObjectStore`](shelf_store::ObjectStore). Clients create, destroy, read
//! and update items, and browse the container with an optional filter, sort
//! order, skip and limit. Results arrive one per scheduler tick through a
//! callback, and an active browse can be cancelled at any time.
//!
//! # Browse Pipeline
//!
//! ```text
//! fetch -> filter -> sort -> skip/limit -> project -> deliver (one per tick)
//! ```
//!
//! Everything up to projection happens when `browse` is called; the
//! delivery is a task on the shared [`Scheduler`](shelf_sched::Scheduler).
//!
//! # Design Rules
//!
//! 1. Browse results are never delivered before `browse` returns.
//! 2. A cancelled browse receives no further callbacks.
//! 3. Notifications are emitted only after a mutation succeeded.
//! 4. A failed mutation leaves the store unchanged.

pub mod bootstrap;
pub mod browse;
pub mod config;
pub mod error;
pub mod events;
pub mod registry;
pub mod root;
pub mod source;
pub mod traits;

pub use bootstrap::{run_bootstrap, Bootstrap, BootstrapReport, StaticBootstrap};
pub use browse::{BrowseParams, BrowseResult};
pub use config::{SourceConfig, DEFAULT_UUID};
pub use error::{SourceError, SourceResult};
pub use events::{EventStream, SourceEvent};
pub use registry::{BrowseId, RequestRegistry};
pub use root::root_metadata;
pub use source::{BookmarkSource, SourceHandle};
pub use traits::{
    BrowseCallback, CreateCallback, DestroyCallback, GetMetadataCallback, SetMetadataCallback,
    Source,
};
