//! Attribute storage for Shelf.
//!
//! Items are flat `id -> {key: bytes}` records. The store never interprets
//! value bytes; encoding lives in `shelf-types`.
//!
//! # Storage Backends
//!
//! All backends implement the [`ObjectStore`] trait:
//!
//! - [`InMemoryObjectStore`] -- `BTreeMap`-based store for tests and embedding
//! - [`FileObjectStore`] -- JSON snapshot file, atomically replaced on write
//!
//! # Design Rules
//!
//! 1. Every batch is atomic; a failed batch changes nothing.
//! 2. An item exists exactly while it holds at least one attribute.
//! 3. Item ids are never reused, even after deletion.
//! 4. All I/O errors are propagated, never silently ignored.

pub mod error;
pub mod file;
pub mod memory;
pub mod state;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use file::FileObjectStore;
pub use memory::InMemoryObjectStore;
pub use state::RawAttributes;
pub use traits::ObjectStore;
