//! Foundation types for Shelf.
//!
//! Every other Shelf crate depends on `shelf-types`.
//!
//! # Key Types
//!
//! - [`ObjectId`] -- textual `"<uuid>::"` / `"<uuid>::<id>"` identifier
//! - [`MetadataValue`] -- a typed attribute value with a byte codec
//! - [`Metadata`] -- an attribute map keyed by attribute name
//! - [`KeySelection`] -- which attributes a caller asked for

pub mod error;
pub mod metadata;
pub mod object;
pub mod value;

pub use error::TypeError;
pub use metadata::{keys, KeySelection, Metadata};
pub use object::{ItemId, ObjectId};
pub use value::MetadataValue;
