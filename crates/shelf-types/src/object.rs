use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Numeric identifier of a stored item.
pub type ItemId = u64;

const SEPARATOR: &str = "::";

/// Textual identifier for the root container or one of its items.
///
/// The wire form is bit-exact: `"<uuid>::"` names the root container and
/// `"<uuid>::<decimal-id>"` names an item. The decimal part has no leading
/// zeros, is never zero, and fits in a `u64`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId {
    source: String,
    item: Option<ItemId>,
}

impl ObjectId {
    /// The root container of `source`.
    pub fn root(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            item: None,
        }
    }

    /// An item of `source`.
    pub fn item(source: impl Into<String>, id: ItemId) -> Self {
        Self {
            source: source.into(),
            item: Some(id),
        }
    }

    /// Parse the wire form.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        let invalid = || TypeError::InvalidObjectId(s.to_string());

        let (source, rest) = s.split_once(SEPARATOR).ok_or_else(invalid)?;
        if source.is_empty() {
            return Err(invalid());
        }
        if rest.is_empty() {
            return Ok(Self::root(source));
        }

        if !rest.bytes().all(|b| b.is_ascii_digit()) || rest.starts_with('0') {
            return Err(invalid());
        }
        let id: ItemId = rest.parse().map_err(|_| invalid())?;
        Ok(Self::item(source, id))
    }

    /// Parse the wire form and require it to belong to `source`.
    pub fn parse_for(s: &str, source: &str) -> Result<Self, TypeError> {
        let id = Self::parse(s)?;
        if id.source != source {
            return Err(TypeError::ForeignObjectId {
                id: s.to_string(),
                expected: source.to_string(),
            });
        }
        Ok(id)
    }

    /// The source UUID part.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The numeric item id, or `None` for the root container.
    pub fn item_id(&self) -> Option<ItemId> {
        self.item
    }

    /// Returns `true` if this names the root container.
    pub fn is_root(&self) -> bool {
        self.item.is_none()
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({self})")
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.item {
            Some(id) => write!(f, "{}{SEPARATOR}{id}", self.source),
            None => write!(f, "{}{SEPARATOR}", self.source),
        }
    }
}

impl FromStr for ObjectId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
