use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// A typed attribute value.
///
/// Values are stored as opaque bytes produced by [`MetadataValue::freeze`]
/// and read back with [`MetadataValue::thaw`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetadataValue {
    Str(String),
    Int(i32),
    Long(i64),
    Blob(Vec<u8>),
}

impl MetadataValue {
    /// Encode to the stored byte form.
    pub fn freeze(&self) -> Result<Vec<u8>, TypeError> {
        bincode::serialize(self).map_err(|e| TypeError::Codec(e.to_string()))
    }

    /// Decode from the stored byte form.
    pub fn thaw(bytes: &[u8]) -> Result<Self, TypeError> {
        bincode::deserialize(bytes).map_err(|e| TypeError::Codec(e.to_string()))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view of `Int` and `Long` values.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(i64::from(*v)),
            Self::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// Short name of the value kind.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Str(_) => "string",
            Self::Int(_) => "int",
            Self::Long(_) => "long",
            Self::Blob(_) => "blob",
        }
    }

    fn kind_rank(&self) -> u8 {
        match self {
            Self::Int(_) | Self::Long(_) => 0,
            Self::Str(_) => 1,
            Self::Blob(_) => 2,
        }
    }

    /// Total order used for sorting.
    ///
    /// `Int` and `Long` compare numerically with each other. Values of
    /// unrelated kinds order numbers < strings < blobs.
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        if let (Some(a), Some(b)) = (self.as_i64(), other.as_i64()) {
            return a.cmp(&b);
        }
        match (self, other) {
            (Self::Str(a), Self::Str(b)) => a.cmp(b),
            (Self::Blob(a), Self::Blob(b)) => a.cmp(b),
            _ => self.kind_rank().cmp(&other.kind_rank()),
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => write!(f, "{s}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Long(v) => write!(f, "{v}"),
            Self::Blob(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i32> for MetadataValue {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<i64> for MetadataValue {
    fn from(v: i64) -> Self {
        Self::Long(v)
    }
}
