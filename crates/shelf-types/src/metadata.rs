use std::collections::BTreeMap;

use crate::value::MetadataValue;

/// Attribute map of one object, keyed by attribute name.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// Well-known attribute keys and values.
pub mod keys {
    pub const URI: &str = "uri";
    pub const TITLE: &str = "title";
    pub const MIME: &str = "mime";
    pub const CHILDCOUNT: &str = "childcount";
    pub const DURATION: &str = "duration";
    pub const BITRATE: &str = "bitrate";
    pub const ADDED: &str = "added";
    pub const THUMBNAIL_URI: &str = "thumbnail-uri";

    /// Requesting this key selects every attribute.
    pub const WILDCARD: &str = "*";

    pub const MIME_CONTAINER: &str = "x-shelf/container";
    pub const MIME_AUDIO: &str = "audio/unknown";
    pub const MIME_VIDEO: &str = "video/unknown";
}

/// The attributes a caller asked for.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum KeySelection {
    /// No attributes; results carry no metadata.
    #[default]
    None,
    /// Exactly these attributes, in request order.
    Keys(Vec<String>),
    /// Every attribute the object has.
    All,
}

impl KeySelection {
    /// Build a selection from raw key names. A key that is exactly `"*"`
    /// selects everything; an empty list selects nothing.
    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        if keys.iter().any(|k| k == keys::WILDCARD) {
            Self::All
        } else if keys.is_empty() {
            Self::None
        } else {
            Self::Keys(keys)
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }

    /// Explicitly named keys (empty for `None` and `All`).
    pub fn keys(&self) -> &[String] {
        match self {
            Self::Keys(keys) => keys,
            _ => &[],
        }
    }

    /// Reduce `metadata` to this selection.
    ///
    /// `All` returns the full map. `Keys` keeps only requested keys that are
    /// present and collapses to `None` when nothing is left.
    pub fn project(&self, metadata: &Metadata) -> Option<Metadata> {
        match self {
            Self::None => None,
            Self::All => Some(metadata.clone()),
            Self::Keys(keys) => {
                let projected: Metadata = keys
                    .iter()
                    .filter_map(|k| metadata.get(k).map(|v| (k.clone(), v.clone())))
                    .collect();
                (!projected.is_empty()).then_some(projected)
            }
        }
    }
}
