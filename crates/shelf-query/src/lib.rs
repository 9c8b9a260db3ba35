//! Query building blocks for Shelf browses.
//!
//! - [`Filter`] -- predicate tree over item metadata, parsed from an
//!   LDAP-style string with [`parse_filter`]
//! - [`SortSpec`] -- composite sort key parsed from `"+key,-key"`
//! - [`relevant_keys`] -- the attribute set a browse must fetch
//!
//! # Design Rules
//!
//! 1. Filters never fail at evaluation time; a comparison that cannot be
//!    made is `false`.
//! 2. Sorting is stable.
//! 3. Filter nesting is bounded by [`MAX_FILTER_DEPTH`].

pub mod error;
pub mod filter;
pub mod parse;
pub mod sort;

pub use error::{QueryError, QueryResult};
pub use filter::{Filter, MAX_FILTER_DEPTH};
pub use parse::parse_filter;
pub use sort::{Order, SortSpec, SortTerm};

use shelf_types::KeySelection;

impl std::str::FromStr for Filter {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_filter(s)
    }
}

/// The attributes a browse must fetch per item: the caller's requested keys
/// plus every key the filter and sort refer to.
///
/// A wildcard request fetches everything. When nothing is needed at all the
/// result is [`KeySelection::None`].
pub fn relevant_keys(
    requested: &KeySelection,
    filter: Option<&Filter>,
    sort: Option<&SortSpec>,
) -> KeySelection {
    if requested.is_all() {
        return KeySelection::All;
    }

    let mut keys: Vec<String> = requested.keys().to_vec();
    let extra = filter
        .map(Filter::keys)
        .unwrap_or_default()
        .into_iter()
        .chain(sort.map(SortSpec::keys).unwrap_or_default());
    for key in extra {
        if !keys.contains(&key) {
            keys.push(key);
        }
    }
    KeySelection::from_keys(keys)
}
