//! Sort specifications.
//!
//! A [`SortSpec`] is an ordered list of `(key, order)` terms written as
//! `+key`, `-key` or bare `key` (ascending), separated by commas.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use shelf_types::Metadata;

use crate::error::{QueryError, QueryResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Order {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortTerm {
    pub key: String,
    pub order: Order,
}

impl SortTerm {
    pub fn asc(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            order: Order::Asc,
        }
    }

    pub fn desc(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            order: Order::Desc,
        }
    }
}

/// Composite sort key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    terms: Vec<SortTerm>,
}

impl SortSpec {
    pub fn new(terms: Vec<SortTerm>) -> Self {
        Self { terms }
    }

    /// Parse `"-duration,+title,uri"`. Empty terms between commas are
    /// ignored; a sign without a key is an error.
    pub fn parse(s: &str) -> QueryResult<Self> {
        let mut terms = Vec::new();
        for raw in s.split(',') {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            let (order, key) = if let Some(key) = raw.strip_prefix('-') {
                (Order::Desc, key)
            } else if let Some(key) = raw.strip_prefix('+') {
                (Order::Asc, key)
            } else {
                (Order::Asc, raw)
            };
            let key = key.trim();
            if key.is_empty() || key.starts_with(['+', '-']) {
                return Err(QueryError::InvalidSortTerm(raw.to_string()));
            }
            terms.push(SortTerm {
                key: key.to_string(),
                order,
            });
        }
        Ok(Self { terms })
    }

    pub fn terms(&self) -> &[SortTerm] {
        &self.terms
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Keys referenced by the terms, first occurrence order.
    pub fn keys(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::with_capacity(self.terms.len());
        for term in &self.terms {
            if !out.contains(&term.key) {
                out.push(term.key.clone());
            }
        }
        out
    }

    /// Compare two items by the composite key.
    ///
    /// An item lacking a value for a term sorts before items that have one,
    /// before the term's direction is applied.
    pub fn compare(&self, a: Option<&Metadata>, b: Option<&Metadata>) -> Ordering {
        for term in &self.terms {
            let va = a.and_then(|m| m.get(&term.key));
            let vb = b.and_then(|m| m.get(&term.key));
            let ord = match (va, vb) {
                (Some(x), Some(y)) => x.total_cmp(y),
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            let ord = match term.order {
                Order::Asc => ord,
                Order::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    /// Stable sort of `(item, metadata)` pairs; ties keep their input order.
    pub fn sort<T>(&self, items: &mut [(T, Option<Metadata>)]) {
        if self.terms.is_empty() {
            return;
        }
        items.sort_by(|(_, a), (_, b)| self.compare(a.as_ref(), b.as_ref()));
    }
}

impl FromStr for SortSpec {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for SortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, term) in self.terms.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            let sign = match term.order {
                Order::Asc => '+',
                Order::Desc => '-',
            };
            write!(f, "{sign}{}", term.key)?;
        }
        Ok(())
    }
}
