//! Filter predicates over item metadata.
//!
//! A [`Filter`] is a tree of comparisons combined with `And`/`Or`/`Not`.
//! Comparison operands are kept as text and coerced to the kind of the
//! stored value when evaluated.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use shelf_types::{Metadata, MetadataValue};

use crate::error::{QueryError, QueryResult};

/// Maximum nesting depth accepted for filter trees.
pub const MAX_FILTER_DEPTH: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Filter {
    Eq(String, String),
    Lt(String, String),
    Gt(String, String),
    Le(String, String),
    Ge(String, String),
    /// Case-insensitive substring match on the value's text form.
    Approx(String, String),
    Exists(String),
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    pub fn eq(key: impl Into<String>, value: impl ToString) -> Self {
        Self::Eq(key.into(), value.to_string())
    }

    pub fn lt(key: impl Into<String>, value: impl ToString) -> Self {
        Self::Lt(key.into(), value.to_string())
    }

    pub fn gt(key: impl Into<String>, value: impl ToString) -> Self {
        Self::Gt(key.into(), value.to_string())
    }

    pub fn le(key: impl Into<String>, value: impl ToString) -> Self {
        Self::Le(key.into(), value.to_string())
    }

    pub fn ge(key: impl Into<String>, value: impl ToString) -> Self {
        Self::Ge(key.into(), value.to_string())
    }

    pub fn approx(key: impl Into<String>, value: impl ToString) -> Self {
        Self::Approx(key.into(), value.to_string())
    }

    pub fn exists(key: impl Into<String>) -> Self {
        Self::Exists(key.into())
    }

    pub fn and(self, rhs: Filter) -> Filter {
        match self {
            Filter::And(mut parts) => {
                parts.push(rhs);
                Filter::And(parts)
            }
            lhs => Filter::And(vec![lhs, rhs]),
        }
    }

    pub fn or(self, rhs: Filter) -> Filter {
        match self {
            Filter::Or(mut parts) => {
                parts.push(rhs);
                Filter::Or(parts)
            }
            lhs => Filter::Or(vec![lhs, rhs]),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Filter {
        Filter::Not(Box::new(self))
    }

    pub fn depth(&self) -> usize {
        match self {
            Filter::And(parts) | Filter::Or(parts) => {
                1 + parts.iter().map(Filter::depth).max().unwrap_or(0)
            }
            Filter::Not(inner) => 1 + inner.depth(),
            _ => 1,
        }
    }

    pub fn validate_depth(&self) -> QueryResult<()> {
        let depth = self.depth();
        if depth > MAX_FILTER_DEPTH {
            return Err(QueryError::FilterTooDeep {
                depth,
                max: MAX_FILTER_DEPTH,
            });
        }
        Ok(())
    }

    /// Every attribute key the filter refers to, first occurrence order.
    pub fn keys(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_keys(&mut out);
        out
    }

    fn collect_keys(&self, out: &mut Vec<String>) {
        match self {
            Filter::Eq(k, _)
            | Filter::Lt(k, _)
            | Filter::Gt(k, _)
            | Filter::Le(k, _)
            | Filter::Ge(k, _)
            | Filter::Approx(k, _)
            | Filter::Exists(k) => {
                if !out.contains(k) {
                    out.push(k.clone());
                }
            }
            Filter::And(parts) | Filter::Or(parts) => {
                parts.iter().for_each(|p| p.collect_keys(out));
            }
            Filter::Not(inner) => inner.collect_keys(out),
        }
    }

    /// Evaluate against an item's metadata.
    ///
    /// A comparison on a key the item does not have evaluates to `false`,
    /// so `Not` of such a comparison is `true`.
    pub fn matches(&self, meta: &Metadata) -> bool {
        match self {
            Filter::Eq(k, v) => compare(meta, k, v).is_some_and(Ordering::is_eq),
            Filter::Lt(k, v) => compare(meta, k, v).is_some_and(Ordering::is_lt),
            Filter::Gt(k, v) => compare(meta, k, v).is_some_and(Ordering::is_gt),
            Filter::Le(k, v) => compare(meta, k, v).is_some_and(Ordering::is_le),
            Filter::Ge(k, v) => compare(meta, k, v).is_some_and(Ordering::is_ge),
            Filter::Approx(k, v) => approx(meta, k, v),
            Filter::Exists(k) => meta.contains_key(k),
            Filter::And(parts) => parts.iter().all(|p| p.matches(meta)),
            Filter::Or(parts) => parts.iter().any(|p| p.matches(meta)),
            Filter::Not(inner) => !inner.matches(meta),
        }
    }
}

/// Compare the stored value of `key` with the operand, coercing the operand
/// to the stored kind. `None` when the key is absent or the operand does not
/// coerce.
fn compare(meta: &Metadata, key: &str, operand: &str) -> Option<Ordering> {
    match meta.get(key)? {
        MetadataValue::Str(s) => Some(s.as_str().cmp(operand)),
        MetadataValue::Int(n) => operand.trim().parse::<i64>().ok().map(|o| i64::from(*n).cmp(&o)),
        MetadataValue::Long(n) => operand.trim().parse::<i64>().ok().map(|o| n.cmp(&o)),
        MetadataValue::Blob(b) => Some(b.as_slice().cmp(operand.as_bytes())),
    }
}

/// Case-insensitive substring match on the textual form of the value.
/// Blobs have no textual form and never match.
fn approx(meta: &Metadata, key: &str, operand: &str) -> bool {
    let text = match meta.get(key) {
        Some(MetadataValue::Str(s)) => s.to_lowercase(),
        Some(MetadataValue::Int(n)) => n.to_string(),
        Some(MetadataValue::Long(n)) => n.to_string(),
        Some(MetadataValue::Blob(_)) | None => return false,
    };
    text.contains(&operand.to_lowercase())
}

fn simple(f: &mut fmt::Formatter<'_>, key: &str, op: &str, value: &str) -> fmt::Result {
    write!(f, "({key}{op}")?;
    escape(f, value)?;
    write!(f, ")")
}

fn escape(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    for c in s.chars() {
        if matches!(c, '(' | ')' | '\\' | '*') {
            write!(f, "\\")?;
        }
        write!(f, "{c}")?;
    }
    Ok(())
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Eq(k, v) => simple(f, k, "=", v),
            Filter::Lt(k, v) => simple(f, k, "<", v),
            Filter::Gt(k, v) => simple(f, k, ">", v),
            Filter::Le(k, v) => simple(f, k, "<=", v),
            Filter::Ge(k, v) => simple(f, k, ">=", v),
            Filter::Approx(k, v) => simple(f, k, "~", v),
            Filter::Exists(k) => write!(f, "({k}?)"),
            Filter::And(parts) => {
                write!(f, "(&")?;
                parts.iter().try_for_each(|p| write!(f, "{p}"))?;
                write!(f, ")")
            }
            Filter::Or(parts) => {
                write!(f, "(|")?;
                parts.iter().try_for_each(|p| write!(f, "{p}"))?;
                write!(f, ")")
            }
            Filter::Not(inner) => write!(f, "(!{inner})"),
        }
    }
}
