//! Bookkeeping of active browse requests.

use std::cell::Cell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use shelf_sched::TaskId;

use crate::error::{SourceError, SourceResult};

/// Identifier of a browse request, unique among active requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BrowseId(pub(crate) u32);

impl BrowseId {
    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for BrowseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct Entry {
    cancelled: Rc<Cell<bool>>,
    task: TaskId,
}

/// Allocates browse ids and tracks the delivery task of every active
/// request.
///
/// Ids count up from 1 and are never reused within one registry. Running
/// out of ids is an error rather than a wrap.
#[derive(Default)]
pub struct RequestRegistry {
    last: u32,
    active: BTreeMap<BrowseId, Entry>,
}

impl RequestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out the next request id.
    pub fn allocate(&mut self) -> SourceResult<BrowseId> {
        let next = self
            .last
            .checked_add(1)
            .filter(|n| *n < u32::MAX)
            .ok_or(SourceError::RequestIdsExhausted)?;
        self.last = next;
        Ok(BrowseId(next))
    }

    /// Record an allocated request and its delivery task.
    pub fn register(&mut self, id: BrowseId, cancelled: Rc<Cell<bool>>, task: TaskId) {
        self.active.insert(id, Entry { cancelled, task });
    }

    /// Mark a request cancelled and forget it.
    ///
    /// Returns the delivery task so the caller can pull it from the
    /// scheduler.
    pub fn cancel(&mut self, id: BrowseId) -> SourceResult<TaskId> {
        let entry = self.active.remove(&id).ok_or(SourceError::NotFound(id))?;
        entry.cancelled.set(true);
        Ok(entry.task)
    }

    /// Cancel every active request, returning their delivery tasks.
    pub fn cancel_all(&mut self) -> Vec<TaskId> {
        std::mem::take(&mut self.active)
            .into_values()
            .map(|entry| {
                entry.cancelled.set(true);
                entry.task
            })
            .collect()
    }

    /// Drop the bookkeeping of a finished request. Returns `false` if it was
    /// not registered.
    pub fn unregister(&mut self, id: BrowseId) -> bool {
        self.active.remove(&id).is_some()
    }

    pub fn is_active(&self, id: BrowseId) -> bool {
        self.active.contains_key(&id)
    }

    /// Number of active requests.
    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    #[cfg(test)]
    fn starting_after(last: u32) -> Self {
        Self {
            last,
            ..Self::default()
        }
    }
}

impl fmt::Debug for RequestRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestRegistry")
            .field("last", &self.last)
            .field("active", &self.active.keys().collect::<Vec<_>>())
            .finish()
    }
}
