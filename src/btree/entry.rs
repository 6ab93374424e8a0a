use std::fmt;

use crate::{page::PageId, storage::cell::Cell, storage::tuple::RecordId};

/// One leaf record of the index: a key and the location of the row it
/// points at. The derived order sorts by key first, record id second.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct IndexEntry {
    key: Cell,
    rid: RecordId,
}

impl IndexEntry {
    pub fn new(key: &Cell, rid: &RecordId) -> Self {
        Self {
            key: key.clone(),
            rid: *rid,
        }
    }

    pub fn get_key(&self) -> Cell {
        self.key.clone()
    }

    pub fn get_rid(&self) -> RecordId {
        self.rid
    }
}

impl fmt::Display for IndexEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({} -> {})", self.key, self.rid)
    }
}

impl fmt::Debug for IndexEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

/// An [`IndexEntry`] together with the leaf page and slot it was read
/// from, as produced by the page and table iterators.
#[derive(Clone, PartialEq, Eq)]
pub struct WrappedEntry {
    internal: IndexEntry,
    slot: usize,
    pid: PageId,
}

impl std::ops::Deref for WrappedEntry {
    type Target = IndexEntry;
    fn deref(&self) -> &Self::Target {
        &self.internal
    }
}

impl WrappedEntry {
    pub fn new(internal: &IndexEntry, slot: usize, pid: PageId) -> Self {
        Self {
            internal: internal.clone(),
            slot,
            pid,
        }
    }

    pub fn get_slot_number(&self) -> usize {
        self.slot
    }

    pub fn get_pid(&self) -> PageId {
        self.pid
    }

    pub fn get_entry(&self) -> &IndexEntry {
        &self.internal
    }
}

impl fmt::Display for WrappedEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} @ {}#{}", self.internal, self.pid, self.slot)
    }
}

impl fmt::Debug for WrappedEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}
