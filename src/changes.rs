//! # Change-List Merger
//!
//! Accumulates change records into one ordered list while keeping a
//! path-to-position index. A path that already has a record is resolved in
//! place: the existing entry keeps its position and only its kind changes.

use crate::common::{Change, ChangeKind};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::warn;

/// An ordered change list under construction.
///
/// The index only lives as long as the builder; [`ChangeList::finalize`]
/// drops it and hands out the plain sequence.
#[derive(Debug, Default)]
pub struct ChangeList {
    changes: Vec<Change>,
    index: HashMap<PathBuf, usize>,
}

impl ChangeList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Returns true if `path` already has a record.
    pub fn contains(&self, path: &Path) -> bool {
        self.index.contains_key(path)
    }

    /// Current kind recorded for `path`, if any.
    pub fn kind_of(&self, path: &Path) -> Option<ChangeKind> {
        self.index.get(path).map(|&pos| self.changes[pos].kind)
    }

    pub fn as_slice(&self) -> &[Change] {
        &self.changes
    }

    /// Inserts one change, resolving a conflict with an existing record.
    pub fn merge(&mut self, change: Change) {
        match self.index.get(&change.path) {
            Some(&pos) => {
                let existing = &mut self.changes[pos];
                existing.kind = resolve(&existing.path, existing.kind, change.kind);
            }
            None => {
                self.index.insert(change.path.clone(), self.changes.len());
                self.changes.push(change);
            }
        }
    }

    /// Inserts a batch of changes in order.
    pub fn merge_all<I>(&mut self, changes: I)
    where
        I: IntoIterator<Item = Change>,
    {
        for change in changes {
            self.merge(change);
        }
    }

    /// Drops the index and returns the finished list.
    pub fn finalize(self) -> Vec<Change> {
        self.changes
    }
}

impl FromIterator<Change> for ChangeList {
    fn from_iter<I: IntoIterator<Item = Change>>(iter: I) -> Self {
        let mut list = ChangeList::new();
        list.merge_all(iter);
        list
    }
}

/// Resolves an incoming change against the kind already recorded for a path.
///
/// Two corners are not expected with a well-behaved diff facility; they are
/// resolved as `Modify` and logged.
pub fn resolve(path: &Path, existing: ChangeKind, incoming: ChangeKind) -> ChangeKind {
    use ChangeKind::*;

    match (existing, incoming) {
        (Add, Add) | (Add, Modify) => Add,
        (Add, Delete) => Delete,
        (Modify, Add) => {
            warn!(path = %path.display(), ?existing, ?incoming, "inconsistent change: add over existing modify");
            Modify
        }
        (Modify, Modify) => Modify,
        (Modify, Delete) => Delete,
        (Delete, Add) => Modify,
        (Delete, Modify) => {
            warn!(path = %path.display(), ?existing, ?incoming, "inconsistent change: modify over existing delete");
            Modify
        }
        (Delete, Delete) => Delete,
    }
}
